use std::sync::Arc;

use thiserror::Error;

use crate::cmd::{
    Cmd, CmdAxiom, CmdConstant, CmdImport, CmdTheorem, CmdUse, CmdWithLoc, PredBinding,
};
use crate::lex::{File, Lex, Location, Range, Token, TokenKind};
use crate::proof::Rule;
use crate::tt::{
    mk_abs, mk_and, mk_app, mk_exist, mk_forall, mk_imply, mk_or, mk_pred, mk_type_arrow,
    mk_type_con, mk_type_prop, mk_type_var, mk_var, Formula, Judgement, Name, Term, Type,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{message} at {}", .range.start)]
    Lex { message: String, range: Range },
    #[error("parse error: {message} at {}", .range.start)]
    Parse { message: String, range: Range },
    #[error("unexpected end of input at {location}")]
    Eof { location: Location },
}

impl ParseError {
    pub fn range(&self) -> Range {
        match self {
            ParseError::Lex { range, .. } | ParseError::Parse { range, .. } => *range,
            ParseError::Eof { location } => Range::new(*location, *location),
        }
    }
}

/// The commands that parsed before the first error, and that error.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct PartialProgramError {
    pub cmds: Vec<CmdWithLoc>,
    pub error: ParseError,
}

const PREC_IMPLY: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;

pub struct Parser<'a> {
    lex: &'a mut Lex,
}

impl<'a> Parser<'a> {
    pub fn new(lex: &'a mut Lex) -> Self {
        Self { lex }
    }

    fn fail<R>(token: &Token, message: impl Into<String>) -> Result<R, ParseError> {
        Err(ParseError::Parse {
            message: message.into(),
            range: token.range,
        })
    }

    fn eof_error(&self) -> ParseError {
        ParseError::Eof {
            location: self.lex.location(),
        }
    }

    fn peek_opt(&self) -> Option<Token> {
        self.lex.clone().next()
    }

    fn advance(&mut self) {
        self.lex.next();
    }

    pub fn eof(&mut self) -> Result<(), ParseError> {
        match self.peek_opt() {
            Some(token) => Self::fail(&token, "expected end of input but tokens remain"),
            None => Ok(()),
        }
    }

    fn any_token(&mut self) -> Result<Token, ParseError> {
        let token = self.lex.next().ok_or_else(|| self.eof_error())?;
        if let TokenKind::Error(message) = &token.kind {
            return Err(ParseError::Lex {
                message: message.clone(),
                range: token.range,
            });
        }
        Ok(token)
    }

    fn name(&mut self) -> Result<Name, ParseError> {
        let token = self.any_token()?;
        if !token.is_ident() {
            return Self::fail(&token, "expected identifier");
        }
        Ok(Name::from_str(token.as_str()))
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<(), ParseError> {
        let token = self.any_token()?;
        if token.is_symbol(sym) {
            return Ok(());
        }
        Self::fail(&token, format!("expected symbol '{}'", sym))
    }

    fn expect_symbol_opt(&mut self, sym: &str) -> Option<Token> {
        if let Some(token) = self.peek_opt() {
            if token.is_symbol(sym) {
                self.advance();
                return Some(token);
            }
        }
        None
    }

    fn peek_symbol(&self, sym: &str) -> bool {
        self.peek_opt().map_or(false, |token| token.is_symbol(sym))
    }

    fn num_lit(&mut self) -> Result<usize, ParseError> {
        let token = self.any_token()?;
        if token.kind != TokenKind::NumLit {
            return Self::fail(&token, "expected numeral literal");
        }
        match token.as_str().parse() {
            Ok(n) => Ok(n),
            Err(_) => Self::fail(&token, "numeral literal out of range"),
        }
    }

    fn str_lit(&mut self) -> Result<String, ParseError> {
        let token = self.any_token()?;
        if token.kind != TokenKind::StrLit {
            return Self::fail(&token, "expected string literal");
        }
        Ok(token.text)
    }

    /// `( item, ⋯, item )`
    fn parenthesized<R>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<R, ParseError>,
    ) -> Result<Vec<R>, ParseError> {
        self.expect_symbol("(")?;
        let mut items = vec![];
        if self.expect_symbol_opt(")").is_some() {
            return Ok(items);
        }
        loop {
            items.push(item(self)?);
            if self.expect_symbol_opt(",").is_none() {
                break;
            }
        }
        self.expect_symbol(")")?;
        Ok(items)
    }

    pub fn term(&mut self) -> Result<Term, ParseError> {
        if self.expect_symbol_opt("λ").is_some() {
            let mut binders = vec![self.name()?];
            while self.expect_symbol_opt(".").is_none() {
                binders.push(self.name()?);
            }
            let body = self.term()?;
            return Ok(mk_abs(binders, body));
        }
        let mut m = self.term_primary()?;
        while self.peek_symbol("(") {
            let args = self.parenthesized(Self::term)?;
            m = mk_app(m, args);
        }
        Ok(m)
    }

    fn term_primary(&mut self) -> Result<Term, ParseError> {
        let token = self.any_token()?;
        if token.is_ident() {
            Ok(mk_var(Name::from_str(token.as_str())))
        } else if token.is_symbol("(") {
            let m = self.term()?;
            self.expect_symbol(")")?;
            Ok(m)
        } else {
            Self::fail(&token, "expected a term")
        }
    }

    pub fn ty(&mut self) -> Result<Type, ParseError> {
        let t = self.type_primary()?;
        if self.expect_symbol_opt("→").is_some() {
            // type infixr →
            return Ok(mk_type_arrow(t, self.ty()?));
        }
        Ok(t)
    }

    fn type_primary(&mut self) -> Result<Type, ParseError> {
        let token = self.any_token()?;
        match token.kind {
            TokenKind::TypeVar => Ok(mk_type_var(Name::from_str(token.as_str()))),
            TokenKind::Ident if token.as_str() == "Prop" => Ok(mk_type_prop()),
            TokenKind::Ident => {
                let args = if self.peek_symbol("(") {
                    self.parenthesized(Self::ty)?
                } else {
                    vec![]
                };
                Ok(mk_type_con(Name::from_str(token.as_str()), args))
            }
            _ if token.is_symbol("(") => {
                let t = self.ty()?;
                self.expect_symbol(")")?;
                Ok(t)
            }
            _ => Self::fail(&token, "expected a primary type expression"),
        }
    }

    pub fn formula(&mut self) -> Result<Formula, ParseError> {
        self.subformula(0)
    }

    fn subformula(&mut self, min_prec: u8) -> Result<Formula, ParseError> {
        let mut lhs = self.formula_unary()?;
        while let Some(token) = self.peek_opt() {
            let (prec, next_prec) = if token.is_symbol("→") {
                (PREC_IMPLY, PREC_IMPLY)
            } else if token.is_symbol("∨") {
                (PREC_OR, PREC_OR + 1)
            } else if token.is_symbol("∧") {
                (PREC_AND, PREC_AND + 1)
            } else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.subformula(next_prec)?;
            lhs = match prec {
                PREC_IMPLY => mk_imply(lhs, rhs),
                PREC_OR => mk_or(lhs, rhs),
                _ => mk_and(lhs, rhs),
            };
        }
        Ok(lhs)
    }

    fn formula_unary(&mut self) -> Result<Formula, ParseError> {
        let token = self.any_token()?;
        if token.is_ident() {
            let name = Name::from_str(token.as_str());
            let args = if self.peek_symbol("(") {
                self.parenthesized(Self::term)?
            } else {
                vec![]
            };
            return Ok(mk_pred(name, args));
        }
        if token.is_symbol("⊤") {
            return Ok(Formula::Top);
        }
        if token.is_symbol("⊥") {
            return Ok(Formula::Bottom);
        }
        if token.is_symbol("(") {
            let f = self.formula()?;
            self.expect_symbol(")")?;
            return Ok(f);
        }
        if token.is_symbol("∀") || token.is_symbol("∃") {
            let mut binders = vec![self.name()?];
            while self.expect_symbol_opt(".").is_none() {
                binders.push(self.name()?);
            }
            let mut body = self.formula_unary()?;
            for binder in binders.into_iter().rev() {
                body = if token.is_symbol("∀") {
                    mk_forall(binder, body)
                } else {
                    mk_exist(binder, body)
                };
            }
            return Ok(body);
        }
        Self::fail(&token, "expected a formula")
    }

    fn formula_list(&mut self) -> Result<Vec<Formula>, ParseError> {
        let mut formulas = vec![self.formula()?];
        while self.expect_symbol_opt(",").is_some() {
            formulas.push(self.formula()?);
        }
        Ok(formulas)
    }

    /// `A, B ⊢ C, D`; either side may be empty.
    pub fn judgement(&mut self) -> Result<Judgement, ParseError> {
        let assms = if self.peek_symbol("⊢") {
            vec![]
        } else {
            self.formula_list()?
        };
        self.expect_symbol("⊢")?;
        let concls = if self.peek_opt().is_none() {
            vec![]
        } else {
            self.formula_list()?
        };
        Ok(Judgement::new(assms, concls))
    }

    pub fn rule(&mut self) -> Result<Rule, ParseError> {
        let token = self.any_token()?;
        if !token.is_ident() {
            return Self::fail(&token, "expected a rule name");
        }
        let rule = match token.as_str() {
            "I" => Rule::I,
            "Cut" => Rule::Cut(self.formula()?),
            "AndL1" => Rule::AndL1,
            "AndL2" => Rule::AndL2,
            "AndR" => Rule::AndR,
            "OrL" => Rule::OrL,
            "OrR1" => Rule::OrR1,
            "OrR2" => Rule::OrR2,
            "ImpL" => Rule::ImpL,
            "ImpR" => Rule::ImpR,
            "BottomL" => Rule::BottomL,
            "TopR" => Rule::TopR,
            "ForallL" => Rule::ForallL(self.term()?),
            "ForallR" => Rule::ForallR(self.name()?),
            "ExistL" => Rule::ExistL(self.name()?),
            "ExistR" => Rule::ExistR(self.term()?),
            "WL" => Rule::WL,
            "WR" => Rule::WR,
            "CL" => Rule::CL,
            "CR" => Rule::CR,
            "PL" => Rule::PL(self.num_lit()?),
            "PR" => Rule::PR(self.num_lit()?),
            other => return Self::fail(&token, format!("unknown rule '{other}'")),
        };
        Ok(rule)
    }

    /// `P ↦ φ` or `P(x₁, ⋯, xₙ) ↦ φ`
    fn pred_binding(&mut self) -> Result<PredBinding, ParseError> {
        let name = self.name()?;
        let params = if self.peek_symbol("(") {
            self.parenthesized(Self::name)?
        } else {
            vec![]
        };
        self.expect_symbol("↦")?;
        let body = self.formula()?;
        Ok(PredBinding { name, params, body })
    }

    pub fn cmd(&mut self) -> Result<CmdWithLoc, ParseError> {
        let keyword = self.any_token()?;
        if keyword.kind != TokenKind::Keyword {
            return Self::fail(&keyword, "expected a command");
        }
        let cmd = match keyword.as_str() {
            "Theorem" => {
                let name = self.name()?;
                let formula = self.formula()?;
                Cmd::Theorem(CmdTheorem { name, formula })
            }
            "axiom" => {
                let name = self.name()?;
                self.expect_symbol(":")?;
                let formula = self.formula()?;
                Cmd::Axiom(CmdAxiom { name, formula })
            }
            "constant" => {
                let name = self.name()?;
                self.expect_symbol(":")?;
                let ty = self.ty()?;
                Cmd::Constant(CmdConstant { name, ty })
            }
            "import" => Cmd::Import(CmdImport {
                package: self.str_lit()?,
            }),
            "apply" => Cmd::Apply(self.rule()?),
            "use" => {
                let thm = self.name()?;
                let mut bindings = vec![];
                if self.expect_symbol_opt("{").is_some() {
                    if self.expect_symbol_opt("}").is_none() {
                        loop {
                            bindings.push(self.pred_binding()?);
                            if self.expect_symbol_opt(",").is_none() {
                                break;
                            }
                        }
                        self.expect_symbol("}")?;
                    }
                }
                Cmd::Use(CmdUse { thm, bindings })
            }
            "qed" => Cmd::Qed,
            _ => return Self::fail(&keyword, "expected a command"),
        };
        Ok(CmdWithLoc {
            cmd,
            range: Range::new(keyword.range.start, self.lex.location()),
        })
    }
}

/// Parses every command of `file`, stopping at the first error.
pub fn parse_file(file: Arc<File>) -> Result<Vec<CmdWithLoc>, PartialProgramError> {
    let mut lex = Lex::new(file);
    let mut cmds = vec![];
    while !lex.is_eof() {
        match Parser::new(&mut lex).cmd() {
            Ok(cmd) => cmds.push(cmd),
            Err(error) => return Err(PartialProgramError { cmds, error }),
        }
    }
    Ok(cmds)
}

pub fn parse_program(text: &str) -> Result<Vec<CmdWithLoc>, PartialProgramError> {
    parse_file(Arc::new(File::new("<input>", text)))
}

fn parse_whole<R>(
    text: &str,
    f: impl FnOnce(&mut Parser) -> Result<R, ParseError>,
) -> Result<R, ParseError> {
    let mut lex = Lex::new(Arc::new(File::new("<input>", text)));
    let mut parser = Parser::new(&mut lex);
    let result = f(&mut parser)?;
    parser.eof()?;
    Ok(result)
}

pub fn parse_formula(text: &str) -> Result<Formula, ParseError> {
    parse_whole(text, |parser| parser.formula())
}

pub fn parse_term(text: &str) -> Result<Term, ParseError> {
    parse_whole(text, |parser| parser.term())
}

pub fn parse_type(text: &str) -> Result<Type, ParseError> {
    parse_whole(text, |parser| parser.ty())
}

pub fn parse_judgement(text: &str) -> Result<Judgement, ParseError> {
    parse_whole(text, |parser| parser.judgement())
}

pub fn parse_rule(text: &str) -> Result<Rule, ParseError> {
    parse_whole(text, |parser| parser.rule())
}
