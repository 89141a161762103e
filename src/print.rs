use std::fmt::{Display, Formatter, Result};

use easy_ext::ext;

use crate::tt::{Formula, Id, Judgement, Name, Term, Type};

const PREC_IMPLY: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_UNARY: u8 = 4;

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.index())
    }
}

fn fmt_list<T: Display>(items: &[T], f: &mut Formatter<'_>) -> Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Term::Var(name) => write!(f, "{name}"),
            Term::Abs(inner) => {
                write!(f, "λ")?;
                for (i, binder) in inner.binders.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{binder}")?;
                }
                write!(f, ". {}", inner.body)
            }
            Term::App(inner) => {
                match &inner.fun {
                    Term::Abs(_) => write!(f, "({})", inner.fun)?,
                    fun => write!(f, "{fun}")?,
                }
                write!(f, "(")?;
                fmt_list(&inner.args, f)?;
                write!(f, ")")
            }
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Type::Var(name) => write!(f, "'{name}"),
            Type::Hole(id) => write!(f, "?{id}"),
            Type::Prop => write!(f, "Prop"),
            Type::Con(inner) => {
                write!(f, "{}", inner.name)?;
                if !inner.args.is_empty() {
                    write!(f, "(")?;
                    fmt_list(&inner.args, f)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
            Type::Arrow(inner) => {
                if let Type::Arrow(_) = inner.dom {
                    write!(f, "({})", inner.dom)?;
                } else {
                    write!(f, "{}", inner.dom)?;
                }
                write!(f, " → {}", inner.cod)
            }
        }
    }
}

fn fmt_formula(m: &Formula, prec: u8, f: &mut Formatter<'_>) -> Result {
    let (op_prec, symbol, lhs, rhs, lhs_prec, rhs_prec) = match m {
        Formula::Top => return write!(f, "⊤"),
        Formula::Bottom => return write!(f, "⊥"),
        Formula::Pred(inner) => {
            write!(f, "{}", inner.name)?;
            if !inner.args.is_empty() {
                write!(f, "(")?;
                fmt_list(&inner.args, f)?;
                write!(f, ")")?;
            }
            return Ok(());
        }
        Formula::Forall(inner) => {
            write!(f, "∀{}. ", inner.binder)?;
            return fmt_formula(&inner.body, PREC_UNARY, f);
        }
        Formula::Exist(inner) => {
            write!(f, "∃{}. ", inner.binder)?;
            return fmt_formula(&inner.body, PREC_UNARY, f);
        }
        // infixr
        Formula::Imply(inner) => (
            PREC_IMPLY,
            "→",
            &inner.lhs,
            &inner.rhs,
            PREC_IMPLY + 1,
            PREC_IMPLY,
        ),
        // infixl
        Formula::Or(inner) => (PREC_OR, "∨", &inner.lhs, &inner.rhs, PREC_OR, PREC_OR + 1),
        Formula::And(inner) => (
            PREC_AND,
            "∧",
            &inner.lhs,
            &inner.rhs,
            PREC_AND,
            PREC_AND + 1,
        ),
    };
    let needs_paren = prec > op_prec;
    if needs_paren {
        write!(f, "(")?;
    }
    fmt_formula(lhs, lhs_prec, f)?;
    write!(f, " {symbol} ")?;
    fmt_formula(rhs, rhs_prec, f)?;
    if needs_paren {
        write!(f, ")")?;
    }
    Ok(())
}

impl Display for Formula {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        fmt_formula(self, 0, f)
    }
}

impl Display for Judgement {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        fmt_list(&self.assms, f)?;
        if !self.assms.is_empty() {
            write!(f, " ")?;
        }
        write!(f, "⊢")?;
        if !self.concls.is_empty() {
            write!(f, " ")?;
        }
        fmt_list(&self.concls, f)
    }
}

pub fn format_judgement(judgement: &Judgement) -> String {
    judgement.to_string()
}

#[ext(GoalsExt)]
pub impl [Judgement] {
    /// One goal per line, the active goal first.
    fn format_goals(&self) -> String {
        if self.is_empty() {
            return "no goals\n".to_owned();
        }
        let mut out = String::new();
        for (i, goal) in self.iter().enumerate() {
            out.push_str(&format!("{}: {}\n", i + 1, goal));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tt::{
        mk_abs, mk_and, mk_app, mk_exist, mk_forall, mk_imply, mk_or, mk_pred, mk_type_arrow,
        mk_type_con, mk_type_prop, mk_type_var, mk_var,
    };

    fn n(s: &str) -> Name {
        Name::from_str(s)
    }

    fn atom(s: &str) -> Formula {
        mk_pred(n(s), vec![])
    }

    #[test]
    fn implication_is_right_associative() {
        let f = mk_imply(atom("A"), mk_imply(atom("B"), atom("C")));
        assert_eq!(f.to_string(), "A → B → C");
        let g = mk_imply(mk_imply(atom("A"), atom("B")), atom("C"));
        assert_eq!(g.to_string(), "(A → B) → C");
    }

    #[test]
    fn conjunction_binds_tighter_than_disjunction() {
        let f = mk_or(mk_and(atom("A"), atom("B")), atom("C"));
        assert_eq!(f.to_string(), "A ∧ B ∨ C");
        let g = mk_and(atom("A"), mk_or(atom("B"), atom("C")));
        assert_eq!(g.to_string(), "A ∧ (B ∨ C)");
        let h = mk_and(atom("A"), mk_and(atom("B"), atom("C")));
        assert_eq!(h.to_string(), "A ∧ (B ∧ C)");
    }

    #[test]
    fn quantifier_body_is_parenthesized_when_binary() {
        let x = mk_var(n("x"));
        let f = mk_forall(
            n("x"),
            mk_or(mk_pred(n("P"), vec![x.clone()]), atom("Q")),
        );
        assert_eq!(f.to_string(), "∀x. (P(x) ∨ Q)");
        let g = mk_imply(
            mk_exist(n("x"), mk_pred(n("P"), vec![x.clone()])),
            Formula::Bottom,
        );
        assert_eq!(g.to_string(), "∃x. P(x) → ⊥");
    }

    #[test]
    fn terms() {
        let m = mk_app(
            mk_abs(vec![n("x"), n("y")], mk_var(n("x"))),
            vec![mk_app(mk_var(n("f")), vec![mk_var(n("z"))]), mk_var(n("w"))],
        );
        assert_eq!(m.to_string(), "(λx y. x)(f(z), w)");
    }

    #[test]
    fn types() {
        let a = mk_type_var(n("a"));
        let list = mk_type_con(n("list"), vec![a.clone()]);
        let t = mk_type_arrow(mk_type_arrow(a, list), mk_type_prop());
        assert_eq!(t.to_string(), "('a → list('a)) → Prop");
    }

    #[test]
    fn judgements() {
        let j = Judgement::new(vec![atom("A"), atom("B")], vec![Formula::Top]);
        assert_eq!(format_judgement(&j), "A, B ⊢ ⊤");
        assert_eq!(format_judgement(&Judgement::default()), "⊢");
        let j = Judgement::new(vec![atom("A")], vec![]);
        assert_eq!(format_judgement(&j), "A ⊢");
    }

    #[test]
    fn goals_listing() {
        let goals = vec![Judgement::goal(atom("A")), Judgement::goal(atom("B"))];
        assert_eq!(goals.format_goals(), "1: ⊢ A\n2: ⊢ B\n");
        assert_eq!(Vec::<Judgement>::new().format_goals(), "no goals\n");
    }
}
