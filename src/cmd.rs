use std::collections::HashMap;
use std::fmt::Display;
use std::iter::zip;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::elab::{check_formula, check_type, Context, TypeError};
use crate::env::Env;
use crate::history::{ProofHistory, TopFrame, TopHistory};
use crate::kernel::Resolver;
use crate::lex::Range;
use crate::parse::parse_program;
use crate::print::GoalsExt;
use crate::proof::{Rule, RuleError};
use crate::tt::{Formula, Judgement, Name, Predicate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    Theorem(CmdTheorem),
    Axiom(CmdAxiom),
    Constant(CmdConstant),
    Import(CmdImport),
    Apply(Rule),
    Use(CmdUse),
    Qed,
    Undo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdTheorem {
    pub name: Name,
    pub formula: Formula,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdAxiom {
    pub name: Name,
    pub formula: Formula,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdConstant {
    pub name: Name,
    pub ty: crate::tt::Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdImport {
    pub package: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdUse {
    pub thm: Name,
    pub bindings: Vec<PredBinding>,
}

/// `P(x, y) ↦ F` inside a `use` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredBinding {
    pub name: Name,
    pub params: Vec<Name>,
    pub body: Formula,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdWithLoc {
    pub cmd: Cmd,
    pub range: Range,
}

impl Cmd {
    pub fn keyword(&self) -> &'static str {
        match self {
            Cmd::Theorem(_) => "Theorem",
            Cmd::Axiom(_) => "axiom",
            Cmd::Constant(_) => "constant",
            Cmd::Import(_) => "import",
            Cmd::Apply(_) => "apply",
            Cmd::Use(_) => "use",
            Cmd::Qed => "qed",
            Cmd::Undo => "undo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    DeclareWait,
    Proving,
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::DeclareWait => write!(f, "declaration"),
            Mode::Proving => write!(f, "proof"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("`{cmd}` is not allowed in {mode} mode")]
    WrongMode { cmd: &'static str, mode: Mode },
    #[error("unknown theorem: {0}")]
    UnknownTheorem(Name),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("proof is not finished: {} goal(s) remain\n{}", .goals.len(), .goals.format_goals())]
    UnfinishedProof { goals: Vec<Judgement> },
    #[error("already defined: {0}")]
    AlreadyDefined(Name),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error(transparent)]
    Mode(#[from] ModeError),
    #[error("type error: {0}")]
    Type(#[from] TypeError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error("cannot use {thm}: {message}")]
    Use { thm: Name, message: String },
    #[error("malformed package name: {0:?}")]
    InvalidPackage(String),
    #[error("import cycle through {0}")]
    ImportCycle(String),
    #[error("failed to import {package}: {message}")]
    Import { package: String, message: String },
}

static PACKAGE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+/[a-z0-9-]+@[0-9]+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofState {
    pub name: Name,
    pub formula: Formula,
    pub history: ProofHistory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TopState {
    #[default]
    DeclareWait,
    Proving(ProofState),
}

/// Packages shared by an interpreter and the interpreters it spawns for
/// imports.
#[derive(Debug, Clone, Default)]
struct Imports {
    loaded: HashMap<String, Env>,
    in_progress: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    env: Env,
    top: TopHistory,
    state: TopState,
    imports: Imports,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        match self.state {
            TopState::DeclareWait => Mode::DeclareWait,
            TopState::Proving(_) => Mode::Proving,
        }
    }

    pub fn state(&self) -> &TopState {
        &self.state
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn top_history(&self) -> &TopHistory {
        &self.top
    }

    pub fn proof(&self) -> Option<&ProofHistory> {
        match &self.state {
            TopState::DeclareWait => None,
            TopState::Proving(proof) => Some(&proof.history),
        }
    }

    /// Open goals of the current proof, the active goal first.
    pub fn goals(&self) -> &[Judgement] {
        match self.proof() {
            Some(history) => history.top(),
            None => &[],
        }
    }

    /// Executes one command. A rejected command leaves the interpreter as
    /// it was.
    pub fn step(&mut self, cmd: &Cmd, resolver: &mut dyn Resolver) -> Result<Mode, KernelError> {
        match cmd {
            Cmd::Undo => self.undo()?,
            Cmd::Theorem(inner) => {
                self.expect_mode(cmd, Mode::DeclareWait)?;
                self.theorem(inner)?;
            }
            Cmd::Axiom(inner) => {
                self.expect_mode(cmd, Mode::DeclareWait)?;
                self.axiom(inner)?;
            }
            Cmd::Constant(inner) => {
                self.expect_mode(cmd, Mode::DeclareWait)?;
                self.constant(inner)?;
            }
            Cmd::Import(CmdImport { package }) => {
                self.expect_mode(cmd, Mode::DeclareWait)?;
                let env = self.import(package, resolver)?;
                self.commit(env);
            }
            Cmd::Apply(rule) => {
                let proof = self.proving(cmd)?;
                proof.history.apply_rule(rule)?;
            }
            Cmd::Use(inner) => {
                self.expect_mode(cmd, Mode::Proving)?;
                let formula = instantiate(&self.env, inner)?;
                let proof = self.proving(cmd)?;
                let Some((goal, rest)) = proof.history.top().split_first() else {
                    return Err(KernelError::Use {
                        thm: inner.thm.clone(),
                        message: "no goals".to_owned(),
                    });
                };
                log::debug!("use {}: {}", inner.thm, formula);
                let mut goal = goal.clone();
                goal.assms.insert(0, formula);
                let mut goals = vec![goal];
                goals.extend_from_slice(rest);
                proof.history.push(goals);
            }
            Cmd::Qed => {
                self.expect_mode(cmd, Mode::Proving)?;
                self.qed()?;
            }
        }
        Ok(self.mode())
    }

    fn expect_mode(&self, cmd: &Cmd, expected: Mode) -> Result<(), ModeError> {
        let mode = self.mode();
        if mode != expected {
            return Err(ModeError::WrongMode {
                cmd: cmd.keyword(),
                mode,
            });
        }
        Ok(())
    }

    fn proving(&mut self, cmd: &Cmd) -> Result<&mut ProofState, ModeError> {
        match &mut self.state {
            TopState::Proving(proof) => Ok(proof),
            TopState::DeclareWait => Err(ModeError::WrongMode {
                cmd: cmd.keyword(),
                mode: Mode::DeclareWait,
            }),
        }
    }

    fn check_fresh(&self, name: &Name) -> Result<(), ModeError> {
        if self.env.is_defined(name) {
            return Err(ModeError::AlreadyDefined(name.clone()));
        }
        Ok(())
    }

    fn theorem(&mut self, CmdTheorem { name, formula }: &CmdTheorem) -> Result<(), KernelError> {
        self.check_fresh(name)?;
        check_formula(&self.env.types, &mut Context::new(), formula)?;
        log::debug!("theorem {name}: {formula}");
        self.state = TopState::Proving(ProofState {
            name: name.clone(),
            formula: formula.clone(),
            history: ProofHistory::new(Judgement::goal(formula.clone())),
        });
        Ok(())
    }

    fn axiom(&mut self, CmdAxiom { name, formula }: &CmdAxiom) -> Result<(), KernelError> {
        self.check_fresh(name)?;
        check_formula(&self.env.types, &mut Context::new(), formula)?;
        log::info!("axiom {name}: {formula}");
        let env = self.env.add_thm(name.clone(), formula.clone());
        self.commit(env);
        Ok(())
    }

    fn constant(&mut self, CmdConstant { name, ty }: &CmdConstant) -> Result<(), KernelError> {
        self.check_fresh(name)?;
        check_type(&self.env.types, ty)?;
        log::info!("constant {name} : {ty}");
        let env = self.env.add_type(name.clone(), ty.clone());
        self.commit(env);
        Ok(())
    }

    fn commit(&mut self, env: Env) {
        let old = std::mem::replace(&mut self.env, env);
        self.top.push(TopFrame::Other { env: old });
    }

    fn qed(&mut self) -> Result<(), KernelError> {
        let proof = match std::mem::take(&mut self.state) {
            TopState::Proving(proof) if proof.history.is_finished() => proof,
            TopState::Proving(proof) => {
                let goals = proof.history.top().to_vec();
                self.state = TopState::Proving(proof);
                return Err(ModeError::UnfinishedProof { goals }.into());
            }
            TopState::DeclareWait => {
                return Err(ModeError::WrongMode {
                    cmd: "qed",
                    mode: Mode::DeclareWait,
                }
                .into())
            }
        };
        let ProofState {
            name,
            formula,
            history,
        } = proof;
        log::info!("theorem {name} proved in {} step(s)", history.len() - 1);
        let env = self.env.add_thm(name.clone(), formula.clone());
        let old = std::mem::replace(&mut self.env, env);
        self.top.push(TopFrame::Theorem {
            name,
            formula,
            proof: history,
            env: old,
        });
        Ok(())
    }

    fn undo(&mut self) -> Result<(), ModeError> {
        if let TopState::Proving(proof) = &mut self.state {
            if proof.history.pop().is_none() {
                log::debug!("undo: abandon proof of {}", proof.name);
                self.state = TopState::DeclareWait;
            } else {
                log::debug!("undo: back to {} frame(s)", proof.history.len());
            }
            return Ok(());
        }
        match self.top.pop() {
            None => Err(ModeError::NothingToUndo),
            Some(TopFrame::Other { env }) => {
                log::debug!("undo: declaration");
                self.env = env;
                Ok(())
            }
            Some(TopFrame::Theorem {
                name,
                formula,
                proof,
                env,
            }) => {
                log::debug!("undo: reopen proof of {name}");
                self.env = env;
                self.state = TopState::Proving(ProofState {
                    name,
                    formula,
                    history: proof,
                });
                Ok(())
            }
        }
    }

    /// The environment after importing `package` into the current one.
    fn import(&mut self, package: &str, resolver: &mut dyn Resolver) -> Result<Env, KernelError> {
        if !PACKAGE_NAME.is_match(package) {
            return Err(KernelError::InvalidPackage(package.to_owned()));
        }
        if self.env.has_package(package) {
            log::debug!("import {package}: already in scope");
            return Ok(self.env.clone());
        }
        let imported = match self.imports.loaded.get(package) {
            Some(env) => env.clone(),
            None => self.load(package, resolver)?,
        };
        let env = self
            .env
            .merge(&imported)
            .map_err(|name| KernelError::Import {
                package: package.to_owned(),
                message: format!("{name} is already defined"),
            })?;
        log::info!("imported {package}");
        Ok(env.add_package(package))
    }

    fn load(&mut self, package: &str, resolver: &mut dyn Resolver) -> Result<Env, KernelError> {
        if self.imports.in_progress.iter().any(|p| p == package) {
            return Err(KernelError::ImportCycle(package.to_owned()));
        }
        let failed = |message: String| KernelError::Import {
            package: package.to_owned(),
            message,
        };
        let source = resolver
            .resolve(package)
            .map_err(|e| failed(format!("{e:#}")))?;
        let cmds = parse_program(&source)
            .map_err(|e| failed(format!("{}: {}", e.error.range(), e.error)))?;

        let mut child = Interpreter::new();
        child.imports = std::mem::take(&mut self.imports);
        child.imports.in_progress.push(package.to_owned());
        let result = cmds
            .iter()
            .try_for_each(|cmd| match child.step(&cmd.cmd, resolver) {
                Ok(_) => Ok(()),
                Err(KernelError::ImportCycle(p)) => Err(KernelError::ImportCycle(p)),
                Err(e) => Err(failed(format!("{}: {e}", cmd.range))),
            });
        self.imports = std::mem::take(&mut child.imports);
        self.imports.in_progress.pop();
        result?;

        if let TopState::Proving(proof) = &child.state {
            return Err(failed(format!("proof of {} is not finished", proof.name)));
        }
        self.imports
            .loaded
            .insert(package.to_owned(), child.env.clone());
        Ok(child.env)
    }
}

/// The formula of theorem `cmd.thm` with its predicates replaced by the
/// bindings of `cmd`.
fn instantiate(env: &Env, cmd: &CmdUse) -> Result<Formula, KernelError> {
    let formula = env
        .thm(&cmd.thm)
        .ok_or_else(|| ModeError::UnknownTheorem(cmd.thm.clone()))?;
    let mut ctx = Context::new();
    check_formula(&env.types, &mut ctx, formula)?;

    let mut preds = HashMap::new();
    for binding in &cmd.bindings {
        let doms = match ctx.predicate_domains(&binding.name) {
            Some(doms) => doms?,
            None => {
                return Err(TypeError::UnknownPredicate {
                    name: binding.name.clone(),
                    formula: formula.clone(),
                }
                .into())
            }
        };
        if doms.len() != binding.params.len() {
            return Err(TypeError::Arity {
                name: binding.name.clone(),
                expected: doms.len(),
                found: binding.params.len(),
            }
            .into());
        }
        if preds.contains_key(&binding.name) {
            return Err(KernelError::Use {
                thm: cmd.thm.clone(),
                message: format!("{} is bound twice", binding.name),
            });
        }
        let mut body_ctx = Context::new();
        let mut holes = HashMap::new();
        let binders = zip(&binding.params, &doms)
            .map(|(param, dom)| {
                let dom = body_ctx.transplant(&ctx.resolve(dom), &mut holes);
                (param.clone(), dom)
            })
            .collect();
        body_ctx.scoped(binders, |body_ctx| {
            body_ctx.check_formula(&env.types, &binding.body)
        })?;
        preds.insert(
            binding.name.clone(),
            Predicate::new(binding.params.clone(), binding.body.clone()),
        );
    }
    formula
        .subst_preds(&preds)
        .map_err(|message| KernelError::Use {
            thm: cmd.thm.clone(),
            message,
        })
}
