use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};

use crate::cmd::{Cmd, CmdWithLoc, Interpreter, KernelError, Mode};
use crate::history::ProofHistory;
use crate::lex::Location;
use crate::parse::{parse_program, PartialProgramError};
use crate::tt::Judgement;

/// Supplies the source text of an imported package.
pub trait Resolver {
    fn resolve(&mut self, package: &str) -> anyhow::Result<String>;
}

/// Sources fetched ahead of time, keyed by package name.
impl Resolver for HashMap<String, String> {
    fn resolve(&mut self, package: &str) -> anyhow::Result<String> {
        self.get(package)
            .cloned()
            .ok_or_else(|| anyhow!("package {package} not found"))
    }
}

pub struct FnResolver<F>(pub F);

impl<F> Resolver for FnResolver<F>
where
    F: FnMut(&str) -> anyhow::Result<String>,
{
    fn resolve(&mut self, package: &str) -> anyhow::Result<String> {
        (self.0)(package)
    }
}

/// Rejects every import.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImports;

impl Resolver for NoImports {
    fn resolve(&mut self, package: &str) -> anyhow::Result<String> {
        bail!("imports are disabled: {package}")
    }
}

/// Reads `owner/file@version` from `<root>/owner/file@version.seq`.
#[derive(Debug, Clone)]
pub struct DirResolver {
    root: PathBuf,
}

impl DirResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirResolver { root: root.into() }
    }

    pub fn path(&self, package: &str) -> PathBuf {
        let mut path = self.root.clone();
        for component in package.split('/') {
            path.push(component);
        }
        path.set_extension("seq");
        path
    }
}

impl Resolver for DirResolver {
    fn resolve(&mut self, package: &str) -> anyhow::Result<String> {
        let path = self.path(package);
        fs::read_to_string(&path).with_context(|| format!("failed to read `{}`", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelState {
    pub mode: Mode,
    pub proof: Option<ProofHistory>,
}

/// A proof session: one environment, its histories, and the end location
/// of every command executed so far.
pub struct Kernel {
    interp: Interpreter,
    resolver: Box<dyn Resolver>,
    locations: Vec<Location>,
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::new()
    }
}

impl Kernel {
    pub fn new() -> Self {
        Kernel::with_resolver(NoImports)
    }

    pub fn with_resolver(resolver: impl Resolver + 'static) -> Self {
        Kernel {
            interp: Interpreter::new(),
            resolver: Box::new(resolver),
            locations: vec![],
        }
    }

    pub fn parse(&self, text: &str) -> Result<Vec<CmdWithLoc>, PartialProgramError> {
        parse_program(text)
    }

    pub fn state(&self) -> KernelState {
        KernelState {
            mode: self.interp.mode(),
            proof: self.interp.proof().cloned(),
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interp
    }

    pub fn execute(&mut self, cmd: &CmdWithLoc) -> Result<KernelState, KernelError> {
        self.interp.step(&cmd.cmd, self.resolver.as_mut())?;
        if cmd.cmd == Cmd::Undo {
            self.locations.pop();
        } else {
            self.locations.push(cmd.range.end);
        }
        Ok(self.state())
    }

    pub fn undo(&mut self) -> Result<KernelState, KernelError> {
        self.interp.step(&Cmd::Undo, self.resolver.as_mut())?;
        self.locations.pop();
        Ok(self.state())
    }

    pub fn current_goals(&self) -> &[Judgement] {
        self.interp.goals()
    }

    /// Drops every declaration and proof. The resolver is kept.
    pub fn reset(&mut self) {
        self.interp = Interpreter::new();
        self.locations.clear();
    }

    /// End of the last command still in effect.
    pub fn location(&self) -> Location {
        self.locations.last().copied().unwrap_or_default()
    }
}
