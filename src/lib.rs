use std::sync::Arc;

use anyhow::Context;

pub mod cmd;
pub mod elab;
pub mod env;
pub mod history;
pub mod kernel;
pub mod lex;
pub mod parse;
pub mod print;
pub mod proof;
pub mod tt;

pub use cmd::{Cmd, CmdWithLoc, KernelError, Mode};
pub use kernel::{DirResolver, FnResolver, Kernel, KernelState, NoImports, Resolver};
pub use lex::File;
pub use print::GoalsExt;

/// Runs every command of `file` in a fresh kernel. Commands before a
/// parse error still run, so the reported error is the first one in
/// source order.
pub fn process(file: Arc<File>, resolver: impl Resolver + 'static) -> anyhow::Result<Kernel> {
    let (cmds, parse_error) = match parse::parse_file(file.clone()) {
        Ok(cmds) => (cmds, None),
        Err(parse::PartialProgramError { cmds, error }) => (cmds, Some(error)),
    };

    let mut kernel = Kernel::with_resolver(resolver);
    for cmd in &cmds {
        kernel
            .execute(cmd)
            .with_context(|| format!("command error at {}", file.snippet(cmd.range)))?;
    }
    if let Some(error) = parse_error {
        let range = error.range();
        return Err(error).with_context(|| format!("parse error at {}", file.snippet(range)));
    }
    Ok(kernel)
}
