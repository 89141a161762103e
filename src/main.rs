use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use seqcalc::{process, DirResolver, File, GoalsExt};

const USAGE: &str = "\
Usage: seqcalc [OPTIONS] [FILE]

Checks the proof script FILE, or standard input when FILE is omitted.

Options:
  -g, --goals    print the goals left open at the end of the script
  -h, --help     print this help
  -v, --version  print version

Environment:
  SEQCALC_LIB    directory imports are read from (default: the script's directory)
  RUST_LOG       log filter, e.g. `info` or `seqcalc::proof=debug`
";

struct Args {
    path: Option<String>,
    goals: bool,
}

enum Action {
    Run(Args),
    Help,
    Version,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Action> {
    let mut parsed = Args {
        path: None,
        goals: false,
    };
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Action::Help),
            "-v" | "--version" => return Ok(Action::Version),
            "-g" | "--goals" => parsed.goals = true,
            "-" => parsed.path = None,
            _ if arg.starts_with('-') => bail!("unknown option `{arg}`\n\n{USAGE}"),
            _ => {
                if let Some(previous) = parsed.path.replace(arg) {
                    bail!("more than one input file (first was `{previous}`)");
                }
            }
        }
    }
    Ok(Action::Run(parsed))
}

fn run(args: Args) -> anyhow::Result<()> {
    let (name, contents, dir) = match &args.path {
        Some(path) => {
            let contents =
                fs::read_to_string(path).with_context(|| format!("failed to read `{path}`"))?;
            let dir = Path::new(path)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            (path.clone(), contents, dir)
        }
        None => {
            let mut contents = String::new();
            io::stdin()
                .read_to_string(&mut contents)
                .context("failed to read standard input")?;
            (
                "<stdin>".to_owned(),
                contents,
                env::current_dir().context("failed to get the current directory")?,
            )
        }
    };
    let root = env::var_os("SEQCALC_LIB").map(PathBuf::from).unwrap_or(dir);
    log::debug!("resolving imports under {}", root.display());

    let kernel = process(Arc::new(File::new(name, contents)), DirResolver::new(root))?;
    if args.goals {
        print!("{}", kernel.current_goals().format_goals());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let result = parse_args(env::args().skip(1)).and_then(|action| match action {
        Action::Help => {
            print!("{USAGE}");
            Ok(())
        }
        Action::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Action::Run(args) => run(args),
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            for cause in err.chain().skip(1) {
                eprintln!("caused by: {cause}");
            }
            ExitCode::FAILURE
        }
    }
}
