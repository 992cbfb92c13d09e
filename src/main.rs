use anyhow::{Context, bail};
use argh::FromArgs;
use hsh::command::NOT_FOUND;
use hsh::config::{HIST_FILE, HIST_MAX};
use hsh::{Config, ExecutionContext, InputSource, Interpreter};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// A small command interpreter with persistent history.
/// Reads commands from SCRIPT when given, otherwise from standard input.
struct Args {
    #[argh(option, default = "HIST_FILE.to_string()")]
    /// history file name, relative to $HOME.
    history_file: String,

    #[argh(option, default = "HIST_MAX")]
    /// maximum retained history size; a full history keeps one less.
    history_max: usize,

    #[argh(switch, short = 'v')]
    /// log debug information to standard error.
    verbose: bool,

    #[argh(positional)]
    /// script to run instead of reading standard input.
    script: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("HSH_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args, program: String) -> anyhow::Result<i32> {
    if args.history_max == 0 {
        bail!("--history-max must be at least 1");
    }
    let config = Config {
        history_file: args.history_file,
        history_max: args.history_max,
    };

    let mut ctx = ExecutionContext::new(config, Box::new(BufWriter::new(io::stdout())));
    ctx.import_process_env()
        .context("cannot copy the process environment")?;
    match &args.script {
        Some(script) => match InputSource::open(script) {
            Ok(source) => ctx.set_input(source),
            Err(err) => {
                eprintln!("{}: 0: Can't open {}: {}", program, script.display(), err);
                return Ok(NOT_FOUND);
            }
        },
        None => ctx.set_input(InputSource::Standard),
    }

    let mut sh = Interpreter::with_context(ctx, program);
    sh.start();
    let status = sh.repl();
    sh.finish()?;
    status
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();
    init_logging(args.verbose);
    let program = std::env::args().next().unwrap_or_else(|| "hsh".to_string());

    match run(args, program) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("hsh: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
