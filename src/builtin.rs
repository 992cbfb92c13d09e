use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::context::ExecutionContext;
use crate::expand::alias_value;
use crate::history;
use crate::interpreter::Factory;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::io::Write;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process against the session context.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "env" or "history".
    fn name() -> &'static str;

    /// Executes the command.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, ctx: &mut ExecutionContext, stdout: &mut dyn Write) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        ctx: &mut ExecutionContext,
        stdout: &mut dyn Write,
    ) -> Result<ExitCode> {
        match <T as BuiltinCommand>::execute(*self, ctx, stdout) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(stdout, "{}: {}: {}: {:#}", ctx.fname(), ctx.line_count(), T::name(), e)?;
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _ctx: &mut ExecutionContext,
        stdout: &mut dyn Write,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.output.trim_end())?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _ctx: &ExecutionContext,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// End the session.
pub struct Exit {
    #[argh(positional)]
    /// exit status; defaults to the status of the last command.
    pub status: Option<String>,
}

/// Status used when `exit` gets an argument that is not a number.
const ILLEGAL_NUMBER: ExitCode = 2;

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, ctx: &mut ExecutionContext, stdout: &mut dyn Write) -> Result<ExitCode> {
        let status = match self.status.as_deref() {
            None => ctx.status(),
            Some(raw) => match raw.parse::<u8>() {
                Ok(code) => ExitCode::from(code),
                Err(_) => {
                    writeln!(
                        stdout,
                        "{}: {}: exit: Illegal number: {}",
                        ctx.fname(),
                        ctx.line_count(),
                        raw
                    )?;
                    return Ok(ILLEGAL_NUMBER);
                }
            },
        };
        ctx.request_exit(status);
        Ok(status)
    }
}

#[derive(FromArgs)]
/// Print the environment, one NAME=value per line.
pub struct Env {}

impl BuiltinCommand for Env {
    fn name() -> &'static str {
        "env"
    }

    fn execute(self, ctx: &mut ExecutionContext, stdout: &mut dyn Write) -> Result<ExitCode> {
        ctx.environment().print_ordered(stdout)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Set an environment variable, replacing any previous value.
pub struct Setenv {
    #[argh(positional)]
    /// variable name.
    pub name: String,
    #[argh(positional)]
    /// new value.
    pub value: String,
}

impl BuiltinCommand for Setenv {
    fn name() -> &'static str {
        "setenv"
    }

    fn execute(self, ctx: &mut ExecutionContext, _stdout: &mut dyn Write) -> Result<ExitCode> {
        if self.name.is_empty() || self.name.contains('=') {
            bail!("invalid variable name: {}", self.name);
        }
        ctx.setenv(&self.name, &self.value)
            .with_context(|| format!("cannot set {}", self.name))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Remove environment variables.
pub struct Unsetenv {
    #[argh(positional, greedy)]
    /// names of the variables to remove.
    pub names: Vec<String>,
}

impl BuiltinCommand for Unsetenv {
    fn name() -> &'static str {
        "unsetenv"
    }

    fn execute(self, ctx: &mut ExecutionContext, _stdout: &mut dyn Write) -> Result<ExitCode> {
        if self.names.is_empty() {
            bail!("Too few arguments.");
        }
        for name in &self.names {
            ctx.unsetenv(name);
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Show the numbered command history.
pub struct History {
    #[argh(switch, short = 'w')]
    /// also save the history to the history file.
    pub write: bool,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, ctx: &mut ExecutionContext, stdout: &mut dyn Write) -> Result<ExitCode> {
        history::renumber(ctx);
        ctx.history.print_numbered(stdout)?;
        if self.write {
            history::write(ctx)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Define or show aliases.
/// Without arguments every alias is printed as name='value'.
pub struct Alias {
    #[argh(positional, greedy)]
    /// definitions as name=value, or names of aliases to print.
    pub args: Vec<String>,
}

impl BuiltinCommand for Alias {
    fn name() -> &'static str {
        "alias"
    }

    fn execute(self, ctx: &mut ExecutionContext, stdout: &mut dyn Write) -> Result<ExitCode> {
        if self.args.is_empty() {
            for node in &ctx.alias {
                if let Some((name, _)) = node.text().and_then(|text| text.split_once('=')) {
                    print_alias(&ctx.alias, name, stdout)?;
                }
            }
            return Ok(0);
        }

        let mut status = 0;
        for arg in &self.args {
            match arg.split_once('=') {
                Some((name, _)) if !name.is_empty() => set_alias(ctx, name, arg)?,
                _ => {
                    if !print_alias(&ctx.alias, arg, stdout)? {
                        writeln!(stdout, "alias: {}: not found", arg)?;
                        status = 1;
                    }
                }
            }
        }
        Ok(status)
    }
}

fn set_alias(ctx: &mut ExecutionContext, name: &str, definition: &str) -> Result<()> {
    match ctx.alias.find_prefixed_mut(name, Some('=')) {
        Some(node) => node.set_text(Some(definition))?,
        None => {
            ctx.alias.insert_end(Some(definition), 0)?;
        }
    }
    Ok(())
}

fn print_alias(
    aliases: &crate::list::OrderedList,
    name: &str,
    stdout: &mut dyn Write,
) -> Result<bool> {
    match alias_value(aliases, name) {
        Some(value) => {
            writeln!(stdout, "{}='{}'", name, value)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Factories for every builtin, in lookup order.
pub(crate) fn factories() -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Env>::default()),
        Box::new(Factory::<Setenv>::default()),
        Box::new(Factory::<Unsetenv>::default()),
        Box::new(Factory::<History>::default()),
        Box::new(Factory::<Alias>::default()),
    ]
}
