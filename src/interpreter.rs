use crate::command::{CommandFactory, ExitCode, NOT_FOUND};
use crate::context::ExecutionContext;
use crate::external::ExternalCommand;
use crate::history::{self, HistoryError};
use crate::lexer::{self, WORD_DELIMITERS};
use anyhow::Context;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;
use tracing::{debug, warn};

const PROMPT: &str = "$ ";

/// Factory allows creating instances of ExecutableCommand.
///
/// Only support commands defined in this crate — builtins and ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Read-eval loop over an [`ExecutionContext`].
///
/// Every input line is recorded in the history, split into chained commands, and each
/// command goes through clear, populate, dispatch and a partial teardown. The session
/// ends on end of input or `exit`; [`finish`](Self::finish) then saves the history and
/// fully tears the context down.
///
/// Example
/// ```
/// use hsh::{Config, ExecutionContext, Interpreter};
/// let ctx = ExecutionContext::new(Config::default(), Box::new(std::io::sink()));
/// let mut sh = Interpreter::with_context(ctx, "hsh");
/// assert_eq!(sh.run_line("setenv GREETING hello"), 0);
/// assert_eq!(sh.context().getenv("GREETING"), Some("hello"));
/// ```
pub struct Interpreter {
    ctx: ExecutionContext,
    program: String,
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(
        ctx: ExecutionContext,
        program: impl Into<String>,
        commands: Vec<Box<dyn CommandFactory>>,
    ) -> Self {
        Self {
            ctx,
            program: program.into(),
            commands,
        }
    }

    /// Interpreter with the builtins followed by the external command launcher.
    pub fn with_context(ctx: ExecutionContext, program: impl Into<String>) -> Self {
        let mut commands = crate::builtin::factories();
        commands.push(Box::new(Factory::<ExternalCommand>::default()));
        Self::new(ctx, program, commands)
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.ctx
    }

    /// Prime the history from the history file. Returns the number of entries loaded.
    pub fn start(&mut self) -> usize {
        let loaded = history::read(&mut self.ctx);
        debug!(entries = loaded, "history loaded");
        loaded
    }

    /// Run a single command invocation by name with arguments.
    ///
    /// Unknown commands report "not found" and yield 127.
    pub fn run(&mut self, name: &str, args: &[&str]) -> anyhow::Result<ExitCode> {
        let cmd = self
            .commands
            .iter()
            .find_map(|factory| factory.try_create(&self.ctx, name, args));

        let mut out = self.ctx.take_output();
        let result = match cmd {
            Some(cmd) => cmd.execute(&mut self.ctx, &mut *out),
            None => writeln!(
                out,
                "{}: {}: {}: not found",
                self.ctx.fname(),
                self.ctx.line_count(),
                name
            )
            .map(|()| NOT_FOUND)
            .map_err(Into::into),
        };
        self.ctx.restore_output(out);
        result
    }

    /// Record and run one input line, returning the status of its last command.
    ///
    /// Blank lines are counted but neither recorded nor run.
    pub fn run_line(&mut self, line: &str) -> ExitCode {
        let line = line.trim_end_matches(['\r', '\n']);
        if !lexer::is_blank(line, WORD_DELIMITERS) {
            if let Err(err) = history::append_entry(&mut self.ctx, line) {
                warn!("not recorded in history: {err}");
            }
        }

        self.ctx.clear();
        self.ctx.load_line(line.to_string());
        if self.ctx.has_chained() {
            while self.ctx.exit_requested().is_none() {
                self.ctx.clear();
                if !self.ctx.next_chained() {
                    break;
                }
                self.execute_current();
            }
        } else {
            self.execute_current();
        }

        if let Err(err) = self.ctx.output().flush() {
            warn!("cannot flush output: {err}");
        }
        self.ctx.status()
    }

    fn execute_current(&mut self) {
        if self
            .ctx
            .arg()
            .is_none_or(|arg| lexer::is_blank(arg, WORD_DELIMITERS))
        {
            return;
        }
        self.ctx.populate(&self.program);
        let argv = self.ctx.argv().to_vec();
        let Some((name, args)) = argv.split_first() else {
            return;
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let status = match self.run(name, &args) {
            Ok(code) => code,
            Err(err) => {
                let _ = writeln!(self.ctx.output(), "{}: {}: {:#}", self.program, name, err);
                1
            }
        };
        self.ctx.set_status(status);
        // Releases only the words of this command, which cannot fail.
        let _ = self.ctx.teardown(false);
    }

    /// Read and run lines until end of input or `exit`, returning the final status.
    ///
    /// A script input is read line by line; otherwise lines come from an interactive
    /// editor whose recall list starts with the loaded history.
    pub fn repl(&mut self) -> anyhow::Result<ExitCode> {
        match self.ctx.input() {
            Some(source) if source.is_owned() => self.run_script(),
            _ => self.run_interactive(),
        }
    }

    fn run_script(&mut self) -> anyhow::Result<ExitCode> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = match self.ctx.input_mut() {
                Some(input) => input.read_line(&mut line).context("cannot read script")?,
                None => 0,
            };
            if read == 0 {
                break;
            }
            self.run_line(&line);
            if let Some(code) = self.ctx.exit_requested() {
                return Ok(code);
            }
        }
        Ok(self.ctx.status())
    }

    fn run_interactive(&mut self) -> anyhow::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;
        for entry in self.ctx.history.iter().filter_map(|node| node.text()) {
            rl.add_history_entry(entry)?;
        }

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    rl.add_history_entry(line.as_str())?;
                    self.run_line(&line);
                    if let Some(code) = self.ctx.exit_requested() {
                        return Ok(code);
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(self.ctx.status())
    }

    /// Save the history and release every resource of the session.
    pub fn finish(&mut self) -> anyhow::Result<()> {
        match history::write(&self.ctx) {
            Ok(()) => {}
            Err(HistoryError::Disabled) => debug!("history not saved: HOME is not set"),
            Err(err) => warn!("history not saved: {err}"),
        }
        self.ctx.teardown(true).context("cannot flush output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::InputSource;
    use crate::io_adapters::SharedBuffer;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn interpreter() -> (Interpreter, SharedBuffer) {
        let output = SharedBuffer::new();
        let ctx = ExecutionContext::new(Config::default(), Box::new(output.clone()));
        (Interpreter::with_context(ctx, "hsh"), output)
    }

    #[test]
    fn test_chained_line_runs_each_command() {
        let (mut sh, output) = interpreter();

        assert_eq!(sh.run_line("setenv A 1; setenv B 2;env"), 0);

        assert_eq!(output.contents(), "A=1\nB=2\n");
        assert_eq!(sh.context().history.to_strings(), ["setenv A 1; setenv B 2;env"]);
        assert!(!sh.context().has_chained());
    }

    #[test]
    fn test_alias_and_variables_reach_commands() {
        let (mut sh, output) = interpreter();

        sh.run_line("alias show=env");
        sh.run_line("setenv SRC value");
        sh.run_line("setenv COPY $SRC");
        sh.run_line("unsetenv SRC");
        sh.run_line("show");

        assert_eq!(output.contents(), "COPY=value\n");
    }

    #[test]
    fn test_not_found_sets_status() {
        let (mut sh, output) = interpreter();

        assert_eq!(sh.run_line("definitely-not-a-command-xyz"), NOT_FOUND);
        assert_eq!(
            output.contents(),
            "hsh: 1: definitely-not-a-command-xyz: not found\n"
        );
        assert_eq!(sh.run_line("exit"), NOT_FOUND);
        assert_eq!(sh.context().exit_requested(), Some(NOT_FOUND));
    }

    #[test]
    fn test_blank_lines_are_counted_not_run() {
        let (mut sh, output) = interpreter();
        sh.context_mut().set_status(5);

        assert_eq!(sh.run_line("   \n"), 5);

        assert!(sh.context().history.is_empty());
        assert_eq!(sh.context().line_count(), 1);
        assert!(output.contents().is_empty());
    }

    #[test]
    fn test_empty_chained_commands_are_skipped() {
        let (mut sh, output) = interpreter();

        assert_eq!(sh.run_line("setenv A 1; "), 0);
        assert_eq!(sh.run_line(" ;; setenv B 2 ;\t"), 0);

        assert!(output.contents().is_empty());
        assert_eq!(sh.context().getenv("A"), Some("1"));
        assert_eq!(sh.context().getenv("B"), Some("2"));
    }

    #[test]
    fn test_script_line_numbers_include_blank_lines() {
        let (mut sh, output) = interpreter();
        sh.context_mut().set_input(InputSource::from_reader(
            "script",
            Cursor::new(b"\nsetenv A 1\n\n   \nmissing-command-xyz\n".to_vec()),
        ));

        assert_eq!(sh.repl().unwrap(), NOT_FOUND);
        assert_eq!(output.contents(), "hsh: 5: missing-command-xyz: not found\n");
    }

    #[test]
    fn test_script_stops_at_exit() {
        let (mut sh, _output) = interpreter();
        sh.context_mut().set_input(InputSource::from_reader(
            "script",
            Cursor::new(b"setenv A 1\nexit 3\nsetenv B 2\n".to_vec()),
        ));

        assert_eq!(sh.repl().unwrap(), 3);
        assert_eq!(sh.context().getenv("A"), Some("1"));
        assert_eq!(sh.context().getenv("B"), None);
    }

    #[test]
    fn test_script_runs_to_end_of_input() {
        let (mut sh, output) = interpreter();
        sh.context_mut().set_input(InputSource::from_reader(
            "script",
            Cursor::new(b"setenv A 1\nenv".to_vec()),
        ));

        assert_eq!(sh.repl().unwrap(), 0);
        assert_eq!(output.contents(), "A=1\n");
    }

    #[test]
    fn test_session_persists_history() {
        let home = TempDir::new().unwrap();
        let file = home.path().join(crate::config::HIST_FILE);
        fs::write(&file, "old one\nold two\n").unwrap();

        let (mut sh, output) = interpreter();
        sh.context_mut()
            .setenv("HOME", home.path().to_str().unwrap())
            .unwrap();
        assert_eq!(sh.start(), 2);

        sh.run_line("setenv X 1");
        sh.run_line("history");
        assert_eq!(
            output.contents(),
            "0: old one\n1: old two\n2: setenv X 1\n3: history\n"
        );

        sh.finish().unwrap();
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "old one\nold two\nsetenv X 1\nhistory\n"
        );
        assert!(sh.context().history.is_empty());
        assert!(sh.context().environment().is_empty());
        sh.finish().unwrap();
    }
}
