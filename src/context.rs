//! The per-session execution context.
//!
//! One [`ExecutionContext`] is built when the interpreter starts and is passed by
//! reference to everything that needs session state. It owns the history, alias and
//! environment registries, the current command line and its words, and the input
//! the commands are read from. Its lifecycle is driven by three operations:
//! [`clear`](ExecutionContext::clear) before every command,
//! [`populate`](ExecutionContext::populate) once a command line is available, and
//! [`teardown`](ExecutionContext::teardown) at session end.

use crate::command::ExitCode;
use crate::config::Config;
use crate::expand::{AliasExpander, Expand, VarExpander};
use crate::lexer::{self, CHAIN_SEPARATOR, WORD_DELIMITERS};
use crate::list::OrderedList;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The command currently being run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// A whole input line owned by the context.
    Owned(String),
    /// One command of a chained line, as a byte range into the context's command buffer.
    Chained(Range<usize>),
}

/// Where command lines come from.
pub enum InputSource {
    /// The process standard input. Never closed by the context.
    Standard,
    /// A script owned by the context, closed when the context is torn down.
    Script {
        name: String,
        reader: Box<dyn BufRead>,
    },
}

impl InputSource {
    /// Open the script at `path` for reading.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(
            path.display().to_string(),
            BufReader::new(file),
        ))
    }

    pub fn from_reader(name: impl Into<String>, reader: impl BufRead + 'static) -> Self {
        Self::Script {
            name: name.into(),
            reader: Box::new(reader),
        }
    }

    /// Whether dropping this source closes something.
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Script { .. })
    }

    /// Read one line into `buf`, returning the number of bytes read (0 at end of input).
    pub fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        match self {
            Self::Standard => io::stdin().lock().read_line(buf),
            Self::Script { reader, .. } => reader.read_line(buf),
        }
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("Standard"),
            Self::Script { name, .. } => f.debug_struct("Script").field("name", name).finish(),
        }
    }
}

/// Mutable state of one interpreter session.
pub struct ExecutionContext {
    arg: Option<CommandLine>,
    argv: Option<Vec<String>>,
    argc: usize,
    path: Option<PathBuf>,
    fname: String,
    status: ExitCode,
    exit_request: Option<ExitCode>,
    line_count: usize,
    pub(crate) environment: OrderedList,
    pub(crate) environ: Option<Vec<String>>,
    pub(crate) env_changed: bool,
    /// Alias definitions, stored as `name=value`.
    pub alias: OrderedList,
    /// Command log, oldest first.
    pub history: OrderedList,
    pub(crate) histcount: usize,
    cmd_buf: Option<String>,
    chain_pos: usize,
    readfd: Option<InputSource>,
    out: Option<Box<dyn Write>>,
    config: Config,
}

impl ExecutionContext {
    /// A context with every field empty, writing its output to `out`.
    pub fn new(config: Config, out: Box<dyn Write>) -> Self {
        Self {
            arg: None,
            argv: None,
            argc: 0,
            path: None,
            fname: String::new(),
            status: 0,
            exit_request: None,
            line_count: 0,
            environment: OrderedList::new(),
            environ: None,
            env_changed: false,
            alias: OrderedList::new(),
            history: OrderedList::new(),
            histcount: 0,
            cmd_buf: None,
            chain_pos: 0,
            readfd: None,
            out: Some(out),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reset the per-command fields. Registries, the command buffer and the input stay.
    pub fn clear(&mut self) {
        self.arg = None;
        self.argv = None;
        self.path = None;
        self.argc = 0;
    }

    /// Take a freshly read input line as the next command source.
    ///
    /// A line with chained commands becomes the command buffer and must be walked with
    /// [`next_chained`](Self::next_chained); any other line becomes the owned command.
    pub fn load_line(&mut self, line: String) {
        self.line_count += 1;
        if line.contains(CHAIN_SEPARATOR) {
            self.cmd_buf = Some(line);
            self.chain_pos = 0;
            self.arg = None;
        } else {
            self.cmd_buf = None;
            self.arg = Some(CommandLine::Owned(line));
        }
    }

    /// Point the current command at the next command of the command buffer.
    ///
    /// Returns `false`, releasing the buffer, once every chained command was visited.
    pub fn next_chained(&mut self) -> bool {
        let Some(buf) = self.cmd_buf.as_deref() else {
            return false;
        };
        if self.chain_pos > buf.len() {
            self.cmd_buf = None;
            self.chain_pos = 0;
            return false;
        }
        let start = self.chain_pos;
        let end = buf[start..]
            .find(CHAIN_SEPARATOR)
            .map_or(buf.len(), |offset| start + offset);
        self.arg = Some(CommandLine::Chained(start..end));
        self.chain_pos = end + 1;
        true
    }

    pub fn has_chained(&self) -> bool {
        self.cmd_buf.is_some()
    }

    pub fn command_line(&self) -> Option<&CommandLine> {
        self.arg.as_ref()
    }

    /// Text of the current command.
    pub fn arg(&self) -> Option<&str> {
        match self.arg.as_ref()? {
            CommandLine::Owned(line) => Some(line),
            CommandLine::Chained(range) => self.cmd_buf.as_deref()?.get(range.clone()),
        }
    }

    /// Words of the current command, empty until [`populate`](Self::populate) runs.
    pub fn argv(&self) -> &[String] {
        self.argv.as_deref().unwrap_or_default()
    }

    pub fn argc(&self) -> usize {
        self.argc
    }

    /// Program name recorded by the last [`populate`](Self::populate).
    pub fn fname(&self) -> &str {
        &self.fname
    }

    /// Number of input lines read so far.
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Executable resolved for the current command.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }

    /// Exit status of the last command.
    pub fn status(&self) -> ExitCode {
        self.status
    }

    pub fn set_status(&mut self, status: ExitCode) {
        self.status = status;
    }

    /// Ask the interpreter to end the session with `status`.
    pub fn request_exit(&mut self, status: ExitCode) {
        self.exit_request = Some(status);
    }

    pub fn exit_requested(&self) -> Option<ExitCode> {
        self.exit_request
    }

    /// History size as of the last renumbering or append.
    pub fn histcount(&self) -> usize {
        self.histcount
    }

    pub fn input(&self) -> Option<&InputSource> {
        self.readfd.as_ref()
    }

    pub fn input_mut(&mut self) -> Option<&mut InputSource> {
        self.readfd.as_mut()
    }

    /// Hand `source` to the context, which owns it from now on.
    pub fn set_input(&mut self, source: InputSource) {
        self.readfd = Some(source);
    }

    pub fn output(&mut self) -> &mut dyn Write {
        self.out.get_or_insert_with(|| Box::new(io::sink()))
    }

    /// Borrow the output out of the context while a command also needs the context.
    pub fn take_output(&mut self) -> Box<dyn Write> {
        self.out.take().unwrap_or_else(|| Box::new(io::sink()))
    }

    pub fn restore_output(&mut self, out: Box<dyn Write>) {
        self.out = Some(out);
    }

    /// Build the words of the current command, then expand aliases and variables.
    pub fn populate(&mut self, program: &str) {
        self.populate_with(program, &[&AliasExpander, &VarExpander]);
    }

    /// [`populate`](Self::populate) with an explicit chain of expanders, applied in order.
    pub fn populate_with(&mut self, program: &str, expanders: &[&dyn Expand]) {
        self.fname = program.to_string();

        let Some(line) = self.arg().filter(|line| !line.is_empty()) else {
            return;
        };
        let mut argv = lexer::tokenize(line, WORD_DELIMITERS)
            .unwrap_or_else(|| vec![line.to_string()]);

        for expander in expanders {
            expander.expand(self, &mut argv);
        }
        self.argc = argv.len();
        self.argv = Some(argv);
    }

    /// Release what the context owns.
    ///
    /// The words of the current command are always released. With `full`, so is every
    /// other owned field: the command, the registries, the environment snapshot, the
    /// command buffer and a script input. Standard input is never closed. Released fields
    /// are left empty, so calling this again is harmless.
    pub fn teardown(&mut self, full: bool) -> io::Result<()> {
        self.argv = None;
        self.argc = 0;
        self.path = None;

        if !full {
            return Ok(());
        }

        // A chained command only views the command buffer, which is released below.
        self.arg = None;
        self.environment.release_all();
        self.history.release_all();
        self.alias.release_all();
        self.histcount = 0;
        self.environ = None;
        self.cmd_buf = None;
        self.chain_pos = 0;
        if let Some(source) = self.readfd.take() {
            if let InputSource::Script { name, .. } = &source {
                debug!(script = %name, "closing script input");
            }
            drop(source);
        }
        match self.out.as_mut() {
            Some(out) => out.flush(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("arg", &self.arg)
            .field("argv", &self.argv)
            .field("argc", &self.argc)
            .field("path", &self.path)
            .field("status", &self.status)
            .field("histcount", &self.histcount)
            .field("cmd_buf", &self.cmd_buf)
            .field("readfd", &self.readfd)
            .finish_non_exhaustive()
    }
}
