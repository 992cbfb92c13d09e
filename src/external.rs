use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::context::ExecutionContext;
use crate::interpreter::Factory;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tracing::debug;

/// Command that is not a builtin.
pub struct ExternalCommand {
    path: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(path: PathBuf, args: Vec<OsString>) -> Self {
        Self { path, args }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let search_paths = ctx.getenv("PATH").unwrap_or_default();
        let executable = find_command_path(OsStr::new(search_paths), Path::new(name))?;
        Some(Box::new(ExternalCommand::new(
            executable.into_owned(),
            args.iter().map(OsString::from).collect(),
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        ctx: &mut ExecutionContext,
        stdout: &mut dyn Write,
    ) -> Result<ExitCode> {
        // The child writes straight to the terminal, after anything we buffered.
        stdout.flush()?;
        ctx.set_path(Some(self.path.clone()));

        let vars: Vec<(String, String)> = ctx
            .environ()
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        debug!(path = %self.path.display(), "spawning");

        let mut child = std::process::Command::new(&self.path)
            .args(&self.args)
            .env_clear()
            .envs(vars)
            .spawn()
            .with_context(|| format!("cannot run {}", self.path.display()))?;
        let exit_status = child.wait()?;
        match exit_status.code() {
            Some(x) => Ok(x),
            None => Ok(terminated_by_signal(exit_status)),
        }
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is a regular file.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it is a regular file.
/// - `./foo` on Unix, or any relative path on other platforms: returns it if it is a
///   regular file in the current directory.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first regular file found.
/// - Empty path: returns `None`.
///
/// Directories never resolve.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.is_file() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|path| path.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}
