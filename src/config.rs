/// Name of the history file, relative to `$HOME`.
pub const HIST_FILE: &str = ".simple_shell_history";

/// Maximum retained history size. A load that meets this keeps `HIST_MAX - 1` entries.
pub const HIST_MAX: usize = 4096;

/// Session settings that do not change once the interpreter starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// File name joined onto `$HOME` to locate the history file.
    pub history_file: String,
    /// Cap applied when loading history.
    pub history_max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_file: HIST_FILE.to_string(),
            history_max: HIST_MAX,
        }
    }
}
