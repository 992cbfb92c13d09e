//! Loading, capping and saving the session's command history.
//!
//! The history file lives at `$HOME/<history file>` and holds one command per line,
//! oldest first. History is optional: without `HOME`, or without a readable file, a
//! session simply starts with an empty history.

use crate::context::ExecutionContext;
use crate::list::{ListError, OrderedList};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Files smaller than this are treated as holding no history.
const MIN_FILE_SIZE: u64 = 2;

/// Permission bits of a newly created history file.
#[cfg(unix)]
const HISTORY_FILE_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history is disabled: HOME is not set")]
    Disabled,
    #[error("history file {} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("cannot access history file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Allocation(#[from] ListError),
}

impl HistoryError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Path of the history file, or `None` when `HOME` is not set.
pub fn locate_file(ctx: &ExecutionContext) -> Option<PathBuf> {
    let home = ctx.getenv("HOME")?;
    Some(PathBuf::from(format!(
        "{home}{MAIN_SEPARATOR}{}",
        ctx.config().history_file
    )))
}

/// Load the history file into the context's history.
///
/// Every failure is reported as zero entries; see [`load`] for the reason.
pub fn read(ctx: &mut ExecutionContext) -> usize {
    match load(ctx) {
        Ok(count) => count,
        Err(err @ (HistoryError::Disabled | HistoryError::NotFound(_))) => {
            debug!("no history loaded: {err}");
            0
        }
        Err(err) => {
            warn!("no history loaded: {err}");
            0
        }
    }
}

/// Load the history file, append its lines to the context's history, cap the result
/// and renumber it.
///
/// Returns the history size after renumbering. A file smaller than two bytes loads
/// nothing. On error the history is left as it was.
pub fn load(ctx: &mut ExecutionContext) -> Result<usize, HistoryError> {
    let path = locate_file(ctx).ok_or(HistoryError::Disabled)?;
    let mut file = File::open(&path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => HistoryError::NotFound(path.clone()),
        _ => HistoryError::io(&path)(source),
    })?;

    let size = file.metadata().map(|meta| meta.len()).unwrap_or(0);
    if size < MIN_FILE_SIZE {
        return Ok(0);
    }

    let mut buf = Vec::new();
    let capacity = usize::try_from(size).unwrap_or(usize::MAX);
    buf.try_reserve_exact(capacity)
        .map_err(|err| HistoryError::Allocation(err.into()))?;
    if file.read_to_end(&mut buf).map_err(HistoryError::io(&path))? == 0 {
        return Ok(0);
    }

    let mut loaded = OrderedList::new();
    let mut linecount = 0;
    for record in records(&buf) {
        loaded.insert_end_bytes(Some(record), linecount)?;
        linecount += 1;
    }
    drop(buf);

    ctx.history.append(&mut loaded);
    let max = ctx.config().history_max;
    let excess = (linecount + 1).saturating_sub(max);
    for _ in 0..excess {
        ctx.history.delete_at(0);
    }
    if excess > 0 {
        info!(dropped = excess, kept = max.saturating_sub(1), "history capped");
    }
    Ok(renumber(ctx))
}

/// Newline-separated records of `buf`; a final record needs no trailing newline.
fn records(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    let body = buf.strip_suffix(b"\n").unwrap_or(buf);
    body.split(|&byte| byte == b'\n')
}

/// Replace the history file with the context's history, one entry per line.
///
/// The file is only touched when `HOME` is set. An entry without text is written as
/// an empty line.
pub fn write(ctx: &ExecutionContext) -> Result<(), HistoryError> {
    let path = locate_file(ctx).ok_or(HistoryError::Disabled)?;
    let file = open_for_write(&path).map_err(HistoryError::io(&path))?;

    let mut out = BufWriter::new(file);
    let result: io::Result<()> = ctx.history.iter().try_for_each(|node| {
        out.write_all(node.bytes().unwrap_or_default())?;
        out.write_all(b"\n")
    });
    result.and_then(|()| out.flush()).map_err(HistoryError::io(&path))?;

    debug!(path = %path.display(), entries = ctx.histcount(), "history written");
    Ok(())
}

fn open_for_write(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(HISTORY_FILE_MODE);
    }
    options.open(path)
}

/// Number the history entries `0, 1, 2, …` in order and return the count.
pub fn renumber(ctx: &mut ExecutionContext) -> usize {
    let count = ctx.history.renumber();
    ctx.histcount = count;
    count
}

/// Record `line` as the newest history entry.
pub fn append_entry(ctx: &mut ExecutionContext, line: &str) -> Result<(), HistoryError> {
    let tag = ctx.histcount;
    ctx.history.insert_end(Some(line), tag)?;
    ctx.histcount += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::list::Node;
    use std::fs;
    use tempfile::TempDir;

    fn context(max: usize) -> ExecutionContext {
        let config = Config {
            history_max: max,
            ..Config::default()
        };
        ExecutionContext::new(config, Box::new(io::sink()))
    }

    fn context_in(home: &TempDir, max: usize) -> ExecutionContext {
        let mut ctx = context(max);
        ctx.setenv("HOME", home.path().to_str().unwrap()).unwrap();
        ctx
    }

    fn history_file(home: &TempDir) -> PathBuf {
        home.path().join(crate::config::HIST_FILE)
    }

    fn entries(ctx: &ExecutionContext) -> Vec<(usize, &str)> {
        ctx.history
            .iter()
            .map(|node: &Node| (node.tag(), node.text().unwrap_or_default()))
            .collect()
    }

    #[test]
    fn test_locate_file_uses_home() {
        let home = TempDir::new().unwrap();
        let ctx = context_in(&home, 10);

        assert_eq!(locate_file(&ctx), Some(history_file(&home)));
        assert_eq!(locate_file(&context(10)), None);
    }

    #[test]
    fn test_round_trip() {
        let home = TempDir::new().unwrap();
        let mut ctx = context_in(&home, 10);
        for line in ["ls", "pwd", "echo hi"] {
            append_entry(&mut ctx, line).unwrap();
        }
        write(&ctx).unwrap();
        assert_eq!(
            fs::read_to_string(history_file(&home)).unwrap(),
            "ls\npwd\necho hi\n"
        );

        let mut fresh = context_in(&home, 10);
        assert_eq!(read(&mut fresh), 3);
        assert_eq!(entries(&fresh), vec![(0, "ls"), (1, "pwd"), (2, "echo hi")]);
        assert_eq!(fresh.histcount(), 3);
    }

    #[test]
    fn test_last_line_without_newline() {
        let home = TempDir::new().unwrap();
        fs::write(history_file(&home), "ls\npwd\necho hi").unwrap();
        let mut ctx = context_in(&home, 10);

        assert_eq!(read(&mut ctx), 3);
        assert_eq!(entries(&ctx).last(), Some(&(2, "echo hi")));
    }

    #[test]
    fn test_non_utf8_bytes_survive_round_trip() {
        let home = TempDir::new().unwrap();
        let original = b"ls\necho \xff\xfe\n".to_vec();
        fs::write(history_file(&home), &original).unwrap();
        let mut ctx = context_in(&home, 10);

        assert_eq!(read(&mut ctx), 2);
        assert_eq!(ctx.history.iter().nth(1).unwrap().bytes(), Some(&b"echo \xff\xfe"[..]));
        write(&ctx).unwrap();

        assert_eq!(fs::read(history_file(&home)).unwrap(), original);
    }

    #[test]
    fn test_load_appends_to_existing_history() {
        let home = TempDir::new().unwrap();
        fs::write(history_file(&home), "a\nb\n").unwrap();
        let mut ctx = context_in(&home, 10);
        append_entry(&mut ctx, "x").unwrap();
        append_entry(&mut ctx, "y").unwrap();

        assert_eq!(read(&mut ctx), 4);
        assert_eq!(entries(&ctx), vec![(0, "x"), (1, "y"), (2, "a"), (3, "b")]);
        assert_eq!(ctx.histcount(), 4);
    }

    #[test]
    fn test_cap_counts_only_loaded_lines() {
        let home = TempDir::new().unwrap();
        fs::write(history_file(&home), "a\nb\nc\n").unwrap();
        let mut ctx = context_in(&home, 3);
        append_entry(&mut ctx, "x").unwrap();
        append_entry(&mut ctx, "y").unwrap();

        // Three loaded lines against a cap of three drop one node from the head.
        assert_eq!(read(&mut ctx), 4);
        assert_eq!(entries(&ctx), vec![(0, "y"), (1, "a"), (2, "b"), (3, "c")]);
    }

    #[test]
    fn test_blank_lines_are_entries() {
        let home = TempDir::new().unwrap();
        fs::write(history_file(&home), "ls\n\npwd\n").unwrap();
        let mut ctx = context_in(&home, 10);

        assert_eq!(read(&mut ctx), 3);
        assert_eq!(entries(&ctx), vec![(0, "ls"), (1, ""), (2, "pwd")]);
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let home = TempDir::new().unwrap();
        let lines: Vec<String> = (0..8).map(|i| format!("cmd{i}")).collect();
        fs::write(history_file(&home), lines.join("\n")).unwrap();
        let mut ctx = context_in(&home, 5);

        assert_eq!(read(&mut ctx), 4);
        assert_eq!(
            entries(&ctx),
            vec![(0, "cmd4"), (1, "cmd5"), (2, "cmd6"), (3, "cmd7")]
        );
    }

    #[test]
    fn test_cap_at_exact_maximum() {
        let home = TempDir::new().unwrap();
        fs::write(history_file(&home), "a\nb\nc\n").unwrap();
        let mut ctx = context_in(&home, 3);

        assert_eq!(read(&mut ctx), 2);
        assert_eq!(entries(&ctx), vec![(0, "b"), (1, "c")]);
    }

    #[test]
    fn test_below_cap_keeps_all() {
        let home = TempDir::new().unwrap();
        fs::write(history_file(&home), "a\nb\n").unwrap();
        let mut ctx = context_in(&home, 3);

        assert_eq!(read(&mut ctx), 2);
    }

    #[test]
    fn test_tiny_or_missing_file_is_empty() {
        let home = TempDir::new().unwrap();
        let mut ctx = context_in(&home, 10);
        assert_eq!(read(&mut ctx), 0);
        assert!(matches!(load(&mut ctx), Err(HistoryError::NotFound(_))));

        fs::write(history_file(&home), "x").unwrap();
        assert_eq!(read(&mut ctx), 0);
        assert!(ctx.history.is_empty());
    }

    #[test]
    fn test_disabled_without_home() {
        let mut ctx = context(10);
        ctx.history.insert_end(Some("ls"), 0).unwrap();

        assert_eq!(read(&mut ctx), 0);
        assert!(matches!(load(&mut ctx), Err(HistoryError::Disabled)));
        assert!(matches!(write(&ctx), Err(HistoryError::Disabled)));
        assert_eq!(ctx.history.len(), 1);
    }

    #[test]
    fn test_write_fails_when_home_is_missing() {
        let home = TempDir::new().unwrap();
        let mut ctx = context(10);
        let missing = home.path().join("gone");
        ctx.setenv("HOME", missing.to_str().unwrap()).unwrap();
        append_entry(&mut ctx, "ls").unwrap();

        assert!(matches!(write(&ctx), Err(HistoryError::Io { .. })));
    }

    #[test]
    fn test_write_truncates_and_renders_absent_text_empty() {
        let home = TempDir::new().unwrap();
        fs::write(history_file(&home), "old1\nold2\nold3\n").unwrap();
        let mut ctx = context_in(&home, 10);
        ctx.history.insert_end(None, 0).unwrap();
        ctx.history.insert_end(Some("new"), 1).unwrap();

        write(&ctx).unwrap();

        assert_eq!(fs::read_to_string(history_file(&home)).unwrap(), "\nnew\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_written_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let home = TempDir::new().unwrap();
        let mut ctx = context_in(&home, 10);
        append_entry(&mut ctx, "ls").unwrap();
        write(&ctx).unwrap();

        let mode = fs::metadata(history_file(&home)).unwrap().permissions().mode();
        assert_eq!(mode & 0o600, 0o600);
        assert_eq!(mode & 0o111, 0);
    }

    #[test]
    fn test_renumber_overwrites_tags() {
        let mut ctx = context(10);
        ctx.history.insert_end(Some("a"), 40).unwrap();
        ctx.history.insert_end(Some("b"), 7).unwrap();
        ctx.history.insert_front(Some("c"), 99).unwrap();

        assert_eq!(renumber(&mut ctx), 3);
        assert_eq!(entries(&ctx), vec![(0, "c"), (1, "a"), (2, "b")]);
        assert_eq!(ctx.histcount(), 3);
    }

    #[test]
    fn test_append_entry_uses_histcount() {
        let mut ctx = context(10);
        append_entry(&mut ctx, "ls").unwrap();
        append_entry(&mut ctx, "pwd").unwrap();

        assert_eq!(entries(&ctx), vec![(0, "ls"), (1, "pwd")]);
        assert_eq!(ctx.histcount(), 2);
    }
}
