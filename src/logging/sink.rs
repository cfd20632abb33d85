//! The audit log sink shared by the reporter and the tracing file layer.
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context as _, Result};

use super::utils::{format_timestamp, separator, strip_ansi};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// An in-memory writer whose contents can be inspected after the fact.
///
/// Used as the user channel or log sink in tests.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        let guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&guard).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The verbose audit log.
///
/// Cheap to clone: all clones append to the same underlying writer. Every
/// event line is prefixed with `[YYYY-MM-DD HH:MM:SS]` and stripped of ANSI
/// codes; command output is written verbatim, indented.
#[derive(Clone)]
pub struct LogSink {
    path: Option<PathBuf>,
    writer: SharedWriter,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("path", &self.path)
            .field("writer", &"<dyn Write>")
            .finish()
    }
}

impl LogSink {
    /// Create (or truncate) the log file at `path` and write the run header.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the file
    /// cannot be opened for writing.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("creating log file {}", path.display()))?;
        let path = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let sink = Self {
            path: Some(path),
            writer: Arc::new(Mutex::new(Box::new(file))),
        };
        sink.header();
        Ok(sink)
    }

    /// Create a sink writing into an in-memory buffer.
    #[must_use]
    pub fn memory(buffer: SharedBuffer) -> Self {
        Self {
            path: None,
            writer: Arc::new(Mutex::new(Box::new(buffer))),
        }
    }

    /// Location of the log file, if it is backed by one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Human-readable destination for messages pointing at the log.
    #[must_use]
    pub fn describe(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(|| "<memory>".to_string(), |p| p.display().to_string())
    }

    /// Append a timestamped `[TAG] message` event line.
    pub fn event(&self, tag: &str, msg: &str) {
        let clean = strip_ansi(msg);
        self.write_raw(&format!("[{}] [{tag}] {clean}", format_timestamp()));
    }

    /// Append captured command output, one indented line per output line.
    pub fn output(&self, stream: &str, text: &str) {
        let text = text.trim_end();
        if text.is_empty() {
            return;
        }
        self.write_raw(&format!("[{}] [{stream}]", format_timestamp()));
        for line in text.lines() {
            self.write_raw(&format!("    {}", strip_ansi(line)));
        }
    }

    /// Start a new section: separator, timestamped title, separator.
    pub fn section(&self, title: &str) {
        self.write_raw(&separator());
        self.write_raw(&format!("[{}] {}", format_timestamp(), strip_ansi(title)));
        self.write_raw(&separator());
    }

    /// Flush buffered output to the destination.
    pub fn flush(&self) {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        guard.flush().ok();
    }

    fn header(&self) {
        let version = option_env!("BOOTSTRAP_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
        self.section(&format!("dotfiles-bootstrap {version}"));
    }

    fn write_raw(&self, line: &str) {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(guard, "{line}").ok();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn event_lines_are_timestamped_and_tagged() {
        let buffer = SharedBuffer::new();
        let sink = LogSink::memory(buffer.clone());
        sink.event("INFO", "hello");
        let contents = buffer.contents();
        let line = contents.lines().next().unwrap();
        assert!(line.starts_with('['), "line should start with timestamp: {line}");
        assert_eq!(&line[20..21], "]");
        assert!(line.ends_with("[INFO] hello"));
    }

    #[test]
    fn event_strips_ansi() {
        let buffer = SharedBuffer::new();
        let sink = LogSink::memory(buffer.clone());
        sink.event("ERROR", "\x1b[31mbad\x1b[0m");
        assert!(buffer.contents().contains("[ERROR] bad"));
        assert!(!buffer.contents().contains('\x1b'));
    }

    #[test]
    fn output_is_indented_and_empty_output_skipped() {
        let buffer = SharedBuffer::new();
        let sink = LogSink::memory(buffer.clone());
        sink.output("STDOUT", "");
        assert!(buffer.contents().is_empty());
        sink.output("STDOUT", "line one\nline two\n");
        let contents = buffer.contents();
        assert!(contents.contains("[STDOUT]"));
        assert!(contents.contains("    line one\n"));
        assert!(contents.contains("    line two\n"));
    }

    #[test]
    fn section_is_wrapped_in_separators() {
        let buffer = SharedBuffer::new();
        let sink = LogSink::memory(buffer.clone());
        sink.section("Detecting platform");
        let lines: Vec<String> = buffer.contents().lines().map(str::to_string).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], separator());
        assert!(lines[1].ends_with("Detecting platform"));
        assert_eq!(lines[2], separator());
    }

    #[test]
    fn clones_share_the_same_writer() {
        let buffer = SharedBuffer::new();
        let sink = LogSink::memory(buffer.clone());
        let other = sink.clone();
        sink.event("INFO", "first");
        other.event("INFO", "second");
        let contents = buffer.contents();
        assert!(contents.contains("first"));
        assert!(contents.contains("second"));
    }

    #[test]
    fn create_writes_header_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/bootstrap.log");
        let sink = LogSink::create(&path).unwrap();
        sink.event("INFO", "marker");
        sink.flush();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("dotfiles-bootstrap"));
        assert!(contents.contains("marker"));
        assert!(sink.path().is_some());
    }

    #[test]
    fn create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.log");
        fs::write(&path, "stale contents\n").unwrap();
        let sink = LogSink::create(&path).unwrap();
        sink.flush();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stale contents"));
    }

    #[test]
    fn memory_sink_describes_itself() {
        let sink = LogSink::memory(SharedBuffer::new());
        assert_eq!(sink.describe(), "<memory>");
        assert!(sink.path().is_none());
    }
}
