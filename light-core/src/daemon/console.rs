//! Console log of a running daemon
//!
//! The daemon's stderr capture is read line by line through a
//! [`LineReader`]. Waiting for a banner consumes the lines before it, so
//! consecutive waits (start, reload, stop) see only newer output.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::error::{LightError, Result};
use crate::io::FileIo;
use crate::reader::LineReader;
use crate::timing::Poller;

pub const START_MESSAGE: &str = "syslog-ng starting up";
pub const RELOAD_MESSAGE: &str = "New configuration initialized";
pub const STOP_MESSAGE: &str = "syslog-ng shutting down";

/// Substrings that mark a console line as suspicious (case-insensitive)
pub const UNEXPECTED_MARKERS: [&str; 5] = ["error", "warning", "critical", "plugin module not found", "assertion"];

#[derive(Debug)]
pub struct ConsoleLogReader {
    stderr_path: PathBuf,
    reader: LineReader<FileIo>,
}

impl ConsoleLogReader {
    pub fn new(stderr_path: impl Into<PathBuf>, poller: Poller) -> Self {
        let stderr_path = stderr_path.into();
        Self {
            reader: LineReader::new(FileIo::new(stderr_path.clone(), poller), poller),
            stderr_path,
        }
    }

    pub fn stderr_path(&self) -> &Path {
        &self.stderr_path
    }

    /// First unread line containing `pattern`
    pub fn wait_for_message(&mut self, pattern: &str) -> Result<Option<String>> {
        self.reader.wait_for_line(|line| line.contains(pattern))
    }

    /// Wait for each pattern in turn; returns the matching lines found
    pub fn wait_for_messages(&mut self, patterns: &[&str]) -> Result<Vec<String>> {
        let mut found = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            match self.wait_for_message(pattern)? {
                Some(line) => found.push(line),
                None => break,
            }
        }
        Ok(found)
    }

    pub fn wait_for_start_message(&mut self) -> Result<bool> {
        Ok(self.wait_for_message(START_MESSAGE)?.is_some())
    }

    pub fn wait_for_reload_message(&mut self) -> Result<bool> {
        Ok(self.wait_for_message(RELOAD_MESSAGE)?.is_some())
    }

    pub fn wait_for_stop_message(&mut self) -> Result<bool> {
        Ok(self.wait_for_message(STOP_MESSAGE)?.is_some())
    }

    /// Scan the whole capture for suspicious lines
    ///
    /// A line matches if it contains one of [`UNEXPECTED_MARKERS`] or one of
    /// `extra`, and none of `whitelist`.
    pub fn check_for_unexpected_messages(&self, extra: &[&str], whitelist: &[&str]) -> Result<()> {
        let content = read_capture(&self.stderr_path)?;
        let unexpected: Vec<String> = content
            .lines()
            .filter(|line| {
                let lower = line.to_lowercase();
                let suspicious = UNEXPECTED_MARKERS.iter().any(|m| lower.contains(m))
                    || extra.iter().any(|m| line.contains(m));
                suspicious && !whitelist.iter().any(|w| line.contains(w))
            })
            .map(str::to_string)
            .collect();
        if unexpected.is_empty() {
            Ok(())
        } else {
            for line in &unexpected {
                error!(%line, "unexpected console message");
            }
            Err(LightError::UnexpectedConsoleMessages { lines: unexpected })
        }
    }

    /// Log the whole capture and return it
    pub fn dump_stderr(&self) -> String {
        dump_capture(&self.stderr_path)
    }
}

fn read_capture(path: &Path) -> Result<String> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// Log a capture file at info level and return its content
pub(crate) fn dump_capture(path: &Path) -> String {
    let content = read_capture(path).unwrap_or_default();
    info!(path = %path.display(), "captured output\n{content}");
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn reader(path: &Path) -> ConsoleLogReader {
        ConsoleLogReader::new(path, Poller::new(Duration::from_millis(1), Duration::from_millis(50)))
    }

    #[test]
    fn test_banners_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stderr.log");
        std::fs::write(&path, "[debug] module loaded\nsyslog-ng starting up; version='4.0'\n").unwrap();
        let mut console = reader(&path);
        assert!(console.wait_for_start_message().unwrap());
        assert!(!console.wait_for_reload_message().unwrap());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "New configuration initialized").unwrap();
        writeln!(file, "syslog-ng shutting down; version='4.0'").unwrap();
        assert!(console.wait_for_reload_message().unwrap());
        assert!(console.wait_for_stop_message().unwrap());
    }

    #[test]
    fn test_unexpected_messages_and_whitelist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stderr.log");
        std::fs::write(
            &path,
            "syslog-ng starting up\nError opening file for reading; filename='/x'\nWARNING: deprecated option\n",
        )
        .unwrap();
        let console = reader(&path);
        let err = console.check_for_unexpected_messages(&[], &[]).unwrap_err();
        match err {
            LightError::UnexpectedConsoleMessages { lines } => assert_eq!(lines.len(), 2),
            other => panic!("unexpected error {other}"),
        }
        assert!(console
            .check_for_unexpected_messages(&[], &["Error opening file", "deprecated"])
            .is_ok());
        assert!(console
            .check_for_unexpected_messages(&["starting up"], &["Error", "deprecated"])
            .is_err());
    }

    #[test]
    fn test_missing_capture_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let console = reader(&dir.path().join("none.log"));
        assert!(console.check_for_unexpected_messages(&[], &[]).is_ok());
        assert!(console.dump_stderr().is_empty());
    }
}
