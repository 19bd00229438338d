//! File backend
//!
//! The writer keeps one append handle open across calls. The reader keeps its
//! own handle and position, so each [`read`](DriverIo::read) returns only what
//! the daemon appended since the previous call.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::{DriverIo, IoStats};
use crate::error::{LightError, Result};
use crate::timing::Poller;

#[derive(Debug)]
pub struct FileIo {
    path: PathBuf,
    poller: Poller,
    writer: Option<File>,
    reader: Option<File>,
    stats: IoStats,
}

impl FileIo {
    pub fn new(path: impl Into<PathBuf>, poller: Poller) -> Self {
        Self {
            path: path.into(),
            poller,
            writer: None,
            reader: None,
            stats: IoStats::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Drop both handles; the next call reopens them
    ///
    /// A reopened reader starts again at offset zero.
    pub fn close(&mut self) {
        self.writer = None;
        self.reader = None;
    }

    /// Whole file content, independent of the reader position
    pub fn read_whole(&self) -> Result<Vec<u8>> {
        match std::fs::read(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn writer(&mut self) -> Result<&mut File> {
        if self.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| LightError::transport(self.path.display().to_string(), e))?;
            debug!(path = %self.path.display(), "opened file for append");
            self.writer = Some(file);
        }
        self.writer
            .as_mut()
            .ok_or_else(|| LightError::transport(self.path.display().to_string(), "writer closed"))
    }
}

impl DriverIo for FileIo {
    fn name(&self) -> &str {
        "file"
    }

    fn write(&mut self, content: &[u8]) -> Result<()> {
        let file = self.writer()?;
        file.write_all(content)?;
        file.flush()?;
        self.stats.record_write(content.len());
        Ok(())
    }

    fn wait_for_creation(&mut self) -> bool {
        let path = &self.path;
        let created = self.poller.wait_until_true(|| path.exists());
        if !created {
            debug!(path = %path.display(), "file was not created in time");
        }
        created
    }

    /// Missing file reads as empty; the daemon may not have created it yet
    fn read(&mut self) -> Result<Vec<u8>> {
        if self.reader.is_none() {
            match File::open(&self.path) {
                Ok(file) => self.reader = Some(file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
        }
        let mut chunk = Vec::new();
        if let Some(reader) = self.reader.as_mut() {
            reader.read_to_end(&mut chunk)?;
        }
        if !chunk.is_empty() {
            trace!(path = %self.path.display(), bytes = chunk.len(), "read from file");
            self.stats.record_read(chunk.len());
        }
        Ok(chunk)
    }

    fn get_stats(&self) -> IoStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quick_poller() -> Poller {
        Poller::new(Duration::from_millis(1), Duration::from_millis(50))
    }

    #[test]
    fn test_write_appends_and_reader_advances() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = FileIo::new(dir.path().join("out.log"), quick_poller());

        io.write(b"first\n").unwrap();
        assert_eq!(io.read().unwrap(), b"first\n");
        assert!(io.read().unwrap().is_empty());

        io.write(b"second\n").unwrap();
        assert_eq!(io.read().unwrap(), b"second\n");

        let stats = io.get_stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.bytes_written, 13);
        assert_eq!(stats.reads, 2);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = FileIo::new(dir.path().join("missing.log"), quick_poller());
        assert!(io.read().unwrap().is_empty());
        assert!(io.read_whole().unwrap().is_empty());
    }

    #[test]
    fn test_wait_for_creation_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = FileIo::new(dir.path().join("never.log"), quick_poller());
        assert!(!io.wait_for_creation());
    }

    #[test]
    fn test_wait_for_creation_sees_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("there.log");
        std::fs::write(&path, "x").unwrap();
        let mut io = FileIo::new(path, quick_poller());
        assert!(io.wait_for_creation());
    }

    #[test]
    fn test_close_rewinds_reader() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = FileIo::new(dir.path().join("f.log"), quick_poller());
        io.write(b"line\n").unwrap();
        assert_eq!(io.read().unwrap(), b"line\n");
        io.close();
        assert_eq!(io.read().unwrap(), b"line\n");
    }
}
