//! Line framing on top of a [`DriverIo`]
//!
//! Backends return raw bytes in whatever chunks the transport produced. The
//! reader accumulates them, cuts complete lines at the delimiter and queues
//! them. A trailing partial line stays buffered until its delimiter arrives.

use std::collections::VecDeque;

use crate::error::Result;
use crate::io::DriverIo;
use crate::timing::Poller;

pub const DEFAULT_DELIMITER: &[u8] = b"\n";

#[derive(Debug)]
pub struct LineReader<S: DriverIo> {
    source: S,
    poller: Poller,
    delimiter: Vec<u8>,
    keep_delimiter: bool,
    buffer: Vec<u8>,
    lines: VecDeque<String>,
}

impl<S: DriverIo> LineReader<S> {
    pub fn new(source: S, poller: Poller) -> Self {
        Self {
            source,
            poller,
            delimiter: DEFAULT_DELIMITER.to_vec(),
            keep_delimiter: false,
            buffer: Vec::new(),
            lines: VecDeque::new(),
        }
    }

    /// Split on `delimiter` instead of `\n`; an empty delimiter is ignored
    pub fn with_delimiter(mut self, delimiter: impl AsRef<[u8]>) -> Self {
        if !delimiter.as_ref().is_empty() {
            self.delimiter = delimiter.as_ref().to_vec();
        }
        self
    }

    /// Keep the delimiter at the end of every returned line
    pub fn keep_delimiter(mut self, keep: bool) -> Self {
        self.keep_delimiter = keep;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn poller(&self) -> Poller {
        self.poller
    }

    /// Bytes received after the last delimiter
    pub fn partial(&self) -> &[u8] {
        &self.buffer
    }

    /// Complete lines queued and not yet popped
    pub fn queued(&self) -> usize {
        self.lines.len()
    }

    /// Read once from the source and queue every complete line
    pub fn buffer_and_parse(&mut self) -> Result<()> {
        let chunk = self.source.read()?;
        if chunk.is_empty() {
            return Ok(());
        }
        self.buffer.extend_from_slice(&chunk);

        let width = self.delimiter.len();
        let mut start = 0;
        let mut cursor = 0;
        while cursor + width <= self.buffer.len() {
            if self.buffer[cursor..cursor + width] == self.delimiter[..] {
                let end = if self.keep_delimiter { cursor + width } else { cursor };
                self.lines
                    .push_back(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
                cursor += width;
                start = cursor;
            } else {
                cursor += 1;
            }
        }
        self.buffer.drain(..start);
        Ok(())
    }

    /// Poll until `count` lines are queued; returns whether that happened
    fn fill(&mut self, count: usize) -> Result<bool> {
        if self.lines.len() >= count {
            return Ok(true);
        }
        let poller = self.poller;
        let outcome = poller.poll(|| match self.buffer_and_parse() {
            Err(e) => Some(Err(e)),
            Ok(()) if self.lines.len() >= count => Some(Ok(())),
            Ok(()) => None,
        });
        match outcome {
            Some(Err(e)) => Err(e),
            Some(Ok(())) => Ok(true),
            None => Ok(false),
        }
    }

    /// Remove and return up to `count` lines
    ///
    /// Waits until `count` lines are available or the poll deadline passes,
    /// then returns whatever is queued (possibly fewer). `count == 0`
    /// returns immediately with nothing.
    pub fn pop_messages(&mut self, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.fill(count)?;
        let take = count.min(self.lines.len());
        Ok(self.lines.drain(..take).collect())
    }

    /// Like [`pop_messages`](Self::pop_messages) but leaves the lines queued
    pub fn peek_messages(&mut self, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.fill(count)?;
        Ok(self.lines.iter().take(count).cloned().collect())
    }

    /// Everything available right now, without waiting
    pub fn pop_all(&mut self) -> Result<Vec<String>> {
        self.buffer_and_parse()?;
        Ok(self.lines.drain(..).collect())
    }

    /// Consume lines until one satisfies `matches`
    ///
    /// Lines before the match are discarded. `None` if nothing matched
    /// before the deadline; the lines read so far are consumed either way.
    pub fn wait_for_line(&mut self, mut matches: impl FnMut(&str) -> bool) -> Result<Option<String>> {
        let poller = self.poller;
        let outcome = poller.poll(|| {
            if let Err(e) = self.buffer_and_parse() {
                return Some(Err(e));
            }
            while let Some(line) = self.lines.pop_front() {
                if matches(&line) {
                    return Some(Ok(line));
                }
            }
            None
        });
        outcome.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::IoStats;
    use std::time::Duration;

    /// Hands out one scripted chunk per read
    #[derive(Debug)]
    struct Scripted {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Scripted {
        fn new(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            }
        }
    }

    impl DriverIo for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn read(&mut self) -> Result<Vec<u8>> {
            Ok(self.chunks.pop_front().unwrap_or_default())
        }

        fn get_stats(&self) -> IoStats {
            IoStats::default()
        }
    }

    fn reader(chunks: &[&str]) -> LineReader<Scripted> {
        LineReader::new(
            Scripted::new(chunks),
            Poller::new(Duration::from_millis(1), Duration::from_millis(50)),
        )
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let mut r = reader(&["mes", "sage 1\nmessage", " 2\n"]);
        assert_eq!(r.pop_messages(2).unwrap(), vec!["message 1", "message 2"]);
        assert!(r.partial().is_empty());
    }

    #[test]
    fn test_partial_line_stays_buffered() {
        let mut r = reader(&["one\ntw"]);
        assert_eq!(r.pop_messages(2).unwrap(), vec!["one"]);
        assert_eq!(r.partial(), b"tw");
    }

    #[test]
    fn test_zero_count_returns_nothing() {
        let mut r = reader(&["a\n"]);
        assert!(r.pop_messages(0).unwrap().is_empty());
        assert_eq!(r.queued(), 0);
    }

    #[test]
    fn test_fewer_than_requested_after_timeout() {
        let mut r = reader(&["a\nb\n"]);
        assert_eq!(r.pop_messages(5).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut r = reader(&["x\ny\n"]);
        assert_eq!(r.peek_messages(1).unwrap(), vec!["x"]);
        assert_eq!(r.pop_messages(2).unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_custom_delimiter_kept() {
        let mut r = reader(&["a\r\nb\r", "\n"]).with_delimiter("\r\n").keep_delimiter(true);
        assert_eq!(r.pop_messages(2).unwrap(), vec!["a\r\n", "b\r\n"]);
    }

    #[test]
    fn test_pop_all_does_not_wait() {
        let mut r = reader(&["a\nb\nc"]);
        assert_eq!(r.pop_all().unwrap(), vec!["a", "b"]);
        assert_eq!(r.partial(), b"c");
    }

    #[test]
    fn test_wait_for_line_skips_earlier_lines() {
        let mut r = reader(&["noise\n", "syslog-ng starting up\n", "after\n"]);
        let found = r.wait_for_line(|l| l.contains("starting up")).unwrap();
        assert_eq!(found.as_deref(), Some("syslog-ng starting up"));
        assert_eq!(r.pop_messages(1).unwrap(), vec!["after"]);
    }

    #[test]
    fn test_wait_for_line_times_out() {
        let mut r = reader(&["noise\n"]);
        assert!(r.wait_for_line(|l| l == "never").unwrap().is_none());
    }
}
