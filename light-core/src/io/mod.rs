//! Driver I/O backends
//!
//! Every transport the daemon can read from or write to has a backend here.
//! All of them implement [`DriverIo`], so test code and the
//! [`LineReader`](crate::reader::LineReader) treat a file, a socket listener
//! and a broker subscription the same way.
//!
//! ```text
//!                 ┌──────────────────────────┐
//!                 │     DriverIo (trait)     │
//!                 │ write / read / wait /    │
//!                 │ get_stats                │
//!                 └────────────┬─────────────┘
//!        ┌───────────────┬─────┴─────────┬────────────────┐
//!        ▼               ▼               ▼                ▼
//!     FileIo       SocketSender    SocketListener      MqttIo
//!  (append/read)  (tcp/udp/unix)   (tcp/udp/unix)   (publish/subscribe)
//! ```
//!
//! A backend that cannot perform an operation returns
//! [`LightError::UnsupportedOperation`]. `wait_for_creation` never raises: it
//! reports `false` once its poll deadline passes.

pub mod file;
pub mod socket;
#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use file::FileIo;
pub use socket::{SocketAddress, SocketKind, SocketListener, SocketSender, ListenerStop};
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttIo, MqttRole};

use serde::{Deserialize, Serialize};

use crate::error::{LightError, Result};

/// Per-backend traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoStats {
    pub writes: u64,
    pub bytes_written: u64,
    pub reads: u64,
    pub bytes_read: u64,
}

impl IoStats {
    pub(crate) fn record_write(&mut self, bytes: usize) {
        self.writes += 1;
        self.bytes_written += bytes as u64;
    }

    pub(crate) fn record_read(&mut self, bytes: usize) {
        self.reads += 1;
        self.bytes_read += bytes as u64;
    }
}

/// Byte-oriented I/O against one daemon endpoint
pub trait DriverIo: Send + std::fmt::Debug {
    /// Backend name (for logging and errors)
    fn name(&self) -> &str;

    /// Deliver `content` completely
    fn write(&mut self, content: &[u8]) -> Result<()> {
        let _ = content;
        Err(LightError::unsupported(self.name(), "write"))
    }

    /// Wait until the endpoint exists; `false` on timeout
    fn wait_for_creation(&mut self) -> bool {
        true
    }

    /// Everything that arrived since the previous call (possibly empty)
    fn read(&mut self) -> Result<Vec<u8>> {
        Err(LightError::unsupported(self.name(), "read"))
    }

    /// Traffic counters
    fn get_stats(&self) -> IoStats;
}

impl<T: DriverIo + ?Sized> DriverIo for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write(&mut self, content: &[u8]) -> Result<()> {
        (**self).write(content)
    }

    fn wait_for_creation(&mut self) -> bool {
        (**self).wait_for_creation()
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        (**self).read()
    }

    fn get_stats(&self) -> IoStats {
        (**self).get_stats()
    }
}
