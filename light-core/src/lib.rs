//! # Light Core - syslog-ng functional test harness
//!
//! Light drives a real syslog-ng daemon as a black box:
//!
//! - **Config model**: build a configuration out of typed statements and log
//!   paths, render it to the daemon's text grammar
//! - **Driver I/O**: feed sources and read destinations over files, TCP/UDP,
//!   Unix sockets or an MQTT broker
//! - **Process control**: start, reload and stop the daemon, talk to its
//!   control socket and parse its counters
//!
//! ```text
//!            TestCase
//!   ┌───────────┼──────────────────────┐
//!   ▼           ▼                      ▼
//! ResourceRegistry   ConfigDocument ──render──▶ syslog-ng.conf
//!   (paths, ports)     │                           │
//!                      ├─ SourceDriver ──write──▶  │  DaemonController ── ControlClient
//!                      └─ DestinationDriver ◀─read─┘    (NotStarted/Running/Stopped)
//!                              │
//!                          LineReader ◀── DriverIo (file | socket | mqtt)
//! ```
//!
//! ## Core Principle
//!
//! > Every wait is bounded.
//!
//! The daemon offers no notification hooks, so the harness polls. A poll that
//! runs out of time yields `false` or a partial result; the test decides
//! whether that is a failure.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use light_core::{ConfigDocument, FileDestinationOptions, FileSourceOptions, HarnessConfig, ResourceRegistry};
//!
//! # fn main() -> light_core::Result<()> {
//! let config = HarnessConfig::default();
//! let registry = Arc::new(ResourceRegistry::new(&config.working_dir)?);
//! let mut doc = ConfigDocument::new(registry, &config);
//!
//! let source = doc.file_source(FileSourceOptions::new().follow_freq(1))?;
//! let destination = doc.file_destination(FileDestinationOptions::new())?;
//! doc.create_logpath([source.id(), destination.id()])?;
//!
//! let rendered = doc.render()?;
//! assert!(rendered.starts_with("@version: 4.0"));
//! assert!(rendered.contains("follow-freq(1)"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod ctl;
pub mod daemon;
pub mod error;
pub mod io;
pub mod message;
pub mod reader;
pub mod registry;
pub mod syslog_ng_config;
pub mod testcase;
pub mod timing;

// Re-export main types
pub use config::{ConsoleConfig, HarnessConfig, MqttConfig, PollConfig};
pub use ctl::{CommandOutput, ControlClient, QueryMode, StatCounter, StatsSnapshot};
pub use daemon::{DaemonController, DaemonHandle, ProcessState, StopOutcome};
pub use error::{ErrorCategory, LightError, Result};
pub use io::{DriverIo, FileIo, IoStats, SocketKind};
pub use message::{format_message, LogMessageFields, MessageFormat, MessageGenerator};
pub use reader::LineReader;
pub use registry::ResourceRegistry;
pub use syslog_ng_config::{
    ConfigDocument, DestinationDriver, FileDestinationOptions, FileSourceOptions, LogPath, LogPathFlag,
    NetworkOptions, OptionValue, SourceDriver, Statement, StatementId, StatementKind, UnixSocketOptions,
};
pub use testcase::{Teardown, TestCase};
pub use timing::Poller;
