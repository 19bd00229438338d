//! Daemon process control
//!
//! ```text
//! ┌──────────────────────┐  start/stop/reload  ┌────────────────┐
//! │   DaemonController   │────────────────────▶│  syslog-ng     │
//! │  (ProcessState FSM)  │                     │  (child proc)  │
//! └──────┬─────────┬─────┘                     └──┬──────────┬──┘
//!        │         │ ControlClient (syslog-ng-ctl)│          │ stderr
//!        │         └─────────────────────────────▶│          ▼
//!        │                                        │   ConsoleLogReader
//!        └── Executor (argv, external tool) ──────┘
//! ```
//!
//! All files of one instance live in the registry's run directory, see
//! [`InstancePaths`].

pub mod console;
pub mod controller;
pub mod executor;
pub mod paths;

pub use console::{ConsoleLogReader, RELOAD_MESSAGE, START_MESSAGE, STOP_MESSAGE};
pub use controller::{find_core_files, DaemonController, DaemonHandle, ProcessState, StopOutcome};
pub use executor::{Executor, StartParams};
pub use paths::InstancePaths;
