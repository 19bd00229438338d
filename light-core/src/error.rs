//! Error types for Light operations
//!
//! Every failure the harness can report is a [`LightError`] variant. Each
//! variant belongs to an [`ErrorCategory`] that mirrors how a test should
//! react to it:
//!
//! - `Setup` errors abort the test immediately (a daemon that never came up
//!   invalidates every later assertion).
//! - `Timing` errors are the hard-error form of an exhausted poll. Most
//!   wait functions return `bool` or a partial result instead, so these only
//!   appear when a caller explicitly asked for one.
//! - `Protocol` errors are bugs in the harness or in the test itself
//!   (malformed stats output, a statement wired twice).
//! - `State` errors reject invalid process-controller transitions.
//! - `Io` errors come from the transports.
//!
//! # Example
//!
//! ```rust
//! use light_core::error::{ErrorCategory, LightError};
//!
//! let err = LightError::MalformedStats { line: "garbage".to_string() };
//! assert_eq!(err.category(), ErrorCategory::Protocol);
//! assert_eq!(err.error_code(), "MALFORMED_STATS");
//! assert!(!err.is_recoverable());
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Light operations
pub type Result<T> = std::result::Result<T, LightError>;

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Environment or allocation problem, fatal for the test
    Setup,
    /// A bounded wait ran out of time
    Timing,
    /// Harness or test misuse, malformed daemon output
    Protocol,
    /// Invalid daemon lifecycle transition
    State,
    /// Transport failure
    Io,
    /// Should not happen
    Internal,
}

/// Errors that can occur while driving a syslog-ng instance
#[derive(Error, Debug)]
pub enum LightError {
    // ═══════════════════════════════════════════════════════════════════════
    // Setup errors (resource allocation, configuration, daemon start)
    // ═══════════════════════════════════════════════════════════════════════

    /// A unique path could not be produced
    #[error("Failed to allocate '{path}': {reason}")]
    AllocationFailed { path: PathBuf, reason: String },

    /// Every port in the dynamic range has already been issued
    #[error("Port range {low}-{high} exhausted. Too many ports issued by one registry.")]
    PortRangeExhausted { low: u16, high: u16 },

    /// Harness configuration file could not be loaded
    #[error("Failed to load harness config from '{path}': {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    /// A helper binary could not be spawned
    #[error("Failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    /// `--syntax-only` rejected the generated configuration
    #[error("syslog-ng syntax error. See {} for details", stderr_path.display())]
    SyntaxError { stderr_path: PathBuf },

    /// The control socket never answered after start or reload
    #[error("Control socket '{}' not alive after {timeout_ms} ms", path.display())]
    ControlSocketNotAlive { path: PathBuf, timeout_ms: u64 },

    /// The daemon exited while it was expected to run
    #[error("syslog-ng crashed: {detail}")]
    DaemonCrashed { detail: String },

    /// Daemon output could not be understood during startup probing
    #[error("Cannot parse '{what}' from syslog-ng output")]
    VersionProbe { what: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Timing errors (bounded waits)
    // ═══════════════════════════════════════════════════════════════════════

    /// The daemon was still alive after the stop command
    #[error("syslog-ng (pid {pid}) did not stop within {timeout_ms} ms")]
    StopTimeout { pid: u32, timeout_ms: u64 },

    /// A console banner never appeared
    #[error("Timed out after {timeout_ms} ms waiting for {what}")]
    WaitTimeout { what: String, timeout_ms: u64 },

    // ═══════════════════════════════════════════════════════════════════════
    // Protocol errors (harness misuse, malformed output)
    // ═══════════════════════════════════════════════════════════════════════

    /// A statement already represents a different driver
    #[error("Statement '{statement}' already has driver '{existing}', cannot connect '{requested}'")]
    DriverAlreadyAssigned {
        statement: String,
        existing: String,
        requested: String,
    },

    /// Statement id is not part of the document
    #[error("Statement not found: '{statement}'")]
    StatementNotFound { statement: String },

    /// Log path failed validation before rendering
    #[error("Invalid log path: {reason}")]
    InvalidLogPath { reason: String },

    /// Statement without a driver cannot be rendered
    #[error("Statement '{statement}' has no driver connected")]
    EmptyStatement { statement: String },

    /// Stats line did not match any known layout
    #[error("Malformed stats line: '{line}'")]
    MalformedStats { line: String },

    /// Operation not offered by this transport
    #[error("Operation '{operation}' is not supported by the {kind} backend")]
    UnsupportedOperation { kind: String, operation: String },

    /// Console log contained error-level lines
    #[error("Unexpected messages in console log: {lines:?}")]
    UnexpectedConsoleMessages { lines: Vec<String> },

    /// JSON serialization or deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ═══════════════════════════════════════════════════════════════════════
    // State errors (process lifecycle)
    // ═══════════════════════════════════════════════════════════════════════

    /// Operation not allowed in the current lifecycle state
    #[error("Cannot {operation} syslog-ng: process is {state}")]
    InvalidTransition { operation: String, state: String },

    // ═══════════════════════════════════════════════════════════════════════
    // I/O errors (transports, helper commands)
    // ═══════════════════════════════════════════════════════════════════════

    /// Control tool returned a failure
    #[error("'{command}' failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// Socket or broker transport failure
    #[error("Transport error on {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared state lock is poisoned (a thread panicked while holding it)
    #[error("Registry lock poisoned. This is a bug; please report it.")]
    LockPoisoned,

    /// A built-in pattern failed to compile
    #[error("Invalid built-in pattern '{pattern}': {reason}. This is a bug; please report it.")]
    InvalidPattern { pattern: String, reason: String },
}

impl LightError {
    /// Returns the error category for grouping
    pub fn category(&self) -> ErrorCategory {
        match self {
            LightError::AllocationFailed { .. }
            | LightError::PortRangeExhausted { .. }
            | LightError::ConfigLoad { .. }
            | LightError::SpawnFailed { .. }
            | LightError::SyntaxError { .. }
            | LightError::ControlSocketNotAlive { .. }
            | LightError::DaemonCrashed { .. }
            | LightError::VersionProbe { .. } => ErrorCategory::Setup,

            LightError::StopTimeout { .. } | LightError::WaitTimeout { .. } => ErrorCategory::Timing,

            LightError::DriverAlreadyAssigned { .. }
            | LightError::StatementNotFound { .. }
            | LightError::InvalidLogPath { .. }
            | LightError::EmptyStatement { .. }
            | LightError::MalformedStats { .. }
            | LightError::UnsupportedOperation { .. }
            | LightError::UnexpectedConsoleMessages { .. }
            | LightError::Json(_) => ErrorCategory::Protocol,

            LightError::InvalidTransition { .. } => ErrorCategory::State,

            LightError::CommandFailed { .. }
            | LightError::Transport { .. }
            | LightError::Io(_) => ErrorCategory::Io,

            LightError::LockPoisoned | LightError::InvalidPattern { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns true if retrying the operation later may succeed
    ///
    /// Only exhausted waits qualify. Setup and protocol failures point at
    /// the environment or the test and are never retried.
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Timing
    }

    /// Returns the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            LightError::AllocationFailed { .. } => "ALLOCATION_FAILED",
            LightError::PortRangeExhausted { .. } => "PORT_RANGE_EXHAUSTED",
            LightError::ConfigLoad { .. } => "CONFIG_LOAD",
            LightError::SpawnFailed { .. } => "SPAWN_FAILED",
            LightError::SyntaxError { .. } => "SYNTAX_ERROR",
            LightError::ControlSocketNotAlive { .. } => "CONTROL_SOCKET_NOT_ALIVE",
            LightError::DaemonCrashed { .. } => "DAEMON_CRASHED",
            LightError::VersionProbe { .. } => "VERSION_PROBE",
            LightError::StopTimeout { .. } => "STOP_TIMEOUT",
            LightError::WaitTimeout { .. } => "WAIT_TIMEOUT",
            LightError::DriverAlreadyAssigned { .. } => "DRIVER_ALREADY_ASSIGNED",
            LightError::StatementNotFound { .. } => "STATEMENT_NOT_FOUND",
            LightError::InvalidLogPath { .. } => "INVALID_LOG_PATH",
            LightError::EmptyStatement { .. } => "EMPTY_STATEMENT",
            LightError::MalformedStats { .. } => "MALFORMED_STATS",
            LightError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            LightError::UnexpectedConsoleMessages { .. } => "UNEXPECTED_CONSOLE_MESSAGES",
            LightError::Json(_) => "JSON_ERROR",
            LightError::InvalidTransition { .. } => "INVALID_TRANSITION",
            LightError::CommandFailed { .. } => "COMMAND_FAILED",
            LightError::Transport { .. } => "TRANSPORT_ERROR",
            LightError::Io(_) => "IO_ERROR",
            LightError::LockPoisoned => "LOCK_POISONED",
            LightError::InvalidPattern { .. } => "INVALID_PATTERN",
        }
    }

    pub(crate) fn transport(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        LightError::Transport {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(kind: impl Into<String>, operation: &str) -> Self {
        LightError::UnsupportedOperation {
            kind: kind.into(),
            operation: operation.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_errors_are_recoverable() {
        let err = LightError::StopTimeout {
            pid: 42,
            timeout_ms: 100,
        };
        assert!(err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Timing);

        let err = LightError::SyntaxError {
            stderr_path: PathBuf::from("/tmp/stderr"),
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Setup);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LightError::DriverAlreadyAssigned {
                statement: "src_file_1".to_string(),
                existing: "file".to_string(),
                requested: "tcp".to_string(),
            }
            .error_code(),
            "DRIVER_ALREADY_ASSIGNED"
        );
        assert_eq!(LightError::LockPoisoned.error_code(), "LOCK_POISONED");

        let pattern = LightError::InvalidPattern {
            pattern: "(".to_string(),
            reason: "unclosed group".to_string(),
        };
        assert_eq!(pattern.error_code(), "INVALID_PATTERN");
        assert_eq!(pattern.category(), ErrorCategory::Internal);
        assert!(!pattern.is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: LightError = io.into();
        assert_eq!(err.category(), ErrorCategory::Io);
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_messages_carry_context() {
        let err = LightError::InvalidTransition {
            operation: "stop".to_string(),
            state: "not started".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("stop"));
        assert!(msg.contains("not started"));
    }
}
