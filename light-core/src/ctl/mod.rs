//! Control-socket client
//!
//! Every command goes through the daemon's control tool:
//! `<ctl> <command> [args] --control=<socket>`. Its exit code is the only
//! liveness signal: 0 means the daemon answered.

pub mod stats;

pub use stats::{StatCounter, StatsSnapshot};

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{LightError, Result};
use crate::timing::Poller;

/// Captured result of one control-tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// -1 when the tool was killed by a signal
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// `query` sub-commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Get,
    GetSum,
    GetReset,
    List,
}

impl QueryMode {
    fn args(&self) -> &'static [&'static str] {
        match self {
            QueryMode::Get => &["get"],
            QueryMode::GetSum => &["get", "--sum"],
            QueryMode::GetReset => &["get", "--reset"],
            QueryMode::List => &["list"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlClient {
    binary: PathBuf,
    control_socket: PathBuf,
    poller: Poller,
}

impl ControlClient {
    pub fn new(binary: impl Into<PathBuf>, control_socket: impl Into<PathBuf>, poller: Poller) -> Self {
        Self {
            binary: binary.into(),
            control_socket: control_socket.into(),
            poller,
        }
    }

    pub fn control_socket(&self) -> &Path {
        &self.control_socket
    }

    /// Run `<ctl> args... --control=<socket>`
    ///
    /// A non-zero exit code is a normal result here; only a failure to
    /// spawn the tool is an error.
    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(&self.binary)
            .args(args)
            .arg(format!("--control={}", self.control_socket.display()))
            .output()
            .map_err(|e| LightError::SpawnFailed {
                command: self.describe(args),
                reason: e.to_string(),
            })?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        trace!(command = %self.describe(args), exit_code = result.exit_code, "control command finished");
        Ok(result)
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary.display(), args.join(" "))
    }

    /// Like [`run`](Self::run) but a non-zero exit is an error
    pub fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(LightError::CommandFailed {
                command: self.describe(args),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    pub fn stats(&self, reset: bool) -> Result<CommandOutput> {
        if reset {
            self.run(&["stats", "--reset"])
        } else {
            self.run(&["stats"])
        }
    }

    pub fn reload(&self) -> Result<CommandOutput> {
        self.run(&["reload"])
    }

    pub fn stop(&self) -> Result<CommandOutput> {
        self.run(&["stop"])
    }

    pub fn reopen(&self) -> Result<CommandOutput> {
        self.run(&["reopen"])
    }

    pub fn query(&self, mode: QueryMode, pattern: &str) -> Result<CommandOutput> {
        let mut args = vec!["query"];
        args.extend_from_slice(mode.args());
        args.push(pattern);
        self.run(&args)
    }

    /// Fresh counter snapshot from `stats`
    pub fn stats_snapshot(&self) -> Result<StatsSnapshot> {
        let output = self.run_checked(&["stats"])?;
        StatsSnapshot::parse_stats(&output.stdout)
    }

    /// Fresh counter snapshot from `query get <pattern>`
    pub fn query_snapshot(&self, pattern: &str) -> Result<StatsSnapshot> {
        let mut args = vec!["query"];
        args.extend_from_slice(QueryMode::Get.args());
        args.push(pattern);
        let output = self.run_checked(&args)?;
        StatsSnapshot::parse_query(&output.stdout)
    }

    /// One liveness probe: `stats` exiting with 0
    pub fn is_control_socket_alive(&self) -> bool {
        self.stats(false).map(|o| o.success()).unwrap_or(false)
    }

    pub fn wait_for_control_socket_alive(&self) -> bool {
        let alive = self.poller.wait_until_true(|| self.is_control_socket_alive());
        debug!(socket = %self.control_socket.display(), alive, "waited for control socket");
        alive
    }

    pub fn wait_for_control_socket_stopped(&self) -> bool {
        self.poller.wait_until_false(|| self.is_control_socket_alive())
    }

    /// Poll `stats` until `counter` of `(group_type, driver_name)` equals `expected`
    pub fn wait_for_counter(&self, group_type: &str, driver_name: &str, counter: &str, expected: i64) -> bool {
        self.poller.wait_until_true(|| {
            self.stats_snapshot()
                .ok()
                .and_then(|snapshot| snapshot.get(group_type, driver_name, counter))
                == Some(expected)
        })
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    /// Control tool stand-in that prints stats for socket file "alive"
    fn fake_ctl(dir: &Path) -> PathBuf {
        let path = dir.join("fake-ctl");
        std::fs::write(
            &path,
            r#"#!/bin/sh
for arg in "$@"; do case "$arg" in --control=*) sock="${arg#--control=}";; esac; done
[ -e "$sock" ] || { echo "Error connecting to control socket" >&2; exit 1; }
case "$1" in
  stats) printf 'SourceName;SourceId;SourceInstance;State;Type;Number\nsrc.file;s_in#0;/tmp/in;a;processed;4\n' ;;
  query) echo "src.file.s_in#0./tmp/in.processed=4" ;;
  *) echo "OK $1" ;;
esac
"#,
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn client(dir: &Path, socket: &str) -> ControlClient {
        ControlClient::new(
            fake_ctl(dir),
            dir.join(socket),
            Poller::new(Duration::from_millis(1), Duration::from_millis(50)),
        )
    }

    #[test]
    fn test_dead_socket_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = client(dir.path(), "missing.ctl");
        let output = ctl.stats(false).unwrap();
        assert_eq!(output.exit_code, 1);
        assert!(!ctl.is_control_socket_alive());
        assert!(!ctl.wait_for_control_socket_alive());
        assert!(ctl.wait_for_control_socket_stopped());
        assert_eq!(ctl.stats_snapshot().unwrap_err().error_code(), "COMMAND_FAILED");
    }

    #[test]
    fn test_snapshots_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alive.ctl"), "").unwrap();
        let ctl = client(dir.path(), "alive.ctl");
        assert!(ctl.wait_for_control_socket_alive());
        assert_eq!(ctl.stats_snapshot().unwrap().get("src", "file", "processed"), Some(4));
        assert_eq!(ctl.query_snapshot("src.file.*").unwrap().counters()[0].value, 4);
        assert!(ctl.wait_for_counter("src", "file", "processed", 4));
        assert!(!ctl.wait_for_counter("src", "file", "processed", 5));
        assert_eq!(ctl.reopen().unwrap().stdout.trim(), "OK reopen");
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let ctl = ControlClient::new("/nonexistent/syslog-ng-ctl", "/tmp/x.ctl", Poller::default());
        assert_eq!(ctl.run(&["stats"]).unwrap_err().error_code(), "SPAWN_FAILED");
        assert!(!ctl.is_control_socket_alive());
    }
}
