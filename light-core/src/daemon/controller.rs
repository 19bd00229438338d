//! Daemon lifecycle state machine
//!
//! ```text
//!   NotStarted ──start()──▶ Running ──stop()──▶ Stopped
//!                           │    ▲
//!                           └────┘ reload()
//!
//!   restart(): stop() if running, then start() from a fresh NotStarted
//! ```
//!
//! Invalid transitions are rejected with [`LightError::InvalidTransition`].
//! `stop()` on a stopped controller reports [`StopOutcome::AlreadyStopped`].
//! `stop()` never kills: a daemon that outlives the stop timeout is a
//! [`LightError::StopTimeout`] and keeps the controller `Running`. Only
//! dropping a controller whose daemon is still alive sends SIGTERM, then
//! SIGKILL.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::console::{dump_capture, ConsoleLogReader};
use super::executor::{Executor, StartParams};
use super::paths::InstancePaths;
use crate::config::HarnessConfig;
use crate::ctl::ControlClient;
use crate::error::{LightError, Result};
use crate::registry::ResourceRegistry;
use crate::syslog_ng_config::ConfigDocument;
use crate::timing::Poller;

/// Grace period between SIGTERM and SIGKILL on drop
const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Signals that mean the daemon crashed rather than exited
const CRASH_SIGNALS: [i32; 3] = [libc::SIGABRT, libc::SIGKILL, libc::SIGSEGV];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    NotStarted,
    Running,
    Stopped,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessState::NotStarted => "not started",
            ProcessState::Running => "running",
            ProcessState::Stopped => "stopped",
        })
    }
}

/// Identity of a started daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonHandle {
    pub pid: u32,
    pub config: PathBuf,
    pub control_socket: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { pid: u32 },
    AlreadyStopped,
}

/// Owns one daemon subprocess and its control client
#[derive(Debug)]
pub struct DaemonController {
    config: HarnessConfig,
    paths: InstancePaths,
    executor: Executor,
    ctl: ControlClient,
    console: Option<ConsoleLogReader>,
    state: ProcessState,
    child: Option<Child>,
}

impl DaemonController {
    pub fn new(config: &HarnessConfig, registry: &ResourceRegistry, instance_name: &str) -> Result<Self> {
        let paths = InstancePaths::allocate(registry, instance_name)?;
        let ctl = ControlClient::new(
            config.syslog_ng_ctl_binary.clone(),
            paths.control_socket.clone(),
            Poller::from(config.poll),
        );
        Ok(Self {
            executor: Executor::new(config.syslog_ng_binary.clone(), config.external_tool.clone()),
            config: config.clone(),
            paths,
            ctl,
            console: None,
            state: ProcessState::NotStarted,
            child: None,
        })
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn paths(&self) -> &InstancePaths {
        &self.paths
    }

    pub fn ctl(&self) -> &ControlClient {
        &self.ctl
    }

    fn invalid(&self, operation: &str) -> LightError {
        LightError::InvalidTransition {
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
    }

    fn poller(&self, timeout: Duration) -> Poller {
        Poller::new(self.config.poll.interval(), timeout)
    }

    fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Live process identity; fails unless running
    pub fn handle(&self) -> Result<DaemonHandle> {
        match (self.state, self.pid()) {
            (ProcessState::Running, Some(pid)) => Ok(DaemonHandle {
                pid,
                config: self.paths.config.clone(),
                control_socket: self.paths.control_socket.clone(),
                stdout: self.paths.stdout.clone(),
                stderr: self.paths.stderr.clone(),
            }),
            _ => Err(self.invalid("get handle of")),
        }
    }

    pub fn is_process_running(&mut self) -> bool {
        self.child
            .as_mut()
            .map(|child| matches!(child.try_wait(), Ok(None)))
            .unwrap_or(false)
    }

    /// Write the config, check its syntax, launch and wait until the daemon answers
    pub fn start(&mut self, document: &ConfigDocument) -> Result<DaemonHandle> {
        if self.state != ProcessState::NotStarted {
            return Err(self.invalid("start"));
        }
        document.write_to(&self.paths.config)?;
        self.syntax_check()?;

        let params = StartParams::daemon(&self.paths, self.config.console);
        let child = self.executor.spawn(&params, &self.paths.stdout, &self.paths.stderr)?;
        let pid = child.id();
        self.child = Some(child);
        self.state = ProcessState::Running;
        self.console = Some(ConsoleLogReader::new(
            self.paths.stderr.clone(),
            self.poller(self.config.start_timeout()),
        ));

        if let Err(e) = self.wait_until_up(self.config.start_timeout()) {
            return Err(self.diagnose(e));
        }
        if self.config.console.waits_for_banners() && !self.console_mut()?.wait_for_start_message()? {
            let e = LightError::WaitTimeout {
                what: "start message".to_string(),
                timeout_ms: self.config.start_timeout_ms,
            };
            return Err(self.diagnose(e));
        }
        info!(pid, instance = %self.paths.instance_name, "syslog-ng process has been started");
        self.handle()
    }

    /// Re-render the config and signal the running daemon
    pub fn reload(&mut self, document: &ConfigDocument) -> Result<()> {
        if self.state != ProcessState::Running {
            return Err(self.invalid("reload"));
        }
        document.write_to(&self.paths.config)?;

        let output = self.ctl.reload()?;
        if !output.success() {
            let e = LightError::CommandFailed {
                command: "reload".to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            };
            return Err(self.diagnose(e));
        }
        if let Err(e) = self.wait_until_up(self.config.start_timeout()) {
            return Err(self.diagnose(e));
        }
        if self.config.console.waits_for_banners() && !self.console_mut()?.wait_for_reload_message()? {
            let e = LightError::WaitTimeout {
                what: "reload message".to_string(),
                timeout_ms: self.config.start_timeout_ms,
            };
            return Err(self.diagnose(e));
        }
        info!(pid = ?self.pid(), "syslog-ng process has been reloaded");
        Ok(())
    }

    /// Ask the daemon to stop and wait for the process to exit
    pub fn stop(&mut self) -> Result<StopOutcome> {
        match self.state {
            ProcessState::NotStarted => return Err(self.invalid("stop")),
            ProcessState::Stopped => return Ok(StopOutcome::AlreadyStopped),
            ProcessState::Running => {}
        }
        let pid = self.pid().unwrap_or_default();

        if !self.is_process_running() {
            let status = self.reap();
            warn!(pid, ?status, "syslog-ng exited before stop was requested");
            return match status.as_ref().and_then(crash_signal) {
                Some(signal) => Err(self.crashed(format!("process {pid} terminated by signal {signal}"))),
                None => Ok(StopOutcome::Stopped { pid }),
            };
        }

        let output = self.ctl.stop()?;
        if !output.success() {
            let e = LightError::CommandFailed {
                command: "stop".to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            };
            return Err(self.diagnose(e));
        }

        let poller = self.poller(self.config.stop_timeout());
        if !poller.wait_until_false(|| self.is_process_running()) {
            self.dump_stderr();
            return Err(LightError::StopTimeout {
                pid,
                timeout_ms: self.config.stop_timeout_ms,
            });
        }
        let status = self.reap();
        if let Some(signal) = status.as_ref().and_then(crash_signal) {
            return Err(self.crashed(format!("process {pid} terminated by signal {signal} during stop")));
        }
        if self.config.console.waits_for_banners() && !self.console_mut()?.wait_for_stop_message()? {
            return Err(LightError::WaitTimeout {
                what: "stop message".to_string(),
                timeout_ms: self.config.stop_timeout_ms,
            });
        }
        info!(pid, "syslog-ng process has been stopped");
        Ok(StopOutcome::Stopped { pid })
    }

    /// Stop if running, then start again as a fresh instance
    pub fn restart(&mut self, document: &ConfigDocument) -> Result<DaemonHandle> {
        if self.state == ProcessState::Running {
            self.stop()?;
        }
        self.state = ProcessState::NotStarted;
        self.console = None;
        self.start(document)
    }

    /// `X.Y` from the `Config version:` line of `--version`
    pub fn config_version(&self) -> Result<String> {
        let stdout = self.probe(StartParams::version(), "version")?;
        stdout
            .lines()
            .find(|line| line.contains("Config version:"))
            .and_then(|line| line.split_whitespace().nth(2))
            .map(str::to_string)
            .ok_or_else(|| LightError::VersionProbe {
                what: "Config version".to_string(),
            })
    }

    /// Module names from the `Available-Modules:` line of `-V`
    pub fn available_modules(&self) -> Result<Vec<String>> {
        let stdout = self.probe(StartParams::modules(), "modules")?;
        let line = stdout
            .lines()
            .find_map(|line| line.trim().strip_prefix("Available-Modules:"))
            .ok_or_else(|| LightError::VersionProbe {
                what: "Available-Modules".to_string(),
            })?;
        Ok(line
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Wait for each console pattern in turn; returns the lines found
    pub fn wait_for_messages_in_console_log(&mut self, patterns: &[&str]) -> Result<Vec<String>> {
        self.console_mut()?.wait_for_messages(patterns)
    }

    /// Fail on error-level console lines; see [`ConsoleLogReader::check_for_unexpected_messages`]
    pub fn check_console(&self, extra: &[&str], whitelist: &[&str]) -> Result<()> {
        match &self.console {
            Some(console) => console.check_for_unexpected_messages(extra, whitelist),
            None => Err(self.invalid("check console of")),
        }
    }

    /// Log and return the stderr capture
    pub fn dump_stderr(&self) -> String {
        dump_capture(&self.paths.stderr)
    }

    fn console_mut(&mut self) -> Result<&mut ConsoleLogReader> {
        let state = self.state;
        self.console.as_mut().ok_or_else(|| LightError::InvalidTransition {
            operation: "read console of".to_string(),
            state: state.to_string(),
        })
    }

    fn syntax_check(&self) -> Result<()> {
        let (stdout, stderr) = self.paths.captures_for("syntax_only");
        let status = self
            .executor
            .run(&StartParams::syntax_only(&self.paths), &stdout, &stderr)?;
        if status.success() {
            debug!(config = %self.paths.config.display(), "syntax check passed");
            Ok(())
        } else {
            dump_capture(&stderr);
            Err(LightError::SyntaxError { stderr_path: stderr })
        }
    }

    fn probe(&self, params: StartParams, postfix: &str) -> Result<String> {
        let (stdout, stderr) = self.paths.captures_for(postfix);
        let status = self.executor.run(&params, &stdout, &stderr)?;
        if !status.success() {
            dump_capture(&stderr);
            return Err(LightError::CommandFailed {
                command: format!("{} {postfix}", self.executor.binary().display()),
                exit_code: status.code().unwrap_or(-1),
                stderr: stderr.display().to_string(),
            });
        }
        Ok(std::fs::read_to_string(&stdout)?)
    }

    /// Poll the control socket; a process exit ends the wait early
    fn wait_until_up(&mut self, timeout: Duration) -> Result<()> {
        let poller = self.poller(timeout);
        let ctl = &self.ctl;
        let child = &mut self.child;
        let mut exited = false;
        let alive = poller.wait_until_true(|| {
            if let Some(child) = child.as_mut() {
                if !matches!(child.try_wait(), Ok(None)) {
                    exited = true;
                    return true;
                }
            }
            ctl.is_control_socket_alive()
        });
        if exited {
            return Err(LightError::DaemonCrashed {
                detail: "syslog-ng is not running".to_string(),
            });
        }
        if !alive {
            return Err(LightError::ControlSocketNotAlive {
                path: self.paths.control_socket.clone(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    fn reap(&mut self) -> Option<ExitStatus> {
        self.state = ProcessState::Stopped;
        self.child.take().and_then(|mut child| child.wait().ok())
    }

    fn crashed(&self, detail: String) -> LightError {
        self.dump_stderr();
        LightError::DaemonCrashed { detail }
    }

    /// Dump stderr; if the daemon died, turn `error` into a crash report
    fn diagnose(&mut self, error: LightError) -> LightError {
        self.dump_stderr();
        if self.is_process_running() {
            return error;
        }
        let status = self.reap();
        let cores = find_core_files(&[self.paths.working_dir.as_path(), Path::new(".")]);
        if !cores.is_empty() {
            let names: Vec<String> = cores.iter().map(|p| p.display().to_string()).collect();
            return LightError::DaemonCrashed {
                detail: format!("core file found: {}", names.join(", ")),
            };
        }
        match status.as_ref().and_then(crash_signal) {
            Some(signal) => LightError::DaemonCrashed {
                detail: format!("terminated by signal {signal}"),
            },
            None => error,
        }
    }
}

impl Drop for DaemonController {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if !matches!(child.try_wait(), Ok(None)) {
            return;
        }
        let pid = child.id();
        warn!(pid, "syslog-ng still running at teardown, sending SIGTERM");
        send_signal(pid, libc::SIGTERM);
        let poller = Poller::new(self.config.poll.interval(), TEARDOWN_GRACE);
        if !poller.wait_until_true(|| !matches!(child.try_wait(), Ok(None))) {
            warn!(pid, "syslog-ng ignored SIGTERM, sending SIGKILL");
            let _ = child.kill();
        }
        let _ = child.wait();
    }
}

fn crash_signal(status: &ExitStatus) -> Option<i32> {
    status.signal().filter(|signal| CRASH_SIGNALS.contains(signal))
}

fn send_signal(pid: u32, signal: i32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours
    unsafe { libc::kill(pid, signal) == 0 }
}

/// `core*` files in any of `dirs`
pub fn find_core_files(dirs: &[&Path]) -> Vec<PathBuf> {
    dirs.iter()
        .filter_map(|dir| glob::glob(&dir.join("core*").to_string_lossy()).ok())
        .flat_map(|paths| paths.filter_map(|p| p.ok()))
        .filter(|p| p.is_file())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ProcessState::NotStarted.to_string(), "not started");
        assert_eq!(ProcessState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_transitions_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ResourceRegistry::new(dir.path()).unwrap();
        let mut controller = DaemonController::new(&HarnessConfig::default(), &registry, "idle").unwrap();
        assert_eq!(controller.state(), ProcessState::NotStarted);
        assert_eq!(controller.stop().unwrap_err().error_code(), "INVALID_TRANSITION");
        assert_eq!(controller.handle().unwrap_err().error_code(), "INVALID_TRANSITION");
        assert!(!controller.is_process_running());
    }

    #[test]
    fn test_find_core_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("core.1234"), "").unwrap();
        std::fs::write(dir.path().join("syslog_ng.log"), "").unwrap();
        let cores = find_core_files(&[dir.path()]);
        assert_eq!(cores, vec![dir.path().join("core.1234")]);
    }

    #[test]
    fn test_crash_signal_filter() {
        assert_eq!(crash_signal(&ExitStatus::from_raw(libc::SIGSEGV)), Some(libc::SIGSEGV));
        assert_eq!(crash_signal(&ExitStatus::from_raw(libc::SIGTERM)), None);
        assert_eq!(crash_signal(&ExitStatus::from_raw(0)), None);
    }
}
