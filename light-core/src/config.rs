//! Configuration for the Light harness
//!
//! Values are resolved in this order, highest precedence first: explicit
//! `with_*` overrides, `LIGHT_*` environment variables, a JSON file, and the
//! built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LightError, Result};

/// Main harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Daemon binary
    #[serde(default = "default_syslog_ng")]
    pub syslog_ng_binary: PathBuf,

    /// Control tool binary
    #[serde(default = "default_syslog_ng_ctl")]
    pub syslog_ng_ctl_binary: PathBuf,

    /// Root under which every registry creates its per-run directory
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// `@version:` written at the top of generated configs
    #[serde(default = "default_config_version")]
    pub config_version: String,

    /// Generic poll loop settings
    #[serde(default)]
    pub poll: PollConfig,

    /// How long `start()` waits for the control socket
    #[serde(default = "default_lifecycle_timeout")]
    pub start_timeout_ms: u64,

    /// How long `stop()` waits for the process to exit
    #[serde(default = "default_lifecycle_timeout")]
    pub stop_timeout_ms: u64,

    /// Console flags passed to the daemon
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Broker endpoint used by MQTT drivers
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Command prefix wrapped around the daemon, e.g. `["valgrind", "--leak-check=full"]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_tool: Option<Vec<String>>,
}

fn default_syslog_ng() -> PathBuf { PathBuf::from("syslog-ng") }
fn default_syslog_ng_ctl() -> PathBuf { PathBuf::from("syslog-ng-ctl") }
fn default_working_dir() -> PathBuf { std::env::temp_dir().join("light") }
fn default_config_version() -> String { "4.0".to_string() }
fn default_lifecycle_timeout() -> u64 { 10_000 }

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            syslog_ng_binary: default_syslog_ng(),
            syslog_ng_ctl_binary: default_syslog_ng_ctl(),
            working_dir: default_working_dir(),
            config_version: default_config_version(),
            poll: PollConfig::default(),
            start_timeout_ms: default_lifecycle_timeout(),
            stop_timeout_ms: default_lifecycle_timeout(),
            console: ConsoleConfig::default(),
            mqtt: MqttConfig::default(),
            external_tool: None,
        }
    }
}

impl HarnessConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| LightError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| LightError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Defaults overlaid with `LIGHT_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `LIGHT_*` environment variables on top of `self`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("LIGHT_SYSLOG_NG") {
            self.syslog_ng_binary = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LIGHT_SYSLOG_NG_CTL") {
            self.syslog_ng_ctl_binary = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LIGHT_WORKDIR") {
            self.working_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LIGHT_CONFIG_VERSION") {
            self.config_version = v;
        }
        if let Some(ms) = std::env::var("LIGHT_POLL_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.poll.timeout_ms = ms;
        }
        self
    }

    pub fn with_syslog_ng(mut self, binary: impl Into<PathBuf>) -> Self {
        self.syslog_ng_binary = binary.into();
        self
    }

    pub fn with_syslog_ng_ctl(mut self, binary: impl Into<PathBuf>) -> Self {
        self.syslog_ng_ctl_binary = binary.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_console(mut self, console: ConsoleConfig) -> Self {
        self.console = console;
        self
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Poll loop configuration
///
/// Every wait in the harness is a sleep/check loop bounded by `timeout_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Sleep between checks
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Overall bound
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_interval() -> u64 { 10 }
fn default_timeout() -> u64 { 10_000 }

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            timeout_ms: default_timeout(),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Same interval, different bound
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            ..self
        }
    }
}

/// Console output flags of the daemon
///
/// With `stderr`, `debug` and `verbose` all set, the controller also waits
/// for the start/reload/stop banners on stderr.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_true")]
    pub stderr: bool,
    #[serde(default = "default_true")]
    pub debug: bool,
    #[serde(default = "default_true")]
    pub verbose: bool,
    #[serde(default)]
    pub trace: bool,
}

fn default_true() -> bool { true }

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            stderr: true,
            debug: true,
            verbose: true,
            trace: false,
        }
    }
}

impl ConsoleConfig {
    /// No console flags at all
    pub fn quiet() -> Self {
        Self {
            stderr: false,
            debug: false,
            verbose: false,
            trace: false,
        }
    }

    pub fn waits_for_banners(&self) -> bool {
        self.stderr && self.debug && self.verbose
    }
}

/// MQTT broker endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Client ids are `<prefix>-<uuid>`
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_mqtt_host() -> String { "127.0.0.1".to_string() }
fn default_mqtt_port() -> u16 { 1883 }
fn default_client_id_prefix() -> String { "light".to_string() }
fn default_keep_alive() -> u64 { 5 }

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id_prefix: default_client_id_prefix(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}
