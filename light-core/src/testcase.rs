//! Per-test orchestration
//!
//! A [`TestCase`] owns everything one functional test needs: a registry for
//! unique paths and ports, the config document, and one daemon controller.
//! Cleanup actions registered during the test run in reverse order when the
//! case is dropped, after the daemon has been stopped, even if the test body
//! panicked.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::ctl::StatsSnapshot;
use crate::daemon::{DaemonController, DaemonHandle, ProcessState, StopOutcome};
use crate::error::Result;
use crate::io::SocketKind;
use crate::registry::ResourceRegistry;
use crate::syslog_ng_config::{
    ConfigDocument, DestinationDriver, FileDestinationOptions, FileSourceOptions, NetworkOptions, SourceDriver,
    UnixSocketOptions,
};

type Action = Box<dyn FnOnce() + Send>;

/// Cleanup actions, run last-registered-first
#[derive(Default)]
pub struct Teardown {
    actions: Vec<(String, Action)>,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, action: impl FnOnce() + Send + 'static) {
        self.actions.push((name.into(), Box::new(action)));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run and forget every action; a panicking action does not stop the rest
    pub fn run(&mut self) {
        while let Some((name, action)) = self.actions.pop() {
            debug!(action = %name, "teardown");
            if catch_unwind(AssertUnwindSafe(action)).is_err() {
                warn!(action = %name, "teardown action panicked");
            }
        }
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.actions.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("Teardown").field("actions", &names).finish()
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.run();
    }
}

#[derive(Debug)]
pub struct TestCase {
    name: String,
    config: HarnessConfig,
    registry: Arc<ResourceRegistry>,
    document: ConfigDocument,
    daemon: DaemonController,
    teardown: Teardown,
}

impl TestCase {
    /// Fresh registry under `config.working_dir`
    pub fn new(name: impl Into<String>, config: HarnessConfig) -> Result<Self> {
        let registry = Arc::new(ResourceRegistry::new(&config.working_dir)?);
        Self::with_registry(name, config, registry)
    }

    /// Share a registry with other cases so their paths and ports never collide
    pub fn with_registry(
        name: impl Into<String>,
        config: HarnessConfig,
        registry: Arc<ResourceRegistry>,
    ) -> Result<Self> {
        let name = name.into();
        let daemon = DaemonController::new(&config, &registry, &sanitize(&name))?;
        let document = ConfigDocument::new(Arc::clone(&registry), &config);
        info!(test = %name, run_dir = %registry.run_dir().display(), "test case created");
        Ok(Self {
            name,
            config,
            registry,
            document,
            daemon,
            teardown: Teardown::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    /// Parsers, rewrites, filters and log paths go through the document directly
    pub fn document_mut(&mut self) -> &mut ConfigDocument {
        &mut self.document
    }

    pub fn daemon(&self) -> &DaemonController {
        &self.daemon
    }

    pub fn daemon_mut(&mut self) -> &mut DaemonController {
        &mut self.daemon
    }

    pub fn file_source(&mut self, options: FileSourceOptions) -> Result<SourceDriver> {
        self.document.file_source(options)
    }

    pub fn network_source(&mut self, kind: SocketKind, options: NetworkOptions) -> Result<SourceDriver> {
        self.document.network_source(kind, options)
    }

    pub fn unix_source(&mut self, kind: SocketKind, options: UnixSocketOptions) -> Result<SourceDriver> {
        self.document.unix_source(kind, options)
    }

    #[cfg(feature = "mqtt")]
    pub fn mqtt_source(&mut self, options: crate::syslog_ng_config::MqttOptions) -> Result<SourceDriver> {
        self.document.mqtt_source(options)
    }

    pub fn file_destination(&mut self, options: FileDestinationOptions) -> Result<DestinationDriver> {
        self.document.file_destination(options)
    }

    pub fn network_destination(&mut self, kind: SocketKind, options: NetworkOptions) -> Result<DestinationDriver> {
        let destination = self.document.network_destination(kind, options)?;
        self.track_listener(&destination);
        Ok(destination)
    }

    pub fn unix_destination(&mut self, kind: SocketKind, options: UnixSocketOptions) -> Result<DestinationDriver> {
        let destination = self.document.unix_destination(kind, options)?;
        self.track_listener(&destination);
        Ok(destination)
    }

    #[cfg(feature = "mqtt")]
    pub fn mqtt_destination(&mut self, options: crate::syslog_ng_config::MqttOptions) -> Result<DestinationDriver> {
        self.document.mqtt_destination(options)
    }

    fn track_listener(&mut self, destination: &DestinationDriver) {
        if let Some(stop) = destination.stop_handle() {
            self.teardown
                .register(format!("stop listener {}", destination.id()), move || stop.stop());
        }
    }

    pub fn on_teardown(&mut self, name: impl Into<String>, action: impl FnOnce() + Send + 'static) {
        self.teardown.register(name, action);
    }

    pub fn start(&mut self) -> Result<DaemonHandle> {
        self.daemon.start(&self.document)
    }

    pub fn reload(&mut self) -> Result<()> {
        self.daemon.reload(&self.document)
    }

    pub fn stop(&mut self) -> Result<StopOutcome> {
        self.daemon.stop()
    }

    pub fn restart(&mut self) -> Result<DaemonHandle> {
        self.daemon.restart(&self.document)
    }

    pub fn stats(&self) -> Result<StatsSnapshot> {
        self.daemon.ctl().stats_snapshot()
    }

    /// Log the daemon's stderr and both message collections; returns the report
    pub fn dump_diagnostics<E, A>(&self, expected: &[E], actual: &[A]) -> String
    where
        E: AsRef<str>,
        A: AsRef<str>,
    {
        let stderr = self.daemon.dump_stderr();
        let mut report = format!("test case: {}\n", self.name);
        report.push_str(&format!("expected ({}):\n", expected.len()));
        for line in expected {
            report.push_str(&format!("  {}\n", line.as_ref()));
        }
        report.push_str(&format!("actual ({}):\n", actual.len()));
        for line in actual {
            report.push_str(&format!("  {}\n", line.as_ref()));
        }
        report.push_str("registered resources:\n");
        for (prefix, id) in self.registry.registered() {
            report.push_str(&format!("  {prefix}: {id:?}\n"));
        }
        report.push_str("stderr:\n");
        report.push_str(&stderr);
        warn!(test = %self.name, "{report}");
        report
    }

    /// Compare collections; on mismatch dump diagnostics and return false
    pub fn verify_messages<E, A>(&self, expected: &[E], actual: &[A]) -> bool
    where
        E: AsRef<str>,
        A: AsRef<str>,
    {
        let equal = expected.len() == actual.len()
            && expected.iter().zip(actual).all(|(e, a)| e.as_ref() == a.as_ref());
        if !equal {
            self.dump_diagnostics(expected, actual);
        }
        equal
    }
}

/// The daemon stops before teardown actions run, so its destinations still
/// have their peers while it shuts down.
impl Drop for TestCase {
    fn drop(&mut self) {
        if self.daemon.state() == ProcessState::Running {
            if let Err(e) = self.daemon.stop() {
                warn!(test = %self.name, error = %e, "stop at teardown failed");
            }
        }
        self.teardown.run();
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
