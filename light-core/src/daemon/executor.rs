//! Daemon command lines

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::debug;

use super::paths::InstancePaths;
use crate::config::ConsoleConfig;
use crate::error::{LightError, Result};

/// Flags of one daemon invocation
#[derive(Debug, Clone, Default)]
pub struct StartParams {
    pub config: Option<PathBuf>,
    pub persist: Option<PathBuf>,
    pub pid: Option<PathBuf>,
    pub control: Option<PathBuf>,
    pub foreground: bool,
    pub enable_core: bool,
    pub console: Option<ConsoleConfig>,
    pub syntax_only: bool,
    pub version: bool,
    pub modules: bool,
}

impl StartParams {
    /// Long-running instance with every path of `paths`
    pub fn daemon(paths: &InstancePaths, console: ConsoleConfig) -> Self {
        Self {
            config: Some(paths.config.clone()),
            persist: Some(paths.persist.clone()),
            pid: Some(paths.pid.clone()),
            control: Some(paths.control_socket.clone()),
            foreground: true,
            enable_core: true,
            console: Some(console),
            ..Self::default()
        }
    }

    /// `--syntax-only` check of the config in `paths`
    pub fn syntax_only(paths: &InstancePaths) -> Self {
        Self {
            config: Some(paths.config.clone()),
            syntax_only: true,
            ..Self::default()
        }
    }

    pub fn version() -> Self {
        Self {
            version: true,
            ..Self::default()
        }
    }

    pub fn modules() -> Self {
        Self {
            modules: true,
            ..Self::default()
        }
    }

    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if self.version {
            args.push("--version".into());
        }
        if self.modules {
            args.push("-V".into());
        }
        if self.foreground {
            args.push("--foreground".into());
        }
        if self.enable_core {
            args.push("--enable-core".into());
        }
        if let Some(console) = self.console {
            for (enabled, flag) in [
                (console.stderr, "--stderr"),
                (console.debug, "--debug"),
                (console.verbose, "--verbose"),
                (console.trace, "--trace"),
            ] {
                if enabled {
                    args.push(flag.into());
                }
            }
        }
        if self.syntax_only {
            args.push("--syntax-only".into());
        }
        if let Some(config) = &self.config {
            args.push("-f".into());
            args.push(config.clone().into_os_string());
        }
        for (flag, path) in [
            ("--persist-file", &self.persist),
            ("--pidfile", &self.pid),
            ("--control", &self.control),
        ] {
            if let Some(path) = path {
                let mut arg = OsString::from(format!("{flag}="));
                arg.push(path);
                args.push(arg);
            }
        }
        args
    }
}

/// Launches the daemon binary, optionally wrapped in an external tool
#[derive(Debug, Clone)]
pub struct Executor {
    binary: PathBuf,
    external_tool: Option<Vec<String>>,
}

impl Executor {
    pub fn new(binary: impl Into<PathBuf>, external_tool: Option<Vec<String>>) -> Self {
        Self {
            binary: binary.into(),
            external_tool,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, params: &StartParams) -> Command {
        let mut command = match self.external_tool.as_deref() {
            Some([tool, tool_args @ ..]) => {
                let mut command = Command::new(tool);
                command.args(tool_args).arg(&self.binary);
                command
            }
            _ => Command::new(&self.binary),
        };
        command.args(params.to_args());
        command
    }

    fn describe(&self, params: &StartParams) -> String {
        let args: Vec<String> = params
            .to_args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        format!("{} {}", self.binary.display(), args.join(" "))
    }

    /// Spawn with stdout/stderr redirected into the capture files
    pub fn spawn(&self, params: &StartParams, stdout: &Path, stderr: &Path) -> Result<Child> {
        let command_line = self.describe(params);
        debug!(command = %command_line, "starting syslog-ng");
        let spawn_error = |e: std::io::Error| LightError::SpawnFailed {
            command: command_line.clone(),
            reason: e.to_string(),
        };
        let out = File::create(stdout).map_err(spawn_error)?;
        let err = File::create(stderr).map_err(spawn_error)?;
        self.command(params)
            .stdin(Stdio::null())
            .stdout(out)
            .stderr(err)
            .spawn()
            .map_err(spawn_error)
    }

    /// Run to completion with captured output
    pub fn run(&self, params: &StartParams, stdout: &Path, stderr: &Path) -> Result<ExitStatus> {
        let mut child = self.spawn(params, stdout, stderr)?;
        child.wait().map_err(Into::into)
    }

    /// Run to completion and return stdout
    pub fn output(&self, params: &StartParams) -> Result<String> {
        let output = self
            .command(params)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| LightError::SpawnFailed {
                command: self.describe(params),
                reason: e.to_string(),
            })?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> InstancePaths {
        InstancePaths {
            instance_name: "server".into(),
            working_dir: "/run".into(),
            config: "/run/a.conf".into(),
            persist: "/run/a.persist".into(),
            pid: "/run/a.pid".into(),
            control_socket: "/run/a.ctl".into(),
            stdout: "/run/out.log".into(),
            stderr: "/run/err.log".into(),
        }
    }

    fn strings(params: &StartParams) -> Vec<String> {
        params.to_args().iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_daemon_args() {
        let args = strings(&StartParams::daemon(&paths(), ConsoleConfig::default()));
        assert_eq!(
            args,
            vec![
                "--foreground",
                "--enable-core",
                "--stderr",
                "--debug",
                "--verbose",
                "-f",
                "/run/a.conf",
                "--persist-file=/run/a.persist",
                "--pidfile=/run/a.pid",
                "--control=/run/a.ctl",
            ]
        );
    }

    #[test]
    fn test_syntax_only_args() {
        assert_eq!(
            strings(&StartParams::syntax_only(&paths())),
            vec!["--syntax-only", "-f", "/run/a.conf"]
        );
        assert_eq!(strings(&StartParams::modules()), vec!["-V"]);
    }

    #[test]
    fn test_external_tool_wraps_binary() {
        let executor = Executor::new("/bin/echo", Some(vec!["/usr/bin/env".into()]));
        let out = executor.output(&StartParams::modules()).unwrap();
        assert_eq!(out.trim(), "-V");
    }
}
