//! Shared helpers for integration tests
//!
//! Lifecycle tests run against POSIX shell stand-ins for the daemon and its
//! control tool. The daemon stand-in prints the real console banners, keeps
//! its pid in the control-socket path and reacts to SIGTERM/SIGHUP the way
//! the daemon does; the control stand-in turns `stop`/`reload` into those
//! signals.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use light_core::{ConsoleConfig, HarnessConfig, PollConfig};

const FAKE_DAEMON: &str = r#"#!/bin/sh
mode=run; ctl=""; cfg=""; prev=""
for arg in "$@"; do
  case "$arg" in
    --version) mode=version ;;
    -V) mode=modules ;;
    --syntax-only) mode=syntax ;;
    --control=*) ctl="${arg#--control=}" ;;
  esac
  [ "$prev" = "-f" ] && cfg="$arg"
  prev="$arg"
done
case "$mode" in
  version) echo "syslog-ng 4 (4.0.1)"; echo "Config version: 4.0"; exit 0 ;;
  modules) echo "Available-Modules: affile,afsocket,mqtt"; exit 0 ;;
  syntax)
    if grep -q 'follow-freq(-1)' "$cfg"; then
      echo "Error parsing affile, follow-freq() must not be negative in $cfg" >&2
      exit 1
    fi
    exit 0 ;;
esac
BEHAVIOUR
trap 'echo "New configuration initialized" >&2' HUP
echo "[2024-01-01T00:00:00] syslog-ng starting up; version='4.0.1'" >&2
echo $$ > "$ctl"
while [ -e "$ctl" ]; do sleep 0.05; done
"#;

const FAKE_CTL: &str = r#"#!/bin/sh
for arg in "$@"; do case "$arg" in --control=*) sock="${arg#--control=}";; esac; done
[ -f "$sock" ] || { echo "Error connecting to control socket, socket='$sock'" >&2; exit 1; }
pid=$(cat "$sock")
kill -0 "$pid" 2>/dev/null || { echo "Error connecting to control socket, socket='$sock'" >&2; exit 1; }
case "$1" in
  stats) printf 'SourceName;SourceId;SourceInstance;State;Type;Number\nsrc.file;s_in#0;/tmp/in;a;processed;4\ndst.file;d_out#0;/tmp/out;a;written;4\n' ;;
  stop) kill -TERM "$pid"; echo "OK Shutdown initiated" ;;
  reload) kill -HUP "$pid"; echo "OK Config reload initiated" ;;
  *) echo "OK" ;;
esac
"#;

/// Well-behaved daemon: exits on SIGTERM after printing the stop banner
const GRACEFUL: &str = r#"trap 'echo "syslog-ng shutting down; version=4.0.1" >&2; rm -f "$ctl"; exit 0' TERM"#;

/// Daemon that ignores SIGTERM
const STUCK: &str = "trap '' TERM";

/// Daemon that dies by SIGKILL right after start
const CRASHING: &str = r#"echo "[2024-01-01T00:00:00] syslog-ng starting up" >&2; kill -KILL $$"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeDaemon {
    Graceful,
    Stuck,
    Crashing,
}

struct Fakes {
    dir: PathBuf,
}

/// Scripts are written once per test binary; an executable that is still
/// open for writing in another thread's fork cannot be exec'd
fn fakes() -> &'static Fakes {
    static FAKES: OnceLock<Fakes> = OnceLock::new();
    FAKES.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("light-fakes-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, behaviour) in [("graceful", GRACEFUL), ("stuck", STUCK), ("crashing", CRASHING)] {
            std::fs::write(dir.join(name), FAKE_DAEMON.replace("BEHAVIOUR", behaviour)).unwrap();
        }
        let ctl = dir.join("syslog-ng-ctl");
        std::fs::write(&ctl, FAKE_CTL).unwrap();
        std::fs::set_permissions(&ctl, std::fs::Permissions::from_mode(0o755)).unwrap();
        Fakes { dir }
    })
}

fn daemon_script(kind: FakeDaemon) -> PathBuf {
    let name = match kind {
        FakeDaemon::Graceful => "graceful",
        FakeDaemon::Stuck => "stuck",
        FakeDaemon::Crashing => "crashing",
    };
    fakes().dir.join(name)
}

/// Harness config wired to the stand-ins, rooted in `working_dir`
///
/// The daemon script runs through `/bin/sh` as the external tool so it is
/// never exec'd directly.
pub fn fake_config(kind: FakeDaemon, working_dir: &Path) -> HarnessConfig {
    let mut config = HarnessConfig::default()
        .with_working_dir(working_dir)
        .with_syslog_ng(daemon_script(kind))
        .with_syslog_ng_ctl(fakes().dir.join("syslog-ng-ctl"))
        .with_poll(PollConfig::new(Duration::from_millis(10), Duration::from_secs(5)))
        .with_console(ConsoleConfig::default());
    config.external_tool = Some(vec!["/bin/sh".to_string()]);
    config.start_timeout_ms = 5_000;
    config.stop_timeout_ms = 5_000;
    config
}

/// Config for a real daemon, if `LIGHT_SYSLOG_NG` is set
pub fn real_config(working_dir: &Path) -> Option<HarnessConfig> {
    std::env::var_os("LIGHT_SYSLOG_NG")?;
    Some(HarnessConfig::from_env().with_working_dir(working_dir))
}
