//! Per-instance file layout

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::ResourceRegistry;

/// Every file one daemon instance uses, allocated from the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancePaths {
    pub instance_name: String,
    pub working_dir: PathBuf,
    pub config: PathBuf,
    pub persist: PathBuf,
    pub pid: PathBuf,
    pub control_socket: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl InstancePaths {
    pub fn allocate(registry: &ResourceRegistry, instance_name: &str) -> Result<Self> {
        let file = |what: &str, extension: &str| {
            registry.file_with_extension(&format!("syslog_ng_{instance_name}_{what}"), extension)
        };
        Ok(Self {
            instance_name: instance_name.to_string(),
            working_dir: registry.run_dir().to_path_buf(),
            config: file("config", "conf")?,
            persist: file("persist", "persist")?,
            pid: file("pid", "pid")?,
            control_socket: registry.socket(&format!("syslog_ng_{instance_name}_control"))?,
            stdout: file("stdout", "log")?,
            stderr: file("stderr", "log")?,
        })
    }

    /// Capture files for a one-shot run such as `--syntax-only`
    pub fn captures_for(&self, postfix: &str) -> (PathBuf, PathBuf) {
        (with_postfix(&self.stdout, postfix), with_postfix(&self.stderr, postfix))
    }
}

fn with_postfix(path: &Path, postfix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}_{postfix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{postfix}"),
    };
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_distinct_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ResourceRegistry::new(dir.path()).unwrap();
        let paths = InstancePaths::allocate(&registry, "server").unwrap();
        let again = InstancePaths::allocate(&registry, "server").unwrap();
        assert_eq!(paths, again);

        let all = [&paths.config, &paths.persist, &paths.pid, &paths.control_socket, &paths.stdout, &paths.stderr];
        for (i, a) in all.iter().enumerate() {
            assert!(a.starts_with(registry.run_dir()));
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(paths.config.extension().unwrap(), "conf");
    }

    #[test]
    fn test_control_socket_fits_sun_path_for_long_names() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ResourceRegistry::new(dir.path()).unwrap();
        let name = "test_file_source_with_negative_follow_freq_is_rejected";
        let paths = InstancePaths::allocate(&registry, name).unwrap();

        assert!(paths.control_socket.as_os_str().len() < crate::registry::sun_path_capacity());
        assert!(paths.config.to_string_lossy().contains(name));
        std::os::unix::net::UnixListener::bind(&paths.control_socket).unwrap();
    }

    #[test]
    fn test_capture_postfix() {
        assert_eq!(
            with_postfix(Path::new("/run/syslog_ng_stderr_ab12.log"), "syntax_only"),
            PathBuf::from("/run/syslog_ng_stderr_ab12_syntax_only.log")
        );
    }
}
