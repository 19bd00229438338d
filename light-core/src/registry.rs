//! Unique Resource Registry
//!
//! Hands out file paths, directories, ports and name tokens that no other
//! allocation from the same registry will ever reuse. Tests running in
//! parallel share one registry (wrap it in an `Arc`) so their resources never
//! collide; there is no process-global instance.
//!
//! ```rust,no_run
//! use light_core::registry::{ResourceKind, ResourceRegistry};
//!
//! let registry = ResourceRegistry::new(std::env::temp_dir().join("light")).unwrap();
//! let first = registry.allocate("dst_file", ResourceKind::file()).unwrap();
//! let again = registry.allocate("dst_file", ResourceKind::file()).unwrap();
//! assert_eq!(first, again);
//! ```
//!
//! Ports are only checked against what this registry already issued. Whether
//! the OS would let anyone bind them is not verified, so two separate test
//! processes can still pick the same port.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::error::{LightError, Result};

/// Dynamic/private port range
pub const DYNAMIC_PORT_RANGE: RangeInclusive<u16> = 49152..=65535;

/// Random bytes in a name token (rendered as hex)
const TOKEN_BYTES: usize = 5;

/// What kind of resource to allocate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A file path (not created), optionally with an extension
    File { extension: Option<String> },
    /// A directory, created on allocation
    Dir,
    /// A Unix socket path (not created). The name is a short token so the
    /// whole path fits `sun_path`; the prefix only keys the allocation.
    Socket,
    TcpPort,
    UdpPort,
}

impl ResourceKind {
    pub fn file() -> Self {
        ResourceKind::File { extension: None }
    }

    pub fn file_with_extension(extension: &str) -> Self {
        ResourceKind::File {
            extension: Some(extension.trim_start_matches('.').to_string()),
        }
    }
}

/// An issued identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum UniqueId {
    Path(PathBuf),
    Port(u16),
}

impl UniqueId {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            UniqueId::Path(path) => Some(path),
            UniqueId::Port(_) => None,
        }
    }

    pub fn as_port(&self) -> Option<u16> {
        match self {
            UniqueId::Port(port) => Some(*port),
            UniqueId::Path(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    issued: HashMap<(String, ResourceKind), UniqueId>,
    order: Vec<(String, UniqueId)>,
    ports: HashSet<u16>,
    paths: HashSet<PathBuf>,
    tokens: HashSet<String>,
}

/// Collision-free allocator for one test run
#[derive(Debug)]
pub struct ResourceRegistry {
    run_dir: PathBuf,
    state: Mutex<RegistryState>,
}

impl ResourceRegistry {
    /// Create a registry whose paths live under a fresh timestamped
    /// subdirectory of `working_dir`
    pub fn new(working_dir: impl AsRef<Path>) -> Result<Self> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S-%3f");
        let run_dir = working_dir
            .as_ref()
            .join(format!("{}-{}", stamp, std::process::id()));
        std::fs::create_dir_all(&run_dir).map_err(|e| LightError::AllocationFailed {
            path: run_dir.clone(),
            reason: e.to_string(),
        })?;
        debug!(run_dir = %run_dir.display(), "resource registry created");

        Ok(Self {
            run_dir,
            state: Mutex::new(RegistryState::default()),
        })
    }

    /// Directory that holds every path this registry issues
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Allocate (or look up) the identifier for `prefix`
    ///
    /// A second call with the same prefix and kind returns the identifier
    /// issued the first time.
    pub fn allocate(&self, prefix: &str, kind: ResourceKind) -> Result<UniqueId> {
        let mut state = self.state.lock().map_err(|_| LightError::LockPoisoned)?;

        let key = (prefix.to_string(), kind.clone());
        if let Some(existing) = state.issued.get(&key) {
            return Ok(existing.clone());
        }

        let id = match &kind {
            ResourceKind::File { extension } => {
                UniqueId::Path(self.new_path(&mut state, prefix, extension.as_deref(), false)?)
            }
            ResourceKind::Dir => UniqueId::Path(self.new_path(&mut state, prefix, None, true)?),
            ResourceKind::Socket => UniqueId::Path(self.new_socket_path(&mut state)?),
            ResourceKind::TcpPort | ResourceKind::UdpPort => UniqueId::Port(new_port(&mut state)?),
        };

        debug!(prefix, ?id, "resource allocated");
        state.issued.insert(key, id.clone());
        state.order.push((prefix.to_string(), id.clone()));
        Ok(id)
    }

    pub fn file(&self, prefix: &str) -> Result<PathBuf> {
        self.allocate_path(prefix, ResourceKind::file())
    }

    pub fn file_with_extension(&self, prefix: &str, extension: &str) -> Result<PathBuf> {
        self.allocate_path(prefix, ResourceKind::file_with_extension(extension))
    }

    pub fn dir(&self, prefix: &str) -> Result<PathBuf> {
        self.allocate_path(prefix, ResourceKind::Dir)
    }

    /// Unix socket path; fails when the run directory leaves no room for it
    pub fn socket(&self, prefix: &str) -> Result<PathBuf> {
        self.allocate_path(prefix, ResourceKind::Socket)
    }

    pub fn tcp_port(&self, prefix: &str) -> Result<u16> {
        self.allocate_port(prefix, ResourceKind::TcpPort)
    }

    pub fn udp_port(&self, prefix: &str) -> Result<u16> {
        self.allocate_port(prefix, ResourceKind::UdpPort)
    }

    /// A random hex token never returned before by this registry
    ///
    /// Used to build statement names such as `src_file_0a1b2c3d4e`.
    pub fn unique_token(&self) -> Result<String> {
        let mut state = self.state.lock().map_err(|_| LightError::LockPoisoned)?;
        loop {
            let token = random_hex(TOKEN_BYTES);
            if state.tokens.insert(token.clone()) {
                return Ok(token);
            }
        }
    }

    /// `<prefix>_<token>`, unique within this registry
    pub fn unique_name(&self, prefix: &str) -> Result<String> {
        Ok(format!("{}_{}", prefix, self.unique_token()?))
    }

    /// Everything issued so far, in allocation order
    pub fn registered(&self) -> Vec<(String, UniqueId)> {
        self.state
            .lock()
            .map(|state| state.order.clone())
            .unwrap_or_default()
    }

    /// Paths issued so far; ports are left out
    pub fn registered_paths(&self) -> Vec<PathBuf> {
        self.registered()
            .into_iter()
            .filter_map(|(_, id)| id.as_path().map(Path::to_path_buf))
            .collect()
    }

    fn allocate_path(&self, prefix: &str, kind: ResourceKind) -> Result<PathBuf> {
        match self.allocate(prefix, kind)? {
            UniqueId::Path(path) => Ok(path),
            UniqueId::Port(_) => unreachable!("path kinds always yield paths"),
        }
    }

    fn allocate_port(&self, prefix: &str, kind: ResourceKind) -> Result<u16> {
        match self.allocate(prefix, kind)? {
            UniqueId::Port(port) => Ok(port),
            UniqueId::Path(_) => unreachable!("port kinds always yield ports"),
        }
    }

    fn new_path(
        &self,
        state: &mut RegistryState,
        prefix: &str,
        extension: Option<&str>,
        create_dir: bool,
    ) -> Result<PathBuf> {
        let path = loop {
            let token = random_hex(TOKEN_BYTES);
            let mut name = format!("{}_{}", prefix, token);
            if let Some(ext) = extension {
                name.push('.');
                name.push_str(ext);
            }
            let candidate = self.run_dir.join(name);
            if !state.paths.contains(&candidate) && !candidate.exists() {
                break candidate;
            }
        };

        let parent = path.parent().unwrap_or(&self.run_dir);
        std::fs::create_dir_all(parent).map_err(|e| LightError::AllocationFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if create_dir {
            std::fs::create_dir(&path).map_err(|e| LightError::AllocationFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        }

        state.paths.insert(path.clone());
        Ok(path)
    }

    fn new_socket_path(&self, state: &mut RegistryState) -> Result<PathBuf> {
        let path = loop {
            let candidate = self.run_dir.join(format!("s_{}.sock", random_hex(TOKEN_BYTES)));
            if !state.paths.contains(&candidate) && !candidate.exists() {
                break candidate;
            }
        };

        let limit = sun_path_capacity();
        if path.as_os_str().len() >= limit {
            return Err(LightError::AllocationFailed {
                reason: format!(
                    "socket path is {} bytes, must be shorter than {limit}; use a shorter working_dir",
                    path.as_os_str().len()
                ),
                path,
            });
        }

        state.paths.insert(path.clone());
        Ok(path)
    }
}

/// Size of `sockaddr_un.sun_path`, terminating NUL included
pub fn sun_path_capacity() -> usize {
    // SAFETY: sockaddr_un is plain old data, all zeroes is a valid value
    let addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_path.len()
}

fn new_port(state: &mut RegistryState) -> Result<u16> {
    let (low, high) = (*DYNAMIC_PORT_RANGE.start(), *DYNAMIC_PORT_RANGE.end());
    if state.ports.len() >= DYNAMIC_PORT_RANGE.len() {
        return Err(LightError::PortRangeExhausted { low, high });
    }
    let mut rng = rand::thread_rng();
    loop {
        let port = rng.gen_range(DYNAMIC_PORT_RANGE);
        if state.ports.insert(port) {
            return Ok(port);
        }
    }
}

/// Short random token for names that need no registry bookkeeping
pub fn unique_id() -> String {
    random_hex(TOKEN_BYTES)
}

/// Lowercase hex of `bytes` random bytes
pub fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..bytes)
        .map(|_| format!("{:02x}", rng.gen::<u8>()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn registry() -> (tempfile::TempDir, ResourceRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = ResourceRegistry::new(dir.path()).unwrap();
        (dir, registry)
    }

    #[test]
    fn test_same_prefix_is_idempotent() {
        let (_dir, registry) = registry();

        let a = registry.file("input").unwrap();
        let b = registry.file("input").unwrap();
        assert_eq!(a, b);

        let p1 = registry.tcp_port("src_tcp").unwrap();
        let p2 = registry.tcp_port("src_tcp").unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_distinct_prefixes_never_collide() {
        let (_dir, registry) = registry();

        let mut paths = HashSet::new();
        let mut ports = HashSet::new();
        for i in 0..10_000 {
            let prefix = format!("prefix{}", i);
            assert!(paths.insert(registry.file(&prefix).unwrap()));
            assert!(ports.insert(registry.tcp_port(&prefix).unwrap()));
        }
    }

    #[test]
    fn test_ports_in_dynamic_range() {
        let (_dir, registry) = registry();
        for i in 0..100 {
            let port = registry.udp_port(&format!("udp{}", i)).unwrap();
            assert!(DYNAMIC_PORT_RANGE.contains(&port));
        }
    }

    #[test]
    fn test_paths_live_under_run_dir() {
        let (dir, registry) = registry();
        let path = registry.file_with_extension("config", "conf").unwrap();

        assert!(path.starts_with(registry.run_dir()));
        assert!(registry.run_dir().starts_with(dir.path()));
        assert_eq!(path.extension().unwrap(), "conf");
        assert!(!path.exists());
    }

    #[test]
    fn test_dir_is_created() {
        let (_dir, registry) = registry();
        let path = registry.dir("workdir").unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn test_nested_prefix_creates_parent() {
        let (_dir, registry) = registry();
        let path = registry.file("nested/deeper/log").unwrap();
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn test_unique_tokens() {
        let (_dir, registry) = registry();
        let tokens: HashSet<String> = (0..1000).map(|_| registry.unique_token().unwrap()).collect();
        assert_eq!(tokens.len(), 1000);
        assert!(tokens.iter().all(|t| t.len() == TOKEN_BYTES * 2));
    }

    #[test]
    fn test_concurrent_port_allocation() {
        let (_dir, registry) = registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..200)
                        .map(|i| registry.tcp_port(&format!("t{}_{}", t, i)).unwrap())
                        .collect::<Vec<u16>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for port in handle.join().unwrap() {
                assert!(all.insert(port), "port {} issued twice", port);
            }
        }
        assert_eq!(all.len(), 1600);
    }

    #[test]
    fn test_registered_keeps_order() {
        let (_dir, registry) = registry();
        registry.file("first").unwrap();
        registry.tcp_port("second").unwrap();
        let registered = registry.registered();
        assert_eq!(registered.len(), 2);
        assert_eq!(registered[0].0, "first");
        assert!(registered[1].1.as_port().is_some());

        let paths = registry.registered_paths();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].starts_with(registry.run_dir()));
        assert_eq!(unique_id().len(), TOKEN_BYTES * 2);
    }

    #[test]
    fn test_socket_name_ignores_long_prefix() {
        let (_dir, registry) = registry();
        let prefix = "syslog_ng_test_file_source_with_negative_follow_freq_is_rejected_control";
        let socket = registry.socket(prefix).unwrap();

        assert!(socket.starts_with(registry.run_dir()));
        assert!(socket.as_os_str().len() < sun_path_capacity());
        assert!(!socket.to_string_lossy().contains("negative_follow_freq"));
        assert_eq!(registry.socket(prefix).unwrap(), socket);
        assert_ne!(registry.socket("other").unwrap(), socket);
        std::os::unix::net::UnixListener::bind(&socket).unwrap();
    }

    #[test]
    fn test_socket_rejected_when_run_dir_too_deep() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("d".repeat(sun_path_capacity()));
        let registry = ResourceRegistry::new(&deep).unwrap();

        let err = registry.socket("control").unwrap_err();
        assert_eq!(err.error_code(), "ALLOCATION_FAILED");
        assert!(err.to_string().contains("shorter than"));
        assert!(registry.registered().is_empty());
    }
}
