//! Log paths: routing rules from sources through processing to destinations

use std::fmt;

use super::statement::{StatementId, StatementKind};
use crate::error::{LightError, Result};

/// Log path flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPathFlag {
    Final,
    Fallback,
    Catchall,
    FlowControl,
    Other(String),
}

impl fmt::Display for LogPathFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogPathFlag::Final => f.write_str("final"),
            LogPathFlag::Fallback => f.write_str("fallback"),
            LogPathFlag::Catchall => f.write_str("catchall"),
            LogPathFlag::FlowControl => f.write_str("flow-control"),
            LogPathFlag::Other(flag) => f.write_str(flag),
        }
    }
}

/// `log [NAME] { ... };`
///
/// Statements render in phase order source, parser, rewrite, filter,
/// destination. Order within one phase is insertion order. A statement may
/// appear in any number of paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogPath {
    name: Option<String>,
    statements: Vec<StatementId>,
    inner: Vec<LogPath>,
    flags: Vec<LogPathFlag>,
}

impl LogPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Add a statement; its kind decides the phase
    pub fn with(mut self, id: impl AsRef<StatementId>) -> Self {
        self.statements.push(id.as_ref().clone());
        self
    }

    pub fn with_all<I>(mut self, ids: impl IntoIterator<Item = I>) -> Self
    where
        I: AsRef<StatementId>,
    {
        self.statements.extend(ids.into_iter().map(|id| id.as_ref().clone()));
        self
    }

    /// Nested `log { ... };` rendered after this path's own statements
    pub fn with_inner(mut self, inner: LogPath) -> Self {
        self.inner.push(inner);
        self
    }

    pub fn with_flag(mut self, flag: LogPathFlag) -> Self {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn inner(&self) -> &[LogPath] {
        &self.inner
    }

    pub fn flags(&self) -> &[LogPathFlag] {
        &self.flags
    }

    /// Statements in rendering order
    pub fn ordered(&self) -> Vec<&StatementId> {
        let mut ordered: Vec<&StatementId> = self.statements.iter().collect();
        ordered.sort_by_key(|id| id.kind().phase());
        ordered
    }

    /// Every statement referenced here or in nested paths
    pub fn referenced(&self) -> Vec<&StatementId> {
        let mut all: Vec<&StatementId> = self.statements.iter().collect();
        for inner in &self.inner {
            all.extend(inner.referenced());
        }
        all
    }

    fn count(&self, kind: StatementKind) -> usize {
        self.referenced().iter().filter(|id| id.kind() == kind).count()
    }

    /// A top-level path must reach at least one source and one destination,
    /// counting nested paths
    pub fn validate(&self) -> Result<()> {
        let label = self.name.as_deref().unwrap_or("<unnamed>");
        if self.count(StatementKind::Source) == 0 {
            return Err(LightError::InvalidLogPath {
                reason: format!("log path {label} has no source"),
            });
        }
        if self.count(StatementKind::Destination) == 0 {
            return Err(LightError::InvalidLogPath {
                reason: format!("log path {label} has no destination"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(kind: StatementKind, name: &str) -> StatementId {
        StatementId::new(kind, name)
    }

    #[test]
    fn test_phase_ordering_is_stable() {
        let path = LogPath::new()
            .with(id(StatementKind::Destination, "d1"))
            .with(id(StatementKind::Rewrite, "r1"))
            .with(id(StatementKind::Source, "s1"))
            .with(id(StatementKind::Parser, "p2"))
            .with(id(StatementKind::Parser, "p1"));
        let names: Vec<&str> = path.ordered().iter().map(|id| id.name()).collect();
        assert_eq!(names, vec!["s1", "p2", "p1", "r1", "d1"]);
    }

    #[test]
    fn test_validation_requires_both_ends() {
        let err = LogPath::new()
            .with(id(StatementKind::Destination, "d"))
            .validate()
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_LOG_PATH");
        assert!(err.to_string().contains("no source"));

        let err = LogPath::named("only_src")
            .with(id(StatementKind::Source, "s"))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("only_src"));
    }

    #[test]
    fn test_destination_in_inner_path_counts() {
        let path = LogPath::new()
            .with(id(StatementKind::Source, "s"))
            .with_inner(LogPath::new().with(id(StatementKind::Destination, "d")))
            .with_flag(LogPathFlag::FlowControl)
            .with_flag(LogPathFlag::FlowControl);
        assert!(path.validate().is_ok());
        assert_eq!(path.flags().len(), 1);
        assert_eq!(path.referenced().len(), 2);
    }
}
