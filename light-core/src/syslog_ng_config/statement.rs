//! Statements: one named block of the configuration holding one driver

use std::fmt;

use serde::{Deserialize, Serialize};

use super::option::{set_option, OptionValue, Options};

/// Kind of a top-level configuration block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Source,
    Parser,
    Rewrite,
    Filter,
    Destination,
}

impl StatementKind {
    /// Rendering order of statement blocks
    pub const ALL: [StatementKind; 5] = [
        StatementKind::Source,
        StatementKind::Destination,
        StatementKind::Parser,
        StatementKind::Rewrite,
        StatementKind::Filter,
    ];

    /// Block keyword in the configuration language
    pub fn keyword(&self) -> &'static str {
        match self {
            StatementKind::Source => "source",
            StatementKind::Parser => "parser",
            StatementKind::Rewrite => "rewrite",
            StatementKind::Filter => "filter",
            StatementKind::Destination => "destination",
        }
    }

    /// Prefix of generated statement names
    pub fn id_prefix(&self) -> &'static str {
        match self {
            StatementKind::Source => "src",
            StatementKind::Parser => "parser",
            StatementKind::Rewrite => "rewrite",
            StatementKind::Filter => "filter",
            StatementKind::Destination => "dst",
        }
    }

    /// Position inside a log path; declaration order of the enum
    pub(crate) fn phase(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Unique name of a statement block within one document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementId {
    kind: StatementKind,
    name: String,
}

impl StatementId {
    pub(crate) fn new(kind: StatementKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<StatementId> for StatementId {
    fn as_ref(&self) -> &StatementId {
        self
    }
}

/// Driver invocation: `driver_name(positional... name(value)...)`
///
/// An empty driver name renders a bare parenthesized expression, which is
/// how filter expressions are written.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    driver_name: String,
    positional: Vec<OptionValue>,
    options: Options,
}

impl Statement {
    pub fn new(driver_name: impl Into<String>) -> Self {
        Self {
            driver_name: driver_name.into(),
            positional: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Filter expression, rendered verbatim
    pub fn expression(expr: impl Into<String>) -> Self {
        Self::new("").with_positional(OptionValue::Raw(expr.into()))
    }

    pub fn with_positional(mut self, value: impl Into<OptionValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set_option(name, value);
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        for (name, value) in options {
            self.set_option(name, value);
        }
        self
    }

    /// Replace a same-named option, otherwise append
    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        set_option(&mut self.options, name, value);
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn positional(&self) -> &[OptionValue] {
        &self.positional
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Named block; the driver is attached separately
#[derive(Debug, Clone)]
pub(crate) struct StatementGroup {
    pub(crate) id: StatementId,
    pub(crate) statement: Option<Statement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut kinds = StatementKind::ALL.to_vec();
        kinds.sort_by_key(StatementKind::phase);
        assert_eq!(
            kinds,
            vec![
                StatementKind::Source,
                StatementKind::Parser,
                StatementKind::Rewrite,
                StatementKind::Filter,
                StatementKind::Destination,
            ]
        );
    }

    #[test]
    fn test_statement_options_replace() {
        let statement = Statement::new("file")
            .with_positional("/tmp/in.log")
            .with_option("follow-freq", 1)
            .with_option("follow-freq", 0);
        assert_eq!(statement.options().len(), 1);
        assert_eq!(statement.option("follow-freq"), Some(&OptionValue::Int(0)));
    }
}
