//! Counter snapshots parsed from control-tool output
//!
//! Two layouts exist:
//!
//! ```text
//! stats:  SourceName;SourceId;SourceInstance;State;Type;Number
//!         src.file;s_in#0;/tmp/in.log;a;processed;5
//! query:  src.file.s_in#0./tmp/in.log.processed=5
//! ```
//!
//! Both parse into [`StatCounter`] records. A snapshot is never cached: a
//! fresh one is fetched for every lookup.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LightError, Result};

const STATS_HEADER: &str = "SourceName;SourceId;SourceInstance;State;Type;Number";

/// One counter of one driver instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatCounter {
    /// `src`, `dst`, `center`, `global`, ...
    pub group_type: String,
    /// `file`, `network`, ...; empty for groups without a driver part
    pub driver_name: String,
    /// Statement id with its instance number, e.g. `s_in#0`
    pub id: String,
    /// Instance qualifier such as the file path or peer address
    pub instance: String,
    /// `a`ctive, `d`ynamic, `o`rphan; absent in query output
    pub state: Option<String>,
    pub counter_name: String,
    pub value: i64,
}

impl StatCounter {
    /// Higher for rows carrying more qualifiers
    fn specificity(&self) -> u8 {
        u8::from(!self.id.is_empty()) + u8::from(!self.instance.is_empty())
    }
}

fn split_source_name(name: &str) -> (String, String) {
    match name.split_once('.') {
        Some((group, driver)) => (group.to_string(), driver.to_string()),
        None => (name.to_string(), String::new()),
    }
}

fn parse_value(raw: &str, line: &str) -> Result<i64> {
    raw.trim().parse().map_err(|_| LightError::MalformedStats {
        line: line.to_string(),
    })
}

const QUERY_LINE: &str = r"^(?P<key>[^=\s][^=]*)=(?P<value>-?\d+)$";

fn query_line() -> Result<&'static Regex> {
    static COMPILED: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    COMPILED
        .get_or_init(|| Regex::new(QUERY_LINE))
        .as_ref()
        .map_err(|e| LightError::InvalidPattern {
            pattern: QUERY_LINE.to_string(),
            reason: e.to_string(),
        })
}

/// Parsed counter dump
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    counters: Vec<StatCounter>,
}

impl StatsSnapshot {
    /// Parse `stats` CSV output
    ///
    /// The header and blank lines are skipped. Any other line that does not
    /// have six fields with an integer last field is a protocol error.
    pub fn parse_stats(output: &str) -> Result<Self> {
        let mut counters = Vec::new();
        for line in output.lines().map(str::trim_end) {
            if line.is_empty() || line == STATS_HEADER {
                continue;
            }
            let fields: Vec<&str> = line.split(';').collect();
            if fields.len() < 6 {
                return Err(LightError::MalformedStats {
                    line: line.to_string(),
                });
            }
            let n = fields.len();
            let (group_type, driver_name) = split_source_name(fields[0]);
            counters.push(StatCounter {
                group_type,
                driver_name,
                id: fields[1].to_string(),
                // instance may itself contain ';'
                instance: fields[2..n - 3].join(";"),
                state: Some(fields[n - 3].to_string()),
                counter_name: fields[n - 2].to_string(),
                value: parse_value(fields[n - 1], line)?,
            });
        }
        Ok(Self { counters })
    }

    /// Parse `query get|list` output (`key=value` lines)
    ///
    /// `list` output without values is rejected; only `get` output carries
    /// counters.
    pub fn parse_query(output: &str) -> Result<Self> {
        let query_line = query_line()?;
        let mut counters = Vec::new();
        for line in output.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            let malformed = || LightError::MalformedStats {
                line: line.to_string(),
            };
            let captures = query_line.captures(line).ok_or_else(malformed)?;
            let key = &captures["key"];
            let value = parse_value(&captures["value"], line)?;

            let (path, counter_name) = key.rsplit_once('.').ok_or_else(malformed)?;
            let mut parts = path.splitn(3, '.');
            let group_type = parts.next().unwrap_or_default().to_string();
            let driver_name = parts.next().unwrap_or_default().to_string();
            let rest = parts.next().unwrap_or_default();

            // "s_in#0./tmp/in.log" -> id "s_in#0", instance "/tmp/in.log"
            let (id, instance) = match rest.split_once('.') {
                Some((head, tail)) if head.contains('#') => (head.to_string(), tail.to_string()),
                _ if rest.contains('#') && !rest.contains('.') => (rest.to_string(), String::new()),
                _ => (String::new(), rest.to_string()),
            };

            counters.push(StatCounter {
                group_type,
                driver_name,
                id,
                instance,
                state: None,
                counter_name: counter_name.to_string(),
                value,
            });
        }
        Ok(Self { counters })
    }

    pub fn counters(&self) -> &[StatCounter] {
        &self.counters
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Counters of `(group_type, driver_name)` as `counter_name -> value`
    ///
    /// When several rows carry the same counter, the most specific one wins
    /// (id and instance present beats bare group rows).
    pub fn lookup(&self, group_type: &str, driver_name: &str) -> HashMap<String, i64> {
        let mut best: HashMap<String, (u8, i64)> = HashMap::new();
        for counter in self
            .counters
            .iter()
            .filter(|c| c.group_type == group_type && c.driver_name == driver_name)
        {
            let specificity = counter.specificity();
            best.entry(counter.counter_name.clone())
                .and_modify(|slot| {
                    if specificity > slot.0 {
                        *slot = (specificity, counter.value);
                    }
                })
                .or_insert((specificity, counter.value));
        }
        best.into_iter().map(|(name, (_, value))| (name, value)).collect()
    }

    pub fn get(&self, group_type: &str, driver_name: &str, counter_name: &str) -> Option<i64> {
        self.lookup(group_type, driver_name).get(counter_name).copied()
    }

    /// Counters whose statement id starts with `statement` (e.g. `s_in` for `s_in#0`)
    pub fn for_statement<'a>(&'a self, statement: &'a str) -> impl Iterator<Item = &'a StatCounter> + 'a {
        self.counters
            .iter()
            .filter(move |c| c.id.split('#').next() == Some(statement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS: &str = "\
SourceName;SourceId;SourceInstance;State;Type;Number
center;;received;a;processed;12
src.file;s_in#0;/tmp/in.log;a;processed;5
src.file;s_in#0;/tmp/in.log;a;stamp;1700000000
src.file;;;a;processed;7
dst.file;d_out#0;/tmp/out.log;a;written;5
dst.file;d_out#0;/tmp/out.log;a;dropped;0
";

    #[test]
    fn test_parse_stats_rows() {
        let snapshot = StatsSnapshot::parse_stats(STATS).unwrap();
        assert_eq!(snapshot.counters().len(), 6);
        let center = &snapshot.counters()[0];
        assert_eq!(center.group_type, "center");
        assert_eq!(center.driver_name, "");
        assert_eq!(center.instance, "received");
        assert_eq!(center.state.as_deref(), Some("a"));
    }

    #[test]
    fn test_most_specific_row_wins() {
        let snapshot = StatsSnapshot::parse_stats(STATS).unwrap();
        let counters = snapshot.lookup("src", "file");
        assert_eq!(counters.get("processed"), Some(&5));
        assert_eq!(snapshot.get("dst", "file", "written"), Some(5));
        assert_eq!(snapshot.get("dst", "file", "queued"), None);
    }

    #[test]
    fn test_instance_with_separator() {
        let snapshot = StatsSnapshot::parse_stats("src.program;s#0;a;b;a;processed;3\n").unwrap();
        assert_eq!(snapshot.counters()[0].instance, "a;b");
        assert_eq!(snapshot.counters()[0].value, 3);
    }

    #[test]
    fn test_malformed_stats_line() {
        let err = StatsSnapshot::parse_stats("src.file;s_in#0;processed\n").unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_STATS");
        let err = StatsSnapshot::parse_stats("src.file;s;i;a;processed;many\n").unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_STATS");
    }

    #[test]
    fn test_parse_query_lines() {
        let output = "src.file.s_in#0./tmp/in.log.processed=5\ncenter.received.processed=12\ndst.network.d_net#0.written=3\n";
        let snapshot = StatsSnapshot::parse_query(output).unwrap();
        let file = &snapshot.counters()[0];
        assert_eq!(file.id, "s_in#0");
        assert_eq!(file.instance, "/tmp/in.log");
        assert_eq!(file.counter_name, "processed");
        assert_eq!(file.state, None);

        let center = &snapshot.counters()[1];
        assert_eq!((center.group_type.as_str(), center.driver_name.as_str()), ("center", "received"));

        let net = &snapshot.counters()[2];
        assert_eq!(net.id, "d_net#0");
        assert!(net.instance.is_empty());
        assert_eq!(snapshot.for_statement("d_net").count(), 1);
    }

    #[test]
    fn test_query_pattern_compiles() {
        let re = query_line().unwrap();
        assert!(re.is_match("dst.file.d_out#0.written=-1"));
        assert!(!re.is_match("=3"));
    }

    #[test]
    fn test_query_list_output_rejected() {
        let err = StatsSnapshot::parse_query("src.file.s_in#0.processed\n").unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_STATS");
    }
}
