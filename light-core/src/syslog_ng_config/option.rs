//! Option values of configuration statements

use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Ordered `name(value)` list; insertion order is kept when rendering
pub type Options = Vec<(String, OptionValue)>;

/// Value of one named option or positional parameter
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// Quoted string: `"value"`
    Str(String),
    /// Verbatim text: `$(format-json --scope rfc5424)`, `none`, `yes`
    Raw(String),
    Int(i64),
    /// `yes` / `no`
    Bool(bool),
    /// Block of sub-options: `tls(peer-verify(none) key-file("..."))`
    Nested(Options),
    /// Option repeated once per element
    List(Vec<OptionValue>),
    /// `"key" => value` pairs
    Arrowed(Vec<(String, OptionValue)>),
}

impl OptionValue {
    pub fn str(value: impl Into<String>) -> Self {
        OptionValue::Str(value.into())
    }

    pub fn raw(value: impl Into<String>) -> Self {
        OptionValue::Raw(value.into())
    }

    pub fn nested<N, V>(options: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<OptionValue>,
    {
        OptionValue::Nested(options.into_iter().map(|(n, v)| (n.into(), v.into())).collect())
    }

    /// Single-line rendering, as used between the parentheses of `name(...)`
    pub fn render_inline(&self) -> String {
        match self {
            OptionValue::Str(s) => quote(s),
            OptionValue::Raw(s) => s.clone(),
            OptionValue::Int(i) => i.to_string(),
            OptionValue::Bool(b) => (if *b { "yes" } else { "no" }).to_string(),
            OptionValue::Nested(options) => options
                .iter()
                .map(|(name, value)| format!("{name}({})", value.render_inline()))
                .collect::<Vec<_>>()
                .join(" "),
            OptionValue::List(items) => items
                .iter()
                .map(OptionValue::render_inline)
                .collect::<Vec<_>>()
                .join(" "),
            OptionValue::Arrowed(pairs) => pairs
                .iter()
                .map(|(key, value)| format!("{} => {}", quote(key), value.render_inline()))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

impl From<&Path> for OptionValue {
    fn from(value: &Path) -> Self {
        OptionValue::Str(value.display().to_string())
    }
}

impl From<PathBuf> for OptionValue {
    fn from(value: PathBuf) -> Self {
        OptionValue::from(value.as_path())
    }
}

impl From<IpAddr> for OptionValue {
    fn from(value: IpAddr) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

macro_rules! int_option_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for OptionValue {
                fn from(value: $t) -> Self {
                    OptionValue::Int(i64::from(value))
                }
            }
        )*
    };
}

int_option_value!(i8, i16, i32, i64, u8, u16, u32);

/// Double-quote `value`, escaping backslashes and quotes
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Replace `name` in place, or append it
pub fn set_option(options: &mut Options, name: impl Into<String>, value: impl Into<OptionValue>) {
    let name = name.into();
    let value = value.into();
    match options.iter_mut().find(|(existing, _)| *existing == name) {
        Some((_, slot)) => *slot = value,
        None => options.push((name, value)),
    }
}

/// Structural defaults overlaid with caller overrides; overrides win
pub fn merge_options(defaults: Options, overrides: Options) -> Options {
    let mut merged = defaults;
    for (name, value) in overrides {
        set_option(&mut merged, name, value);
    }
    merged
}
