//! Log message formatting
//!
//! Renders a [`LogMessageFields`] set into BSD (RFC 3164 style) or IETF
//! (RFC 5424 style, octet-counted) wire text. Formatting is a pure function
//! of its inputs.
//!
//! Field presence, not field value, decides the output shape: an absent
//! field is left out together with its separator, never replaced by a
//! placeholder. An IETF NILVALUE (`-`) appears only if the caller sets the
//! field to `-` explicitly.
//!
//! ```rust
//! use light_core::message::{format_message, LogMessageFields, MessageFormat};
//!
//! let fields = LogMessageFields::new()
//!     .priority(13)
//!     .timestamp("Oct 11 22:14:15")
//!     .hostname("host")
//!     .program("prog")
//!     .pid("42")
//!     .message("hello");
//! assert_eq!(
//!     format_message(&fields, MessageFormat::Bsd, false),
//!     "<13>Oct 11 22:14:15 host prog[42]: hello"
//! );
//! ```

use serde::{Deserialize, Serialize};

pub const DEFAULT_PRIORITY: u16 = 13;
pub const DEFAULT_BSD_TIMESTAMP: &str = "Oct 11 22:14:15";
pub const DEFAULT_ISO_TIMESTAMP: &str = "2003-10-11T22:14:15.003Z";
pub const DEFAULT_PROGRAM: &str = "test-program";
pub const DEFAULT_PID: &str = "9999";
pub const DEFAULT_MESSAGE: &str = "test message";

/// IETF syslog protocol version
const IETF_VERSION: &str = "1";

/// Wire format variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// `<pri>timestamp host program[pid]: message`
    Bsd,
    /// `LEN <pri>1 timestamp host program pid msgid sdata message`
    Ietf,
}

/// Ordered set of optional message fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessageFields {
    pub priority: Option<u16>,
    pub timestamp: Option<String>,
    pub hostname: Option<String>,
    pub program: Option<String>,
    pub pid: Option<String>,
    /// IETF only
    pub msgid: Option<String>,
    /// IETF only, rendered verbatim
    pub sdata: Option<String>,
    pub message: Option<String>,
}

impl LogMessageFields {
    /// Every field absent
    pub fn new() -> Self {
        Self::default()
    }

    /// The defaults used by generated BSD traffic
    pub fn bsd_defaults() -> Self {
        Self::new()
            .priority(DEFAULT_PRIORITY)
            .timestamp(DEFAULT_BSD_TIMESTAMP)
            .hostname(local_hostname())
            .program(DEFAULT_PROGRAM)
            .pid(DEFAULT_PID)
            .message(DEFAULT_MESSAGE)
    }

    /// The defaults used by generated IETF traffic
    pub fn ietf_defaults() -> Self {
        Self::new()
            .priority(DEFAULT_PRIORITY)
            .timestamp(DEFAULT_ISO_TIMESTAMP)
            .hostname(local_hostname())
            .program(DEFAULT_PROGRAM)
            .pid(DEFAULT_PID)
            .msgid("-")
            .sequence_id(1)
            .message(DEFAULT_MESSAGE)
    }

    pub fn priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn pid(mut self, pid: impl Into<String>) -> Self {
        self.pid = Some(pid.into());
        self
    }

    pub fn msgid(mut self, msgid: impl Into<String>) -> Self {
        self.msgid = Some(msgid.into());
        self
    }

    pub fn sdata(mut self, sdata: impl Into<String>) -> Self {
        self.sdata = Some(sdata.into());
        self
    }

    /// `[meta sequenceId="N"]`
    pub fn sequence_id(self, sequence: u64) -> Self {
        self.sdata(format!("[meta sequenceId=\"{}\"]", sequence))
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Render `fields` in the requested variant
///
/// With `add_newline` a `\n` terminates the message. For IETF the newline is
/// part of the counted payload, so the length prefix always equals the byte
/// length of everything after the first space.
pub fn format_message(fields: &LogMessageFields, format: MessageFormat, add_newline: bool) -> String {
    match format {
        MessageFormat::Bsd => {
            let mut out = format_bsd(fields);
            if add_newline {
                out.push('\n');
            }
            out
        }
        MessageFormat::Ietf => {
            let mut payload = format_ietf_payload(fields);
            if add_newline {
                payload.push('\n');
            }
            frame_octet_counted(&payload)
        }
    }
}

/// Prefix `payload` with its UTF-8 byte length and a space
pub fn frame_octet_counted(payload: &str) -> String {
    format!("{} {}", payload.len(), payload)
}

fn priority_prefix(fields: &LogMessageFields) -> String {
    fields
        .priority
        .map(|pri| format!("<{}>", pri))
        .unwrap_or_default()
}

fn format_bsd(fields: &LogMessageFields) -> String {
    let tag = match (&fields.program, &fields.pid) {
        (Some(program), Some(pid)) => Some(format!("{}[{}]", program, pid)),
        (Some(program), None) => Some(program.clone()),
        (None, Some(pid)) => Some(format!("[{}]", pid)),
        (None, None) => None,
    };
    // The colon separates tag from message and only exists when both do
    let tag = tag.map(|tag| {
        if fields.message.is_some() {
            format!("{}:", tag)
        } else {
            tag
        }
    });

    let parts: Vec<&str> = [
        fields.timestamp.as_deref(),
        fields.hostname.as_deref(),
        tag.as_deref(),
        fields.message.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();

    format!("{}{}", priority_prefix(fields), parts.join(" "))
}

fn format_ietf_payload(fields: &LogMessageFields) -> String {
    let parts: Vec<&str> = [
        Some(IETF_VERSION),
        fields.timestamp.as_deref(),
        fields.hostname.as_deref(),
        fields.program.as_deref(),
        fields.pid.as_deref(),
        fields.msgid.as_deref(),
        fields.sdata.as_deref(),
        fields.message.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();

    format!("{}{}", priority_prefix(fields), parts.join(" "))
}

/// Host name of this machine, as the daemon would report it
pub fn local_hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes and gethostname NUL-terminates
    // on success when the name fits.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Generates numbered messages for bulk feeding
///
/// Message `i` (1-based) carries the body `"<template body> - counter: i"`.
/// IETF messages whose template sdata is a bare `[meta sequenceId="N"]` block
/// get `sequenceId` i; any other sdata is sent unchanged.
#[derive(Debug, Clone)]
pub struct MessageGenerator {
    template: LogMessageFields,
    format: MessageFormat,
}

impl MessageGenerator {
    pub fn new(template: LogMessageFields, format: MessageFormat) -> Self {
        Self { template, format }
    }

    pub fn bsd() -> Self {
        Self::new(LogMessageFields::bsd_defaults(), MessageFormat::Bsd)
    }

    pub fn ietf() -> Self {
        Self::new(LogMessageFields::ietf_defaults(), MessageFormat::Ietf)
    }

    /// The `index`-th message (1-based), newline terminated
    pub fn message(&self, index: u64) -> String {
        let body = self.template.message.as_deref().unwrap_or(DEFAULT_MESSAGE);
        let mut fields = self
            .template
            .clone()
            .message(format!("{} - counter: {}", body, index));
        if self.format == MessageFormat::Ietf && fields.sdata.as_deref().is_some_and(is_sequence_block) {
            fields = fields.sequence_id(index);
        }
        format_message(&fields, self.format, true)
    }

    pub fn generate(&self, count: u64) -> Vec<String> {
        (1..=count).map(|i| self.message(i)).collect()
    }
}

fn is_sequence_block(sdata: &str) -> bool {
    sdata
        .strip_prefix("[meta sequenceId=\"")
        .and_then(|rest| rest.strip_suffix("\"]"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}
