//! Source and destination drivers with their paired I/O
//!
//! A [`SourceDriver`] is the harness side of a daemon source: the test writes
//! into it and the daemon reads. A [`DestinationDriver`] is the harness side
//! of a daemon destination: the daemon writes and the test reads lines back.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::option::{merge_options, OptionValue, Options};
use super::statement::StatementId;
use crate::config::{HarnessConfig, MqttConfig, PollConfig};
use crate::error::{LightError, Result};
use crate::io::{DriverIo, FileIo, IoStats, ListenerStop, SocketAddress, SocketKind, SocketListener, SocketSender};
use crate::reader::LineReader;
use crate::timing::Poller;

/// Settings the drivers need to open their I/O
#[derive(Debug, Clone, Default)]
pub struct IoContext {
    pub poll: PollConfig,
    pub mqtt: MqttConfig,
}

impl From<&HarnessConfig> for IoContext {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            poll: config.poll,
            mqtt: config.mqtt.clone(),
        }
    }
}

impl IoContext {
    pub fn poller(&self) -> Poller {
        self.poll.into()
    }
}

/// Transport family of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    File,
    Socket(SocketKind),
    Mqtt,
    Internal,
    ExampleMsgGenerator,
}

impl DriverKind {
    /// Driver name in the configuration language
    pub fn driver_name(&self) -> &'static str {
        match self {
            DriverKind::File => "file",
            DriverKind::Socket(SocketKind::UnixStream) => "unix-stream",
            DriverKind::Socket(SocketKind::UnixDgram) => "unix-dgram",
            DriverKind::Socket(_) => "network",
            DriverKind::Mqtt => "mqtt",
            DriverKind::Internal => "internal",
            DriverKind::ExampleMsgGenerator => "example-msg-generator",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Socket(kind) => write!(f, "{kind}"),
            other => f.write_str(other.driver_name()),
        }
    }
}

/// How the harness reaches a driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endpoint {
    Path(PathBuf),
    Socket(SocketAddress),
    Topic { topic: String, qos: u8 },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Path(path) => write!(f, "{}", path.display()),
            Endpoint::Socket(address) => write!(f, "{address}"),
            Endpoint::Topic { topic, qos } => write!(f, "topic {topic} (qos {qos})"),
        }
    }
}

/// Kind and address of one endpoint, enough to open its paired I/O
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProperties {
    pub kind: DriverKind,
    pub endpoint: Endpoint,
}

impl DriverProperties {
    pub fn new(kind: DriverKind, endpoint: Endpoint) -> Self {
        Self { kind, endpoint }
    }

    /// Datagram transports carry one message per write
    pub fn is_datagram(&self) -> bool {
        matches!(self.kind, DriverKind::Socket(kind) if !kind.is_stream()) || self.kind == DriverKind::Mqtt
    }

    /// Writer feeding a daemon source
    pub fn open_writer(&self, io: &IoContext, send_delay: Option<Duration>) -> Result<Box<dyn DriverIo>> {
        match (&self.kind, &self.endpoint) {
            (DriverKind::File, Endpoint::Path(path)) => Ok(Box::new(FileIo::new(path.clone(), io.poller()))),
            (DriverKind::Socket(kind), Endpoint::Socket(address)) => {
                let mut sender = SocketSender::new(*kind, address.clone(), io.poller())?;
                if let Some(delay) = send_delay {
                    sender = sender.with_send_delay(delay);
                }
                Ok(Box::new(sender))
            }
            #[cfg(feature = "mqtt")]
            (DriverKind::Mqtt, Endpoint::Topic { topic, qos }) => Ok(Box::new(crate::io::MqttIo::new(
                &io.mqtt,
                crate::io::MqttRole::Publisher,
                topic.clone(),
                *qos,
                io.poller(),
            ))),
            _ => Err(LightError::unsupported(self.kind.to_string(), "open writer")),
        }
    }

    /// Reader behind a daemon destination
    ///
    /// Socket listeners bind here and also hand back their stop handle.
    pub fn open_reader(&self, io: &IoContext) -> Result<(Box<dyn DriverIo>, Option<ListenerStop>)> {
        match (&self.kind, &self.endpoint) {
            (DriverKind::File, Endpoint::Path(path)) => {
                Ok((Box::new(FileIo::new(path.clone(), io.poller())), None))
            }
            (DriverKind::Socket(kind), Endpoint::Socket(address)) => {
                let listener = SocketListener::start(*kind, address.clone(), io.poller())?;
                let stop = listener.stop_handle();
                Ok((Box::new(listener), Some(stop)))
            }
            #[cfg(feature = "mqtt")]
            (DriverKind::Mqtt, Endpoint::Topic { topic, qos }) => Ok((
                Box::new(crate::io::MqttIo::new(
                    &io.mqtt,
                    crate::io::MqttRole::Subscriber,
                    topic.clone(),
                    *qos,
                    io.poller(),
                )),
                None,
            )),
            _ => Err(LightError::unsupported(self.kind.to_string(), "open reader")),
        }
    }
}

// ============================================================================
// Per-kind options
// ============================================================================

/// `file()` source
#[derive(Debug, Clone, Default)]
pub struct FileSourceOptions {
    /// Input file; allocated from the registry when unset
    pub path: Option<PathBuf>,
    pub follow_freq: Option<i64>,
    pub flags: Vec<String>,
    /// Any other option; wins over the fields above
    pub extra: Options,
}

impl FileSourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow_freq(mut self, freq: i64) -> Self {
        self.follow_freq = Some(freq);
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    pub(crate) fn into_options(self) -> Options {
        let mut structural = Options::new();
        if let Some(freq) = self.follow_freq {
            structural.push(("follow-freq".to_string(), OptionValue::Int(freq)));
        }
        if !self.flags.is_empty() {
            structural.push(("flags".to_string(), OptionValue::Raw(self.flags.join(", "))));
        }
        merge_options(structural, self.extra)
    }
}

/// `file()` destination
#[derive(Debug, Clone, Default)]
pub struct FileDestinationOptions {
    /// Output file; allocated from the registry when unset
    pub path: Option<PathBuf>,
    pub template: Option<String>,
    pub extra: Options,
}

impl FileDestinationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    pub(crate) fn into_options(self) -> Options {
        let mut structural = Options::new();
        if let Some(template) = self.template {
            structural.push(("template".to_string(), OptionValue::Str(template)));
        }
        merge_options(structural, self.extra)
    }
}

/// `network()` source or destination over TCP/UDP
#[derive(Debug, Clone, Default)]
pub struct NetworkOptions {
    /// Loopback of the socket family when unset
    pub ip: Option<IpAddr>,
    /// Allocated from the registry when unset
    pub port: Option<u16>,
    /// Pause after every message the harness sends
    pub send_delay: Option<Duration>,
    pub extra: Options,
}

impl NetworkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }
}

/// `unix-stream()` / `unix-dgram()` source or destination
#[derive(Debug, Clone, Default)]
pub struct UnixSocketOptions {
    /// Socket file; allocated from the registry when unset
    pub path: Option<PathBuf>,
    pub send_delay: Option<Duration>,
    pub extra: Options,
}

impl UnixSocketOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }
}

/// `mqtt()` source or destination
#[derive(Debug, Clone, Default)]
pub struct MqttOptions {
    /// Generated from the statement name when unset
    pub topic: Option<String>,
    pub qos: Option<u8>,
    pub extra: Options,
}

impl MqttOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn qos(mut self, qos: u8) -> Self {
        self.qos = Some(qos);
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Harness side of a daemon source
#[derive(Debug)]
pub struct SourceDriver {
    id: StatementId,
    properties: DriverProperties,
    io: Box<dyn DriverIo>,
}

impl SourceDriver {
    pub(crate) fn new(id: StatementId, properties: DriverProperties, io: Box<dyn DriverIo>) -> Self {
        Self { id, properties, io }
    }

    pub fn id(&self) -> &StatementId {
        &self.id
    }

    pub fn properties(&self) -> &DriverProperties {
        &self.properties
    }

    /// Write one message, newline-terminated
    pub fn write_log(&mut self, message: &str) -> Result<()> {
        self.io.write(terminated(message).as_bytes())
    }

    /// Write several messages
    ///
    /// Stream and file transports get them in one write, datagram
    /// transports one datagram per message.
    pub fn write_logs<I>(&mut self, messages: impl IntoIterator<Item = I>) -> Result<()>
    where
        I: AsRef<str>,
    {
        if self.properties.is_datagram() {
            for message in messages {
                self.write_log(message.as_ref())?;
            }
            return Ok(());
        }
        let batch: String = messages.into_iter().map(|m| terminated(m.as_ref())).collect();
        if batch.is_empty() {
            return Ok(());
        }
        self.io.write(batch.as_bytes())
    }

    /// Bytes exactly as given
    pub fn write_raw(&mut self, content: &[u8]) -> Result<()> {
        self.io.write(content)
    }

    pub fn wait_for_creation(&mut self) -> bool {
        self.io.wait_for_creation()
    }

    pub fn get_stats(&self) -> IoStats {
        self.io.get_stats()
    }
}

impl AsRef<StatementId> for SourceDriver {
    fn as_ref(&self) -> &StatementId {
        &self.id
    }
}

/// Harness side of a daemon destination
#[derive(Debug)]
pub struct DestinationDriver {
    id: StatementId,
    properties: DriverProperties,
    reader: LineReader<Box<dyn DriverIo>>,
    stop: Option<ListenerStop>,
}

impl DestinationDriver {
    pub(crate) fn new(
        id: StatementId,
        properties: DriverProperties,
        io: Box<dyn DriverIo>,
        poller: Poller,
        stop: Option<ListenerStop>,
    ) -> Self {
        Self {
            id,
            properties,
            reader: LineReader::new(io, poller),
            stop,
        }
    }

    pub fn id(&self) -> &StatementId {
        &self.id
    }

    pub fn properties(&self) -> &DriverProperties {
        &self.properties
    }

    /// Files: until the daemon created the file. MQTT: until subscribed,
    /// call before the daemon starts. Sockets: already bound.
    pub fn wait_for_creation(&mut self) -> bool {
        self.reader.source_mut().wait_for_creation()
    }

    pub fn read_log(&mut self) -> Result<Option<String>> {
        Ok(self.reader.pop_messages(1)?.into_iter().next())
    }

    /// Up to `count` lines; fewer if the poll deadline passed first
    pub fn read_logs(&mut self, count: usize) -> Result<Vec<String>> {
        self.reader.pop_messages(count)
    }

    pub fn read_all(&mut self) -> Result<Vec<String>> {
        self.reader.pop_all()
    }

    pub fn reader_mut(&mut self) -> &mut LineReader<Box<dyn DriverIo>> {
        &mut self.reader
    }

    /// Handle that stops the listener; `None` for non-socket kinds
    pub fn stop_handle(&self) -> Option<ListenerStop> {
        self.stop.clone()
    }

    pub fn get_stats(&self) -> IoStats {
        self.reader.source().get_stats()
    }
}

impl AsRef<StatementId> for DestinationDriver {
    fn as_ref(&self) -> &StatementId {
        &self.id
    }
}

fn terminated(message: &str) -> String {
    if message.ends_with('\n') {
        message.to_string()
    } else {
        format!("{message}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_names() {
        assert_eq!(DriverKind::Socket(SocketKind::Tcp6).driver_name(), "network");
        assert_eq!(DriverKind::Socket(SocketKind::UnixDgram).driver_name(), "unix-dgram");
        assert_eq!(DriverKind::Socket(SocketKind::Udp).to_string(), "udp");
    }

    #[test]
    fn test_file_source_options_override_wins() {
        let options = FileSourceOptions::new()
            .follow_freq(1)
            .flag("no-parse")
            .option("follow-freq", 0)
            .into_options();
        assert_eq!(
            options,
            vec![
                ("follow-freq".to_string(), OptionValue::Int(0)),
                ("flags".to_string(), OptionValue::raw("no-parse")),
            ]
        );
    }

    #[test]
    fn test_internal_has_no_io() {
        let properties = DriverProperties::new(DriverKind::Internal, Endpoint::Path(PathBuf::new()));
        let err = properties.open_writer(&IoContext::default(), None).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_OPERATION");
    }

    #[test]
    fn test_terminated() {
        assert_eq!(terminated("a"), "a\n");
        assert_eq!(terminated("a\n"), "a\n");
    }
}
