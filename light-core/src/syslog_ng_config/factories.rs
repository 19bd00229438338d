//! Statement factories
//!
//! Each factory reserves a uniquely named block, allocates whatever the
//! endpoint needs (file, port, socket path, topic), connects the driver and,
//! for sources and destinations, opens the harness side of the endpoint.

use std::net::SocketAddr;
use std::time::Duration;

use super::document::ConfigDocument;
use super::drivers::{
    DestinationDriver, DriverKind, DriverProperties, Endpoint, FileDestinationOptions, FileSourceOptions,
    NetworkOptions, SourceDriver, UnixSocketOptions,
};
use super::option::{merge_options, OptionValue, Options};
use super::statement::{Statement, StatementId, StatementKind};
use crate::error::{LightError, Result};
use crate::io::{SocketAddress, SocketKind};

impl ConfigDocument {
    fn source_driver(
        &mut self,
        id: StatementId,
        properties: DriverProperties,
        statement: Statement,
        send_delay: Option<Duration>,
    ) -> Result<SourceDriver> {
        self.connect_driver_with_statement(&id, statement)?;
        let io = properties.open_writer(self.io_context(), send_delay)?;
        Ok(SourceDriver::new(id, properties, io))
    }

    fn destination_driver(
        &mut self,
        id: StatementId,
        properties: DriverProperties,
        statement: Statement,
    ) -> Result<DestinationDriver> {
        self.connect_driver_with_statement(&id, statement)?;
        let (io, stop) = properties.open_reader(self.io_context())?;
        let poller = self.io_context().poller();
        Ok(DestinationDriver::new(id, properties, io, poller, stop))
    }

    fn inet_endpoint(&self, id: &StatementId, kind: SocketKind, options: &NetworkOptions) -> Result<SocketAddr> {
        let port = match options.port {
            Some(port) => port,
            None if kind.is_stream() => self.registry().tcp_port(id.name())?,
            None => self.registry().udp_port(id.name())?,
        };
        let ip = options.ip.unwrap_or_else(|| kind.loopback(port).ip());
        Ok(SocketAddr::new(ip, port))
    }

    fn network_options(kind: SocketKind, address: SocketAddr) -> Options {
        let mut options = vec![
            ("port".to_string(), OptionValue::from(address.port())),
            ("transport".to_string(), OptionValue::from(kind.transport())),
        ];
        if kind.is_ipv6() {
            options.push(("ip-protocol".to_string(), OptionValue::Int(6)));
        }
        options
    }

    // ------------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------------

    /// `file()` source; the test appends to the input file
    pub fn file_source(&mut self, mut options: FileSourceOptions) -> Result<SourceDriver> {
        let id = self.create_statement(StatementKind::Source, "file")?;
        let path = match options.path.take() {
            Some(path) => path,
            None => self.registry().file_with_extension(&format!("{}_input", id.name()), "log")?,
        };
        let statement = Statement::new("file")
            .with_positional(path.as_path())
            .with_options(options.into_options());
        let properties = DriverProperties::new(DriverKind::File, Endpoint::Path(path));
        self.source_driver(id, properties, statement, None)
    }

    /// `network()` source over TCP/UDP; unix kinds go to [`unix_source`](Self::unix_source)
    pub fn network_source(&mut self, kind: SocketKind, options: NetworkOptions) -> Result<SourceDriver> {
        if kind.is_unix() {
            return self.unix_source(
                kind,
                UnixSocketOptions {
                    path: None,
                    send_delay: options.send_delay,
                    extra: options.extra,
                },
            );
        }
        let id = self.create_statement(StatementKind::Source, kind.name())?;
        let address = self.inet_endpoint(&id, kind, &options)?;
        let mut structural = vec![("ip".to_string(), OptionValue::from(address.ip()))];
        structural.extend(Self::network_options(kind, address));
        let statement = Statement::new("network").with_options(merge_options(structural, options.extra));
        let properties = DriverProperties::new(
            DriverKind::Socket(kind),
            Endpoint::Socket(SocketAddress::Inet(address)),
        );
        self.source_driver(id, properties, statement, options.send_delay)
    }

    /// `unix-stream()` / `unix-dgram()` source; the daemon owns the socket
    pub fn unix_source(&mut self, kind: SocketKind, mut options: UnixSocketOptions) -> Result<SourceDriver> {
        if !kind.is_unix() {
            return Err(LightError::unsupported(kind.name(), "unix source"));
        }
        let id = self.create_statement(StatementKind::Source, kind.name())?;
        let path = match options.path.take() {
            Some(path) => path,
            None => self.registry().socket(id.name())?,
        };
        let statement = Statement::new(kind.name())
            .with_positional(path.as_path())
            .with_options(options.extra);
        let properties = DriverProperties::new(
            DriverKind::Socket(kind),
            Endpoint::Socket(SocketAddress::Unix(path)),
        );
        self.source_driver(id, properties, statement, options.send_delay)
    }

    /// `mqtt()` source; the test publishes to its topic
    #[cfg(feature = "mqtt")]
    pub fn mqtt_source(&mut self, options: super::drivers::MqttOptions) -> Result<SourceDriver> {
        let id = self.create_statement(StatementKind::Source, "mqtt")?;
        let (statement, properties) = self.mqtt_statement(&id, options);
        self.source_driver(id, properties, statement, None)
    }

    pub fn internal_source(&mut self, options: Options) -> Result<StatementId> {
        self.add_statement(StatementKind::Source, Statement::new("internal").with_options(options))
    }

    pub fn example_msg_generator_source(&mut self, options: Options) -> Result<StatementId> {
        self.add_statement(
            StatementKind::Source,
            Statement::new("example-msg-generator").with_options(options),
        )
    }

    // ------------------------------------------------------------------------
    // Destinations
    // ------------------------------------------------------------------------

    /// `file()` destination; the test reads lines back from the output file
    pub fn file_destination(&mut self, mut options: FileDestinationOptions) -> Result<DestinationDriver> {
        let id = self.create_statement(StatementKind::Destination, "file")?;
        let path = match options.path.take() {
            Some(path) => path,
            None => self.registry().file_with_extension(&format!("{}_output", id.name()), "log")?,
        };
        let statement = Statement::new("file")
            .with_positional(path.as_path())
            .with_options(options.into_options());
        let properties = DriverProperties::new(DriverKind::File, Endpoint::Path(path));
        self.destination_driver(id, properties, statement)
    }

    /// `network()` destination; the listener is bound before this returns
    pub fn network_destination(&mut self, kind: SocketKind, options: NetworkOptions) -> Result<DestinationDriver> {
        if kind.is_unix() {
            return self.unix_destination(
                kind,
                UnixSocketOptions {
                    path: None,
                    send_delay: None,
                    extra: options.extra,
                },
            );
        }
        let id = self.create_statement(StatementKind::Destination, kind.name())?;
        let address = self.inet_endpoint(&id, kind, &options)?;
        let statement = Statement::new("network")
            .with_positional(address.ip())
            .with_options(merge_options(Self::network_options(kind, address), options.extra));
        let properties = DriverProperties::new(
            DriverKind::Socket(kind),
            Endpoint::Socket(SocketAddress::Inet(address)),
        );
        self.destination_driver(id, properties, statement)
    }

    /// `unix-stream()` / `unix-dgram()` destination; the harness owns the socket
    pub fn unix_destination(&mut self, kind: SocketKind, mut options: UnixSocketOptions) -> Result<DestinationDriver> {
        if !kind.is_unix() {
            return Err(LightError::unsupported(kind.name(), "unix destination"));
        }
        let id = self.create_statement(StatementKind::Destination, kind.name())?;
        let path = match options.path.take() {
            Some(path) => path,
            None => self.registry().socket(id.name())?,
        };
        let statement = Statement::new(kind.name())
            .with_positional(path.as_path())
            .with_options(options.extra);
        let properties = DriverProperties::new(
            DriverKind::Socket(kind),
            Endpoint::Socket(SocketAddress::Unix(path)),
        );
        self.destination_driver(id, properties, statement)
    }

    /// `mqtt()` destination; call `wait_for_creation` before starting the daemon
    #[cfg(feature = "mqtt")]
    pub fn mqtt_destination(&mut self, options: super::drivers::MqttOptions) -> Result<DestinationDriver> {
        let id = self.create_statement(StatementKind::Destination, "mqtt")?;
        let (statement, properties) = self.mqtt_statement(&id, options);
        self.destination_driver(id, properties, statement)
    }

    #[cfg(feature = "mqtt")]
    fn mqtt_statement(&self, id: &StatementId, options: super::drivers::MqttOptions) -> (Statement, DriverProperties) {
        let topic = options.topic.unwrap_or_else(|| format!("light/{}", id.name()));
        let qos = options.qos.unwrap_or(0);
        let broker = &self.io_context().mqtt;
        let mut structural = vec![
            ("topic".to_string(), OptionValue::from(topic.as_str())),
            ("address".to_string(), OptionValue::from(format!("tcp://{}:{}", broker.host, broker.port))),
        ];
        if options.qos.is_some() {
            structural.push(("qos".to_string(), OptionValue::from(qos)));
        }
        let statement = Statement::new("mqtt").with_options(merge_options(structural, options.extra));
        let properties = DriverProperties::new(DriverKind::Mqtt, Endpoint::Topic { topic, qos });
        (statement, properties)
    }

    // ------------------------------------------------------------------------
    // Parsers, rewrites, filters
    // ------------------------------------------------------------------------

    /// Any parser driver: `csv-parser`, `regexp-parser`, `app-parser`, ...
    pub fn parser(&mut self, driver_name: &str, options: Options) -> Result<StatementId> {
        self.add_statement(StatementKind::Parser, Statement::new(driver_name).with_options(options))
    }

    pub fn csv_parser(&mut self, options: Options) -> Result<StatementId> {
        self.parser("csv-parser", options)
    }

    pub fn regexp_parser(&mut self, options: Options) -> Result<StatementId> {
        self.parser("regexp-parser", options)
    }

    pub fn syslog_parser(&mut self, options: Options) -> Result<StatementId> {
        self.parser("syslog-parser", options)
    }

    /// `set("template" value("NAME"))`
    pub fn rewrite_set(&mut self, template: &str, options: Options) -> Result<StatementId> {
        self.add_statement(
            StatementKind::Rewrite,
            Statement::new("set").with_positional(template).with_options(options),
        )
    }

    pub fn rewrite_set_tag(&mut self, tag: &str) -> Result<StatementId> {
        self.add_statement(StatementKind::Rewrite, Statement::new("set-tag").with_positional(tag))
    }

    pub fn rewrite_set_pri(&mut self, pri: &str) -> Result<StatementId> {
        self.add_statement(StatementKind::Rewrite, Statement::new("set-pri").with_positional(pri))
    }

    pub fn rewrite_credit_card_mask(&mut self, options: Options) -> Result<StatementId> {
        self.add_statement(
            StatementKind::Rewrite,
            Statement::new("credit-card-mask").with_options(options),
        )
    }

    pub fn rewrite_credit_card_hash(&mut self, options: Options) -> Result<StatementId> {
        self.add_statement(
            StatementKind::Rewrite,
            Statement::new("credit-card-hash").with_options(options),
        )
    }

    /// Filter expression, e.g. `message("foo") and level(info)`
    pub fn filter(&mut self, expr: &str) -> Result<StatementId> {
        self.add_statement(StatementKind::Filter, Statement::expression(expr))
    }

    pub fn rate_limit_filter(&mut self, options: Options) -> Result<StatementId> {
        self.add_statement(StatementKind::Filter, Statement::new("rate-limit").with_options(options))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{HarnessConfig, PollConfig};
    use crate::registry::ResourceRegistry;

    fn document() -> (tempfile::TempDir, ConfigDocument) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ResourceRegistry::new(dir.path()).unwrap());
        let config = HarnessConfig::default()
            .with_poll(PollConfig::new(Duration::from_millis(1), Duration::from_millis(100)));
        (dir, ConfigDocument::new(registry, &config))
    }

    #[test]
    fn test_file_source_renders_allocated_path() {
        let (_dir, mut doc) = document();
        let source = doc.file_source(FileSourceOptions::new().follow_freq(1)).unwrap();
        let path = match &source.properties().endpoint {
            Endpoint::Path(path) => path.clone(),
            other => panic!("unexpected endpoint {other}"),
        };
        let statement = doc.statement(source.id()).unwrap();
        assert_eq!(statement.positional(), &[OptionValue::from(path.as_path())]);
        assert_eq!(statement.option("follow-freq"), Some(&OptionValue::Int(1)));
    }

    #[test]
    fn test_network_source_caller_port_wins() {
        let (_dir, mut doc) = document();
        let source = doc
            .network_source(SocketKind::Tcp6, NetworkOptions::new().port(5514).option("flags", OptionValue::raw("no-parse")))
            .unwrap();
        let statement = doc.statement(source.id()).unwrap();
        assert_eq!(statement.driver_name(), "network");
        assert_eq!(statement.option("ip"), Some(&OptionValue::from("::1")));
        assert_eq!(statement.option("port"), Some(&OptionValue::Int(5514)));
        assert_eq!(statement.option("ip-protocol"), Some(&OptionValue::Int(6)));
        assert!(statement.option("flags").is_some());
    }

    #[test]
    fn test_unix_destination_binds_before_start() {
        let (_dir, mut doc) = document();
        let destination = doc
            .network_destination(SocketKind::UnixDgram, NetworkOptions::new())
            .unwrap();
        match &destination.properties().endpoint {
            Endpoint::Socket(SocketAddress::Unix(path)) => assert!(path.exists()),
            other => panic!("unexpected endpoint {other}"),
        }
        assert!(destination.stop_handle().is_some());
    }

    #[test]
    fn test_processing_statements() {
        let (_dir, mut doc) = document();
        let parser = doc.csv_parser(vec![("columns".into(), OptionValue::from("a,b"))]).unwrap();
        let rewrite = doc.rewrite_set_tag("seen").unwrap();
        let filter = doc.filter("tags(\"seen\")").unwrap();
        assert_eq!(parser.kind(), StatementKind::Parser);
        assert_eq!(doc.statement(&rewrite).unwrap().driver_name(), "set-tag");
        assert!(filter.name().starts_with("filter_"));
    }

    #[test]
    fn test_wrong_kind_for_unix_factory() {
        let (_dir, mut doc) = document();
        let err = doc.unix_source(SocketKind::Udp, UnixSocketOptions::new()).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_OPERATION");
    }
}
