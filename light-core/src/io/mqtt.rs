//! MQTT backend
//!
//! A publisher stands in front of an `mqtt()` source, a subscriber behind an
//! `mqtt()` destination. Both use the synchronous rumqttc client; the event
//! loop is driven from the calling thread, so nothing runs between calls.
//!
//! A subscriber subscribes inside [`wait_for_creation`](DriverIo::wait_for_creation),
//! which must happen before the daemon starts publishing. Messages published
//! earlier are not retained by the broker for us.

use std::time::{Duration, Instant};

use rumqttc::{Client, Connection, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{DriverIo, IoStats};
use crate::config::MqttConfig;
use crate::error::{LightError, Result};
use crate::timing::Poller;

const REQUEST_CAPACITY: usize = 16;
const MIN_KEEP_ALIVE: u64 = 5;

/// Which side of the broker this client plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MqttRole {
    Publisher,
    Subscriber,
}

/// QoS level from its wire number; anything above 2 is capped
pub fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

pub struct MqttIo {
    role: MqttRole,
    topic: String,
    qos: QoS,
    options: MqttOptions,
    endpoint: String,
    poller: Poller,
    session: Option<(Client, Connection)>,
    subscribed: bool,
    stats: IoStats,
}

impl std::fmt::Debug for MqttIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttIo")
            .field("role", &self.role)
            .field("topic", &self.topic)
            .field("endpoint", &self.endpoint)
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl MqttIo {
    pub fn new(config: &MqttConfig, role: MqttRole, topic: impl Into<String>, qos: u8, poller: Poller) -> Self {
        let client_id = format!("{}-{}", config.client_id_prefix, uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(MIN_KEEP_ALIVE)));
        Self {
            role,
            topic: topic.into(),
            qos: qos_from_level(qos),
            options,
            endpoint: format!("mqtt://{}:{}", config.host, config.port),
            poller,
            session: None,
            subscribed: false,
            stats: IoStats::default(),
        }
    }

    pub fn publisher(config: &MqttConfig, topic: impl Into<String>, poller: Poller) -> Self {
        Self::new(config, MqttRole::Publisher, topic, 0, poller)
    }

    pub fn subscriber(config: &MqttConfig, topic: impl Into<String>, poller: Poller) -> Self {
        Self::new(config, MqttRole::Subscriber, topic, 0, poller)
    }

    pub fn role(&self) -> MqttRole {
        self.role
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Drive the event loop until `wanted` accepts an event or `deadline` passes
    fn drive_until(
        &mut self,
        deadline: Instant,
        mut wanted: impl FnMut(&Event) -> bool,
    ) -> Result<Option<Event>> {
        let endpoint = self.endpoint.clone();
        let (_, connection) = self
            .session
            .as_mut()
            .ok_or_else(|| LightError::transport(endpoint.clone(), "not connected"))?;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            match connection.recv_timeout(deadline - now) {
                Ok(Ok(event)) => {
                    trace!(?event, "mqtt event");
                    if wanted(&event) {
                        return Ok(Some(event));
                    }
                }
                Ok(Err(e)) => {
                    self.session = None;
                    self.subscribed = false;
                    return Err(LightError::transport(endpoint, e));
                }
                Err(_) => return Ok(None),
            }
        }
    }

    fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let (client, connection) = Client::new(self.options.clone(), REQUEST_CAPACITY);
        self.session = Some((client, connection));
        let deadline = Instant::now() + self.poller.timeout();
        let connack = self.drive_until(deadline, |event| {
            matches!(event, Event::Incoming(Packet::ConnAck(_)))
        })?;
        if connack.is_none() {
            self.session = None;
            return Err(LightError::transport(self.endpoint.clone(), "no CONNACK from broker"));
        }
        debug!(endpoint = %self.endpoint, role = ?self.role, "connected to broker");
        Ok(())
    }

    fn subscribe(&mut self) -> Result<()> {
        if self.subscribed {
            return Ok(());
        }
        self.connect()?;
        if let Some((client, _)) = self.session.as_mut() {
            client
                .subscribe(self.topic.clone(), self.qos)
                .map_err(|e| LightError::transport(self.endpoint.clone(), e))?;
        }
        let deadline = Instant::now() + self.poller.timeout();
        let suback = self.drive_until(deadline, |event| {
            matches!(event, Event::Incoming(Packet::SubAck(_)))
        })?;
        self.subscribed = suback.is_some();
        if !self.subscribed {
            return Err(LightError::transport(self.endpoint.clone(), "no SUBACK from broker"));
        }
        debug!(topic = %self.topic, "subscribed");
        Ok(())
    }

    /// Block until one message arrives on the topic, bounded by the poll timeout
    pub fn receive_message(&mut self) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + self.poller.timeout();
        self.receive_until(deadline)
    }

    fn receive_until(&mut self, deadline: Instant) -> Result<Option<Vec<u8>>> {
        if self.role != MqttRole::Subscriber {
            return Err(LightError::unsupported("mqtt publisher", "read"));
        }
        self.subscribe()?;
        let topic = self.topic.clone();
        let event = self.drive_until(deadline, |event| {
            matches!(event, Event::Incoming(Packet::Publish(p)) if p.topic == topic)
        })?;
        match event {
            Some(Event::Incoming(Packet::Publish(publish))) => {
                let payload = publish.payload.to_vec();
                self.stats.record_read(payload.len());
                Ok(Some(payload))
            }
            _ => Ok(None),
        }
    }
}

impl DriverIo for MqttIo {
    fn name(&self) -> &str {
        "mqtt"
    }

    /// Publish one message and wait until the broker has it
    fn write(&mut self, content: &[u8]) -> Result<()> {
        if self.role != MqttRole::Publisher {
            return Err(LightError::unsupported("mqtt subscriber", "write"));
        }
        self.connect()?;
        if let Some((client, _)) = self.session.as_mut() {
            client
                .publish(self.topic.clone(), self.qos, false, content.to_vec())
                .map_err(|e| LightError::transport(self.endpoint.clone(), e))?;
        }
        let qos = self.qos;
        let deadline = Instant::now() + self.poller.timeout();
        let delivered = self.drive_until(deadline, |event| match qos {
            QoS::AtMostOnce => matches!(event, Event::Outgoing(Outgoing::Publish(_))),
            QoS::AtLeastOnce => matches!(event, Event::Incoming(Packet::PubAck(_))),
            QoS::ExactlyOnce => matches!(event, Event::Incoming(Packet::PubComp(_))),
        })?;
        if delivered.is_none() {
            return Err(LightError::transport(self.endpoint.clone(), "publish not acknowledged"));
        }
        self.stats.record_write(content.len());
        Ok(())
    }

    /// Publishers connect, subscribers also subscribe; `false` on any failure
    fn wait_for_creation(&mut self) -> bool {
        let ready = match self.role {
            MqttRole::Publisher => self.connect(),
            MqttRole::Subscriber => self.subscribe(),
        };
        match ready {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "broker not ready");
                false
            }
        }
    }

    /// At most one message per call, newline-terminated so it frames as a line
    ///
    /// Waits no longer than one poll interval.
    fn read(&mut self) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.poller.interval();
        let mut message = self.receive_until(deadline)?.unwrap_or_default();
        if !message.is_empty() && !message.ends_with(b"\n") {
            message.push(b'\n');
        }
        Ok(message)
    }

    fn get_stats(&self) -> IoStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos_from_level(0), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(7), QoS::ExactlyOnce);
    }

    #[test]
    fn test_role_guards() {
        let config = MqttConfig::default();
        let mut publisher = MqttIo::publisher(&config, "light/test", Poller::default());
        assert_eq!(publisher.read().unwrap_err().error_code(), "UNSUPPORTED_OPERATION");

        let mut subscriber = MqttIo::subscriber(&config, "light/test", Poller::default());
        assert_eq!(subscriber.write(b"x").unwrap_err().error_code(), "UNSUPPORTED_OPERATION");
    }
}
