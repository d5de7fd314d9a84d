use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::time;
use tracing::{debug, trace, warn};

use crate::config::BrokerConfig;
use crate::error::LinkError;

/// What the wire reports back to the hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Broker accepted the session (initial connect or reconnect)
    Connected { session_present: bool },
    /// Inbound message; payload is raw wire bytes, not yet decoded
    Message { topic: String, payload: Vec<u8> },
    /// A queued publish went out with this packet id
    PublishQueued { pkid: u16 },
    /// Broker acknowledged the publish with this packet id
    PubAck { pkid: u16 },
    /// Broker told us to go away
    Offline,
    /// Transport dropped; reconnection is attempted automatically
    ConnectionLost { reason: String },
}

/// The pub/sub wire boundary.
///
/// The hub is the only caller and runs strictly sequentially, so every
/// method takes `&mut self`. Implemented by [`MqttTransport`] for real
/// brokers and by scripted fakes in tests.
#[async_trait]
pub trait Transport: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<(), LinkError>;
    async fn unsubscribe(&mut self, topic: &str) -> Result<(), LinkError>;
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), LinkError>;
    /// Next wire event; pends until one arrives.
    async fn next_event(&mut self) -> TransportEvent;
    /// Tears the connection down. Safe to call more than once.
    async fn disconnect(&mut self);
}

/// MQTT transport over rumqttc.
///
/// Reconnection is unbounded with a fixed interval: after a connection
/// error the next poll is delayed by the configured interval (floor 500ms)
/// so an unreachable broker never busy-loops.
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
    reconnect_interval: Duration,
    backoff_pending: bool,
}

impl MqttTransport {
    pub fn connect(config: &BrokerConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options
            .set_keep_alive(Duration::from_secs(config.keep_alive_secs))
            .set_clean_session(config.clean_session);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user.clone(), pass.clone());
        }
        let (client, eventloop) = AsyncClient::new(options, 100);
        debug!(
            "MQTT transport created for {}:{} as '{}'",
            config.host, config.port, config.client_id
        );
        Self {
            client,
            eventloop,
            reconnect_interval: config.reconnect_interval(),
            backoff_pending: false,
        }
    }
}

// The hub drives next_event from the same task that issues these calls, so
// they must never wait on the request queue: a full queue while the broker
// is down would wedge the loop that is supposed to drain it. Hence the
// non-blocking try_* enqueue; a full queue surfaces as a rejected result.
#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        self.client.try_subscribe(topic, QoS::AtLeastOnce)?;
        debug!("Subscribed to {}", topic);
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        self.client.try_unsubscribe(topic)?;
        debug!("Unsubscribed from {}", topic);
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), LinkError> {
        // QoS 1: delivery is confirmed by a PubAck carrying the packet id
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            if self.backoff_pending {
                time::sleep(self.reconnect_interval).await;
                self.backoff_pending = false;
            }
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return TransportEvent::Connected {
                        session_present: ack.session_present,
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return TransportEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    }
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    return TransportEvent::PubAck { pkid: ack.pkid }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => return TransportEvent::Offline,
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                    return TransportEvent::PublishQueued { pkid }
                }
                Ok(event) => trace!("Ignoring wire event: {:?}", event),
                Err(e) => {
                    warn!(
                        "MQTT connection error: {}, retrying in {:?}",
                        e, self.reconnect_interval
                    );
                    self.backoff_pending = true;
                    return TransportEvent::ConnectionLost {
                        reason: e.to_string(),
                    };
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect while already down: {}", e);
        }
    }
}
