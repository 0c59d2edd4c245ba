//! Broker connector with ordered failover
//!
//! The connector walks an ordered list of candidate brokers. Each candidate is
//! first probed with a plain TCP connect (bounded by a short timeout) so dead
//! hosts fail fast, then the MQTT handshake is attempted. The first candidate
//! that returns a successful CONNACK is bound.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect──► Connected ──recv (session lost)──┐
//!      ▲                        │                            │
//!      └────────disconnect──────┴────────────────────────────┘
//! ```
//!
//! Reconnection is never automatic: when `recv` reports a lost session the
//! owner calls `disconnect` and decides when to `connect` again.

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnAck, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use super::error::ConnectError;
use super::message::Message;
use crate::config::BrokerConfig;

/// One candidate broker address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Session parameters shared by all candidates
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    pub client_id: String,
    pub subscribe_topic: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    pub probe_timeout: Duration,
    pub handshake_timeout: Duration,
    pub channel_capacity: usize,
}

impl From<&BrokerConfig> for ConnectorSettings {
    fn from(config: &BrokerConfig) -> Self {
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pw)) => Some((user.clone(), pw.clone())),
            _ => None,
        };
        Self {
            client_id: config.client_id.clone(),
            subscribe_topic: config.subscribe_topic.clone(),
            credentials,
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            handshake_timeout: Duration::from_millis(config.handshake_timeout_ms),
            channel_capacity: config.channel_capacity,
        }
    }
}

/// The two steps of binding a broker, separated so failover can be driven
/// against any transport.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    type Session: Send;

    /// Cheap reachability check performed before the protocol handshake
    async fn probe(&self, endpoint: &BrokerEndpoint) -> Result<(), ConnectError>;

    /// Full protocol handshake; returns a bound session
    async fn handshake(&self, endpoint: &BrokerEndpoint) -> Result<Self::Session, ConnectError>;
}

/// Tries the candidates in order and returns the first bound session.
///
/// A refused, unresolvable or timed out candidate never aborts the attempt;
/// only exhausting the list is an error. No candidate after the bound one is
/// touched.
pub async fn connect_first<T: BrokerTransport>(
    transport: &T,
    candidates: &[BrokerEndpoint],
) -> Result<(BrokerEndpoint, T::Session), ConnectError> {
    for endpoint in candidates {
        debug!("Trying broker {}", endpoint);

        if let Err(e) = transport.probe(endpoint).await {
            warn!("{}", e);
            continue;
        }

        match transport.handshake(endpoint).await {
            Ok(session) => {
                info!("Connected to broker on {}", endpoint);
                return Ok((endpoint.clone(), session));
            }
            Err(e) => warn!("{}", e),
        }
    }

    error!("Could not connect to any of {} broker(s)", candidates.len());
    Err(ConnectError::Exhausted {
        attempted: candidates.len(),
    })
}

/// MQTT transport backed by rumqttc
pub struct MqttTransport {
    settings: ConnectorSettings,
}

impl MqttTransport {
    pub fn new(settings: ConnectorSettings) -> Self {
        Self { settings }
    }

    fn options_for(&self, endpoint: &BrokerEndpoint) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.settings.client_id.clone(),
            endpoint.host.clone(),
            endpoint.port,
        );
        options.set_keep_alive(self.settings.keep_alive);
        if let Some((user, pw)) = &self.settings.credentials {
            options.set_credentials(user.clone(), pw.clone());
        }
        options
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<ConnAck, String> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
            Ok(event) => debug!("Ignoring event before CONNACK: {:?}", event),
            Err(e) => return Err(e.to_string()),
        }
    }
}

#[async_trait]
impl BrokerTransport for MqttTransport {
    type Session = LiveSession;

    async fn probe(&self, endpoint: &BrokerEndpoint) -> Result<(), ConnectError> {
        let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        match tokio::time::timeout(self.settings.probe_timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ConnectError::Unreachable {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ConnectError::Unreachable {
                endpoint: endpoint.clone(),
                reason: format!(
                    "no answer within {}ms",
                    self.settings.probe_timeout.as_millis()
                ),
            }),
        }
    }

    async fn handshake(&self, endpoint: &BrokerEndpoint) -> Result<LiveSession, ConnectError> {
        let (client, mut eventloop) =
            AsyncClient::new(self.options_for(endpoint), self.settings.channel_capacity);

        let ack = tokio::time::timeout(
            self.settings.handshake_timeout,
            wait_for_connack(&mut eventloop),
        )
        .await
        .map_err(|_| ConnectError::Handshake {
            endpoint: endpoint.clone(),
            reason: "timed out waiting for CONNACK".to_string(),
        })?
        .map_err(|reason| ConnectError::Handshake {
            endpoint: endpoint.clone(),
            reason,
        })?;

        if ack.code != ConnectReturnCode::Success {
            return Err(ConnectError::Handshake {
                endpoint: endpoint.clone(),
                reason: format!("broker answered {:?}", ack.code),
            });
        }

        let session = LiveSession {
            endpoint: endpoint.clone(),
            subscribe_topic: self.settings.subscribe_topic.clone(),
            client,
            eventloop,
        };
        session.subscribe()?;
        Ok(session)
    }
}

/// A bound rumqttc client and its event loop
pub struct LiveSession {
    endpoint: BrokerEndpoint,
    subscribe_topic: String,
    client: AsyncClient,
    eventloop: EventLoop,
}

impl LiveSession {
    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    fn subscribe(&self) -> Result<(), ConnectError> {
        self.client
            .try_subscribe(self.subscribe_topic.clone(), QoS::AtMostOnce)
            .map_err(|e| ConnectError::Handshake {
                endpoint: self.endpoint.clone(),
                reason: format!("subscribe to '{}' failed: {}", self.subscribe_topic, e),
            })?;
        info!("Subscribed to topic '{}'", self.subscribe_topic);
        Ok(())
    }

    /// Blocks until the next PUBLISH arrives or the session ends.
    pub async fn recv(&mut self) -> Result<Message, ConnectError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(Message::from_publish(publish));
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // a fresh CONNACK on this session drops the broker-side subscription
                    self.subscribe()?;
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!("Subscription acknowledged: {:?}", ack.return_codes);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Err(ConnectError::SessionLost {
                        endpoint: self.endpoint.clone(),
                        reason: "broker sent DISCONNECT".to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(ConnectError::SessionLost {
                        endpoint: self.endpoint.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn close(self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect request for {} not queued: {}", self.endpoint, e);
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum ConnectorState {
    Disconnected,
    Connected,
}

#[machine]
pub struct BrokerConnector<S: ConnectorState> {
    transport: MqttTransport,
    candidates: Vec<BrokerEndpoint>,
    session: Option<LiveSession>,
}

impl BrokerConnector<Disconnected> {
    pub fn create(settings: ConnectorSettings, candidates: Vec<BrokerEndpoint>) -> Self {
        info!(
            "Creating broker connector with {} candidate(s)",
            candidates.len()
        );
        Self::new(MqttTransport::new(settings), candidates, None)
    }

    /// Binds the first candidate that accepts a session
    pub async fn connect(mut self) -> Result<BrokerConnector<Connected>, ConnectError> {
        let (_endpoint, session) = connect_first(&self.transport, &self.candidates).await?;
        self.session = Some(session);
        Ok(self.transition())
    }
}

impl BrokerConnector<Connected> {
    pub fn endpoint(&self) -> Option<&BrokerEndpoint> {
        self.session.as_ref().map(LiveSession::endpoint)
    }

    pub async fn recv(&mut self) -> Result<Message, ConnectError> {
        match self.session.as_mut() {
            Some(session) => session.recv().await,
            None => Err(ConnectError::NotConnected),
        }
    }

    /// Drops the bound session; the returned connector can `connect` again
    pub fn disconnect(mut self) -> BrokerConnector<Disconnected> {
        if let Some(session) = self.session.take() {
            info!("Releasing broker session on {}", session.endpoint());
            session.close();
        }
        self.transition()
    }
}

/// Exponential reconnect delay, owned by the caller of `connect`
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
