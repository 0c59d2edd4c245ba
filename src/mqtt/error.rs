use thiserror::Error;

use super::BrokerEndpoint;

/// Failures while binding or holding a broker session
#[derive(Debug, Error)]
pub enum ConnectError {
    /// TCP pre-probe failed: refused, no address or timed out
    #[error("Broker {endpoint} unreachable: {reason}")]
    Unreachable {
        endpoint: BrokerEndpoint,
        reason: String,
    },

    /// TCP was reachable but the MQTT handshake failed
    #[error("Handshake with {endpoint} failed: {reason}")]
    Handshake {
        endpoint: BrokerEndpoint,
        reason: String,
    },

    /// Every candidate was tried and none accepted a session
    #[error("No broker reachable, tried {attempted} candidate(s)")]
    Exhausted { attempted: usize },

    /// A bound session ended unexpectedly
    #[error("Session with {endpoint} lost: {reason}")]
    SessionLost {
        endpoint: BrokerEndpoint,
        reason: String,
    },

    #[error("Connector holds no session")]
    NotConnected,
}
