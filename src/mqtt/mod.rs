//! # MQTT Integration Module
//!
//! Owns everything that touches the broker: candidate endpoints, the failover
//! connector and the immutable [`Message`] handed to the rest of the hub.
//!
//! ```text
//! mqtt/
//! ├── connector.rs  - Failover connect, session state machine, back-off
//! ├── error.rs      - Connection error taxonomy
//! └── message.rs    - Received message representation
//! ```
//!
//! The connector never reconnects on its own. A lost session surfaces as an
//! error from `recv`, and the service loop decides when to try again.

pub mod connector;
pub mod error;
pub mod message;

pub use connector::{
    connect_first, Backoff, BrokerConnector, BrokerEndpoint, BrokerTransport, Connected,
    ConnectorSettings, Disconnected, LiveSession, MqttTransport,
};
pub use error::ConnectError;
pub use message::Message;
