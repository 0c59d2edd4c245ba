//! Actuation
//!
//! [`ActuationGateway`] decides whether a decoded event warrants a socket
//! command. The [`rf`] side carries the decision out, fire-and-forget.

pub mod error;
pub mod rf;

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, warn};

pub use error::ActuationError;
pub use rf::{
    DryRunTransmitter, GpioTransmitter, RfController, RfDispatcher, SocketController, Transmitter,
};

use crate::config::ActuationConfig;
use crate::decode::{BatteryLevel, DecodedEvent, SocketAction};
use crate::state::{StateKey, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentReason {
    BatteryLow,
    BatteryFull,
    RemoteCommand,
}

impl fmt::Display for IntentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentReason::BatteryLow => write!(f, "battery low"),
            IntentReason::BatteryFull => write!(f, "battery full"),
            IntentReason::RemoteCommand => write!(f, "remote command"),
        }
    }
}

/// A single socket switch the hub has decided to issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketCommandIntent {
    pub socket_id: u8,
    pub action: SocketAction,
    pub reason: IntentReason,
}

impl fmt::Display for SocketCommandIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "socket {} {} ({})",
            self.socket_id, self.action, self.reason
        )
    }
}

pub struct ActuationGateway {
    tablet_socket: u8,
    computer_socket: u8,
    battery_low: i64,
    battery_high: i64,
    known_sockets: HashSet<u8>,
}

impl ActuationGateway {
    pub fn new(config: &ActuationConfig) -> Self {
        Self {
            tablet_socket: config.tablet_socket,
            computer_socket: config.computer_socket,
            battery_low: config.battery_low,
            battery_high: config.battery_high,
            known_sockets: config.sockets.iter().map(|socket| socket.id).collect(),
        }
    }

    pub fn is_known_socket(&self, socket_id: u8) -> bool {
        self.known_sockets.contains(&socket_id)
    }

    /// At most one intent per event. Never touches the store.
    pub fn evaluate(&self, event: &DecodedEvent, state: &StateStore) -> Option<SocketCommandIntent> {
        match event {
            DecodedEvent::BatteryLevel(level) => self.battery(*level),
            DecodedEvent::SocketCommand { socket_id, action } => {
                self.socket_command(*socket_id, *action, state)
            }
            _ => None,
        }
    }

    fn battery(&self, level: BatteryLevel) -> Option<SocketCommandIntent> {
        let (action, reason) = match level {
            BatteryLevel::Low => (SocketAction::On, IntentReason::BatteryLow),
            BatteryLevel::Full => (SocketAction::Off, IntentReason::BatteryFull),
            // 0 means "no level", not "empty"
            BatteryLevel::Percent(n) if n > 0 && n <= self.battery_low => {
                (SocketAction::On, IntentReason::BatteryLow)
            }
            BatteryLevel::Percent(n) if n >= self.battery_high => {
                (SocketAction::Off, IntentReason::BatteryFull)
            }
            _ => return None,
        };

        Some(SocketCommandIntent {
            socket_id: self.tablet_socket,
            action,
            reason,
        })
    }

    fn socket_command(
        &self,
        socket_id: u8,
        action: SocketAction,
        state: &StateStore,
    ) -> Option<SocketCommandIntent> {
        if !self.is_known_socket(socket_id) {
            warn!("Rejected command for unknown socket {}", socket_id);
            return None;
        }

        if socket_id == self.computer_socket
            && state.get(StateKey::ComputerStatus).as_text() == Some(action.as_status())
        {
            debug!("Computer already {}, skipping socket {}", action, socket_id);
            return None;
        }

        Some(SocketCommandIntent {
            socket_id,
            action,
            reason: IntentReason::RemoteCommand,
        })
    }
}
