//! Per-topic handlers
//!
//! Handlers are pure: they read the message and the current state and return
//! what should happen. The pipeline applies the outcome.

use crate::actuation::{ActuationGateway, SocketCommandIntent};
use crate::config::HubConfig;
use crate::decode::{
    decode, BatteryLevel, DecodeError, Decoded, DecodedEvent, ExpectedShape, PayloadFormat,
};
use crate::mqtt::Message;
use crate::routing::HandlerRef;
use crate::state::{StateKey, StateStore, StateUpdate, StateValue};

/// Everything a handler may ask for. Missing parts mean "nothing to do".
#[derive(Debug, Default)]
pub struct HandlerOutcome {
    pub decoded: Option<Decoded>,
    pub intent: Option<SocketCommandIntent>,
    pub state_update: Option<StateUpdate>,
    pub error: Option<DecodeError>,
}

impl HandlerOutcome {
    fn failed(error: DecodeError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

pub struct Handlers {
    gateway: ActuationGateway,
    socket_prefix: String,
    computer_socket: u8,
    legacy_temperature_offset: f64,
}

impl Handlers {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            gateway: ActuationGateway::new(&config.actuation),
            socket_prefix: config.topics.socket_prefix(),
            computer_socket: config.actuation.computer_socket,
            legacy_temperature_offset: config.room.legacy_temperature_offset,
        }
    }

    pub fn handle(&self, handler: HandlerRef, message: &Message, state: &StateStore) -> HandlerOutcome {
        let shape = match self.shape_for(handler, message.topic()) {
            Ok(Some(shape)) => shape,
            Ok(None) => return HandlerOutcome::default(),
            Err(e) => return HandlerOutcome::failed(e),
        };

        let mut decoded = match decode(shape, message.payload()) {
            Ok(decoded) => decoded,
            Err(e) => return HandlerOutcome::failed(e),
        };

        if let DecodedEvent::RoomReading(reading) = &mut decoded.event {
            if reading.format == PayloadFormat::KeyValue {
                reading.temperature += self.legacy_temperature_offset;
            }
        }

        let intent = self.gateway.evaluate(&decoded.event, state);
        let state_update = state_update(handler, &decoded.event);

        HandlerOutcome {
            decoded: Some(decoded),
            intent,
            state_update,
            error: None,
        }
    }

    fn shape_for(&self, handler: HandlerRef, topic: &str) -> Result<Option<ExpectedShape>, DecodeError> {
        let shape = match handler {
            HandlerRef::RoomReading => ExpectedShape::RoomReading,
            HandlerRef::BatteryLevel => ExpectedShape::BatteryLevel,
            HandlerRef::RfTransmission => ExpectedShape::RfTransmission,
            HandlerRef::ProbeSighting => ExpectedShape::ProbeSighting,
            HandlerRef::SocketCommand => ExpectedShape::SocketCommand {
                socket_id: self.socket_id(topic)?,
            },
            HandlerRef::ComputerControl => ExpectedShape::SocketCommand {
                socket_id: self.computer_socket,
            },
            HandlerRef::ComputerStatus => ExpectedShape::DeviceStatus,
            HandlerRef::Unrouted => ExpectedShape::Opaque,
            HandlerRef::Discard => return Ok(None),
        };
        Ok(Some(shape))
    }

    /// `<control-root>/socket/<id>` → `<id>`
    fn socket_id(&self, topic: &str) -> Result<u8, DecodeError> {
        topic
            .strip_prefix(self.socket_prefix.as_str())
            .and_then(|id| id.trim_matches('/').parse::<u8>().ok())
            .ok_or_else(|| DecodeError::InvalidSocketId(topic.to_string()))
    }
}

fn state_update(handler: HandlerRef, event: &DecodedEvent) -> Option<StateUpdate> {
    match (handler, event) {
        (HandlerRef::BatteryLevel, DecodedEvent::BatteryLevel(BatteryLevel::Charging)) => Some(
            StateUpdate::new(StateKey::IsCharging, StateValue::Bool(true)),
        ),
        (HandlerRef::BatteryLevel, DecodedEvent::BatteryLevel(BatteryLevel::Discharging)) => Some(
            StateUpdate::new(StateKey::IsCharging, StateValue::Bool(false)),
        ),
        (HandlerRef::ComputerStatus, DecodedEvent::DeviceStatus(status)) => Some(
            StateUpdate::new(StateKey::ComputerStatus, StateValue::Text(status.clone())),
        ),
        _ => None,
    }
}
