//! Payload decoding
//!
//! Turns the raw bytes of a [`Message`](crate::mqtt::Message) into a typed
//! [`DecodedEvent`] according to the shape the routed handler expects.
//! Decoding never panics and never blocks raw persistence: field-level
//! problems become [`DecodeWarning`]s, payload-level problems a
//! [`DecodeError`].

pub mod error;
mod json;
mod legacy;
mod scalar;

use std::fmt;

use chrono::NaiveDateTime;

pub use error::DecodeError;

/// Wire format a room reading arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    KeyValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomReading {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub brightness: f64,
    pub format: PayloadFormat,
}

/// Battery report: a percentage or one of the qualitative tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryLevel {
    Percent(i64),
    Low,
    Full,
    Charging,
    Discharging,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfTransmission {
    pub decimal: u64,
    pub bits: u32,
    pub binary: String,
    pub pulse_length: u32,
    pub protocol: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSighting {
    /// `None` when the payload carried no usable timestamp
    pub time: Option<NaiveDateTime>,
    pub mac: String,
    pub vendor: String,
    pub ssid: String,
    pub ssid_uppercase: String,
    pub rssi: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketAction {
    On,
    Off,
}

impl SocketAction {
    /// Status word a device reports while in this state
    pub fn as_status(&self) -> &'static str {
        match self {
            SocketAction::On => "on",
            SocketAction::Off => "off",
        }
    }
}

impl fmt::Display for SocketAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_status())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    RoomReading(RoomReading),
    BatteryLevel(BatteryLevel),
    RfTransmission(RfTransmission),
    ProbeSighting(ProbeSighting),
    SocketCommand { socket_id: u8, action: SocketAction },
    DeviceStatus(String),
    Opaque(String),
}

/// What a handler expects to find in the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    /// JSON object or legacy key=value list
    RoomReading,
    BatteryLevel,
    RfTransmission,
    ProbeSighting,
    SocketCommand { socket_id: u8 },
    DeviceStatus,
    Opaque,
}

/// A field that had to be defaulted or ignored while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeWarning {
    pub field: String,
    pub reason: String,
}

impl DecodeWarning {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(field, "missing, defaulted")
    }

    pub fn not_numeric(field: &str) -> Self {
        Self::new(field, "not numeric, replaced by 0")
    }
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// A decoded event plus whatever had to be patched up to produce it
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub event: DecodedEvent,
    pub warnings: Vec<DecodeWarning>,
}

impl Decoded {
    pub fn new(event: DecodedEvent) -> Self {
        Self {
            event,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(event: DecodedEvent, warnings: Vec<DecodeWarning>) -> Self {
        Self { event, warnings }
    }
}

fn utf8(payload: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)
}

pub fn decode(shape: ExpectedShape, payload: &[u8]) -> Result<Decoded, DecodeError> {
    match shape {
        ExpectedShape::Opaque => {
            let raw = String::from_utf8_lossy(payload).into_owned();
            Ok(Decoded::new(DecodedEvent::Opaque(raw)))
        }
        ExpectedShape::RoomReading => {
            let text = utf8(payload)?.trim();
            if text.is_empty() {
                Err(DecodeError::Empty)
            } else if text.starts_with('{') {
                json::room_reading(text)
            } else {
                legacy::room_reading(scalar::bare(text))
            }
        }
        ExpectedShape::BatteryLevel => Ok(Decoded::new(DecodedEvent::BatteryLevel(
            scalar::battery_level(utf8(payload)?),
        ))),
        ExpectedShape::RfTransmission => json::rf_transmission(utf8(payload)?),
        ExpectedShape::ProbeSighting => json::probe_sighting(utf8(payload)?),
        ExpectedShape::SocketCommand { socket_id } => {
            let action = scalar::switch_action(utf8(payload)?)?;
            Ok(Decoded::new(DecodedEvent::SocketCommand { socket_id, action }))
        }
        ExpectedShape::DeviceStatus => Ok(Decoded::new(DecodedEvent::DeviceStatus(
            scalar::status_word(utf8(payload)?)?,
        ))),
    }
}
