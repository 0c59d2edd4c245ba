use chrono::{DateTime, Local};
use rumqttc::{Publish, QoS};
use std::borrow::Cow;
use std::fmt;

const PREVIEW_CHARS: usize = 32;

/// One message as received from the broker. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    topic: String,
    payload: Vec<u8>,
    received_at: DateTime<Local>,
    qos: QoS,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = self.payload_text();
        let preview: String = text.chars().take(PREVIEW_CHARS).collect();
        let ellipsis = if text.chars().count() > PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        write!(
            f,
            "{} [{}] {}{}",
            self.received_at.format("%d.%m.%Y %H:%M:%S"),
            self.topic,
            preview,
            ellipsis
        )
    }
}

impl Message {
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        received_at: DateTime<Local>,
        qos: QoS,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at,
            qos,
        }
    }

    /// Stamps a message received right now.
    pub fn received(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QoS) -> Self {
        Self::new(topic, payload, Local::now(), qos)
    }

    pub fn from_publish(publish: Publish) -> Self {
        Self::received(publish.topic, publish.payload.to_vec(), publish.qos)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as text; invalid UTF-8 sequences are replaced.
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_truncates_long_payloads() {
        let msg = Message::received("room/data", "x".repeat(100), QoS::AtMostOnce);
        let rendered = msg.to_string();
        assert!(rendered.contains("[room/data]"));
        assert!(rendered.ends_with("..."));
        assert!(rendered.len() < 100);
    }

    #[test]
    fn payload_text_is_lossy() {
        let msg = Message::received("t", vec![0x6f, 0x6e, 0xff], QoS::AtLeastOnce);
        assert_eq!(msg.payload_text(), "on\u{fffd}");
        assert_eq!(msg.qos(), QoS::AtLeastOnce);
    }
}
