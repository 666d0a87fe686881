//! Envelope classification for incoming queue messages.
//!
//! Messages arrive in one of two shapes:
//!
//! - *Direct*: published straight to the queue; routing attributes live on
//!   the message itself and the payload is the body, verbatim.
//! - *Bus-wrapped*: fanned out through a notification bus; the body is a JSON
//!   envelope carrying its own attribute map, and the payload is the
//!   envelope's `Message` field.
//!
//! ## Design
//!
//! The two shapes are a tagged union resolved exactly once, here. Routing
//! attributes use a modern key (`Message-Type`, `Content-Type`) with a
//! legacy fallback (`MessageType`, `ContentType`); each key falls back
//! independently. A body that happens to be JSON but does not carry the bus
//! discriminator is still a direct message; its payload is the raw JSON
//! text, left opaque.

use std::collections::HashMap;

use serde::Deserialize;

use crate::message::RawMessage;

/// Attribute keys for the logical message type, in lookup order.
const TYPE_KEYS: [&str; 2] = ["Message-Type", "MessageType"];
/// Attribute keys for the payload content type, in lookup order.
const CONTENT_KEYS: [&str; 2] = ["Content-Type", "ContentType"];

/// Discriminator value marking a notification-bus envelope.
const BUS_DISCRIMINATOR: &str = "Notification";

/// Logical view of a raw queue message, resolved to its envelope shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Routing attributes read from the queue message itself.
    Direct(DirectEnvelope),
    /// Routing attributes read from the notification-bus envelope in the body.
    Bus(BusEnvelope),
}

/// Envelope of a message published straight to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectEnvelope {
    /// Logical message type, when the message carries one.
    pub message_type: Option<String>,
    /// Declared payload content type, when the message carries one.
    pub content_type: Option<String>,
    /// The message body, verbatim.
    pub payload: String,
}

/// Envelope of a message fanned out through the notification bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEnvelope {
    /// Logical message type, when the bus envelope carries one.
    pub message_type: Option<String>,
    /// Declared payload content type, when the bus envelope carries one.
    pub content_type: Option<String>,
    /// The bus envelope's `Message` field.
    pub payload: String,
    /// Identifier assigned by the bus, when present.
    pub notification_id: Option<String>,
}

impl Envelope {
    /// Classify a raw queue message into its envelope shape.
    ///
    /// The body is probed for the bus envelope first; everything else is a
    /// direct message.
    pub fn classify(message: &RawMessage) -> Envelope {
        if let Some(notification) = Notification::parse(&message.body) {
            tracing::debug!(id = %message.id, "detected bus-wrapped notification");
            return Envelope::Bus(BusEnvelope {
                message_type: notification.attribute(&TYPE_KEYS),
                content_type: notification.attribute(&CONTENT_KEYS),
                payload: notification.message,
                notification_id: notification.message_id,
            });
        }

        Envelope::Direct(DirectEnvelope {
            message_type: message_attribute(message, &TYPE_KEYS),
            content_type: message_attribute(message, &CONTENT_KEYS),
            payload: message.body.clone(),
        })
    }

    /// The logical message type, if any.
    pub fn message_type(&self) -> Option<&str> {
        match self {
            Envelope::Direct(direct) => direct.message_type.as_deref(),
            Envelope::Bus(bus) => bus.message_type.as_deref(),
        }
    }

    /// The declared payload content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        match self {
            Envelope::Direct(direct) => direct.content_type.as_deref(),
            Envelope::Bus(bus) => bus.content_type.as_deref(),
        }
    }

    /// The undecoded payload.
    pub fn payload(&self) -> &str {
        match self {
            Envelope::Direct(direct) => &direct.payload,
            Envelope::Bus(bus) => &bus.payload,
        }
    }
}

/// Look up the first present attribute among `keys` on the message itself.
fn message_attribute(message: &RawMessage, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| message.attribute(key).map(str::to_owned))
}

/// Wire shape of a notification-bus envelope.
#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "MessageAttributes", default)]
    attributes: HashMap<String, NotificationAttribute>,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "MessageId", default)]
    message_id: Option<String>,
}

/// Attribute value as serialized inside a bus envelope.
#[derive(Debug, Deserialize)]
struct NotificationAttribute {
    #[serde(rename = "Value", default)]
    value: Option<String>,
}

impl Notification {
    /// Parse a message body as a bus envelope.
    ///
    /// Returns `None` unless the body is a JSON object carrying the
    /// `"Type": "Notification"` discriminator.
    fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<Notification>(body)
            .ok()
            .filter(|notification| notification.kind == BUS_DISCRIMINATOR)
    }

    /// Look up the first present attribute among `keys` in the envelope.
    fn attribute(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| self.attributes.get(*key).and_then(|a| a.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::AttributeValue;

    fn direct(envelope: Envelope) -> DirectEnvelope {
        match envelope {
            Envelope::Direct(direct) => direct,
            Envelope::Bus(_) => panic!("expected a direct envelope"),
        }
    }

    fn bus(envelope: Envelope) -> BusEnvelope {
        match envelope {
            Envelope::Bus(bus) => bus,
            Envelope::Direct(_) => panic!("expected a bus envelope"),
        }
    }

    #[test]
    fn bus_envelope_reads_nested_attributes_only() {
        let body = serde_json::json!({
            "Type": "Notification",
            "MessageId": "n-1",
            "Message": "{\"user\": 7}",
            "MessageAttributes": {
                "Message-Type": {"Type": "String", "Value": "user-created"},
                "Content-Type": {"Type": "String", "Value": "application/json"}
            }
        })
        .to_string();

        // Queue-level attributes must be ignored for bus-wrapped messages.
        let message = RawMessage::new("m-1", "rcpt-1", body)
            .with_attribute("Message-Type", AttributeValue::string("decoy"));

        let envelope = bus(Envelope::classify(&message));
        assert_eq!(envelope.message_type.as_deref(), Some("user-created"));
        assert_eq!(envelope.content_type.as_deref(), Some("application/json"));
        assert_eq!(envelope.payload, "{\"user\": 7}");
        assert_eq!(envelope.notification_id.as_deref(), Some("n-1"));
    }

    #[test]
    fn bus_envelope_falls_back_to_legacy_keys() {
        let body = serde_json::json!({
            "Type": "Notification",
            "Message": "hello",
            "MessageAttributes": {
                "MessageType": {"Type": "String", "Value": "greeting"},
                "ContentType": {"Type": "String", "Value": "text/plain"}
            }
        })
        .to_string();

        let envelope = bus(Envelope::classify(&RawMessage::new("m-1", "rcpt-1", body)));
        assert_eq!(envelope.message_type.as_deref(), Some("greeting"));
        assert_eq!(envelope.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn direct_envelope_reads_queue_attributes() {
        let message = RawMessage::new("m-1", "rcpt-1", "hello")
            .with_attribute("Message-Type", AttributeValue::string("greeting"))
            .with_attribute("Content-Type", AttributeValue::string("text/plain"));

        let envelope = direct(Envelope::classify(&message));
        assert_eq!(envelope.message_type.as_deref(), Some("greeting"));
        assert_eq!(envelope.content_type.as_deref(), Some("text/plain"));
        assert_eq!(envelope.payload, "hello");
    }

    #[test]
    fn modern_key_wins_over_legacy_key() {
        let message = RawMessage::new("m-1", "rcpt-1", "hello")
            .with_attribute("Message-Type", AttributeValue::string("modern"))
            .with_attribute("MessageType", AttributeValue::string("legacy"));

        let envelope = direct(Envelope::classify(&message));
        assert_eq!(envelope.message_type.as_deref(), Some("modern"));
    }

    #[test]
    fn each_key_falls_back_independently() {
        let message = RawMessage::new("m-1", "rcpt-1", "hello")
            .with_attribute("MessageType", AttributeValue::string("legacy-type"))
            .with_attribute("Content-Type", AttributeValue::string("text/plain"));

        let envelope = direct(Envelope::classify(&message));
        assert_eq!(envelope.message_type.as_deref(), Some("legacy-type"));
        assert_eq!(envelope.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn json_body_without_discriminator_is_direct() {
        let message = RawMessage::new("m-1", "rcpt-1", "{\"Type\": \"Other\", \"x\": 1}")
            .with_attribute("Message-Type", AttributeValue::string("greeting"));

        let envelope = direct(Envelope::classify(&message));
        assert_eq!(envelope.message_type.as_deref(), Some("greeting"));
        assert_eq!(envelope.payload, "{\"Type\": \"Other\", \"x\": 1}");
    }

    #[test]
    fn json_body_without_type_field_is_direct() {
        let message = RawMessage::new("m-1", "rcpt-1", "{\"user\": 7}");

        let envelope = direct(Envelope::classify(&message));
        assert_eq!(envelope.message_type, None);
        assert_eq!(envelope.payload, "{\"user\": 7}");
    }

    #[test]
    fn missing_attributes_classify_with_no_type() {
        let envelope = Envelope::classify(&RawMessage::new("m-1", "rcpt-1", "plain text"));
        assert_eq!(envelope.message_type(), None);
        assert_eq!(envelope.content_type(), None);
        assert_eq!(envelope.payload(), "plain text");
    }
}
