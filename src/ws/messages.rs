//! WebSocket message types: envelope and commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::CoreEvent;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Wraps a core event for delivery.
    #[must_use]
    pub fn event(event: &CoreEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Event,
            timestamp: Utc::now(),
            payload: serde_json::to_value(event).unwrap_or_default(),
        }
    }

    /// Builds a response to the request with `id`.
    #[must_use]
    pub fn response(id: String, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Response,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error reply.
    #[must_use]
    pub fn error(id: String, code: u16, message: &str) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Error,
            timestamp: Utc::now(),
            payload: serde_json::json!({ "code": code, "message": message }),
        }
    }

    /// Serializes the message, or `None` if it cannot be encoded.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, carried in the
/// envelope's `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to events for specific venues. Use `["*"]` for all venues.
    Subscribe {
        /// Venue IDs to subscribe to.
        venue_ids: Vec<String>,
    },
    /// Unsubscribe from events for specific venues.
    Unsubscribe {
        /// Venue IDs to unsubscribe from.
        venue_ids: Vec<String>,
    },
    /// Liveness check.
    Ping,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_parses_from_payload() {
        let payload = serde_json::json!({"command": "subscribe", "venue_ids": ["v1", "*"]});
        let Ok(WsCommand::Subscribe { venue_ids }) = serde_json::from_value::<WsCommand>(payload)
        else {
            panic!("expected subscribe command");
        };
        assert_eq!(venue_ids, vec!["v1".to_string(), "*".to_string()]);
    }

    #[test]
    fn error_envelope_has_type_tag() {
        let json = WsMessage::error(String::new(), 400, "malformed JSON")
            .to_json()
            .unwrap_or_default();
        assert!(json.contains("\"type\":\"error\""));
    }
}
