//! WebSocket message types: envelope and commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server → client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Request ID echoed from the command; server-generated for events.
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
    /// Builds an envelope stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error envelope.
    #[must_use]
    pub fn error(id: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message.into() }),
        )
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Client → server request: an optional correlation ID plus a command.
#[derive(Debug, Clone, Deserialize)]
pub struct WsRequest {
    /// Correlation ID echoed in the response.
    #[serde(default)]
    pub id: String,
    /// The command itself.
    #[serde(flatten)]
    pub command: WsCommand,
}

/// Commands that a client can send over WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to event topics.
    Subscribe {
        /// Topic names (`"snapshot"`, `"listener"`); `["*"]` for all.
        topics: Vec<String>,
    },
    /// Unsubscribe from event topics.
    Unsubscribe {
        /// Topic names to drop; `"*"` drops everything.
        topics: Vec<String>,
    },
    /// Fetch the current snapshot.
    GetSnapshot,
}
