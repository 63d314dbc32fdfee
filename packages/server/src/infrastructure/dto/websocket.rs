//! WebSocket envelopes.
//!
//! Every frame is a UTF-8 JSON object discriminated by its `type` field.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::domain::{RoomId, UserId};

/// Inbound envelope (client → server).
///
/// `chat_id` is kept as a raw string so that a missing id and a malformed id
/// can be reported separately.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Inbound message types understood by the read pump
pub mod client_type {
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const TYPING: &str = "chat.typing";
    pub const PING: &str = "ping";
}

/// Action confirmed by an `ack` envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckAction {
    Subscribed,
    Unsubscribed,
}

/// Control envelopes (server → client)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "ack")]
    Ack { action: AckAction, chat_id: RoomId },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "presence.changed")]
    PresenceChanged { user_id: UserId, is_online: bool },

    #[serde(rename = "chat.typing")]
    Typing { chat_id: RoomId, user_id: UserId },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize into a ready-to-send frame
    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

/// Envelope for a mapped domain event (server → client)
#[derive(Debug, Serialize)]
pub struct EventMessage<'a> {
    #[serde(rename = "type")]
    pub r#type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<RoomId>,
    pub data: &'a RawValue,
}

impl EventMessage<'_> {
    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}
