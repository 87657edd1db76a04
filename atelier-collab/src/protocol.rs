//! JSON wire protocol for session synchronization.
//!
//! Every frame is a text envelope of the shape:
//! ```text
//! { "type": <string>, "data": <object> }
//! ```
//!
//! Inbound envelopes form a closed tagged set — an unknown `type`, or
//! `data` that does not parse into the expected shape, fails decoding and
//! is rejected for that single frame without touching session state.
//!
//! Outbound events mirror the envelope, except that the lifecycle events
//! (`connected`, `user_disconnected`) carry their fields flat rather than
//! nested under `data`.

use serde::{Deserialize, Serialize};

use atelier_core::{CanvasState, ChatMessage};

/// An envelope received from a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEnvelope {
    /// Wholesale replacement of the session's canvas
    CanvasUpdate(CanvasState),
    /// A chat message to append and fan out
    ChatMessage(ChatMessage),
}

impl ClientEnvelope {
    /// Decode a text frame. Unknown `type` tags and malformed `data`
    /// both surface as [`ProtocolError::Decode`].
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// An event sent to participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Join acknowledgement, sent once to the new participant
    Connected {
        session_id: String,
        active_users: usize,
    },
    /// Current canvas snapshot, sent once on join when one exists
    CanvasState { data: CanvasState },
    /// A canvas replacement accepted by the store
    CanvasUpdate { data: CanvasState },
    /// A chat message appended to the session history
    ChatMessage { data: ChatMessage },
    /// A participant left; carries the remaining live count
    UserDisconnected { active_users: usize },
}

impl ServerEvent {
    /// Encode to a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode a text frame (used by clients and tests).
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Encode(String),
    Decode(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "Encode error: {e}"),
            Self::Decode(e) => write!(f, "Decode error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}
