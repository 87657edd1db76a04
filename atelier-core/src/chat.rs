//! Chat messages exchanged between session participants.

use serde::{Deserialize, Serialize};

/// One chat message. Immutable once appended to a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Session the message belongs to
    pub session_id: String,
    pub user_id: String,
    pub username: String,
    pub text: String,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: u64,
}

impl ChatMessage {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            username: username.into(),
            text: text.into(),
            timestamp: crate::now_millis(),
        }
    }
}
