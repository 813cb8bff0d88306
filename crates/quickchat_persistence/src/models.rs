//! Records kept by the store. Field names match the JSON documents the chat
//! client reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub content: Option<String>,
    pub message_type: String,
    pub file_url: Option<String>,
    pub sender_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A message as submitted by a client. `id` and `created_at` are filled in by
/// the store when missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    /// Text message shorthand used by the CLI and tests.
    pub fn text(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            content: Some(content.into()),
            message_type: "text".to_string(),
            ..Default::default()
        }
    }
}
