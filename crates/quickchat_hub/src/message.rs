//! Outbound envelope
//!
//! Every text frame the server writes is one JSON `Envelope`:
//! - `topic`: the topic the frame belongs to (`phoenix` for heartbeats)
//! - `event`: e.g. `phx_reply`, `system`, `postgres_changes`
//! - `payload`: arbitrary JSON
//! - `ref`: correlation token of the request being answered; omitted for
//!   broadcasts

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tungstenite::protocol::Message as WsMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub event: String,
    pub payload: Value,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            reference: None,
        }
    }

    pub fn with_ref(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }

    /// Serialize into a WebSocket text frame.
    pub fn to_frame(&self) -> Result<WsMessage, serde_json::Error> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}
