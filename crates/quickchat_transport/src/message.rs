use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One client frame: `{topic, event, payload, ref}`.
///
/// Missing `topic` and `event` decode as empty strings, so a bare
/// `{event: "heartbeat"}` is still answered and a frame without an event is
/// ignored like any unknown one. `payload` is passed through untouched and
/// defaults to `null`; `ref` is echoed verbatim in replies.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Join,
    Leave,
    Heartbeat,
    Other,
}

impl InboundEnvelope {
    /// Classify the event name. The legacy client sends the `phx_` forms.
    pub fn kind(&self) -> ClientEvent {
        match self.event.as_str() {
            "phx_join" | "join" => ClientEvent::Join,
            "phx_leave" | "leave" => ClientEvent::Leave,
            "heartbeat" => ClientEvent::Heartbeat,
            _ => ClientEvent::Other,
        }
    }
}
