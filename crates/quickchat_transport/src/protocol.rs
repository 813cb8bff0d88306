//! Channel protocol
//!
//! Interprets one inbound envelope for one session:
//!
//! | event       | effect        | replies                                   |
//! |-------------|---------------|-------------------------------------------|
//! | `phx_join`  | join topic    | `phx_reply` (ok + watched filter), `system` |
//! | `heartbeat` | none          | `phx_reply` on `phoenix`                  |
//! | `phx_leave` | leave topic   | `phx_reply`                               |
//! | anything else | ignored     | none                                      |
//!
//! Replies are queued through the hub like any other frame, so they share the
//! session's FIFO order and backpressure rules.

use quickchat_hub::changes::{
    INSERT, MESSAGES_TABLE, MESSAGES_TOPIC_PREFIX, REALTIME_NAMESPACE, SCHEMA, session_filter,
};
use quickchat_hub::{Envelope, Hub, SessionId};
use serde_json::{Value, json};
use tracing::debug;

use crate::message::{ClientEvent, InboundEnvelope};

/// Topic heartbeats are answered on.
pub const CONTROL_TOPIC: &str = "phoenix";
pub const REPLY_EVENT: &str = "phx_reply";
pub const SYSTEM_EVENT: &str = "system";

pub fn dispatch(hub: &Hub, session: SessionId, inbound: InboundEnvelope) {
    match inbound.kind() {
        ClientEvent::Join => {
            hub.join(session, &inbound.topic);
            hub.send(session, &join_reply(&inbound));
            hub.send(session, &subscribed_notice(&inbound.topic));
        }
        ClientEvent::Heartbeat => {
            hub.send(session, &heartbeat_reply(inbound.reference));
        }
        ClientEvent::Leave => {
            hub.leave(session, &inbound.topic);
            hub.send(session, &ok_reply(&inbound.topic, inbound.reference));
        }
        ClientEvent::Other => {
            debug!(session = %session, event = %inbound.event, "ignoring unknown event");
        }
    }
}

/// Session id a join topic filters on: whatever follows
/// `realtime:messages:`. Topics without that prefix have no key.
pub fn filter_key(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(MESSAGES_TOPIC_PREFIX)
        .filter(|key| !key.is_empty())
}

/// Channel name announced after a join: the topic without its `realtime:`
/// namespace, or the topic itself when it has none.
pub fn channel_name(topic: &str) -> &str {
    topic.strip_prefix(REALTIME_NAMESPACE).unwrap_or(topic)
}

fn ok_payload(response: Value) -> Value {
    json!({ "status": "ok", "response": response })
}

fn ok_reply(topic: &str, reference: Option<String>) -> Envelope {
    Envelope::new(topic, REPLY_EVENT, ok_payload(json!({}))).with_ref(reference)
}

pub fn join_reply(inbound: &InboundEnvelope) -> Envelope {
    let filter = filter_key(&inbound.topic)
        .map(session_filter)
        .unwrap_or_default();
    let response = json!({
        "event": INSERT,
        "filter": filter,
        "schema": SCHEMA,
        "table": MESSAGES_TABLE,
    });
    Envelope::new(inbound.topic.as_str(), REPLY_EVENT, ok_payload(response))
        .with_ref(inbound.reference.clone())
}

pub fn subscribed_notice(topic: &str) -> Envelope {
    Envelope::new(
        topic,
        SYSTEM_EVENT,
        json!({
            "channel": channel_name(topic),
            "message": "Subscribed to PostgreSQL",
            "extension": "postgres_changes",
            "status": "ok",
        }),
    )
}

pub fn heartbeat_reply(reference: Option<String>) -> Envelope {
    ok_reply(CONTROL_TOPIC, reference)
}
