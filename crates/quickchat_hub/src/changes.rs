//! Change feed
//!
//! Chat clients listen for new messages of a session on
//! `realtime:messages:<session_id>`. After a message is durably stored the
//! feed publishes a `postgres_changes` event carrying the full record and the
//! table metadata the client library expects.

use quickchat_persistence::{ChatSession, Message, NewMessage, RecordStore, StoreError};
use serde_json::{Value, json};
use tracing::debug;

use crate::engine::Hub;

/// Namespace segment every realtime topic starts with.
pub const REALTIME_NAMESPACE: &str = "realtime:";
/// Prefix of per-session message topics; the remainder is the session id.
pub const MESSAGES_TOPIC_PREFIX: &str = "realtime:messages:";
pub const CHANGE_EVENT: &str = "postgres_changes";

pub const SCHEMA: &str = "public";
pub const MESSAGES_TABLE: &str = "messages";
pub const INSERT: &str = "INSERT";

const MESSAGE_COLUMNS: [(&str, &str); 6] = [
    ("session_id", "uuid"),
    ("content", "text"),
    ("message_type", "text"),
    ("file_url", "text"),
    ("sender_name", "text"),
    ("created_at", "timestamptz"),
];

pub fn messages_topic(session_id: &str) -> String {
    format!("{MESSAGES_TOPIC_PREFIX}{session_id}")
}

/// Filter expression a subscriber of `session_id` is watching.
pub fn session_filter(session_id: &str) -> String {
    format!("session_id=eq.{session_id}")
}

/// Payload of the change notification for a newly inserted message.
pub fn insert_change(message: &Message) -> Value {
    let columns: Vec<Value> = MESSAGE_COLUMNS
        .iter()
        .map(|(name, kind)| json!({ "name": name, "type": kind }))
        .collect();

    json!({
        "data": {
            "schema": SCHEMA,
            "table": MESSAGES_TABLE,
            "commit_timestamp": message.created_at,
            "type": INSERT,
            "record": message,
            "old": {},
            "errors": null,
            "columns": columns,
        },
        "ids": [],
    })
}

/// Record store front that announces every new message on the hub.
#[derive(Debug, Clone)]
pub struct MessageFeed<S> {
    store: S,
    hub: Hub,
}

impl<S: RecordStore> MessageFeed<S> {
    pub fn new(store: S, hub: Hub) -> Self {
        Self { store, hub }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn create_session(&self) -> Result<ChatSession, StoreError> {
        self.store.create_session()
    }

    pub fn get_session(&self, id: &str) -> Result<Option<ChatSession>, StoreError> {
        self.store.get_session(id)
    }

    pub fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        self.store.list_messages(session_id)
    }

    /// Store a message, then publish it to the session topic. Store errors
    /// are returned and nothing is published; publishing itself cannot fail.
    pub fn create_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        let message = self.store.create_message(new)?;
        let topic = messages_topic(&message.session_id);
        let delivered = self
            .hub
            .publish(&topic, CHANGE_EVENT, insert_change(&message));
        debug!(message_id = %message.id, topic = %topic, delivered, "announced new message");
        Ok(message)
    }
}
