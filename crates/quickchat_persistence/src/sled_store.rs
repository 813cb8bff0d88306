//! Record store backed by `sled`
//!
//! Sessions and messages live in two trees of one database. Message keys are
//! `<session_id>\0<created_at micros, zero padded>_<message id>` so the
//! messages of one session are a single chronological prefix scan.

use chrono::Utc;
use sled::{Db, Tree};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{ChatSession, Message, NewMessage};
use crate::store::RecordStore;

const SESSIONS_TREE: &str = "chat_sessions";
const MESSAGES_TREE: &str = "messages";

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    sessions: Tree,
    messages: Tree,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let sessions = db.open_tree(SESSIONS_TREE)?;
        let messages = db.open_tree(MESSAGES_TREE)?;
        Ok(Self {
            db,
            sessions,
            messages,
        })
    }

    fn message_prefix(session_id: &str) -> Vec<u8> {
        let mut prefix = session_id.as_bytes().to_vec();
        prefix.push(0);
        prefix
    }

    fn message_key(message: &Message) -> Vec<u8> {
        let mut key = Self::message_prefix(&message.session_id);
        key.extend_from_slice(
            format!("{:020}_{}", message.created_at.timestamp_micros(), message.id).as_bytes(),
        );
        key
    }
}

impl RecordStore for SledStore {
    fn create_session(&self) -> Result<ChatSession, StoreError> {
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        };

        self.sessions
            .insert(session.id.as_bytes(), serde_json::to_vec(&session)?)?;
        self.db.flush()?;

        debug!(session_id = %session.id, "created chat session");
        Ok(session)
    }

    fn get_session(&self, id: &str) -> Result<Option<ChatSession>, StoreError> {
        match self.sessions.get(id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn create_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        let message = Message {
            id: new
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            session_id: new.session_id,
            content: new.content,
            message_type: new.message_type,
            file_url: new.file_url,
            sender_name: new.sender_name,
            created_at: new.created_at.unwrap_or_else(Utc::now),
        };

        self.messages
            .insert(Self::message_key(&message), serde_json::to_vec(&message)?)?;
        self.db.flush()?;

        debug!(message_id = %message.id, session_id = %message.session_id, "stored message");
        Ok(message)
    }

    fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let mut messages = Vec::new();
        for entry in self.messages.scan_prefix(Self::message_prefix(session_id)) {
            let (key, raw) = entry?;
            match serde_json::from_slice::<Message>(&raw) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(key = ?key, error = %e, "skipping undecodable message record"),
            }
        }
        // Padded keys misorder negative timestamps.
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
