use crate::error::StoreError;
use crate::models::{ChatSession, Message, NewMessage};

/// Key-value record store for chat sessions and their messages.
///
/// Every successful `create_*` call is durable by the time it returns, which
/// is what allows the change feed to publish right after it.
pub trait RecordStore: Send + Sync {
    /// Create a new session with a fresh id.
    fn create_session(&self) -> Result<ChatSession, StoreError>;

    fn get_session(&self, id: &str) -> Result<Option<ChatSession>, StoreError>;

    /// Persist a message, assigning an id and timestamp when they are missing.
    fn create_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// All messages of a session, oldest first.
    fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError>;
}
