//! Session representation
//!
//! `SessionEntry` is the hub's view of one connected client: the sending side
//! of its bounded outbound queue plus the topics it has joined. The entry is
//! the only holder of that sender, so removing the entry from the registry is
//! what closes the queue.

use std::collections::HashSet;
use std::fmt;

use tokio::sync::mpsc::Sender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

/// Opaque handle for a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug)]
pub(crate) struct SessionEntry {
    pub(crate) sender: Sender<WsMessage>,
    pub(crate) topics: HashSet<String>,
}

impl SessionEntry {
    pub(crate) fn new(sender: Sender<WsMessage>) -> Self {
        Self {
            sender,
            topics: HashSet::new(),
        }
    }
}
