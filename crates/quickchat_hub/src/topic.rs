//! Topic management
//!
//! A `Topic` is the subscriber set of one topic name. The registry only keeps
//! topics that have at least one subscriber: it creates one on the first join
//! and removes it in the same mutation that takes out its last subscriber, so
//! `is_empty` is only ever observed on a topic that is about to be dropped.

use std::collections::HashSet;

use crate::session::SessionId;

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscribers: HashSet<SessionId>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashSet::new(),
        }
    }

    /// Add a subscriber to the topic. Returns `false` if it was already there.
    pub fn subscribe(&mut self, id: SessionId) -> bool {
        self.subscribers.insert(id)
    }

    /// Remove a subscriber from the topic.
    pub fn unsubscribe(&mut self, id: &SessionId) -> bool {
        self.subscribers.remove(id)
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
