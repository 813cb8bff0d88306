//! Hub engine
//!
//! This module contains the in-memory topic registry responsible for:
//! - tracking live sessions and the topics each one joined
//! - keeping topic → subscriber and subscriber → topic maps consistent
//! - fanning published envelopes out to every subscriber of a topic
//! - evicting sessions whose outbound queue is full or already closed
//!
//! Concurrency and usage notes:
//! - Every operation takes the single registry mutex for a short,
//!   non-blocking critical section. Nothing awaits while holding it, so a
//!   plain `std::sync::Mutex` is used.
//! - Enqueueing uses `try_send` only. A session that cannot take a frame right
//!   now is dropped instead of slowing down the publisher.
//! - The registry owns the only `Sender` of each session queue. Removing the
//!   session entry drops that sender, which is how the outbound pump learns
//!   that no further frames will come. An entry can only be removed once, so
//!   the queue can only be closed once.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::message::Envelope;
use crate::session::{SessionEntry, SessionId};
use crate::topic::Topic;

#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) topics: HashMap<String, Topic>,
    pub(crate) sessions: HashMap<SessionId, SessionEntry>,
}

/// Cloneable handle to the process-wide registry.
#[derive(Debug, Clone, Default)]
pub struct Hub {
    registry: Arc<Mutex<Registry>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        // Registry methods never panic mid-mutation, so a poisoned lock still
        // guards consistent maps.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new live session with an outbound queue of `capacity`
    /// frames. The receiving side goes to the session's outbound pump.
    pub fn register_session(&self, capacity: usize) -> (SessionId, mpsc::Receiver<WsMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let id = SessionId::new();
        let mut registry = self.registry();
        registry.sessions.insert(id, SessionEntry::new(sender));
        debug!(session = %id, live = registry.sessions.len(), "registered session");
        (id, receiver)
    }

    /// Remove a session from the live set and from every topic it joined,
    /// closing its outbound queue. Returns `false` if it was already gone.
    pub fn unregister_session(&self, id: SessionId) -> bool {
        let removed = self.registry().remove_session(id);
        if removed {
            info!(session = %id, "unregistered session");
        }
        removed
    }

    /// Subscribe a live session to `topic`, creating the topic if needed.
    /// Returns `true` if the subscription is new.
    pub fn join(&self, id: SessionId, topic: &str) -> bool {
        let joined = self.registry().join(id, topic);
        if joined {
            debug!(session = %id, topic, "joined topic");
        }
        joined
    }

    /// Unsubscribe a session from `topic`. Returns `true` if it was subscribed.
    pub fn leave(&self, id: SessionId, topic: &str) -> bool {
        let left = self.registry().leave(id, topic);
        if left {
            debug!(session = %id, topic, "left topic");
        }
        left
    }

    /// Fan an event out to every current subscriber of `topic`.
    ///
    /// Never blocks and never fails: subscribers that cannot accept the frame
    /// are evicted. Returns the number of sessions the frame was queued for.
    pub fn publish(&self, topic: &str, event: &str, payload: Value) -> usize {
        let frame = match Envelope::new(topic, event, payload).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(topic, event, error = %e, "failed to serialize broadcast");
                return 0;
            }
        };

        let mut registry = self.registry();
        let subscribers: Vec<SessionId> = match registry.topics.get(topic) {
            Some(t) => t.subscribers.iter().copied().collect(),
            None => {
                debug!(topic, event, "no subscribers for topic");
                return 0;
            }
        };

        let mut delivered = 0;
        for id in subscribers {
            if registry.deliver(id, frame.clone()) {
                delivered += 1;
            }
        }
        debug!(topic, event, delivered, "published event");
        delivered
    }

    /// Queue a single envelope (a protocol reply) for one session. Same
    /// non-blocking rules as `publish`. Returns `true` if it was queued.
    pub fn send(&self, id: SessionId, envelope: &Envelope) -> bool {
        let frame = match envelope.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session = %id, event = %envelope.event, error = %e, "dropping unencodable reply");
                return false;
            }
        };
        self.registry().deliver(id, frame)
    }

    pub fn is_live(&self, id: SessionId) -> bool {
        self.registry().sessions.contains_key(&id)
    }

    pub fn session_count(&self) -> usize {
        self.registry().sessions.len()
    }

    pub fn topic_count(&self) -> usize {
        self.registry().topics.len()
    }

    /// Snapshot of the subscribers of `topic`; empty if the topic does not exist.
    pub fn subscribers(&self, topic: &str) -> HashSet<SessionId> {
        self.registry()
            .topics
            .get(topic)
            .map(|t| t.subscribers.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the topics a session joined, or `None` if it is not live.
    pub fn joined_topics(&self, id: SessionId) -> Option<HashSet<String>> {
        self.registry()
            .sessions
            .get(&id)
            .map(|entry| entry.topics.clone())
    }
}

impl Registry {
    fn remove_session(&mut self, id: SessionId) -> bool {
        let Some(entry) = self.sessions.remove(&id) else {
            return false;
        };
        for name in &entry.topics {
            self.detach(name, id);
        }
        // `entry` drops here together with the queue's only sender.
        true
    }

    fn join(&mut self, id: SessionId, topic: &str) -> bool {
        let Some(entry) = self.sessions.get_mut(&id) else {
            return false;
        };
        if !entry.topics.insert(topic.to_string()) {
            return false;
        }
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(id);
        true
    }

    fn leave(&mut self, id: SessionId, topic: &str) -> bool {
        let Some(entry) = self.sessions.get_mut(&id) else {
            return false;
        };
        if !entry.topics.remove(topic) {
            return false;
        }
        self.detach(topic, id);
        true
    }

    fn detach(&mut self, topic: &str, id: SessionId) {
        if let Some(t) = self.topics.get_mut(topic) {
            t.unsubscribe(&id);
            if t.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    fn deliver(&mut self, id: SessionId, frame: WsMessage) -> bool {
        let Some(entry) = self.sessions.get(&id) else {
            return false;
        };
        match entry.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(session = %id, "outbound queue full, evicting slow consumer");
                self.remove_session(id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session = %id, "outbound queue receiver gone, evicting session");
                self.remove_session(id);
                false
            }
        }
    }

    /// Panics if the two maps disagree or an empty topic is left behind.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (name, topic) in &self.topics {
            assert!(!topic.is_empty(), "topic {name} has no subscribers");
            assert_eq!(&topic.name, name);
            for id in &topic.subscribers {
                let entry = self
                    .sessions
                    .get(id)
                    .unwrap_or_else(|| panic!("{id} in {name} is not live"));
                assert!(entry.topics.contains(name), "{id} does not list {name}");
            }
        }
        for (id, entry) in &self.sessions {
            for name in &entry.topics {
                let topic = self
                    .topics
                    .get(name)
                    .unwrap_or_else(|| panic!("{id} lists missing topic {name}"));
                assert!(topic.subscribers.contains(id), "{name} does not list {id}");
            }
        }
    }
}
