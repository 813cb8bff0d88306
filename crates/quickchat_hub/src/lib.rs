//! quickchat_hub
//!
//! The realtime hub: a process-wide registry of live sessions grouped into
//! named topics, and the fan-out point for published events.
//!
//! Public types:
//! - `Hub`: cloneable handle to the registry; register/unregister sessions,
//!   join/leave topics, publish and send replies.
//! - `Envelope`: the outbound `{topic, event, payload, ref}` frame.
//! - `MessageFeed`: publishes a change notification after each stored message.
//!
//! Transport crates own the sockets; the hub only ever sees the sending side
//! of each session's bounded outbound queue.

pub mod changes;
pub mod engine;
pub mod message;
pub mod session;
pub mod topic;

pub use changes::MessageFeed;
pub use engine::Hub;
pub use message::Envelope;
pub use session::SessionId;
