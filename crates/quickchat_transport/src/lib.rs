//! quickchat_transport
//!
//! WebSocket side of the realtime hub:
//! - `websocket`: accept loop that upgrades requests on the realtime path
//! - `session`: the inbound and outbound pumps of one connection
//! - `protocol`: join / leave / heartbeat handling and the replies they produce
//! - `message`: the inbound envelope

pub mod error;
pub mod message;
pub mod protocol;
pub mod session;
pub mod websocket;

#[cfg(test)]
mod tests;

pub use error::TransportError;
pub use message::{ClientEvent, InboundEnvelope};
pub use session::{SessionOptions, run_session};
pub use websocket::{serve, start_websocket_server};
