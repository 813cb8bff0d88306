//! quickchat_persistence
//!
//! Storage collaborators of the realtime backend:
//! - `RecordStore`: chat sessions and messages, implemented on `sled`
//! - `BlobStore`: uploaded chat media, implemented on the local filesystem
//!
//! Both are synchronous and cheap to clone so callers can share one handle
//! across tasks.

pub mod blob_store;
pub mod error;
pub mod models;
pub mod sled_store;
pub mod store;


pub use blob_store::{BlobStore, FsBlobStore};
pub use error::StoreError;
pub use models::{ChatSession, Message, NewMessage};
pub use sled_store::SledStore;
pub use store::RecordStore;
