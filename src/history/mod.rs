//! Local conversation history.
//!
//! This module provides the persisted record types, a small key/value storage
//! seam and the bounded, newest-first history log built on top of it.

pub mod storage;
pub mod store;
pub mod types;

pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{HISTORY_KEY, LocalHistoryStore, MAX_HISTORY_ENTRIES};
pub use types::{AttachmentRef, Conversation, HistoryLog, Message, Role};
