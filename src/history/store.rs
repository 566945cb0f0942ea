//! Bounded, newest-first conversation log over a [`KeyValueStorage`].

use tracing::{debug, warn};

use crate::ids::ConversationId;

use super::storage::KeyValueStorage;
use super::types::{Conversation, HistoryLog};

/// Storage key for the history log.
pub const HISTORY_KEY: &str = "cocreate_history";

/// Maximum number of conversations kept.
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// Persisted history of past conversations.
pub struct LocalHistoryStore {
    storage: Box<dyn KeyValueStorage>,
}

impl LocalHistoryStore {
    /// Create a store over the given backend.
    #[must_use]
    pub fn new(storage: impl KeyValueStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
        }
    }

    /// Read the persisted log.
    ///
    /// Absent or malformed payloads yield an empty log.
    #[must_use]
    pub fn load(&self) -> HistoryLog {
        let Some(raw) = self.storage.get(HISTORY_KEY) else {
            return Vec::new();
        };

        match serde_json::from_str::<HistoryLog>(&raw) {
            Ok(mut log) => {
                log.retain(|c| !c.messages.is_empty());
                log.truncate(MAX_HISTORY_ENTRIES);
                log
            }
            Err(err) => {
                debug!("discarding malformed history payload: {err}");
                Vec::new()
            }
        }
    }

    /// Look up a conversation by identity.
    #[must_use]
    pub fn get(&self, id: ConversationId) -> Option<Conversation> {
        self.load().into_iter().find(|c| c.id == id)
    }

    /// Prepend a conversation, keep the newest 50, persist and return the log.
    pub fn append(&self, conversation: Conversation) -> HistoryLog {
        if conversation.messages.is_empty() {
            warn!("refusing to persist a conversation without messages");
            return self.load();
        }

        let mut log = self.load();
        log.insert(0, conversation);
        log.truncate(MAX_HISTORY_ENTRIES);
        self.persist(&log);
        log
    }

    /// Delete a conversation. Unknown ids leave the log unchanged.
    pub fn remove(&self, id: ConversationId) -> HistoryLog {
        let mut log = self.load();
        let before = log.len();
        log.retain(|c| c.id != id);
        if log.len() != before {
            self.persist(&log);
        }
        log
    }

    /// Delete the whole log.
    pub fn clear(&self) {
        if let Err(err) = self.storage.remove(HISTORY_KEY) {
            warn!("failed to clear history: {err}");
        }
    }

    fn persist(&self, log: &HistoryLog) {
        let result = serde_json::to_string(log)
            .map_err(crate::error::CoCreateError::from)
            .and_then(|json| self.storage.set(HISTORY_KEY, &json));
        if let Err(err) = result {
            warn!("failed to persist history: {err}");
        }
    }
}
