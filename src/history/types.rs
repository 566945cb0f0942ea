//! Types for messages and persisted conversations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, MessageId};
use crate::modes::Mode;

/// Maximum number of characters kept in a conversation preview.
pub const PREVIEW_CHARS: usize = 60;

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human.
    User,
    /// The assistant.
    Ai,
}

/// Attachment as shown in the transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    /// Preview URL.
    pub url: String,
    /// File name shown to the user.
    pub display_name: String,
}

/// A single chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Author.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Attached files, in upload order.
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>, attachments: Vec<AttachmentRef>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: content.into(),
            attachments,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant message with empty content.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Ai,
            content: String::new(),
            attachments: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// A persisted snapshot of a finished exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier.
    pub id: ConversationId,
    /// Snapshot time.
    pub created_at: DateTime<Utc>,
    /// Persona used for the exchange.
    pub mode: Mode,
    /// Truncated text of the first message.
    pub preview_text: String,
    /// Messages, oldest first. Never empty.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Snapshot a message list.
    ///
    /// Returns `None` for an empty list.
    #[must_use]
    pub fn snapshot(mode: Mode, messages: &[Message]) -> Option<Self> {
        let first = messages.first()?;
        Some(Self {
            id: ConversationId::new(),
            created_at: Utc::now(),
            mode,
            preview_text: preview_of(&first.content),
            messages: messages.to_vec(),
        })
    }
}

/// Newest-first list of conversations.
pub type HistoryLog = Vec<Conversation>;

fn preview_of(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let mut preview: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    preview.push('…');
    preview
}
