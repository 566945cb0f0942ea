//! Plain-text export of a conversation.

use chrono::Utc;

use crate::history::{Message, Role};
use crate::modes::Mode;

/// An exported transcript ready to be written to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
    /// Suggested file name, `cocreate-<mode>-<unix-ms>.txt`.
    pub filename: String,
    /// File contents.
    pub contents: String,
}

/// Render messages as `=== Your Input ===` / `=== AI Contribution ===` blocks.
#[must_use]
pub fn export(mode: Mode, messages: &[Message]) -> Transcript {
    let contents = messages
        .iter()
        .map(|m| {
            let header = match m.role {
                Role::User => "=== Your Input ===",
                Role::Ai => "=== AI Contribution ===",
            };
            let mut block = format!("{header}\n{}", m.content);
            for attachment in &m.attachments {
                block.push_str(&format!("\n[attachment: {}]", attachment.display_name));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    Transcript {
        filename: format!("cocreate-{mode}-{}.txt", Utc::now().timestamp_millis()),
        contents,
    }
}
