//! Provider-agnostic chat payloads.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Text sent when the user submitted nothing but the provider requires content.
pub const EMPTY_PROMPT_FALLBACK: &str = "Hello";

/// Image data attached to a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageInput {
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

impl ImageInput {
    /// Create an image input.
    #[must_use]
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Base64 of the bytes.
    #[must_use]
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:` URL embedding the image.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }
}

/// URL wrapper of an image part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// `data:` or remote URL.
    pub url: String,
}

/// One part of a mixed user message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Inline image.
    ImageUrl {
        /// The image location.
        image_url: ImageUrl,
    },
}

/// Message content: plain text or a list of parts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Mixed text and images.
    Parts(Vec<ContentPart>),
}

/// One chat message in the `OpenAI`/`OpenRouter` shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`.
    pub role: String,
    /// Content.
    pub content: MessageContent,
}

impl ChatMessage {
    /// System message.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// Plain-text user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }
}

/// Body of a chat-completion request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token budget.
    pub max_tokens: u32,
}

/// Build the system + user message pair for a request.
#[must_use]
pub fn build_messages(system: &str, user_text: &str, images: &[ImageInput]) -> Vec<ChatMessage> {
    let user = if images.is_empty() {
        let text = if user_text.trim().is_empty() {
            EMPTY_PROMPT_FALLBACK
        } else {
            user_text
        };
        ChatMessage::user(text)
    } else {
        let mut parts = Vec::with_capacity(images.len() + 1);
        if !user_text.trim().is_empty() {
            parts.push(ContentPart::Text {
                text: user_text.to_string(),
            });
        }
        parts.extend(images.iter().map(|img| ContentPart::ImageUrl {
            image_url: ImageUrl { url: img.data_url() },
        }));
        ChatMessage {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        }
    };

    vec![ChatMessage::system(system), user]
}
