//! Model choices for the gateway.

use serde::{Deserialize, Serialize};

/// Default vision-capable model.
pub const DEFAULT_VISION_MODEL: &str = "google/gemini-2.0-flash-001";
/// Default text-only model.
pub const DEFAULT_TEXT_MODEL: &str = "meta-llama/llama-3.1-8b-instruct";
/// Default guaranteed-available fallback model.
pub const DEFAULT_FALLBACK_MODEL: &str = "mistralai/mistral-7b-instruct:free";

/// The three model slots used by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    /// Used when the request carries images.
    pub vision: String,
    /// Used for text-only requests.
    pub text: String,
    /// Used once when the primary model rejects the request.
    pub fallback: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            vision: DEFAULT_VISION_MODEL.to_string(),
            text: DEFAULT_TEXT_MODEL.to_string(),
            fallback: DEFAULT_FALLBACK_MODEL.to_string(),
        }
    }
}

impl ModelSelection {
    /// Primary model for a request.
    #[must_use]
    pub fn select_primary(&self, has_images: bool) -> &str {
        if has_images { &self.vision } else { &self.text }
    }
}
