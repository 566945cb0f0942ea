//! Application state shared across all request handlers.

use std::sync::Arc;

use reqwest::Client;

use crate::config::CoCreateConfig;
use crate::error::CoCreateResult;

/// Shared application state.
pub struct AppState {
    /// Server configuration, including the server-side credentials.
    pub config: CoCreateConfig,
    /// HTTP client for upstream calls.
    pub client: Client,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: CoCreateConfig) -> CoCreateResult<Arc<Self>> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Arc::new(Self { config, client }))
    }

    /// Server-side `OpenRouter` key, if set.
    #[must_use]
    pub fn openrouter_key(&self) -> Option<&str> {
        non_blank(self.config.openrouter_api_key.as_deref())
    }

    /// Server-side Gemini key, if set.
    #[must_use]
    pub fn gemini_key(&self) -> Option<&str> {
        non_blank(self.config.gemini_api_key.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
