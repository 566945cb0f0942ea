//! Runtime configuration, read from the environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CoCreateError, CoCreateResult};
use crate::llm::models::ModelSelection;

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Upstream `OpenRouter` chat-completions endpoint.
pub const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Upstream Gemini API base.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default proxy endpoint the client talks to.
pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:3000/api/openrouter";

/// Default stream-function endpoint the client talks to.
pub const DEFAULT_STREAM_URL: &str = "http://127.0.0.1:3000/functions/v1/ai-cocreate";

/// Configuration for both the server and the client side.
#[derive(Clone, Serialize, Deserialize)]
pub struct CoCreateConfig {
    /// Server-side `OpenRouter` credential (`OPENROUTER_API_KEY`).
    #[serde(skip_serializing)]
    pub openrouter_api_key: Option<String>,
    /// Server-side Gemini credential (`GEMINI_API_KEY`).
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    /// Explicit development mode; the only way to enable direct provider calls.
    pub dev_mode: bool,
    /// Developer `OpenRouter` key for direct calls and remote refinement.
    #[serde(skip_serializing)]
    pub dev_openrouter_key: Option<String>,
    /// Developer Gemini key for remote refinement.
    #[serde(skip_serializing)]
    pub dev_gemini_key: Option<String>,
    /// Proxy endpoint used by the gateway.
    pub proxy_url: String,
    /// Stream-function endpoint used by the stream client.
    pub stream_url: String,
    /// Upstream `OpenRouter` chat-completions URL.
    pub openrouter_url: String,
    /// Upstream Gemini API base URL.
    pub gemini_url: String,
    /// Model choices.
    pub models: ModelSelection,
    /// HTTP port for the server.
    pub port: u16,
    /// Directory holding persisted history.
    pub data_dir: PathBuf,
    /// Directory holding the static single-page app.
    pub static_dir: PathBuf,
    /// Request timeout.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for CoCreateConfig {
    fn default() -> Self {
        Self {
            openrouter_api_key: None,
            gemini_api_key: None,
            dev_mode: false,
            dev_openrouter_key: None,
            dev_gemini_key: None,
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            openrouter_url: OPENROUTER_CHAT_URL.to_string(),
            gemini_url: GEMINI_BASE_URL.to_string(),
            models: ModelSelection::default(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(".cocreate"),
            static_dir: PathBuf::from("static"),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl CoCreateConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function.
    ///
    /// Blank values are treated as absent.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();
        config.openrouter_api_key = get("OPENROUTER_API_KEY");
        config.gemini_api_key = get("GEMINI_API_KEY");
        config.dev_mode = get("COCREATE_DEV_MODE").is_some_and(|v| parse_flag(&v));
        config.dev_openrouter_key = get("COCREATE_DEV_OPENROUTER_KEY");
        config.dev_gemini_key = get("COCREATE_DEV_GEMINI_KEY");

        if let Some(v) = get("COCREATE_PROXY_URL") {
            config.proxy_url = v;
        }
        if let Some(v) = get("COCREATE_STREAM_URL") {
            config.stream_url = v;
        }
        if let Some(v) = get("COCREATE_OPENROUTER_URL") {
            config.openrouter_url = v;
        }
        if let Some(v) = get("COCREATE_GEMINI_URL") {
            config.gemini_url = v;
        }
        if let Some(v) = get("COCREATE_VISION_MODEL") {
            config.models.vision = v;
        }
        if let Some(v) = get("COCREATE_TEXT_MODEL") {
            config.models.text = v;
        }
        if let Some(v) = get("COCREATE_FALLBACK_MODEL") {
            config.models.fallback = v;
        }
        if let Some(port) = get("COCREATE_PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(v) = get("COCREATE_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("COCREATE_STATIC_DIR") {
            config.static_dir = PathBuf::from(v);
        }
        if let Some(secs) = get("COCREATE_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.request_timeout = Duration::from_secs(secs);
        }
        config
    }

    /// Enable or disable development mode.
    #[must_use]
    pub const fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    /// Set the server-side `OpenRouter` key.
    #[must_use]
    pub fn with_openrouter_api_key(mut self, key: impl Into<String>) -> Self {
        self.openrouter_api_key = Some(key.into());
        self
    }

    /// Set the server-side Gemini key.
    #[must_use]
    pub fn with_gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.gemini_api_key = Some(key.into());
        self
    }

    /// Set the developer `OpenRouter` key.
    #[must_use]
    pub fn with_dev_openrouter_key(mut self, key: impl Into<String>) -> Self {
        self.dev_openrouter_key = Some(key.into());
        self
    }

    /// Set the proxy endpoint.
    #[must_use]
    pub fn with_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = url.into();
        self
    }

    /// Set the upstream `OpenRouter` URL.
    #[must_use]
    pub fn with_openrouter_url(mut self, url: impl Into<String>) -> Self {
        self.openrouter_url = url.into();
        self
    }

    /// Set the upstream Gemini base URL.
    #[must_use]
    pub fn with_gemini_url(mut self, url: impl Into<String>) -> Self {
        self.gemini_url = url.into();
        self
    }

    /// Set the history directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if an endpoint is not a valid URL or a model name is blank.
    pub fn validate(&self) -> CoCreateResult<()> {
        for url in [
            &self.proxy_url,
            &self.stream_url,
            &self.openrouter_url,
            &self.gemini_url,
        ] {
            Url::parse(url)?;
        }

        if [&self.models.vision, &self.models.text, &self.models.fallback]
            .iter()
            .any(|m| m.trim().is_empty())
        {
            return Err(CoCreateError::Configuration(
                "model names must not be empty".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(CoCreateError::Configuration(
                "request timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for CoCreateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoCreateConfig")
            .field("openrouter_api_key", &redact(self.openrouter_api_key.as_deref()))
            .field("gemini_api_key", &redact(self.gemini_api_key.as_deref()))
            .field("dev_mode", &self.dev_mode)
            .field("dev_openrouter_key", &redact(self.dev_openrouter_key.as_deref()))
            .field("dev_gemini_key", &redact(self.dev_gemini_key.as_deref()))
            .field("proxy_url", &self.proxy_url)
            .field("stream_url", &self.stream_url)
            .field("openrouter_url", &self.openrouter_url)
            .field("gemini_url", &self.gemini_url)
            .field("models", &self.models)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("static_dir", &self.static_dir)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Secrets show up as `Some("***")` in debug output.
const fn redact(secret: Option<&str>) -> Option<&'static str> {
    match secret {
        Some(_) => Some("***"),
        None => None,
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
