//! Error types shared by the gateway, the refiner, the history store and the server.

use thiserror::Error;

/// Coarse classification of a failure, used to pick the user-facing notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A credential or endpoint is missing or invalid.
    Configuration,
    /// The request never got an HTTP answer (DNS, connect, timeout).
    Network,
    /// The provider rejected the credentials.
    Auth,
    /// The provider account has no credits or tokens left.
    Balance,
    /// Too many requests.
    RateLimit,
    /// Any other non-success answer from the provider.
    Upstream,
    /// The completion was blocked by a safety filter.
    ContentPolicy,
    /// The provider answered but no text could be extracted.
    EmptyResponse,
    /// Local persistence failed.
    Storage,
    /// The caller supplied unusable input.
    Invalid,
}

impl ErrorKind {
    /// Whether a second attempt (possibly with another model) can succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::Upstream)
    }
}

/// Errors produced by the `cocreate` crate.
#[derive(Debug, Error)]
pub enum CoCreateError {
    /// Missing credential or endpoint, with remediation text.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success status from the provider, already classified.
    #[error("{message}")]
    Upstream {
        /// HTTP status returned by the provider or the proxy.
        status: u16,
        /// Classification of the failure.
        kind: ErrorKind,
        /// Human-readable message (guidance for known causes).
        message: String,
    },

    /// Completion stopped by the provider's safety filter.
    #[error("the response was blocked by the provider's safety filter")]
    ContentPolicy,

    /// No text could be extracted from a successful answer.
    #[error("the AI returned an empty response")]
    EmptyResponse,

    /// Local storage I/O error.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Caller error.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoCreateError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::InvalidUrl(_) => ErrorKind::Configuration,
            Self::Transport(err) if err.is_status() => ErrorKind::Upstream,
            Self::Transport(err) if err.is_decode() => ErrorKind::EmptyResponse,
            Self::Transport(_) => ErrorKind::Network,
            Self::Upstream { kind, .. } => *kind,
            Self::ContentPolicy => ErrorKind::ContentPolicy,
            Self::EmptyResponse | Self::Serialization(_) => ErrorKind::EmptyResponse,
            Self::Storage(_) => ErrorKind::Storage,
            Self::InvalidInput(_) => ErrorKind::Invalid,
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Convenience result alias.
pub type CoCreateResult<T> = Result<T, CoCreateError>;
