//! User-visible notices.

use std::fmt;

use crate::error::{CoCreateError, ErrorKind};

/// Category of a notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    /// Submit was attempted with nothing to send.
    InputRequired,
    /// A request is already in flight.
    Busy,
    /// The referenced message or conversation does not exist.
    NotFound,
    /// The file type cannot be attached.
    Unsupported,
    /// Connectivity failure.
    Network,
    /// Credential or configuration failure.
    Auth,
    /// The provider is throttling.
    RateLimit,
    /// Anything else.
    Generic,
}

/// A toast-style message for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    /// Category.
    pub kind: NoticeKind,
    /// Short title.
    pub title: String,
    /// Longer explanation.
    pub description: String,
}

impl Notice {
    /// Build a notice.
    #[must_use]
    pub fn new(kind: NoticeKind, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
        }
    }

    /// Empty submit.
    #[must_use]
    pub fn input_required() -> Self {
        Self::new(
            NoticeKind::InputRequired,
            "Input required",
            "Please enter some text or attach an image to co-create with AI",
        )
    }

    /// Submit while awaiting.
    #[must_use]
    pub fn busy() -> Self {
        Self::new(
            NoticeKind::Busy,
            "Please wait",
            "The AI is still working on the previous message",
        )
    }

    /// Missing message or conversation.
    #[must_use]
    pub fn not_found(what: &str) -> Self {
        Self::new(NoticeKind::NotFound, "Not found", format!("{what} no longer exists"))
    }

    /// Classify a gateway failure.
    #[must_use]
    pub fn from_error(err: &CoCreateError) -> Self {
        match err.kind() {
            ErrorKind::Network => Self::new(
                NoticeKind::Network,
                "Connection problem",
                "Failed to connect with AI. Please check your connection and try again.",
            ),
            ErrorKind::Auth | ErrorKind::Configuration => {
                Self::new(NoticeKind::Auth, "Authentication error", err.to_string())
            }
            ErrorKind::RateLimit => Self::new(NoticeKind::RateLimit, "Too many requests", err.to_string()),
            ErrorKind::Balance => Self::new(NoticeKind::Generic, "Insufficient credits", err.to_string()),
            ErrorKind::ContentPolicy => Self::new(
                NoticeKind::Generic,
                "Response blocked",
                "The response was blocked by the safety filter. Try rephrasing your request.",
            ),
            ErrorKind::EmptyResponse => Self::new(
                NoticeKind::Generic,
                "Empty response",
                "The AI returned an empty response. Please try again.",
            ),
            ErrorKind::Upstream | ErrorKind::Storage | ErrorKind::Invalid => {
                Self::new(NoticeKind::Generic, "Error", err.to_string())
            }
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}
