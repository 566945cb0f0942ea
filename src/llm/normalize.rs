//! Normalization of heterogeneous provider responses into plain text.
//!
//! Every provider quirk lives here so the gateway only ever sees a
//! [`Normalized`] value.

use serde_json::Value;
use tracing::warn;

use crate::error::{CoCreateError, ErrorKind};

/// Guidance shown when the provider account is out of credits.
pub const BALANCE_GUIDANCE: &str = "The AI provider account has insufficient credits. Add credits to the account or lower the response length, then try again.";

/// Guidance shown when the provider rejects the credentials.
pub const AUTH_GUIDANCE: &str = "The AI provider rejected the API credentials. Check that OPENROUTER_API_KEY is configured on the server and is still valid.";

/// Guidance shown when too many requests were sent.
pub const RATE_LIMIT_GUIDANCE: &str = "The AI provider is rate limiting requests. Wait a moment and try again.";

/// Result of normalizing a completion body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Normalized {
    /// Text was extracted.
    Text {
        /// Assistant text.
        text: String,
        /// Finish reason reported by the provider, if any.
        finish_reason: Option<String>,
    },
    /// The body cannot be used.
    Failure {
        /// Classification.
        kind: ErrorKind,
        /// Human-readable reason.
        message: String,
    },
}

impl Normalized {
    /// Convert into a `Result`.
    ///
    /// # Errors
    /// Returns the matching [`CoCreateError`] for a failure.
    pub fn into_result(self) -> Result<String, CoCreateError> {
        match self {
            Self::Text { text, .. } => Ok(text),
            Self::Failure {
                kind: ErrorKind::ContentPolicy,
                ..
            } => Err(CoCreateError::ContentPolicy),
            Self::Failure {
                kind: ErrorKind::EmptyResponse,
                ..
            } => Err(CoCreateError::EmptyResponse),
            Self::Failure { kind, message } => Err(CoCreateError::Upstream {
                status: 200,
                kind,
                message,
            }),
        }
    }
}

/// Extract assistant text from a completion body.
#[must_use]
pub fn normalize_completion(body: &Value) -> Normalized {
    let finish_reason = finish_reason_of(body);

    if let Some(reason) = finish_reason.as_deref() {
        if is_safety_stop(reason) {
            return Normalized::Failure {
                kind: ErrorKind::ContentPolicy,
                message: "the response was blocked by the provider's safety filter".to_string(),
            };
        }
        if !reason.eq_ignore_ascii_case("stop") {
            warn!("completion finished with reason {reason:?}");
        }
    }

    match extract_text(body) {
        Some(text) => Normalized::Text {
            text,
            finish_reason,
        },
        None => Normalized::Failure {
            kind: ErrorKind::EmptyResponse,
            message: "the AI returned an empty response".to_string(),
        },
    }
}

fn is_safety_stop(reason: &str) -> bool {
    reason.eq_ignore_ascii_case("content_filter") || reason.eq_ignore_ascii_case("safety")
}

fn finish_reason_of(body: &Value) -> Option<String> {
    body.pointer("/choices/0/finish_reason")
        .or_else(|| body.pointer("/candidates/0/finishReason"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn extract_text(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/choices/0/message/content").and_then(text_of),
        body.pointer("/choices/0/text").and_then(text_of),
        body.pointer("/candidates/0/content/parts").and_then(text_of),
        body.get("outputText").and_then(text_of),
    ];
    candidates
        .into_iter()
        .flatten()
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
}

/// Read text from a string, a `{text}` object or an array of either.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("text").and_then(Value::as_str).map(str::to_string),
        Value::Array(items) => {
            let joined: String = items.iter().filter_map(text_of).collect();
            if joined.is_empty() { None } else { Some(joined) }
        }
        _ => None,
    }
}

/// Read a human-readable message from an error body.
#[must_use]
pub fn extract_error_message(raw: &str) -> String {
    let Ok(body) = serde_json::from_str::<Value>(raw) else {
        return raw.trim().to_string();
    };

    body.pointer("/error/message")
        .or_else(|| body.get("message"))
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map_or_else(|| raw.trim().to_string(), str::to_string)
}

/// Classify a non-success answer and produce the text shown to the user.
#[must_use]
pub fn classify_upstream_message(status: u16, message: &str) -> (ErrorKind, String) {
    let lower = message.to_lowercase();

    if lower.contains("configur") {
        return (ErrorKind::Configuration, message.to_string());
    }
    if lower.contains("credits") || lower.contains("tokens") || status == 402 {
        return (ErrorKind::Balance, BALANCE_GUIDANCE.to_string());
    }
    if lower.contains("api key")
        || lower.contains("auth")
        || lower.contains("credentials")
        || status == 401
        || status == 403
    {
        return (ErrorKind::Auth, AUTH_GUIDANCE.to_string());
    }
    if status == 429 {
        return (ErrorKind::RateLimit, RATE_LIMIT_GUIDANCE.to_string());
    }

    let text = if message.is_empty() {
        format!("AI provider error ({status})")
    } else {
        message.to_string()
    };
    (ErrorKind::Upstream, text)
}
