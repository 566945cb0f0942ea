//! Prompt refinement: remote rewriting with a deterministic local fallback.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::CoCreateConfig;
use crate::error::{CoCreateError, CoCreateResult};

use super::normalize::{extract_error_message, normalize_completion};

/// System instruction for remote refinement.
pub const REFINE_SYSTEM_PROMPT: &str = "You are a helpful prompt-refinement assistant. Improve the user's prompt for clarity, completeness, and specificity without changing intent.";

/// Model used for remote refinement on `OpenRouter`.
pub const REFINE_MODEL: &str = "anthropic/claude-3-opus-20240229";

/// Gemini model used for remote refinement.
pub const GEMINI_REFINE_MODEL: &str = "gemini-pro";

/// Template returned for any code or website request.
pub const HTML_TEMPLATE: &str = "Write a complete, well-structured HTML document including <!doctype html>, a <head> with meta charset and a title, and a <body> demonstrating basic layout elements (headers, paragraphs, and a simple navigation). Include brief comments and minimal CSS to illustrate styling.";

/// Result for input that is empty once normalized.
pub const EMPTY_INPUT_REFINEMENT: &str = "Please provide more details.";

/// Inputs up to this many words get an intent template or a polite expansion.
const SHORT_PROMPT_WORDS: usize = 6;

/// Whether a credential is usable (non-blank and not a `YOUR_...` placeholder).
pub(crate) fn is_configured_key(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && !key.contains("YOUR_")
}

/// Credentials available for remote refinement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefineCredentials {
    /// `OpenRouter` key.
    pub openrouter_key: Option<String>,
    /// Gemini key.
    pub gemini_key: Option<String>,
}

impl RefineCredentials {
    /// No remote credentials: local refinement only.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Client-side developer keys from configuration.
    #[must_use]
    pub fn from_config(config: &CoCreateConfig) -> Self {
        Self {
            openrouter_key: config.dev_openrouter_key.clone(),
            gemini_key: config.dev_gemini_key.clone(),
        }
    }

    fn openrouter(&self) -> Option<&str> {
        self.openrouter_key.as_deref().filter(|k| is_configured_key(k))
    }

    fn gemini(&self) -> Option<&str> {
        self.gemini_key.as_deref().filter(|k| is_configured_key(k))
    }
}

/// Refines raw user text into a clearer prompt.
pub struct PromptRefiner {
    client: Client,
    openrouter_url: String,
    gemini_url: String,
}

impl PromptRefiner {
    /// Create a refiner.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        openrouter_url: impl Into<String>,
        gemini_url: impl Into<String>,
        timeout: Duration,
    ) -> CoCreateResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            openrouter_url: openrouter_url.into(),
            gemini_url: gemini_url.into(),
        })
    }

    /// Create a refiner from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &CoCreateConfig) -> CoCreateResult<Self> {
        Self::new(
            config.openrouter_url.clone(),
            config.gemini_url.clone(),
            config.request_timeout,
        )
    }

    /// Refine `text`. Never fails: remote failures fall back to local rewriting.
    pub async fn refine(&self, text: &str, credentials: &RefineCredentials) -> String {
        if let Some(key) = credentials.openrouter() {
            match self.refine_with_openrouter(text, key).await {
                Ok(refined) => {
                    info!("prompt refined remotely (openrouter)");
                    return refined;
                }
                Err(err) => warn!("openrouter refinement failed, falling back: {err}"),
            }
        }

        if let Some(key) = credentials.gemini() {
            match self.refine_with_gemini(text, key).await {
                Ok(refined) => {
                    info!("prompt refined remotely (gemini)");
                    return refined;
                }
                Err(err) => warn!("gemini refinement failed, falling back: {err}"),
            }
        }

        debug!("using local prompt refinement");
        local_refine(text)
    }

    async fn refine_with_openrouter(&self, text: &str, key: &str) -> CoCreateResult<String> {
        let body = json!({
            "model": REFINE_MODEL,
            "messages": [
                {"role": "system", "content": REFINE_SYSTEM_PROMPT},
                {"role": "user", "content": format!("Refine this prompt:\n\n{text}")},
            ],
            "temperature": 0.7,
            "max_tokens": 300,
        });

        let response = self
            .client
            .post(&self.openrouter_url)
            .bearer_auth(key)
            .header("HTTP-Referer", "http://localhost")
            .header("X-Title", "CoCreate Synth Prompt Refinement")
            .json(&body)
            .send()
            .await?;
        Self::read_refinement(response).await
    }

    async fn refine_with_gemini(&self, text: &str, key: &str) -> CoCreateResult<String> {
        let url = format!(
            "{}/v1beta/models/{GEMINI_REFINE_MODEL}:generateContent",
            self.gemini_url.trim_end_matches('/')
        );
        let body = json!({
            "contents": [{
                "parts": [{
                    "text": format!(
                        "Refine this user prompt for clarity, completeness, and better AI understanding, without changing its meaning:\n\n\"{text}\""
                    ),
                }],
            }],
        });

        let response = self
            .client
            .post(url)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?;
        Self::read_refinement(response).await
    }

    async fn read_refinement(response: reqwest::Response) -> CoCreateResult<String> {
        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(CoCreateError::Upstream {
                status: status.as_u16(),
                kind: crate::error::ErrorKind::Upstream,
                message: extract_error_message(&raw),
            });
        }
        let body: Value = serde_json::from_str(&raw)?;
        normalize_completion(&body).into_result()
    }
}

/// Compiled patterns for local rewriting.
struct LocalRewriter {
    whitespace: Regex,
    refined_markers: Regex,
    html: Regex,
    css: Regex,
    js: Regex,
    leading_please: Regex,
    code_request: Regex,
    image_request: Regex,
    social_request: Regex,
}

impl LocalRewriter {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            whitespace: Regex::new(r"\s+")?,
            refined_markers: Regex::new(
                r"(?i)(write a complete|well-structured|<!doctype html>|provide a detailed|please generate a detailed description|please write a concise, engaging)",
            )?,
            html: Regex::new(r"(?i)\bhtml\b")?,
            css: Regex::new(r"(?i)\bcss\b")?,
            js: Regex::new(r"(?i)\bjs\b")?,
            leading_please: Regex::new(r"(?i)^(please\b[, ]*)+")?,
            code_request: Regex::new(
                r"(?i)\b(html|website|webpage|site|html5|react|component|css|js|javascript|code)\b",
            )?,
            image_request: Regex::new(r"(?i)\b(image|photo|picture)\b")?,
            social_request: Regex::new(r"(?i)\b(social|post|tweet|caption)\b")?,
        })
    }

    fn refine(&self, input: &str) -> String {
        let normalized = normalize_whitespace(&self.whitespace, input);
        if normalized.is_empty() {
            return EMPTY_INPUT_REFINEMENT.to_string();
        }
        if self.refined_markers.is_match(&normalized) {
            return normalized;
        }

        let expanded = self.html.replace_all(&normalized, "HTML");
        let expanded = self.css.replace_all(&expanded, "CSS");
        let expanded = self.js.replace_all(&expanded, "JavaScript");
        let raw = self.leading_please.replace(&expanded, "").trim().to_string();

        if self.code_request.is_match(&raw) {
            return HTML_TEMPLATE.to_string();
        }
        if !raw.chars().any(char::is_alphanumeric) {
            return EMPTY_INPUT_REFINEMENT.to_string();
        }

        if raw.split_whitespace().count() <= SHORT_PROMPT_WORDS {
            let subject = raw.trim_end_matches(['.', '?', '!']);
            if self.image_request.is_match(&raw) {
                return format!(
                    "Please generate a detailed description and usage notes for the image request: {subject}. Include style, color palette, and suggested layout."
                );
            }
            if self.social_request.is_match(&raw) {
                return format!(
                    "Please write a concise, engaging social-media post for: {subject}. Keep it under 280 characters and include a clear call to action."
                );
            }
            return ensure_terminal_punctuation(format!("Please {}", lowercase_first(&raw)));
        }

        ensure_terminal_punctuation(uppercase_first(&raw))
    }
}

fn normalize_whitespace(re: &Regex, input: &str) -> String {
    re.replace_all(input.trim(), " ").into_owned()
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_lowercase().chain(chars).collect()
    })
}

fn uppercase_first(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn ensure_terminal_punctuation(mut s: String) -> String {
    if !s.ends_with(['.', '?', '!']) {
        s.push('.');
    }
    s
}

/// Deterministic local refinement. Always returns non-empty text.
#[must_use]
pub fn local_refine(text: &str) -> String {
    static REWRITER: OnceLock<Option<LocalRewriter>> = OnceLock::new();

    let rewriter = REWRITER.get_or_init(|| match LocalRewriter::new() {
        Ok(rewriter) => Some(rewriter),
        Err(err) => {
            warn!("local refinement patterns failed to compile: {err}");
            None
        }
    });

    match rewriter {
        Some(rewriter) => rewriter.refine(text),
        None => {
            let echoed = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if echoed.is_empty() {
                EMPTY_INPUT_REFINEMENT.to_string()
            } else {
                echoed
            }
        }
    }
}
