//! Gemini streaming: request construction for the stream function and
//! incremental decoding of the streamed body on the client side.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::CoCreateConfig;
use crate::error::{CoCreateError, CoCreateResult};
use crate::modes::Mode;

use super::normalize::{classify_upstream_message, extract_error_message};
use super::payload::ImageInput;

/// Model behind the stream function.
pub const GEMINI_STREAM_MODEL: &str = "gemini-2.0-flash-exp";

/// Image sent to the stream function, already base64-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
    /// MIME type.
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

impl From<&ImageInput> for EncodedImage {
    fn from(image: &ImageInput) -> Self {
        Self {
            mime_type: image.mime_type.clone(),
            data: image.base64(),
        }
    }
}

/// Body accepted by the stream function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoCreateStreamRequest {
    /// User text.
    pub prompt: String,
    /// Persona name; unknown names fall back to story.
    #[serde(default)]
    pub mode: String,
    /// Optional images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<EncodedImage>>,
}

/// URL of the upstream SSE streaming endpoint.
#[must_use]
pub fn stream_generate_url(base_url: &str) -> String {
    format!(
        "{}/v1beta/models/{GEMINI_STREAM_MODEL}:streamGenerateContent",
        base_url.trim_end_matches('/')
    )
}

/// Upstream Gemini body for one stream-function call.
#[must_use]
pub fn build_stream_body(mode: Mode, prompt: &str, images: &[EncodedImage]) -> Value {
    let mut parts = vec![json!({
        "text": format!(
            "{}\n\nUser input: {prompt}\n\nContinue or expand on this thoughtfully:",
            mode.system_prompt()
        ),
    })];
    parts.extend(images.iter().map(|img| {
        json!({"inline_data": {"mime_type": img.mime_type, "data": img.data}})
    }));

    json!({
        "contents": [{"parts": parts}],
        "generationConfig": {
            "temperature": 0.9,
            "topK": 40,
            "topP": 0.95,
            "maxOutputTokens": 1024,
        },
    })
}

/// Incremental decoder for a streamed Gemini body.
///
/// Accepts newline-delimited JSON, SSE `data:` lines and compact JSON-array
/// framing. Lines that are not JSON are skipped.
#[derive(Debug, Default)]
pub struct StreamTextDecoder {
    pending: Vec<u8>,
}

impl StreamTextDecoder {
    /// Create a decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the text fragments completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut fragments = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(text) = decode_line(&line) {
                fragments.push(text);
            }
        }
        fragments
    }

    /// Flush the trailing partial line.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending);
        decode_line(&line)
    }
}

fn decode_line(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let mut line = line.trim();
    if let Some(rest) = line.strip_prefix("data:") {
        line = rest.trim();
    }
    let line = line
        .trim_start_matches(['[', ','])
        .trim_end_matches([',', ']'])
        .trim();
    if line.is_empty() {
        return None;
    }

    let value: Value = serde_json::from_str(line).ok()?;
    value
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Client of the stream function.
pub struct CoCreateStreamClient {
    client: Client,
    url: String,
}

impl CoCreateStreamClient {
    /// Create a client for the given stream-function URL.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> CoCreateResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &CoCreateConfig) -> CoCreateResult<Self> {
        Self::new(config.stream_url.clone(), config.request_timeout)
    }

    /// Stream a co-creation. `on_text` receives the accumulated text after
    /// every fragment; the full text is returned.
    ///
    /// # Errors
    /// Returns an error on transport failure, a non-success status or an
    /// empty stream.
    pub async fn cocreate<F>(
        &self,
        prompt: &str,
        mode: Mode,
        images: &[ImageInput],
        mut on_text: F,
    ) -> CoCreateResult<String>
    where
        F: FnMut(&str) + Send,
    {
        let body = CoCreateStreamRequest {
            prompt: prompt.to_string(),
            mode: mode.as_str().to_string(),
            images: if images.is_empty() {
                None
            } else {
                Some(images.iter().map(EncodedImage::from).collect())
            },
        };

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let (kind, message) =
                classify_upstream_message(status.as_u16(), &extract_error_message(&raw));
            return Err(CoCreateError::Upstream {
                status: status.as_u16(),
                kind,
                message,
            });
        }

        let mut decoder = StreamTextDecoder::new();
        let mut full = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            for fragment in decoder.push(&chunk?) {
                full.push_str(&fragment);
                on_text(&full);
            }
        }
        if let Some(fragment) = decoder.finish() {
            full.push_str(&fragment);
            on_text(&full);
        }

        debug!(chars = full.len(), "stream finished");
        if full.trim().is_empty() {
            return Err(CoCreateError::EmptyResponse);
        }
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn sse_line(text: &str) -> String {
        format!(
            "data: {}\r\n\r\n",
            json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
        )
    }

    #[test]
    fn test_decoder_handles_split_chunks() {
        let line = sse_line("Hello");
        let (a, b) = line.split_at(10);
        let mut decoder = StreamTextDecoder::new();
        assert!(decoder.push(a.as_bytes()).is_empty());
        assert_eq!(decoder.push(b.as_bytes()), vec!["Hello".to_string()]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_array_framing_and_garbage() {
        let body = format!(
            "[{}\n,{}\nnot json\n]\n",
            json!({"candidates": [{"content": {"parts": [{"text": "one"}]}}]}),
            json!({"candidates": [{"content": {"parts": [{"text": "two"}]}}]}),
        );
        let mut decoder = StreamTextDecoder::new();
        assert_eq!(decoder.push(body.as_bytes()), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_decoder_finish_flushes_tail() {
        let tail = json!({"candidates": [{"content": {"parts": [{"text": "tail"}]}}]}).to_string();
        let mut decoder = StreamTextDecoder::new();
        assert!(decoder.push(tail.as_bytes()).is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
    }

    #[test]
    fn test_stream_body_includes_persona_and_images() {
        let images = [EncodedImage {
            mime_type: "image/png".to_string(),
            data: "AQID".to_string(),
        }];
        let body = build_stream_body(Mode::Tutor, "fractions", &images);
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
        assert!(text.starts_with(Mode::Tutor.system_prompt()));
        assert!(text.contains("User input: fractions"));
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[tokio::test]
    async fn test_client_concatenates_fragments() {
        let server = MockServer::start().await;
        let body = format!("{}{}", sse_line("Once "), sse_line("upon a time"));
        Mock::given(method("POST"))
            .and(path("/functions/v1/ai-cocreate"))
            .and(body_partial_json(json!({"prompt": "a tale", "mode": "story"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = CoCreateStreamClient::new(
            format!("{}/functions/v1/ai-cocreate", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap_or_else(|e| panic!("client: {e}"));

        let mut seen = Vec::new();
        let full = client
            .cocreate("a tale", Mode::Story, &[], |partial| seen.push(partial.to_string()))
            .await;
        assert_eq!(full.ok().as_deref(), Some("Once upon a time"));
        assert_eq!(seen, vec!["Once ".to_string(), "Once upon a time".to_string()]);
    }

    #[tokio::test]
    async fn test_client_surfaces_function_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "GEMINI_API_KEY is not configured"})))
            .mount(&server)
            .await;

        let client = CoCreateStreamClient::new(server.uri(), Duration::from_secs(5))
            .unwrap_or_else(|e| panic!("client: {e}"));
        let err = client.cocreate("x", Mode::Idea, &[], |_| {}).await.err();
        assert_eq!(
            err.map(|e| e.kind()),
            Some(crate::error::ErrorKind::Configuration)
        );
    }
}
