//! Completion gateway: model selection, proxy/direct transport, one-shot
//! fallback and response normalization.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::CoCreateConfig;
use crate::error::{CoCreateError, CoCreateResult};
use crate::modes::ModePreferences;

use super::models::ModelSelection;
use super::normalize::{classify_upstream_message, extract_error_message, normalize_completion};
use super::payload::{ChatCompletionRequest, ChatMessage, ImageInput, build_messages};
use super::refiner::is_configured_key;

/// Title sent to `OpenRouter` for attribution.
pub const APP_TITLE: &str = "CoCreate.AI";

/// Referer sent on direct development calls.
const DEV_REFERER: &str = "http://localhost";

/// Where completion requests are sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEndpoint {
    /// The secured proxy; the provider credential stays on the server.
    Proxy {
        /// Proxy URL.
        url: String,
    },
    /// Direct provider call with a developer credential.
    Direct {
        /// Provider chat-completions URL.
        url: String,
        /// Developer credential.
        api_key: String,
    },
}

impl GatewayEndpoint {
    /// Pick the endpoint for a configuration.
    ///
    /// Direct calls require `dev_mode` and a configured developer key; anything
    /// else goes through the proxy.
    #[must_use]
    pub fn from_config(config: &CoCreateConfig) -> Self {
        if config.dev_mode {
            if let Some(key) = config
                .dev_openrouter_key
                .as_deref()
                .filter(|k| is_configured_key(k))
            {
                warn!("development mode: calling the provider directly, bypassing the proxy");
                return Self::Direct {
                    url: config.openrouter_url.clone(),
                    api_key: key.to_string(),
                };
            }
        }
        Self::Proxy {
            url: config.proxy_url.clone(),
        }
    }

    const fn url(&self) -> &String {
        match self {
            Self::Proxy { url } | Self::Direct { url, .. } => url,
        }
    }
}

/// Something that turns a prompt into assistant text.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Produce assistant text for one system prompt and one user turn.
    ///
    /// # Errors
    /// Returns a classified error when no usable text could be obtained.
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
        images: &[ImageInput],
        preferences: ModePreferences,
    ) -> CoCreateResult<String>;
}

/// Why a single attempt failed.
#[derive(Debug)]
enum AttemptFailure {
    Status { status: u16, body: String },
    Transport(reqwest::Error),
}

impl AttemptFailure {
    /// Whether the fallback model should be tried.
    fn falls_back(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 400 | 404),
            Self::Transport(err) => !err.is_builder(),
        }
    }

    fn into_error(self) -> CoCreateError {
        match self {
            Self::Status { status, body } => {
                let raw = extract_error_message(&body);
                let (kind, message) = classify_upstream_message(status, &raw);
                CoCreateError::Upstream {
                    status,
                    kind,
                    message,
                }
            }
            Self::Transport(err) => CoCreateError::Transport(err),
        }
    }
}

/// Gateway to the chat-completion provider.
pub struct LlmGateway {
    client: Client,
    endpoint: GatewayEndpoint,
    models: ModelSelection,
}

impl LlmGateway {
    /// Create a gateway.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: GatewayEndpoint,
        models: ModelSelection,
        timeout: Duration,
    ) -> CoCreateResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            models,
        })
    }

    /// Create a gateway from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &CoCreateConfig) -> CoCreateResult<Self> {
        Self::new(
            GatewayEndpoint::from_config(config),
            config.models.clone(),
            config.request_timeout,
        )
    }

    /// Endpoint in use.
    #[must_use]
    pub const fn endpoint(&self) -> &GatewayEndpoint {
        &self.endpoint
    }

    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        preferences: ModePreferences,
    ) -> Result<Value, AttemptFailure> {
        let body = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature: preferences.temperature,
            max_tokens: preferences.max_tokens,
        };

        let mut request = self.client.post(self.endpoint.url()).json(&body);
        if let GatewayEndpoint::Direct { api_key, .. } = &self.endpoint {
            request = request
                .bearer_auth(api_key)
                .header("HTTP-Referer", DEV_REFERER)
                .header("X-Title", APP_TITLE);
        }

        let response = request.send().await.map_err(AttemptFailure::Transport)?;
        let status = response.status();
        let text = response.text().await.map_err(AttemptFailure::Transport)?;

        if !status.is_success() {
            return Err(AttemptFailure::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Completer for LlmGateway {
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
        images: &[ImageInput],
        preferences: ModePreferences,
    ) -> CoCreateResult<String> {
        let primary = self.models.select_primary(!images.is_empty());
        let messages = build_messages(system_prompt, user_text, images);
        debug!(model = primary, images = images.len(), "sending completion request");

        let body = match self.send(primary, &messages, preferences).await {
            Ok(body) => body,
            Err(failure) if failure.falls_back() && primary != self.models.fallback => {
                warn!(
                    model = primary,
                    fallback = %self.models.fallback,
                    "primary model failed ({failure:?}), retrying with fallback model"
                );
                self.send(&self.models.fallback, &messages, preferences)
                    .await
                    .map_err(AttemptFailure::into_error)?
            }
            Err(failure) => return Err(failure.into_error()),
        };

        let text = normalize_completion(&body).into_result()?;
        info!(chars = text.len(), "completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::ErrorKind;
    use crate::llm::models::{DEFAULT_FALLBACK_MODEL, DEFAULT_TEXT_MODEL, DEFAULT_VISION_MODEL};
    use crate::modes::Mode;

    fn ok_body(text: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": text}, "finish_reason": "stop"}]})
    }

    fn gateway_for(server: &MockServer) -> LlmGateway {
        let endpoint = GatewayEndpoint::Proxy {
            url: format!("{}/api/openrouter", server.uri()),
        };
        LlmGateway::new(endpoint, ModelSelection::default(), Duration::from_secs(5))
            .unwrap_or_else(|e| panic!("client: {e}"))
    }

    #[tokio::test]
    async fn test_text_request_uses_text_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/openrouter"))
            .and(body_partial_json(json!({"model": DEFAULT_TEXT_MODEL, "max_tokens": 800})))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("A lighthouse keeper...")))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let text = gateway
            .complete(Mode::Story.system_prompt(), "tell me a story", &[], Mode::Story.preferences())
            .await;
        assert_eq!(text.ok().as_deref(), Some("A lighthouse keeper..."));
    }

    #[tokio::test]
    async fn test_images_use_vision_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": DEFAULT_VISION_MODEL})))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("a cat")))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let images = [ImageInput::new("image/png", vec![1, 2, 3])];
        let text = gateway
            .complete("sys", "what is this", &images, Mode::Idea.preferences())
            .await;
        assert_eq!(text.ok().as_deref(), Some("a cat"));
    }

    #[tokio::test]
    async fn test_bad_request_retries_with_fallback_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": DEFAULT_TEXT_MODEL})))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "model unavailable"}})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "model": DEFAULT_FALLBACK_MODEL,
                "messages": [{"role": "system", "content": "sys"}, {"role": "user", "content": "hi there"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("fallback says hi")))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let text = gateway.complete("sys", "hi there", &[], Mode::Story.preferences()).await;
        assert_eq!(text.ok().as_deref(), Some("fallback says hi"));
    }

    #[tokio::test]
    async fn test_fallback_failure_surfaces_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": {"message": "No endpoints found"}})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let err = gateway.complete("sys", "hi", &[], Mode::Story.preferences()).await.err();
        match err {
            Some(CoCreateError::Upstream { status, kind, message }) => {
                assert_eq!(status, 404);
                assert_eq!(kind, ErrorKind::Upstream);
                assert_eq!(message, "No endpoints found");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_retries_with_fallback_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": DEFAULT_TEXT_MODEL})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_body("too late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": DEFAULT_FALLBACK_MODEL})))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("fallback was quick")))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = GatewayEndpoint::Proxy {
            url: format!("{}/api/openrouter", server.uri()),
        };
        let gateway = LlmGateway::new(endpoint, ModelSelection::default(), Duration::from_millis(300))
            .unwrap_or_else(|e| panic!("client: {e}"));
        let text = gateway.complete("sys", "hi", &[], Mode::Story.preferences()).await;
        assert_eq!(text.ok().as_deref(), Some("fallback was quick"));
    }

    #[tokio::test]
    async fn test_no_retry_when_primary_is_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": DEFAULT_FALLBACK_MODEL})))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "bad request"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let models = ModelSelection {
            text: DEFAULT_FALLBACK_MODEL.to_string(),
            ..ModelSelection::default()
        };
        let endpoint = GatewayEndpoint::Proxy {
            url: format!("{}/api/openrouter", server.uri()),
        };
        let gateway = LlmGateway::new(endpoint, models, Duration::from_secs(5))
            .unwrap_or_else(|e| panic!("client: {e}"));
        let err = gateway.complete("sys", "hi", &[], Mode::Story.preferences()).await.err();
        assert!(matches!(err, Some(CoCreateError::Upstream { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(402).set_body_json(json!({"error": {"message": "Insufficient credits"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let err = gateway.complete("sys", "hi", &[], Mode::Story.preferences()).await.err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Balance));
    }

    #[tokio::test]
    async fn test_missing_server_key_is_configuration_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": "Server configuration error: API key not found. Please set OPENROUTER_API_KEY."
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let err = gateway.complete("sys", "hi", &[], Mode::Story.preferences()).await.err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Configuration));
    }

    #[tokio::test]
    async fn test_content_filter_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": ""}, "finish_reason": "content_filter"}]
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let err = gateway.complete("sys", "hi", &[], Mode::Story.preferences()).await.err();
        assert!(matches!(err, Some(CoCreateError::ContentPolicy)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let err = gateway.complete("sys", "hi", &[], Mode::Story.preferences()).await.err();
        assert!(matches!(err, Some(CoCreateError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_direct_endpoint_sends_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer dev-key"))
            .and(header("x-title", APP_TITLE))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("direct")))
            .expect(1)
            .mount(&server)
            .await;

        let config = CoCreateConfig::new()
            .with_dev_mode(true)
            .with_dev_openrouter_key("dev-key")
            .with_openrouter_url(format!("{}/v1/chat/completions", server.uri()));
        let gateway = LlmGateway::from_config(&config).unwrap_or_else(|e| panic!("client: {e}"));
        assert!(matches!(gateway.endpoint(), GatewayEndpoint::Direct { .. }));

        let text = gateway.complete("sys", "hi", &[], Mode::Tutor.preferences()).await;
        assert_eq!(text.ok().as_deref(), Some("direct"));
    }

    #[test]
    fn test_dev_key_ignored_without_dev_mode() {
        let config = CoCreateConfig::new().with_dev_openrouter_key("dev-key");
        assert!(matches!(
            GatewayEndpoint::from_config(&config),
            GatewayEndpoint::Proxy { .. }
        ));

        let placeholder = CoCreateConfig::new()
            .with_dev_mode(true)
            .with_dev_openrouter_key("YOUR_KEY_HERE");
        assert!(matches!(
            GatewayEndpoint::from_config(&placeholder),
            GatewayEndpoint::Proxy { .. }
        ));
    }
}
