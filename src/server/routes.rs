//! HTTP route handlers: the `OpenRouter` proxy and the co-creation stream function.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::llm::gateway::APP_TITLE;
use crate::llm::gemini::{CoCreateStreamRequest, build_stream_body, stream_generate_url};
use crate::modes::Mode;

use super::state::AppState;

/// Path of the `OpenRouter` proxy.
pub const OPENROUTER_PROXY_PATH: &str = "/api/openrouter";

/// Path of the co-creation stream function.
pub const STREAM_FUNCTION_PATH: &str = "/functions/v1/ai-cocreate";

const DEFAULT_REFERER: &str = "https://cocreate.ai";
const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
const DEFAULT_TEMPERATURE: f64 = 0.9;
const DEFAULT_MAX_TOKENS: u64 = 800;

const MISSING_KEY_ERROR: &str =
    "Server configuration error: API key not found. Please set OPENROUTER_API_KEY in the server environment.";
const MISSING_KEY_DETAILS: &str =
    "The OPENROUTER_API_KEY environment variable is missing. Add it to the server environment and restart.";
const AUTH_FALLBACK_MESSAGE: &str =
    "Invalid API key. Please check your OPENROUTER_API_KEY in the server environment.";
const AUTH_DETAILS: &str = "The API key may be invalid, expired, or not set correctly on the server.";

/// Create the API router with all routes.
///
/// The proxy and the stream function answer their own preflights, so the
/// permissive `CorsLayer` only wraps `/health` and the static app.
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let assets = ServeDir::new(&state.config.static_dir);

    let functions = Router::new()
        .route(
            OPENROUTER_PROXY_PATH,
            post(openrouter_proxy)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            STREAM_FUNCTION_PATH,
            post(ai_cocreate)
                .options(preflight)
                .fallback(method_not_allowed),
        );

    Router::new()
        .route("/health", get(health_check))
        .fallback_service(assets)
        .layer(cors)
        .merge(functions)
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "cocreate",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn preflight() -> Response {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS),
        ],
    )
        .into_response()
}

async fn method_not_allowed() -> Response {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &json!({"error": "Method not allowed"}),
    )
}

/// JSON body with the permissive origin header every handler answers with.
fn json_response(status: StatusCode, body: &Value) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

fn error_response(message: impl Into<String>) -> Response {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &json!({"error": message.into()}),
    )
}

/// Present, non-null, non-empty and non-zero.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Forward a chat completion to `OpenRouter` with the server-side key.
async fn openrouter_proxy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(api_key) = state.openrouter_key() else {
        error!("OPENROUTER_API_KEY is not set in the server environment");
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({"error": MISSING_KEY_ERROR, "details": MISSING_KEY_DETAILS}),
        );
    };

    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let model = request.get("model").filter(|v| is_truthy(v));
    let messages = request.get("messages").filter(|v| is_truthy(v));
    let (Some(model), Some(messages)) = (model, messages) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            &json!({"error": "Missing required fields: model, messages"}),
        );
    };

    let temperature = request
        .get("temperature")
        .and_then(Value::as_f64)
        .filter(|t| t.abs() > 0.0)
        .unwrap_or(DEFAULT_TEMPERATURE);
    let max_tokens = request
        .get("max_tokens")
        .and_then(Value::as_u64)
        .filter(|t| *t > 0)
        .unwrap_or(DEFAULT_MAX_TOKENS);
    let referer = header_str(&headers, &header::REFERER)
        .or_else(|| header_str(&headers, &header::ORIGIN))
        .unwrap_or(DEFAULT_REFERER);

    let upstream = state
        .client
        .post(&state.config.openrouter_url)
        .bearer_auth(api_key)
        .header("HTTP-Referer", referer)
        .header("X-Title", APP_TITLE)
        .json(&json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        }))
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(err) => {
            error!("error in openrouter proxy: {err}");
            return error_response(err.to_string());
        }
    };

    let status = upstream.status();
    let data: Value = match upstream.json().await {
        Ok(data) => data,
        Err(err) => {
            error!("unreadable openrouter response: {err}");
            return error_response(err.to_string());
        }
    };

    if status.is_success() {
        info!(status = status.as_u16(), "openrouter exchange completed");
    } else {
        error!(status = status.as_u16(), body = %data, "openrouter API error");
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = data
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or(AUTH_FALLBACK_MESSAGE);
            return json_response(
                status,
                &json!({
                    "error": "Authentication failed",
                    "message": message,
                    "details": AUTH_DETAILS,
                }),
            );
        }
    }

    json_response(status, &data)
}

/// Stream a persona-framed Gemini generation back as plain text.
async fn ai_cocreate(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match open_gemini_stream(&state, &body).await {
        Ok(response) => response,
        Err(message) => {
            error!("error in ai-cocreate function: {message}");
            error_response(message)
        }
    }
}

async fn open_gemini_stream(state: &AppState, body: &[u8]) -> Result<Response, String> {
    let request: CoCreateStreamRequest =
        serde_json::from_slice(body).map_err(|e| e.to_string())?;
    let api_key = state
        .gemini_key()
        .ok_or_else(|| "GEMINI_API_KEY is not configured".to_string())?;

    let mode = Mode::from_name_or_default(&request.mode);
    let images = request.images.unwrap_or_default();
    let upstream = state
        .client
        .post(stream_generate_url(&state.config.gemini_url))
        .query(&[("alt", "sse"), ("key", api_key)])
        .json(&build_stream_body(mode, &request.prompt, &images))
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = upstream.status();
    if !status.is_success() {
        let text = upstream.text().await.unwrap_or_default();
        error!(status = status.as_u16(), body = %text, "gemini API error");
        return Err(format!("Gemini API error: {}", status.as_u16()));
    }

    info!(%mode, images = images.len(), "streaming co-creation");
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS),
        ],
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::CoCreateConfig;

    fn router(config: CoCreateConfig) -> Router {
        let state = AppState::new(config).unwrap_or_else(|e| panic!("state: {e}"));
        create_router(state)
    }

    fn config_for(server: &MockServer) -> CoCreateConfig {
        CoCreateConfig::new()
            .with_openrouter_url(format!("{}/api/v1/chat/completions", server.uri()))
            .with_gemini_url(server.uri())
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|e| panic!("request: {e}"))
    }

    async fn read_body(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map(|b| b.to_vec())
            .unwrap_or_default()
    }

    async fn read_json(response: Response) -> Value {
        serde_json::from_slice(&read_body(response).await).unwrap_or(Value::Null)
    }

    fn chat_body() -> Value {
        json!({
            "model": "meta-llama/llama-3.1-8b-instruct",
            "messages": [{"role": "user", "content": "hi"}],
        })
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(CoCreateConfig::new())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap_or_default())
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "cocreate");
    }

    #[tokio::test]
    async fn test_proxy_without_key_is_configuration_error() {
        let response = router(CoCreateConfig::new())
            .oneshot(post_json(OPENROUTER_PROXY_PATH, &chat_body()))
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert!(body["error"].as_str().is_some_and(|e| e.contains("OPENROUTER_API_KEY")));
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn test_proxy_requires_model_and_messages() {
        let config = CoCreateConfig::new().with_openrouter_api_key("sk-test");
        let response = router(config)
            .oneshot(post_json(OPENROUTER_PROXY_PATH, &json!({"model": "m"})))
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(response).await["error"],
            "Missing required fields: model, messages"
        );
    }

    #[tokio::test]
    async fn test_proxy_forwards_with_defaults() {
        let server = MockServer::start().await;
        let upstream = json!({"choices": [{"message": {"content": "Once upon a time"}}]});
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header_is("authorization", "Bearer sk-test"))
            .and(header_is("x-title", "CoCreate.AI"))
            .and(header_is("http-referer", "https://cocreate.ai"))
            .and(body_partial_json(json!({"temperature": 0.9, "max_tokens": 800})))
            .respond_with(ResponseTemplate::new(200).set_body_json(upstream.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server).with_openrouter_api_key("sk-test");
        let response = router(config)
            .oneshot(post_json(OPENROUTER_PROXY_PATH, &chat_body()))
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        assert_eq!(read_json(response).await, upstream);
    }

    #[tokio::test]
    async fn test_proxy_uses_request_referer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_is("http-referer", "https://app.example"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = post_json(OPENROUTER_PROXY_PATH, &chat_body());
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static("https://app.example"));
        let config = config_for(&server).with_openrouter_api_key("sk-test");
        let response = router(config)
            .oneshot(request)
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_proxy_rewraps_auth_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "No auth credentials found"}})),
            )
            .mount(&server)
            .await;

        let config = config_for(&server).with_openrouter_api_key("sk-bad");
        let response = router(config)
            .oneshot(post_json(OPENROUTER_PROXY_PATH, &chat_body()))
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Authentication failed");
        assert_eq!(body["message"], "No auth credentials found");
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn test_proxy_passes_other_errors_verbatim() {
        let server = MockServer::start().await;
        let upstream = json!({"error": {"message": "Rate limit exceeded", "code": 429}});
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(upstream.clone()))
            .mount(&server)
            .await;

        let config = config_for(&server).with_openrouter_api_key("sk-test");
        let response = router(config)
            .oneshot(post_json(OPENROUTER_PROXY_PATH, &chat_body()))
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(read_json(response).await, upstream);
    }

    #[tokio::test]
    async fn test_proxy_transport_failure() {
        let config = CoCreateConfig::new()
            .with_openrouter_api_key("sk-test")
            .with_openrouter_url("http://127.0.0.1:9/api/v1/chat/completions");
        let response = router(config)
            .oneshot(post_json(OPENROUTER_PROXY_PATH, &chat_body()))
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(read_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_preflight_and_method_guard() {
        for uri in [OPENROUTER_PROXY_PATH, STREAM_FUNCTION_PATH] {
            let preflight = router(CoCreateConfig::new())
                .oneshot(
                    Request::builder()
                        .method("OPTIONS")
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap_or_default(),
                )
                .await
                .unwrap_or_else(|e| match e {});
            assert_eq!(preflight.status(), StatusCode::OK);
            let headers = preflight.headers();
            assert_eq!(
                headers
                    .get(header::ACCESS_CONTROL_ALLOW_METHODS)
                    .and_then(|v| v.to_str().ok()),
                Some("POST, OPTIONS")
            );
            assert_eq!(
                headers
                    .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
                    .and_then(|v| v.to_str().ok()),
                Some(ALLOWED_HEADERS)
            );

            let get = router(CoCreateConfig::new())
                .oneshot(Request::get(uri).body(Body::empty()).unwrap_or_default())
                .await
                .unwrap_or_else(|e| match e {});
            assert_eq!(get.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(read_json(get).await["error"], "Method not allowed");
        }
    }

    #[tokio::test]
    async fn test_stream_without_key() {
        let response = router(CoCreateConfig::new())
            .oneshot(post_json(STREAM_FUNCTION_PATH, &json!({"prompt": "hi", "mode": "story"})))
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await["error"], "GEMINI_API_KEY is not configured");
    }

    #[tokio::test]
    async fn test_stream_pipes_upstream_body() {
        let server = MockServer::start().await;
        let sse = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\r\n\r\n";
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash-exp:streamGenerateContent"))
            .and(query_param("key", "g-test"))
            .and(query_param("alt", "sse"))
            .and(body_partial_json(json!({"generationConfig": {"maxOutputTokens": 1024}})))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server).with_gemini_api_key("g-test");
        let response = router(config)
            .oneshot(post_json(
                STREAM_FUNCTION_PATH,
                &json!({"prompt": "a lighthouse", "mode": "poem"}),
            ))
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("text/plain")
        );
        assert_eq!(read_body(response).await, sse.as_bytes());
    }

    #[tokio::test]
    async fn test_stream_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let config = config_for(&server).with_gemini_api_key("g-test");
        let response = router(config)
            .oneshot(post_json(STREAM_FUNCTION_PATH, &json!({"prompt": "x"})))
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await["error"], "Gemini API error: 400");
    }

    #[tokio::test]
    async fn test_static_fallback() {
        let Ok(dir) = tempfile::tempdir() else { return };
        assert!(std::fs::write(dir.path().join("index.html"), "<h1>CoCreate</h1>").is_ok());
        let mut config = CoCreateConfig::new();
        config.static_dir = dir.path().to_path_buf();

        let response = router(config)
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap_or_default())
            .await
            .unwrap_or_else(|e| match e {});
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_body(response).await, b"<h1>CoCreate</h1>");
    }
}
