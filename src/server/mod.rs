//! HTTP server for `CoCreate.AI`.
//!
//! Provides:
//! - `POST /api/openrouter`: chat-completion proxy holding the server-side key
//! - `POST /functions/v1/ai-cocreate`: persona-framed Gemini stream
//! - `GET /health`
//! - the static single-page app as fallback

pub mod routes;
pub mod state;

pub use routes::{OPENROUTER_PROXY_PATH, STREAM_FUNCTION_PATH, create_router};
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

/// The application exactly as served: routes plus request tracing.
#[must_use]
pub fn build_app(state: Arc<AppState>) -> Router {
    create_router(state).layer(TraceLayer::new_for_http())
}

/// Start the HTTP server with graceful shutdown support.
///
/// The server will stop accepting new connections when `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails while serving.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let static_dir = state.config.static_dir.display().to_string();
    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("CoCreate.AI server listening on http://{addr} (static: {static_dir})");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use super::*;
    use crate::config::CoCreateConfig;

    fn app() -> Router {
        let state = AppState::new(CoCreateConfig::new()).unwrap_or_else(|e| panic!("state: {e}"));
        build_app(state)
    }

    fn header_value(response: &axum::response::Response, name: header::HeaderName) -> Option<String> {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    #[tokio::test]
    async fn test_browser_preflight_reaches_function_handlers() {
        for uri in [OPENROUTER_PROXY_PATH, STREAM_FUNCTION_PATH] {
            let request = Request::builder()
                .method("OPTIONS")
                .uri(uri)
                .header(header::ORIGIN, "https://app.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap_or_default();
            let response = app()
                .oneshot(request)
                .await
                .unwrap_or_else(|e| match e {});

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                header_value(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN).as_deref(),
                Some("*")
            );
            assert_eq!(
                header_value(&response, header::ACCESS_CONTROL_ALLOW_METHODS).as_deref(),
                Some("POST, OPTIONS")
            );
            assert_eq!(
                header_value(&response, header::ACCESS_CONTROL_ALLOW_HEADERS).as_deref(),
                Some("authorization, x-client-info, apikey, content-type")
            );
        }
    }

    #[tokio::test]
    async fn test_health_is_cors_enabled() {
        let request = Request::get("/health")
            .header(header::ORIGIN, "https://app.example")
            .body(Body::empty())
            .unwrap_or_default();
        let response = app()
            .oneshot(request)
            .await
            .unwrap_or_else(|e| match e {});

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            header_value(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN).as_deref(),
            Some("*")
        );
    }
}
