//! Startup helpers for the `CoCreate.AI` server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::config::CoCreateConfig;
use crate::server::{self, AppState};

/// Install the global `tracing` subscriber (`RUST_LOG` plus an `INFO` floor).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

/// Run the server (used by the `cocreate-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();

    tracing::info!("Starting CoCreate.AI v{}", env!("CARGO_PKG_VERSION"));

    let state = match initialize(CoCreateConfig::from_env()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    let port = state.config.port;

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(server::run_server_with_shutdown(state, port, shutdown_signal())) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    tracing::info!("Server stopped");
    ExitCode::SUCCESS
}

/// Validate the configuration and build the application state.
///
/// # Errors
/// Returns an error if the configuration is invalid or state creation fails.
pub fn initialize(config: CoCreateConfig) -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    config.validate()?;

    if config.openrouter_api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY is not set; the proxy will answer with a configuration error");
    }
    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; the stream function will answer with an error");
    }
    tracing::info!("OpenRouter upstream: {}", config.openrouter_url);

    Ok(AppState::new(config)?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
