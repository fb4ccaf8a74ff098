use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;

use super::locks::{self, AppState, SharedState};
use super::services::Services;
use crate::config::ServerConfig;

/// Options that only affect how the server is run, not what it does.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    /// Permissive CORS for a locally served UI.
    pub dev_mode: bool,
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(locks::health_check))
        .route("/locks", get(locks::list_locks))
        .route(
            "/locks/{id}",
            get(locks::get_lock).delete(locks::delete_lock),
        )
        .with_state(state)
}

/// Wire the lock store, workspace and VCS clients into shared state.
pub fn build_state(config: &ServerConfig) -> Result<SharedState> {
    Ok(Arc::new(AppState {
        services: Services::from_config(config)?,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Serve until Ctrl+C.
pub async fn start_server(config: &ServerConfig, options: ServeOptions) -> Result<()> {
    let state = build_state(config)?;
    let mut app = build_router(state);
    if options.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, db = %config.db_path().display(), "tfpilot server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
