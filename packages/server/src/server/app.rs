//! Application setup and server configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::Extension, routing::get, Router};
use jobsync::{StateStore, StatusHandle};
use tokio_util::sync::CancellationToken;

use crate::server::routes::health_handler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub status: StatusHandle,
    pub store: Arc<dyn StateStore>,
}

/// Build the Axum application router
pub fn build_app(status: StatusHandle, store: Arc<dyn StateStore>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(Extension(AppState { status, store }))
}

/// Serve `app` on `0.0.0.0:port` until `cancel` fires.
pub async fn serve(app: Router, port: u16, cancel: CancellationToken) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!("Health check: http://localhost:{}/health", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Server error")
}
