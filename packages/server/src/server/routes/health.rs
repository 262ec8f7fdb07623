use axum::{extract::Extension, http::StatusCode, Json};
use jobsync::RunStatus;
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    state_store: StoreHealth,
    pipeline: RunStatus,
}

#[derive(Serialize)]
pub struct StoreHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Checks:
/// - State store responsiveness
/// - Whether the most recent run ended on a fatal error
///
/// Returns 200 OK if both are fine, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let store_health = match tokio::time::timeout(std::time::Duration::from_secs(5), async {
        state.store.ping().await?;
        state.store.len().await
    })
    .await
    {
        Ok(Ok(entries)) => StoreHealth {
            status: "ok".to_string(),
            entries: Some(entries),
            error: None,
        },
        Ok(Err(e)) => StoreHealth {
            status: "error".to_string(),
            entries: None,
            error: Some(e.to_string()),
        },
        Err(_) => StoreHealth {
            status: "error".to_string(),
            entries: None,
            error: Some("Ping timeout (>5s)".to_string()),
        },
    };

    let pipeline = state.status.snapshot().await;

    let is_healthy = store_health.status == "ok" && pipeline.is_healthy();

    let overall_status = if is_healthy {
        "healthy"
    } else {
        "unhealthy"
    };

    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: overall_status.to_string(),
            state_store: store_health,
            pipeline,
        }),
    )
}
