//! Health endpoint tests against a live listener.

use std::sync::Arc;

use jobsync::testing::{MockSink, UnavailableStore};
use jobsync::{MemoryStateStore, StateStore};
use serde_json::Value;
use server_core::kernel::{run_scheduled, PipelineDeps};
use server_core::server::build_app;
use server_core::Config;
use tokio_util::sync::CancellationToken;

fn demo_config() -> Config {
    Config::from_lookup(|key| (key == "ENABLED_SOURCES").then(|| "demo".to_string())).unwrap()
}

async fn spawn_app(deps: &PipelineDeps) -> String {
    let app = build_app(deps.status.clone(), deps.store.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/health", addr)
}

async fn get_health(url: &str) -> (u16, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_healthy_before_first_run() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let deps = PipelineDeps::build(&demo_config(), Arc::new(MockSink::new()), store).unwrap();
    let url = spawn_app(&deps).await;

    let (status, body) = get_health(&url).await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["state_store"]["entries"], 0);
    assert_eq!(body["pipeline"]["running"], false);
    assert!(body["pipeline"]["last_success_at"].is_null());
}

#[tokio::test]
async fn test_reports_last_run() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let deps = PipelineDeps::build(&demo_config(), Arc::new(MockSink::new()), store).unwrap();
    let url = spawn_app(&deps).await;

    let summary = run_scheduled(&deps, &CancellationToken::new()).await.unwrap();
    let (status, body) = get_health(&url).await;

    assert_eq!(status, 200);
    assert_eq!(body["state_store"]["entries"], summary.totals().inserted);
    assert_eq!(body["pipeline"]["runs_started"], 1);
    assert_eq!(body["pipeline"]["last_summary"]["outcome"], "completed");
    assert!(body["pipeline"]["last_success_at"].is_string());
}

#[tokio::test]
async fn test_unhealthy_after_store_failure() {
    let deps = PipelineDeps::build(
        &demo_config(),
        Arc::new(MockSink::new()),
        Arc::new(UnavailableStore),
    )
    .unwrap();
    let url = spawn_app(&deps).await;

    assert!(run_scheduled(&deps, &CancellationToken::new()).await.is_none());
    let (status, body) = get_health(&url).await;

    assert_eq!(status, 503);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["state_store"]["status"], "error");
    assert!(body["pipeline"]["last_fatal_error"]
        .as_str()
        .unwrap()
        .contains("unavailable"));
}
