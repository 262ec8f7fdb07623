//! Queryable run status, shared between the orchestrator and whoever
//! reports health.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::summary::{RunOutcome, RunSummary};

/// Point-in-time copy of the pipeline status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    /// A run is in progress
    pub running: bool,

    pub current_run_id: Option<Uuid>,

    pub last_run_started_at: Option<DateTime<Utc>>,

    /// Finish time of the last run whose outcome was `Completed`
    pub last_success_at: Option<DateTime<Utc>>,

    pub last_summary: Option<RunSummary>,

    /// Set when the last run aborted on a fatal error; cleared by the next
    /// run that produces a summary
    pub last_fatal_error: Option<String>,

    pub last_fatal_at: Option<DateTime<Utc>>,

    pub runs_started: u64,
}

impl RunStatus {
    /// Healthy unless the most recent run ended fatally.
    pub fn is_healthy(&self) -> bool {
        self.last_fatal_error.is_none()
    }
}

/// Cloneable handle onto the shared status.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<RunStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> RunStatus {
        self.inner.read().await.clone()
    }

    pub async fn last_summary(&self) -> Option<RunSummary> {
        self.inner.read().await.last_summary.clone()
    }

    pub async fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_success_at
    }

    pub(crate) async fn run_started(&self, run_id: Uuid, at: DateTime<Utc>) {
        let mut status = self.inner.write().await;
        status.running = true;
        status.current_run_id = Some(run_id);
        status.last_run_started_at = Some(at);
        status.runs_started += 1;
    }

    pub(crate) async fn run_finished(&self, summary: &RunSummary) {
        let mut status = self.inner.write().await;
        status.running = false;
        status.current_run_id = None;
        if summary.outcome == RunOutcome::Completed {
            status.last_success_at = Some(summary.finished_at);
        }
        status.last_summary = Some(summary.clone());
        status.last_fatal_error = None;
        status.last_fatal_at = None;
    }

    pub(crate) async fn run_failed(&self, error: &str, at: DateTime<Utc>) {
        let mut status = self.inner.write().await;
        status.running = false;
        status.current_run_id = None;
        status.last_fatal_error = Some(error.to_string());
        status.last_fatal_at = Some(at);
    }
}
