//! Orchestrator: one run across every registered source.
//!
//! ```text
//! fetch (concurrent, bounded) ──► in registration order, per chunk:
//!     normalize ──► classify ──► sync ──► SourceSummary
//! ```
//!
//! Fetches overlap, but the normalize→sync stage handles one source at a
//! time in registration order, so a posting emitted by two sources ends up
//! with the later source's fields. The run deadline and cancellation are
//! checked while waiting for fetches and between chunks; a sink write in
//! progress always completes.

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{StateStoreError, StoreResult};
use crate::pipeline::identity::classify_chunk;
use crate::pipeline::status::StatusHandle;
use crate::pipeline::sync::SyncEngine;
use crate::sources::SourceRegistry;
use crate::traits::sink::Sink;
use crate::traits::source::SourceAdapter;
use crate::traits::store::StateStore;
use crate::types::config::{FetchFilters, PipelineConfig};
use crate::types::record::{CanonicalRecord, RawRecord};
use crate::types::summary::{RunOutcome, RunSummary, SourceStatus, SourceSummary};

/// Runs sources through the pipeline and reports a [`RunSummary`].
pub struct Orchestrator {
    engine: SyncEngine,
    config: PipelineConfig,
    status: StatusHandle,
    run_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(sink: Arc<dyn Sink>, store: Arc<dyn StateStore>, config: PipelineConfig) -> Self {
        let engine = SyncEngine::new(sink, store).with_retry(config.retry);
        Self {
            engine,
            config,
            status: StatusHandle::new(),
            run_lock: Mutex::new(()),
        }
    }

    /// Share an existing status handle (e.g. one the health endpoint reads).
    pub fn with_status(mut self, status: StatusHandle) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every source once.
    ///
    /// Returns `Err` only when the state store fails; per-source and
    /// per-record problems are reported in the summary.
    pub async fn run(&self, registry: &SourceRegistry) -> StoreResult<RunSummary> {
        self.run_until_cancelled(registry, &CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), stopping early when `cancel` fires.
    pub async fn run_until_cancelled(
        &self,
        registry: &SourceRegistry,
        cancel: &CancellationToken,
    ) -> StoreResult<RunSummary> {
        // Overlapping runs would race on the state store.
        let _guard = self.run_lock.lock().await;
        self.run_locked(registry, cancel).await
    }

    /// Like [`run_until_cancelled`](Self::run_until_cancelled), but returns
    /// `None` without running when another run is in progress.
    pub async fn try_run_until_cancelled(
        &self,
        registry: &SourceRegistry,
        cancel: &CancellationToken,
    ) -> Option<StoreResult<RunSummary>> {
        let _guard = self.run_lock.try_lock().ok()?;
        Some(self.run_locked(registry, cancel).await)
    }

    async fn run_locked(
        &self,
        registry: &SourceRegistry,
        cancel: &CancellationToken,
    ) -> StoreResult<RunSummary> {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        self.status.run_started(run_id, started_at).await;
        info!(%run_id, sources = registry.len(), "Run started");

        match self.execute(run_id, started_at, registry, cancel).await {
            Ok(summary) => {
                self.status.run_finished(&summary).await;
                let totals = summary.totals();
                info!(
                    %run_id,
                    outcome = ?summary.outcome,
                    sources_succeeded = summary.sources_succeeded(),
                    sources_failed = summary.sources_failed(),
                    fetched = totals.fetched,
                    rejected = totals.rejected,
                    inserted = totals.inserted,
                    updated = totals.updated,
                    skipped = totals.skipped,
                    failed = totals.failed,
                    "Run finished"
                );
                Ok(summary)
            }
            Err(err) => {
                error!(%run_id, error = %err, "Run aborted: state store failure");
                self.status.run_failed(&err.to_string(), Utc::now()).await;
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        run_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        registry: &SourceRegistry,
        cancel: &CancellationToken,
    ) -> StoreResult<RunSummary> {
        let mut summaries: Vec<SourceSummary> =
            registry.iter().map(|a| SourceSummary::new(a.name())).collect();

        if let Some(stop_file) = &self.config.stop_file {
            if tokio::fs::try_exists(stop_file).await.unwrap_or(false) {
                warn!(%run_id, path = %stop_file.display(), "Emergency stop file present; run halted");
                return Ok(RunSummary {
                    run_id,
                    started_at,
                    finished_at: Utc::now(),
                    outcome: RunOutcome::Halted,
                    sources: summaries,
                });
            }
        }

        self.engine.store().ping().await.map_err(|e| match e {
            StateStoreError::Unavailable(_) => e,
            other => StateStoreError::Unavailable(other.to_string()),
        })?;

        let deadline = self.config.run_timeout.map(|t| Instant::now() + t);

        // Fetches run as tasks so they keep making progress while earlier
        // sources are being synced.
        let jobs: Vec<FetchJob> = registry
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, adapter)| FetchJob {
                index,
                adapter,
                filters: self.config.filters.clone(),
            })
            .collect();
        let mut fetches = stream::iter(jobs)
            .map(spawn_fetch)
            .buffered(self.config.fetch_concurrency.max(1));

        let mut interrupted: Option<(usize, SourceStatus)> = None;
        let mut next_index = 0;

        while interrupted.is_none() {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SourceStatus::Cancelled),
                _ = sleep_until(deadline) => Err(SourceStatus::TimedOut),
                item = fetches.next() => Ok(item),
            };

            let (index, adapter, result) = match next {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(status) => {
                    interrupted = Some((next_index, status));
                    break;
                }
            };
            next_index = index + 1;

            let summary = &mut summaries[index];
            match result {
                Ok(records) => {
                    if let Some(status) = self
                        .process_source(adapter.as_ref(), records, summary, deadline, cancel)
                        .await?
                    {
                        interrupted = Some((next_index, status));
                    }
                }
                Err(err) => {
                    warn!(%run_id, source = %adapter.name(), error = %err, "Source fetch failed");
                    summary.status = SourceStatus::FetchFailed;
                    summary.error = Some(err);
                }
            }
        }
        // Aborts fetches still in flight.
        drop(fetches);

        let outcome = match interrupted {
            Some((from, status)) => {
                for summary in summaries.iter_mut().skip(from) {
                    if summary.status == SourceStatus::NotRun {
                        summary.status = status;
                    }
                }
                RunOutcome::Partial
            }
            None => RunOutcome::Completed,
        };

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcome,
            sources: summaries,
        })
    }

    /// Normalize, classify and sync one source's records chunk by chunk.
    ///
    /// Returns the interruption status if the deadline or cancellation hit
    /// before the last chunk; the source's summary then keeps the counts of
    /// the chunks already synced.
    async fn process_source(
        &self,
        adapter: &dyn SourceAdapter,
        records: Vec<RawRecord>,
        summary: &mut SourceSummary,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<SourceStatus>> {
        let name = adapter.name();
        let normalizer = adapter.normalizer();
        summary.fetched = records.len();

        for chunk in records.chunks(self.config.chunk_size.max(1)) {
            if let Some(status) = interruption(deadline, cancel) {
                warn!(source = %name, status = status.as_str(), "Source interrupted between chunks");
                summary.status = status;
                return Ok(Some(status));
            }

            let mut canonical: Vec<CanonicalRecord> = Vec::with_capacity(chunk.len());
            for raw in chunk {
                match normalizer.normalize(raw, name) {
                    Ok(record) => canonical.push(record),
                    Err(reason) => {
                        debug!(source = %name, %reason, "Record rejected");
                        summary.rejected += 1;
                    }
                }
            }

            let classified = classify_chunk(canonical, self.engine.store().as_ref()).await?;
            summary.skipped += classified.superseded;

            let result = self.engine.sync(classified.records).await?;
            summary.add_sync(result.counts);
        }

        summary.status = SourceStatus::Succeeded;
        info!(
            source = %name,
            fetched = summary.fetched,
            rejected = summary.rejected,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "Source processed"
        );
        Ok(None)
    }
}

struct FetchJob {
    index: usize,
    adapter: Arc<dyn SourceAdapter>,
    filters: FetchFilters,
}

type FetchOutput = (usize, Arc<dyn SourceAdapter>, Result<Vec<RawRecord>, String>);

/// Start one adapter's fetch as a task. The returned future resolves once
/// the fetch finishes; dropping it aborts the task.
fn spawn_fetch(job: FetchJob) -> BoxFuture<'static, FetchOutput> {
    let FetchJob {
        index,
        adapter,
        filters,
    } = job;
    let task = AbortOnDrop(tokio::spawn({
        let adapter = adapter.clone();
        async move { adapter.fetch_records(&filters).await }
    }));

    Box::pin(async move {
        let result = match task.await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(join_err) => Err(format!("fetch task failed: {join_err}")),
        };
        (index, adapter, result)
    })
}

/// Join handle that aborts its task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn interruption(deadline: Option<Instant>, cancel: &CancellationToken) -> Option<SourceStatus> {
    if cancel.is_cancelled() {
        return Some(SourceStatus::Cancelled);
    }
    match deadline {
        Some(d) if Instant::now() >= d => Some(SourceStatus::TimedOut),
        _ => None,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
