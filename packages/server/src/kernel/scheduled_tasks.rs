//! Scheduled pipeline runs using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler (SCHEDULE_CRON, default every 3 hours from 06:00)
//!     │
//!     └─► run_scheduled()
//!             ├─► previous run still going? skip this tick
//!             └─► Orchestrator::run_until_cancelled(registry)
//! ```

use anyhow::{Context, Result};
use jobsync::RunSummary;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::kernel::deps::PipelineDeps;

/// Start the cron job that runs the pipeline.
pub async fn start_scheduler(
    deps: PipelineDeps,
    cron: &str,
    cancel: CancellationToken,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let deps = deps.clone();
        let cancel = cancel.clone();
        Box::pin(async move {
            run_scheduled(&deps, &cancel).await;
        })
    })
    .with_context(|| format!("Invalid schedule {cron:?}"))?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(cron, "Scheduled runs started");
    Ok(scheduler)
}

/// One scheduled run. Returns `None` when the tick was skipped or the run
/// aborted; failures are logged, never propagated to the scheduler.
pub async fn run_scheduled(deps: &PipelineDeps, cancel: &CancellationToken) -> Option<RunSummary> {
    if cancel.is_cancelled() {
        return None;
    }

    match deps
        .orchestrator
        .try_run_until_cancelled(&deps.registry, cancel)
        .await
    {
        Some(Ok(summary)) => Some(summary),
        Some(Err(e)) => {
            tracing::error!("Scheduled run failed: {}", e);
            None
        }
        None => {
            tracing::warn!("Previous run still in progress, skipping this tick");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use jobsync::testing::{MockSink, MockSource, UnavailableStore};
    use jobsync::{MemoryStateStore, RawRecord, RunOutcome, SourceRegistry};
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> Config {
        Config::from_lookup(|key| (key == "ENABLED_SOURCES").then(|| "demo".to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_scheduled_run_syncs() {
        let sink = Arc::new(MockSink::new());
        let deps =
            PipelineDeps::build(&config(), sink.clone(), Arc::new(MemoryStateStore::new()))
                .unwrap();

        let summary = run_scheduled(&deps, &CancellationToken::new()).await.unwrap();
        assert!(summary.totals().inserted > 0);
        assert!(sink.call_count() > 0);

        // Second tick sees nothing new
        let summary = run_scheduled(&deps, &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.totals().written(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_tick_is_skipped() {
        let sink = Arc::new(MockSink::new());
        let deps =
            PipelineDeps::build(&config(), sink.clone(), Arc::new(MemoryStateStore::new()))
                .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(run_scheduled(&deps, &cancel).await.is_none());
        assert_eq!(deps.status.snapshot().await.runs_started, 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_logged_not_propagated() {
        let sink = Arc::new(MockSink::new());
        let deps = PipelineDeps::build(&config(), sink.clone(), Arc::new(UnavailableStore))
            .unwrap();

        assert!(run_scheduled(&deps, &CancellationToken::new()).await.is_none());
        assert!(!deps.status.snapshot().await.is_healthy());
        assert_eq!(sink.call_count(), 0);
    }

    #[tokio::test]
    async fn test_scheduled_run_in_spawned_task() {
        let deps = PipelineDeps::build(
            &config(),
            Arc::new(MockSink::new()),
            Arc::new(MemoryStateStore::new()),
        )
        .unwrap();

        let handle = tokio::spawn({
            let deps = deps.clone();
            async move { run_scheduled(&deps, &CancellationToken::new()).await }
        });

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_tick_skipped_while_run_in_progress() {
        let mut deps = PipelineDeps::build(
            &config(),
            Arc::new(MockSink::new()),
            Arc::new(MemoryStateStore::new()),
        )
        .unwrap();
        let slow = MockSource::new("slow")
            .with_record(
                RawRecord::new(chrono::Utc::now())
                    .with_field("company", "Acme")
                    .with_field("position", "Analyst"),
            )
            .with_delay(Duration::from_millis(300));
        deps.registry = Arc::new(SourceRegistry::new().with(slow).unwrap());

        let first = tokio::spawn({
            let deps = deps.clone();
            async move { run_scheduled(&deps, &CancellationToken::new()).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(run_scheduled(&deps, &CancellationToken::new()).await.is_none());

        let summary = first.await.unwrap().unwrap();
        assert_eq!(summary.totals().inserted, 1);
        assert_eq!(deps.status.snapshot().await.runs_started, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_starts_and_shuts_down() {
        let deps = PipelineDeps::build(
            &config(),
            Arc::new(MockSink::new()),
            Arc::new(MemoryStateStore::new()),
        )
        .unwrap();

        let mut scheduler = start_scheduler(deps, "0 0 6 * * *", CancellationToken::new())
            .await
            .unwrap();
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_rejects_bad_cron() {
        let deps = PipelineDeps::build(
            &config(),
            Arc::new(MockSink::new()),
            Arc::new(MemoryStateStore::new()),
        )
        .unwrap();

        let err = start_scheduler(deps, "whenever", CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("Invalid schedule"));
    }
}
