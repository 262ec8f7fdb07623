//! Run summary types - what one orchestrated run did, per source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use uuid::Uuid;

/// How far a source got during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Fetched and fully processed
    Succeeded,
    /// Adapter raised a fetch error; nothing from it was processed
    FetchFailed,
    /// Run deadline hit before this source finished
    TimedOut,
    /// Run was cancelled before this source finished
    Cancelled,
    /// Never started (emergency stop)
    NotRun,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Succeeded => "succeeded",
            SourceStatus::FetchFailed => "fetch_failed",
            SourceStatus::TimedOut => "timed_out",
            SourceStatus::Cancelled => "cancelled",
            SourceStatus::NotRun => "not_run",
        }
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every source was attempted to the end (some may have failed to fetch)
    Completed,
    /// Deadline or cancellation cut the run short
    Partial,
    /// Emergency stop file present; nothing fetched
    Halted,
}

/// Sync counters, shared by per-source summaries and sync results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncCounts {
    /// Records that reached the sink successfully.
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

impl AddAssign for SyncCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

/// Counts for one source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    /// Adapter name
    pub source: String,

    pub status: SourceStatus,

    /// Raw records returned by the adapter
    pub fetched: usize,

    /// Raw records that failed normalization
    pub rejected: usize,

    pub inserted: usize,

    pub updated: usize,

    /// Unchanged since last sync, or superseded within the same chunk
    pub skipped: usize,

    /// Sink writes that failed; these keys stay unsynced
    pub failed: usize,

    /// Fetch error message when `status` is `FetchFailed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceSummary {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            status: SourceStatus::NotRun,
            fetched: 0,
            rejected: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            error: None,
        }
    }

    pub fn fetch_failed(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: SourceStatus::FetchFailed,
            error: Some(error.into()),
            ..Self::new(source)
        }
    }

    /// Fold sync counters from one chunk into this summary.
    pub fn add_sync(&mut self, counts: SyncCounts) {
        self.inserted += counts.inserted;
        self.updated += counts.updated;
        self.skipped += counts.skipped;
        self.failed += counts.failed;
    }

    pub fn sync_counts(&self) -> SyncCounts {
        SyncCounts {
            inserted: self.inserted,
            updated: self.updated,
            skipped: self.skipped,
            failed: self.failed,
        }
    }
}

/// Totals across all sources of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub fetched: usize,
    pub rejected: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunTotals {
    /// Records confirmed by the sink.
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Result of one orchestrator invocation.
///
/// Produced once per run and handed to the caller; the pipeline keeps only
/// the latest copy, in its status handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    pub outcome: RunOutcome,

    /// One entry per registered source, in registration order
    pub sources: Vec<SourceSummary>,
}

impl RunSummary {
    pub fn totals(&self) -> RunTotals {
        self.sources
            .iter()
            .fold(RunTotals::default(), |mut totals, s| {
                totals.fetched += s.fetched;
                totals.rejected += s.rejected;
                totals.inserted += s.inserted;
                totals.updated += s.updated;
                totals.skipped += s.skipped;
                totals.failed += s.failed;
                totals
            })
    }

    pub fn sources_succeeded(&self) -> usize {
        self.count_status(SourceStatus::Succeeded)
    }

    pub fn sources_failed(&self) -> usize {
        self.count_status(SourceStatus::FetchFailed)
    }

    /// Look up a source's summary by adapter name.
    pub fn source(&self, name: &str) -> Option<&SourceSummary> {
        self.sources.iter().find(|s| s.source == name)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    fn count_status(&self, status: SourceStatus) -> usize {
        self.sources.iter().filter(|s| s.status == status).count()
    }
}
