//! Configuration types for the pipeline and source fetches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SinkError;

/// Configuration for one orchestrated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Raw records normalized and synced per chunk.
    ///
    /// The run deadline is checked between chunks. Default: 100.
    pub chunk_size: usize,

    /// Adapters fetched at the same time. Default: 4.
    pub fetch_concurrency: usize,

    /// Overall run deadline. `None` runs to completion.
    pub run_timeout: Option<Duration>,

    /// Same-run retry policy for retriable sink failures.
    pub retry: RetryPolicy,

    /// Emergency stop file; when it exists the run halts without fetching.
    pub stop_file: Option<PathBuf>,

    /// Filters handed to every adapter.
    #[serde(default)]
    pub filters: FetchFilters,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            fetch_concurrency: 4,
            run_timeout: Some(Duration::from_secs(30 * 60)),
            retry: RetryPolicy::default(),
            stop_file: None,
            filters: FetchFilters::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency.max(1);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Disable the run deadline.
    pub fn without_run_timeout(mut self) -> Self {
        self.run_timeout = None;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stop_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stop_file = Some(path.into());
        self
    }

    pub fn with_filters(mut self, filters: FetchFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// Exponential backoff for `RateLimited` and `Transient` sink failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retry.
    pub max_retries: u32,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Delay before retry number `attempt` (0-based), or `None` when the
    /// error is not retriable or retries are exhausted.
    ///
    /// A server-provided `retry_after` wins over the computed backoff; both
    /// are capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32, err: &SinkError) -> Option<Duration> {
        if !err.is_retriable() || attempt >= self.max_retries {
            return None;
        }

        let computed = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt));
        let delay = err.retry_after().unwrap_or(computed);
        Some(delay.min(self.max_backoff))
    }
}

/// Filters passed to [`crate::traits::source::SourceAdapter::fetch_records`].
///
/// Adapters ignore filters they do not understand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchFilters {
    /// Category to fetch (e.g. `xiaozhao`, `shixi`). `None` = adapter default.
    pub category: Option<String>,

    pub start_page: u32,

    pub max_pages: u32,

    /// Cap on records returned. `None` = no cap.
    pub limit: Option<usize>,

    /// Adapter-specific options.
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl Default for FetchFilters {
    fn default() -> Self {
        Self {
            category: None,
            start_page: 1,
            max_pages: 5,
            limit: None,
            options: Map::new(),
        }
    }
}

impl FetchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_pages(mut self, start_page: u32, max_pages: u32) -> Self {
        self.start_page = start_page.max(1);
        self.max_pages = max_pages;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Read a string option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }
}
