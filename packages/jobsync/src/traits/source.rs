//! Source adapter trait for pluggable job-posting producers.
//!
//! Each adapter knows one website (or file format) and returns opaque
//! [`RawRecord`]s. Only the adapter's own [`Normalizer`] interprets them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use jobsync::{FetchFilters, SourceAdapter};
//!
//! let records = adapter.fetch_records(&FetchFilters::new().with_limit(50)).await?;
//! for raw in &records {
//!     let canonical = adapter.normalizer().normalize(raw, adapter.name());
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::FetchResult;
use crate::pipeline::normalize::{Normalizer, StandardNormalizer};
use crate::types::{config::FetchFilters, record::RawRecord};

static DEFAULT_NORMALIZER: StandardNormalizer = StandardNormalizer::new();

/// A producer of raw job-posting records.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable adapter name; recorded as `source_name` on every record.
    fn name(&self) -> &str;

    /// Fetch raw records.
    ///
    /// An empty vector is a valid result. Errors are isolated to this
    /// source by the orchestrator.
    async fn fetch_records(&self, filters: &FetchFilters) -> FetchResult<Vec<RawRecord>>;

    /// Normalizer for this adapter's raw field layout.
    fn normalizer(&self) -> &dyn Normalizer {
        &DEFAULT_NORMALIZER
    }
}

#[async_trait]
impl<T: SourceAdapter + ?Sized> SourceAdapter for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch_records(&self, filters: &FetchFilters) -> FetchResult<Vec<RawRecord>> {
        (**self).fetch_records(filters).await
    }

    fn normalizer(&self) -> &dyn Normalizer {
        (**self).normalizer()
    }
}
