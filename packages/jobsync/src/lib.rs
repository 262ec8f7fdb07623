//! Job-Posting Ingestion Library
//!
//! Collects campus-recruitment postings from independent sources, normalizes
//! them into one canonical record shape, drops what was already synced, and
//! writes only new or changed postings to a tabular sink.
//!
//! # Pipeline
//!
//! ```text
//! SourceAdapter ──► Normalizer ──► identify/classify ──► SyncEngine ──► Sink
//!                                        │                    │
//!                                        └──── StateStore ◄───┘
//! ```
//!
//! A posting is identified by (company, position, publish date) after
//! normalization. The state store remembers a hash of everything else, so a
//! later fetch of the same posting becomes an `Update` only when something
//! actually changed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use jobsync::{Orchestrator, PipelineConfig, SourceRegistry, SqliteStateStore};
//! use jobsync::sources::DemoSource;
//! use jobsync::testing::MockSink;
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStateStore::open("sqlite://data/cache.db").await?);
//! let registry = SourceRegistry::new().with(DemoSource::new())?;
//! let orchestrator = Orchestrator::new(Arc::new(MockSink::new()), store, PipelineConfig::default());
//!
//! let summary = orchestrator.run(&registry).await?;
//! println!("{} inserted", summary.totals().inserted);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams: `SourceAdapter`, `Sink`, `StateStore`
//! - [`types`] - Records, configuration, run summaries
//! - [`pipeline`] - Normalizer, identity engine, sync engine, orchestrator
//! - [`sources`] - Built-in adapters and the source registry
//! - [`sinks`] - Feishu Bitable sink (feature `feishu`)
//! - [`stores`] - In-memory and SQLite state stores, JSON snapshots
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    FetchError, FetchResult, RejectionReason, SinkError, SinkErrorKind, SinkResult,
    StateStoreError, StoreResult,
};
pub use traits::{
    sink::{Sink, SinkWrite, WriteOutcome, WriteReceipt},
    source::SourceAdapter,
    store::{SeenEntry, StateStore},
};
pub use types::{
    config::{FetchFilters, PipelineConfig, RetryPolicy},
    record::{CanonicalRecord, IdentityKey, RawRecord, SyncDecision},
    summary::{RunOutcome, RunSummary, RunTotals, SourceStatus, SourceSummary, SyncCounts},
};

// Re-export pipeline components
pub use pipeline::{
    identity::{classify, classify_chunk, decide, identify, snapshot_hash, Classified},
    normalize::{Normalizer, StandardNormalizer},
    orchestrator::Orchestrator,
    status::{RunStatus, StatusHandle},
    sync::{RecordOutcome, RecordResult, SyncEngine, SyncResult},
};

// Re-export stores
pub use stores::{MemoryStateStore, SqliteStateStore, StateSnapshot};

// Re-export sources
pub use sources::{SourceRegistry, SourceSettings};

#[cfg(feature = "feishu")]
pub use sinks::{BitableSink, FieldMapping};
