//! Typed errors for the ingestion pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Each error type maps to
//! one isolation level:
//!
//! - [`RejectionReason`] - one bad input record, counted and skipped
//! - [`FetchError`] - one source adapter, isolated by the orchestrator
//! - [`SinkError`] - one write, isolated by the sync engine
//! - [`StateStoreError`] - fatal, aborts the run

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a raw record could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    /// A required field was absent or blank after trimming
    #[error("missing required field: {field}")]
    MissingRequiredField { field: &'static str },
}

/// Errors raised by a source adapter while fetching.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Server answered with a non-success status
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Response or file could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Local file access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Adapter was asked for something it does not support
    #[error("invalid source configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(Box::new(err))
    }
}

/// Category of a sink failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkErrorKind {
    RateLimited,
    AuthFailure,
    SchemaMismatch,
    Transient,
}

/// Errors returned by a sink write.
///
/// Only [`SinkError::RateLimited`] and [`SinkError::Transient`] are eligible
/// for same-run retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Sink asked us to slow down
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Credentials rejected or expired
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Sink rejected the record shape (unknown column, bad value)
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Network blip or server-side failure
    #[error("transient failure: {0}")]
    Transient(String),
}

impl SinkError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        SinkError::RateLimited {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn kind(&self) -> SinkErrorKind {
        match self {
            SinkError::RateLimited { .. } => SinkErrorKind::RateLimited,
            SinkError::AuthFailure(_) => SinkErrorKind::AuthFailure,
            SinkError::SchemaMismatch(_) => SinkErrorKind::SchemaMismatch,
            SinkError::Transient(_) => SinkErrorKind::Transient,
        }
    }

    /// Whether the same write may be attempted again within this run.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SinkError::RateLimited { .. } | SinkError::Transient(_)
        )
    }

    /// Server-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SinkError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors from the local state store. Always fatal for the current run.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// Store could not be reached or opened
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    /// Backend driver error
    #[error("state store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A persisted entry could not be decoded
    #[error("corrupt state entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Snapshot file could not be read or written
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StateStoreError {
    pub(crate) fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StateStoreError::Backend(Box::new(err))
    }
}

impl From<sqlx::Error> for StateStoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StateStoreError::Unavailable(err.to_string())
            }
            other => StateStoreError::backend(other),
        }
    }
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Result type alias for state store operations.
pub type StoreResult<T> = std::result::Result<T, StateStoreError>;
