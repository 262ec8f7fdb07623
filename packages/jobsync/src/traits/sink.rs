//! Sink trait - the downstream table that receives inserts and updates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{SinkError, SinkResult};
use crate::types::record::{CanonicalRecord, IdentityKey, SyncDecision};

/// One write handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkWrite {
    pub key: IdentityKey,

    pub record: CanonicalRecord,

    /// `Insert` or `Update`; the engine never sends `Skip`
    pub decision: SyncDecision,

    /// Sink row id from the original insert, when known
    pub remote_id: Option<String>,
}

/// Confirmation of a successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Row id assigned or confirmed by the sink
    pub remote_id: Option<String>,
}

impl WriteReceipt {
    pub fn new(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
        }
    }
}

/// Per-record result of a sink call.
pub type WriteOutcome = Result<WriteReceipt, SinkError>;

/// A downstream table with a batch write contract.
///
/// `write` returns `Err` when the call as a whole failed (nothing is known
/// to be written). Otherwise it returns exactly one outcome per input, in
/// input order. A result of the wrong length is treated as a whole-call
/// failure by the sync engine.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Largest batch a single `write` call accepts. At least 1.
    fn max_batch_size(&self) -> usize;

    async fn write(&self, batch: &[SinkWrite]) -> SinkResult<Vec<WriteOutcome>>;
}

#[async_trait]
impl<T: Sink + ?Sized> Sink for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }

    async fn write(&self, batch: &[SinkWrite]) -> SinkResult<Vec<WriteOutcome>> {
        (**self).write(batch).await
    }
}
