//! Sync engine: issue the minimal set of sink writes and record the
//! confirmed ones in the state store.
//!
//! # Batching
//!
//! Records needing a write are grouped into runs of the same decision kind
//! (in input order), each no larger than the sink's batch limit. A batch
//! that fails as a whole is retried per the [`RetryPolicy`] and then split
//! into one-by-one writes, so a single bad record only fails itself.
//!
//! # State updates
//!
//! The store is written only after the sink confirms a record. A failed
//! write leaves the stored snapshot untouched, so the next run sees the
//! same decision again.

use chrono::Utc;
use serde::Serialize;
use std::slice;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{SinkError, StoreResult};
use crate::pipeline::identity::Classified;
use crate::traits::sink::{Sink, SinkWrite, WriteOutcome};
use crate::traits::store::StateStore;
use crate::types::config::RetryPolicy;
use crate::types::record::{IdentityKey, SyncDecision};
use crate::types::summary::SyncCounts;

/// Final state of one record after a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Inserted { remote_id: Option<String> },
    Updated { remote_id: Option<String> },
    Skipped,
    Failed { error: SinkErrorView },
}

/// Serializable view of a [`SinkError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkErrorView {
    pub kind: crate::error::SinkErrorKind,
    pub message: String,
}

impl From<&SinkError> for SinkErrorView {
    fn from(err: &SinkError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordResult {
    pub key: IdentityKey,
    pub decision: SyncDecision,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

/// Per-record outcomes (input order) plus counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub records: Vec<RecordResult>,
    pub counts: SyncCounts,
    /// Sink calls issued, retries included
    pub sink_calls: usize,
}

impl SyncResult {
    pub fn failed_keys(&self) -> impl Iterator<Item = &IdentityKey> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, RecordOutcome::Failed { .. }))
            .map(|r| &r.key)
    }
}

/// Writes classified records to a sink and tracks them in a state store.
#[derive(Clone)]
pub struct SyncEngine {
    sink: Arc<dyn Sink>,
    store: Arc<dyn StateStore>,
    retry: RetryPolicy,
}

impl SyncEngine {
    pub fn new(sink: Arc<dyn Sink>, store: Arc<dyn StateStore>) -> Self {
        Self {
            sink,
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    /// Sync a sequence of classified records.
    ///
    /// Sink failures are isolated per record and reported in the result.
    /// Only a state store failure returns `Err`, and it aborts immediately.
    pub async fn sync(&self, items: Vec<Classified>) -> StoreResult<SyncResult> {
        let mut result = SyncResult::default();
        let mut outcomes: Vec<Option<RecordResult>> = Vec::with_capacity(items.len());
        let mut pending: Vec<PendingWrite> = Vec::new();

        for (index, item) in items.into_iter().enumerate() {
            if item.decision.needs_write() {
                outcomes.push(None);
                pending.push(PendingWrite {
                    index,
                    snapshot_hash: item.snapshot_hash,
                    write: SinkWrite {
                        key: item.key,
                        record: item.record,
                        decision: item.decision,
                        remote_id: item.remote_id,
                    },
                });
            } else {
                outcomes.push(Some(RecordResult {
                    key: item.key,
                    decision: SyncDecision::Skip,
                    outcome: RecordOutcome::Skipped,
                }));
            }
        }

        for batch in plan_batches(&pending, self.sink.max_batch_size().max(1)) {
            let batch = &pending[batch];
            let writes: Vec<SinkWrite> = batch.iter().map(|p| p.write.clone()).collect();
            let write_outcomes = self.write_batch(&writes, &mut result.sink_calls).await;

            let synced_at = Utc::now();
            for (item, outcome) in batch.iter().zip(write_outcomes) {
                let write = &item.write;
                let record_outcome = match outcome {
                    Ok(receipt) => {
                        let remote_id = receipt.remote_id.or_else(|| write.remote_id.clone());
                        self.store
                            .put(&write.key, &item.snapshot_hash, synced_at, remote_id.as_deref())
                            .await?;
                        match write.decision {
                            SyncDecision::Update => RecordOutcome::Updated { remote_id },
                            _ => RecordOutcome::Inserted { remote_id },
                        }
                    }
                    Err(err) => {
                        warn!(
                            key = %write.key.short(),
                            company = %write.record.company,
                            position = %write.record.position,
                            decision = %write.decision,
                            error = %err,
                            "Sink write failed; record left unsynced"
                        );
                        RecordOutcome::Failed {
                            error: SinkErrorView::from(&err),
                        }
                    }
                };
                outcomes[item.index] = Some(RecordResult {
                    key: write.key.clone(),
                    decision: write.decision,
                    outcome: record_outcome,
                });
            }
        }

        for record in outcomes.into_iter().flatten() {
            match record.outcome {
                RecordOutcome::Inserted { .. } => result.counts.inserted += 1,
                RecordOutcome::Updated { .. } => result.counts.updated += 1,
                RecordOutcome::Skipped => result.counts.skipped += 1,
                RecordOutcome::Failed { .. } => result.counts.failed += 1,
            }
            result.records.push(record);
        }

        debug!(
            sink = %self.sink.name(),
            inserted = result.counts.inserted,
            updated = result.counts.updated,
            skipped = result.counts.skipped,
            failed = result.counts.failed,
            sink_calls = result.sink_calls,
            "Sync finished"
        );

        Ok(result)
    }

    /// Write one batch, returning exactly one outcome per input.
    async fn write_batch(&self, writes: &[SinkWrite], calls: &mut usize) -> Vec<WriteOutcome> {
        if writes.len() == 1 {
            return vec![self.write_one(&writes[0], calls).await];
        }

        match self.call_with_retry(writes, calls).await {
            Ok(outcomes) if outcomes.len() == writes.len() => {
                let mut resolved = Vec::with_capacity(outcomes.len());
                for (write, outcome) in writes.iter().zip(outcomes) {
                    match outcome {
                        Err(err) if err.is_retriable() => {
                            debug!(key = %write.key.short(), error = %err, "Retrying record individually");
                            resolved.push(self.write_one(write, calls).await);
                        }
                        other => resolved.push(other),
                    }
                }
                resolved
            }
            Ok(outcomes) => {
                warn!(
                    sink = %self.sink.name(),
                    expected = writes.len(),
                    got = outcomes.len(),
                    "Sink returned wrong number of outcomes; falling back to one-by-one"
                );
                self.write_each(writes, calls).await
            }
            Err(err) => {
                warn!(
                    sink = %self.sink.name(),
                    batch_size = writes.len(),
                    error = %err,
                    "Batch write failed; falling back to one-by-one"
                );
                self.write_each(writes, calls).await
            }
        }
    }

    async fn write_each(&self, writes: &[SinkWrite], calls: &mut usize) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::with_capacity(writes.len());
        for write in writes {
            outcomes.push(self.write_one(write, calls).await);
        }
        outcomes
    }

    /// Write a single record, retrying retriable failures.
    async fn write_one(&self, write: &SinkWrite, calls: &mut usize) -> WriteOutcome {
        let mut attempt = 0;
        loop {
            *calls += 1;
            let outcome = match self.sink.write(slice::from_ref(write)).await {
                Ok(outcomes) => single_outcome(outcomes),
                Err(err) => Err(err),
            };
            let err = match outcome {
                Ok(receipt) => return Ok(receipt),
                Err(err) => err,
            };
            match self.retry.backoff_for(attempt, &err) {
                Some(delay) => {
                    debug!(key = %write.key.short(), attempt, ?delay, error = %err, "Retrying sink write");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(err),
            }
        }
    }

    /// Issue one sink call, retrying whole-call retriable failures.
    async fn call_with_retry(
        &self,
        writes: &[SinkWrite],
        calls: &mut usize,
    ) -> Result<Vec<WriteOutcome>, SinkError> {
        let mut attempt = 0;
        loop {
            *calls += 1;
            match self.sink.write(writes).await {
                Ok(outcomes) => return Ok(outcomes),
                Err(err) => match self.retry.backoff_for(attempt, &err) {
                    Some(delay) => {
                        debug!(batch_size = writes.len(), attempt, ?delay, error = %err, "Retrying sink batch");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}

struct PendingWrite {
    index: usize,
    snapshot_hash: String,
    write: SinkWrite,
}

fn single_outcome(outcomes: Vec<WriteOutcome>) -> WriteOutcome {
    let got = outcomes.len();
    let mut iter = outcomes.into_iter();
    match (iter.next(), got) {
        (Some(outcome), 1) => outcome,
        _ => Err(SinkError::Transient(format!(
            "sink returned {got} outcomes for a single write"
        ))),
    }
}

/// Split pending writes into ranges of the same decision, at most `max` long.
fn plan_batches(pending: &[PendingWrite], max: usize) -> Vec<std::ops::Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    for i in 1..=pending.len() {
        let boundary = i == pending.len()
            || i - start == max
            || pending[i].write.decision != pending[start].write.decision;
        if boundary {
            batches.push(start..i);
            start = i;
        }
    }
    batches
}
