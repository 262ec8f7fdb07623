//! Testing utilities including mock implementations.
//!
//! These let applications exercise the pipeline without a real site, sink,
//! or database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{FetchError, FetchResult, SinkError, SinkResult, StateStoreError, StoreResult};
use crate::traits::{
    sink::{Sink, SinkWrite, WriteOutcome, WriteReceipt},
    source::SourceAdapter,
    store::{SeenEntry, StateStore},
};
use crate::types::{
    config::FetchFilters,
    record::{IdentityKey, RawRecord},
};

/// A scripted source adapter.
///
/// Returns a fixed list of raw records, or a scripted error, optionally
/// after a delay.
pub struct MockSource {
    name: String,
    records: Vec<RawRecord>,
    error: Option<String>,
    delay: Option<Duration>,
    panics: bool,
    fetches: Arc<RwLock<usize>>,
}

impl MockSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            error: None,
            delay: None,
            panics: false,
            fetches: Arc::new(RwLock::new(0)),
        }
    }

    /// Add one raw record.
    pub fn with_record(mut self, record: RawRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Add raw records.
    pub fn with_records(mut self, records: impl IntoIterator<Item = RawRecord>) -> Self {
        self.records.extend(records);
        self
    }

    /// Make every fetch fail with a parse error carrying `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every fetch panic.
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Number of completed fetches.
    pub fn fetch_count(&self) -> usize {
        *self.fetches.read().unwrap()
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_records(&self, filters: &FetchFilters) -> FetchResult<Vec<RawRecord>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        *self.fetches.write().unwrap() += 1;

        if self.panics {
            panic!("mock source '{}' panicked", self.name);
        }
        if let Some(message) = &self.error {
            return Err(FetchError::Parse(message.clone()));
        }
        let limit = filters.limit.unwrap_or(usize::MAX);
        Ok(self.records.iter().take(limit).cloned().collect())
    }
}

/// Scripted failure for one identity key.
#[derive(Debug, Clone)]
struct ScriptedFailure {
    error: SinkError,
    /// Remaining failures; `None` fails forever
    remaining: Option<usize>,
}

/// A mock sink that records what it is asked to write.
///
/// Every write succeeds with a fresh `rec-N` id unless a failure was
/// scripted for the record's key.
pub struct MockSink {
    name: String,
    max_batch_size: usize,
    all_or_nothing: bool,
    failures: Arc<RwLock<HashMap<IdentityKey, ScriptedFailure>>>,
    calls: Arc<RwLock<Vec<Vec<SinkWrite>>>>,
    writes: Arc<RwLock<Vec<SinkWrite>>>,
    next_id: Arc<RwLock<usize>>,
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            max_batch_size: 100,
            all_or_nothing: false,
            failures: Arc::default(),
            calls: Arc::default(),
            writes: Arc::default(),
            next_id: Arc::default(),
        }
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Fail a whole multi-record call when any record in it fails, like a
    /// sink that validates the batch before writing anything.
    pub fn with_all_or_nothing_batches(mut self) -> Self {
        self.all_or_nothing = true;
        self
    }

    /// Fail every write of `key`.
    pub fn fail_key(&self, key: &IdentityKey, error: SinkError) {
        self.failures.write().unwrap().insert(
            key.clone(),
            ScriptedFailure {
                error,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` writes of `key`, then succeed.
    pub fn fail_key_times(&self, key: &IdentityKey, error: SinkError, times: usize) {
        self.failures.write().unwrap().insert(
            key.clone(),
            ScriptedFailure {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Remove any scripted failure for `key`.
    pub fn heal_key(&self, key: &IdentityKey) {
        self.failures.write().unwrap().remove(key);
    }

    /// Number of `write` calls received.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Every batch received, in call order.
    pub fn calls(&self) -> Vec<Vec<SinkWrite>> {
        self.calls.read().unwrap().clone()
    }

    /// Writes that succeeded, in order.
    pub fn writes(&self) -> Vec<SinkWrite> {
        self.writes.read().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.write().unwrap().clear();
        self.writes.write().unwrap().clear();
    }

    /// Scripted error for `key`, consuming one use of a counted failure.
    fn take_failure(&self, key: &IdentityKey, consume: bool) -> Option<SinkError> {
        let mut failures = self.failures.write().unwrap();
        let failure = failures.get_mut(key)?;
        let error = failure.error.clone();
        if consume {
            if let Some(remaining) = failure.remaining.as_mut() {
                *remaining -= 1;
                if *remaining == 0 {
                    failures.remove(key);
                }
            }
        }
        Some(error)
    }

    fn accept(&self, write: &SinkWrite) -> WriteReceipt {
        let remote_id = match &write.remote_id {
            Some(id) => id.clone(),
            None => {
                let mut next = self.next_id.write().unwrap();
                *next += 1;
                format!("rec-{}", *next)
            }
        };
        self.writes.write().unwrap().push(write.clone());
        WriteReceipt::new(remote_id)
    }
}

#[async_trait]
impl Sink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn write(&self, batch: &[SinkWrite]) -> SinkResult<Vec<WriteOutcome>> {
        self.calls.write().unwrap().push(batch.to_vec());

        if self.all_or_nothing {
            // A rejected batch consumes one scripted failure per failing key.
            let errors: Vec<SinkError> = batch
                .iter()
                .filter_map(|w| self.take_failure(&w.key, true))
                .collect();
            if let Some(error) = errors.into_iter().next() {
                return Err(error);
            }
            return Ok(batch.iter().map(|w| Ok(self.accept(w))).collect());
        }

        Ok(batch
            .iter()
            .map(|w| match self.take_failure(&w.key, true) {
                Some(error) => Err(error),
                None => Ok(self.accept(w)),
            })
            .collect())
    }
}

/// A state store that is never reachable.
#[derive(Debug, Default, Clone)]
pub struct UnavailableStore;

impl UnavailableStore {
    fn error<T>() -> StoreResult<T> {
        Err(StateStoreError::Unavailable(
            "connection refused".to_string(),
        ))
    }
}

#[async_trait]
impl StateStore for UnavailableStore {
    async fn get(&self, _key: &IdentityKey) -> StoreResult<Option<SeenEntry>> {
        Self::error()
    }

    async fn put(
        &self,
        _key: &IdentityKey,
        _snapshot_hash: &str,
        _at: DateTime<Utc>,
        _remote_id: Option<&str>,
    ) -> StoreResult<SeenEntry> {
        Self::error()
    }

    async fn all_keys(&self) -> StoreResult<HashSet<IdentityKey>> {
        Self::error()
    }

    async fn entries(&self) -> StoreResult<Vec<SeenEntry>> {
        Self::error()
    }

    async fn restore(&self, _entries: &[SeenEntry]) -> StoreResult<usize> {
        Self::error()
    }

    async fn len(&self) -> StoreResult<usize> {
        Self::error()
    }

    async fn ping(&self) -> StoreResult<()> {
        Self::error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::{CanonicalRecord, SyncDecision};

    fn write(company: &str) -> SinkWrite {
        let record = CanonicalRecord::new(company, "Engineer", "test");
        SinkWrite {
            key: crate::pipeline::identity::identify(&record),
            record,
            decision: SyncDecision::Insert,
            remote_id: None,
        }
    }

    #[tokio::test]
    async fn test_counted_failure_heals() {
        let sink = MockSink::new();
        let w = write("a");
        sink.fail_key_times(&w.key, SinkError::Transient("blip".into()), 1);

        let first = sink.write(std::slice::from_ref(&w)).await.unwrap();
        assert!(first[0].is_err());
        let second = sink.write(std::slice::from_ref(&w)).await.unwrap();
        assert_eq!(second[0].as_ref().unwrap().remote_id.as_deref(), Some("rec-1"));
        assert_eq!(sink.call_count(), 2);
    }

    #[tokio::test]
    async fn test_all_or_nothing_rejects_whole_batch() {
        let sink = MockSink::new().with_all_or_nothing_batches();
        let (a, b) = (write("a"), write("b"));
        sink.fail_key(&b.key, SinkError::SchemaMismatch("bad".into()));

        assert!(sink.write(&[a.clone(), b]).await.is_err());
        assert!(sink.writes().is_empty());
        assert!(sink.write(&[a]).await.is_ok());
        assert_eq!(sink.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_source_failure() {
        let source = MockSource::new("broken").failing("boom");
        assert!(source.fetch_records(&FetchFilters::new()).await.is_err());
        assert_eq!(source.fetch_count(), 1);
    }
}
