//! Identity engine: dedup keys and Insert/Update/Skip classification.
//!
//! The identity key covers (company, position, publish_date) in comparison
//! form. The snapshot hash covers every other sync-relevant field. Both are
//! SHA-256 over length-prefixed fields, so no two distinct inputs share an
//! encoding.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::StoreResult;
use crate::traits::store::{SeenEntry, StateStore};
use crate::types::record::{CanonicalRecord, IdentityKey, SyncDecision};

/// Stands in for a missing publish date. Never a valid `%Y-%m-%d` string.
pub const UNDATED_SENTINEL: &str = "undated";

/// Compute the identity key of a record.
pub fn identify(record: &CanonicalRecord) -> IdentityKey {
    let date = record
        .publish_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| UNDATED_SENTINEL.to_string());

    let mut fp = Fingerprint::new("identity/v1");
    fp.text(&record.company_key());
    fp.text(&record.position_key());
    fp.text(&date);
    IdentityKey::from_stored(fp.finish())
}

/// Hash of the non-identity fields.
///
/// `source_name` and the display forms of company/position are excluded: a
/// posting re-listed by another source or re-cased is not a content change.
pub fn snapshot_hash(record: &CanonicalRecord) -> String {
    let mut fp = Fingerprint::new("snapshot/v1");
    fp.opt(record.deadline.map(|d| d.format("%Y-%m-%d").to_string()).as_deref());
    fp.text(&record.source_url);
    fp.opt(record.batch.as_deref());
    fp.opt(record.industry.as_deref());
    fp.opt(record.company_type.as_deref());
    fp.opt(record.education.as_deref());
    fp.set(record.cities.iter());
    fp.set(record.targets.iter());
    fp.text(if record.no_written_test { "1" } else { "0" });
    fp.opt(record.referral_code.as_deref());
    fp.finish()
}

/// Decide what to do given the stored entry (if any) and the fresh hash.
pub fn decide(existing: Option<&SeenEntry>, snapshot_hash: &str) -> SyncDecision {
    match existing {
        None => SyncDecision::Insert,
        Some(entry) if entry.field_snapshot_hash != snapshot_hash => SyncDecision::Update,
        Some(_) => SyncDecision::Skip,
    }
}

/// Classify one record against the store.
pub async fn classify<S: StateStore + ?Sized>(
    record: &CanonicalRecord,
    key: &IdentityKey,
    store: &S,
) -> StoreResult<SyncDecision> {
    let existing = store.get(key).await?;
    Ok(decide(existing.as_ref(), &snapshot_hash(record)))
}

/// A record with everything the sync engine needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub key: IdentityKey,
    pub record: CanonicalRecord,
    pub decision: SyncDecision,
    pub snapshot_hash: String,
    /// Sink row id from the stored entry
    pub remote_id: Option<String>,
}

/// Result of classifying one chunk.
#[derive(Debug, Default)]
pub struct ClassifiedChunk {
    pub records: Vec<Classified>,
    /// Earlier duplicates of a key within the chunk, dropped in favour of
    /// the later record
    pub superseded: usize,
}

/// Identify and classify a chunk of records.
///
/// Records sharing a key inside the chunk collapse to the last one, which
/// keeps its position. The store is read once for the whole chunk.
pub async fn classify_chunk<S: StateStore + ?Sized>(
    records: Vec<CanonicalRecord>,
    store: &S,
) -> StoreResult<ClassifiedChunk> {
    let keyed: Vec<(IdentityKey, CanonicalRecord)> =
        records.into_iter().map(|r| (identify(&r), r)).collect();

    let mut last_index: HashMap<&IdentityKey, usize> = HashMap::with_capacity(keyed.len());
    for (i, (key, _)) in keyed.iter().enumerate() {
        last_index.insert(key, i);
    }
    let keep: Vec<bool> = keyed
        .iter()
        .enumerate()
        .map(|(i, (key, _))| last_index.get(key) == Some(&i))
        .collect();
    drop(last_index);

    let superseded = keep.iter().filter(|k| !**k).count();
    let survivors: Vec<(IdentityKey, CanonicalRecord)> = keyed
        .into_iter()
        .zip(keep)
        .filter_map(|(pair, keep)| keep.then_some(pair))
        .collect();

    let keys: Vec<IdentityKey> = survivors.iter().map(|(k, _)| k.clone()).collect();
    let mut stored = store.get_many(&keys).await?;

    let records = survivors
        .into_iter()
        .map(|(key, record)| {
            let hash = snapshot_hash(&record);
            let existing = stored.remove(&key);
            let decision = decide(existing.as_ref(), &hash);
            Classified {
                remote_id: existing.and_then(|e| e.remote_id),
                key,
                record,
                decision,
                snapshot_hash: hash,
            }
        })
        .collect();

    Ok(ClassifiedChunk {
        records,
        superseded,
    })
}

/// Length-prefixed SHA-256 accumulator.
struct Fingerprint(Sha256);

impl Fingerprint {
    fn new(domain: &str) -> Self {
        let mut fp = Fingerprint(Sha256::new());
        fp.text(domain);
        fp
    }

    fn text(&mut self, value: &str) {
        self.0.update((value.len() as u64).to_be_bytes());
        self.0.update(value.as_bytes());
    }

    fn opt(&mut self, value: Option<&str>) {
        match value {
            Some(v) => {
                self.0.update([1u8]);
                self.text(v);
            }
            None => self.0.update([0u8]),
        }
    }

    fn set<'a>(&mut self, values: impl ExactSizeIterator<Item = &'a String>) {
        self.0.update((values.len() as u64).to_be_bytes());
        for value in values {
            self.text(value);
        }
    }

    fn finish(self) -> String {
        hex::encode(self.0.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemoryStateStore;
    use chrono::{NaiveDate, Utc};

    fn posting() -> CanonicalRecord {
        CanonicalRecord::new("字节跳动", "后端开发工程师", "a")
            .with_publish_date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
            .with_deadline(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap())
    }

    #[test]
    fn test_key_ignores_source_and_secondary_fields() {
        let a = posting();
        let mut b = posting().with_industry("互联网").with_city("北京");
        b.source_name = "b".into();
        assert_eq!(identify(&a), identify(&b));
    }

    #[test]
    fn test_key_uses_comparison_form() {
        let a = CanonicalRecord::new("ByteDance", "SWE", "a");
        let b = CanonicalRecord::new("  bytedance ", "swe", "b");
        assert_eq!(identify(&a), identify(&b));
    }

    #[test]
    fn test_key_distinguishes_fields() {
        let base = posting();
        let mut other_date = posting();
        other_date.publish_date = NaiveDate::from_ymd_opt(2025, 6, 2);
        let mut undated = posting();
        undated.publish_date = None;

        assert_ne!(identify(&base), identify(&other_date));
        assert_ne!(identify(&base), identify(&undated));
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let a = CanonicalRecord::new("ab", "c", "x");
        let b = CanonicalRecord::new("a", "bc", "x");
        assert_ne!(identify(&a), identify(&b));
    }

    #[test]
    fn test_undated_records_collide_intentionally() {
        let a = CanonicalRecord::new("Acme", "Engineer", "a");
        let b = CanonicalRecord::new("Acme", "Engineer", "b").with_city("上海");
        assert_eq!(identify(&a), identify(&b));
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = identify(&posting());
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_snapshot_hash_tracks_secondary_fields() {
        let a = posting();
        let mut b = posting();
        b.deadline = NaiveDate::from_ymd_opt(2025, 9, 15);
        assert_ne!(snapshot_hash(&a), snapshot_hash(&b));

        let mut c = posting();
        c.source_name = "other".into();
        assert_eq!(snapshot_hash(&a), snapshot_hash(&c));
    }

    #[test]
    fn test_decide() {
        let entry = SeenEntry {
            identity_key: identify(&posting()),
            field_snapshot_hash: "abc".into(),
            first_seen_at: Utc::now(),
            last_synced_at: Utc::now(),
            remote_id: None,
        };
        assert_eq!(decide(None, "abc"), SyncDecision::Insert);
        assert_eq!(decide(Some(&entry), "abc"), SyncDecision::Skip);
        assert_eq!(decide(Some(&entry), "def"), SyncDecision::Update);
    }

    #[tokio::test]
    async fn test_classify_against_store() {
        let store = MemoryStateStore::new();
        let record = posting();
        let key = identify(&record);

        assert_eq!(classify(&record, &key, &store).await.unwrap(), SyncDecision::Insert);

        store
            .put(&key, &snapshot_hash(&record), Utc::now(), Some("rec1"))
            .await
            .unwrap();
        assert_eq!(classify(&record, &key, &store).await.unwrap(), SyncDecision::Skip);

        let changed = record.clone().with_deadline(NaiveDate::from_ymd_opt(2025, 9, 15).unwrap());
        assert_eq!(classify(&changed, &key, &store).await.unwrap(), SyncDecision::Update);
    }

    #[tokio::test]
    async fn test_chunk_collapses_duplicates_last_wins() {
        let store = MemoryStateStore::new();
        let first = posting().with_batch("秋招");
        let other = CanonicalRecord::new("Acme", "Engineer", "a");
        let second = posting().with_batch("春招");

        let chunk = classify_chunk(vec![first, other, second], &store)
            .await
            .unwrap();

        assert_eq!(chunk.superseded, 1);
        assert_eq!(chunk.records.len(), 2);
        assert_eq!(chunk.records[0].record.company, "Acme");
        assert_eq!(chunk.records[1].record.batch.as_deref(), Some("春招"));
        assert!(chunk.records.iter().all(|c| c.decision == SyncDecision::Insert));
    }

    #[tokio::test]
    async fn test_chunk_carries_remote_id() {
        let store = MemoryStateStore::new();
        let record = posting();
        let key = identify(&record);
        store.put(&key, "stale", Utc::now(), Some("rec42")).await.unwrap();

        let chunk = classify_chunk(vec![record], &store).await.unwrap();
        assert_eq!(chunk.records[0].decision, SyncDecision::Update);
        assert_eq!(chunk.records[0].remote_id.as_deref(), Some("rec42"));
    }
}
