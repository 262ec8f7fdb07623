//! In-memory state store for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::store::{SeenEntry, StateStore};
use crate::types::record::IdentityKey;

/// In-memory key → entry map.
///
/// Not durable: everything is lost when the process exits. Use
/// [`crate::stores::snapshot`] to persist it, or [`super::SqliteStateStore`].
#[derive(Default)]
pub struct MemoryStateStore {
    entries: RwLock<BTreeMap<IdentityKey, SeenEntry>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &IdentityKey) -> StoreResult<Option<SeenEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(
        &self,
        key: &IdentityKey,
        snapshot_hash: &str,
        at: DateTime<Utc>,
        remote_id: Option<&str>,
    ) -> StoreResult<SeenEntry> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.clone())
            .and_modify(|e| {
                e.field_snapshot_hash = snapshot_hash.to_string();
                e.last_synced_at = at;
                if let Some(id) = remote_id {
                    e.remote_id = Some(id.to_string());
                }
            })
            .or_insert_with(|| SeenEntry {
                identity_key: key.clone(),
                field_snapshot_hash: snapshot_hash.to_string(),
                first_seen_at: at,
                last_synced_at: at,
                remote_id: remote_id.map(str::to_string),
            });
        Ok(entry.clone())
    }

    async fn all_keys(&self) -> StoreResult<HashSet<IdentityKey>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn entries(&self) -> StoreResult<Vec<SeenEntry>> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn restore(&self, entries: &[SeenEntry]) -> StoreResult<usize> {
        let mut map = self.entries.write().await;
        for entry in entries {
            map.insert(entry.identity_key.clone(), entry.clone());
        }
        Ok(entries.len())
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
