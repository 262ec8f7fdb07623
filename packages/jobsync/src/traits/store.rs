//! Local state store trait - which identity keys were synced, and with
//! what content.
//!
//! Entries are created on the first confirmed insert of a key and updated on
//! each confirmed update. Nothing is ever evicted automatically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::StoreResult;
use crate::types::record::IdentityKey;

/// What the store remembers about one synced posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenEntry {
    pub identity_key: IdentityKey,

    /// Hash of the non-identity fields as last written to the sink
    pub field_snapshot_hash: String,

    pub first_seen_at: DateTime<Utc>,

    pub last_synced_at: DateTime<Utc>,

    /// Sink row id, used to address updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

/// Durable key → [`SeenEntry`] mapping.
///
/// Implementations must make each `put` atomic for its key.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &IdentityKey) -> StoreResult<Option<SeenEntry>>;

    /// Record a confirmed write.
    ///
    /// Creates the entry if absent (with `first_seen_at = at`), otherwise
    /// replaces the snapshot hash and `last_synced_at`, keeping
    /// `first_seen_at`. A `None` remote id keeps the stored one.
    async fn put(
        &self,
        key: &IdentityKey,
        snapshot_hash: &str,
        at: DateTime<Utc>,
        remote_id: Option<&str>,
    ) -> StoreResult<SeenEntry>;

    async fn all_keys(&self) -> StoreResult<HashSet<IdentityKey>>;

    /// Every entry, ordered by identity key.
    async fn entries(&self) -> StoreResult<Vec<SeenEntry>>;

    /// Load entries verbatim (snapshot import). Existing keys are overwritten.
    async fn restore(&self, entries: &[SeenEntry]) -> StoreResult<usize>;

    async fn len(&self) -> StoreResult<usize>;

    async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Check the store is reachable. Called before a run issues any writes.
    async fn ping(&self) -> StoreResult<()>;

    /// Look up several keys at once.
    async fn get_many(&self, keys: &[IdentityKey]) -> StoreResult<HashMap<IdentityKey, SeenEntry>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.get(key).await? {
                found.insert(key.clone(), entry);
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn get(&self, key: &IdentityKey) -> StoreResult<Option<SeenEntry>> {
        (**self).get(key).await
    }

    async fn put(
        &self,
        key: &IdentityKey,
        snapshot_hash: &str,
        at: DateTime<Utc>,
        remote_id: Option<&str>,
    ) -> StoreResult<SeenEntry> {
        (**self).put(key, snapshot_hash, at, remote_id).await
    }

    async fn all_keys(&self) -> StoreResult<HashSet<IdentityKey>> {
        (**self).all_keys().await
    }

    async fn entries(&self) -> StoreResult<Vec<SeenEntry>> {
        (**self).entries().await
    }

    async fn restore(&self, entries: &[SeenEntry]) -> StoreResult<usize> {
        (**self).restore(entries).await
    }

    async fn len(&self) -> StoreResult<usize> {
        (**self).len().await
    }

    async fn ping(&self) -> StoreResult<()> {
        (**self).ping().await
    }

    async fn get_many(&self, keys: &[IdentityKey]) -> StoreResult<HashMap<IdentityKey, SeenEntry>> {
        (**self).get_many(keys).await
    }
}
