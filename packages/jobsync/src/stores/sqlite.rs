//! SQLite state store.
//!
//! One file holds the whole key → entry mapping. The database runs in WAL
//! mode and every `put` is a single upsert statement, so a crash never
//! leaves a half-written entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{StateStoreError, StoreResult};
use crate::traits::store::{SeenEntry, StateStore};
use crate::types::record::IdentityKey;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS seen_entries (
    identity_key        TEXT PRIMARY KEY NOT NULL,
    field_snapshot_hash TEXT NOT NULL,
    first_seen_at       TEXT NOT NULL,
    last_synced_at      TEXT NOT NULL,
    remote_id           TEXT
);
"#;

const SELECT_COLUMNS: &str =
    "identity_key, field_snapshot_hash, first_seen_at, last_synced_at, remote_id";

/// SQLite-backed [`StateStore`].
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (creating if needed) the database at `database_url`.
    ///
    /// # Example URLs
    /// - `sqlite://data/cache.db` - file, parent directory created on demand
    /// - `sqlite::memory:` - ephemeral, single connection
    pub async fn open(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StateStoreError::Unavailable(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = database_url.contains(":memory:");
        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        // Each in-memory connection is its own database.
        let max_connections = if in_memory { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| StateStoreError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Ephemeral store (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        Self::open("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(CREATE_TABLES).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, FromRow)]
struct SeenRow {
    identity_key: String,
    field_snapshot_hash: String,
    first_seen_at: String,
    last_synced_at: String,
    remote_id: Option<String>,
}

impl SeenRow {
    fn into_entry(self) -> StoreResult<SeenEntry> {
        let first_seen_at = parse_timestamp(&self.identity_key, &self.first_seen_at)?;
        let last_synced_at = parse_timestamp(&self.identity_key, &self.last_synced_at)?;
        Ok(SeenEntry {
            identity_key: IdentityKey::from_stored(self.identity_key),
            field_snapshot_hash: self.field_snapshot_hash,
            first_seen_at,
            last_synced_at,
            remote_id: self.remote_id,
        })
    }
}

fn parse_timestamp(key: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StateStoreError::Corrupt {
            key: key.to_string(),
            reason: format!("invalid timestamp {value:?}: {e}"),
        })
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &IdentityKey) -> StoreResult<Option<SeenEntry>> {
        let row = sqlx::query_as::<_, SeenRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM seen_entries WHERE identity_key = ?"
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SeenRow::into_entry).transpose()
    }

    async fn put(
        &self,
        key: &IdentityKey,
        snapshot_hash: &str,
        at: DateTime<Utc>,
        remote_id: Option<&str>,
    ) -> StoreResult<SeenEntry> {
        let at = at.to_rfc3339();
        let row = sqlx::query_as::<_, SeenRow>(&format!(
            r#"
            INSERT INTO seen_entries
                (identity_key, field_snapshot_hash, first_seen_at, last_synced_at, remote_id)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(identity_key) DO UPDATE SET
                field_snapshot_hash = excluded.field_snapshot_hash,
                last_synced_at = excluded.last_synced_at,
                remote_id = COALESCE(excluded.remote_id, seen_entries.remote_id)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(key.as_str())
        .bind(snapshot_hash)
        .bind(&at)
        .bind(&at)
        .bind(remote_id)
        .fetch_one(&self.pool)
        .await?;

        row.into_entry()
    }

    async fn all_keys(&self) -> StoreResult<HashSet<IdentityKey>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT identity_key FROM seen_entries")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys.into_iter().map(IdentityKey::from_stored).collect())
    }

    async fn entries(&self) -> StoreResult<Vec<SeenEntry>> {
        let rows = sqlx::query_as::<_, SeenRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM seen_entries ORDER BY identity_key"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SeenRow::into_entry).collect()
    }

    async fn restore(&self, entries: &[SeenEntry]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO seen_entries
                    (identity_key, field_snapshot_hash, first_seen_at, last_synced_at, remote_id)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.identity_key.as_str())
            .bind(&entry.field_snapshot_hash)
            .bind(entry.first_seen_at.to_rfc3339())
            .bind(entry.last_synced_at.to_rfc3339())
            .bind(entry.remote_id.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(entries.len())
    }

    async fn len(&self) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seen_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn ping(&self) -> StoreResult<()> {
        if self.pool.is_closed() {
            return Err(StateStoreError::Unavailable("connection pool closed".into()));
        }
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StateStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_many(&self, keys: &[IdentityKey]) -> StoreResult<HashMap<IdentityKey, SeenEntry>> {
        let mut found = HashMap::with_capacity(keys.len());

        // Stay well under SQLite's bound-parameter limit.
        for batch in keys.chunks(500) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM seen_entries WHERE identity_key IN ({placeholders})"
            );
            let mut query = sqlx::query_as::<_, SeenRow>(&sql);
            for key in batch {
                query = query.bind(key.as_str());
            }
            for row in query.fetch_all(&self.pool).await? {
                let entry = row.into_entry()?;
                found.insert(entry.identity_key.clone(), entry);
            }
        }

        Ok(found)
    }
}
