//! Self-contained JSON snapshots of a state store.
//!
//! Exports are written to a sibling temp file and renamed into place, so a
//! reader never sees a partial snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{StateStoreError, StoreResult};
use crate::traits::store::{SeenEntry, StateStore};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub entries: Vec<SeenEntry>,
}

/// Write every entry of `store` to `path`. Returns the entry count.
pub async fn export_snapshot<S: StateStore + ?Sized>(store: &S, path: &Path) -> StoreResult<usize> {
    let snapshot = StateSnapshot {
        version: SNAPSHOT_VERSION,
        exported_at: Utc::now(),
        entries: store.entries().await?,
    };
    let bytes = serde_json::to_vec_pretty(&snapshot)
        .map_err(|e| StateStoreError::Snapshot(e.to_string()))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;

    info!(path = %path.display(), entries = snapshot.entries.len(), "State snapshot exported");
    Ok(snapshot.entries.len())
}

/// Read a snapshot file without touching any store.
pub async fn read_snapshot(path: &Path) -> StoreResult<StateSnapshot> {
    let bytes = tokio::fs::read(path).await?;
    let snapshot: StateSnapshot = serde_json::from_slice(&bytes)
        .map_err(|e| StateStoreError::Snapshot(format!("{}: {e}", path.display())))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StateStoreError::Snapshot(format!(
            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            snapshot.version
        )));
    }
    Ok(snapshot)
}

/// Load a snapshot file into `store`. Returns the entry count.
pub async fn import_snapshot<S: StateStore + ?Sized>(store: &S, path: &Path) -> StoreResult<usize> {
    let snapshot = read_snapshot(path).await?;
    let count = store.restore(&snapshot.entries).await?;
    info!(path = %path.display(), entries = count, "State snapshot imported");
    Ok(count)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
