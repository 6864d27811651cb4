//! Durable store contract and its implementations.
//!
//! A store is an append-only log of opaque blobs keyed by
//! `(workspace, key)`. Reads return the row with the greatest `created_at`;
//! `clear` and `retain_latest` are the only operations that remove rows.
//!
//! [`FsStore`] persists one file per row:
//!
//! ```text
//! <root>/
//!   <workspace_id>/
//!     <hex(key)>/
//!       <created_at_nanos>.json
//! ```
//!
//! Writes go to `<name>.json.tmp` and are renamed into place, the same atomic
//! pattern the connection and status documents rely on.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};

use pipes_core::{StoreKey, WorkspaceId};

use crate::error::{io_err, StoreError};

/// One stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Read/write contract of the durable store.
pub trait Store: Send + Sync {
    /// Append a new row stamped with the current time; returns the stamp.
    fn append(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
        data: &[u8],
    ) -> Result<DateTime<Utc>, StoreError>;

    /// The most recently created row, or `None` if the key was never written.
    fn latest(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<Option<StoredSnapshot>, StoreError>;

    /// Every row for the key, oldest first.
    fn history(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<Vec<StoredSnapshot>, StoreError>;

    /// Delete every row for the key; returns how many were removed.
    fn clear(&self, workspace: WorkspaceId, key: &StoreKey) -> Result<usize, StoreError>;

    /// Delete every row but the newest; returns how many were removed.
    fn retain_latest(&self, workspace: WorkspaceId, key: &StoreKey) -> Result<usize, StoreError>;
}

// ---------------------------------------------------------------------------
// FsStore
// ---------------------------------------------------------------------------

/// File-backed store rooted at a directory.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    // Serializes stamp allocation so two appends never pick the same name.
    write_lock: Mutex<()>,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<workspace_id>/<hex(key)>`; pure, no I/O.
    pub fn key_dir(&self, workspace: WorkspaceId, key: &StoreKey) -> PathBuf {
        self.root
            .join(workspace.to_string())
            .join(hex::encode(key.as_str()))
    }

    /// Row files under `dir` sorted by stamp; empty if `dir` does not exist.
    fn entries(dir: &Path) -> Result<Vec<(i64, PathBuf)>, StoreError> {
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
            let entry = entry.map_err(|e| io_err(dir, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            // In-flight `.json.tmp` files are not rows yet.
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            let stamp = stem
                .parse::<i64>()
                .map_err(|_| StoreError::CorruptEntry { path: path.clone() })?;
            entries.push((stamp, path));
        }
        entries.sort_by_key(|(stamp, _)| *stamp);
        Ok(entries)
    }

    fn read_row(stamp: i64, path: &Path) -> Result<StoredSnapshot, StoreError> {
        let data = fs::read(path).map_err(|e| io_err(path, e))?;
        Ok(StoredSnapshot {
            data,
            created_at: Utc.timestamp_nanos(stamp),
        })
    }
}

impl Store for FsStore {
    fn append(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
        data: &[u8],
    ) -> Result<DateTime<Utc>, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let dir = self.key_dir(workspace, key);
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        // Stamps strictly increase per key even if the clock stalls or steps back.
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let stamp = match Self::entries(&dir)?.last() {
            Some((last, _)) if *last >= now => last.saturating_add(1),
            _ => now,
        };

        let path = dir.join(format!("{stamp:020}.json"));
        let tmp = dir.join(format!("{stamp:020}.json.tmp"));
        fs::write(&tmp, data).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        Ok(Utc.timestamp_nanos(stamp))
    }

    fn latest(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<Option<StoredSnapshot>, StoreError> {
        let entries = Self::entries(&self.key_dir(workspace, key))?;
        match entries.last() {
            Some((stamp, path)) => Self::read_row(*stamp, path).map(Some),
            None => Ok(None),
        }
    }

    fn history(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<Vec<StoredSnapshot>, StoreError> {
        Self::entries(&self.key_dir(workspace, key))?
            .iter()
            .map(|(stamp, path)| Self::read_row(*stamp, path))
            .collect()
    }

    fn clear(&self, workspace: WorkspaceId, key: &StoreKey) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let dir = self.key_dir(workspace, key);
        let removed = Self::entries(&dir)?.len();
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
        Ok(removed)
    }

    fn retain_latest(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entries = Self::entries(&self.key_dir(workspace, key))?;
        entries.pop();
        for (_, path) in &entries {
            fs::remove_file(path).map_err(|e| io_err(path, e))?;
        }
        Ok(entries.len())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store. Not durable; used by tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<(WorkspaceId, StoreKey), Vec<StoredSnapshot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn append(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
        data: &[u8],
    ) -> Result<DateTime<Utc>, StoreError> {
        let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        let log = rows.entry((workspace, key.clone())).or_default();
        let now = Utc::now();
        let created_at = match log.last() {
            Some(last) if last.created_at >= now => last.created_at + Duration::nanoseconds(1),
            _ => now,
        };
        log.push(StoredSnapshot {
            data: data.to_vec(),
            created_at,
        });
        Ok(created_at)
    }

    fn latest(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<Option<StoredSnapshot>, StoreError> {
        let rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(rows
            .get(&(workspace, key.clone()))
            .and_then(|log| log.iter().max_by_key(|row| row.created_at))
            .cloned())
    }

    fn history(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<Vec<StoredSnapshot>, StoreError> {
        let rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(rows
            .get(&(workspace, key.clone()))
            .cloned()
            .unwrap_or_default())
    }

    fn clear(&self, workspace: WorkspaceId, key: &StoreKey) -> Result<usize, StoreError> {
        let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(rows
            .remove(&(workspace, key.clone()))
            .map_or(0, |log| log.len()))
    }

    fn retain_latest(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<usize, StoreError> {
        let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        let Some(log) = rows.get_mut(&(workspace, key.clone())) else {
            return Ok(0);
        };
        let stale = log.len().saturating_sub(1);
        log.drain(..stale);
        Ok(stale)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
