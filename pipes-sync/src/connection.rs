//! Connection map: foreign id → internal id correlation for one pipe.
//!
//! Persists a `ConnectionDocument` JSON snapshot under
//! `<service>:connections:<pipe>` in the workspace. A save replaces the whole
//! document; there is no merge at the storage layer, so callers load, mutate
//! and save while holding exclusivity for the pipe.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pipes_core::{PipeId, ServiceId, StoreKey, WorkspaceId, UNMAPPED};

use crate::error::SyncError;
use crate::snapshot::SnapshotStore;

/// In-memory mapping: foreign id (as string) → internal id.
pub type Connections = HashMap<String, i64>;

/// Stored document payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionDocument {
    pub updated_at: DateTime<Utc>,
    pub data: Connections,
}

/// Correlation table of one `(workspace, service, pipe)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMap {
    pub workspace: WorkspaceId,
    pub service: ServiceId,
    pub pipe: PipeId,
    pub updated_at: DateTime<Utc>,
    pub data: Connections,
}

impl ConnectionMap {
    /// An empty map that has never been saved.
    pub fn new(workspace: WorkspaceId, service: ServiceId, pipe: PipeId) -> Self {
        Self {
            workspace,
            service,
            pipe,
            updated_at: Utc::now(),
            data: Connections::new(),
        }
    }

    pub fn key(&self) -> StoreKey {
        StoreKey::connection(&self.service, self.pipe)
    }

    /// Load the map for `pipe`.
    ///
    /// Returns an empty map if none has been saved yet.
    pub fn load(
        snapshots: &SnapshotStore,
        workspace: WorkspaceId,
        service: &ServiceId,
        pipe: PipeId,
    ) -> Result<Self, SyncError> {
        let mut map = Self::new(workspace, service.clone(), pipe);
        if let Some(doc) = snapshots.get_latest::<ConnectionDocument>(workspace, &map.key())? {
            map.updated_at = doc.updated_at;
            map.data = doc.data;
        }
        Ok(map)
    }

    /// Store the full mapping, replacing whatever was saved before.
    pub fn save(&mut self, snapshots: &SnapshotStore) -> Result<(), SyncError> {
        self.updated_at = Utc::now();
        let doc = ConnectionDocument {
            updated_at: self.updated_at,
            data: self.data.clone(),
        };
        snapshots.put(self.workspace, &self.key(), &doc)?;
        tracing::info!(
            "saved {} {} connection(s) for workspace {}",
            self.data.len(),
            self.pipe,
            self.workspace
        );
        Ok(())
    }

    /// Internal id for `foreign_id`, or [`UNMAPPED`] if it was never connected.
    pub fn resolve(&self, foreign_id: impl fmt::Display) -> i64 {
        self.data
            .get(&foreign_id.to_string())
            .copied()
            .unwrap_or(UNMAPPED)
    }

    pub fn connect(&mut self, foreign_id: impl fmt::Display, internal_id: i64) {
        self.data.insert(foreign_id.to_string(), internal_id);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::report::LogReporter;
    use crate::store::FsStore;
    use tempfile::TempDir;

    const WS: WorkspaceId = WorkspaceId(11);

    fn basecamp() -> ServiceId {
        ServiceId::from("basecamp")
    }

    fn snapshots(tmp: &TempDir) -> SnapshotStore {
        SnapshotStore::new(
            Arc::new(FsStore::open(tmp.path()).unwrap()),
            Arc::new(LogReporter),
        )
    }

    #[test]
    fn empty_map_when_never_saved() {
        let tmp = TempDir::new().unwrap();
        let map = ConnectionMap::load(&snapshots(&tmp), WS, &basecamp(), PipeId::Projects).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.resolve(7), UNMAPPED);
    }

    #[test]
    fn roundtrip_save_load() {
        let tmp = TempDir::new().unwrap();
        let snapshots = snapshots(&tmp);
        let mut map = ConnectionMap::new(WS, basecamp(), PipeId::Projects);
        map.connect(7, 42);
        map.connect("8", 43);
        map.save(&snapshots).unwrap();

        let loaded = ConnectionMap::load(&snapshots, WS, &basecamp(), PipeId::Projects).unwrap();
        assert_eq!(loaded.data, map.data);
        assert_eq!(loaded.resolve(7), 42);
        assert_eq!(loaded.resolve(8), 43);
        assert_eq!(loaded.resolve(9), UNMAPPED);
    }

    #[test]
    fn save_replaces_previous_document() {
        let tmp = TempDir::new().unwrap();
        let snapshots = snapshots(&tmp);

        let mut first = ConnectionMap::new(WS, basecamp(), PipeId::Todos);
        first.connect(1, 100);
        first.connect(2, 200);
        first.save(&snapshots).unwrap();

        let mut second = ConnectionMap::new(WS, basecamp(), PipeId::Todos);
        second.connect(1, 100);
        second.save(&snapshots).unwrap();

        let loaded = ConnectionMap::load(&snapshots, WS, &basecamp(), PipeId::Todos).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.resolve(1), 100);
        assert_eq!(loaded.resolve(2), UNMAPPED);
    }

    #[test]
    fn maps_are_scoped_per_pipe() {
        let tmp = TempDir::new().unwrap();
        let snapshots = snapshots(&tmp);
        let mut lists = ConnectionMap::new(WS, basecamp(), PipeId::TodoLists);
        lists.connect(5, 50);
        lists.save(&snapshots).unwrap();

        let todos = ConnectionMap::load(&snapshots, WS, &basecamp(), PipeId::Todos).unwrap();
        assert!(todos.is_empty());
    }

    #[test]
    fn load_keeps_saved_timestamp() {
        let tmp = TempDir::new().unwrap();
        let snapshots = snapshots(&tmp);
        let mut map = ConnectionMap::new(WS, basecamp(), PipeId::Projects);
        map.connect(7, 42);
        map.save(&snapshots).unwrap();

        let loaded = ConnectionMap::load(&snapshots, WS, &basecamp(), PipeId::Projects).unwrap();
        assert_eq!(loaded.updated_at, map.updated_at);
    }

    #[test]
    fn document_without_timestamp_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let snapshots = snapshots(&tmp);
        let key = StoreKey::connection(&basecamp(), PipeId::Projects);
        snapshots
            .put(WS, &key, &serde_json::json!({ "data": { "7": 42 } }))
            .unwrap();

        let err = ConnectionMap::load(&snapshots, WS, &basecamp(), PipeId::Projects).unwrap_err();
        assert!(matches!(err, SyncError::Json(_)));
    }
}
