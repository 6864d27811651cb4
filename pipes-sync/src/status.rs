//! Pipe run status and per-workspace pipe settings.
//!
//! Both are small documents stored through the snapshot layer; the latest row
//! wins, so writing a new status overwrites the previous run's outcome.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pipes_core::{Catalog, PipeId, PipeKey, ServiceId, StoreKey, WorkspaceId};

use crate::error::SyncError;
use crate::snapshot::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

/// Outcome of the last run of one pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeStatus {
    pub workspace_id: WorkspaceId,
    pub service_id: ServiceId,
    pub pipe_id: PipeId,
    pub outcome: Outcome,
    pub message: String,
    #[serde(default)]
    pub notifications: Vec<String>,
    #[serde(default)]
    pub object_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl PipeStatus {
    /// A successful run that imported `count` objects.
    pub fn complete(
        workspace_id: WorkspaceId,
        service_id: ServiceId,
        pipe_id: PipeId,
        notifications: Vec<String>,
        count: usize,
    ) -> Self {
        Self {
            workspace_id,
            service_id,
            pipe_id,
            outcome: Outcome::Success,
            message: format!("{count} {pipe_id} successfully imported"),
            notifications,
            object_count: count,
            updated_at: Utc::now(),
        }
    }

    /// A run aborted by `err`.
    pub fn fail(
        workspace_id: WorkspaceId,
        service_id: ServiceId,
        pipe_id: PipeId,
        err: &SyncError,
    ) -> Self {
        Self {
            workspace_id,
            service_id,
            pipe_id,
            outcome: Outcome::Error,
            message: err.to_string(),
            notifications: vec![],
            object_count: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn save(&self, snapshots: &SnapshotStore) -> Result<(), SyncError> {
        snapshots.put(
            self.workspace_id,
            &StoreKey::status(&self.service_id, self.pipe_id),
            self,
        )
    }

    pub fn load(
        snapshots: &SnapshotStore,
        workspace: WorkspaceId,
        service: &ServiceId,
        pipe: PipeId,
    ) -> Result<Option<Self>, SyncError> {
        snapshots.get_latest(workspace, &StoreKey::status(service, pipe))
    }
}

/// Latest status of every catalog pipe that has run in `workspace`.
pub fn load_pipe_statuses(
    snapshots: &SnapshotStore,
    catalog: &Catalog,
    workspace: WorkspaceId,
) -> Result<HashMap<PipeKey, PipeStatus>, SyncError> {
    let mut statuses = HashMap::new();
    for key in catalog.pipe_keys() {
        if let Some(status) = PipeStatus::load(snapshots, workspace, &key.service, key.pipe)? {
            statuses.insert(key, status);
        }
    }
    Ok(statuses)
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Workspace-level choices for one pipe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeSettings {
    /// Run on the scheduler; only honoured where the catalog allows it.
    #[serde(default)]
    pub automatic: bool,
}

impl PipeSettings {
    pub fn save(
        &self,
        snapshots: &SnapshotStore,
        workspace: WorkspaceId,
        service: &ServiceId,
        pipe: PipeId,
    ) -> Result<(), SyncError> {
        snapshots.put(workspace, &StoreKey::settings(service, pipe), self)
    }
}

/// Settings of every catalog pipe configured in `workspace`.
pub fn load_pipe_settings(
    snapshots: &SnapshotStore,
    catalog: &Catalog,
    workspace: WorkspaceId,
) -> Result<HashMap<PipeKey, PipeSettings>, SyncError> {
    let mut settings = HashMap::new();
    for key in catalog.pipe_keys() {
        let stored: Option<PipeSettings> =
            snapshots.get_latest(workspace, &StoreKey::settings(&key.service, key.pipe))?;
        if let Some(stored) = stored {
            settings.insert(key, stored);
        }
    }
    Ok(settings)
}
