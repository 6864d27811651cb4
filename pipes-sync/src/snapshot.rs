//! Typed snapshot layer over a [`Store`].
//!
//! [`SnapshotStore`] turns payloads into JSON rows and back. Storage and
//! serialization failures are returned to the caller and also handed to the
//! [`ErrorReporter`]. A key that was never written reads as `None`.
//!
//! [`SnapshotGuard`] is the pipeline's finalizer: it owns an import response
//! and writes it exactly once. A handler that succeeds calls
//! [`SnapshotGuard::commit`] so a failed write surfaces as an error; every
//! other exit writes the response on drop.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use pipes_core::{StoreKey, WorkspaceId};

use crate::error::SyncError;
use crate::report::ErrorReporter;
use crate::store::Store;

/// Shared handle to the store plus the error-tracking side channel.
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn Store>,
    reporter: Arc<dyn ErrorReporter>,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn Store>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { store, reporter }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Serialize `payload` and append it as the newest row for `key`.
    pub fn put<T: Serialize + ?Sized>(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
        payload: &T,
    ) -> Result<(), SyncError> {
        let bytes = serde_json::to_vec(payload).map_err(|e| self.report(e.into()))?;
        self.store
            .append(workspace, key, &bytes)
            .map_err(|e| self.report(e.into()))?;
        tracing::debug!("stored {key} for workspace {workspace} ({} bytes)", bytes.len());
        Ok(())
    }

    /// Latest payload for `key`; `None` on first run.
    pub fn get_latest<T: DeserializeOwned>(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<Option<T>, SyncError> {
        let Some(row) = self
            .store
            .latest(workspace, key)
            .map_err(|e| self.report(e.into()))?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&row.data)
            .map(Some)
            .map_err(|e| self.report(e.into()))
    }

    /// Remove every row for `key`.
    pub fn clear(&self, workspace: WorkspaceId, key: &StoreKey) -> Result<usize, SyncError> {
        self.store
            .clear(workspace, key)
            .map_err(|e| self.report(e.into()))
    }

    /// Remove every row for `key` except the newest.
    pub fn retain_latest(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<usize, SyncError> {
        self.store
            .retain_latest(workspace, key)
            .map_err(|e| self.report(e.into()))
    }

    /// Hand a systemic error to the reporter and give it back.
    pub(crate) fn report(&self, err: SyncError) -> SyncError {
        if err.is_systemic() {
            self.reporter.notify(&err);
        }
        err
    }

    /// Wrap `response` so it is stored under `key` when the guard drops.
    pub fn guard<T: Serialize + ImportResponse>(
        &self,
        workspace: WorkspaceId,
        key: StoreKey,
        response: T,
    ) -> SnapshotGuard<'_, T> {
        SnapshotGuard {
            snapshots: self,
            workspace,
            key,
            response,
            stored: false,
        }
    }
}

/// A fetched-data document that can carry the error that cut its fetch short.
pub trait ImportResponse {
    fn set_error(&mut self, message: String);
}

/// Persists the wrapped response on commit, or on drop if never committed.
pub struct SnapshotGuard<'a, T: Serialize + ImportResponse> {
    snapshots: &'a SnapshotStore,
    workspace: WorkspaceId,
    key: StoreKey,
    response: T,
    stored: bool,
}

impl<T: Serialize + ImportResponse> SnapshotGuard<'_, T> {
    /// Record `err` in the response and hand it back for propagation.
    pub fn fail(&mut self, err: SyncError) -> SyncError {
        self.response.set_error(err.to_string());
        err
    }

    /// Store the response now and return the write's outcome.
    pub fn commit(mut self) -> Result<(), SyncError> {
        self.stored = true;
        self.snapshots
            .put(self.workspace, &self.key, &self.response)
    }
}

impl<T: Serialize + ImportResponse> Deref for SnapshotGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.response
    }
}

impl<T: Serialize + ImportResponse> DerefMut for SnapshotGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.response
    }
}

impl<T: Serialize + ImportResponse> Drop for SnapshotGuard<'_, T> {
    fn drop(&mut self) {
        if self.stored {
            return;
        }
        // Already reported by `put`; a drop cannot propagate.
        if let Err(err) = self
            .snapshots
            .put(self.workspace, &self.key, &self.response)
        {
            tracing::warn!("could not store {}: {err}", self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ProjectsResponse;
    use crate::store::MemoryStore;
    use crate::testing::{FlakyStore, RecordingReporter};
    use pipes_core::{PipeId, Project, ServiceId};

    const WS: WorkspaceId = WorkspaceId(3);

    fn key() -> StoreKey {
        StoreKey::import(&ServiceId::from("basecamp"), PipeId::Projects)
    }

    fn snapshots() -> (SnapshotStore, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let snapshots = SnapshotStore::new(Arc::new(MemoryStore::new()), reporter.clone());
        (snapshots, reporter)
    }

    #[test]
    fn put_then_put_reads_latest() {
        let (snapshots, _) = snapshots();
        snapshots.put(WS, &key(), &vec!["A"]).unwrap();
        snapshots.put(WS, &key(), &vec!["B"]).unwrap();
        let latest: Option<Vec<String>> = snapshots.get_latest(WS, &key()).unwrap();
        assert_eq!(latest, Some(vec!["B".to_string()]));

        snapshots.clear(WS, &key()).unwrap();
        let cleared: Option<Vec<String>> = snapshots.get_latest(WS, &key()).unwrap();
        assert!(cleared.is_none());
    }

    #[test]
    fn decode_failure_is_reported() {
        let (snapshots, reporter) = snapshots();
        snapshots.put(WS, &key(), &"not a list").unwrap();
        let err = snapshots
            .get_latest::<Vec<String>>(WS, &key())
            .unwrap_err();
        assert!(matches!(err, SyncError::Json(_)));
        assert_eq!(reporter.count(), 1);
    }

    #[test]
    fn guard_stores_on_every_exit() {
        let (snapshots, reporter) = snapshots();

        fn handler(snapshots: &SnapshotStore, fail: bool) -> Result<(), SyncError> {
            let mut response = snapshots.guard(WS, key(), ProjectsResponse::default());
            response.projects.push(Project::new(7, "P"));
            if fail {
                return Err(response.fail(crate::error::SourceError::new("boom").into()));
            }
            Ok(())
        }

        handler(&snapshots, true).unwrap_err();
        let stored: ProjectsResponse = snapshots.get_latest(WS, &key()).unwrap().unwrap();
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert_eq!(stored.projects.len(), 1);

        handler(&snapshots, false).unwrap();
        let stored: ProjectsResponse = snapshots.get_latest(WS, &key()).unwrap().unwrap();
        assert!(stored.error.is_none());
        assert_eq!(reporter.count(), 0, "source errors are not reported");
    }

    fn flaky() -> (SnapshotStore, Arc<FlakyStore>, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let store = Arc::new(FlakyStore::new());
        let snapshots = SnapshotStore::new(store.clone(), reporter.clone());
        (snapshots, store, reporter)
    }

    #[test]
    fn storage_failure_is_returned_and_reported() {
        let (snapshots, store, reporter) = flaky();
        store.fail_appends(true);
        let err = snapshots.put(WS, &key(), &vec!["A"]).unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
        assert_eq!(reporter.count(), 1);
        assert!(reporter.messages()[0].contains("disk full"));
    }

    #[test]
    fn commit_writes_once_and_surfaces_failure() {
        let (snapshots, store, reporter) = flaky();

        let response = snapshots.guard(WS, key(), ProjectsResponse::default());
        response.commit().unwrap();
        assert_eq!(snapshots.store().history(WS, &key()).unwrap().len(), 1);

        store.fail_appends(true);
        let mut response = snapshots.guard(WS, key(), ProjectsResponse::default());
        response.projects.push(Project::new(7, "P"));
        let err = response.commit().unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
        assert_eq!(reporter.count(), 1, "no second attempt on drop");
    }

    #[test]
    fn failed_write_on_drop_is_reported_and_original_error_kept() {
        let (snapshots, store, reporter) = flaky();
        store.fail_appends(true);
        {
            let mut response = snapshots.guard(WS, key(), ProjectsResponse::default());
            let err = response.fail(crate::error::SourceError::new("boom").into());
            assert!(matches!(err, SyncError::Source(_)));
        }
        assert_eq!(reporter.count(), 1);
        assert!(snapshots
            .get_latest::<ProjectsResponse>(WS, &key())
            .unwrap()
            .is_none());
    }
}
