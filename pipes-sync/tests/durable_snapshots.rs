use std::fs;
use std::sync::Arc;

use pipes_core::{
    Account, PipeId, Project, Selector, ServiceId, StoreKey, Task, User, WorkspaceId, UNMAPPED,
};
use pipes_sync::{
    response::ProjectsResponse, ApiError, ConnectionMap, ExternalSource, FsStore, InternalApi,
    LogReporter, Pipeline, SnapshotStore, SourceError, Store,
};
use tempfile::TempDir;

const WS: WorkspaceId = WorkspaceId(77);

fn open(home: &TempDir) -> SnapshotStore {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = FsStore::open(home.path().join("imports")).expect("open store");
    SnapshotStore::new(Arc::new(store), Arc::new(LogReporter))
}

struct OneProject;

impl ExternalSource for OneProject {
    fn service_id(&self) -> ServiceId {
        ServiceId::from("basecamp")
    }
    fn users(&self) -> Result<Vec<User>, SourceError> {
        Ok(vec![])
    }
    fn projects(&self) -> Result<Vec<Project>, SourceError> {
        Ok(vec![Project::new(7, "Launch")])
    }
    fn todo_lists(&self) -> Result<Vec<Task>, SourceError> {
        Ok(vec![])
    }
    fn tasks(&self) -> Result<Vec<Task>, SourceError> {
        Ok(vec![])
    }
    fn accounts(&self) -> Result<Vec<Account>, SourceError> {
        Ok(vec![])
    }
}

/// Gives every project internal id 42.
struct FixedIds;

impl InternalApi for FixedIds {
    fn post_entities(
        &self,
        _token: &str,
        tag: &str,
        payload: &serde_json::Value,
    ) -> Result<Vec<u8>, ApiError> {
        assert_eq!(tag, "projects");
        let mut projects = payload["projects"].as_array().cloned().unwrap_or_default();
        for project in &mut projects {
            project["id"] = serde_json::json!(42);
        }
        let body = serde_json::json!({ "projects": projects, "notifications": ["ok"] });
        serde_json::to_vec(&body).map_err(|e| ApiError::Transport(e.to_string()))
    }
}

#[test]
fn history_survives_reopen_and_latest_wins() {
    let home = TempDir::new().expect("home");
    let key = StoreKey::import(&ServiceId::from("basecamp"), PipeId::Projects);
    {
        let snapshots = open(&home);
        snapshots.put(WS, &key, &serde_json::json!({ "n": 1 })).unwrap();
        snapshots.put(WS, &key, &serde_json::json!({ "n": 2 })).unwrap();
    }

    let snapshots = open(&home);
    let latest: serde_json::Value = snapshots.get_latest(WS, &key).unwrap().expect("latest");
    assert_eq!(latest["n"], 2);

    let history = snapshots.store().history(WS, &key).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].created_at < history[1].created_at);
}

#[test]
fn workspaces_do_not_share_rows() {
    let home = TempDir::new().expect("home");
    let snapshots = open(&home);
    let key = StoreKey::accounts(&ServiceId::from("basecamp"));
    snapshots.put(WS, &key, &"mine").unwrap();

    let other: Option<String> = snapshots.get_latest(WorkspaceId(78), &key).unwrap();
    assert!(other.is_none());
}

#[test]
fn stray_files_in_key_directory_are_ignored() {
    let home = TempDir::new().expect("home");
    let store = FsStore::open(home.path().join("imports")).unwrap();
    let key = StoreKey::accounts(&ServiceId::from("basecamp"));
    store.append(WS, &key, b"{}").unwrap();
    fs::write(store.key_dir(WS, &key).join("notes.txt"), "scratch").unwrap();

    assert_eq!(store.history(WS, &key).unwrap().len(), 1);
}

#[test]
fn second_run_after_restart_reconciles_from_disk() {
    let home = TempDir::new().expect("home");
    {
        let snapshots = open(&home);
        let pipeline = Pipeline::new(WS, &OneProject, &FixedIds, &snapshots, "token");
        let status = pipeline.run(PipeId::Projects, &Selector::default()).unwrap();
        assert_eq!(status.object_count, 1);
        assert_eq!(status.notifications, vec!["ok".to_string()]);
    }

    let snapshots = open(&home);
    let map = ConnectionMap::load(&snapshots, WS, &ServiceId::from("basecamp"), PipeId::Projects)
        .unwrap();
    assert_eq!(map.resolve(7), 42);
    assert_eq!(map.resolve(8), UNMAPPED);

    Pipeline::new(WS, &OneProject, &FixedIds, &snapshots, "token")
        .fetch_projects()
        .unwrap();
    let fetched: ProjectsResponse = snapshots
        .get_latest(WS, &StoreKey::import(&ServiceId::from("basecamp"), PipeId::Projects))
        .unwrap()
        .expect("fetched");
    assert_eq!(fetched.projects[0].id, 42);
}
