//! In-memory collaborators for tests.
//!
//! Enabled for this crate's unit tests and, through the `testing` feature, for
//! downstream crates.

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use serde_json::{json, Map, Value};

use pipes_core::{Account, Project, ServiceId, StoreKey, Task, User, WorkspaceId, UNMAPPED};

use crate::error::{io_err, ApiError, AuthorizationError, SourceError, StoreError};
use crate::report::ErrorReporter;
use crate::source::{Authorizations, ExternalSource, InternalApi};
use crate::store::{MemoryStore, Store, StoredSnapshot};

// ---------------------------------------------------------------------------
// External source
// ---------------------------------------------------------------------------

/// Canned external service. Every call is recorded by name; a name passed to
/// [`FakeSource::failing`] fails with `"<name> unavailable"`.
#[derive(Debug)]
pub struct FakeSource {
    service: ServiceId,
    users: Vec<User>,
    projects: Vec<Project>,
    todo_lists: Vec<Task>,
    tasks: Vec<Task>,
    accounts: Vec<Account>,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeSource {
    pub fn new(service: impl Into<ServiceId>) -> Self {
        Self {
            service: service.into(),
            users: vec![],
            projects: vec![],
            todo_lists: vec![],
            tasks: vec![],
            accounts: vec![],
            failing: HashSet::new(),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn with_users(mut self, users: Vec<User>) -> Self {
        self.users = users;
        self
    }

    pub fn with_projects(mut self, projects: Vec<Project>) -> Self {
        self.projects = projects;
        self
    }

    pub fn with_todo_lists(mut self, todo_lists: Vec<Task>) -> Self {
        self.todo_lists = todo_lists;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_accounts(mut self, accounts: Vec<Account>) -> Self {
        self.accounts = accounts;
        self
    }

    /// `call` is one of `users`, `projects`, `todo_lists`, `tasks`, `accounts`.
    pub fn failing(mut self, call: &'static str) -> Self {
        self.failing.insert(call);
        self
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn answer<T: Clone>(&self, call: &'static str, data: &[T]) -> Result<Vec<T>, SourceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.failing.contains(call) {
            return Err(SourceError::new(format!("{call} unavailable")));
        }
        Ok(data.to_vec())
    }
}

impl ExternalSource for FakeSource {
    fn service_id(&self) -> ServiceId {
        self.service.clone()
    }

    fn users(&self) -> Result<Vec<User>, SourceError> {
        self.answer("users", &self.users)
    }

    fn projects(&self) -> Result<Vec<Project>, SourceError> {
        self.answer("projects", &self.projects)
    }

    fn todo_lists(&self) -> Result<Vec<Task>, SourceError> {
        self.answer("todo_lists", &self.todo_lists)
    }

    fn tasks(&self) -> Result<Vec<Task>, SourceError> {
        self.answer("tasks", &self.tasks)
    }

    fn accounts(&self) -> Result<Vec<Account>, SourceError> {
        self.answer("accounts", &self.accounts)
    }
}

// ---------------------------------------------------------------------------
// Import API
// ---------------------------------------------------------------------------

/// Import API that assigns internal ids and echoes the entities back.
///
/// Entities posted with an id keep it. Unmapped ones get the id registered
/// with [`FakeApi::with_id`] or the next one from a counter starting at 1000.
#[derive(Debug)]
pub struct FakeApi {
    ids: Mutex<HashMap<(String, i64), i64>>,
    next_id: AtomicI64,
    notifications: Vec<String>,
    failing: HashSet<String>,
    empty: HashSet<String>,
    posts: Mutex<Vec<(String, Value)>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            ids: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1000),
            notifications: vec![],
            failing: HashSet::new(),
            empty: HashSet::new(),
            posts: Mutex::new(vec![]),
        }
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(self, tag: &str, foreign_id: i64, id: i64) -> Self {
        if let Ok(mut ids) = self.ids.lock() {
            ids.insert((tag.to_string(), foreign_id), id);
        }
        self
    }

    pub fn with_notifications(mut self, notifications: Vec<String>) -> Self {
        self.notifications = notifications;
        self
    }

    /// Answer posts for `tag` with a 500.
    pub fn failing(mut self, tag: &str) -> Self {
        self.failing.insert(tag.to_string());
        self
    }

    /// Answer posts for `tag` with an empty body.
    pub fn empty_for(mut self, tag: &str) -> Self {
        self.empty.insert(tag.to_string());
        self
    }

    /// Payloads posted for `tag`, oldest first.
    pub fn posted(&self, tag: &str) -> Vec<Value> {
        self.posts
            .lock()
            .map(|posts| {
                posts
                    .iter()
                    .filter(|(t, _)| t == tag)
                    .map(|(_, payload)| payload.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn assign(&self, tag: &str, entity: &mut Value) {
        let current = entity["id"].as_i64().unwrap_or(UNMAPPED);
        if current != UNMAPPED {
            return;
        }
        let foreign_id = entity["foreign_id"].as_i64().unwrap_or(UNMAPPED);
        let id = match self.ids.lock() {
            Ok(mut ids) => *ids
                .entry((tag.to_string(), foreign_id))
                .or_insert_with(|| self.next_id.fetch_add(1, Ordering::SeqCst)),
            Err(_) => self.next_id.fetch_add(1, Ordering::SeqCst),
        };
        entity["id"] = json!(id);
    }
}

impl InternalApi for FakeApi {
    fn post_entities(&self, _token: &str, tag: &str, payload: &Value) -> Result<Vec<u8>, ApiError> {
        if let Ok(mut posts) = self.posts.lock() {
            posts.push((tag.to_string(), payload.clone()));
        }
        if self.failing.contains(tag) {
            return Err(ApiError::Status {
                status: 500,
                body: format!("{tag} import failed"),
            });
        }
        if self.empty.contains(tag) {
            return Ok(vec![]);
        }

        let body = if tag == "users" {
            let users: Vec<Value> = payload["emails"]
                .as_array()
                .map(|emails| {
                    emails
                        .iter()
                        .map(|email| json!({ "foreign_id": UNMAPPED, "email": email }))
                        .collect()
                })
                .unwrap_or_default();
            json!({ "users": users, "notifications": self.notifications })
        } else {
            let mut entities = payload[tag].as_array().cloned().unwrap_or_default();
            for entity in &mut entities {
                self.assign(tag, entity);
            }
            let mut body = Map::new();
            body.insert(tag.to_string(), Value::Array(entities));
            body.insert("notifications".to_string(), json!(self.notifications));
            Value::Object(body)
        };
        serde_json::to_vec(&body).map_err(|e| ApiError::Transport(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Authorizations
// ---------------------------------------------------------------------------

/// Every workspace gets the same token; authorization is per service.
#[derive(Debug, Default)]
pub struct FakeAuthorizations {
    authorized: HashMap<ServiceId, bool>,
    auth_urls: HashMap<ServiceId, String>,
    failing: bool,
}

impl FakeAuthorizations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authorize(mut self, service: impl Into<ServiceId>) -> Self {
        self.authorized.insert(service.into(), true);
        self
    }

    pub fn with_auth_url(mut self, service: impl Into<ServiceId>, url: impl Into<String>) -> Self {
        self.auth_urls.insert(service.into(), url.into());
        self
    }

    /// Fail every lookup.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn check(&self) -> Result<(), AuthorizationError> {
        if self.failing {
            return Err(AuthorizationError("authorization backend down".to_string()));
        }
        Ok(())
    }
}

impl Authorizations for FakeAuthorizations {
    fn workspace_token(
        &self,
        workspace: WorkspaceId,
        service: &ServiceId,
    ) -> Result<String, AuthorizationError> {
        self.check()?;
        Ok(format!("token-{workspace}-{service}"))
    }

    fn load_authorizations(
        &self,
        _workspace: WorkspaceId,
    ) -> Result<HashMap<ServiceId, bool>, AuthorizationError> {
        self.check()?;
        Ok(self.authorized.clone())
    }

    fn auth_url(&self, service: &ServiceId) -> Option<String> {
        self.auth_urls.get(service).cloned()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// [`MemoryStore`] whose appends fail with an I/O error while
/// [`FlakyStore::fail_appends`] is on. Reads and removals always work.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_appends: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl Store for FlakyStore {
    fn append(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
        data: &[u8],
    ) -> Result<DateTime<Utc>, StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(io_err(key.as_str(), io::Error::other("disk full")));
        }
        self.inner.append(workspace, key, data)
    }

    fn latest(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<Option<StoredSnapshot>, StoreError> {
        self.inner.latest(workspace, key)
    }

    fn history(
        &self,
        workspace: WorkspaceId,
        key: &StoreKey,
    ) -> Result<Vec<StoredSnapshot>, StoreError> {
        self.inner.history(workspace, key)
    }

    fn clear(&self, workspace: WorkspaceId, key: &StoreKey) -> Result<usize, StoreError> {
        self.inner.clear(workspace, key)
    }

    fn retain_latest(&self, workspace: WorkspaceId, key: &StoreKey) -> Result<usize, StoreError> {
        self.inner.retain_latest(workspace, key)
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Collects reported errors as strings.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reported: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn count(&self) -> usize {
        self.reported.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn messages(&self) -> Vec<String> {
        self.reported.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ErrorReporter for RecordingReporter {
    fn notify(&self, error: &(dyn Error + 'static)) {
        if let Ok(mut reported) = self.reported.lock() {
            reported.push(error.to_string());
        }
    }
}
