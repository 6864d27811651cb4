//! Per-pipe sync pipeline.
//!
//! Every pipe runs the same four stages, in order, without retries:
//!
//! 1. **Fetch** entities from the external source.
//! 2. **Reconcile** them against the stored connection map(s), attaching the
//!    internal ids of entities seen on an earlier run.
//! 3. **Snapshot** the response under the pipe's import key through a
//!    [`SnapshotGuard`](crate::snapshot::SnapshotGuard). Failed fetches are
//!    stored too, with their error; a failed write stops the pipe before it
//!    posts.
//! 4. **Post** the latest snapshot to the import API, rebuild the connection
//!    map from the returned ids and record the pipe status.
//!
//! Todo lists and todos depend on projects: their fetch stage first runs the
//! full project fetch+post cycle so the project map is current before task
//! project ids are resolved. Users are posted as e-mail invitations filtered by
//! a [`Selector`] and never get a connection map.
//!
//! A pipeline is cheap to build and borrows its collaborators; the caller must
//! make sure no two pipelines for the same workspace post concurrently.

use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;

use pipes_core::{PipeId, Selector, ServiceId, StoreKey, Task, WorkspaceId};

use crate::connection::ConnectionMap;
use crate::error::{SourceError, SyncError};
use crate::response::{
    AccountsResponse, ProjectsImport, ProjectsRequest, ProjectsResponse, TasksImport,
    TasksRequest, TasksResponse, UsersImport, UsersRequest, UsersResponse,
};
use crate::snapshot::{ImportResponse, SnapshotGuard, SnapshotStore};
use crate::source::{ExternalSource, InternalApi};
use crate::status::PipeStatus;

/// Sync pipeline for one workspace and one external service.
pub struct Pipeline<'a> {
    workspace: WorkspaceId,
    service: ServiceId,
    source: &'a dyn ExternalSource,
    api: &'a dyn InternalApi,
    snapshots: &'a SnapshotStore,
    token: String,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        workspace: WorkspaceId,
        source: &'a dyn ExternalSource,
        api: &'a dyn InternalApi,
        snapshots: &'a SnapshotStore,
        token: impl Into<String>,
    ) -> Self {
        Self {
            workspace,
            service: source.service_id(),
            source,
            api,
            snapshots,
            token: token.into(),
        }
    }

    pub fn workspace(&self) -> WorkspaceId {
        self.workspace
    }

    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    // -----------------------------------------------------------------------
    // Entry point
    // -----------------------------------------------------------------------

    /// Fetch then post `pipe`.
    ///
    /// On failure the pipe's status is recorded as an error and the error is
    /// returned, so the caller can skip anything that depends on this pipe.
    /// `selector` is only consulted for [`PipeId::Users`].
    pub fn run(&self, pipe: PipeId, selector: &Selector) -> Result<PipeStatus, SyncError> {
        let started = Instant::now();
        match self.cycle(pipe, selector) {
            Ok(status) => {
                tracing::info!(
                    "{}:{pipe} synced for workspace {} ({} objects, {} ms)",
                    self.service,
                    self.workspace,
                    status.object_count,
                    started.elapsed().as_millis()
                );
                Ok(status)
            }
            Err(err) => {
                tracing::warn!(
                    "{}:{pipe} aborted for workspace {}: {err}",
                    self.service,
                    self.workspace
                );
                let status = PipeStatus::fail(self.workspace, self.service.clone(), pipe, &err);
                if let Err(save_err) = status.save(self.snapshots) {
                    tracing::warn!("could not record failure of {pipe}: {save_err}");
                }
                Err(err)
            }
        }
    }

    fn cycle(&self, pipe: PipeId, selector: &Selector) -> Result<PipeStatus, SyncError> {
        match pipe {
            PipeId::Users => self.fetch_users().and_then(|()| self.post_users(selector)),
            PipeId::Projects => self.fetch_projects().and_then(|()| self.post_projects()),
            PipeId::TodoLists => self
                .fetch_todo_lists()
                .and_then(|()| self.post_todo_lists()),
            PipeId::Todos => self.fetch_todos().and_then(|()| self.post_todos()),
        }
    }

    // -----------------------------------------------------------------------
    // Accounts and resets
    // -----------------------------------------------------------------------

    /// Fetch the service's accounts and store them as the only accounts row.
    ///
    /// A source failure is stored in the document and also returned. Older
    /// rows are removed only after the new one is written.
    pub fn fetch_accounts(&self) -> Result<(), SyncError> {
        let key = StoreKey::accounts(&self.service);
        let mut response = AccountsResponse::default();
        let fetched = match self.source.accounts() {
            Ok(accounts) => {
                response.accounts = accounts;
                Ok(())
            }
            Err(err) => {
                let err = SyncError::from(err);
                response.set_error(err.to_string());
                Err(err)
            }
        };
        self.snapshots.put(self.workspace, &key, &response)?;
        self.snapshots.retain_latest(self.workspace, &key)?;
        fetched
    }

    /// Accounts stored by the last [`Pipeline::fetch_accounts`], if any.
    pub fn get_accounts(&self) -> Result<Option<AccountsResponse>, SyncError> {
        self.snapshots
            .get_latest(self.workspace, &StoreKey::accounts(&self.service))
    }

    /// Drop every stored import of `pipe`; connection maps are kept.
    pub fn clear_import(&self, pipe: PipeId) -> Result<usize, SyncError> {
        let removed = self
            .snapshots
            .clear(self.workspace, &StoreKey::import(&self.service, pipe))?;
        tracing::info!(
            "cleared {removed} {pipe} import(s) for workspace {}",
            self.workspace
        );
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Fetch + reconcile (snapshotted by the guard)
    // -----------------------------------------------------------------------

    pub fn fetch_users(&self) -> Result<(), SyncError> {
        let mut response = self.guard(PipeId::Users, UsersResponse::default());
        let users = self
            .source
            .users()
            .map_err(|e| response.fail(e.into()))?;
        response.users = users;
        tracing::debug!("fetched {} users", response.users.len());
        response.commit()
    }

    pub fn fetch_projects(&self) -> Result<(), SyncError> {
        let mut response = self.guard(PipeId::Projects, ProjectsResponse::default());
        let projects = self
            .source
            .projects()
            .map_err(|e| response.fail(e.into()))?;
        response.projects = projects;

        let connections = self
            .load_connections(PipeId::Projects)
            .map_err(|e| response.fail(e))?;
        for project in &mut response.projects {
            project.id = connections.resolve(project.foreign_id);
        }
        tracing::debug!(
            "fetched {} projects, {} already connected",
            response.projects.len(),
            connections.len()
        );
        response.commit()
    }

    pub fn fetch_todo_lists(&self) -> Result<(), SyncError> {
        self.fetch_tasks_for(PipeId::TodoLists, |source| source.todo_lists())
    }

    pub fn fetch_todos(&self) -> Result<(), SyncError> {
        self.fetch_tasks_for(PipeId::Todos, |source| source.tasks())
    }

    fn fetch_tasks_for(
        &self,
        pipe: PipeId,
        fetch: impl FnOnce(&dyn ExternalSource) -> Result<Vec<Task>, SourceError>,
    ) -> Result<(), SyncError> {
        let mut response = self.guard(pipe, TasksResponse::default());

        // Task project ids resolve through a project map that must be current.
        if let Some(dependency) = pipe.dependency() {
            self.cycle(dependency, &Selector::default())
                .map_err(|e| response.fail(e))?;
        }

        let tasks = fetch(self.source).map_err(|e| response.fail(e.into()))?;
        response.tasks = tasks;

        let project_connections = self
            .load_connections(PipeId::Projects)
            .map_err(|e| response.fail(e))?;
        let task_connections = self
            .load_connections(pipe)
            .map_err(|e| response.fail(e))?;
        for task in &mut response.tasks {
            task.id = task_connections.resolve(task.foreign_id);
            task.project_id = project_connections.resolve(task.foreign_project_id);
        }
        tracing::debug!("fetched {} {pipe}", response.tasks.len());
        response.commit()
    }

    // -----------------------------------------------------------------------
    // Post + correlate
    // -----------------------------------------------------------------------

    /// Invite the selected users by e-mail.
    pub fn post_users(&self, selector: &Selector) -> Result<PipeStatus, SyncError> {
        let response: UsersResponse = self.load_import(PipeId::Users)?;
        let emails: Vec<String> = selector
            .ids
            .iter()
            .flat_map(|id| response.users.iter().filter(move |user| user.foreign_id == *id))
            .map(|user| user.email.clone())
            .collect();

        let import: UsersImport = self.post(PipeId::Users, &UsersRequest { emails })?;
        let count = import.count();
        self.complete(PipeId::Users, import.notifications, count)
    }

    pub fn post_projects(&self) -> Result<PipeStatus, SyncError> {
        let response: ProjectsResponse = self.load_import(PipeId::Projects)?;
        let import: ProjectsImport = self.post(
            PipeId::Projects,
            &ProjectsRequest {
                projects: response.projects,
            },
        )?;

        let mut connections =
            ConnectionMap::new(self.workspace, self.service.clone(), PipeId::Projects);
        for project in &import.projects {
            connections.connect(project.foreign_id, project.id);
        }
        connections.save(self.snapshots)?;

        let count = import.count();
        self.complete(PipeId::Projects, import.notifications, count)
    }

    pub fn post_todo_lists(&self) -> Result<PipeStatus, SyncError> {
        self.post_tasks_for(PipeId::TodoLists)
    }

    pub fn post_todos(&self) -> Result<PipeStatus, SyncError> {
        self.post_tasks_for(PipeId::Todos)
    }

    fn post_tasks_for(&self, pipe: PipeId) -> Result<PipeStatus, SyncError> {
        let response: TasksResponse = self.load_import(pipe)?;
        let import: TasksImport = self.post(
            pipe,
            &TasksRequest {
                tasks: response.tasks,
            },
        )?;

        let mut connections = ConnectionMap::new(self.workspace, self.service.clone(), pipe);
        for task in &import.tasks {
            connections.connect(task.foreign_id, task.id);
        }
        connections.save(self.snapshots)?;

        let count = import.count();
        self.complete(pipe, import.notifications, count)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn guard<T: Serialize + ImportResponse>(
        &self,
        pipe: PipeId,
        response: T,
    ) -> SnapshotGuard<'a, T> {
        self.snapshots.guard(
            self.workspace,
            StoreKey::import(&self.service, pipe),
            response,
        )
    }

    fn load_connections(&self, pipe: PipeId) -> Result<ConnectionMap, SyncError> {
        ConnectionMap::load(self.snapshots, self.workspace, &self.service, pipe)
    }

    /// Latest import snapshot of `pipe`; posting without one is an error.
    fn load_import<T: DeserializeOwned>(&self, pipe: PipeId) -> Result<T, SyncError> {
        let key = StoreKey::import(&self.service, pipe);
        self.snapshots
            .get_latest(self.workspace, &key)?
            .ok_or_else(|| SyncError::NotFound { pipe, key })
    }

    fn post<Req: Serialize, Res: DeserializeOwned>(
        &self,
        pipe: PipeId,
        request: &Req,
    ) -> Result<Res, SyncError> {
        let tag = pipe.api_tag();
        let payload =
            serde_json::to_value(request).map_err(|e| self.snapshots.report(e.into()))?;
        let body = self.api.post_entities(&self.token, tag, &payload)?;
        if body.is_empty() {
            return Err(SyncError::EmptyResponse { tag });
        }
        serde_json::from_slice(&body).map_err(|e| self.snapshots.report(e.into()))
    }

    fn complete(
        &self,
        pipe: PipeId,
        notifications: Vec<String>,
        count: usize,
    ) -> Result<PipeStatus, SyncError> {
        let status = PipeStatus::complete(
            self.workspace,
            self.service.clone(),
            pipe,
            notifications,
            count,
        );
        status.save(self.snapshots)?;
        tracing::info!(
            "posted {count} {pipe} for workspace {}",
            self.workspace
        );
        Ok(status)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
