use std::collections::HashMap;
use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use pipes_core::{
    Catalog, CatalogError, PipeId, PipeKey, Selector, ServiceId, StoreKey, WorkspaceId,
};
use pipes_sync::{
    compose, load_pipe_settings, load_pipe_statuses, Authorizations, ErrorReporter,
    ExternalSource, FsStore, Integration, InternalApi, LogReporter, PipeStatus, Pipeline,
    SnapshotStore, Store, SyncError, WorkspaceState,
};

use crate::config::RunnerConfig;
use crate::error::{io_err, DaemonError};

/// Builds the client for one external service on behalf of one workspace.
pub trait SourceFactory: Send + Sync {
    fn source(
        &self,
        workspace: WorkspaceId,
        service: &ServiceId,
        token: &str,
    ) -> Result<Box<dyn ExternalSource>, SyncError>;
}

/// Collaborators the runtime calls into.
#[derive(Clone)]
pub struct Services {
    pub api: Arc<dyn InternalApi>,
    pub authorizations: Arc<dyn Authorizations>,
    pub sources: Arc<dyn SourceFactory>,
    pub reporter: Arc<dyn ErrorReporter>,
}

impl Services {
    /// Errors are reported to the log unless [`Services::with_reporter`] says otherwise.
    pub fn new(
        api: Arc<dyn InternalApi>,
        authorizations: Arc<dyn Authorizations>,
        sources: Arc<dyn SourceFactory>,
    ) -> Self {
        Self {
            api,
            authorizations,
            sources,
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    /// Fetch then post one pipe.
    Pipe { pipe: PipeId, selector: Selector },
    /// Refresh the stored account list.
    Accounts,
    /// Drop the stored imports of one pipe.
    Reset(PipeId),
}

impl SyncTarget {
    fn label(&self) -> String {
        match self {
            SyncTarget::Pipe { pipe, .. } => pipe.to_string(),
            SyncTarget::Accounts => "accounts".to_string(),
            SyncTarget::Reset(pipe) => format!("reset {pipe}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub workspace: WorkspaceId,
    pub service: ServiceId,
    pub target: SyncTarget,
}

impl SyncRequest {
    pub fn pipe(workspace: WorkspaceId, service: impl Into<ServiceId>, pipe: PipeId) -> Self {
        Self {
            workspace,
            service: service.into(),
            target: SyncTarget::Pipe {
                pipe,
                selector: Selector::default(),
            },
        }
    }

    /// Users import limited to the foreign user ids in `selector`.
    pub fn users(
        workspace: WorkspaceId,
        service: impl Into<ServiceId>,
        selector: Selector,
    ) -> Self {
        Self {
            workspace,
            service: service.into(),
            target: SyncTarget::Pipe {
                pipe: PipeId::Users,
                selector,
            },
        }
    }

    pub fn accounts(workspace: WorkspaceId, service: impl Into<ServiceId>) -> Self {
        Self {
            workspace,
            service: service.into(),
            target: SyncTarget::Accounts,
        }
    }

    pub fn reset(workspace: WorkspaceId, service: impl Into<ServiceId>, pipe: PipeId) -> Self {
        Self {
            workspace,
            service: service.into(),
            target: SyncTarget::Reset(pipe),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub workspace_id: WorkspaceId,
    pub service_id: ServiceId,
    pub target: String,
    pub object_count: usize,
    pub notifications: Vec<String>,
    pub message: String,
    pub duration_ms: u128,
}

struct SyncJob {
    request: SyncRequest,
    respond_to: oneshot::Sender<Result<SyncSummary, DaemonError>>,
}

struct Shared {
    catalog: Catalog,
    snapshots: SnapshotStore,
    services: Services,
    // One async lock per workspace with a job queued or running.
    workspace_locks: Mutex<HashMap<WorkspaceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Shared {
    fn workspace_lock(&self, workspace: WorkspaceId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .workspace_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(workspace).or_default().clone()
    }

    /// Forget the workspace's lock once no job holds or awaits it.
    fn release_lock(&self, workspace: WorkspaceId) {
        let mut locks = self
            .workspace_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&workspace)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&workspace);
        }
    }
}

/// Cloneable entry point for submitting work to a running [`Runtime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<Shared>,
    jobs: mpsc::Sender<SyncJob>,
}

impl RuntimeHandle {
    pub fn catalog(&self) -> &Catalog {
        &self.shared.catalog
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.shared.snapshots
    }

    /// Queue `request` and wait for its outcome.
    ///
    /// Requests for one workspace never overlap, but no order among them is
    /// guaranteed; different workspaces run concurrently.
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncSummary, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(SyncJob {
                request,
                respond_to: tx,
            })
            .await
            .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

        rx.await
            .map_err(|_| DaemonError::ChannelClosed("sync response"))?
    }

    /// Integration descriptors for `workspace`.
    ///
    /// Authorizations, pipe settings and pipe statuses are loaded in parallel;
    /// the first failure wins.
    pub async fn integrations(
        &self,
        workspace: WorkspaceId,
    ) -> Result<Vec<Integration>, DaemonError> {
        let authorizations = {
            let shared = self.shared.clone();
            blocking("authorizations", move || {
                shared
                    .services
                    .authorizations
                    .load_authorizations(workspace)
                    .map_err(SyncError::from)
            })
        };
        let settings = {
            let shared = self.shared.clone();
            blocking("pipe settings", move || {
                load_pipe_settings(&shared.snapshots, &shared.catalog, workspace)
            })
        };
        let statuses = {
            let shared = self.shared.clone();
            blocking("pipe statuses", move || {
                load_pipe_statuses(&shared.snapshots, &shared.catalog, workspace)
            })
        };

        let (authorizations, settings, statuses) =
            tokio::try_join!(authorizations, settings, statuses)?;

        Ok(compose(
            &self.shared.catalog,
            workspace,
            self.shared.services.authorizations.as_ref(),
            WorkspaceState {
                authorizations,
                settings,
                statuses,
            },
        ))
    }

    /// Latest status of every pipe that has run in `workspace`.
    pub async fn statuses(
        &self,
        workspace: WorkspaceId,
    ) -> Result<HashMap<PipeKey, PipeStatus>, DaemonError> {
        let shared = self.shared.clone();
        blocking("pipe statuses", move || {
            load_pipe_statuses(&shared.snapshots, &shared.catalog, workspace)
        })
        .await
    }
}

/// The sync runtime: a job queue and the processor draining it.
pub struct Runtime {
    handle: RuntimeHandle,
    shutdown: broadcast::Sender<()>,
    processor: JoinHandle<()>,
}

impl Runtime {
    /// Open the file store under the configured home and start processing.
    pub async fn start(config: RunnerConfig, services: Services) -> Result<Self, DaemonError> {
        let catalog = config.load_catalog()?;
        let imports = config.imports_dir();
        let store = tokio::task::spawn_blocking(move || FsStore::open(imports))
            .await
            .map_err(|err| join_error("store open", err))??;
        tracing::info!(root = %store.root().display(), "snapshot store opened");
        Ok(Self::with_store(
            catalog,
            Arc::new(store),
            services,
            config.queue_capacity,
        ))
    }

    /// Start over an already opened store. Must be called within a tokio runtime.
    pub fn with_store(
        catalog: Catalog,
        store: Arc<dyn Store>,
        services: Services,
        queue_capacity: usize,
    ) -> Self {
        let shared = Arc::new(Shared {
            catalog,
            snapshots: SnapshotStore::new(store, services.reporter.clone()),
            services,
            workspace_locks: Mutex::new(HashMap::new()),
        });

        let (jobs_tx, jobs_rx) = mpsc::channel::<SyncJob>(queue_capacity.max(1));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let processor = tokio::spawn(sync_processor_task(
            shared.clone(),
            jobs_rx,
            shutdown_tx.subscribe(),
        ));

        Self {
            handle: RuntimeHandle {
                shared,
                jobs: jobs_tx,
            },
            shutdown: shutdown_tx,
            processor,
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Stop accepting jobs, finish the queued ones and wait for the processor.
    pub async fn shutdown(self) -> Result<(), DaemonError> {
        let _ = self.shutdown.send(());
        self.processor
            .await
            .map_err(|err| join_error("sync_processor", err))
    }
}

impl Deref for Runtime {
    type Target = RuntimeHandle;

    fn deref(&self) -> &RuntimeHandle {
        &self.handle
    }
}

/// Initialise tracing, start a runtime on a fresh multi-thread tokio runtime
/// and drive `body` with its handle, then shut down.
pub fn start_blocking<F, Fut, T>(
    config: RunnerConfig,
    services: Services,
    body: F,
) -> Result<T, DaemonError>
where
    F: FnOnce(RuntimeHandle) -> Fut,
    Fut: Future<Output = T>,
{
    init_tracing();
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    tokio_runtime.block_on(async move {
        let runtime = Runtime::start(config, services).await?;
        let output = body(runtime.handle()).await;
        runtime.shutdown().await?;
        Ok(output)
    })
}

async fn sync_processor_task(
    shared: Arc<Shared>,
    mut jobs: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = jobs.recv() => {
                let Some(job) = maybe_job else { break };
                in_flight.spawn(dispatch(shared.clone(), job));
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_join(joined);
            }
        }
    }

    // Drain: nothing new is accepted, everything already queued still runs.
    jobs.close();
    while let Some(job) = jobs.recv().await {
        in_flight.spawn(dispatch(shared.clone(), job));
    }
    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }
    tracing::info!("sync processor stopped");
}

async fn dispatch(shared: Arc<Shared>, job: SyncJob) {
    let SyncJob {
        request,
        respond_to,
    } = job;
    let workspace = request.workspace;
    let held = shared.workspace_lock(workspace).lock_owned().await;

    let outcome = {
        let shared = shared.clone();
        tokio::task::spawn_blocking(move || run_job(&shared, request))
            .await
            .map_err(|err| join_error("sync", err))
            .and_then(|result| result)
    };
    drop(held);
    shared.release_lock(workspace);

    match &outcome {
        Ok(summary) => tracing::info!(
            workspace = %workspace,
            service = %summary.service_id,
            target = %summary.target,
            objects = summary.object_count,
            duration_ms = summary.duration_ms,
            "sync completed",
        ),
        Err(err) => tracing::warn!(workspace = %workspace, error = %err, "sync failed"),
    }

    let _ = respond_to.send(outcome);
}

fn run_job(shared: &Shared, request: SyncRequest) -> Result<SyncSummary, DaemonError> {
    let started = Instant::now();
    let SyncRequest {
        workspace,
        service,
        target,
    } = request;

    match &target {
        SyncTarget::Pipe { pipe, .. } | SyncTarget::Reset(pipe) => {
            shared.catalog.require_pipe(&service, *pipe)?;
        }
        SyncTarget::Accounts => {
            if shared.catalog.service(&service).is_none() {
                return Err(CatalogError::UnknownService(service.0.clone()).into());
            }
        }
    }

    let (object_count, notifications, message) = match &target {
        // Only stored rows are touched, so no credentials are needed.
        SyncTarget::Reset(pipe) => {
            let removed = shared
                .snapshots
                .clear(workspace, &StoreKey::import(&service, *pipe))?;
            (removed, vec![], format!("{removed} {pipe} imports cleared"))
        }
        SyncTarget::Pipe { pipe, selector } => {
            with_pipeline(shared, workspace, &service, |pipeline| {
                let status = pipeline.run(*pipe, selector)?;
                Ok((status.object_count, status.notifications, status.message))
            })?
        }
        SyncTarget::Accounts => with_pipeline(shared, workspace, &service, |pipeline| {
            pipeline.fetch_accounts()?;
            let count = pipeline
                .get_accounts()?
                .map_or(0, |response| response.accounts.len());
            Ok((count, vec![], format!("{count} accounts fetched")))
        })?,
    };

    Ok(SyncSummary {
        workspace_id: workspace,
        service_id: service,
        target: target.label(),
        object_count,
        notifications,
        message,
        duration_ms: started.elapsed().as_millis(),
    })
}

/// Resolve the workspace's token and source, then hand a pipeline to `f`.
fn with_pipeline<T>(
    shared: &Shared,
    workspace: WorkspaceId,
    service: &ServiceId,
    f: impl FnOnce(&Pipeline<'_>) -> Result<T, SyncError>,
) -> Result<T, DaemonError> {
    let token = shared
        .services
        .authorizations
        .workspace_token(workspace, service)
        .map_err(SyncError::from)?;
    let source = shared.services.sources.source(workspace, service, &token)?;
    let pipeline = Pipeline::new(
        workspace,
        source.as_ref(),
        shared.services.api.as_ref(),
        &shared.snapshots,
        token,
    );
    Ok(f(&pipeline)?)
}

async fn blocking<T, E, F>(task: &'static str, f: F) -> Result<T, DaemonError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<DaemonError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| join_error(task, err))?
        .map_err(Into::into)
}

fn join_error(task: &'static str, err: JoinError) -> DaemonError {
    DaemonError::Join {
        task,
        message: err.to_string(),
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        tracing::error!(error = %err, "sync job task failed");
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`), JSON
/// lines when `PIPES_LOG_FORMAT=json`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PIPES_LOG_FORMAT").is_ok_and(|format| format == "json");
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}
