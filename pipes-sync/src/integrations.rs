//! Integration descriptors: the catalog joined with a workspace's state.
//!
//! Three datasets feed a descriptor: which services the workspace has
//! authorized, which pipes it has configured, and the latest status of each
//! pipe. They are independent, so the daemon loads them in parallel and hands
//! them to [`compose`]; [`workspace_integrations`] is the sequential form.

use std::collections::HashMap;

use serde::Serialize;

use pipes_core::{Catalog, PipeId, PipeKey, ServiceEntry, ServiceId, WorkspaceId};

use crate::error::SyncError;
use crate::snapshot::SnapshotStore;
use crate::source::Authorizations;
use crate::status::{load_pipe_settings, load_pipe_statuses, PipeSettings, PipeStatus};

/// One pipe as presented to a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pipe {
    pub workspace_id: WorkspaceId,
    pub service_id: ServiceId,
    pub pipe_id: PipeId,
    pub description: String,
    pub premium: bool,
    /// Whether the catalog lets this pipe run on a schedule at all.
    pub automatic_option: bool,
    /// Whether it actually does for this workspace.
    pub automatic: bool,
    /// False when the workspace never stored settings for the pipe.
    pub configured: bool,
    /// Latest run; `None` until the pipe has run once.
    pub status: Option<PipeStatus>,
}

/// One external service as presented to a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Integration {
    pub id: ServiceId,
    pub name: String,
    pub link: String,
    pub image: String,
    pub auth_type: String,
    pub auth_url: Option<String>,
    pub authorized: bool,
    pub pipes: Vec<Pipe>,
}

/// The per-workspace datasets an integration listing is built from.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceState {
    pub authorizations: HashMap<ServiceId, bool>,
    pub settings: HashMap<PipeKey, PipeSettings>,
    pub statuses: HashMap<PipeKey, PipeStatus>,
}

/// Build one descriptor per catalog service, pipes in catalog order.
///
/// Pipes with no stored settings are synthesized from the catalog defaults.
pub fn compose(
    catalog: &Catalog,
    workspace: WorkspaceId,
    authorizations: &dyn Authorizations,
    mut state: WorkspaceState,
) -> Vec<Integration> {
    catalog
        .services()
        .iter()
        .map(|service| compose_service(service, workspace, authorizations, &mut state))
        .collect()
}

fn compose_service(
    service: &ServiceEntry,
    workspace: WorkspaceId,
    authorizations: &dyn Authorizations,
    state: &mut WorkspaceState,
) -> Integration {
    let pipes = service
        .pipes
        .iter()
        .map(|entry| {
            let key = PipeKey::new(service.id.clone(), entry.id);
            let settings = state.settings.get(&key);
            Pipe {
                workspace_id: workspace,
                service_id: service.id.clone(),
                pipe_id: entry.id,
                description: entry.description.clone(),
                premium: entry.premium,
                automatic_option: entry.automatic,
                automatic: entry.automatic && settings.map_or(entry.automatic, |s| s.automatic),
                configured: settings.is_some(),
                status: state.statuses.remove(&key),
            }
        })
        .collect();

    Integration {
        id: service.id.clone(),
        name: service.display_name(),
        link: service.link.clone(),
        image: service.image.clone(),
        auth_type: service.auth_type.clone(),
        auth_url: authorizations.auth_url(&service.id),
        authorized: state
            .authorizations
            .get(&service.id)
            .copied()
            .unwrap_or(false),
        pipes,
    }
}

/// Load the three datasets one after another and compose them.
pub fn workspace_integrations(
    catalog: &Catalog,
    snapshots: &SnapshotStore,
    authorizations: &dyn Authorizations,
    workspace: WorkspaceId,
) -> Result<Vec<Integration>, SyncError> {
    let state = WorkspaceState {
        authorizations: authorizations.load_authorizations(workspace)?,
        settings: load_pipe_settings(snapshots, catalog, workspace)?,
        statuses: load_pipe_statuses(snapshots, catalog, workspace)?,
    };
    Ok(compose(catalog, workspace, authorizations, state))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use crate::testing::{FakeAuthorizations, RecordingReporter};

    const WS: WorkspaceId = WorkspaceId(9);

    fn snapshots() -> SnapshotStore {
        SnapshotStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingReporter::default()),
        )
    }

    fn basecamp() -> ServiceId {
        ServiceId::from("basecamp")
    }

    #[test]
    fn unstarted_workspace_gets_catalog_defaults() {
        let catalog = Catalog::builtin().unwrap();
        let auth = FakeAuthorizations::new();
        let integrations = workspace_integrations(&catalog, &snapshots(), &auth, WS).unwrap();

        assert_eq!(integrations.len(), 1);
        let basecamp = &integrations[0];
        assert_eq!(basecamp.name, "Basecamp");
        assert!(!basecamp.authorized);
        assert_eq!(basecamp.auth_url, None);

        let ids: Vec<PipeId> = basecamp.pipes.iter().map(|p| p.pipe_id).collect();
        assert_eq!(ids, PipeId::ALL.to_vec());
        for pipe in &basecamp.pipes {
            assert!(pipe.status.is_none());
            assert!(!pipe.configured);
            assert_eq!(pipe.automatic, pipe.automatic_option);
        }
    }

    #[test]
    fn composes_authorization_settings_and_status() {
        let catalog = Catalog::builtin().unwrap();
        let snapshots = snapshots();
        let auth = FakeAuthorizations::new()
            .authorize("basecamp")
            .with_auth_url("basecamp", "https://launchpad.example/authorize");

        PipeSettings { automatic: false }
            .save(&snapshots, WS, &basecamp(), PipeId::Projects)
            .unwrap();
        PipeSettings { automatic: true }
            .save(&snapshots, WS, &basecamp(), PipeId::Users)
            .unwrap();
        PipeStatus::complete(WS, basecamp(), PipeId::Todos, vec![], 4)
            .save(&snapshots)
            .unwrap();

        let integrations = workspace_integrations(&catalog, &snapshots, &auth, WS).unwrap();
        let basecamp = &integrations[0];
        assert!(basecamp.authorized);
        assert_eq!(
            basecamp.auth_url.as_deref(),
            Some("https://launchpad.example/authorize")
        );

        let pipe = |id: PipeId| basecamp.pipes.iter().find(|p| p.pipe_id == id).unwrap();
        assert!(!pipe(PipeId::Projects).automatic, "turned off by settings");
        assert!(pipe(PipeId::Projects).configured);
        assert!(!pipe(PipeId::Users).automatic, "catalog forbids it");
        assert_eq!(pipe(PipeId::Todos).status.as_ref().unwrap().object_count, 4);
        assert!(pipe(PipeId::Todos).premium);
        assert!(pipe(PipeId::TodoLists).status.is_none());
    }

    #[test]
    fn authorization_failure_propagates() {
        let catalog = Catalog::builtin().unwrap();
        let auth = FakeAuthorizations::new().failing();
        let err = workspace_integrations(&catalog, &snapshots(), &auth, WS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }
}
