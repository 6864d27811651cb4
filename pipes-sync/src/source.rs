//! Collaborator seams: the external service, the internal import API and the
//! authorization store. Concrete HTTP clients live outside this crate.

use std::collections::HashMap;

use pipes_core::{Account, Project, ServiceId, Task, User, WorkspaceId};

use crate::error::{ApiError, AuthorizationError, SourceError};

/// Read access to one external service on behalf of one workspace.
///
/// One implementation per service, chosen when a run starts.
pub trait ExternalSource: Send + Sync {
    fn service_id(&self) -> ServiceId;

    fn users(&self) -> Result<Vec<User>, SourceError>;
    fn projects(&self) -> Result<Vec<Project>, SourceError>;
    fn todo_lists(&self) -> Result<Vec<Task>, SourceError>;
    fn tasks(&self) -> Result<Vec<Task>, SourceError>;
    fn accounts(&self) -> Result<Vec<Account>, SourceError>;
}

/// The internal import API.
pub trait InternalApi: Send + Sync {
    /// Post `payload` for the entity `tag` and return the raw response body.
    fn post_entities(
        &self,
        token: &str,
        tag: &str,
        payload: &serde_json::Value,
    ) -> Result<Vec<u8>, ApiError>;
}

/// Per-workspace credentials and authorization state.
pub trait Authorizations: Send + Sync {
    /// Token used to call the import API for `workspace`.
    fn workspace_token(
        &self,
        workspace: WorkspaceId,
        service: &ServiceId,
    ) -> Result<String, AuthorizationError>;

    /// Which services `workspace` has authorized.
    fn load_authorizations(
        &self,
        workspace: WorkspaceId,
    ) -> Result<HashMap<ServiceId, bool>, AuthorizationError>;

    /// Where a user starts the authorization flow for `service`.
    fn auth_url(&self, service: &ServiceId) -> Option<String>;
}
