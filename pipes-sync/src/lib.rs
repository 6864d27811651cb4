//! # pipes-sync
//!
//! Snapshot storage and the per-pipe sync pipeline.
//!
//! Build a [`SnapshotStore`] over a [`Store`] (files under the imports
//! directory, or memory in tests), then run a [`Pipeline`] per workspace and
//! service. [`workspace_integrations`] turns the stored state into integration
//! descriptors.

pub mod connection;
pub mod error;
pub mod integrations;
pub mod pipeline;
pub mod report;
pub mod response;
pub mod snapshot;
pub mod source;
pub mod status;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use connection::ConnectionMap;
pub use error::{ApiError, AuthorizationError, ErrorKind, SourceError, StoreError, SyncError};
pub use integrations::{compose, workspace_integrations, Integration, Pipe, WorkspaceState};
pub use pipeline::Pipeline;
pub use report::{ErrorReporter, LogReporter};
pub use snapshot::SnapshotStore;
pub use source::{Authorizations, ExternalSource, InternalApi};
pub use status::{load_pipe_settings, load_pipe_statuses, Outcome, PipeSettings, PipeStatus};
pub use store::{FsStore, MemoryStore, Store, StoredSnapshot};
