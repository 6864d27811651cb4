//! Error types for pipes-sync.

use std::path::PathBuf;

use thiserror::Error;

use pipes_core::{PipeId, StoreKey};

/// Failure of the durable store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot file name that is not a creation timestamp.
    #[error("corrupt snapshot entry at {path}")]
    CorruptEntry { path: PathBuf },

    #[error("store lock poisoned")]
    Poisoned,
}

/// The external service call failed (network, auth or format problem).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The internal import API rejected or failed a request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("import API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("import API unreachable: {0}")]
    Transport(String),
}

/// The authorization collaborator could not supply credentials.
#[derive(Debug, Error)]
#[error("authorization error: {0}")]
pub struct AuthorizationError(pub String);

/// Coarse classification used to decide whether an error is systemic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Source,
    Storage,
    Serialization,
    NotFound,
    Api,
    Authorization,
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// JSON serialization/deserialization error (snapshots, requests, imports).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data required to proceed was never stored.
    #[error("{pipe} not found in {key}")]
    NotFound { pipe: PipeId, key: StoreKey },

    /// The import API answered with an empty body.
    #[error("empty response from import API for {tag}")]
    EmptyResponse { tag: &'static str },

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Source(_) => ErrorKind::Source,
            SyncError::Store(_) => ErrorKind::Storage,
            SyncError::Json(_) => ErrorKind::Serialization,
            SyncError::NotFound { .. } => ErrorKind::NotFound,
            SyncError::EmptyResponse { .. } | SyncError::Api(_) => ErrorKind::Api,
            SyncError::Authorization(_) => ErrorKind::Authorization,
        }
    }

    /// Storage and serialization failures point at the system, not at a
    /// flaky external service.
    pub fn is_systemic(&self) -> bool {
        matches!(self.kind(), ErrorKind::Storage | ErrorKind::Serialization)
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
