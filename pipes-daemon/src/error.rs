use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the sync runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog error: {0}")]
    Catalog(#[from] pipes_core::CatalogError),

    #[error("sync error: {0}")]
    Sync(#[from] pipes_sync::SyncError),

    #[error("store error: {0}")]
    Store(#[from] pipes_sync::StoreError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

impl DaemonError {
    /// The underlying sync error, if this is one.
    pub fn as_sync(&self) -> Option<&pipes_sync::SyncError> {
        match self {
            DaemonError::Sync(err) => Some(err),
            _ => None,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
