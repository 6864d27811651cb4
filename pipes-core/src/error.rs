//! Error types for pipes-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading or querying the integration catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying I/O failure while reading a catalog override file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The embedded catalog document is malformed.
    #[error("YAML error in built-in catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A catalog file on disk is malformed; includes the file path.
    #[error("failed to parse catalog at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The same `service:pipe` appears twice.
    #[error("duplicate catalog entry {0}")]
    Duplicate(String),

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("unknown pipe '{0}'; expected: users, projects, todolists, todos")]
    UnknownPipe(String),
}
