//! Sync runtime: a job queue in front of the per-pipe pipeline.
//!
//! Jobs for one workspace are serialized; different workspaces sync
//! concurrently on the blocking pool. Integration listings load their three
//! datasets in parallel.

pub mod config;
mod error;
pub mod paths;
mod runtime;

pub use config::RunnerConfig;
pub use error::DaemonError;
pub use runtime::{
    init_tracing, start_blocking, Runtime, RuntimeHandle, Services, SourceFactory, SyncRequest,
    SyncSummary, SyncTarget,
};
