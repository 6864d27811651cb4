//! Pipes core library: identifiers, entities, the integration catalog and its errors.
//!
//! - [`types`]: newtypes, pipe ids and store keys
//! - [`entity`]: users, projects, tasks, accounts
//! - [`catalog`]: static service / pipe registry
//! - [`error`]: [`CatalogError`]

pub mod catalog;
pub mod entity;
pub mod error;
pub mod types;

pub use catalog::{Catalog, PipeEntry, ServiceEntry};
pub use entity::{Account, Project, Selector, Task, User, UNMAPPED};
pub use error::CatalogError;
pub use types::{PipeId, PipeKey, ServiceId, StoreKey, WorkspaceId};
