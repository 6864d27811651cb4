//! Identifiers and storage keys shared by every pipes crate.
//!
//! Keys are derived here and nowhere else so that a snapshot written by one
//! component is always found by another.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Internal workspace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceId(pub i64);

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for WorkspaceId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of an external service integration, e.g. `basecamp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub String);

impl ServiceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable name: the id with its first letter upper-cased.
    pub fn title(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Pipe identifiers
// ---------------------------------------------------------------------------

/// The entity types a service integration can synchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipeId {
    Users,
    Projects,
    TodoLists,
    Todos,
}

impl PipeId {
    pub const ALL: [PipeId; 4] = [
        PipeId::Users,
        PipeId::Projects,
        PipeId::TodoLists,
        PipeId::Todos,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipeId::Users => "users",
            PipeId::Projects => "projects",
            PipeId::TodoLists => "todolists",
            PipeId::Todos => "todos",
        }
    }

    /// Entity tag understood by the internal import API.
    ///
    /// Todo lists and todos both land as internal tasks.
    pub fn api_tag(self) -> &'static str {
        match self {
            PipeId::Users => "users",
            PipeId::Projects => "projects",
            PipeId::TodoLists | PipeId::Todos => "tasks",
        }
    }

    /// The pipe whose fetch+post cycle must complete before this one fetches.
    pub fn dependency(self) -> Option<PipeId> {
        match self {
            PipeId::TodoLists | PipeId::Todos => Some(PipeId::Projects),
            PipeId::Users | PipeId::Projects => None,
        }
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipeId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipeId::ALL
            .into_iter()
            .find(|pipe| pipe.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownPipe(s.to_owned()))
    }
}

/// `(service, pipe)` pair; displays as `service:pipe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipeKey {
    pub service: ServiceId,
    pub pipe: PipeId,
}

impl PipeKey {
    pub fn new(service: impl Into<ServiceId>, pipe: PipeId) -> Self {
        Self {
            service: service.into(),
            pipe,
        }
    }
}

impl fmt::Display for PipeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.pipe)
    }
}

// ---------------------------------------------------------------------------
// Store keys
// ---------------------------------------------------------------------------

/// Key of a snapshot row inside one workspace.
///
/// Imported entity data lives under `service:pipe`; the remaining keys use a
/// reserved middle segment so they never collide with a pipe id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreKey(String);

impl StoreKey {
    /// Raw fetched (and reconciled) entities of one pipe.
    pub fn import(service: &ServiceId, pipe: PipeId) -> Self {
        Self(format!("{service}:{pipe}"))
    }

    /// Service-level account list.
    pub fn accounts(service: &ServiceId) -> Self {
        Self(format!("{service}:accounts"))
    }

    /// Foreign → internal id document of one pipe.
    pub fn connection(service: &ServiceId, pipe: PipeId) -> Self {
        Self(format!("{service}:connections:{pipe}"))
    }

    /// Last run outcome of one pipe.
    pub fn status(service: &ServiceId, pipe: PipeId) -> Self {
        Self(format!("{service}:status:{pipe}"))
    }

    /// Per-workspace pipe settings.
    pub fn settings(service: &ServiceId, pipe: PipeId) -> Self {
        Self(format!("{service}:settings:{pipe}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
