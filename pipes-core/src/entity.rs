//! Entities exchanged with external services and the internal import API.
//!
//! Every entity carries the external service's `foreign_id`. The internal
//! `id` is [`UNMAPPED`] until a sync has correlated it.

use serde::{Deserialize, Serialize};

/// Internal id of an entity that has not been correlated yet.
pub const UNMAPPED: i64 = 0;

/// A person in the external service. Users are invited by e-mail, never
/// correlated by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub foreign_id: i64,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: i64,
    pub foreign_id: i64,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Project {
    pub fn new(foreign_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: UNMAPPED,
            foreign_id,
            name: name.into(),
            active: true,
        }
    }
}

/// A todo list or todo; both are imported as internal tasks under a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: i64,
    pub foreign_id: i64,
    pub name: String,
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub foreign_project_id: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Task {
    pub fn new(foreign_id: i64, foreign_project_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: UNMAPPED,
            foreign_id,
            name: name.into(),
            project_id: UNMAPPED,
            foreign_project_id,
            active: true,
        }
    }
}

/// An account the authorized external user can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
}

/// Foreign user ids chosen by the caller for a users import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(default)]
    pub ids: Vec<i64>,
}

impl Selector {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }
}

fn default_active() -> bool {
    true
}
