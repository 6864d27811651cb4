//! Documents stored as snapshots and exchanged with the import API.
//!
//! `*Response` documents are what a fetch stores: the entities gathered plus
//! the error that interrupted the fetch, if any. `*Request` documents are
//! posted to the import API and `*Import` documents are its answers.

use serde::{Deserialize, Serialize};

use pipes_core::{Account, Project, Task, User};

use crate::snapshot::ImportResponse;

macro_rules! import_response {
    ($name:ident, $field:ident, $entity:ty) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub error: Option<String>,
            #[serde(default)]
            pub $field: Vec<$entity>,
        }

        impl ImportResponse for $name {
            fn set_error(&mut self, message: String) {
                self.error = Some(message);
            }
        }
    };
}

import_response!(UsersResponse, users, User);
import_response!(ProjectsResponse, projects, Project);
import_response!(TasksResponse, tasks, Task);
import_response!(AccountsResponse, accounts, Account);

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsersRequest {
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectsRequest {
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TasksRequest {
    pub tasks: Vec<Task>,
}

// ---------------------------------------------------------------------------
// Import results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersImport {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub notifications: Vec<String>,
}

impl UsersImport {
    pub fn count(&self) -> usize {
        self.users.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectsImport {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub notifications: Vec<String>,
}

impl ProjectsImport {
    pub fn count(&self) -> usize {
        self.projects.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksImport {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub notifications: Vec<String>,
}

impl TasksImport {
    pub fn count(&self) -> usize {
        self.tasks.len()
    }
}
