//! Static integration catalog.
//!
//! Describes which pipes each external service offers together with their
//! display metadata and premium / automatic flags. The built-in catalog is an
//! embedded YAML document; [`Catalog::load_at`] reads the same schema from disk.
//!
//! A catalog is immutable once loaded. Callers load it once at startup and
//! share it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::types::{PipeId, PipeKey, ServiceId};

const BUILTIN: &str = include_str!("catalog.yaml");

/// Catalog metadata for one pipe of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeEntry {
    pub id: PipeId,
    pub description: String,
    /// Whether the pipe may be run automatically by a scheduler.
    #[serde(default)]
    pub automatic: bool,
    #[serde(default)]
    pub premium: bool,
}

/// Catalog metadata for one external service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub id: ServiceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub link: String,
    pub image: String,
    pub auth_type: String,
    pub pipes: Vec<PipeEntry>,
}

impl ServiceEntry {
    /// Explicit name if configured, otherwise the title-cased service id.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.title())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    services: Vec<ServiceEntry>,
}

/// Immutable registry of services and pipes, indexed by `(service, pipe)`.
#[derive(Debug, Clone)]
pub struct Catalog {
    services: Vec<ServiceEntry>,
    index: BTreeMap<PipeKey, (usize, usize)>,
}

impl Catalog {
    /// Parse the catalog compiled into the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml(BUILTIN)
    }

    /// Parse a catalog document.
    pub fn from_yaml(contents: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(contents)?;
        Self::from_services(file.services)
    }

    /// Load a catalog override from `path`.
    ///
    /// Returns `CatalogError::Parse` (with the path) if the YAML is malformed.
    pub fn load_at(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CatalogFile =
            serde_yaml::from_str(&contents).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_services(file.services)
    }

    pub fn from_services(services: Vec<ServiceEntry>) -> Result<Self, CatalogError> {
        let mut index = BTreeMap::new();
        for (s, service) in services.iter().enumerate() {
            for (p, pipe) in service.pipes.iter().enumerate() {
                let key = PipeKey::new(service.id.clone(), pipe.id);
                if index.insert(key.clone(), (s, p)).is_some() {
                    return Err(CatalogError::Duplicate(key.to_string()));
                }
            }
        }
        Ok(Self { services, index })
    }

    pub fn services(&self) -> &[ServiceEntry] {
        &self.services
    }

    pub fn service(&self, id: &ServiceId) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| &s.id == id)
    }

    pub fn pipe(&self, service: &ServiceId, pipe: PipeId) -> Option<&PipeEntry> {
        let &(s, p) = self.index.get(&PipeKey::new(service.clone(), pipe))?;
        self.services.get(s)?.pipes.get(p)
    }

    /// Like [`Catalog::pipe`] but an unknown pair is an error.
    pub fn require_pipe(&self, service: &ServiceId, pipe: PipeId) -> Result<&PipeEntry, CatalogError> {
        if self.service(service).is_none() {
            return Err(CatalogError::UnknownService(service.0.clone()));
        }
        self.pipe(service, pipe)
            .ok_or_else(|| CatalogError::UnknownPipe(format!("{service}:{pipe}")))
    }

    /// Every `(service, pipe)` pair in catalog order.
    pub fn pipe_keys(&self) -> impl Iterator<Item = PipeKey> + '_ {
        self.services.iter().flat_map(|service| {
            service
                .pipes
                .iter()
                .map(move |pipe| PipeKey::new(service.id.clone(), pipe.id))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = Catalog::builtin().expect("builtin");
        let basecamp = catalog
            .service(&ServiceId::from("basecamp"))
            .expect("basecamp");
        assert_eq!(basecamp.display_name(), "Basecamp");
        assert_eq!(basecamp.auth_type, "oauth");
        let ids: Vec<PipeId> = basecamp.pipes.iter().map(|p| p.id).collect();
        assert_eq!(ids, PipeId::ALL.to_vec());
    }

    #[test]
    fn lookup_by_service_and_pipe() {
        let catalog = Catalog::builtin().expect("builtin");
        let service = ServiceId::from("basecamp");
        let users = catalog.pipe(&service, PipeId::Users).expect("users");
        assert!(!users.automatic);
        assert!(!users.premium);
        let todos = catalog.pipe(&service, PipeId::Todos).expect("todos");
        assert!(todos.automatic);
        assert!(todos.premium);
        assert!(catalog.pipe(&ServiceId::from("asana"), PipeId::Users).is_none());
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let yaml = r"
services:
  - id: basecamp
    link: l
    image: i
    auth_type: oauth
    pipes:
      - id: users
        description: a
      - id: users
        description: b
";
        let err = Catalog::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate(ref key) if key == "basecamp:users"));
    }

    #[test]
    fn require_pipe_distinguishes_service_and_pipe() {
        let yaml = r"
services:
  - id: basecamp
    link: l
    image: i
    auth_type: oauth
    pipes:
      - id: projects
        description: p
";
        let catalog = Catalog::from_yaml(yaml).expect("parse");
        assert!(matches!(
            catalog.require_pipe(&ServiceId::from("asana"), PipeId::Projects),
            Err(CatalogError::UnknownService(_))
        ));
        assert!(matches!(
            catalog.require_pipe(&ServiceId::from("basecamp"), PipeId::Users),
            Err(CatalogError::UnknownPipe(_))
        ));
        assert!(catalog
            .require_pipe(&ServiceId::from("basecamp"), PipeId::Projects)
            .is_ok());
    }
}
