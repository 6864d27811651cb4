use std::path::PathBuf;

use pipes_core::Catalog;

use crate::error::DaemonError;
use crate::paths::{catalog_override_path, imports_dir};

/// Settings for [`Runtime::start`](crate::Runtime::start).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Home directory holding `.pipes/`.
    pub home: PathBuf,
    /// Sync jobs that may wait before `sync` callers are held back.
    pub queue_capacity: usize,
}

impl RunnerConfig {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

    pub fn at(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn imports_dir(&self) -> PathBuf {
        imports_dir(&self.home)
    }

    /// The override catalog if one exists, the built-in one otherwise.
    pub fn load_catalog(&self) -> Result<Catalog, DaemonError> {
        let path = catalog_override_path(&self.home);
        if path.is_file() {
            tracing::info!(path = %path.display(), "using catalog override");
            return Ok(Catalog::load_at(&path)?);
        }
        Ok(Catalog::builtin()?)
    }
}

impl Default for RunnerConfig {
    /// Rooted at the current user's home directory, or the working directory
    /// when there is none.
    fn default() -> Self {
        Self::at(dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_catalog_without_override() {
        let home = TempDir::new().expect("home");
        let catalog = RunnerConfig::at(home.path()).load_catalog().expect("catalog");
        assert_eq!(catalog.services()[0].id.as_str(), "basecamp");
    }

    #[test]
    fn override_catalog_wins() {
        let home = TempDir::new().expect("home");
        let path = catalog_override_path(home.path());
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(
            &path,
            "services:\n  - id: trello\n    name: Trello\n    link: https://trello.example\n    image: /images/trello.png\n    auth_type: oauth\n    pipes:\n      - id: projects\n        description: Boards become projects.\n        automatic: true\n        premium: false\n",
        )
        .expect("write override");

        let config = RunnerConfig::at(home.path());
        let catalog = config.load_catalog().expect("catalog");
        assert_eq!(catalog.services().len(), 1);
        assert_eq!(catalog.services()[0].display_name(), "Trello");
        assert_eq!(config.queue_capacity, 64);
    }

    #[test]
    fn broken_override_is_an_error() {
        let home = TempDir::new().expect("home");
        let path = catalog_override_path(home.path());
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "services: [").expect("write override");

        let err = RunnerConfig::at(home.path()).load_catalog().unwrap_err();
        assert!(matches!(err, DaemonError::Catalog(_)));
    }

    #[test]
    fn default_config_lives_under_home() {
        let config = RunnerConfig::default();
        assert_eq!(config.queue_capacity, RunnerConfig::DEFAULT_QUEUE_CAPACITY);
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.imports_dir(), imports_dir(&home));
        }
    }
}
