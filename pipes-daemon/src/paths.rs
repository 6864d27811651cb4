//! On-disk layout under the user's home directory.
//!
//! Every function takes an explicit `home`;
//! [`RunnerConfig::default`](crate::RunnerConfig) resolves it with
//! `dirs::home_dir()`.

use std::path::{Path, PathBuf};

pub const PIPES_DIR: &str = ".pipes";
pub const IMPORTS_DIR: &str = "imports";
pub const CATALOG_OVERRIDE: &str = "catalog.yaml";

pub fn pipes_root(home: &Path) -> PathBuf {
    home.join(PIPES_DIR)
}

/// Root of the snapshot store.
pub fn imports_dir(home: &Path) -> PathBuf {
    pipes_root(home).join(IMPORTS_DIR)
}

/// Optional catalog replacing the built-in one when present.
pub fn catalog_override_path(home: &Path) -> PathBuf {
    pipes_root(home).join(CATALOG_OVERRIDE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_in_dot_pipes() {
        let home = Path::new("/home/ada");
        assert_eq!(imports_dir(home), PathBuf::from("/home/ada/.pipes/imports"));
        assert_eq!(
            catalog_override_path(home),
            PathBuf::from("/home/ada/.pipes/catalog.yaml")
        );
    }
}
