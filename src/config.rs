//! Resolves where the catalog database lives: an environment override
//! first, then a conventional project path, then a conventional install
//! path under the user's home directory.

use std::path::PathBuf;

const ENV_CATALOG_PATH: &str = "REGISTRY_PEEK_CATALOG_PATH";
const PROJECT_CATALOG_FILE: &str = "registry-peek.sqlite3";

/// Runtime settings resolved from the environment. CLI flags (see
/// `cmd::Cli`) may override the catalog path after construction.
#[derive(Debug, Clone)]
pub struct Settings {
    pub catalog_path: PathBuf,
}

impl Settings {
    pub fn resolve() -> Self {
        let catalog_path = std::env::var_os(ENV_CATALOG_PATH)
            .map(PathBuf::from)
            .or_else(project_catalog_path)
            .or_else(install_catalog_path)
            .unwrap_or_else(|| PathBuf::from(PROJECT_CATALOG_FILE));

        Self { catalog_path }
    }
}

fn project_catalog_path() -> Option<PathBuf> {
    let path = PathBuf::from(PROJECT_CATALOG_FILE);
    path.exists().then_some(path)
}

fn install_catalog_path() -> Option<PathBuf> {
    let home = home::home_dir()?;
    let path = home.join(".local/share/registry-peek/catalog.sqlite3");
    path.exists().then_some(path)
}
