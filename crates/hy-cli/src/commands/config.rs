//! Locating and loading the run configuration

use std::path::Path;

use anyhow::{Context, Result};
use hy_core::config::{self, RunConfig};

/// Load the run configuration.
///
/// An explicit `path` must exist. Otherwise the project files under `root`
/// and the per-user directory are searched, falling back to the default
/// configuration with a warning.
pub fn load_run_config(path: Option<&Path>, root: &Path) -> Result<RunConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match config::find_config_file(root) {
            Some(found) => found,
            None => {
                tracing::warn!(
                    "No {} found, using one local agent with one executor",
                    config::CONFIG_FILE_NAME
                );
                return Ok(RunConfig::default());
            }
        },
    };

    tracing::debug!("Loading configuration from {}", path.display());
    let config: RunConfig = config::load_config(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}
