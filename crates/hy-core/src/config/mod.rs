//! Configuration management for hydra

mod agent;
mod run;
pub mod serde_utils;

pub use agent::{AgentKind, AgentSpec, SyncSpec, DEFAULT_REMOTE_COMMAND};
pub use run::{RunConfig, StrandedPolicy};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for in a project
pub const CONFIG_FILE_NAME: &str = "hydra.toml";

/// Get the default per-user configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hydra")
}

/// Search for a configuration file.
///
/// Checks `<root>/hydra.toml`, then `<root>/config/hydra.toml`, then the
/// per-user configuration directory.
pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    [
        root.join(CONFIG_FILE_NAME),
        root.join("config").join(CONFIG_FILE_NAME),
        default_config_dir().join(CONFIG_FILE_NAME),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}
