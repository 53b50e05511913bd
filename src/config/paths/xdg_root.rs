//! XDG and platform directory helpers.

use crate::error::ApiError;
use std::path::{Component, Path, PathBuf};

const APP_NAME: &str = "layerfs";

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
pub fn config_home() -> Result<PathBuf, ApiError> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_config_home.is_empty() {
            return Ok(PathBuf::from(xdg_config_home));
        }
    }

    let home = std::env::var("HOME").map_err(|_| {
        ApiError::ConfigError(
            "Could not determine XDG config home directory (HOME not set)".to_string(),
        )
    })?;

    Ok(PathBuf::from(home).join(".config"))
}

/// `$XDG_CONFIG_HOME/layerfs/config.toml`
pub fn global_config_path() -> Result<PathBuf, ApiError> {
    Ok(config_home()?.join(APP_NAME).join("config.toml"))
}

/// Platform cache directory for layerfs
pub fn cache_home() -> Result<PathBuf, ApiError> {
    directories::ProjectDirs::from("", APP_NAME, APP_NAME)
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .ok_or_else(|| {
            ApiError::ConfigError("Could not determine platform cache directory".to_string())
        })
}

/// `base` extended with the workspace's canonical path as subdirectories
///
/// For example, `/home/user/projects/app` under `~/.cache/layerfs` becomes
/// `~/.cache/layerfs/home/user/projects/app`.
pub fn scoped_dir(base: &Path, workspace_root: &Path) -> Result<PathBuf, ApiError> {
    let canonical = dunce::canonicalize(workspace_root).map_err(|e| {
        ApiError::ConfigError(format!("Failed to canonicalize workspace path: {}", e))
    })?;

    let mut dir = base.to_path_buf();
    for component in canonical.components() {
        if let Component::Normal(name) = component {
            dir.push(name);
        }
    }
    Ok(dir)
}

/// Default cache directory for one workspace
pub fn workspace_cache_dir(workspace_root: &Path) -> Result<PathBuf, ApiError> {
    scoped_dir(&cache_home()?, workspace_root)
}
