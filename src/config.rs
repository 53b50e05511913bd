//! Configuration
//!
//! Layered with the `config` crate: built-in defaults, then the global file
//! (`$XDG_CONFIG_HOME/layerfs/config.toml`), then the workspace file
//! (`<root>/layerfs.toml`), then `LAYERFS__*` environment variables.

pub mod merge;
pub mod paths;
pub mod sources;
pub mod workspace;

pub use paths::xdg_root as xdg;
pub use workspace::storage_paths::ResolvedPaths;

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use merge::service::MergeService;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-workspace configuration file
pub const WORKSPACE_CONFIG_FILE: &str = "layerfs.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerFsConfig {
    #[serde(default)]
    pub layers: LayersConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which layer documents make up the base tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayersConfig {
    /// Layer files in merge order (relative to the workspace root)
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Directory scanned for `*.xml` layers, merged after `sources`
    #[serde(default)]
    pub discover_dir: Option<PathBuf>,
}

fn default_writable_layer() -> PathBuf {
    PathBuf::from("layerfs-user.xml")
}

/// Writable layer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_writable_layer")]
    pub writable_layer: PathBuf,

    #[serde(default)]
    pub autosave: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            writable_layer: default_writable_layer(),
            autosave: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Merged-tree cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache file; None means the platform cache directory
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            enabled: true,
        }
    }
}

impl LayerFsConfig {
    /// TOML form, as written by `layerfs init`
    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to encode config: {}", e)))
    }
}

/// Entry point for loading a workspace's configuration
pub struct ConfigLoader;

impl ConfigLoader {
    /// Layered load for `workspace_root`, or `explicit` plus the environment
    /// when a config file is named on the command line
    pub fn load(workspace_root: &Path, explicit: Option<&Path>) -> Result<LayerFsConfig, ApiError> {
        let config = match explicit {
            Some(path) => MergeService::load_from_file(path)?,
            None => MergeService::load(workspace_root)?,
        };
        tracing::debug!(
            workspace = %workspace_root.display(),
            explicit = explicit.is_some(),
            layers = config.layers.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }
}
