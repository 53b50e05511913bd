//! MergeService: orchestrates sources, applies merge policy, deserializes to LayerFsConfig.

use crate::config::sources::{environment, global_file, workspace_file};
use crate::config::LayerFsConfig;
use config::{ConfigError, File};
use std::path::Path;

use super::merge_policy;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from workspace and standard sources.
    /// Precedence: global file (lowest) -> workspace file -> environment (highest).
    pub fn load(workspace_root: &Path) -> Result<LayerFsConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<LayerFsConfig, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let builder = merge_policy::builder_with_defaults()?;
        let builder = builder.add_source(File::from(path).required(true));
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn test_workspace_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("layerfs.toml"),
            r#"
[layers]
sources = ["a.xml", "b.xml"]

[session]
autosave = true

[cache]
enabled = false
"#,
        )
        .unwrap();

        let config = MergeService::load(temp.path()).unwrap();
        assert_eq!(
            config.layers.sources,
            vec![PathBuf::from("a.xml"), PathBuf::from("b.xml")]
        );
        assert!(config.session.autosave);
        assert!(!config.cache.enabled);
        assert_eq!(config.session.writable_layer, PathBuf::from("layerfs-user.xml"));
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let temp = tempfile::tempdir().unwrap();
        assert!(MergeService::load_from_file(&temp.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("custom.toml");
        fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        let config = MergeService::load_from_file(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.cache.enabled);
    }
}
