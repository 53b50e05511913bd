//! Resolve configured layer, writable layer and cache locations for a workspace.

use crate::config::{xdg, LayerFsConfig};
use crate::error::ApiError;
use crate::layer::{LayerSet, LayerSource};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Cache file name inside the default cache directory
pub const CACHE_FILE_NAME: &str = "merged.bin";

/// Concrete locations derived from a [`LayerFsConfig`]
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub workspace_root: PathBuf,
    /// Read-only base layers in merge order
    pub layers: LayerSet,
    pub writable_layer: PathBuf,
    pub cache: Option<PathBuf>,
}

fn under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

impl LayerFsConfig {
    /// Resolve paths against `workspace_root`. Discovered layers follow the
    /// explicit sources; the writable layer is never part of the base.
    pub fn resolve_paths(&self, workspace_root: &Path) -> Result<ResolvedPaths, ApiError> {
        let writable_layer = under(workspace_root, &self.session.writable_layer);
        let writable_id = LayerSource::file(&writable_layer).id().to_string();

        let mut seen = HashSet::new();
        seen.insert(writable_id);
        let mut layers = LayerSet::new();
        for source in &self.layers.sources {
            let source = LayerSource::file(under(workspace_root, source));
            if seen.insert(source.id().to_string()) {
                layers.push(source);
            }
        }
        if let Some(dir) = &self.layers.discover_dir {
            let discovered = LayerSet::discover(&under(workspace_root, dir))?;
            for source in discovered.sources() {
                if seen.insert(source.id().to_string()) {
                    layers.push(source.clone());
                }
            }
        }

        let cache = if !self.cache.enabled {
            None
        } else if let Some(path) = &self.cache.path {
            Some(under(workspace_root, path))
        } else {
            Some(xdg::workspace_cache_dir(workspace_root)?.join(CACHE_FILE_NAME))
        };

        Ok(ResolvedPaths {
            workspace_root: workspace_root.to_path_buf(),
            layers,
            writable_layer,
            cache,
        })
    }
}
