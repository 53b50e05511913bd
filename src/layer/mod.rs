//! Layer Source
//!
//! A layer is one XML document contributing a partial tree. Layers are merged
//! in the order given; later layers override earlier ones.

pub mod merge;

pub use merge::{merge, merge_layers, MergedTree};

use crate::error::{ApiError, StorageError};
use crate::types::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const LAYER_SET_DOMAIN: &[u8] = b"layerfs.layers.v1";

/// Where a layer's document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerOrigin {
    File(PathBuf),
    Memory(String),
}

/// One contributing layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSource {
    id: String,
    origin: LayerOrigin,
}

/// Recorded identity of a layer at the time it was read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStamp {
    pub id: String,
    pub fingerprint: Fingerprint,
    pub len: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Layer document text plus its stamp
#[derive(Debug, Clone)]
pub struct LoadedLayer {
    pub text: String,
    pub stamp: SourceStamp,
}

impl LayerSource {
    /// Layer backed by a file. The identifier is the canonical path when the
    /// file exists, the given path otherwise.
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let resolved = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        LayerSource {
            id: resolved.display().to_string(),
            origin: LayerOrigin::File(resolved),
        }
    }

    /// Layer held in memory under a caller-chosen identifier
    pub fn memory(id: impl Into<String>, text: impl Into<String>) -> Self {
        LayerSource {
            id: id.into(),
            origin: LayerOrigin::Memory(text.into()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> &LayerOrigin {
        &self.origin
    }

    /// Directory that relative content URLs of this layer resolve against
    pub fn base_dir(&self) -> Option<&Path> {
        match &self.origin {
            LayerOrigin::File(path) => path.parent(),
            LayerOrigin::Memory(_) => None,
        }
    }

    /// Read the document and stamp it
    pub fn load(&self) -> Result<LoadedLayer, ApiError> {
        let (text, modified) = match &self.origin {
            LayerOrigin::File(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
                let modified = std::fs::metadata(path)
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from);
                (text, modified)
            }
            LayerOrigin::Memory(text) => (text.clone(), None),
        };
        let stamp = SourceStamp {
            id: self.id.clone(),
            fingerprint: fingerprint_bytes(&self.id, text.as_bytes()),
            len: text.len() as u64,
            modified,
        };
        Ok(LoadedLayer { text, stamp })
    }

    /// Current fingerprint of this layer
    pub fn fingerprint(&self) -> Result<Fingerprint, ApiError> {
        Ok(self.load()?.stamp.fingerprint)
    }
}

/// Fingerprint of a layer identifier and its document bytes
pub fn fingerprint_bytes(id: &str, bytes: &[u8]) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(id.len() as u64).to_le_bytes());
    hasher.update(id.as_bytes());
    hasher.update(bytes);
    *hasher.finalize().as_bytes()
}

/// Fingerprint of an empty layer list
pub fn empty_chain() -> Fingerprint {
    *blake3::hash(LAYER_SET_DOMAIN).as_bytes()
}

/// Extend a layer-list fingerprint by one more layer. Chaining keeps the
/// result order-sensitive and lets a merge be continued later.
pub fn chain(previous: &Fingerprint, next: &Fingerprint) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(LAYER_SET_DOMAIN);
    hasher.update(previous);
    hasher.update(next);
    *hasher.finalize().as_bytes()
}

/// Combined fingerprint of an ordered list of layer fingerprints
pub fn combined_fingerprint<'a>(layers: impl IntoIterator<Item = &'a Fingerprint>) -> Fingerprint {
    layers
        .into_iter()
        .fold(empty_chain(), |acc, fp| chain(&acc, fp))
}

/// Combined fingerprint of sources as they are on disk right now
pub fn current_fingerprint(sources: &[LayerSource]) -> Result<Fingerprint, ApiError> {
    let mut acc = empty_chain();
    for source in sources {
        acc = chain(&acc, &source.fingerprint()?);
    }
    Ok(acc)
}

/// Ordered set of layer sources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerSet {
    sources: Vec<LayerSource>,
}

impl LayerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Self {
        LayerSet {
            sources: paths.into_iter().map(LayerSource::file).collect(),
        }
    }

    /// Every `*.xml` file below `dir`, ordered by relative path
    pub fn discover(dir: &Path) -> Result<Self, ApiError> {
        let mut found = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk failed"));
                StorageError::io(path, source)
            })?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().map_or(false, |ext| ext == "xml") {
                found.push(path.to_path_buf());
            }
        }
        found.sort_by(|a, b| {
            let a = a.strip_prefix(dir).unwrap_or(a);
            let b = b.strip_prefix(dir).unwrap_or(b);
            a.cmp(b)
        });
        tracing::debug!(dir = %dir.display(), layers = found.len(), "Discovered layer files");
        Ok(Self::from_paths(found))
    }

    pub fn push(&mut self, source: LayerSource) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[LayerSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn fingerprint(&self) -> Result<Fingerprint, ApiError> {
        current_fingerprint(&self.sources)
    }
}

impl From<Vec<LayerSource>> for LayerSet {
    fn from(sources: Vec<LayerSource>) -> Self {
        LayerSet { sources }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_fingerprint_tracks_content_and_order() {
        let a = LayerSource::memory("a", "<filesystem/>");
        let b = LayerSource::memory("b", "<filesystem/>");
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let ab = current_fingerprint(&[a.clone(), b.clone()]).unwrap();
        let ba = current_fingerprint(&[b.clone(), a.clone()]).unwrap();
        assert_ne!(ab, ba);

        let a2 = LayerSource::memory("a", "<filesystem><folder name=\"x\"/></filesystem>");
        assert_ne!(a.fingerprint().unwrap(), a2.fingerprint().unwrap());
    }

    #[test]
    fn test_chain_matches_combined() {
        let fps = [[1u8; 32], [2u8; 32], [3u8; 32]];
        let whole = combined_fingerprint(fps.iter());
        let partial = combined_fingerprint(fps[..2].iter());
        assert_eq!(chain(&partial, &fps[2]), whole);
        assert_eq!(combined_fingerprint(std::iter::empty()), empty_chain());
    }

    #[test]
    fn test_file_source_stamp() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("layer.xml");
        fs::write(&path, "<filesystem/>").unwrap();
        let source = LayerSource::file(&path);
        let loaded = source.load().unwrap();
        assert_eq!(loaded.stamp.len, 13);
        assert!(loaded.stamp.modified.is_some());
        assert_eq!(source.base_dir(), Some(dunce::canonicalize(temp.path()).unwrap().as_path()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = tempfile::tempdir().unwrap();
        let source = LayerSource::file(temp.path().join("absent.xml"));
        assert!(source.load().unwrap_err().is_io());
    }

    #[test]
    fn test_discover_orders_by_relative_path() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("b")).unwrap();
        fs::write(temp.path().join("b/one.xml"), "<filesystem/>").unwrap();
        fs::write(temp.path().join("a.xml"), "<filesystem/>").unwrap();
        fs::write(temp.path().join("c.txt"), "ignored").unwrap();
        let set = LayerSet::discover(temp.path()).unwrap();
        let names: Vec<String> = set
            .sources()
            .iter()
            .map(|s| {
                Path::new(s.id())
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["a.xml", "one.xml"]);
    }
}
