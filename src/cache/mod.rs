//! Cache Loader/Store
//!
//! Persists a merged tree with the fingerprint of the layers it was built
//! from, and reloads it without re-merging while that fingerprint still
//! matches the layers on disk.

pub mod record;

pub use record::{CacheRecord, FORMAT_VERSION};

use crate::error::{ApiError, StorageError};
use crate::layer::{combined_fingerprint, merge_layers, LayerSource, MergedTree};
use crate::store;
use crate::types::Fingerprint;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// How `load_or_merge` produced its tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Rebuilt { reason: String },
}

impl CacheOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheOutcome::Hit)
    }
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheOutcome::Hit => write!(f, "hit"),
            CacheOutcome::Rebuilt { reason } => write!(f, "rebuilt ({})", reason),
        }
    }
}

/// Read and decode the record at `path`. Every failure is a cache miss.
pub fn inspect(path: &Path) -> Result<CacheRecord, ApiError> {
    let bytes = match store::read_optional(path) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Err(StorageError::cache_miss(path, "no cache file").into()),
        Err(e) => return Err(StorageError::cache_miss(path, e.to_string()).into()),
    };
    CacheRecord::decode(&bytes).map_err(|reason| StorageError::cache_miss(path, reason).into())
}

/// Load the cached merged tree
pub fn load_cache(path: &Path) -> Result<MergedTree, ApiError> {
    let record = inspect(path)?;
    debug!(
        path = %path.display(),
        layers = record.sources().len(),
        created_at = %record.created_at,
        "Loaded cache record"
    );
    Ok(record.merged)
}

/// Persist `merged` atomically at `path`
pub fn store(merged: &MergedTree, path: &Path) -> Result<(), ApiError> {
    let record = CacheRecord::new(merged.clone());
    let bytes = record.encode().map_err(StorageError::Serialization)?;
    store::atomic_write(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "Stored cache record");
    Ok(())
}

/// True when a cache built with `cache_fingerprint` reflects layers that
/// currently have `current` fingerprints, in order
pub fn is_valid(cache_fingerprint: &Fingerprint, current: &[Fingerprint]) -> bool {
    combined_fingerprint(current.iter()) == *cache_fingerprint
}

/// Return the cached tree if it is still valid for `layers`, otherwise merge
/// the layers again and replace the cache.
pub fn load_or_merge(
    layers: &[LayerSource],
    path: &Path,
) -> Result<(MergedTree, CacheOutcome), ApiError> {
    let current = layers
        .iter()
        .map(LayerSource::fingerprint)
        .collect::<Result<Vec<_>, _>>()?;

    let reason = match load_cache(path) {
        Ok(cached) if is_valid(cached.fingerprint(), &current) => {
            info!(path = %path.display(), "Cache hit");
            return Ok((cached, CacheOutcome::Hit));
        }
        Ok(_) => "layer fingerprints changed".to_string(),
        Err(ApiError::Storage(StorageError::CacheMiss { reason, .. })) => reason,
        Err(e) => return Err(e),
    };

    info!(path = %path.display(), reason = %reason, "Cache miss, merging layers");
    let merged = merge_layers(layers)?;
    if let Err(e) = store(&merged, path) {
        warn!(path = %path.display(), error = %e, "Failed to store cache");
        return Err(e);
    }
    Ok((merged, CacheOutcome::Rebuilt { reason }))
}
