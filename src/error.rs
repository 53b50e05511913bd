//! Error types
//!
//! `StorageError` covers the on-disk side (cache files, layer files, atomic
//! writes). `ApiError` is what every public operation returns.

use std::path::PathBuf;
use thiserror::Error;

/// Storage-level failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache miss for {path}: {reason}")]
    CacheMiss { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn cache_miss(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StorageError::CacheMiss {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// API-level errors returned by tree, merge, cache and session operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("A node named {path} already exists")]
    DuplicateName { path: String },

    #[error("Malformed layer document {source_id}: {reason}")]
    MalformedDocument { source_id: String, reason: String },

    #[error("Layer conflict at {path}: {earlier} and {later} disagree on file vs folder")]
    LayerConflict {
        path: String,
        earlier: String,
        later: String,
    },

    #[error("No such node: {0}")]
    NotFound(String),

    #[error("Not a folder: {0}")]
    NotAFolder(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Invalid node name: {0:?}")]
    InvalidName(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid attribute {name} on {path}: {reason}")]
    InvalidAttribute {
        path: String,
        name: String,
        reason: String,
    },

    #[error("Invalid content for {path}: {reason}")]
    InvalidContent { path: String, reason: String },

    #[error("Could not resolve {url}: {reason}")]
    ResolveError { url: String, reason: String },

    #[error("Layer {0} is already open in another handle")]
    HandleInUse(PathBuf),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub(crate) fn malformed(source_id: &str, reason: impl Into<String>) -> Self {
        ApiError::MalformedDocument {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the cache could not be used and a full merge is required
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, ApiError::Storage(StorageError::CacheMiss { .. }))
    }

    /// True when the failure came from the storage medium (retryable)
    pub fn is_io(&self) -> bool {
        matches!(self, ApiError::Storage(StorageError::Io { .. }))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
