//! Writable layer exclusivity
//!
//! At most one live handle may own a writable layer path or a cache path.
//! The registry is an ordinary value shared through `Arc`; leases give their
//! path back on drop.

use crate::error::ApiError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    open: Mutex<HashSet<PathBuf>>,
}

/// Proof that a path is held; releases it when dropped
#[derive(Debug)]
pub struct SessionLease {
    registry: Arc<SessionRegistry>,
    path: PathBuf,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `path`. Fails with `HandleInUse` while another lease holds it.
    pub fn acquire(self: &Arc<Self>, path: &Path) -> Result<SessionLease, ApiError> {
        let key = canonical_key(path);
        let mut open = self.open.lock();
        if !open.insert(key.clone()) {
            return Err(ApiError::HandleInUse(key));
        }
        Ok(SessionLease {
            registry: Arc::clone(self),
            path: key,
        })
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.open.lock().contains(&canonical_key(path))
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }
}

impl SessionLease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.open.lock().remove(&self.path);
    }
}

/// Canonical form of a possibly nonexistent path: the deepest existing
/// ancestor is canonicalized and the rest appended
pub(crate) fn canonical_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = dunce::canonicalize(path) {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while let Some(parent) = existing.parent() {
        if let Some(name) = existing.file_name() {
            rest.push(name.to_os_string());
        }
        existing = parent;
        if let Ok(canonical) = dunce::canonicalize(existing) {
            return rest.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
    }
    absolute
}
