//! Atomic file persistence
//!
//! Layer documents and cache records are written to a temporary file in the
//! destination directory, synced, then renamed over the target. Readers see
//! either the old file or the new one.

use crate::error::StorageError;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `bytes`, creating parent directories as needed
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| StorageError::io(parent, e))?;
    temp.write_all(bytes)
        .map_err(|e| StorageError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StorageError::io(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;

    tracing::trace!(path = %path.display(), bytes = bytes.len(), "Wrote file atomically");
    Ok(())
}

/// Read a file, mapping "not found" to `None`
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents_and_replaces() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/out.xml");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_atomic_write_into_file_parent_fails() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let err = atomic_write(&blocker.join("out.xml"), b"data").unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[test]
    fn test_read_optional() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent");
        assert_eq!(read_optional(&path).unwrap(), None);
        fs::write(&path, b"here").unwrap();
        assert_eq!(read_optional(&path).unwrap(), Some(b"here".to_vec()));
    }
}
