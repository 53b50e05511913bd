//! Resource path handling
//!
//! Paths are `/`-separated names relative to the filesystem root. The empty
//! string and `/` both denote the root.

use crate::error::ApiError;
use crate::xml::escape::first_invalid_char;

/// Validate a single node name
pub fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || first_invalid_char(name).is_some()
    {
        return Err(ApiError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Split a path into its components; the root yields no components
pub fn components(path: &str) -> Result<Vec<&str>, ApiError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let parts: Vec<&str> = trimmed.split('/').collect();
    for part in &parts {
        validate_name(part).map_err(|_| ApiError::InvalidPath(path.to_string()))?;
    }
    Ok(parts)
}

/// Canonical form of a path: no leading or trailing slash
pub fn normalize(path: &str) -> Result<String, ApiError> {
    Ok(components(path)?.join("/"))
}

/// Split a non-root path into (parent, name)
pub fn split_parent(path: &str) -> Result<(String, String), ApiError> {
    let mut parts = components(path)?;
    let name = parts
        .pop()
        .ok_or_else(|| ApiError::InvalidPath(format!("{:?} names the root", path)))?;
    Ok((parts.join("/"), name.to_string()))
}

/// Join a normalized parent path and a child name
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Parent of a normalized path, `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rfind('/').map(|idx| &path[..idx]).unwrap_or(""))
}
