//! Resource resolution
//!
//! File nodes may reference their content by URL. A [`ResolverRegistry`]
//! maps URL schemes to [`ResourceResolver`]s; it is built explicitly and
//! handed to whoever needs to read content.

use crate::error::ApiError;
use crate::tree::Content;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scheme key used for URLs without a scheme
pub const RELATIVE_SCHEME: &str = "";

/// Turns a content URL into bytes
pub trait ResourceResolver: Send + Sync {
    /// `base` is the directory relative URLs are resolved against
    fn resolve(&self, url: &str, base: Option<&Path>) -> Result<Vec<u8>, ApiError>;
}

/// Resolves relative paths and `file:` URLs from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileResolver;

impl FileResolver {
    fn locate(url: &str, base: Option<&Path>) -> PathBuf {
        let raw = url
            .strip_prefix("file://")
            .or_else(|| url.strip_prefix("file:"))
            .unwrap_or(url);
        let path = Path::new(raw);
        match base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ResourceResolver for FileResolver {
    fn resolve(&self, url: &str, base: Option<&Path>) -> Result<Vec<u8>, ApiError> {
        let path = Self::locate(url, base);
        std::fs::read(&path).map_err(|e| ApiError::ResolveError {
            url: url.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
    }
}

/// Scheme-keyed resolver registry
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn ResourceResolver>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        f.debug_struct("ResolverRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in file resolver for `file:` and relative URLs
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let file: Arc<dyn ResourceResolver> = Arc::new(FileResolver);
        registry.register("file", file.clone());
        registry.register(RELATIVE_SCHEME, file);
        registry
    }

    /// Register (or replace) the resolver for `scheme`
    pub fn register(&mut self, scheme: &str, resolver: Arc<dyn ResourceResolver>) {
        self.resolvers.insert(scheme.to_ascii_lowercase(), resolver);
    }

    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Resolve a URL through the resolver registered for its scheme
    pub fn resolve(&self, url: &str, base: Option<&Path>) -> Result<Vec<u8>, ApiError> {
        let scheme = scheme_of(url);
        let resolver = self
            .resolvers
            .get(&scheme)
            .ok_or_else(|| ApiError::ResolveError {
                url: url.to_string(),
                reason: format!("no resolver registered for scheme {:?}", scheme),
            })?;
        resolver.resolve(url, base)
    }

    /// Bytes of a file node's content reference
    pub fn read_content(&self, content: &Content, base: Option<&Path>) -> Result<Vec<u8>, ApiError> {
        match content {
            Content::Inline(bytes) => Ok(bytes.clone()),
            Content::Url(url) => self.resolve(url, base),
        }
    }
}

/// Lowercased URL scheme, or empty for relative references. Single-letter
/// prefixes are Windows drive letters, not schemes.
pub fn scheme_of(url: &str) -> String {
    match url.find(':') {
        Some(idx) if idx > 1 => {
            let candidate = &url[..idx];
            let valid = candidate
                .chars()
                .next()
                .map_or(false, |c| c.is_ascii_alphabetic())
                && candidate
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if valid {
                candidate.to_ascii_lowercase()
            } else {
                RELATIVE_SCHEME.to_string()
            }
        }
        _ => RELATIVE_SCHEME.to_string(),
    }
}
