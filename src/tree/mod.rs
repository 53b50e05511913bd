//! Virtual Node Store
//!
//! An in-memory tree of folders and files with typed attributes. Children are
//! kept ordered by name, so walking and serializing the tree is deterministic.

pub mod attr;
pub mod node;
pub mod path;

pub use attr::AttrValue;
pub use node::{Content, Node, NodeKind};

use crate::error::ApiError;
use crate::xml::escape::first_invalid_char;
use node::{normalize_content, Body};
use serde::{Deserialize, Serialize};

/// Rooted tree of nodes. The root is an unnamed folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualTree {
    root: Node,
}

impl Default for VirtualTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTree {
    /// Create an empty tree
    pub fn new() -> Self {
        VirtualTree {
            root: Node::folder(""),
        }
    }

    /// Wrap a root folder node
    pub fn from_root(root: Node) -> Result<Self, ApiError> {
        if !root.is_folder() {
            return Err(ApiError::NotAFolder("/".to_string()));
        }
        Ok(VirtualTree { root })
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn into_root(self) -> Node {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.child_count() == 0 && self.root.attributes.is_empty()
    }

    /// Number of nodes, not counting the root
    pub fn node_count(&self) -> usize {
        self.root.subtree_len() - 1
    }

    /// Look up a node by path
    pub fn find(&self, path: &str) -> Option<&Node> {
        let parts = path::components(path).ok()?;
        let mut node = &self.root;
        for part in parts {
            node = node.child(part)?;
        }
        Some(node)
    }

    fn find_mut(&mut self, path: &str) -> Result<&mut Node, ApiError> {
        let parts = path::components(path)?;
        let mut node = &mut self.root;
        for part in parts {
            node = node
                .child_mut(part)
                .ok_or_else(|| ApiError::NotFound(path.to_string()))?;
        }
        Ok(node)
    }

    fn require(&self, path: &str) -> Result<&Node, ApiError> {
        path::components(path)?;
        self.find(path)
            .ok_or_else(|| ApiError::NotFound(path.to_string()))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    pub fn is_folder(&self, path: &str) -> bool {
        self.find(path).map(Node::is_folder).unwrap_or(false)
    }

    /// Create a child of `parent`. Fails with `DuplicateName` if a sibling of
    /// that name exists; the tree is left unmodified on every error.
    pub fn create_child(
        &mut self,
        parent: &str,
        name: &str,
        kind: NodeKind,
    ) -> Result<&Node, ApiError> {
        path::validate_name(name)?;
        let parent_path = path::normalize(parent)?;
        let parent_node = self.find_mut(&parent_path)?;
        let children = parent_node
            .children_mut()
            .ok_or_else(|| ApiError::NotAFolder(parent_path.clone()))?;
        if children.contains_key(name) {
            return Err(ApiError::DuplicateName {
                path: path::join(&parent_path, name),
            });
        }
        Ok(children
            .entry(name.to_string())
            .or_insert_with(|| Node::new(name, kind)))
    }

    /// Create a folder at `path`; its parent must exist
    pub fn create_folder(&mut self, path: &str) -> Result<&Node, ApiError> {
        let (parent, name) = path::split_parent(path)?;
        self.create_child(&parent, &name, NodeKind::Folder)
    }

    /// Create an empty file at `path`; its parent must exist
    pub fn create_file(&mut self, path: &str) -> Result<&Node, ApiError> {
        let (parent, name) = path::split_parent(path)?;
        self.create_child(&parent, &name, NodeKind::File)
    }

    /// Create every missing folder along `path`. Existing folders are kept;
    /// a file in the way is `NotAFolder`.
    pub fn ensure_folders(&mut self, path: &str) -> Result<(), ApiError> {
        let parts = path::components(path)?;
        let mut current = String::new();
        for part in parts {
            let next = path::join(&current, part);
            match self.find(&next) {
                Some(node) if node.is_folder() => {}
                Some(_) => return Err(ApiError::NotAFolder(next)),
                None => {
                    self.create_child(&current, part, NodeKind::Folder)?;
                }
            }
            current = next;
        }
        Ok(())
    }

    /// Set (`Some`) or remove (`None`) an attribute. Returns the previous value.
    pub fn set_attribute(
        &mut self,
        path: &str,
        key: &str,
        value: Option<AttrValue>,
    ) -> Result<Option<AttrValue>, ApiError> {
        validate_attribute_name(path, key)?;
        if let Some(value) = &value {
            value.validate().map_err(|reason| ApiError::InvalidAttribute {
                path: path.to_string(),
                name: key.to_string(),
                reason,
            })?;
        }
        let node = self.find_mut(path)?;
        Ok(match value {
            Some(value) => node.attributes.insert(key.to_string(), value),
            None => node.attributes.remove(key),
        })
    }

    pub fn attribute(&self, path: &str, key: &str) -> Result<Option<&AttrValue>, ApiError> {
        Ok(self.require(path)?.attribute(key))
    }

    /// Attribute names of a node, sorted
    pub fn attribute_names(&self, path: &str) -> Result<Vec<&str>, ApiError> {
        Ok(self.require(path)?.attributes().map(|(k, _)| k).collect())
    }

    /// Children of a folder, ordered by name
    pub fn get_children(&self, path: &str) -> Result<Vec<&Node>, ApiError> {
        let node = self.require(path)?;
        if !node.is_folder() {
            return Err(ApiError::NotAFolder(path.to_string()));
        }
        Ok(node.children().collect())
    }

    /// Replace the content reference of a file
    pub fn set_content(&mut self, path: &str, content: Option<Content>) -> Result<(), ApiError> {
        let text = match &content {
            Some(Content::Inline(bytes)) => Some(std::str::from_utf8(bytes).map_err(|_| {
                ApiError::InvalidContent {
                    path: path.to_string(),
                    reason: "inline content must be UTF-8 text".to_string(),
                }
            })?),
            Some(Content::Url(url)) => Some(url.as_str()),
            None => None,
        };
        if let Some(c) = text.and_then(first_invalid_char) {
            return Err(ApiError::InvalidContent {
                path: path.to_string(),
                reason: format!("character {:?} cannot be stored in XML", c),
            });
        }
        let node = self.find_mut(path)?;
        match &mut node.body {
            Body::File(slot) => {
                *slot = normalize_content(content);
                Ok(())
            }
            Body::Folder(_) => Err(ApiError::NotAFile(path.to_string())),
        }
    }

    pub fn content(&self, path: &str) -> Result<Option<&Content>, ApiError> {
        let node = self.require(path)?;
        if !node.is_file() {
            return Err(ApiError::NotAFile(path.to_string()));
        }
        Ok(node.content())
    }

    /// Remove a node and its subtree
    pub fn delete(&mut self, path: &str) -> Result<Node, ApiError> {
        let (parent, name) = path::split_parent(path)?;
        let parent_node = self.find_mut(&parent)?;
        parent_node
            .children_mut()
            .and_then(|children| children.remove(&name))
            .ok_or_else(|| ApiError::NotFound(path.to_string()))
    }

    /// Rename a node within its folder
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), ApiError> {
        let (old_parent, old_name) = path::split_parent(old)?;
        let (new_parent, new_name) = path::split_parent(new)?;
        if old_parent != new_parent {
            return Err(ApiError::InvalidPath(format!(
                "cannot rename to a different folder: {} -> {}",
                old, new
            )));
        }
        if old_name == new_name {
            return self.require(old).map(|_| ());
        }
        let parent_node = self.find_mut(&old_parent)?;
        let children = parent_node
            .children_mut()
            .ok_or_else(|| ApiError::NotAFolder(old_parent.clone()))?;
        if children.contains_key(&new_name) {
            return Err(ApiError::DuplicateName {
                path: path::join(&new_parent, &new_name),
            });
        }
        let mut node = children
            .remove(&old_name)
            .ok_or_else(|| ApiError::NotFound(old.to_string()))?;
        node.name = new_name.clone();
        children.insert(new_name, node);
        Ok(())
    }

    /// Every node with its path, depth first in name order (root excluded)
    pub fn walk(&self) -> Vec<(String, &Node)> {
        let mut out = Vec::new();
        collect(&self.root, "", &mut out);
        out
    }

    /// Canonical XML form of this tree
    pub fn to_xml(&self) -> String {
        crate::xml::serialize(self)
    }

    /// Parse a layer document
    pub fn from_xml(text: &str, source_id: &str) -> Result<Self, ApiError> {
        crate::xml::deserialize(text, source_id)
    }
}

fn collect<'a>(node: &'a Node, prefix: &str, out: &mut Vec<(String, &'a Node)>) {
    for child in node.children() {
        let child_path = path::join(prefix, child.name());
        out.push((child_path.clone(), child));
        collect(child, &child_path, out);
    }
}

pub(crate) fn validate_attribute_name(path: &str, key: &str) -> Result<(), ApiError> {
    if key.is_empty() || key.contains('\\') || first_invalid_char(key).is_some() {
        return Err(ApiError::InvalidAttribute {
            path: path.to_string(),
            name: key.to_string(),
            reason: "attribute names must be non-empty XML text without a backslash".to_string(),
        });
    }
    Ok(())
}
