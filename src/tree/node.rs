//! File and folder nodes

use super::attr::AttrValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Folder => "folder",
        }
    }
}

/// Content reference of a file node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    /// Bytes stored directly in the layer document
    Inline(Vec<u8>),
    /// URL resolved through the resource registry on demand
    Url(String),
}

impl Content {
    pub fn inline(text: impl Into<String>) -> Self {
        Content::Inline(text.into().into_bytes())
    }

    pub fn url(url: impl Into<String>) -> Self {
        Content::Url(url.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Body {
    /// Children keyed (and therefore ordered) by name
    Folder(BTreeMap<String, Node>),
    File(Option<Content>),
}

/// A file or folder in the virtual tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) attributes: BTreeMap<String, AttrValue>,
    pub(crate) body: Body,
}

impl Node {
    pub fn folder(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            attributes: BTreeMap::new(),
            body: Body::Folder(BTreeMap::new()),
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            attributes: BTreeMap::new(),
            body: Body::File(None),
        }
    }

    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        match kind {
            NodeKind::File => Node::file(name),
            NodeKind::Folder => Node::folder(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            Body::Folder(_) => NodeKind::Folder,
            Body::File(_) => NodeKind::File,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.body, Body::Folder(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self.body, Body::File(_))
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Attributes in key order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Children in name order; empty for files
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        let children = match &self.body {
            Body::Folder(children) => Some(children.values()),
            Body::File(_) => None,
        };
        children.into_iter().flatten()
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        match &self.body {
            Body::Folder(children) => children.get(name),
            Body::File(_) => None,
        }
    }

    pub fn child_count(&self) -> usize {
        match &self.body {
            Body::Folder(children) => children.len(),
            Body::File(_) => 0,
        }
    }

    pub fn content(&self) -> Option<&Content> {
        match &self.body {
            Body::File(content) => content.as_ref(),
            Body::Folder(_) => None,
        }
    }

    /// Number of nodes in this subtree, including this one
    pub fn subtree_len(&self) -> usize {
        1 + self.children().map(Node::subtree_len).sum::<usize>()
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut BTreeMap<String, Node>> {
        match &mut self.body {
            Body::Folder(children) => Some(children),
            Body::File(_) => None,
        }
    }

    pub(crate) fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children_mut().and_then(|children| children.get_mut(name))
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder-style content setter; ignored for folders
    pub fn with_content(mut self, content: Content) -> Self {
        if let Body::File(slot) = &mut self.body {
            *slot = normalize_content(Some(content));
        }
        self
    }
}

/// Empty inline content is the same as no content
pub(crate) fn normalize_content(content: Option<Content>) -> Option<Content> {
    match content {
        Some(Content::Inline(bytes)) if bytes.is_empty() => None,
        other => other,
    }
}
