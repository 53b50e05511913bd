//! Layer merge
//!
//! Folds layer trees into an accumulator in list order. Folders union their
//! children by name, attributes are last-writer-wins per key, and a later
//! file's content replaces the earlier content only when it provides some.
//! A name that is a file in one layer and a folder in another is fatal.

use super::{chain, empty_chain, fingerprint_bytes, LayerSource, SourceStamp};
use crate::error::ApiError;
use crate::tree::node::Body;
use crate::tree::{path, Node, VirtualTree};
use crate::types::{Fingerprint, BASE_LAYER_ID};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Result of folding layers into one tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedTree {
    tree: VirtualTree,
    sources: Vec<SourceStamp>,
    fingerprint: Fingerprint,
    /// Layer that introduced each subtree or last supplied a file's content
    origins: BTreeMap<String, String>,
}

impl Default for MergedTree {
    fn default() -> Self {
        Self::empty()
    }
}

impl MergedTree {
    pub fn empty() -> Self {
        MergedTree {
            tree: VirtualTree::new(),
            sources: Vec::new(),
            fingerprint: empty_chain(),
            origins: BTreeMap::new(),
        }
    }

    /// Start from an existing tree. A non-empty base contributes to the
    /// fingerprint under the `<base>` identifier.
    pub fn from_base(base: VirtualTree) -> Self {
        let fingerprint = if base.is_empty() {
            empty_chain()
        } else {
            chain(
                &empty_chain(),
                &fingerprint_bytes(BASE_LAYER_ID, base.to_xml().as_bytes()),
            )
        };
        MergedTree {
            tree: base,
            sources: Vec::new(),
            fingerprint,
            origins: BTreeMap::new(),
        }
    }

    pub fn tree(&self) -> &VirtualTree {
        &self.tree
    }

    pub fn into_tree(self) -> VirtualTree {
        self.tree
    }

    /// Stamps of the contributing layers, in merge order
    pub fn sources(&self) -> &[SourceStamp] {
        &self.sources
    }

    pub fn layer_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id.as_str())
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Layer responsible for the node at `path`: the nearest recorded
    /// ancestor, or `<base>`
    pub fn origin(&self, node_path: &str) -> &str {
        nearest_origin(&self.origins, node_path.trim_matches('/'))
    }

    /// Load, parse and merge one more layer
    pub fn push(&mut self, source: &LayerSource) -> Result<(), ApiError> {
        let loaded = source.load()?;
        let layer = VirtualTree::from_xml(&loaded.text, source.id())?;
        self.push_parsed(loaded.stamp, layer)
    }

    /// Merge a layer that was read and parsed elsewhere
    pub fn push_parsed(&mut self, stamp: SourceStamp, layer: VirtualTree) -> Result<(), ApiError> {
        self.apply(&stamp.id, layer)?;
        self.fingerprint = chain(&self.fingerprint, &stamp.fingerprint);
        self.sources.push(stamp);
        Ok(())
    }

    /// Continue this merge with more layers
    pub fn extend(mut self, layers: &[LayerSource]) -> Result<Self, ApiError> {
        for source in layers {
            self.push(source)?;
        }
        Ok(self)
    }

    /// Merge an already parsed tree under `layer_id` without stamping it.
    /// On error the accumulator may be partially updated.
    pub fn apply(&mut self, layer_id: &str, layer: VirtualTree) -> Result<(), ApiError> {
        let incoming = layer.into_root();
        let mut ctx = MergeContext {
            layer_id,
            origins: &mut self.origins,
        };
        ctx.merge_node(self.tree.root_mut(), incoming, "")
    }
}

struct MergeContext<'a> {
    layer_id: &'a str,
    origins: &'a mut BTreeMap<String, String>,
}

impl MergeContext<'_> {
    fn merge_node(&mut self, acc: &mut Node, incoming: Node, at: &str) -> Result<(), ApiError> {
        acc.attributes.extend(incoming.attributes);
        match (&mut acc.body, incoming.body) {
            (Body::Folder(children), Body::Folder(incoming_children)) => {
                for (name, child) in incoming_children {
                    let child_path = path::join(at, &name);
                    match children.get_mut(&name) {
                        Some(existing) if existing.kind() != child.kind() => {
                            return Err(ApiError::LayerConflict {
                                earlier: self.earlier(&child_path),
                                later: self.layer_id.to_string(),
                                path: child_path,
                            });
                        }
                        Some(existing) => self.merge_node(existing, child, &child_path)?,
                        None => {
                            self.origins
                                .insert(child_path, self.layer_id.to_string());
                            children.insert(name, child);
                        }
                    }
                }
            }
            (Body::File(content), Body::File(incoming_content)) => {
                if incoming_content.is_some() {
                    *content = incoming_content;
                    self.origins.insert(at.to_string(), self.layer_id.to_string());
                }
            }
            _ => {
                return Err(ApiError::LayerConflict {
                    path: at.to_string(),
                    earlier: self.earlier(at),
                    later: self.layer_id.to_string(),
                })
            }
        }
        Ok(())
    }

    fn earlier(&self, at: &str) -> String {
        nearest_origin(self.origins, at).to_string()
    }
}

fn nearest_origin<'a>(origins: &'a BTreeMap<String, String>, at: &str) -> &'a str {
    let mut current = Some(at);
    while let Some(candidate) = current {
        if let Some(id) = origins.get(candidate) {
            return id;
        }
        current = path::parent(candidate);
    }
    BASE_LAYER_ID
}

/// Merge `layers` on top of `base` in order; later layers win
pub fn merge(base: VirtualTree, layers: &[LayerSource]) -> Result<MergedTree, ApiError> {
    let started = std::time::Instant::now();
    let mut merged = MergedTree::from_base(base);
    for source in layers {
        debug!(layer = source.id(), "Merging layer");
        merged.push(source)?;
    }
    info!(
        layers = layers.len(),
        nodes = merged.tree.node_count(),
        fingerprint = %hex::encode(&merged.fingerprint[..8]),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Merged layers"
    );
    Ok(merged)
}

/// Merge `layers` starting from an empty tree
pub fn merge_layers(layers: &[LayerSource]) -> Result<MergedTree, ApiError> {
    merge(VirtualTree::new(), layers)
}
