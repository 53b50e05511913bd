//! Handle/Session
//!
//! A [`Handle`] edits one writable layer on top of a merged base. Edits go
//! to the in-memory overlay and are checked against the working view (base
//! plus overlay). Nodes that come from the base can gain attributes and
//! content but cannot be deleted or renamed through the overlay.

pub mod registry;

pub use registry::{SessionLease, SessionRegistry};

use crate::cache;
use crate::error::ApiError;
use crate::events::{EventBus, TreeEvent};
use crate::layer::{fingerprint_bytes, MergedTree, SourceStamp};
use crate::store;
use crate::tree::{path as tree_path, AttrValue, Content, Node, NodeKind, VirtualTree};
use crate::types::Fingerprint;
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parameters for [`open`]
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub layer_path: PathBuf,
    pub base: Arc<MergedTree>,
    pub cache_path: Option<PathBuf>,
    pub autosave: bool,
}

impl OpenOptions {
    pub fn new(layer_path: impl Into<PathBuf>, base: impl Into<Arc<MergedTree>>) -> Self {
        OpenOptions {
            layer_path: layer_path.into(),
            base: base.into(),
            cache_path: None,
            autosave: false,
        }
    }

    /// Also store the working tree as a cache record on every save
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }
}

struct HandleState {
    layer: VirtualTree,
    /// Base plus overlay; `None` until needed after a change
    working: Option<VirtualTree>,
    modified: bool,
    autosave: bool,
    /// Fingerprint of the layer file as last read or written; `None` if absent
    disk_fingerprint: Option<Fingerprint>,
}

/// Views of a handle's trees handed to an edit
struct Edit<'a> {
    base: &'a VirtualTree,
    working: &'a mut VirtualTree,
    layer: &'a mut VirtualTree,
    /// Set when the working view can no longer be updated in place
    stale_view: bool,
}

/// Mutable session over one writable layer
pub struct Handle {
    path: PathBuf,
    layer_id: String,
    base: Arc<MergedTree>,
    cache_path: Option<PathBuf>,
    state: Mutex<HandleState>,
    events: EventBus,
    _lease: SessionLease,
    _cache_lease: Option<SessionLease>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("path", &self.path)
            .field("cache_path", &self.cache_path)
            .field("base_layers", &self.base.sources().len())
            .finish()
    }
}

/// Open the writable layer at `options.layer_path`. A missing file is an
/// empty layer; it is written on the first save. The layer path and the
/// cache path, if any, are both held until the handle drops.
pub fn open(registry: &Arc<SessionRegistry>, options: OpenOptions) -> Result<Handle, ApiError> {
    let lease = registry.acquire(&options.layer_path)?;
    let cache_lease = match &options.cache_path {
        Some(cache_path) => Some(registry.acquire(cache_path)?),
        None => None,
    };
    let path = lease.path().to_path_buf();
    let layer_id = path.display().to_string();

    let (layer, disk_fingerprint) = read_layer(&path, &layer_id)?;
    let working = compose(&options.base, &layer_id, &layer)?;

    info!(
        layer = %layer_id,
        base_layers = options.base.sources().len(),
        autosave = options.autosave,
        "Opened handle"
    );
    Ok(Handle {
        path,
        layer_id,
        base: options.base,
        cache_path: options.cache_path,
        state: Mutex::new(HandleState {
            layer,
            working: Some(working),
            modified: false,
            autosave: options.autosave,
            disk_fingerprint,
        }),
        events: EventBus::new(),
        _lease: lease,
        _cache_lease: cache_lease,
    })
}

fn read_layer(path: &Path, layer_id: &str) -> Result<(VirtualTree, Option<Fingerprint>), ApiError> {
    match store::read_optional(path)? {
        None => Ok((VirtualTree::new(), None)),
        Some(bytes) => {
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| ApiError::malformed(layer_id, format!("not UTF-8: {}", e)))?;
            let tree = VirtualTree::from_xml(text, layer_id)?;
            Ok((tree, Some(fingerprint_bytes(layer_id, &bytes))))
        }
    }
}

fn compose(base: &MergedTree, layer_id: &str, layer: &VirtualTree) -> Result<VirtualTree, ApiError> {
    let mut merged = base.clone();
    merged.apply(layer_id, layer.clone())?;
    Ok(merged.into_tree())
}

/// Make sure `path` exists in the overlay with the kind it has in the
/// working view
fn ensure_in_layer(layer: &mut VirtualTree, working: &VirtualTree, path: &str) -> Result<(), ApiError> {
    if layer.exists(path) {
        return Ok(());
    }
    let kind = working
        .find(path)
        .map(Node::kind)
        .ok_or_else(|| ApiError::NotFound(path.to_string()))?;
    let (parent, name) = tree_path::split_parent(path)?;
    layer.ensure_folders(&parent)?;
    layer.create_child(&parent, &name, kind)?;
    Ok(())
}

impl Handle {
    /// Canonical path of the writable layer
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }

    pub fn base(&self) -> &MergedTree {
        &self.base
    }

    /// Working tree: the base with the overlay merged on top
    pub fn get(&self) -> Result<VirtualTree, ApiError> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let working = match state.working.take() {
            Some(working) => working,
            None => compose(&self.base, &self.layer_id, &state.layer)?,
        };
        Ok(state.working.insert(working).clone())
    }

    /// The overlay as it will be written to the layer file
    pub fn layer(&self) -> VirtualTree {
        self.state.lock().layer.clone()
    }

    pub fn is_modified(&self) -> bool {
        self.state.lock().modified
    }

    pub fn is_autosave(&self) -> bool {
        self.state.lock().autosave
    }

    pub fn set_autosave(&self, autosave: bool) {
        self.state.lock().autosave = autosave;
    }

    pub fn subscribe(&self) -> Receiver<TreeEvent> {
        self.events.subscribe()
    }

    pub fn create_folder(&self, path: &str) -> Result<(), ApiError> {
        self.create(path, NodeKind::Folder)
    }

    pub fn create_file(&self, path: &str) -> Result<(), ApiError> {
        self.create(path, NodeKind::File)
    }

    fn create(&self, path: &str, kind: NodeKind) -> Result<(), ApiError> {
        let path = tree_path::normalize(path)?;
        self.edit(|edit| {
            let (parent, name) = tree_path::split_parent(&path)?;
            edit.working.create_child(&parent, &name, kind)?;
            edit.layer.ensure_folders(&parent)?;
            edit.layer.create_child(&parent, &name, kind)?;
            Ok(vec![TreeEvent::Created { path: path.clone() }])
        })
    }

    /// Set (`Some`) or remove (`None`) an attribute. Only attributes held by
    /// the overlay can be removed. Returns the previous working value.
    pub fn set_attribute(
        &self,
        path: &str,
        key: &str,
        value: Option<AttrValue>,
    ) -> Result<Option<AttrValue>, ApiError> {
        let path = tree_path::normalize(path)?;
        let mut previous = None;
        self.edit(|edit| {
            let event = TreeEvent::AttributeChanged {
                path: path.clone(),
                name: key.to_string(),
            };
            match value {
                Some(value) => {
                    previous = edit.working.set_attribute(&path, key, Some(value.clone()))?;
                    ensure_in_layer(edit.layer, edit.working, &path)?;
                    edit.layer.set_attribute(&path, key, Some(value))?;
                    Ok(vec![event])
                }
                None => {
                    previous = edit.working.attribute(&path, key)?.cloned();
                    let in_layer = match edit.layer.find(&path) {
                        Some(node) => node.attribute(key).is_some(),
                        None => false,
                    };
                    if !in_layer {
                        if previous.is_some() {
                            return Err(ApiError::Conflict(format!(
                                "attribute {} on {} is defined by a base layer",
                                key, path
                            )));
                        }
                        return Ok(Vec::new());
                    }
                    edit.layer.set_attribute(&path, key, None)?;
                    // A base value may show through again
                    edit.stale_view = true;
                    Ok(vec![event])
                }
            }
        })?;
        Ok(previous)
    }

    /// Replace a file's content in the overlay. `None` drops the overlay's
    /// content so any base content shows through.
    pub fn set_content(&self, path: &str, content: Option<Content>) -> Result<(), ApiError> {
        let path = tree_path::normalize(path)?;
        self.edit(|edit| {
            edit.working.set_content(&path, content.clone())?;
            ensure_in_layer(edit.layer, edit.working, &path)?;
            if content.is_none() {
                edit.stale_view = true;
            }
            edit.layer.set_content(&path, content)?;
            Ok(vec![TreeEvent::ContentChanged { path: path.clone() }])
        })
    }

    /// Delete a node created in the overlay
    pub fn delete(&self, path: &str) -> Result<(), ApiError> {
        let path = tree_path::normalize(path)?;
        self.edit(|edit| {
            if edit.base.exists(&path) {
                return Err(ApiError::Conflict(format!(
                    "{} is defined by a base layer and cannot be deleted",
                    path
                )));
            }
            edit.working.delete(&path)?;
            edit.layer.delete(&path)?;
            Ok(vec![TreeEvent::Deleted { path: path.clone() }])
        })
    }

    /// Rename a node created in the overlay, within its folder
    pub fn rename(&self, old: &str, new: &str) -> Result<(), ApiError> {
        let old = tree_path::normalize(old)?;
        let new = tree_path::normalize(new)?;
        self.edit(|edit| {
            if edit.base.exists(&old) {
                return Err(ApiError::Conflict(format!(
                    "{} is defined by a base layer and cannot be renamed",
                    old
                )));
            }
            if old == new {
                edit.working.find(&old).ok_or_else(|| ApiError::NotFound(old.clone()))?;
                return Ok(Vec::new());
            }
            edit.working.rename(&old, &new)?;
            edit.layer.rename(&old, &new)?;
            Ok(vec![TreeEvent::Renamed {
                from: old.clone(),
                to: new.clone(),
            }])
        })
    }

    /// Run one edit under the lock. The working view is checked first so a
    /// rejected edit leaves the overlay untouched.
    fn edit<F>(&self, op: F) -> Result<(), ApiError>
    where
        F: FnOnce(&mut Edit<'_>) -> Result<Vec<TreeEvent>, ApiError>,
    {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let working = match state.working.take() {
            Some(working) => working,
            None => compose(&self.base, &self.layer_id, &state.layer)?,
        };
        let mut edit = Edit {
            base: self.base.tree(),
            working: state.working.insert(working),
            layer: &mut state.layer,
            stale_view: false,
        };

        let outcome = op(&mut edit);
        let stale_view = edit.stale_view;
        let events = match outcome {
            Ok(events) => events,
            Err(e) => {
                state.working = None;
                return Err(e);
            }
        };
        if stale_view {
            state.working = None;
        }
        if events.is_empty() {
            return Ok(());
        }

        state.modified = true;
        for event in events {
            self.events.publish(event);
        }
        if state.autosave {
            self.save_locked(state)?;
        }
        Ok(())
    }

    /// Write the overlay to the layer file, then the cache record if one is
    /// configured. On failure the overlay stays modified.
    pub fn save(&self) -> Result<(), ApiError> {
        let mut guard = self.state.lock();
        self.save_locked(&mut guard)
    }

    fn save_locked(&self, state: &mut HandleState) -> Result<(), ApiError> {
        let xml = state.layer.to_xml();
        if let Err(e) = store::atomic_write(&self.path, xml.as_bytes()) {
            warn!(layer = %self.layer_id, error = %e, "Failed to save writable layer");
            return Err(e.into());
        }
        let fingerprint = fingerprint_bytes(&self.layer_id, xml.as_bytes());
        state.disk_fingerprint = Some(fingerprint);
        debug!(layer = %self.layer_id, bytes = xml.len(), "Saved writable layer");

        if let Some(cache_path) = &self.cache_path {
            if let Err(e) = self.store_working_cache(state, fingerprint, xml.len(), cache_path) {
                warn!(path = %cache_path.display(), error = %e, "Failed to store working cache");
                return Err(e);
            }
        }
        state.modified = false;

        self.events.publish(TreeEvent::Saved {
            layer: self.path.clone(),
        });
        Ok(())
    }

    /// Store base plus overlay at `cache_path` unless the record there
    /// already describes the same layers
    fn store_working_cache(
        &self,
        state: &HandleState,
        fingerprint: Fingerprint,
        len: usize,
        cache_path: &Path,
    ) -> Result<(), ApiError> {
        let stamp = SourceStamp {
            id: self.layer_id.clone(),
            fingerprint,
            len: len as u64,
            modified: std::fs::metadata(&self.path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from),
        };
        let mut merged = (*self.base).clone();
        merged.push_parsed(stamp, state.layer.clone())?;

        if let Ok(record) = cache::inspect(cache_path) {
            if record.fingerprint() == merged.fingerprint() {
                debug!(path = %cache_path.display(), "Working cache already current");
                return Ok(());
            }
        }
        cache::store(&merged, cache_path)
    }

    /// Re-read the layer file if someone else changed it. Returns whether a
    /// reload happened; refuses with `Conflict` while local edits are unsaved.
    pub fn reload_if_changed(&self) -> Result<bool, ApiError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let bytes = store::read_optional(&self.path)?;
        let on_disk = bytes
            .as_deref()
            .map(|bytes| fingerprint_bytes(&self.layer_id, bytes));
        if on_disk == state.disk_fingerprint {
            return Ok(false);
        }
        if state.modified {
            return Err(ApiError::Conflict(format!(
                "{} changed on disk while the handle has unsaved edits",
                self.layer_id
            )));
        }

        let layer = match bytes {
            None => VirtualTree::new(),
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    ApiError::malformed(&self.layer_id, format!("not UTF-8: {}", e))
                })?;
                VirtualTree::from_xml(&text, &self.layer_id)?
            }
        };
        let working = compose(&self.base, &self.layer_id, &layer)?;
        state.layer = layer;
        state.working = Some(working);
        state.disk_fingerprint = on_disk;

        info!(layer = %self.layer_id, "Reloaded externally changed layer");
        self.events.publish(TreeEvent::ExternallyChanged {
            layer: self.path.clone(),
        });
        Ok(true)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let modified = self.state.get_mut().modified;
        if modified {
            warn!(layer = %self.layer_id, "Closing handle with unsaved edits");
        } else {
            debug!(layer = %self.layer_id, "Closed handle");
        }
    }
}
