//! layerfs: Layered XML Configuration Filesystem
//!
//! Merges an ordered stack of XML layer documents into one virtual tree of
//! folders, files and typed attributes. Later layers override earlier ones.
//! Merged trees are cached against a fingerprint of their layers, and a
//! writable layer on top of the stack records a session's edits.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod layer;
pub mod logging;
pub mod resource;
pub mod session;
pub mod store;
pub mod tooling;
pub mod tree;
pub mod types;
pub mod xml;

pub use error::{ApiError, StorageError};
pub use events::TreeEvent;
pub use layer::{merge, merge_layers, LayerSet, LayerSource, MergedTree};
pub use session::{Handle, OpenOptions, SessionRegistry};
pub use tree::{AttrValue, Content, Node, NodeKind, VirtualTree};
