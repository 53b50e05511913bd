//! Layer document codec
//!
//! Reads and writes the `<filesystem>` XML form of a [`VirtualTree`].

pub mod escape;
mod reader;
mod writer;

pub use reader::deserialize;
pub use writer::{serialize, DOCTYPE, XML_DECLARATION};
