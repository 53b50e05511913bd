//! Tooling & Integration Layer
//!
//! Command-line access to merged trees, the writable layer and the cache.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
