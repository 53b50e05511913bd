//! Core types shared across the layered filesystem.

/// Fingerprint: BLAKE3 digest of a layer source or of an ordered layer set
pub type Fingerprint = [u8; 32];

/// Identifier reported for the base tree passed to a merge
pub const BASE_LAYER_ID: &str = "<base>";
