//! On-disk cache record format
//!
//! A record is a 4-byte magic, a little-endian format version, then the
//! bincode-encoded body.

use crate::layer::{MergedTree, SourceStamp};
use crate::types::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CACHE_MAGIC: &[u8; 4] = b"LFSC";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = CACHE_MAGIC.len() + 4;

/// A persisted merged tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub merged: MergedTree,
}

impl CacheRecord {
    pub fn new(merged: MergedTree) -> Self {
        CacheRecord {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            merged,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        self.merged.fingerprint()
    }

    pub fn sources(&self) -> &[SourceStamp] {
        self.merged.sources()
    }

    pub fn encode(&self) -> Result<Vec<u8>, String> {
        let body = bincode::serialize(self).map_err(|e| e.to_string())?;
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(CACHE_MAGIC);
        out.extend_from_slice(&self.format_version.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode a record; the error string says why the bytes are unusable
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN || &bytes[..CACHE_MAGIC.len()] != CACHE_MAGIC {
            return Err("not a layerfs cache file".to_string());
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[CACHE_MAGIC.len()..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(format!(
                "format version {} does not match expected {}",
                version, FORMAT_VERSION
            ));
        }
        let record: CacheRecord = bincode::deserialize(&bytes[HEADER_LEN..])
            .map_err(|e| format!("undecodable record: {}", e))?;
        if record.format_version != version {
            return Err("header and body versions disagree".to_string());
        }
        Ok(record)
    }
}
