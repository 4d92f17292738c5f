//! Content fingerprints for change detection.
//!
//! A fingerprint is the BLAKE3 digest of a file's bytes, stored as hex.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Buffers above this size are hashed on the rayon pool.
const PARALLEL_THRESHOLD: usize = 128 * 1024;

/// Opaque content hash of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a byte buffer. Succeeds for any input, including empty.
    pub fn of(data: &[u8]) -> Self {
        Self(hash_bytes(data))
    }

    /// Wrap an already computed hex digest (e.g. read back from disk).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Whether this looks like a digest `hash_bytes` produced.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 64 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash bytes using BLAKE3.
pub fn hash_bytes(data: &[u8]) -> String {
    if data.len() > PARALLEL_THRESHOLD {
        let mut hasher = blake3::Hasher::new();
        hasher.update_rayon(data);
        hasher.finalize().to_hex().to_string()
    } else {
        blake3::hash(data).to_hex().to_string()
    }
}
