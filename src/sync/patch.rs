//! Byte transforms applied while moving a file between sides.
//!
//! A patcher defines a forward transform (local -> remote) and a reverse
//! transform (remote -> local). Patchers are looked up by name in a
//! [`PatcherRegistry`]; unknown names are configuration errors.

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzipCompression;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::sync::decision::Direction;
use crate::sync::error::{SyncError, SyncResult};

/// Name that selects the identity transform, same as leaving the patcher out.
pub const IDENTITY: &str = "none";

/// A named, pure, two-direction byte transform.
///
/// Both directions must be deterministic: the same input always yields the
/// same output, otherwise a rerun without changes would not be a no-op.
pub trait Patcher: Send + Sync {
    fn name(&self) -> &str;

    /// Local bytes -> remote bytes.
    fn forward(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Remote bytes -> local bytes.
    fn reverse(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Leaves bytes untouched.
#[derive(Debug, Default)]
pub struct IdentityPatcher;

impl Patcher for IdentityPatcher {
    fn name(&self) -> &str {
        IDENTITY
    }

    fn forward(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn reverse(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Footer DeSmuME appends to raw cartridge saves.
pub const DESMUME_FOOTER: &[u8] = b"|<--Snip above here to create a raw sav by excluding this DeSmuME savedata footer:\x01\x00\x04\x00\x00\x00\x08\x00\x06\x00\x00\x00\x03\x00\x00\x00\x00\x00\x08\x00\x00\x00\x00\x00|-DESMUME SAVE-|";

/// Converts between DeSmuME `.dsv` saves (local) and raw `.sav` files
/// (remote, e.g. a flashcart served over FTP).
#[derive(Debug, Default)]
pub struct DesmumePatcher;

impl Patcher for DesmumePatcher {
    fn name(&self) -> &str {
        "desmume"
    }

    fn forward(&self, data: &[u8]) -> Result<Vec<u8>> {
        match data.strip_suffix(DESMUME_FOOTER) {
            Some(raw) => Ok(raw.to_vec()),
            None => bail!("input does not end with the DeSmuME save footer"),
        }
    }

    fn reverse(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() + DESMUME_FOOTER.len());
        out.extend_from_slice(data);
        out.extend_from_slice(DESMUME_FOOTER);
        Ok(out)
    }
}

/// Stores the remote copy gzip-compressed.
#[derive(Debug, Clone, Copy)]
pub struct GzipPatcher {
    level: u32,
}

impl Default for GzipPatcher {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Patcher for GzipPatcher {
    fn name(&self) -> &str {
        "gzip"
    }

    fn forward(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), GzipCompression::new(self.level));
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn reverse(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .context("remote copy is not valid gzip")?;
        Ok(out)
    }
}

/// Named set of patchers, populated at startup.
#[derive(Clone)]
pub struct PatcherRegistry {
    patchers: BTreeMap<String, Arc<dyn Patcher>>,
}

impl Default for PatcherRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PatcherRegistry {
    /// Registry holding only the identity patcher.
    pub fn empty() -> Self {
        let mut registry = Self {
            patchers: BTreeMap::new(),
        };
        registry.register(Arc::new(IdentityPatcher));
        registry
    }

    /// Registry with every built-in patcher.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(DesmumePatcher));
        registry.register(Arc::new(GzipPatcher::default()));
        registry
    }

    /// Add or replace a patcher under its own name.
    pub fn register(&mut self, patcher: Arc<dyn Patcher>) {
        self.patchers.insert(patcher.name().to_string(), patcher);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patchers.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patchers.contains_key(name)
    }

    /// Look up a patcher. `None` selects the identity transform.
    pub fn get(&self, name: Option<&str>) -> SyncResult<Arc<dyn Patcher>> {
        let name = name.unwrap_or(IDENTITY);
        self.patchers.get(name).cloned().ok_or_else(|| {
            let known: Vec<&str> = self.names().collect();
            SyncError::config(format!(
                "unknown patcher '{}' (known: {})",
                name,
                known.join(", ")
            ))
        })
    }

    /// Transform `data` for the given direction.
    pub fn apply(
        &self,
        direction: Direction,
        data: &[u8],
        patcher: Option<&str>,
    ) -> SyncResult<Vec<u8>> {
        let patcher = self.get(patcher)?;
        let result = match direction {
            Direction::LocalToRemote => patcher.forward(data),
            Direction::RemoteToLocal => patcher.reverse(data),
        };
        result.map_err(|e| SyncError::Patch {
            patcher: patcher.name().to_string(),
            direction: direction.name().to_string(),
            reason: format!("{:#}", e),
        })
    }
}
