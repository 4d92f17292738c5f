//! Durable per-pair checkpoints.
//!
//! One JSON file per pair under `<state_dir>/records/`. A record is rewritten
//! as a whole, through a temp file and rename, only after a sync finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::fs::LocalFs;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::hash::Fingerprint;

/// Fingerprints of both sides as of the last successful sync.
///
/// Both fields are always written together; a record missing one of them
/// was not produced by a commit and is reported as a mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncRecord {
    pub fn new(local: Fingerprint, remote: Fingerprint) -> Self {
        Self {
            local: Some(local),
            remote: Some(remote),
            synced_at: Some(Utc::now()),
        }
    }

    fn fingerprints_well_formed(&self) -> bool {
        [&self.local, &self.remote]
            .into_iter()
            .flatten()
            .all(Fingerprint::is_well_formed)
    }
}

/// Record store with one async lock per pair name.
pub struct StateStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StateStore {
    /// Open (and create if needed) the store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SyncError::io(e, "creating state directory", &dir))?;
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn record_path(&self, pair: &str) -> PathBuf {
        self.dir.join(format!("{}.json", pair))
    }

    /// Take the pair's lock. Held for a whole sync attempt so two runs of the
    /// same pair never interleave; different pairs don't contend.
    pub async fn lock(&self, pair: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(pair.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Load the pair's record.
    ///
    /// A missing, unreadable or corrupt record all mean "no previous state":
    /// the pair then looks changed on both sides, never unchanged.
    pub fn load(&self, pair: &str) -> Option<SyncRecord> {
        let path = self.record_path(pair);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(pair, "No previous sync record");
                return None;
            }
            Err(e) => {
                warn!(pair, path = %path.display(), error = %e, "Sync record unreadable, treating as no previous state");
                return None;
            }
        };
        match serde_json::from_slice::<SyncRecord>(&data) {
            Ok(record) if record.fingerprints_well_formed() => Some(record),
            Ok(_) => {
                warn!(pair, path = %path.display(), "Sync record holds a malformed fingerprint, treating as no previous state");
                None
            }
            Err(e) => {
                warn!(pair, path = %path.display(), error = %e, "Sync record corrupt, treating as no previous state");
                None
            }
        }
    }

    /// Persist the pair's record, replacing any previous one atomically.
    pub fn save(&self, pair: &str, record: &SyncRecord) -> SyncResult<()> {
        let state_error = |reason: String| SyncError::State {
            pair: pair.to_string(),
            reason,
        };
        let json = serde_json::to_vec_pretty(record).map_err(|e| state_error(e.to_string()))?;
        LocalFs::write_atomic(&self.record_path(pair), &json).map_err(|e| state_error(e.to_string()))
    }

    /// Forget the pair's record.
    pub fn clear(&self, pair: &str) -> SyncResult<()> {
        let path = self.record_path(pair);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(e, "removing", path)),
        }
    }
}
