//! Copies of the overwrite target, taken before every destructive write.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::fs::LocalFs;
use crate::sync::decision::Direction;
use crate::sync::error::{SyncError, SyncResult};

/// Timestamp prefix of backup file names. Sorts chronologically.
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

/// Backups live under `<root>/<pair>/` and are never pruned.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Save the current destination bytes before they get overwritten.
    ///
    /// `target` is the destination path (local or remote); only its file
    /// name is used. Returns where the backup went.
    pub fn save(
        &self,
        pair: &str,
        direction: Direction,
        target: &str,
        data: &[u8],
    ) -> SyncResult<PathBuf> {
        let side = match direction {
            Direction::LocalToRemote => "remote",
            Direction::RemoteToLocal => "local",
        };
        let file_name = Path::new(target)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let name = format!("{}__{}__{}", Utc::now().format(STAMP_FORMAT), side, file_name);
        let path = self.root.join(pair).join(name);

        LocalFs::write_atomic(&path, data)?;
        info!(pair, side, backup = %path.display(), "Backed up destination");
        Ok(path)
    }

    /// Backups taken for `pair`, oldest first.
    pub fn list(&self, pair: &str) -> SyncResult<Vec<PathBuf>> {
        let dir = self.root.join(pair);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::io(e, "listing", &dir)),
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        Ok(paths)
    }
}
