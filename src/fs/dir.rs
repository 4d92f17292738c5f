use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::fs::backend::{BackendType, RemoteBackend};
use crate::fs::local::LocalFs;
use crate::sync::error::{SyncError, SyncResult};

/// A directory (typically a mounted share) standing in for the remote side.
/// Remote paths are resolved relative to `root`.
pub struct DirBackend {
    pub root: PathBuf,
}

impl DirBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a remote path under `root`. `..` is refused so a pair can't
    /// reach outside the shared directory.
    fn full_path(&self, operation: &str, path: &str) -> SyncResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(SyncError::transfer(
                self.describe(),
                operation,
                path,
                "path leaves the remote root",
            ));
        }
        Ok(LocalFs::normalize_path(&self.root.join(relative)))
    }

    fn transfer_error(&self, operation: &str, path: &Path, err: impl std::fmt::Display) -> SyncError {
        SyncError::transfer(self.describe(), operation, path.display().to_string(), err)
    }
}

#[async_trait]
impl RemoteBackend for DirBackend {
    async fn exists(&self, path: &str) -> SyncResult<bool> {
        let full = self.full_path("checking", path)?;
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| self.transfer_error("checking", &full, e))
    }

    async fn get(&self, path: &str) -> SyncResult<Vec<u8>> {
        let full = self.full_path("reading", path)?;
        tokio::fs::read(&full)
            .await
            .map_err(|e| self.transfer_error("reading", &full, e))
    }

    async fn put(&self, path: &str, data: Vec<u8>) -> SyncResult<()> {
        let full = self.full_path("writing", path)?;
        let target = full.clone();
        tokio::task::spawn_blocking(move || LocalFs::write_atomic(&target, &data))
            .await
            .map_err(|e| self.transfer_error("writing", &full, e))?
            .map_err(|e| self.transfer_error("writing", &full, e))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Dir {
            root: self.root.display().to_string(),
        }
    }

    fn atomic_put(&self) -> bool {
        true
    }
}
