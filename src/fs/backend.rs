use async_trait::async_trait;

use crate::sync::error::SyncResult;

/// Backend type information for display and identification
#[derive(Debug, Clone, PartialEq)]
pub enum BackendType {
    Ftp { host: String, port: u16 },
    Dir { root: String },
    Memory,
}

impl BackendType {
    /// Get a short display name for the backend
    pub fn short_name(&self) -> &'static str {
        match self {
            BackendType::Ftp { .. } => "FTP",
            BackendType::Dir { .. } => "Dir",
            BackendType::Memory => "Memory",
        }
    }
}

/// The remote side of a sync pair.
///
/// Every method fails with a transfer error on connectivity, permission or
/// remote I/O problems. Paths are backend-native strings.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Check whether a file exists at `path`.
    async fn exists(&self, path: &str) -> SyncResult<bool>;

    /// Read the whole file.
    async fn get(&self, path: &str) -> SyncResult<Vec<u8>>;

    /// Replace the file with `data`.
    async fn put(&self, path: &str, data: Vec<u8>) -> SyncResult<()>;

    /// Read the file, or `None` if it does not exist.
    async fn fetch(&self, path: &str) -> SyncResult<Option<Vec<u8>>> {
        if !self.exists(path).await? {
            return Ok(None);
        }
        self.get(path).await.map(Some)
    }

    /// Get the backend type
    fn backend_type(&self) -> BackendType;

    /// Whether `put` replaces the target atomically.
    fn atomic_put(&self) -> bool {
        false
    }

    /// Release any open session. Further calls may reconnect.
    async fn close(&self) {}

    /// Human-readable endpoint, for logs and errors.
    fn describe(&self) -> String {
        match self.backend_type() {
            BackendType::Ftp { host, port } => format!("ftp://{}:{}", host, port),
            BackendType::Dir { root } => format!("dir:{}", root),
            BackendType::Memory => "memory".to_string(),
        }
    }
}
