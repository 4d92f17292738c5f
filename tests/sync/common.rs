// Shared fixtures for sync integration tests

use ftp_sync::config::SyncPair;
use ftp_sync::fs::{LocalFs, LocalStore};
use ftp_sync::sync::{BackupStore, PatcherRegistry, StateStore, SyncEngine};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

pub const REMOTE_PATH: &str = "/saves/game.sav";

/// Temp state dir, an engine over it, and one pair pointing at `local/`.
pub struct Harness {
    pub dir: TempDir,
    pub engine: SyncEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_local_store(Arc::new(LocalFs))
    }

    pub fn with_local_store(local: Arc<dyn LocalStore>) -> Self {
        let dir = tempdir().unwrap();
        let engine = SyncEngine::new(
            StateStore::open(dir.path().join("state/records")).unwrap(),
            BackupStore::new(dir.path().join("state/backup")),
            PatcherRegistry::with_builtins(),
        )
        .with_local_store(local);
        Self { dir, engine }
    }

    pub fn pair(&self, name: &str, patcher: Option<&str>) -> SyncPair {
        SyncPair {
            name: name.to_string(),
            local: self.dir.path().join("local").join(format!("{}.dsv", name)),
            remote: REMOTE_PATH.to_string(),
            patcher: patcher.map(str::to_string),
            connection: "default".to_string(),
        }
    }

    pub fn write_local(&self, pair: &SyncPair, data: &[u8]) {
        fs::create_dir_all(pair.local.parent().unwrap()).unwrap();
        fs::write(&pair.local, data).unwrap();
    }

    pub fn read_local(&self, pair: &SyncPair) -> Vec<u8> {
        fs::read(&pair.local).unwrap()
    }

    pub fn remote_root(&self) -> PathBuf {
        self.dir.path().join("remote")
    }
}
