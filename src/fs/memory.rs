use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::fs::backend::{BackendType, RemoteBackend};
use crate::sync::error::{SyncError, SyncResult};

/// In-memory remote, for tests and dry runs.
///
/// `fail_puts` / `fail_gets` make every matching call fail with a transfer
/// error, which is how write and fetch failures are simulated. A latency
/// keeps each call in flight for a while so overlapping callers can be
/// counted.
#[derive(Default)]
pub struct MemoryBackend {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    puts: AtomicUsize,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Marks one call as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call for `latency` before it completes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_file(self, path: &str, data: &[u8]) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&self, path: &str, data: &[u8]) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.to_string(), data.to_vec());
        }
    }

    /// Current content of `path`, bypassing failure injection.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(path).cloned()
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `put` calls.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Most calls that were ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn begin(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let call = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        call
    }

    fn error(&self, operation: &str, path: &str, reason: &str) -> SyncError {
        SyncError::transfer(self.describe(), operation, path, reason)
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn exists(&self, path: &str) -> SyncResult<bool> {
        let _call = self.begin().await;
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(self.error("checking", path, "injected failure"));
        }
        let files = self
            .files
            .lock()
            .map_err(|_| self.error("checking", path, "lock poisoned"))?;
        Ok(files.contains_key(path))
    }

    async fn get(&self, path: &str) -> SyncResult<Vec<u8>> {
        let _call = self.begin().await;
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(self.error("downloading", path, "injected failure"));
        }
        self.read(path)
            .ok_or_else(|| self.error("downloading", path, "no such file"))
    }

    async fn put(&self, path: &str, data: Vec<u8>) -> SyncResult<()> {
        let _call = self.begin().await;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(self.error("uploading", path, "injected failure"));
        }
        let mut files = self
            .files
            .lock()
            .map_err(|_| self.error("uploading", path, "lock poisoned"))?;
        files.insert(path.to_string(), data);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn atomic_put(&self) -> bool {
        true
    }
}
