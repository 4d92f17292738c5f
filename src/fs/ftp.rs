//! FTP transfer client.
//!
//! Wraps the blocking `suppaftp` client. One control session is kept per
//! connection and guarded by a mutex, so every command against the same
//! endpoint is serialised. Commands run on the blocking pool.
//!
//! Uploads are staged next to the target and renamed over it. Servers that
//! refuse to rename onto an existing file (common on FAT-backed handheld
//! daemons) get a non-atomic replace instead, and the backend stops
//! reporting atomic writes from then on.

use async_trait::async_trait;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::fs::backend::{BackendType, RemoteBackend};
use crate::sync::error::{SyncError, SyncResult};

/// Suffix of the temp file uploads land in before the final rename.
const UPLOAD_SUFFIX: &str = ".ftp-sync.tmp";

/// Connection settings for one FTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 21,
            user: "anonymous".to_string(),
            password: String::new(),
        }
    }
}

pub struct FtpBackend {
    settings: FtpSettings,
    session: Arc<Mutex<Option<FtpStream>>>,
    atomic: Arc<AtomicBool>,
}

impl FtpBackend {
    /// Create a backend. The connection is opened lazily on first use.
    pub fn new(settings: FtpSettings) -> Self {
        Self {
            settings,
            session: Arc::new(Mutex::new(None)),
            atomic: Arc::new(AtomicBool::new(true)),
        }
    }

    fn connect(settings: &FtpSettings) -> Result<FtpStream, FtpError> {
        debug!(host = %settings.host, port = settings.port, "Opening FTP session");
        let mut stream = FtpStream::connect((settings.host.as_str(), settings.port))?;
        stream.login(settings.user.as_str(), settings.password.as_str())?;
        stream.transfer_type(FileType::Binary)?;
        Ok(stream)
    }

    /// Run `op` against the shared session, reconnecting if there is none.
    /// Sessions that hit a connection-level failure are discarded.
    async fn with_session<T, F>(&self, operation: &str, path: &str, op: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T, FtpError> + Send + 'static,
    {
        let session = self.session.clone();
        let settings = self.settings.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = session.blocking_lock();
            let mut stream = match guard.take() {
                Some(stream) => stream,
                None => Self::connect(&settings)?,
            };
            let result = op(&mut stream);
            match &result {
                Err(FtpError::ConnectionError(_)) => {
                    warn!("Dropping FTP session after connection failure");
                }
                _ => *guard = Some(stream),
            }
            result
        })
        .await;

        match joined {
            Ok(result) => result.map_err(|e| SyncError::transfer(self.describe(), operation, path, e)),
            Err(e) => Err(SyncError::transfer(self.describe(), operation, path, e)),
        }
    }

    /// Send QUIT on the open session, if there is one.
    pub async fn quit(&self) {
        let session = self.session.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Some(mut stream) = session.blocking_lock().take() {
                let _ = stream.quit();
            }
        })
        .await;
    }
}

fn is_file_unavailable(err: &FtpError) -> bool {
    matches!(err, FtpError::UnexpectedResponse(response) if matches!(response.status, Status::FileUnavailable))
}

#[async_trait]
impl RemoteBackend for FtpBackend {
    async fn exists(&self, path: &str) -> SyncResult<bool> {
        let target = path.to_string();
        self.with_session("checking", path, move |stream| match stream.size(target.as_str()) {
            Ok(_) => Ok(true),
            Err(e) if is_file_unavailable(&e) => Ok(false),
            Err(e) => Err(e),
        })
        .await
    }

    async fn get(&self, path: &str) -> SyncResult<Vec<u8>> {
        let target = path.to_string();
        self.with_session("downloading", path, move |stream| {
            stream
                .retr_as_buffer(target.as_str())
                .map(Cursor::into_inner)
        })
        .await
    }

    async fn put(&self, path: &str, data: Vec<u8>) -> SyncResult<()> {
        let target = path.to_string();
        let atomic = self.atomic.clone();
        self.with_session("uploading", path, move |stream| {
            let placement = upload(stream, &target, &data)?;
            if placement != Placement::Renamed {
                atomic.store(false, Ordering::Relaxed);
            }
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        self.quit().await;
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Ftp {
            host: self.settings.host.clone(),
            port: self.settings.port,
        }
    }

    fn atomic_put(&self) -> bool {
        self.atomic.load(Ordering::Relaxed)
    }
}

/// The commands an upload needs from a control session.
trait UploadSession {
    fn store(&mut self, path: &str, data: &[u8]) -> Result<(), FtpError>;
    fn rename_to(&mut self, from: &str, to: &str) -> Result<(), FtpError>;
    fn delete(&mut self, path: &str) -> Result<(), FtpError>;
}

impl UploadSession for FtpStream {
    fn store(&mut self, path: &str, data: &[u8]) -> Result<(), FtpError> {
        self.put_file(path, &mut Cursor::new(data)).map(|_| ())
    }

    fn rename_to(&mut self, from: &str, to: &str) -> Result<(), FtpError> {
        self.rename(from, to)
    }

    fn delete(&mut self, path: &str) -> Result<(), FtpError> {
        self.rm(path)
    }
}

/// How an upload replaced its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Staged copy renamed over the target in one step.
    Renamed,
    /// Target deleted, then the staged copy renamed into place.
    DeletedThenRenamed,
    /// Renames refused outright; target overwritten in place.
    Overwritten,
}

/// Upload `data` to `target` as safely as the server allows.
fn upload<S: UploadSession>(session: &mut S, target: &str, data: &[u8]) -> Result<Placement, FtpError> {
    let staging = format!("{}{}", target, UPLOAD_SUFFIX);
    session.store(&staging, data)?;
    let refused = match session.rename_to(&staging, target) {
        Ok(()) => return Ok(Placement::Renamed),
        Err(e) => e,
    };

    warn!(path = target, error = %refused, "Rename over target refused, replacing it non-atomically");
    if session.delete(target).is_ok() && session.rename_to(&staging, target).is_ok() {
        return Ok(Placement::DeletedThenRenamed);
    }

    let _ = session.delete(&staging);
    session.store(target, data)?;
    Ok(Placement::Overwritten)
}
