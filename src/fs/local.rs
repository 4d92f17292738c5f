use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

use crate::sync::error::{SyncError, SyncResult};

/// The local side of a pair as the sync engine reads and writes it.
pub trait LocalStore: Send + Sync {
    /// Read a file, `None` when it does not exist.
    fn read(&self, path: &Path) -> SyncResult<Option<Vec<u8>>>;

    /// Replace a file so readers never see a partial write.
    fn write(&self, path: &Path, data: &[u8]) -> SyncResult<()>;
}

pub struct LocalFs;

impl LocalStore for LocalFs {
    fn read(&self, path: &Path) -> SyncResult<Option<Vec<u8>>> {
        Self::read_optional(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> SyncResult<()> {
        Self::write_atomic(path, data)
    }
}

impl LocalFs {
    /// Read a file, returning `None` when it does not exist.
    pub fn read_optional(path: &Path) -> SyncResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::io(e, "reading", path)),
        }
    }

    /// Write `data` to a temp file beside `path`, then rename it over `path`.
    /// Readers see either the old content or the new content, never a mix.
    ///
    /// A symlinked `path` has its target replaced and the link kept. An
    /// existing file keeps its permissions.
    pub fn write_atomic(path: &Path, data: &[u8]) -> SyncResult<()> {
        let resolved = fs::canonicalize(path).ok();
        let path = resolved.as_deref().unwrap_or(path);
        let existing = fs::metadata(path).ok().filter(|m| m.is_file());

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .map_err(|e| SyncError::io(e, "creating directory", &parent))?;

        let mut tmp = NamedTempFile::new_in(&parent)
            .map_err(|e| SyncError::io(e, "creating temp file in", &parent))?;
        if let Some(existing) = existing {
            tmp.as_file()
                .set_permissions(existing.permissions())
                .map_err(|e| SyncError::io(e, "copying permissions for", path))?;
        }
        tmp.write_all(data)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| SyncError::io(e, "writing temp file for", path))?;
        tmp.persist(path)
            .map_err(|e| SyncError::io(e.error, "replacing", path))?;
        Ok(())
    }

    /// Lexically normalize a path, dropping `.` and resolving `..`.
    pub fn normalize_path(path: &Path) -> PathBuf {
        let mut normalized = PathBuf::new();

        for component in path.components() {
            match component {
                Component::ParentDir => {
                    normalized.pop();
                }
                Component::CurDir => {}
                _ => normalized.push(component),
            }
        }

        if normalized.as_os_str().is_empty() {
            normalized.push("/");
        }

        normalized
    }

    /// Expand a leading `~` to the user's home directory.
    pub fn expand_home(path: &Path) -> PathBuf {
        let Ok(rest) = path.strip_prefix("~") else {
            return path.to_path_buf();
        };
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        }
    }
}
