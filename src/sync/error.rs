// Error taxonomy for sync operations
// Every failure a pair can hit maps onto one of these variants

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Broad classification of a [`SyncError`], used in batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Transfer,
    Patch,
    Conflict,
    State,
    Io,
    Timeout,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Transfer => "transfer",
            ErrorKind::Patch => "patch",
            ErrorKind::Conflict => "conflict",
            ErrorKind::State => "state",
            ErrorKind::Io => "io",
            ErrorKind::Timeout => "timeout",
        }
    }
}

/// Main error type for the sync engine
#[derive(Debug)]
pub enum SyncError {
    /// Bad or missing pair, connection or patcher. Fatal before any transfer.
    Config { message: String },

    /// Remote endpoint unreachable, auth failure or remote I/O failure.
    Transfer {
        endpoint: String,
        operation: String,
        path: String,
        reason: String,
    },

    /// A patcher rejected its input.
    Patch {
        patcher: String,
        direction: String,
        reason: String,
    },

    /// The decision engine could not pick a direction.
    Conflict { pair: String, reason: String },

    /// The record store could not be written.
    State { pair: String, reason: String },

    /// Local filesystem failure with context.
    Io {
        path: PathBuf,
        operation: String,
        source: io::Error,
    },

    /// The caller-level timeout elapsed.
    Timeout { pair: String, after: Duration },
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config {
            message: message.into(),
        }
    }

    pub fn io(source: io::Error, operation: &str, path: impl Into<PathBuf>) -> Self {
        SyncError::Io {
            path: path.into(),
            operation: operation.to_string(),
            source,
        }
    }

    pub fn transfer(
        endpoint: impl Into<String>,
        operation: &str,
        path: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        SyncError::Transfer {
            endpoint: endpoint.into(),
            operation: operation.to_string(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Config { .. } => ErrorKind::Config,
            SyncError::Transfer { .. } => ErrorKind::Transfer,
            SyncError::Patch { .. } => ErrorKind::Patch,
            SyncError::Conflict { .. } => ErrorKind::Conflict,
            SyncError::State { .. } => ErrorKind::State,
            SyncError::Io { .. } => ErrorKind::Io,
            SyncError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Conflicts are the one failure a forced direction can resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict { .. })
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncError::Config { message } => write!(f, "Configuration error: {}", message),
            SyncError::Transfer {
                endpoint,
                operation,
                path,
                reason,
            } => write!(
                f,
                "Transfer error while {} {} on {}: {}",
                operation, path, endpoint, reason
            ),
            SyncError::Patch {
                patcher,
                direction,
                reason,
            } => write!(
                f,
                "Patcher '{}' rejected input ({}): {}",
                patcher, direction, reason
            ),
            SyncError::Conflict { pair, reason } => {
                write!(f, "Not syncing '{}': {}\n", pair, reason)?;
                write!(
                    f,
                    "Suggestion: pick a direction with sync-to or sync-from"
                )
            }
            SyncError::State { pair, reason } => {
                write!(f, "Failed to record sync state for '{}': {}\n", pair, reason)?;
                write!(
                    f,
                    "Suggestion: the transfer completed; the next run will report a conflict"
                )
            }
            SyncError::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error while {} {}: {}",
                operation,
                path.display(),
                source
            ),
            SyncError::Timeout { pair, after } => {
                write!(f, "Sync of '{}' timed out after {:?}", pair, after)
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
