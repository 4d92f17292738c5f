//! Configuration document: connections and named sync pairs.
//!
//! Loaded from YAML, JSON or TOML (picked by file extension) and validated
//! up front, so a bad pair or patcher name aborts before any transfer.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fs::{FtpSettings, LocalFs};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::patch::PatcherRegistry;

/// Connection created from the legacy top-level `hostname` keys.
pub const DEFAULT_CONNECTION: &str = "default";

const DEFAULT_JOBS: usize = 4;

/// Document format, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Unknown extensions fall back to YAML, which also accepts JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// Transport used to reach the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    #[default]
    Ftp,
    Dir,
}

/// One remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Ftp {
        settings: FtpSettings,
        max_sessions: usize,
    },
    Dir {
        root: PathBuf,
        max_sessions: usize,
    },
}

impl Connection {
    /// How many pairs may use this endpoint at once.
    pub fn max_sessions(&self) -> usize {
        match self {
            Connection::Ftp { max_sessions, .. } | Connection::Dir { max_sessions, .. } => {
                *max_sessions
            }
        }
    }
}

/// A named local/remote file association. Immutable for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPair {
    pub name: String,
    pub local: PathBuf,
    pub remote: String,
    pub patcher: Option<String>,
    pub connection: String,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub connections: BTreeMap<String, Connection>,
    pub pairs: Vec<SyncPair>,
}

#[derive(Debug, Deserialize)]
struct RawConnection {
    #[serde(default)]
    kind: ConnectionKind,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    root: Option<PathBuf>,
    max_sessions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawPair {
    name: String,
    #[serde(alias = "local_path")]
    local: PathBuf,
    #[serde(alias = "remote_path")]
    remote: String,
    patcher: Option<String>,
    connection: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    state_dir: Option<PathBuf>,
    jobs: Option<usize>,
    timeout_secs: Option<u64>,
    #[serde(default)]
    connections: BTreeMap<String, RawConnection>,
    #[serde(default)]
    sync: Vec<RawPair>,

    // Legacy single-connection form
    hostname: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
}

impl Config {
    /// Read and validate a config file.
    pub fn load(path: &Path, patchers: &PatcherRegistry) -> SyncResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SyncError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&contents, ConfigFormat::from_path(path), patchers)
    }

    /// Parse and validate a config document.
    pub fn parse(contents: &str, format: ConfigFormat, patchers: &PatcherRegistry) -> SyncResult<Self> {
        let raw: RawConfig = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
        }
        .map_err(|e| SyncError::config(format!("invalid config document: {}", e)))?;

        raw.validate(patchers)
    }

    /// Default config file: `<config dir>/ftp_sync/config.yaml`.
    pub fn default_path() -> PathBuf {
        default_home().join("config.yaml")
    }

    pub fn pair(&self, name: &str) -> SyncResult<&SyncPair> {
        self.pairs.iter().find(|p| p.name == name).ok_or_else(|| {
            SyncError::config(format!("no sync pair named '{}'", name))
        })
    }

    pub fn records_dir(&self) -> PathBuf {
        self.state_dir.join("records")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.state_dir.join("backup")
    }
}

fn default_home() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ftp_sync")
}

fn valid_pair_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl RawConnection {
    fn validate(self, name: &str) -> SyncResult<Connection> {
        let max_sessions = self.max_sessions.unwrap_or(1);
        if max_sessions == 0 {
            return Err(SyncError::config(format!(
                "connection '{}': max_sessions must be at least 1",
                name
            )));
        }
        match self.kind {
            ConnectionKind::Ftp => {
                let host = self.host.filter(|h| !h.is_empty()).ok_or_else(|| {
                    SyncError::config(format!("connection '{}': ftp needs a host", name))
                })?;
                let defaults = FtpSettings::default();
                Ok(Connection::Ftp {
                    settings: FtpSettings {
                        host,
                        port: self.port.unwrap_or(defaults.port),
                        user: self.user.unwrap_or(defaults.user),
                        password: self.password.unwrap_or(defaults.password),
                    },
                    max_sessions,
                })
            }
            ConnectionKind::Dir => {
                let root = self.root.ok_or_else(|| {
                    SyncError::config(format!("connection '{}': dir needs a root", name))
                })?;
                Ok(Connection::Dir {
                    root: LocalFs::expand_home(&root),
                    max_sessions,
                })
            }
        }
    }
}

impl RawConfig {
    fn validate(mut self, patchers: &PatcherRegistry) -> SyncResult<Config> {
        if let Some(hostname) = self.hostname.take() {
            if self.connections.contains_key(DEFAULT_CONNECTION) {
                return Err(SyncError::config(format!(
                    "top-level hostname clashes with connection '{}'",
                    DEFAULT_CONNECTION
                )));
            }
            self.connections.insert(
                DEFAULT_CONNECTION.to_string(),
                RawConnection {
                    kind: ConnectionKind::Ftp,
                    host: Some(hostname),
                    port: self.port,
                    user: self.user.take(),
                    password: self.password.take(),
                    root: None,
                    max_sessions: None,
                },
            );
        }

        let jobs = self.jobs.unwrap_or(DEFAULT_JOBS);
        if jobs == 0 {
            return Err(SyncError::config("jobs must be at least 1"));
        }

        let mut connections = BTreeMap::new();
        for (name, raw) in self.connections {
            let connection = raw.validate(&name)?;
            connections.insert(name, connection);
        }

        let sole_connection = if connections.len() == 1 {
            connections.keys().next().cloned()
        } else {
            None
        };

        let mut seen = HashSet::new();
        let mut pairs = Vec::with_capacity(self.sync.len());
        for raw in self.sync {
            if !valid_pair_name(&raw.name) {
                return Err(SyncError::config(format!(
                    "invalid pair name '{}' (use letters, digits, '.', '_' or '-')",
                    raw.name
                )));
            }
            if !seen.insert(raw.name.clone()) {
                return Err(SyncError::config(format!("duplicate pair name '{}'", raw.name)));
            }
            if raw.local.as_os_str().is_empty() || raw.remote.is_empty() {
                return Err(SyncError::config(format!(
                    "pair '{}': local and remote paths are required",
                    raw.name
                )));
            }

            let connection = match raw.connection.or_else(|| sole_connection.clone()) {
                Some(c) if connections.contains_key(&c) => c,
                Some(c) => {
                    return Err(SyncError::config(format!(
                        "pair '{}': unknown connection '{}'",
                        raw.name, c
                    )))
                }
                None => {
                    return Err(SyncError::config(format!(
                        "pair '{}': no connection given and {} are defined",
                        raw.name,
                        connections.len()
                    )))
                }
            };

            let patcher = raw.patcher.filter(|p| !p.is_empty());
            if let Some(name) = &patcher {
                if !patchers.contains(name) {
                    // Surfaces the list of known patchers.
                    patchers.get(Some(name.as_str()))?;
                }
            }

            pairs.push(SyncPair {
                name: raw.name,
                local: LocalFs::expand_home(&raw.local),
                remote: raw.remote,
                patcher,
                connection,
            });
        }

        Ok(Config {
            state_dir: self
                .state_dir
                .map(|d| LocalFs::expand_home(&d))
                .unwrap_or_else(default_home),
            jobs,
            timeout: self.timeout_secs.map(Duration::from_secs),
            connections,
            pairs,
        })
    }
}
