//! Batch orchestration across sync pairs.
//!
//! Pairs are independent units of work and run concurrently, bounded by
//! `jobs`. Each connection hands out at most `max_sessions` permits, and a
//! pair holds one for its whole run. A failing pair never stops the batch.

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::info;

use crate::config::{Config, Connection, SyncPair};
use crate::fs::{DirBackend, FtpBackend, RemoteBackend};
use crate::sync::backup::BackupStore;
use crate::sync::decision::{Direction, SyncDecision};
use crate::sync::engine::{Outcome, SyncEngine};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::patch::PatcherRegistry;
use crate::sync::state::StateStore;

/// What to do with each pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Let the decision engine pick.
    Auto,
    /// Skip the decision engine.
    Forced(Direction),
    /// Decide only; write nothing.
    Plan,
}

/// Result of one pair in a batch.
#[derive(Debug)]
pub enum PairStatus {
    Outcome(Outcome),
    Planned(SyncDecision),
}

#[derive(Debug)]
pub struct PairReport {
    pub pair: String,
    pub result: SyncResult<PairStatus>,
}

impl PairReport {
    /// Conflicts count as failures, including planned ones.
    pub fn failed(&self) -> bool {
        match &self.result {
            Err(_) => true,
            Ok(PairStatus::Planned(SyncDecision::Conflict(_))) => true,
            Ok(_) => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<PairReport>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.failed()).count()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

/// A remote endpoint shared by every pair that uses it.
#[derive(Clone)]
pub struct Endpoint {
    pub backend: Arc<dyn RemoteBackend>,
    permits: Arc<Semaphore>,
}

impl Endpoint {
    pub fn new(backend: Arc<dyn RemoteBackend>, max_sessions: usize) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(max_sessions.max(1))),
        }
    }

    pub fn from_connection(connection: &Connection) -> Self {
        let backend: Arc<dyn RemoteBackend> = match connection {
            Connection::Ftp { settings, .. } => Arc::new(FtpBackend::new(settings.clone())),
            Connection::Dir { root, .. } => Arc::new(DirBackend::new(root.clone())),
        };
        Self::new(backend, connection.max_sessions())
    }
}

pub struct Runner {
    engine: Arc<SyncEngine>,
    endpoints: BTreeMap<String, Endpoint>,
    jobs: usize,
    timeout: Option<Duration>,
}

impl Runner {
    pub fn new(engine: SyncEngine, endpoints: BTreeMap<String, Endpoint>) -> Self {
        Self {
            engine: Arc::new(engine),
            endpoints,
            jobs: 1,
            timeout: None,
        }
    }

    /// Build the engine and one endpoint per configured connection.
    pub fn from_config(config: &Config, patchers: PatcherRegistry) -> SyncResult<Self> {
        let engine = SyncEngine::new(
            StateStore::open(config.records_dir())?,
            BackupStore::new(config.backup_dir()),
            patchers,
        );
        let endpoints = config
            .connections
            .iter()
            .map(|(name, connection)| (name.clone(), Endpoint::from_connection(connection)))
            .collect();
        Ok(Self::new(engine, endpoints)
            .with_jobs(config.jobs)
            .with_timeout(config.timeout))
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Close every endpoint's session.
    pub async fn close(&self) {
        for endpoint in self.endpoints.values() {
            endpoint.backend.close().await;
        }
    }

    fn endpoint(&self, pair: &SyncPair) -> SyncResult<&Endpoint> {
        self.endpoints.get(&pair.connection).ok_or_else(|| {
            SyncError::config(format!(
                "pair '{}': unknown connection '{}'",
                pair.name, pair.connection
            ))
        })
    }

    /// Run a single pair, honouring the connection limit and the timeout.
    pub async fn run_pair(&self, pair: &SyncPair, mode: RunMode) -> PairReport {
        PairReport {
            pair: pair.name.clone(),
            result: self.run_pair_inner(pair, mode).await,
        }
    }

    async fn run_pair_inner(&self, pair: &SyncPair, mode: RunMode) -> SyncResult<PairStatus> {
        let endpoint = self.endpoint(pair)?;
        let _permit = endpoint
            .permits
            .acquire()
            .await
            .map_err(|e| SyncError::transfer(endpoint.backend.describe(), "waiting for", &pair.remote, e))?;
        let backend = endpoint.backend.as_ref();

        let work = async {
            match mode {
                RunMode::Auto => self.engine.execute(pair, backend, None).await.map(PairStatus::Outcome),
                RunMode::Forced(direction) => self
                    .engine
                    .execute(pair, backend, Some(direction))
                    .await
                    .map(PairStatus::Outcome),
                RunMode::Plan => self.engine.plan(pair, backend).await.map(PairStatus::Planned),
            }
        };

        match self.timeout {
            Some(after) => tokio::time::timeout(after, work).await.unwrap_or_else(|_| {
                Err(SyncError::Timeout {
                    pair: pair.name.clone(),
                    after,
                })
            }),
            None => work.await,
        }
    }

    /// Run every pair. Reports come back in the order pairs were given.
    pub async fn run_all(&self, pairs: &[SyncPair], mode: RunMode) -> BatchReport {
        info!(pairs = pairs.len(), jobs = self.jobs, ?mode, "Starting batch");
        let mut indexed: Vec<(usize, PairReport)> = stream::iter(pairs.iter().enumerate())
            .map(|(index, pair)| async move { (index, self.run_pair(pair, mode).await) })
            .buffer_unordered(self.jobs)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        let report = BatchReport {
            reports: indexed.into_iter().map(|(_, report)| report).collect(),
        };
        info!(
            pairs = report.reports.len(),
            failed = report.failed(),
            "Batch finished"
        );
        report
    }
}
