//! Transfer executor for a single sync pair.
//!
//! Runs `FetchState -> Decide -> (NoOp | Backup -> Transform -> Write ->
//! Commit)`. Nothing is written before the decision is made, the destination
//! is backed up before it is replaced, and the pair's record is only updated
//! after the write succeeded.

use humansize::{format_size, BINARY};
use tracing::{debug, error, info, warn};

use crate::config::SyncPair;
use crate::fs::{LocalFs, LocalStore, RemoteBackend};
use crate::sync::backup::BackupStore;
use crate::sync::decision::{decide, Direction, Side, SyncDecision};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::hash::Fingerprint;
use crate::sync::patch::PatcherRegistry;
use crate::sync::state::{StateStore, SyncRecord};
use std::path::PathBuf;
use std::sync::Arc;

/// Executor phases, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    FetchState,
    Decide,
    Backup,
    Transform,
    Write,
    Commit,
    Done,
    Skipped,
    Failed,
}

/// Bytes of one side together with their fingerprint.
#[derive(Debug, Clone)]
pub struct Observed {
    pub bytes: Vec<u8>,
    pub fingerprint: Fingerprint,
}

impl Observed {
    pub fn new(bytes: Vec<u8>) -> Self {
        let fingerprint = Fingerprint::of(&bytes);
        Self { bytes, fingerprint }
    }
}

/// Everything `Decide` needs: both sides as they are now, and the record.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub local: Option<Observed>,
    pub remote: Option<Observed>,
    pub record: Option<SyncRecord>,
}

impl Snapshot {
    pub fn decide(&self) -> SyncDecision {
        let record = self.record.as_ref();
        decide(
            Side::new(
                self.local.as_ref().map(|o| &o.fingerprint),
                record.and_then(|r| r.local.as_ref()),
            ),
            Side::new(
                self.remote.as_ref().map(|o| &o.fingerprint),
                record.and_then(|r| r.remote.as_ref()),
            ),
        )
    }

    fn side(&self, direction: Direction) -> (Option<&Observed>, Option<&Observed>) {
        match direction {
            Direction::LocalToRemote => (self.local.as_ref(), self.remote.as_ref()),
            Direction::RemoteToLocal => (self.remote.as_ref(), self.local.as_ref()),
        }
    }
}

/// A completed transfer.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub direction: Direction,
    /// Bytes written to the destination.
    pub bytes: usize,
    pub backup: Option<PathBuf>,
    /// The record committed for the pair.
    pub record: SyncRecord,
}

/// Terminal state of a successful run. Failures are the `Err` side.
#[derive(Debug, Clone)]
pub enum Outcome {
    Synced(Transfer),
    Skipped,
}

impl Outcome {
    pub fn phase(&self) -> SyncPhase {
        match self {
            Outcome::Synced(_) => SyncPhase::Done,
            Outcome::Skipped => SyncPhase::Skipped,
        }
    }
}

/// Executes sync attempts against a record store, backup store and patchers.
pub struct SyncEngine {
    state: StateStore,
    backups: BackupStore,
    patchers: PatcherRegistry,
    local: Arc<dyn LocalStore>,
}

impl SyncEngine {
    pub fn new(state: StateStore, backups: BackupStore, patchers: PatcherRegistry) -> Self {
        Self {
            state,
            backups,
            patchers,
            local: Arc::new(LocalFs),
        }
    }

    /// Swap the local filesystem access, e.g. for a disk that rejects writes.
    pub fn with_local_store(mut self, local: Arc<dyn LocalStore>) -> Self {
        self.local = local;
        self
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Read both sides and load the pair's record.
    pub async fn snapshot(&self, pair: &SyncPair, remote: &dyn RemoteBackend) -> SyncResult<Snapshot> {
        enter(pair, SyncPhase::FetchState);
        let local = self.local.read(&pair.local)?.map(Observed::new);
        let remote = remote.fetch(&pair.remote).await?.map(Observed::new);
        let record = self.state.load(&pair.name);

        let fp = |o: Option<&Observed>| o.map(|o| o.fingerprint.short().to_string());
        let prev = |f: Option<&Fingerprint>| f.map(|f| f.short().to_string());
        debug!(
            pair = %pair.name,
            "local: {:?} -> {:?}    remote: {:?} -> {:?}",
            prev(record.as_ref().and_then(|r| r.local.as_ref())),
            fp(local.as_ref()),
            prev(record.as_ref().and_then(|r| r.remote.as_ref())),
            fp(remote.as_ref())
        );

        Ok(Snapshot {
            local,
            remote,
            record,
        })
    }

    /// Work out what a sync would do, without writing anything.
    pub async fn plan(&self, pair: &SyncPair, remote: &dyn RemoteBackend) -> SyncResult<SyncDecision> {
        let _guard = self.state.lock(&pair.name).await;
        let snapshot = self.snapshot(pair, remote).await?;
        enter(pair, SyncPhase::Decide);
        Ok(snapshot.decide())
    }

    /// Forget the pair's last-sync record. The next run treats the pair as
    /// never synced.
    pub async fn reset(&self, pair: &SyncPair) -> SyncResult<()> {
        let _guard = self.state.lock(&pair.name).await;
        self.state.clear(&pair.name)?;
        info!(pair = %pair.name, "Sync record cleared");
        Ok(())
    }

    /// Run one sync attempt for `pair`.
    ///
    /// With `forced` set the decision engine is skipped and bytes flow in
    /// that direction regardless of what changed. This is how conflicts and
    /// first runs are resolved.
    pub async fn execute(
        &self,
        pair: &SyncPair,
        remote: &dyn RemoteBackend,
        forced: Option<Direction>,
    ) -> SyncResult<Outcome> {
        let _guard = self.state.lock(&pair.name).await;
        let result = self.run(pair, remote, forced).await;
        match &result {
            Ok(outcome) => enter(pair, outcome.phase()),
            Err(e) => {
                enter(pair, SyncPhase::Failed);
                error!(pair = %pair.name, kind = e.kind().name(), "{}", e);
            }
        }
        result
    }

    async fn run(
        &self,
        pair: &SyncPair,
        remote: &dyn RemoteBackend,
        forced: Option<Direction>,
    ) -> SyncResult<Outcome> {
        let snapshot = self.snapshot(pair, remote).await?;

        enter(pair, SyncPhase::Decide);
        let decision = match forced {
            Some(direction) => {
                info!(pair = %pair.name, %direction, "Forced sync direction");
                SyncDecision::from_direction(direction)
            }
            None => snapshot.decide(),
        };

        let direction = match decision {
            SyncDecision::NoOp => {
                info!(pair = %pair.name, "Not syncing: neither side changed");
                return Ok(Outcome::Skipped);
            }
            SyncDecision::Conflict(reason) => {
                return Err(SyncError::Conflict {
                    pair: pair.name.clone(),
                    reason: reason.to_string(),
                });
            }
            SyncDecision::PushLocalToRemote => Direction::LocalToRemote,
            SyncDecision::PullRemoteToLocal => Direction::RemoteToLocal,
        };

        self.transfer(pair, remote, &snapshot, direction).await.map(Outcome::Synced)
    }

    async fn transfer(
        &self,
        pair: &SyncPair,
        remote: &dyn RemoteBackend,
        snapshot: &Snapshot,
        direction: Direction,
    ) -> SyncResult<Transfer> {
        let (source, destination) = snapshot.side(direction);
        let Some(source) = source else {
            let side = match direction {
                Direction::LocalToRemote => "local",
                Direction::RemoteToLocal => "remote",
            };
            return Err(SyncError::Conflict {
                pair: pair.name.clone(),
                reason: format!("{} file does not exist, nothing to copy", side),
            });
        };
        let target = match direction {
            Direction::LocalToRemote => pair.remote.clone(),
            Direction::RemoteToLocal => pair.local.display().to_string(),
        };
        info!(pair = %pair.name, %direction, "Syncing {}", target);

        enter(pair, SyncPhase::Backup);
        let backup = match destination {
            Some(current) => Some(self.backups.save(&pair.name, direction, &target, &current.bytes)?),
            None => {
                info!(pair = %pair.name, "Destination does not exist, nothing to back up");
                None
            }
        };

        enter(pair, SyncPhase::Transform);
        let output = self
            .patchers
            .apply(direction, &source.bytes, pair.patcher.as_deref())?;
        let written = Fingerprint::of(&output);
        let bytes = output.len();

        enter(pair, SyncPhase::Write);
        match direction {
            Direction::LocalToRemote => {
                if !remote.atomic_put() {
                    warn!(pair = %pair.name, endpoint = %remote.describe(), "Remote overwrite is not atomic");
                }
                remote.put(&pair.remote, output).await?;
            }
            Direction::RemoteToLocal => self.local.write(&pair.local, &output)?,
        }

        enter(pair, SyncPhase::Commit);
        let record = match direction {
            Direction::LocalToRemote => SyncRecord::new(source.fingerprint.clone(), written),
            Direction::RemoteToLocal => SyncRecord::new(written, source.fingerprint.clone()),
        };
        self.state.save(&pair.name, &record)?;

        info!(
            pair = %pair.name,
            %direction,
            size = %format_size(bytes, BINARY),
            "Sync complete"
        );
        Ok(Transfer {
            direction,
            bytes,
            backup,
            record,
        })
    }
}

fn enter(pair: &SyncPair, phase: SyncPhase) {
    debug!(pair = %pair.name, ?phase, "Sync phase");
}
