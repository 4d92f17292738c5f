//! Sync core: change detection, patching and transfer for file pairs.

pub mod backup;
pub mod decision;
pub mod engine;
pub mod error;
pub mod hash;
pub mod patch;
pub mod runner;
pub mod state;

pub use backup::BackupStore;
pub use decision::{decide, ConflictReason, Direction, Side, SyncDecision};
pub use engine::{Observed, Outcome, Snapshot, SyncEngine, SyncPhase, Transfer};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use hash::{hash_bytes, Fingerprint};
pub use patch::{
    DesmumePatcher, GzipPatcher, IdentityPatcher, Patcher, PatcherRegistry, DESMUME_FOOTER, IDENTITY,
};
pub use runner::{BatchReport, Endpoint, PairReport, PairStatus, RunMode, Runner};
pub use state::{StateStore, SyncRecord};
