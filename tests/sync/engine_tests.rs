// Tests for the single-pair executor
// Covers the decision table, backups, records and failure handling

use crate::common::{Harness, REMOTE_PATH};
use ftp_sync::fs::{DirBackend, LocalFs, LocalStore, MemoryBackend, RemoteBackend};
use ftp_sync::sync::{
    ConflictReason, DesmumePatcher, Direction, Fingerprint, GzipPatcher, Outcome, Patcher,
    SyncDecision, SyncError, SyncRecord, SyncResult, DESMUME_FOOTER,
};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Local disk that reads normally but rejects every write.
struct ReadOnlyDisk;

impl LocalStore for ReadOnlyDisk {
    fn read(&self, path: &Path) -> SyncResult<Option<Vec<u8>>> {
        LocalFs::read_optional(path)
    }

    fn write(&self, path: &Path, _data: &[u8]) -> SyncResult<()> {
        Err(SyncError::io(
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only filesystem"),
            "replacing",
            path,
        ))
    }
}

fn desmume(raw: &[u8]) -> Vec<u8> {
    let mut out = raw.to_vec();
    out.extend_from_slice(DESMUME_FOOTER);
    out
}

#[tokio::test]
async fn test_first_run_pushes_patched_bytes() {
    let h = Harness::new();
    let pair = h.pair("game", Some("gzip"));
    h.write_local(&pair, b"save data A");
    let remote = MemoryBackend::new();

    let outcome = h.engine.execute(&pair, &remote, None).await.unwrap();
    let Outcome::Synced(transfer) = outcome else {
        panic!("expected a transfer");
    };
    assert_eq!(transfer.direction, Direction::LocalToRemote);
    assert!(transfer.backup.is_none());

    let expected = GzipPatcher::default().forward(b"save data A").unwrap();
    assert_eq!(remote.read(REMOTE_PATH).unwrap(), expected);

    let record = h.engine.state().load("game").unwrap();
    assert_eq!(record.local, Some(Fingerprint::of(b"save data A")));
    assert_eq!(record.remote, Some(Fingerprint::of(&expected)));
    assert!(record.synced_at.is_some());
}

#[tokio::test]
async fn test_unchanged_pair_is_noop() {
    let h = Harness::new();
    let pair = h.pair("game", None);
    h.write_local(&pair, b"A");
    let remote = MemoryBackend::new();
    h.engine.execute(&pair, &remote, None).await.unwrap();
    let record = h.engine.state().load("game").unwrap();

    let outcome = h.engine.execute(&pair, &remote, None).await.unwrap();
    assert!(matches!(outcome, Outcome::Skipped));
    assert_eq!(remote.put_count(), 1);
    assert_eq!(h.read_local(&pair), b"A");
    assert!(h.engine.backups().list("game").unwrap().is_empty());
    assert_eq!(h.engine.state().load("game").unwrap(), record);
}

#[tokio::test]
async fn test_local_change_pushes() {
    let h = Harness::new();
    let pair = h.pair("game", None);
    h.write_local(&pair, b"A");
    let remote = MemoryBackend::new();
    h.engine.execute(&pair, &remote, None).await.unwrap();

    h.write_local(&pair, b"B");
    let outcome = h.engine.execute(&pair, &remote, None).await.unwrap();
    assert!(matches!(outcome, Outcome::Synced(ref t) if t.direction == Direction::LocalToRemote));
    assert_eq!(remote.read(REMOTE_PATH).unwrap(), b"B");

    let record = h.engine.state().load("game").unwrap();
    assert_eq!(record.local, Some(Fingerprint::of(b"B")));
    assert_eq!(record.remote, Some(Fingerprint::of(b"B")));

    // The overwritten remote copy was kept.
    let backups = h.engine.backups().list("game").unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read(&backups[0]).unwrap(), b"A");
}

#[tokio::test]
async fn test_remote_change_pulls_through_patcher() {
    let h = Harness::new();
    let pair = h.pair("game", Some("desmume"));
    h.write_local(&pair, &desmume(b"B"));
    let remote = MemoryBackend::new();
    h.engine.execute(&pair, &remote, None).await.unwrap();
    assert_eq!(remote.read(REMOTE_PATH).unwrap(), b"B");

    remote.insert(REMOTE_PATH, b"C");
    let outcome = h.engine.execute(&pair, &remote, None).await.unwrap();
    assert!(matches!(outcome, Outcome::Synced(ref t) if t.direction == Direction::RemoteToLocal));
    assert_eq!(h.read_local(&pair), desmume(b"C"));

    let record = h.engine.state().load("game").unwrap();
    assert_eq!(record.local, Some(Fingerprint::of(&desmume(b"C"))));
    assert_eq!(record.remote, Some(Fingerprint::of(b"C")));

    let outcome = h.engine.execute(&pair, &remote, None).await.unwrap();
    assert!(matches!(outcome, Outcome::Skipped));
}

#[tokio::test]
async fn test_both_changed_is_conflict() {
    let h = Harness::new();
    let pair = h.pair("game", None);
    h.write_local(&pair, b"A");
    let remote = MemoryBackend::new();
    h.engine.execute(&pair, &remote, None).await.unwrap();
    let record = h.engine.state().load("game").unwrap();

    h.write_local(&pair, b"local edit");
    remote.insert(REMOTE_PATH, b"remote edit");

    assert_eq!(
        h.engine.plan(&pair, &remote).await.unwrap(),
        SyncDecision::Conflict(ConflictReason::BothChanged)
    );
    let err = h.engine.execute(&pair, &remote, None).await.unwrap_err();
    assert!(err.is_conflict());
    assert!(err.to_string().contains("sync-to"));

    assert_eq!(h.read_local(&pair), b"local edit");
    assert_eq!(remote.read(REMOTE_PATH).unwrap(), b"remote edit");
    assert_eq!(remote.put_count(), 1);
    assert_eq!(h.engine.state().load("game").unwrap(), record);
}

#[tokio::test]
async fn test_first_run_with_both_sides_conflicts_until_forced() {
    let h = Harness::new();
    let pair = h.pair("game", None);
    h.write_local(&pair, b"local");
    let remote = MemoryBackend::new().with_file(REMOTE_PATH, b"remote");

    let err = h.engine.execute(&pair, &remote, None).await.unwrap_err();
    assert!(err.is_conflict());

    let outcome = h
        .engine
        .execute(&pair, &remote, Some(Direction::RemoteToLocal))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Synced(_)));
    assert_eq!(h.read_local(&pair), b"remote");

    let outcome = h.engine.execute(&pair, &remote, None).await.unwrap();
    assert!(matches!(outcome, Outcome::Skipped));
}

#[tokio::test]
async fn test_half_record_is_mismatch() {
    let h = Harness::new();
    let pair = h.pair("game", None);
    h.write_local(&pair, b"A");
    let remote = MemoryBackend::new().with_file(REMOTE_PATH, b"A");
    let record = SyncRecord {
        local: Some(Fingerprint::of(b"A")),
        remote: None,
        synced_at: None,
    };
    h.engine.state().save("game", &record).unwrap();

    assert_eq!(
        h.engine.plan(&pair, &remote).await.unwrap(),
        SyncDecision::Conflict(ConflictReason::PreviousStateMismatch)
    );
}

#[tokio::test]
async fn test_corrupt_record_means_no_state() {
    let h = Harness::new();
    let pair = h.pair("game", None);
    h.write_local(&pair, b"A");
    let remote = MemoryBackend::new().with_file(REMOTE_PATH, b"A");
    fs::write(h.engine.state().record_path("game"), b"{ not json").unwrap();

    assert!(h.engine.state().load("game").is_none());
    assert_eq!(
        h.engine.plan(&pair, &remote).await.unwrap(),
        SyncDecision::Conflict(ConflictReason::BothChanged)
    );
}

#[tokio::test]
async fn test_non_hex_record_with_debug_logging() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();
    let _log = tracing::subscriber::set_default(subscriber);

    let h = Harness::new();
    let pair = h.pair("game", None);
    h.write_local(&pair, b"A");
    let remote = MemoryBackend::new().with_file(REMOTE_PATH, b"A");
    fs::write(
        h.engine.state().record_path("game"),
        r#"{"local": "aaaaaaaaaaaé", "remote": "aaaaaaaaaaaé"}"#,
    )
    .unwrap();

    assert!(h.engine.state().load("game").is_none());
    assert_eq!(
        h.engine.plan(&pair, &remote).await.unwrap(),
        SyncDecision::Conflict(ConflictReason::BothChanged)
    );
}

#[tokio::test]
async fn test_failed_write_keeps_destination_and_record() {
    let h = Harness::new();
    let pair = h.pair("game", None);
    h.write_local(&pair, b"A");
    let remote = MemoryBackend::new();
    h.engine.execute(&pair, &remote, None).await.unwrap();
    let record = h.engine.state().load("game").unwrap();

    h.write_local(&pair, b"B");
    remote.set_fail_puts(true);
    let err = h.engine.execute(&pair, &remote, None).await.unwrap_err();
    assert!(matches!(err, SyncError::Transfer { .. }));

    assert_eq!(remote.read(REMOTE_PATH).unwrap(), b"A");
    assert_eq!(h.engine.state().load("game").unwrap(), record);
    let backups = h.engine.backups().list("game").unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read(&backups[0]).unwrap(), b"A");

    // Once the remote recovers the same change goes through.
    remote.set_fail_puts(false);
    h.engine.execute(&pair, &remote, None).await.unwrap();
    assert_eq!(remote.read(REMOTE_PATH).unwrap(), b"B");
}

#[tokio::test]
async fn test_failed_local_write_keeps_local_and_record() {
    let h = Harness::with_local_store(Arc::new(ReadOnlyDisk));
    let pair = h.pair("game", None);
    h.write_local(&pair, b"A");
    let remote = MemoryBackend::new();
    h.engine.execute(&pair, &remote, None).await.unwrap();
    let record = h.engine.state().load("game").unwrap();

    remote.insert(REMOTE_PATH, b"C");
    let err = h.engine.execute(&pair, &remote, None).await.unwrap_err();
    assert!(matches!(err, SyncError::Io { .. }));

    assert_eq!(h.read_local(&pair), b"A");
    assert_eq!(h.engine.state().load("game").unwrap(), record);
    let backups = h.engine.backups().list("game").unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read(&backups[0]).unwrap(), b"A");
    assert!(backups[0].to_string_lossy().contains("__local__"));
}

#[tokio::test]
async fn test_failed_commit_degrades_to_conflict() {
    let h = Harness::new();
    let pair = h.pair("game", None);
    h.write_local(&pair, b"A");
    let remote = MemoryBackend::new();

    // A directory where the record file should go makes the commit fail.
    fs::create_dir_all(h.engine.state().record_path("game")).unwrap();
    let err = h.engine.execute(&pair, &remote, None).await.unwrap_err();
    assert!(matches!(err, SyncError::State { .. }));
    assert_eq!(remote.read(REMOTE_PATH).unwrap(), b"A");

    let err = h.engine.execute(&pair, &remote, None).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(remote.put_count(), 1);
}

#[tokio::test]
async fn test_bad_patch_input_writes_nothing() {
    let h = Harness::new();
    let pair = h.pair("game", Some("desmume"));
    h.write_local(&pair, b"no footer here");
    let remote = MemoryBackend::new();

    let err = h.engine.execute(&pair, &remote, None).await.unwrap_err();
    assert!(matches!(err, SyncError::Patch { .. }));
    assert!(remote.read(REMOTE_PATH).is_none());
    assert!(h.engine.state().load("game").is_none());
}

#[tokio::test]
async fn test_directory_remote() {
    let h = Harness::new();
    let pair = h.pair("game", Some("desmume"));
    let remote = DirBackend::new(h.remote_root());
    fs::create_dir_all(h.remote_root().join("saves")).unwrap();
    fs::write(h.remote_root().join("saves/game.sav"), b"raw").unwrap();

    let outcome = h.engine.execute(&pair, &remote, None).await.unwrap();
    assert!(matches!(outcome, Outcome::Synced(ref t) if t.direction == Direction::RemoteToLocal));
    assert_eq!(h.read_local(&pair), DesmumePatcher.reverse(b"raw").unwrap());
    assert!(remote.exists(REMOTE_PATH).await.unwrap());

    let outcome = h.engine.execute(&pair, &remote, None).await.unwrap();
    assert!(matches!(outcome, Outcome::Skipped));
}

#[tokio::test]
async fn test_reset_forgets_record() {
    let h = Harness::new();
    let pair = h.pair("game", None);
    h.write_local(&pair, b"A");
    let remote = MemoryBackend::new();
    h.engine.execute(&pair, &remote, None).await.unwrap();
    assert_eq!(h.engine.plan(&pair, &remote).await.unwrap(), SyncDecision::NoOp);

    h.engine.reset(&pair).await.unwrap();
    assert!(h.engine.state().load("game").is_none());
    assert_eq!(
        h.engine.plan(&pair, &remote).await.unwrap(),
        SyncDecision::Conflict(ConflictReason::BothChanged)
    );
    // Resetting a pair with no record is fine.
    h.engine.reset(&pair).await.unwrap();
}
