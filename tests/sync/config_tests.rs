// End-to-end: config file on disk to a finished batch

use ftp_sync::config::{Config, Connection};
use ftp_sync::sync::{PatcherRegistry, RunMode, Runner, DESMUME_FOOTER};
use std::fs;
use tempfile::tempdir;

#[tokio::test]
async fn test_config_file_drives_directory_sync() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("remote")).unwrap();
    fs::create_dir_all(root.join("local")).unwrap();
    fs::write(root.join("remote/pokemon.sav"), b"raw save").unwrap();
    fs::write(root.join("local/notes.txt"), b"notes").unwrap();

    let config_path = root.join("config.yaml");
    fs::write(
        &config_path,
        format!(
            r#"
state_dir: {state}
jobs: 2
connections:
  card:
    kind: dir
    root: {remote}
sync:
  - name: pokemon
    local: {local}/pokemon.dsv
    remote: /pokemon.sav
    patcher: desmume
  - name: notes
    local_path: {local}/notes.txt
    remote_path: notes.txt
"#,
            state = root.join("state").display(),
            remote = root.join("remote").display(),
            local = root.join("local").display(),
        ),
    )
    .unwrap();

    let patchers = PatcherRegistry::with_builtins();
    let config = Config::load(&config_path, &patchers).unwrap();
    assert_eq!(config.pairs.len(), 2);
    assert!(config.pairs.iter().all(|p| p.connection == "card"));
    assert!(matches!(
        config.connections.get("card"),
        Some(Connection::Dir { max_sessions: 1, .. })
    ));

    let runner = Runner::from_config(&config, patchers).unwrap();
    let batch = runner.run_all(&config.pairs, RunMode::Auto).await;
    assert!(batch.success(), "{:?}", batch.reports);

    let mut expected = b"raw save".to_vec();
    expected.extend_from_slice(DESMUME_FOOTER);
    assert_eq!(fs::read(root.join("local/pokemon.dsv")).unwrap(), expected);
    assert_eq!(fs::read(root.join("remote/notes.txt")).unwrap(), b"notes");
    assert!(root.join("state/records/pokemon.json").is_file());
    assert!(root.join("state/records/notes.json").is_file());

    let again = runner.run_all(&config.pairs, RunMode::Auto).await;
    assert!(again.success());
    assert!(runner.engine().backups().list("pokemon").unwrap().is_empty());
}

#[test]
fn test_missing_config_file_is_config_error() {
    let dir = tempdir().unwrap();
    let err = Config::load(&dir.path().join("absent.yaml"), &PatcherRegistry::with_builtins())
        .unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}
