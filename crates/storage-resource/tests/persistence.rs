use std::fs;
use std::sync::Arc;

use storage_index::JsonFileIndex;
use storage_resource::{HandlerKind, ResourceStore, StoreConfig, StoreError};

fn open(config: StoreConfig) -> Result<ResourceStore, StoreError> {
    let index = JsonFileIndex::open(config.index_path());
    ResourceStore::builder()
        .with_config(config)
        .with_index(Arc::new(index))
        .build()
}

#[test]
fn reopened_store_reads_existing_objects() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("rs");
    let source = tmp.path().join("report.txt");
    fs::write(&source, b"hello world").unwrap();

    let id = {
        let store = open(StoreConfig::encrypted(&root, "correct-key")).unwrap();
        let id = store.store(&source).unwrap();
        store.retrieve(&id).unwrap();
        id
    };
    assert!(root.join("res_storage.json").exists());

    // Fresh process: same root, same passphrase.
    let store = open(StoreConfig::encrypted(&root, "correct-key")).unwrap();
    assert_eq!(store.retrieve(&id).unwrap(), b"hello world");
    assert_eq!(store.metadata(&id).unwrap().access_count, 2);
}

#[test]
fn config_file_drives_the_store() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("rs");
    let config_path = tmp.path().join("res_storage.toml");
    fs::write(
        &config_path,
        format!(
            "storage_dir = {:?}\npassphrase = \"correct-key\"\nhandler = \"RSFileEncrypted\"\n",
            root.display().to_string()
        ),
    )
    .unwrap();

    let config = StoreConfig::load(&config_path).unwrap();
    assert_eq!(config.handler, HandlerKind::Encrypted);
    let store = open(config).unwrap();
    assert!(root.is_dir());

    let source = tmp.path().join("report.txt");
    fs::write(&source, b"hello world").unwrap();
    let id = store.store(&source).unwrap();
    assert!(store.metadata(&id).unwrap().encryption_iv.is_some());
}

#[test]
fn missing_passphrase_fails_at_construction() {
    let tmp = tempfile::tempdir().unwrap();
    match open(StoreConfig::encrypted(tmp.path().join("rs"), "")) {
        Err(StoreError::Config(_)) => {}
        Err(other) => panic!("expected config error, got {other:?}"),
        Ok(_) => panic!("store built without a passphrase"),
    }
}

#[test]
fn unusable_storage_root_is_a_path_error() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("file");
    fs::write(&blocker, b"not a directory").unwrap();
    match open(StoreConfig::plain(blocker.join("rs"))) {
        Err(StoreError::PathCreation { path, .. }) => assert_eq!(path, blocker.join("rs")),
        Err(other) => panic!("expected path creation error, got {other:?}"),
        Ok(_) => panic!("store built under a regular file"),
    }
}
