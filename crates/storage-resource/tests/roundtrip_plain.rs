use std::fs;
use std::sync::Arc;

use storage_index::MemoryIndex;
use storage_resource::{DeleteOutcome, ResourceStore, StoreConfig, StoreError};

#[test]
fn roundtrip_plaintext_store_retrieve_delete() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let source = tmp.path().join("report.txt");
    fs::write(&source, b"hello world").unwrap();

    let store = ResourceStore::builder()
        .with_config(StoreConfig::plain(tmp.path().join("rs")))
        .with_index(Arc::new(MemoryIndex::new()))
        .build()
        .expect("build store");

    let id = store.store(&source).expect("store ok");
    let meta = store.metadata(&id).expect("metadata");
    assert_eq!(meta.filename, "report.txt");
    assert_eq!(meta.mimetype, "text/plain");
    assert!(meta.encryption_iv.is_none());
    assert_eq!(
        meta.content_hash,
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );

    assert_eq!(store.retrieve(&id).expect("retrieve ok"), b"hello world");

    assert_eq!(store.delete(&id).expect("delete ok"), DeleteOutcome::Removed);
    match store.retrieve(&id) {
        Err(StoreError::RecordNotFound { id: missing, .. }) => assert_eq!(missing, id),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn plain_blob_is_stored_verbatim() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let root = tmp.path().join("rs");
    let source = tmp.path().join("data.bin");
    let payload = vec![0_u8, 1, 2, 3, b' ', b'\n'];
    fs::write(&source, &payload).unwrap();

    let store = ResourceStore::builder()
        .with_config(StoreConfig::plain(&root))
        .with_index(Arc::new(MemoryIndex::new()))
        .build()
        .unwrap();

    let id = store.store(&source).unwrap();
    let meta = store.metadata(&id).unwrap();
    assert_eq!(fs::read(root.join(&meta.path)).unwrap(), payload);
    assert_eq!(store.retrieve(&id).unwrap(), payload);
    // Source is copied, not moved.
    assert!(source.exists());
}
