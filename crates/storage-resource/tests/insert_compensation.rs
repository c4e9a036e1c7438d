use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use storage_index::{
    IndexError, MemoryIndex, MetadataIndex, RecordUpdate, ResourceRecord, TableSchema,
};
use storage_resource::store::fs::walk_files;
use storage_resource::{ResourceStore, StoreConfig, StoreError};

/// Index whose inserts can be switched off.
#[derive(Default)]
struct FlakyIndex {
    inner: MemoryIndex,
    reject_inserts: AtomicBool,
}

impl MetadataIndex for FlakyIndex {
    fn table_exists(&self) -> Result<bool, IndexError> {
        self.inner.table_exists()
    }
    fn create_table(&self, schema: &TableSchema) -> Result<(), IndexError> {
        self.inner.create_table(schema)
    }
    fn insert(&self, record: &ResourceRecord) -> Result<(), IndexError> {
        if self.reject_inserts.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("insert rejected".into()));
        }
        self.inner.insert(record)
    }
    fn get_by_key(&self, id: &str) -> Result<Option<ResourceRecord>, IndexError> {
        self.inner.get_by_key(id)
    }
    fn update_by_key(&self, id: &str, update: &RecordUpdate) -> Result<bool, IndexError> {
        self.inner.update_by_key(id, update)
    }
    fn delete_by_key(&self, id: &str) -> Result<bool, IndexError> {
        self.inner.delete_by_key(id)
    }
    fn keys(&self) -> Result<Vec<String>, IndexError> {
        self.inner.keys()
    }
}

#[test]
fn failed_insert_removes_encrypted_blob() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("rs");
    let source = tmp.path().join("report.txt");
    fs::write(&source, b"hello world").unwrap();

    let index = Arc::new(FlakyIndex::default());
    let store = ResourceStore::builder()
        .with_config(StoreConfig::encrypted(&root, "correct-key"))
        .with_index(index.clone())
        .build()
        .unwrap();

    // A successful store first, so the tree is not trivially empty.
    let kept = store.store(&source).unwrap();
    let before = walk_files(&root).unwrap();
    assert_eq!(before.len(), 1);

    index.reject_inserts.store(true, Ordering::SeqCst);
    match store.store(&source) {
        Err(StoreError::MetadataInsert { id, detail }) => {
            assert_ne!(id, kept);
            assert!(detail.contains("insert rejected"));
        }
        other => panic!("expected metadata insert error, got {other:?}"),
    }

    assert_eq!(walk_files(&root).unwrap(), before);
    assert_eq!(index.keys().unwrap(), vec![kept]);
}

#[test]
fn failed_insert_removes_plain_blob() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("rs");
    let source = tmp.path().join("notes.md");
    fs::write(&source, b"# notes").unwrap();

    let index = Arc::new(FlakyIndex::default());
    index.reject_inserts.store(true, Ordering::SeqCst);
    let store = ResourceStore::builder()
        .with_config(StoreConfig::plain(&root))
        .with_index(index)
        .build()
        .unwrap();

    assert!(matches!(
        store.store(&source),
        Err(StoreError::MetadataInsert { .. })
    ));
    assert!(walk_files(&root).unwrap().is_empty());
}
