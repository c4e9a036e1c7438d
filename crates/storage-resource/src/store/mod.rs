use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use storage_index::{IndexError, MetadataIndex, RecordUpdate, ResourceRecord, RESOURCE_SCHEMA};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{Operation, StoreError};
use crate::handler::{Download, ObjectHandler};
use crate::kms::{IvSource, OsIvSource};

pub mod fs;

pub use fs::DeleteOutcome;

/// Findings from [`ResourceStore::reconcile`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Interrupted writes that were cleaned up.
    pub pending_removed: Vec<PathBuf>,
    /// Blobs with no record.
    pub orphaned_blobs: Vec<PathBuf>,
    /// Records whose blob is missing.
    pub dangling_records: Vec<String>,
    /// Ids matched by more than one record. Never repaired automatically.
    pub duplicate_records: Vec<String>,
    /// Whether orphans and dangling records were removed.
    pub repaired: bool,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_blobs.is_empty()
            && self.dangling_records.is_empty()
            && self.duplicate_records.is_empty()
    }
}

/// Orchestrates ids, object handlers, and the metadata index.
///
/// Callers must serialize operations on the same id; operations on distinct
/// ids share no mutable state.
pub struct ResourceStore {
    config: StoreConfig,
    index: Arc<dyn MetadataIndex>,
    iv_source: Arc<dyn IvSource>,
}

impl ResourceStore {
    pub fn builder() -> ResourceStoreBuilder {
        ResourceStoreBuilder::default()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn new_handler(&self) -> ObjectHandler {
        ObjectHandler::new(
            self.config.handler,
            &self.config.storage_dir,
            &self.config.passphrase,
            self.iv_source.clone(),
        )
    }

    /// Copy `source` into the store and return its new id.
    pub fn store(&self, source: impl AsRef<Path>) -> Result<String, StoreError> {
        let mut handler = self.new_handler();
        let record = handler.store(source.as_ref())?.to_record();

        if let Err(err) = self.index.insert(&record) {
            tracing::warn!(id = %record.id, error = %err, "metadata insert failed, removing blob");
            match handler.delete() {
                Ok(outcome) if outcome.is_success() => {}
                Ok(_) | Err(_) => {
                    tracing::error!(id = %record.id, path = %record.path, "orphaned blob left behind");
                }
            }
            return Err(StoreError::MetadataInsert {
                id: record.id,
                detail: err.to_string(),
            });
        }

        tracing::info!(id = %record.id, handler = %handler.kind(), "stored resource");
        Ok(record.id)
    }

    /// Decrypted (or plain) content of `id`.
    pub fn retrieve(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        let (handler, record) = self.open_handler(Operation::Retrieve, id)?;
        let content = handler.retrieve_content()?;
        self.record_access(Operation::Retrieve, &record);
        Ok(content)
    }

    /// Content plus the filename and mimetype needed to frame it as an attachment.
    pub fn download(&self, id: &str) -> Result<Download, StoreError> {
        let (handler, record) = self.open_handler(Operation::Download, id)?;
        let download = handler.deliver_for_download()?;
        self.record_access(Operation::Download, &record);
        Ok(download)
    }

    /// Remove the blob, then the record. A `Denied` blob removal keeps the record.
    pub fn delete(&self, id: &str) -> Result<DeleteOutcome, StoreError> {
        let (handler, _) = self.open_handler(Operation::Delete, id)?;
        let outcome = handler.delete()?;
        if !outcome.is_success() {
            tracing::warn!(id, "blob could not be removed; keeping record");
            return Ok(outcome);
        }
        match self.index.delete_by_key(id) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(id, "record disappeared before delete"),
            Err(err) => return Err(StoreError::Index(err.to_string())),
        }
        tracing::info!(id, ?outcome, "deleted resource");
        Ok(outcome)
    }

    pub fn metadata(&self, id: &str) -> Result<ResourceRecord, StoreError> {
        self.fetch(Operation::Metadata, id)
    }

    /// Compare the blob tree against the index.
    ///
    /// Pending write markers are always removed, so this must not run while a
    /// store is in flight. With `repair`, orphaned blobs and dangling records
    /// are removed as well. Duplicated ids are only reported.
    pub fn reconcile(&self, repair: bool) -> Result<ReconcileReport, StoreError> {
        let op = Operation::Reconcile;
        let root = &self.config.storage_dir;
        let mut report = ReconcileReport {
            repaired: repair,
            ..ReconcileReport::default()
        };
        let keys: BTreeSet<String> = self
            .index
            .keys()
            .map_err(|e| StoreError::Index(e.to_string()))?
            .into_iter()
            .collect();
        let mut expected: HashMap<PathBuf, String> = HashMap::new();
        let mut shared: HashSet<PathBuf> = HashSet::new();
        for id in keys {
            match self.index.get_by_key(&id) {
                Ok(Some(record)) => {
                    expected.insert(fs::resolve(root, &record.path), id);
                }
                Ok(None) => {}
                Err(IndexError::DuplicateKey(_)) => {
                    // Ambiguous records still claim the blob their id maps to.
                    shared.insert(fs::resolve(root, &fs::blob_relative_path(&id)));
                    report.duplicate_records.push(id);
                }
                Err(err) => return Err(StoreError::Index(err.to_string())),
            }
        }

        let files = fs::walk_files(root)
            .map_err(|e| StoreError::io(op, &root.display().to_string(), e))?;
        let mut present = HashSet::new();
        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(&format!(".{}", fs::PENDING_SUFFIX)) {
                if Uuid::parse_str(stem).is_ok() && fs::remove_blob(&path).is_success() {
                    report.pending_removed.push(path);
                }
                continue;
            }
            if Uuid::parse_str(name).is_err() {
                continue;
            }
            if expected.contains_key(&path) {
                present.insert(path);
            } else if !shared.contains(&path) {
                if repair {
                    fs::remove_blob(&path);
                }
                report.orphaned_blobs.push(path);
            }
        }

        for (path, id) in &expected {
            if present.contains(path) {
                continue;
            }
            if repair {
                self.index
                    .delete_by_key(id)
                    .map_err(|e| StoreError::Index(e.to_string()))?;
            }
            report.dangling_records.push(id.clone());
        }
        report.dangling_records.sort();

        tracing::info!(
            pending = report.pending_removed.len(),
            orphaned = report.orphaned_blobs.len(),
            dangling = report.dangling_records.len(),
            duplicates = report.duplicate_records.len(),
            repair,
            "reconciled storage"
        );
        Ok(report)
    }

    fn fetch(&self, op: Operation, id: &str) -> Result<ResourceRecord, StoreError> {
        let not_found = |detail: &str| StoreError::RecordNotFound {
            op,
            id: id.to_string(),
            detail: detail.to_string(),
        };
        match self.index.get_by_key(id) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(not_found("no matching record")),
            Err(IndexError::DuplicateKey(_)) => Err(not_found("more than one record matches")),
            Err(err) => Err(StoreError::Index(err.to_string())),
        }
    }

    fn open_handler(
        &self,
        op: Operation,
        id: &str,
    ) -> Result<(ObjectHandler, ResourceRecord), StoreError> {
        let record = self.fetch(op, id)?;
        let mut handler = self.new_handler();
        handler.initialize(&record)?;
        Ok((handler, record))
    }

    /// Best effort: a failed statistics update is logged, never returned.
    fn record_access(&self, op: Operation, record: &ResourceRecord) {
        let update = RecordUpdate::accessed(record, SystemTime::now());
        let detail = match self.index.update_by_key(&record.id, &update) {
            Ok(true) => return,
            Ok(false) => "no matching record".to_string(),
            Err(err) => err.to_string(),
        };
        let err = StoreError::MetadataUpdate {
            op,
            id: record.id.clone(),
            detail,
        };
        tracing::warn!(error = %err, "access statistics not recorded");
    }
}

#[derive(Default)]
pub struct ResourceStoreBuilder {
    config: Option<StoreConfig>,
    index: Option<Arc<dyn MetadataIndex>>,
    iv_source: Option<Arc<dyn IvSource>>,
}

impl ResourceStoreBuilder {
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_index(mut self, index: Arc<dyn MetadataIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_iv_source(mut self, source: Arc<dyn IvSource>) -> Self {
        self.iv_source = Some(source);
        self
    }

    /// Validate the configuration, provision the storage root, and make sure
    /// the index table exists.
    pub fn build(self) -> Result<ResourceStore, StoreError> {
        let config = self
            .config
            .ok_or_else(|| StoreError::Config("store configuration is required".into()))?;
        let index = self
            .index
            .ok_or_else(|| StoreError::Config("a metadata index is required".into()))?;
        config.validate()?;
        fs::ensure_dir(&config.storage_dir)?;
        ensure_table(index.as_ref())?;
        tracing::debug!(
            root = %config.storage_dir.display(),
            handler = %config.handler,
            "resource store ready"
        );
        Ok(ResourceStore {
            config,
            index,
            iv_source: self.iv_source.unwrap_or_else(|| Arc::new(OsIvSource)),
        })
    }
}

fn ensure_table(index: &dyn MetadataIndex) -> Result<(), StoreError> {
    let exists = index
        .table_exists()
        .map_err(|e| StoreError::Index(e.to_string()))?;
    if !exists {
        tracing::debug!(table = RESOURCE_SCHEMA.name, "metadata table missing, creating");
        index
            .create_table(&RESOURCE_SCHEMA)
            .map_err(|e| StoreError::Index(format!("creating {}: {e}", RESOURCE_SCHEMA.name)))?;
    }
    Ok(())
}
