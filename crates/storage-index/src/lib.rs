//! Metadata index contract for stored resources, plus in-memory and
//! JSON-file backed implementations.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod json_file;
mod memory;

pub use json_file::JsonFileIndex;
pub use memory::MemoryIndex;

/// Durable metadata for one stored resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Opaque external handle, assigned once at store time.
    pub id: String,
    /// File name of the original source.
    pub filename: String,
    /// Location of the managed blob, relative to the storage root.
    pub path: String,
    pub mimetype: String,
    /// Lowercase hex SHA-256 of the original (pre-encryption) content.
    pub content_hash: String,
    /// Base64 IV for encrypted objects; never rewritten once persisted.
    #[serde(default)]
    pub encryption_iv: Option<String>,
    #[serde(default)]
    pub access_count: u64,
    pub created_at: SystemTime,
    #[serde(default)]
    pub last_accessed_at: Option<SystemTime>,
}

impl ResourceRecord {
    pub fn is_encrypted(&self) -> bool {
        self.encryption_iv.is_some()
    }
}

/// Partial update applied by [`MetadataIndex::update_by_key`].
///
/// Only the access statistics are mutable after insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub access_count: Option<u64>,
    pub last_accessed_at: Option<SystemTime>,
}

impl RecordUpdate {
    /// Update describing one more successful read at `at`.
    pub fn accessed(record: &ResourceRecord, at: SystemTime) -> Self {
        Self {
            access_count: Some(record.access_count.saturating_add(1)),
            last_accessed_at: Some(at),
        }
    }

    pub fn apply(&self, record: &mut ResourceRecord) {
        if let Some(count) = self.access_count {
            record.access_count = count;
        }
        if let Some(at) = self.last_accessed_at {
            record.last_accessed_at = Some(at);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub nullable: bool,
    pub default: Option<&'static str>,
}

impl ColumnSpec {
    const fn required(name: &'static str) -> Self {
        Self {
            name,
            nullable: false,
            default: None,
        }
    }

    const fn nullable(name: &'static str) -> Self {
        Self {
            name,
            nullable: true,
            default: None,
        }
    }
}

/// Table layout an index is asked to provision when it is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
}

pub const RESOURCE_SCHEMA: TableSchema = TableSchema {
    name: "res_storage",
    columns: &[
        ColumnSpec::required("id"),
        ColumnSpec::required("filename"),
        ColumnSpec::required("path"),
        ColumnSpec::required("mimetype"),
        ColumnSpec::required("content_hash"),
        ColumnSpec::nullable("encryption_iv"),
        ColumnSpec {
            name: "access_count",
            nullable: false,
            default: Some("0"),
        },
        ColumnSpec::required("created_at"),
        ColumnSpec::nullable("last_accessed_at"),
    ],
};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index I/O error: {0}")]
    Io(String),
    #[error("index encoding error: {0}")]
    Serde(String),
    #[error("duplicate records for key {0}")]
    DuplicateKey(String),
    #[error("table {0} does not exist")]
    MissingTable(String),
    #[error("index unavailable: {0}")]
    Unavailable(String),
}

/// Record CRUD contract consumed by the resource store.
///
/// Implementations must be safe to share across threads; callers do not
/// serialize access to different keys.
pub trait MetadataIndex: Send + Sync {
    fn table_exists(&self) -> Result<bool, IndexError>;
    fn create_table(&self, schema: &TableSchema) -> Result<(), IndexError>;
    /// Insert a new record. Fails with [`IndexError::DuplicateKey`] if the id is taken.
    fn insert(&self, record: &ResourceRecord) -> Result<(), IndexError>;
    /// Fetch the record for `id`. More than one stored match is reported as
    /// [`IndexError::DuplicateKey`] rather than picking one.
    fn get_by_key(&self, id: &str) -> Result<Option<ResourceRecord>, IndexError>;
    /// Returns `false` when no record matched.
    fn update_by_key(&self, id: &str, update: &RecordUpdate) -> Result<bool, IndexError>;
    /// Returns `false` when no record matched.
    fn delete_by_key(&self, id: &str) -> Result<bool, IndexError>;
    /// All stored keys, used when reconciling the index against the blob tree.
    fn keys(&self) -> Result<Vec<String>, IndexError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn record() -> ResourceRecord {
        ResourceRecord {
            id: "a".into(),
            filename: "a.txt".into(),
            path: "aa/a".into(),
            mimetype: "text/plain".into(),
            content_hash: "00".into(),
            encryption_iv: None,
            access_count: 4,
            created_at: UNIX_EPOCH,
            last_accessed_at: None,
        }
    }

    #[test]
    fn accessed_update_increments_by_one() {
        let mut rec = record();
        let at = UNIX_EPOCH + Duration::from_secs(60);
        let update = RecordUpdate::accessed(&rec, at);
        update.apply(&mut rec);
        assert_eq!(rec.access_count, 5);
        assert_eq!(rec.last_accessed_at, Some(at));
    }

    #[test]
    fn empty_update_leaves_record_untouched() {
        let mut rec = record();
        RecordUpdate::default().apply(&mut rec);
        assert_eq!(rec, record());
    }

    #[test]
    fn schema_lists_nullable_iv() {
        let iv = RESOURCE_SCHEMA
            .columns
            .iter()
            .find(|c| c.name == "encryption_iv")
            .unwrap();
        assert!(iv.nullable);
    }
}
