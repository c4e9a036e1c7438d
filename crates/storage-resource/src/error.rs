use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::encryption::CipherError;

/// Public operation an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Store,
    Retrieve,
    Download,
    Delete,
    Metadata,
    Reconcile,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Store => "store",
            Self::Retrieve => "retrieve",
            Self::Download => "download",
            Self::Delete => "delete",
            Self::Metadata => "metadata",
            Self::Reconcile => "reconcile",
        })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not provision directory {}: {detail}", .path.display())]
    PathCreation { path: PathBuf, detail: String },
    #[error("{op} {id}: I/O error: {detail}")]
    PhysicalIo {
        op: Operation,
        id: String,
        detail: String,
    },
    #[error("{op} {id}: cipher error: {source}")]
    Cipher {
        op: Operation,
        id: String,
        source: CipherError,
    },
    #[error("{op} {id}: {detail}")]
    EntropySource {
        op: Operation,
        id: String,
        detail: String,
    },
    #[error("store {id}: metadata insert failed: {detail}")]
    MetadataInsert { id: String, detail: String },
    #[error("{op} {id}: metadata update failed: {detail}")]
    MetadataUpdate {
        op: Operation,
        id: String,
        detail: String,
    },
    #[error("{op} {id}: record not found: {detail}")]
    RecordNotFound {
        op: Operation,
        id: String,
        detail: String,
    },
    #[error("{op}: handler has no object loaded")]
    HandlerState { op: Operation },
    #[error("index error: {0}")]
    Index(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub(crate) fn io(op: Operation, id: &str, err: impl fmt::Display) -> Self {
        Self::PhysicalIo {
            op,
            id: id.to_string(),
            detail: err.to_string(),
        }
    }

    /// Stream I/O failures inside the cipher are physical I/O, not cipher faults.
    pub(crate) fn cipher(op: Operation, id: &str, err: CipherError) -> Self {
        match err {
            CipherError::Io(e) => Self::io(op, id, e),
            source => Self::Cipher {
                op,
                id: id.to_string(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }
}
