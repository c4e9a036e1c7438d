use std::io::{self, Read};
use std::path::{Path, PathBuf};

use storage_index::ResourceRecord;

use super::{delete_blob, open_blob, HandlerState, NewObject, ObjectInfo};
use crate::error::{Operation, StoreError};
use crate::store::fs::{self as blob_fs, DeleteOutcome};

/// Stores bytes as-is.
#[derive(Debug)]
pub struct PlainHandler {
    root: PathBuf,
    state: HandlerState,
}

impl PlainHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: HandlerState::Uninitialized,
        }
    }

    pub fn state(&self) -> &HandlerState {
        &self.state
    }

    pub fn store(&mut self, source: &Path) -> Result<&ObjectInfo, StoreError> {
        self.state.ensure_uninitialized(Operation::Store)?;
        let mut object = NewObject::open(&self.root, source)?;
        let id = object.id.clone();
        let io_err = |e: io::Error| StoreError::io(Operation::Store, &id, e);
        blob_fs::commit_with(&object.dest, io_err, |writer| {
            io::copy(&mut object.reader, writer).map_err(io_err)
        })?;
        let info = object.finish(None);
        tracing::debug!(id = %info.id, path = %info.path, "stored plain blob");
        self.state = HandlerState::Populated(info);
        self.state.object(Operation::Store)
    }

    pub fn initialize(&mut self, record: &ResourceRecord) -> Result<(), StoreError> {
        if record.is_encrypted() {
            return Err(StoreError::Config(format!(
                "resource {} is encrypted but the store uses the plain handler",
                record.id
            )));
        }
        self.state = HandlerState::Rehydrated(ObjectInfo::from_record(record));
        Ok(())
    }

    pub(super) fn read_content(&self, op: Operation) -> Result<Vec<u8>, StoreError> {
        let info = self.state.object(op)?;
        let mut reader = open_blob(&self.root, info, op)?;
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .map_err(|e| StoreError::io(op, &info.id, e))?;
        Ok(content)
    }

    pub fn delete(&self) -> Result<DeleteOutcome, StoreError> {
        delete_blob(&self.root, &self.state)
    }
}
