use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use storage_index::ResourceRecord;

use super::{delete_blob, hex_sha256, open_blob, HandlerState, NewObject, ObjectInfo};
use crate::encryption::{self, CipherError};
use crate::error::{Operation, StoreError};
use crate::kms::{self, IvSource, Passphrase};
use crate::store::fs::{self as blob_fs, DeleteOutcome};

/// Encrypts blobs with AES-256-CBC under a key derived from the site
/// passphrase. Each new object draws its own IV; rehydrated objects reuse the
/// IV on record.
pub struct EncryptedHandler {
    root: PathBuf,
    passphrase: Passphrase,
    iv_source: Arc<dyn IvSource>,
    state: HandlerState,
}

impl EncryptedHandler {
    pub fn new(
        root: impl Into<PathBuf>,
        passphrase: Passphrase,
        iv_source: Arc<dyn IvSource>,
    ) -> Self {
        Self {
            root: root.into(),
            passphrase,
            iv_source,
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

        let iv = kms::new_iv(self.iv_source.as_ref()).map_err(|e| StoreError::EntropySource {
            op: Operation::Store,
            id: id.clone(),
            detail: e.to_string(),
        })?;
        let key = kms::derive_key(&self.passphrase);

        let io_err = |e: io::Error| StoreError::io(Operation::Store, &id, e);
        blob_fs::commit_with(&object.dest, io_err, |writer| {
            encryption::encrypt_stream(&mut object.reader, writer, &key[..], &iv)
                .map_err(|e| StoreError::cipher(Operation::Store, &id, e))
        })?;
        drop(key);

        let info = object.finish(Some(BASE64.encode(iv)));
        tracing::debug!(id = %info.id, path = %info.path, "stored encrypted blob");
        self.state = HandlerState::Populated(info);
        self.state.object(Operation::Store)
    }

    /// Rehydrate from a stored record. The IV is decoded and the key derived
    /// again on every read, so a damaged IV only affects content access.
    /// Reads are checked against the recorded content hash.
    pub fn initialize(&mut self, record: &ResourceRecord) -> Result<(), StoreError> {
        self.state = HandlerState::Rehydrated(ObjectInfo::from_record(record));
        Ok(())
    }

    pub(super) fn read_content(&self, op: Operation) -> Result<Vec<u8>, StoreError> {
        let info = self.state.object(op)?;
        let iv = decode_iv(info).map_err(|e| StoreError::cipher(op, &info.id, e))?;
        let reader = open_blob(&self.root, info, op)?;
        let key = kms::derive_key(&self.passphrase);
        let mut content = Vec::new();
        encryption::decrypt_stream(reader, &mut content, &key[..], &iv)
            .map_err(|e| StoreError::cipher(op, &info.id, e))?;
        // IV damage outside the padding block decrypts cleanly under CBC.
        if hex_sha256(&content) != info.content_hash {
            return Err(StoreError::cipher(op, &info.id, CipherError::Integrity));
        }
        Ok(content)
    }

    pub fn delete(&self) -> Result<DeleteOutcome, StoreError> {
        delete_blob(&self.root, &self.state)
    }
}

fn decode_iv(info: &ObjectInfo) -> Result<Vec<u8>, CipherError> {
    let encoded = info
        .encryption_iv
        .as_deref()
        .ok_or(CipherError::MissingIv)?;
    BASE64
        .decode(encoded)
        .map_err(|e| CipherError::IvEncoding(e.to_string()))
}
