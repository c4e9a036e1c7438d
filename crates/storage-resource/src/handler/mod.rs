//! Physical lifecycle of a single stored object.
//!
//! A handler starts `Uninitialized` and becomes `Populated` after
//! [`ObjectHandler::store`] or `Rehydrated` after [`ObjectHandler::initialize`].
//! Content access and deletion need one of the latter two states.

mod encrypted;
mod plain;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use storage_index::ResourceRecord;
use uuid::Uuid;

pub use encrypted::EncryptedHandler;
pub use plain::PlainHandler;

use crate::config::HandlerKind;
use crate::error::{Operation, StoreError};
use crate::kms::{IvSource, Passphrase};
use crate::store::fs::{self as blob_fs, DeleteOutcome};

/// Metadata a handler holds for its object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub id: String,
    pub filename: String,
    pub mimetype: String,
    pub path: String,
    pub content_hash: String,
    pub encryption_iv: Option<String>,
    pub created_at: SystemTime,
}

impl ObjectInfo {
    /// Fresh index record for a newly stored object.
    pub fn to_record(&self) -> ResourceRecord {
        ResourceRecord {
            id: self.id.clone(),
            filename: self.filename.clone(),
            path: self.path.clone(),
            mimetype: self.mimetype.clone(),
            content_hash: self.content_hash.clone(),
            encryption_iv: self.encryption_iv.clone(),
            access_count: 0,
            created_at: self.created_at,
            last_accessed_at: None,
        }
    }

    fn from_record(record: &ResourceRecord) -> Self {
        Self {
            id: record.id.clone(),
            filename: record.filename.clone(),
            mimetype: record.mimetype.clone(),
            path: record.path.clone(),
            content_hash: record.content_hash.clone(),
            encryption_iv: record.encryption_iv.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum HandlerState {
    #[default]
    Uninitialized,
    Populated(ObjectInfo),
    Rehydrated(ObjectInfo),
}

impl HandlerState {
    fn object(&self, op: Operation) -> Result<&ObjectInfo, StoreError> {
        match self {
            Self::Populated(info) | Self::Rehydrated(info) => Ok(info),
            Self::Uninitialized => Err(StoreError::HandlerState { op }),
        }
    }

    fn ensure_uninitialized(&self, op: Operation) -> Result<(), StoreError> {
        match self {
            Self::Uninitialized => Ok(()),
            _ => Err(StoreError::HandlerState { op }),
        }
    }
}

/// Decrypted (or plain) payload plus what a transport needs to frame it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub id: String,
    pub filename: String,
    pub mimetype: String,
    pub content: Vec<u8>,
}

impl Download {
    /// `Content-Disposition` value marking the payload as an attachment.
    pub fn content_disposition(&self) -> String {
        let escaped = self.filename.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{escaped}\"")
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Closed set of handler variants, picked from [`HandlerKind`] at construction.
pub enum ObjectHandler {
    Plain(PlainHandler),
    Encrypted(EncryptedHandler),
}

impl ObjectHandler {
    pub fn new(
        kind: HandlerKind,
        root: impl Into<PathBuf>,
        passphrase: &Passphrase,
        iv_source: Arc<dyn IvSource>,
    ) -> Self {
        match kind {
            HandlerKind::Plain => Self::Plain(PlainHandler::new(root)),
            HandlerKind::Encrypted => {
                Self::Encrypted(EncryptedHandler::new(root, passphrase.clone(), iv_source))
            }
        }
    }

    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::Plain(_) => HandlerKind::Plain,
            Self::Encrypted(_) => HandlerKind::Encrypted,
        }
    }

    pub fn state(&self) -> &HandlerState {
        match self {
            Self::Plain(h) => h.state(),
            Self::Encrypted(h) => h.state(),
        }
    }

    pub fn store(&mut self, source: &Path) -> Result<&ObjectInfo, StoreError> {
        match self {
            Self::Plain(h) => h.store(source),
            Self::Encrypted(h) => h.store(source),
        }
    }

    pub fn initialize(&mut self, record: &ResourceRecord) -> Result<(), StoreError> {
        match self {
            Self::Plain(h) => h.initialize(record),
            Self::Encrypted(h) => h.initialize(record),
        }
    }

    pub fn retrieve_content(&self) -> Result<Vec<u8>, StoreError> {
        match self {
            Self::Plain(h) => h.read_content(Operation::Retrieve),
            Self::Encrypted(h) => h.read_content(Operation::Retrieve),
        }
    }

    pub fn deliver_for_download(&self) -> Result<Download, StoreError> {
        let content = match self {
            Self::Plain(h) => h.read_content(Operation::Download)?,
            Self::Encrypted(h) => h.read_content(Operation::Download)?,
        };
        let info = self.state().object(Operation::Download)?;
        Ok(Download {
            id: info.id.clone(),
            filename: info.filename.clone(),
            mimetype: info.mimetype.clone(),
            content,
        })
    }

    pub fn delete(&self) -> Result<DeleteOutcome, StoreError> {
        match self {
            Self::Plain(h) => h.delete(),
            Self::Encrypted(h) => h.delete(),
        }
    }
}

/// Reader adapter that hashes everything passing through it.
struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn hex_digest(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Lowercase hex SHA-256, the format of `content_hash`.
fn hex_sha256(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Identity and source metadata for an object about to be stored.
struct NewObject {
    id: String,
    filename: String,
    mimetype: String,
    path: String,
    dest: PathBuf,
    reader: HashingReader<BufReader<File>>,
}

impl NewObject {
    fn open(root: &Path, source: &Path) -> Result<Self, StoreError> {
        let id = Uuid::new_v4().to_string();
        let filename = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StoreError::io(
                    Operation::Store,
                    &id,
                    format!("{} has no file name", source.display()),
                )
            })?;
        let file = File::open(source).map_err(|e| {
            StoreError::io(
                Operation::Store,
                &id,
                format!("opening {}: {e}", source.display()),
            )
        })?;
        let path = blob_fs::blob_relative_path(&id);
        Ok(Self {
            dest: blob_fs::resolve(root, &path),
            mimetype: guess_mimetype(&filename).to_string(),
            reader: HashingReader::new(BufReader::new(file)),
            id,
            filename,
            path,
        })
    }

    fn finish(self, encryption_iv: Option<String>) -> ObjectInfo {
        ObjectInfo {
            content_hash: self.reader.hex_digest(),
            id: self.id,
            filename: self.filename,
            mimetype: self.mimetype,
            path: self.path,
            encryption_iv,
            created_at: SystemTime::now(),
        }
    }
}

fn open_blob(root: &Path, info: &ObjectInfo, op: Operation) -> Result<BufReader<File>, StoreError> {
    let path = blob_fs::resolve(root, &info.path);
    File::open(&path)
        .map(BufReader::new)
        .map_err(|e| StoreError::io(op, &info.id, format!("opening {}: {e}", path.display())))
}

fn delete_blob(root: &Path, state: &HandlerState) -> Result<DeleteOutcome, StoreError> {
    let info = state.object(Operation::Delete)?;
    Ok(blob_fs::remove_blob(&blob_fs::resolve(root, &info.path)))
}

/// Mimetype from the file extension, falling back to `application/octet-stream`.
pub fn guess_mimetype(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "htm" | "html" => "text/html",
        "css" => "text/css",
        "md" => "text/markdown",
        "xml" => "application/xml",
        "json" => "application/json",
        "js" => "text/javascript",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "odt" => "application/vnd.oasis.opendocument.text",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
