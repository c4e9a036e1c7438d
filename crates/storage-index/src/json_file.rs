use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::{IndexError, MetadataIndex, RecordUpdate, ResourceRecord, TableSchema};

#[derive(Debug, Serialize, Deserialize)]
struct IndexDocument {
    table: String,
    columns: Vec<String>,
    rows: Vec<ResourceRecord>,
}

/// Durable index kept as a single JSON document.
///
/// Every mutation rewrites the document through a temp file and rename, so a
/// crash mid-write leaves the previous version intact. The mutex serializes
/// read-modify-write cycles within one process only.
#[derive(Debug)]
pub struct JsonFileIndex {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileIndex {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<IndexDocument, IndexError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(IndexError::MissingTable(self.path.display().to_string()))
            }
            Err(e) => return Err(IndexError::Io(e.to_string())),
        };
        serde_json::from_slice(&bytes).map_err(|e| IndexError::Serde(e.to_string()))
    }

    fn save(&self, doc: &IndexDocument) -> Result<(), IndexError> {
        let encoded =
            serde_json::to_vec_pretty(doc).map_err(|e| IndexError::Serde(e.to_string()))?;
        write_atomic(&self.path, &encoded).map_err(|e| IndexError::Io(e.to_string()))
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut IndexDocument) -> Result<(T, bool), IndexError>,
    ) -> Result<T, IndexError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        let mut doc = self.load()?;
        let (out, dirty) = f(&mut doc)?;
        if dirty {
            self.save(&doc)?;
        }
        Ok(out)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

fn matching<'a>(doc: &'a IndexDocument, id: &str) -> Vec<&'a ResourceRecord> {
    doc.rows.iter().filter(|row| row.id == id).collect()
}

impl MetadataIndex for JsonFileIndex {
    fn table_exists(&self) -> Result<bool, IndexError> {
        self.path
            .try_exists()
            .map_err(|e| IndexError::Io(e.to_string()))
    }

    fn create_table(&self, schema: &TableSchema) -> Result<(), IndexError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        if self.table_exists()? {
            return Ok(());
        }
        tracing::debug!(table = schema.name, path = %self.path.display(), "creating index file");
        self.save(&IndexDocument {
            table: schema.name.to_string(),
            columns: schema.columns.iter().map(|c| c.name.to_string()).collect(),
            rows: Vec::new(),
        })
    }

    fn insert(&self, record: &ResourceRecord) -> Result<(), IndexError> {
        self.mutate(|doc| {
            if !matching(doc, &record.id).is_empty() {
                return Err(IndexError::DuplicateKey(record.id.clone()));
            }
            doc.rows.push(record.clone());
            Ok(((), true))
        })
    }

    fn get_by_key(&self, id: &str) -> Result<Option<ResourceRecord>, IndexError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        let doc = self.load()?;
        match matching(&doc, id).as_slice() {
            [] => Ok(None),
            [record] => Ok(Some((*record).clone())),
            _ => Err(IndexError::DuplicateKey(id.to_string())),
        }
    }

    fn update_by_key(&self, id: &str, update: &RecordUpdate) -> Result<bool, IndexError> {
        self.mutate(|doc| {
            let mut matched = false;
            for row in doc.rows.iter_mut().filter(|row| row.id == id) {
                update.apply(row);
                matched = true;
            }
            Ok((matched, matched))
        })
    }

    fn delete_by_key(&self, id: &str) -> Result<bool, IndexError> {
        self.mutate(|doc| {
            let before = doc.rows.len();
            doc.rows.retain(|row| row.id != id);
            let removed = doc.rows.len() != before;
            Ok((removed, removed))
        })
    }

    fn keys(&self) -> Result<Vec<String>, IndexError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(self.load()?.rows.into_iter().map(|row| row.id).collect())
    }
}
