use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::{IndexError, MetadataIndex, RecordUpdate, ResourceRecord, TableSchema};

/// Process-local index. The table only exists after `create_table`.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    table: Mutex<Option<Table>>,
}

#[derive(Debug)]
struct Table {
    rows: BTreeMap<String, ResourceRecord>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<T>(
        &self,
        f: impl FnOnce(&mut Table) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        let mut guard = self
            .table
            .lock()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        match guard.as_mut() {
            Some(table) => f(table),
            None => Err(IndexError::MissingTable(crate::RESOURCE_SCHEMA.name.into())),
        }
    }
}

impl MetadataIndex for MemoryIndex {
    fn table_exists(&self) -> Result<bool, IndexError> {
        let guard = self
            .table
            .lock()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(guard.is_some())
    }

    fn create_table(&self, schema: &TableSchema) -> Result<(), IndexError> {
        let mut guard = self
            .table
            .lock()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        if guard.is_none() {
            tracing::debug!(table = schema.name, "creating in-memory table");
            *guard = Some(Table {
                rows: BTreeMap::new(),
            });
        }
        Ok(())
    }

    fn insert(&self, record: &ResourceRecord) -> Result<(), IndexError> {
        self.with_table(|table| {
            if table.rows.contains_key(&record.id) {
                return Err(IndexError::DuplicateKey(record.id.clone()));
            }
            table.rows.insert(record.id.clone(), record.clone());
            Ok(())
        })
    }

    fn get_by_key(&self, id: &str) -> Result<Option<ResourceRecord>, IndexError> {
        self.with_table(|table| Ok(table.rows.get(id).cloned()))
    }

    fn update_by_key(&self, id: &str, update: &RecordUpdate) -> Result<bool, IndexError> {
        self.with_table(|table| match table.rows.get_mut(id) {
            Some(record) => {
                update.apply(record);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    fn delete_by_key(&self, id: &str) -> Result<bool, IndexError> {
        self.with_table(|table| Ok(table.rows.remove(id).is_some()))
    }

    fn keys(&self) -> Result<Vec<String>, IndexError> {
        self.with_table(|table| Ok(table.rows.keys().cloned().collect()))
    }
}
