//! JSON file table store
//!
//! Each table is one file, `<dir>/<table>.json`, holding a JSON array of
//! objects. Files are read on every scan, so edits show up on the next
//! query without a restart.

use crate::error::SourceError;
use crate::source::{records_from_value, TableStore};
use crate::types::Record;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Table store reading JSON files from a directory
#[derive(Debug, Clone)]
pub struct JsonFileTableStore {
    dir: PathBuf,
}

impl JsonFileTableStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a table
    ///
    /// Table names must be plain file stems: no separators, no `..`, no
    /// NUL bytes.
    pub fn table_path(&self, table: &str) -> Result<PathBuf, SourceError> {
        let suspicious = table.is_empty()
            || table.contains("..")
            || table.contains('/')
            || table.contains('\\')
            || table.contains('\0');
        if suspicious {
            return Err(SourceError::InvalidTableName(table.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", table)))
    }
}

#[async_trait]
impl TableStore for JsonFileTableStore {
    fn name(&self) -> &'static str {
        "json-file"
    }

    async fn scan(&self, table: &str) -> Result<Vec<Record>, SourceError> {
        let path = self.table_path(table)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SourceError::TableNotFound(table.to_string()))
            },
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_slice(&bytes).map_err(|e| SourceError::InvalidData {
            table: table.to_string(),
            message: e.to_string(),
        })?;
        records_from_value(table, value)
    }
}
