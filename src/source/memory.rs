//! In-memory table store
//!
//! Tables live in a `RwLock`ed map. Used by tests and by callers that
//! already hold their data in memory.

use crate::error::SourceError;
use crate::source::{records_from_value, TableStore};
use crate::types::Record;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Table store backed by a map of record lists
#[derive(Debug, Default)]
pub struct InMemoryTableStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl InMemoryTableStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a table
    pub async fn insert(&self, table: impl Into<String>, records: Vec<Record>) {
        self.tables.write().await.insert(table.into(), records);
    }

    /// Create or replace a table from a JSON array of objects
    pub async fn insert_json(&self, table: impl Into<String>, rows: Value) -> Result<(), SourceError> {
        let table = table.into();
        let records = records_from_value(&table, rows)?;
        self.insert(table, records).await;
        Ok(())
    }

    /// Drop a table
    pub async fn remove(&self, table: &str) -> Option<Vec<Record>> {
        self.tables.write().await.remove(table)
    }

    /// Number of tables
    pub async fn table_count(&self) -> usize {
        self.tables.read().await.len()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn scan(&self, table: &str) -> Result<Vec<Record>, SourceError> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .ok_or_else(|| SourceError::TableNotFound(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_and_scan() {
        let store = InMemoryTableStore::new();
        store.insert_json("projects", json!([{"id": "p1"}])).await.unwrap();

        let rows = store.scan("projects").await.unwrap();
        assert_eq!(rows[0]["id"], json!("p1"));
        assert_eq!(store.table_count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let store = InMemoryTableStore::new();
        assert!(matches!(
            store.scan("nope").await,
            Err(SourceError::TableNotFound(ref t)) if t == "nope"
        ));
    }

    #[tokio::test]
    async fn test_replace_and_remove() {
        let store = InMemoryTableStore::new();
        store.insert_json("t", json!([{"a": 1}, {"a": 2}])).await.unwrap();
        store.insert_json("t", json!([{"a": 3}])).await.unwrap();
        assert_eq!(store.scan("t").await.unwrap().len(), 1);

        assert!(store.remove("t").await.is_some());
        assert!(store.scan("t").await.is_err());
    }
}
