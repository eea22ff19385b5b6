//! Row sources
//!
//! The engine never talks to a database directly. It asks a [`RowSource`]
//! for every record of a [`DataSource`] and works on the returned list.
//!
//! [`TableRowSource`] is the standard implementation: it maps each data
//! source to a configured table identifier and scans that table from a
//! pluggable [`TableStore`] backend. What happens when a data source has no
//! table configured is decided once, at construction, by [`SourcePolicy`].

pub mod file;
pub mod memory;

pub use file::JsonFileTableStore;
pub use memory::InMemoryTableStore;

use crate::error::SourceError;
use crate::query::QueryError;
use crate::types::{DataSource, Record};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};

// =============================================================================
// Traits
// =============================================================================

/// Supplies every record of a data source
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetch all records for a data source
    ///
    /// No retries happen here; a failure is returned to the caller as-is.
    async fn fetch(&self, source: DataSource) -> Result<Vec<Record>, QueryError>;
}

/// Backend holding named tables of records
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Read every record of a table
    async fn scan(&self, table: &str) -> Result<Vec<Record>, SourceError>;
}

// =============================================================================
// Configuration
// =============================================================================

/// Behavior when a data source has no table configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePolicy {
    /// Log at error level and return no records
    #[default]
    Lenient,
    /// Fail with a configuration error
    Strict,
}

impl fmt::Display for SourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePolicy::Lenient => f.write_str("lenient"),
            SourcePolicy::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for SourcePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(SourcePolicy::Lenient),
            "strict" => Ok(SourcePolicy::Strict),
            other => Err(format!("unknown source policy '{}'", other)),
        }
    }
}

/// Table identifier per data source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableConfig {
    /// Table holding time entries
    pub time_entries: Option<String>,
    /// Table holding projects
    pub projects: Option<String>,
    /// Table holding clients
    pub clients: Option<String>,
    /// Table holding users
    pub users: Option<String>,
}

impl TableConfig {
    /// Use each data source's wire name as its table identifier
    pub fn by_source_name() -> Self {
        Self {
            time_entries: Some(DataSource::TimeEntries.as_str().to_string()),
            projects: Some(DataSource::Projects.as_str().to_string()),
            clients: Some(DataSource::Clients.as_str().to_string()),
            users: Some(DataSource::Users.as_str().to_string()),
        }
    }

    /// Configured table for a data source
    ///
    /// Blank identifiers count as unconfigured.
    pub fn table_for(&self, source: DataSource) -> Option<&str> {
        let table = match source {
            DataSource::TimeEntries => &self.time_entries,
            DataSource::Projects => &self.projects,
            DataSource::Clients => &self.clients,
            DataSource::Users => &self.users,
        };
        table.as_deref().filter(|t| !t.trim().is_empty())
    }
}

// =============================================================================
// Table Row Source
// =============================================================================

/// Row source reading configured tables from a [`TableStore`]
pub struct TableRowSource {
    store: Arc<dyn TableStore>,
    tables: TableConfig,
    policy: SourcePolicy,
}

impl TableRowSource {
    /// Create a row source
    pub fn new(store: Arc<dyn TableStore>, tables: TableConfig, policy: SourcePolicy) -> Self {
        Self {
            store,
            tables,
            policy,
        }
    }

    /// Missing-table policy
    pub fn policy(&self) -> SourcePolicy {
        self.policy
    }

    /// Table mapping
    pub fn tables(&self) -> &TableConfig {
        &self.tables
    }
}

#[async_trait]
impl RowSource for TableRowSource {
    async fn fetch(&self, source: DataSource) -> Result<Vec<Record>, QueryError> {
        let Some(table) = self.tables.table_for(source) else {
            return match self.policy {
                SourcePolicy::Lenient => {
                    error!(source = %source, "No table configured for data source, returning no records");
                    Ok(Vec::new())
                },
                SourcePolicy::Strict => Err(QueryError::configuration(format!(
                    "no table configured for data source '{}'",
                    source
                ))),
            };
        };

        let records = self.store.scan(table).await.map_err(|e| {
            QueryError::fetch(format!("failed to read table '{}' for '{}'", table, source))
                .with_source(e)
        })?;

        debug!(
            source = %source,
            table,
            backend = self.store.name(),
            rows = records.len(),
            "Fetched records"
        );
        Ok(records)
    }
}

/// Convert a decoded JSON table into records
///
/// The value must be an array whose elements are all objects.
pub(crate) fn records_from_value(table: &str, value: Value) -> Result<Vec<Record>, SourceError> {
    let Value::Array(items) = value else {
        return Err(SourceError::InvalidData {
            table: table.to_string(),
            message: "expected a JSON array of objects".to_string(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(SourceError::InvalidData {
                table: table.to_string(),
                message: format!("row {} is not an object: {}", i, other),
            }),
        })
        .collect()
}
