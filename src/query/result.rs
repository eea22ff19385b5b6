//! Query result types and formatters
//!
//! [`FilterResult`] is the envelope returned by
//! [`QueryEngine::execute_query`](crate::query::QueryEngine::execute_query).
//! It serializes to camelCase JSON.

use crate::query::ast::{FilterCondition, OutputFormat};
use crate::query::operators::Group;
use crate::types::{DataSource, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// Keys kept by the `summary` output format
pub const SUMMARY_FIELDS: [&str; 6] = ["id", "name", "status", "date", "amount", "hours"];

// ============================================================================
// Filter Result
// ============================================================================

/// Complete query result with data and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResult {
    /// Unique id of this execution
    pub filter_id: String,

    /// Data source the request ran against
    pub data_source: DataSource,

    /// Filter chain as received
    pub applied_filters: Vec<FilterCondition>,

    /// Records matched by the filters, before pagination
    pub result_count: usize,

    /// Formatted page
    pub data: ResultData,

    /// Groups over the full filtered set, when grouping was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_data: Option<Vec<Group>>,

    /// Aggregations over the full filtered set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Map<String, Value>>,

    /// Page metadata, when pagination was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,

    /// Wall time in milliseconds
    pub execution_time: u64,

    /// When the result was produced
    pub generated_at: DateTime<Utc>,
}

impl FilterResult {
    /// Create a result with a fresh id and timestamp
    pub fn new(
        data_source: DataSource,
        applied_filters: Vec<FilterCondition>,
        result_count: usize,
        data: ResultData,
    ) -> Self {
        Self {
            filter_id: Uuid::new_v4().to_string(),
            data_source,
            applied_filters,
            result_count,
            data,
            grouped_data: None,
            aggregations: None,
            pagination: None,
            execution_time: 0,
            generated_at: Utc::now(),
        }
    }

    /// Attach grouped data
    pub fn with_groups(mut self, groups: Option<Vec<Group>>) -> Self {
        self.grouped_data = groups;
        self
    }

    /// Attach aggregations
    pub fn with_aggregations(mut self, aggregations: Option<Map<String, Value>>) -> Self {
        self.aggregations = aggregations;
        self
    }

    /// Attach pagination metadata
    pub fn with_pagination(mut self, pagination: Option<PaginationInfo>) -> Self {
        self.pagination = pagination;
        self
    }

    /// Set execution time metadata
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration.as_millis() as u64;
        self
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Convert to pretty-printed JSON string
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Result payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultData {
    /// Group buckets (grouped output with grouping requested)
    Groups(Vec<Group>),

    /// Plain or projected records
    Records(Vec<Record>),
}

impl ResultData {
    /// Number of top-level entries
    pub fn len(&self) -> usize {
        match self {
            ResultData::Groups(groups) => groups.len(),
            ResultData::Records(records) => records.len(),
        }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records, when this is a record payload
    pub fn records(&self) -> Option<&[Record]> {
        match self {
            ResultData::Records(records) => Some(records),
            ResultData::Groups(_) => None,
        }
    }
}

/// Page metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    /// Requested offset
    pub offset: usize,
    /// Effective page size
    pub limit: usize,
    /// Records before pagination
    pub total_count: usize,
    /// Whether another page exists
    pub has_more: bool,
    /// Offset of the next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

// ============================================================================
// Output Formatter
// ============================================================================

/// Shapes a page of records for the response
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Create a formatter
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format a page
    ///
    /// `grouped` falls back to the detailed records when no grouping was
    /// requested.
    pub fn format(&self, page: Vec<Record>, groups: Option<&[Group]>) -> ResultData {
        match (self.format, groups) {
            (OutputFormat::Summary, _) => {
                ResultData::Records(page.iter().map(summarize).collect())
            },
            (OutputFormat::Grouped, Some(groups)) => ResultData::Groups(groups.to_vec()),
            (OutputFormat::Grouped, None) | (OutputFormat::Detailed, _) => {
                ResultData::Records(page)
            },
        }
    }
}

/// Project a record to [`SUMMARY_FIELDS`], omitting absent keys
pub fn summarize(record: &Record) -> Record {
    SUMMARY_FIELDS
        .iter()
        .filter_map(|&key| record.get(key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_summary_projection() {
        let full = record(json!({"id": "p1", "name": "Site", "budget": 10, "status": "active"}));
        let summary = summarize(&full);
        assert_eq!(summary.len(), 3);
        assert!(!summary.contains_key("budget"));
    }

    #[test]
    fn test_grouped_falls_back_to_records() {
        let page = vec![record(json!({"id": 1}))];
        let data = OutputFormatter::new(OutputFormat::Grouped).format(page.clone(), None);
        assert_eq!(data, ResultData::Records(page));
    }

    #[test]
    fn test_grouped_returns_groups() {
        let groups = vec![Group {
            group_key: "u1".into(),
            count: 1,
            items: vec![record(json!({"id": 1}))],
        }];
        let data = OutputFormatter::new(OutputFormat::Grouped).format(Vec::new(), Some(&groups));
        assert_eq!(data.len(), 1);
        assert!(data.records().is_none());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = FilterResult::new(
            DataSource::TimeEntries,
            Vec::new(),
            0,
            ResultData::Records(Vec::new()),
        )
        .with_pagination(Some(PaginationInfo {
            offset: 0,
            limit: 10,
            total_count: 0,
            has_more: false,
            next_cursor: None,
        }));

        let value: Value = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(value["dataSource"], json!("time-entries"));
        assert_eq!(value["resultCount"], json!(0));
        assert_eq!(value["pagination"]["totalCount"], json!(0));
        assert!(value["pagination"].get("nextCursor").is_none());
        assert!(value.get("groupedData").is_none());
        assert!(value["filterId"].as_str().is_some());
    }
}
