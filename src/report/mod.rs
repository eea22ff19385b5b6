//! Report generation
//!
//! Time and project reports build on the filter pipeline. A report:
//!
//! 1. derives a cache key from the request and the requesting user
//! 2. returns the cached envelope while it is fresh
//! 3. otherwise fetches users, projects, clients and time entries
//!    concurrently, enriches the time entries, runs the pipeline and
//!    computes a summary
//! 4. stores the envelope with the configured TTL
//!
//! Cache failures are logged and never fail a report.

pub mod project;
pub mod time;

pub use project::{ProjectReportRequest, ProjectRow, ProjectSummary};
pub use time::{GroupBreakdown, TimeGrouping, TimeReportRequest, TimeSummary};

use crate::cache::{generate_cache_key, ReportCache};
use crate::error::Result;
use crate::query::{FilterCondition, Group, PaginationInfo, QueryEngine, QueryError};
use crate::types::{
    display_string, get_present_value, number_value, set_nested_value, to_number, DataSource,
    Record,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

// =============================================================================
// Envelope
// =============================================================================

/// Report flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    /// Hours and amounts over time entries
    Time,
    /// Per-project totals and budget use
    Project,
}

impl ReportType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Time => "time",
            ReportType::Project => "project",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache metadata attached to every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    /// Whether this envelope came from the cache
    pub cached: bool,
    /// Key the report is stored under
    pub cache_key: String,
    /// When the report was generated
    pub generated_at: DateTime<Utc>,
    /// Expiry (milliseconds since epoch)
    pub expires_at: i64,
}

/// Report envelope returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEnvelope {
    /// Unique id of the generated report
    pub report_id: String,
    /// Report flavor
    pub report_type: ReportType,
    /// Request parameters as received
    pub filters: Value,
    /// Report-specific summary
    pub summary: Value,
    /// Detail rows (empty when details were not requested)
    pub data: Vec<Record>,
    /// Groups with their rows, for grouped time reports with details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_data: Option<Vec<Group>>,
    /// Page metadata, when pagination was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
    /// Cache metadata
    pub cache_info: CacheInfo,
}

/// Report content before the envelope is attached
#[derive(Debug, Clone, Default)]
pub(crate) struct ReportBody {
    pub summary: Value,
    pub data: Vec<Record>,
    pub grouped_data: Option<Vec<Group>>,
    pub pagination: Option<PaginationInfo>,
}

// =============================================================================
// Dataset
// =============================================================================

/// Every record a report may need, fetched together
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Users
    pub users: Vec<Record>,
    /// Projects
    pub projects: Vec<Record>,
    /// Clients
    pub clients: Vec<Record>,
    /// Raw time entries
    pub time_entries: Vec<Record>,
}

impl Dataset {
    /// Time entries with names, client and amount filled in
    ///
    /// Adds `metadata.userName`, `metadata.projectName` and
    /// `metadata.clientName`, fills a missing `clientId` from the project,
    /// and sets `amount` to `hours * hourlyRate` for billable entries (0
    /// otherwise). The entry's own `hourlyRate` wins over the project's.
    /// Source records are left untouched.
    pub fn enriched_time_entries(&self) -> Vec<Record> {
        let users = index_by_id(&self.users);
        let projects = index_by_id(&self.projects);
        let clients = index_by_id(&self.clients);

        self.time_entries
            .iter()
            .map(|entry| {
                let mut enriched = entry.clone();
                let project = lookup(&projects, entry, "projectId");

                if get_present_value(entry, "clientId").is_none() {
                    if let Some(client_id) = project.and_then(|p| get_present_value(p, "clientId")) {
                        enriched.insert("clientId".to_string(), client_id.clone());
                    }
                }
                let client = lookup(&clients, &enriched, "clientId");

                if let Some(name) = lookup(&users, entry, "userId").and_then(user_name) {
                    set_nested_value(&mut enriched, "metadata.userName", Value::String(name));
                }
                if let Some(name) = project.and_then(|p| get_present_value(p, "name")) {
                    set_nested_value(&mut enriched, "metadata.projectName", name.clone());
                }
                if let Some(name) = client.and_then(|c| get_present_value(c, "name")) {
                    set_nested_value(&mut enriched, "metadata.clientName", name.clone());
                }

                let rate = field_number(entry, "hourlyRate")
                    .or_else(|| project.and_then(|p| field_number(p, "hourlyRate")))
                    .unwrap_or(0.0);
                let amount = if is_billable(entry) {
                    field_number(entry, "hours").unwrap_or(0.0) * rate
                } else {
                    0.0
                };
                enriched.insert("amount".to_string(), number_value(amount));

                enriched
            })
            .collect()
    }
}

fn index_by_id(records: &[Record]) -> HashMap<String, &Record> {
    records
        .iter()
        .filter_map(|r| get_present_value(r, "id").map(|id| (display_string(id), r)))
        .collect()
}

fn lookup<'a>(index: &HashMap<String, &'a Record>, record: &Record, field: &str) -> Option<&'a Record> {
    get_present_value(record, field).and_then(|id| index.get(&display_string(id)).copied())
}

fn user_name(user: &Record) -> Option<String> {
    if let Some(name) = get_present_value(user, "name") {
        return Some(display_string(name));
    }
    let first = get_present_value(user, "firstName").map(display_string);
    let last = get_present_value(user, "lastName").map(display_string);
    match (first, last) {
        (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
        (Some(n), None) | (None, Some(n)) => Some(n),
        (None, None) => get_present_value(user, "email").map(display_string),
    }
}

pub(crate) fn field_number(record: &Record, field: &str) -> Option<f64> {
    get_present_value(record, field).and_then(to_number)
}

pub(crate) fn is_billable(record: &Record) -> bool {
    matches!(get_present_value(record, "billable"), Some(Value::Bool(true)))
}

/// Round to two decimal places for presentation
pub(crate) fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

// =============================================================================
// Date Conditions
// =============================================================================

const EARLIEST_DATE: &str = "0001-01-01";
const LATEST_DATE: &str = "9999-12-31T23:59:59.999Z";

/// Inclusive date window on a field
///
/// Either bound may be open. A plain `YYYY-MM-DD` end date covers the
/// whole day.
pub fn date_window(field: &str, start: Option<&str>, end: Option<&str>) -> Option<FilterCondition> {
    if start.is_none() && end.is_none() {
        return None;
    }
    let start = start.unwrap_or(EARLIEST_DATE);
    let end = end.map(end_of_day).unwrap_or_else(|| LATEST_DATE.to_string());
    Some(FilterCondition::date_range(
        field,
        Value::String(start.to_string()),
        Value::String(end),
    ))
}

fn end_of_day(date: &str) -> String {
    match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(day) => format!("{}T23:59:59.999Z", day.format("%Y-%m-%d")),
        Err(_) => date.to_string(),
    }
}

/// `in` condition over a list of ids
pub(crate) fn id_condition(field: &str, ids: &[String]) -> FilterCondition {
    FilterCondition::new(
        field,
        crate::query::FilterOperator::In,
        Value::Array(ids.iter().cloned().map(Value::String).collect()),
    )
}

/// Cache key for a report request
///
/// The report type is part of the hashed parameters so equal requests to
/// different report kinds never share an entry.
pub fn report_key(report_type: ReportType, filters: &Value, user_id: &str) -> String {
    let mut keyed = match filters {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    keyed.insert("reportType".to_string(), Value::String(report_type.as_str().to_string()));
    generate_cache_key(&Value::Object(keyed), user_id)
}

// =============================================================================
// Report Service
// =============================================================================

/// Generates cached time and project reports
pub struct ReportService {
    engine: QueryEngine,
    cache: ReportCache,
}

impl ReportService {
    /// Create a report service
    pub fn new(engine: QueryEngine, cache: ReportCache) -> Self {
        Self { engine, cache }
    }

    /// Underlying query engine
    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Report cache
    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    /// Fetch every data source a report needs
    ///
    /// The four fetches run concurrently; the first failure aborts the rest.
    pub async fn load_dataset(&self) -> std::result::Result<Dataset, QueryError> {
        let source = self.engine.source();
        let (users, projects, clients, time_entries) = tokio::try_join!(
            source.fetch(DataSource::Users),
            source.fetch(DataSource::Projects),
            source.fetch(DataSource::Clients),
            source.fetch(DataSource::TimeEntries),
        )?;

        Ok(Dataset {
            users,
            projects,
            clients,
            time_entries,
        })
    }

    /// Generate a time report for a user
    pub async fn generate_time_report(
        &self,
        request: &TimeReportRequest,
        user_id: &str,
    ) -> Result<ReportEnvelope> {
        let filters = serde_json::to_value(request)?;
        let key = report_key(ReportType::Time, &filters, user_id);
        if let Some(cached) = self.lookup(&key).await {
            return Ok(cached);
        }

        let started = Instant::now();
        let dataset = self.load_dataset().await?;
        let body = time::build(&self.engine, request, &dataset)?;
        Ok(self.finish(ReportType::Time, filters, key, body, started).await)
    }

    /// Generate a project report for a user
    pub async fn generate_project_report(
        &self,
        request: &ProjectReportRequest,
        user_id: &str,
    ) -> Result<ReportEnvelope> {
        let filters = serde_json::to_value(request)?;
        let key = report_key(ReportType::Project, &filters, user_id);
        if let Some(cached) = self.lookup(&key).await {
            return Ok(cached);
        }

        let started = Instant::now();
        let dataset = self.load_dataset().await?;
        let body = project::build(&self.engine, request, &dataset)?;
        Ok(self.finish(ReportType::Project, filters, key, body, started).await)
    }

    async fn lookup(&self, key: &str) -> Option<ReportEnvelope> {
        let entry = self.cache.get(key).await?;
        match serde_json::from_value::<ReportEnvelope>(entry.report_data) {
            Ok(mut envelope) => {
                envelope.cache_info = CacheInfo {
                    cached: true,
                    cache_key: entry.cache_key,
                    generated_at: entry.generated_at,
                    expires_at: entry.expires_at,
                };
                Some(envelope)
            },
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable cached report");
                None
            },
        }
    }

    async fn finish(
        &self,
        report_type: ReportType,
        filters: Value,
        key: String,
        body: ReportBody,
        started: Instant,
    ) -> ReportEnvelope {
        let now = Utc::now();
        let mut envelope = ReportEnvelope {
            report_id: Uuid::new_v4().to_string(),
            report_type,
            filters,
            summary: body.summary,
            data: body.data,
            grouped_data: body.grouped_data,
            pagination: body.pagination,
            cache_info: CacheInfo {
                cached: false,
                cache_key: key.clone(),
                generated_at: now,
                expires_at: self.cache.config().expires_at(now),
            },
        };

        match serde_json::to_value(&envelope) {
            Ok(value) => {
                let (entry, written) = self.cache.put(&key, report_type.as_str(), value).await;
                if let Err(e) = written {
                    warn!(key = %key, error = %e, "Failed to cache report");
                }
                envelope.cache_info.generated_at = entry.generated_at;
                envelope.cache_info.expires_at = entry.expires_at;
            },
            Err(e) => warn!(key = %key, error = %e, "Failed to serialize report for caching"),
        }

        info!(
            report_id = %envelope.report_id,
            report_type = %report_type,
            rows = envelope.data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Report generated"
        );
        envelope
    }
}

impl fmt::Debug for ReportService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportService")
            .field("engine", &self.engine)
            .field("cache", self.cache.config())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::operators::evaluate_filter;
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn dataset() -> Dataset {
        Dataset {
            users: records(json!([
                {"id": "u1", "name": "Ada Lovelace"},
                {"id": "u2", "firstName": "Alan", "lastName": "Turing"},
            ])),
            projects: records(json!([
                {"id": "p1", "name": "Engine", "clientId": "c1", "hourlyRate": 80},
            ])),
            clients: records(json!([{"id": "c1", "name": "Babbage Ltd"}])),
            time_entries: records(json!([
                {"id": "t1", "userId": "u1", "projectId": "p1", "hours": 2, "billable": true, "hourlyRate": 100},
                {"id": "t2", "userId": "u2", "projectId": "p1", "hours": 3, "billable": true},
                {"id": "t3", "userId": "u2", "projectId": "p1", "hours": 1, "billable": false},
            ])),
        }
    }

    #[test]
    fn test_enrichment() {
        let data = dataset();
        let enriched = data.enriched_time_entries();

        assert_eq!(enriched[0]["amount"], json!(200));
        assert_eq!(enriched[1]["amount"], json!(240));
        assert_eq!(enriched[2]["amount"], json!(0));
        assert_eq!(enriched[0]["clientId"], json!("c1"));
        assert_eq!(enriched[0]["metadata"]["userName"], json!("Ada Lovelace"));
        assert_eq!(enriched[1]["metadata"]["userName"], json!("Alan Turing"));
        assert_eq!(enriched[0]["metadata"]["projectName"], json!("Engine"));
        assert_eq!(enriched[0]["metadata"]["clientName"], json!("Babbage Ltd"));

        // Source records are not modified
        assert!(!data.time_entries[0].contains_key("amount"));
    }

    #[test]
    fn test_date_window_bounds() {
        assert!(date_window("date", None, None).is_none());

        let window = date_window("date", Some("2024-01-01"), Some("2024-01-31")).unwrap();
        assert!(evaluate_filter(Some(&json!("2024-01-31T18:00:00Z")), &window));
        assert!(evaluate_filter(Some(&json!("2024-01-01")), &window));
        assert!(!evaluate_filter(Some(&json!("2024-02-01")), &window));

        let open_start = date_window("date", None, Some("2024-01-31")).unwrap();
        assert!(evaluate_filter(Some(&json!("1999-06-01")), &open_start));

        let open_end = date_window("date", Some("2024-01-01"), None).unwrap();
        assert!(evaluate_filter(Some(&json!("2031-06-01")), &open_end));
        assert!(!evaluate_filter(Some(&json!("2023-12-31")), &open_end));
    }

    #[test]
    fn test_report_key_includes_type() {
        let filters = json!({"startDate": "2024-01-01"});
        let time = report_key(ReportType::Time, &filters, "u1");
        assert_eq!(time, report_key(ReportType::Time, &filters, "u1"));
        assert_ne!(time, report_key(ReportType::Project, &filters, "u1"));
        assert_ne!(time, report_key(ReportType::Time, &filters, "u2"));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(0.0), 0.0);
    }
}
