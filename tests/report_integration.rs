//! Integration tests for cached reports
//!
//! These tests validate the report service end to end:
//! - Concurrent fetch and enrichment of time entries
//! - Time and project report summaries
//! - Cache hits, canonical cache keys and per-user isolation
//! - Missing-table policies surfacing through reports

use std::sync::Arc;

use serde_json::{json, Value};
use tally_reports::cache::{generate_cache_key, CacheConfig, MemoryCacheStore, ReportCache};
use tally_reports::query::{QueryEngine, QueryErrorKind};
use tally_reports::report::{ReportType, TimeGrouping};
use tally_reports::source::{InMemoryTableStore, SourcePolicy, TableConfig, TableRowSource};
use tally_reports::{Error, ProjectReportRequest, ReportService, TimeReportRequest};

// ============================================================================
// Helper Functions
// ============================================================================

async fn seeded_store() -> InMemoryTableStore {
    let store = InMemoryTableStore::new();
    store
        .insert_json(
            "users",
            json!([{"id": "u1", "name": "Ada"}, {"id": "u2", "name": "Grace"}]),
        )
        .await
        .unwrap();
    store
        .insert_json(
            "projects",
            json!([
                {"id": "p1", "name": "Engine", "status": "active", "clientId": "c1", "budget": 2000, "hourlyRate": 100},
                {"id": "p2", "name": "Compiler", "status": "active", "clientId": "c2", "budget": 1000, "hourlyRate": 50},
            ]),
        )
        .await
        .unwrap();
    store
        .insert_json(
            "clients",
            json!([{"id": "c1", "name": "Babbage"}, {"id": "c2", "name": "Navy"}]),
        )
        .await
        .unwrap();
    store
        .insert_json(
            "time-entries",
            json!([
                {"id": "t1", "userId": "u1", "projectId": "p1", "date": "2024-03-01", "hours": 5, "billable": true},
                {"id": "t2", "userId": "u2", "projectId": "p2", "date": "2024-03-02", "hours": 3, "billable": false},
                {"id": "t3", "userId": "u2", "projectId": "p1", "date": "2024-04-10", "hours": 2, "billable": true},
            ]),
        )
        .await
        .unwrap();
    store
}

fn service_with(store: InMemoryTableStore, tables: TableConfig, policy: SourcePolicy, cache: CacheConfig) -> ReportService {
    let source = TableRowSource::new(Arc::new(store), tables, policy);
    let engine = QueryEngine::new(Arc::new(source));
    let cache_store = MemoryCacheStore::new(cache.max_entries);
    ReportService::new(engine, ReportCache::new(Arc::new(cache_store), cache))
}

async fn service() -> ReportService {
    service_with(
        seeded_store().await,
        TableConfig::by_source_name(),
        SourcePolicy::Strict,
        CacheConfig::default(),
    )
}

// ============================================================================
// Time Reports
// ============================================================================

#[tokio::test]
async fn test_time_report_summary() {
    let service = service().await;
    let request = TimeReportRequest {
        start_date: Some("2024-03-01".into()),
        end_date: Some("2024-03-31".into()),
        group_by: Some(TimeGrouping::Project),
        ..Default::default()
    };

    let report = service.generate_time_report(&request, "manager").await.unwrap();
    assert_eq!(report.report_type, ReportType::Time);
    assert!(!report.cache_info.cached);

    let summary = &report.summary;
    assert_eq!(summary["totalEntries"], json!(2));
    assert_eq!(summary["totalHours"].as_f64(), Some(8.0));
    assert_eq!(summary["billableHours"].as_f64(), Some(5.0));
    assert_eq!(summary["totalAmount"].as_f64(), Some(500.0));
    assert_eq!(summary["billablePercentage"].as_f64(), Some(62.5));

    let labels: Vec<_> = summary["breakdown"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["label"].clone())
        .collect();
    assert_eq!(labels, vec![json!("Engine"), json!("Compiler")]);

    // Detail rows carry the enrichment
    let first = &report.data[0];
    assert_eq!(first["id"], json!("t2"));
    assert_eq!(first["metadata"]["clientName"], json!("Navy"));
    assert_eq!(first["amount"], json!(0));
}

#[tokio::test]
async fn test_second_call_is_served_from_cache() {
    let service = service().await;
    let request = TimeReportRequest {
        user_ids: Some(vec!["u2".into()]),
        ..Default::default()
    };

    let first = service.generate_time_report(&request, "manager").await.unwrap();
    let second = service.generate_time_report(&request, "manager").await.unwrap();

    assert!(!first.cache_info.cached);
    assert!(second.cache_info.cached);
    assert_eq!(first.report_id, second.report_id);
    assert_eq!(first.cache_info.cache_key, second.cache_info.cache_key);
    assert_eq!(first.cache_info.expires_at, second.cache_info.expires_at);
    assert_eq!(first.data, second.data);
    assert_eq!(service.cache().stats().hits.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_reordered_request_hits_same_entry() {
    let service = service().await;
    let a: TimeReportRequest =
        serde_json::from_value(json!({"startDate": "2024-03-01", "billable": true, "groupBy": "user"})).unwrap();
    let b: TimeReportRequest =
        serde_json::from_value(json!({"groupBy": "user", "billable": true, "startDate": "2024-03-01"})).unwrap();

    let first = service.generate_time_report(&a, "manager").await.unwrap();
    let second = service.generate_time_report(&b, "manager").await.unwrap();
    assert!(second.cache_info.cached);
    assert_eq!(first.report_id, second.report_id);

    // Key order never matters for the raw key either
    let x = json!({"startDate": "2024-03-01", "nested": {"b": 1, "a": 2}});
    let y = json!({"nested": {"a": 2, "b": 1}, "startDate": "2024-03-01"});
    assert_eq!(generate_cache_key(&x, "u"), generate_cache_key(&y, "u"));
}

#[tokio::test]
async fn test_cache_is_per_user() {
    let service = service().await;
    let request = TimeReportRequest::default();

    let first = service.generate_time_report(&request, "alice").await.unwrap();
    let other = service.generate_time_report(&request, "bob").await.unwrap();
    assert!(!other.cache_info.cached);
    assert_ne!(first.cache_info.cache_key, other.cache_info.cache_key);
}

#[tokio::test]
async fn test_disabled_cache_never_hits() {
    let service = service_with(
        seeded_store().await,
        TableConfig::by_source_name(),
        SourcePolicy::Strict,
        CacheConfig::default().disabled(),
    );
    let request = TimeReportRequest::default();

    service.generate_time_report(&request, "manager").await.unwrap();
    let second = service.generate_time_report(&request, "manager").await.unwrap();
    assert!(!second.cache_info.cached);
}

// ============================================================================
// Project Reports
// ============================================================================

#[tokio::test]
async fn test_project_report() {
    let service = service().await;
    let request = ProjectReportRequest {
        end_date: Some("2024-03-31".into()),
        ..Default::default()
    };

    let report = service.generate_project_report(&request, "manager").await.unwrap();
    assert_eq!(report.report_type, ReportType::Project);
    assert_eq!(report.data.len(), 2);

    let engine_row = &report.data[0];
    assert_eq!(engine_row["id"], json!("p1"));
    assert_eq!(engine_row["hours"], json!(5));
    assert_eq!(engine_row["teamSize"], json!(1));
    assert_eq!(engine_row["budgetUtilization"], json!(25));
    assert_eq!(engine_row["clientName"], json!("Babbage"));

    assert_eq!(report.summary["totalProjects"], json!(2));
    assert_eq!(report.summary["activeProjects"], json!(2));
    assert_eq!(report.summary["totalBudget"].as_f64(), Some(3000.0));
    // Mean of 25% and 0%
    assert_eq!(report.summary["averageBudgetUtilization"].as_f64(), Some(12.5));
}

#[tokio::test]
async fn test_report_kinds_do_not_share_entries() {
    let service = service().await;
    let time = service
        .generate_time_report(&TimeReportRequest::default(), "manager")
        .await
        .unwrap();
    let project = service
        .generate_project_report(&ProjectReportRequest::default(), "manager")
        .await
        .unwrap();

    // Both requests serialize to `{}`; the report type keeps the keys apart
    assert_eq!(time.filters, Value::Object(Default::default()));
    assert_eq!(project.filters, time.filters);
    assert_eq!(project.report_type, ReportType::Project);
    assert!(!project.cache_info.cached);
    assert_ne!(project.cache_info.cache_key, time.cache_info.cache_key);
}

// ============================================================================
// Source Policies
// ============================================================================

#[tokio::test]
async fn test_strict_policy_fails_report() {
    let tables = TableConfig {
        users: None,
        ..TableConfig::by_source_name()
    };
    let service = service_with(seeded_store().await, tables, SourcePolicy::Strict, CacheConfig::default());

    let err = service
        .generate_time_report(&TimeReportRequest::default(), "manager")
        .await
        .unwrap_err();
    match err {
        Error::Query(e) => assert_eq!(e.kind, QueryErrorKind::ConfigurationError),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_lenient_policy_yields_empty_report() {
    let service = service_with(
        InMemoryTableStore::new(),
        TableConfig::default(),
        SourcePolicy::Lenient,
        CacheConfig::default(),
    );

    let report = service
        .generate_time_report(&TimeReportRequest::default(), "manager")
        .await
        .unwrap();
    assert!(report.data.is_empty());
    assert_eq!(report.summary["totalEntries"], json!(0));
    assert_eq!(report.summary["billablePercentage"].as_f64(), Some(0.0));
}
