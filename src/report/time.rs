//! Time reports over enriched time entries

use super::{date_window, field_number, id_condition, is_billable, round2, Dataset, ReportBody};
use crate::error::Result;
use crate::query::operators::FilterChain;
use crate::query::{
    DateGrouping, FilterCondition, FilterOperator, FilterRequest, Group, GroupBySpec,
    PaginationSpec, QueryEngine, ResultData, SortSpec,
};
use crate::types::{display_string, get_present_value, DataSource, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Grouping dimension of a time report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrouping {
    /// By `userId`
    User,
    /// By `projectId`
    Project,
    /// By `clientId`
    Client,
    /// By calendar bucket of `date`
    Date,
    /// No grouping
    #[default]
    #[serde(rename = "none")]
    Ungrouped,
}

impl TimeGrouping {
    fn spec(self, granularity: Option<DateGrouping>) -> Option<GroupBySpec> {
        match self {
            TimeGrouping::User => Some(GroupBySpec::fields(["userId"])),
            TimeGrouping::Project => Some(GroupBySpec::fields(["projectId"])),
            TimeGrouping::Client => Some(GroupBySpec::fields(["clientId"])),
            TimeGrouping::Date => Some(GroupBySpec::by_date(
                "date",
                granularity.unwrap_or(DateGrouping::Day),
            )),
            TimeGrouping::Ungrouped => None,
        }
    }

    fn label_field(self) -> Option<&'static str> {
        match self {
            TimeGrouping::User => Some("metadata.userName"),
            TimeGrouping::Project => Some("metadata.projectName"),
            TimeGrouping::Client => Some("metadata.clientName"),
            TimeGrouping::Date | TimeGrouping::Ungrouped => None,
        }
    }
}

/// Time report parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeReportRequest {
    /// Inclusive lower date bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Inclusive upper date bound; a plain date covers the whole day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Restrict to these users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,
    /// Restrict to these projects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_ids: Option<Vec<String>>,
    /// Restrict to these clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ids: Option<Vec<String>>,
    /// Restrict to billable or non-billable entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billable: Option<bool>,
    /// Grouping dimension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<TimeGrouping>,
    /// Bucket size when grouping by date (default: day)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_grouping: Option<DateGrouping>,
    /// Return entry rows and groups (default: true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_details: Option<bool>,
    /// Sort keys (default: newest first)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorting: Option<Vec<SortSpec>>,
    /// Page of detail rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationSpec>,
}

impl TimeReportRequest {
    /// Filter conditions for the request, joined with AND
    pub fn conditions(&self) -> Vec<FilterCondition> {
        let mut conditions = Vec::new();
        conditions.extend(date_window(
            "date",
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        ));
        if let Some(ids) = &self.user_ids {
            conditions.push(id_condition("userId", ids));
        }
        if let Some(ids) = &self.project_ids {
            conditions.push(id_condition("projectId", ids));
        }
        if let Some(ids) = &self.client_ids {
            conditions.push(id_condition("clientId", ids));
        }
        if let Some(billable) = self.billable {
            conditions.push(FilterCondition::new(
                "billable",
                FilterOperator::Equals,
                Value::Bool(billable),
            ));
        }
        conditions
    }

    fn includes_details(&self) -> bool {
        self.include_details.unwrap_or(true)
    }

    fn sort_keys(&self) -> Vec<SortSpec> {
        match &self.sorting {
            Some(keys) if !keys.is_empty() => keys.clone(),
            _ => vec![SortSpec::desc("date")],
        }
    }
}

/// Time report totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSummary {
    /// Matching entries
    pub total_entries: usize,
    /// Sum of hours
    pub total_hours: f64,
    /// Hours on billable entries
    pub billable_hours: f64,
    /// Hours on non-billable entries
    pub non_billable_hours: f64,
    /// Sum of amounts
    pub total_amount: f64,
    /// Mean hours per entry (0 when empty)
    pub average_hours_per_entry: f64,
    /// Distinct users
    pub unique_users: usize,
    /// Distinct projects
    pub unique_projects: usize,
    /// Billable share of hours, in percent (0 when no hours)
    pub billable_percentage: f64,
    /// Per-group totals when the report is grouped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<GroupBreakdown>>,
}

impl TimeSummary {
    /// Totals over a set of enriched entries
    pub fn from_entries(entries: &[Record]) -> Self {
        let mut total_hours = 0.0;
        let mut billable_hours = 0.0;
        let mut total_amount = 0.0;
        let mut users = HashSet::new();
        let mut projects = HashSet::new();

        for entry in entries {
            let hours = field_number(entry, "hours").unwrap_or(0.0);
            total_hours += hours;
            if is_billable(entry) {
                billable_hours += hours;
            }
            total_amount += field_number(entry, "amount").unwrap_or(0.0);
            if let Some(user) = get_present_value(entry, "userId") {
                users.insert(display_string(user));
            }
            if let Some(project) = get_present_value(entry, "projectId") {
                projects.insert(display_string(project));
            }
        }

        let total_entries = entries.len();
        let average_hours_per_entry = if total_entries > 0 {
            round2(total_hours / total_entries as f64)
        } else {
            0.0
        };
        let billable_percentage = if total_hours > 0.0 {
            round2(billable_hours / total_hours * 100.0)
        } else {
            0.0
        };

        Self {
            total_entries,
            total_hours: round2(total_hours),
            billable_hours: round2(billable_hours),
            non_billable_hours: round2(total_hours - billable_hours),
            total_amount: round2(total_amount),
            average_hours_per_entry,
            unique_users: users.len(),
            unique_projects: projects.len(),
            billable_percentage,
            breakdown: None,
        }
    }
}

/// Totals for one group of a time report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBreakdown {
    /// Group key
    pub key: String,
    /// Display name (user, project or client name when known)
    pub label: String,
    /// Entries in the group
    pub entries: usize,
    /// Sum of hours
    pub hours: f64,
    /// Sum of amounts
    pub amount: f64,
}

impl GroupBreakdown {
    fn from_group(group: &Group, label_field: Option<&str>) -> Self {
        let label = label_field
            .and_then(|field| {
                group
                    .items
                    .iter()
                    .find_map(|item| get_present_value(item, field).map(display_string))
            })
            .unwrap_or_else(|| group.group_key.clone());

        let sum = |field: &str| {
            round2(
                group
                    .items
                    .iter()
                    .filter_map(|item| field_number(item, field))
                    .sum(),
            )
        };

        Self {
            key: group.group_key.clone(),
            label,
            entries: group.count,
            hours: sum("hours"),
            amount: sum("amount"),
        }
    }
}

pub(super) fn build(
    engine: &QueryEngine,
    request: &TimeReportRequest,
    dataset: &Dataset,
) -> Result<ReportBody> {
    let conditions = request.conditions();
    let grouping = request.group_by.unwrap_or_default();

    let mut pipeline = FilterRequest::new(DataSource::TimeEntries);
    pipeline.group_by = grouping.spec(request.date_grouping);
    pipeline.sorting = Some(request.sort_keys());
    pipeline.pagination = request.pagination;
    pipeline.validate()?;

    // Summary totals cover every match, not just the requested page
    let chain = FilterChain::new(&conditions);
    let matched: Vec<Record> = dataset
        .enriched_time_entries()
        .into_iter()
        .filter(|entry| chain.matches(entry))
        .collect();
    let mut summary = TimeSummary::from_entries(&matched);

    let result = engine.run_pipeline(&pipeline, DataSource::TimeEntries, matched);

    summary.breakdown = result.grouped_data.as_ref().map(|groups| {
        groups
            .iter()
            .map(|group| GroupBreakdown::from_group(group, grouping.label_field()))
            .collect()
    });

    let (data, grouped_data) = if request.includes_details() {
        let rows = match result.data {
            ResultData::Records(rows) => rows,
            ResultData::Groups(_) => Vec::new(),
        };
        (rows, result.grouped_data)
    } else {
        (Vec::new(), None)
    };

    Ok(ReportBody {
        summary: serde_json::to_value(&summary)?,
        data,
        grouped_data,
        pagination: result.pagination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryEngine;
    use crate::source::{InMemoryTableStore, SourcePolicy, TableConfig, TableRowSource};
    use serde_json::json;
    use std::sync::Arc;

    fn rows(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn dataset() -> Dataset {
        Dataset {
            users: rows(json!([{"id": "u1", "name": "Ada"}, {"id": "u2", "name": "Grace"}])),
            projects: rows(json!([
                {"id": "p1", "name": "Engine", "clientId": "c1", "hourlyRate": 100},
                {"id": "p2", "name": "Compiler", "clientId": "c2", "hourlyRate": 50},
            ])),
            clients: rows(json!([{"id": "c1", "name": "Babbage"}, {"id": "c2", "name": "Navy"}])),
            time_entries: rows(json!([
                {"id": "t1", "userId": "u1", "projectId": "p1", "date": "2024-01-05", "hours": 2, "billable": true},
                {"id": "t2", "userId": "u1", "projectId": "p2", "date": "2024-01-20", "hours": 4, "billable": true},
                {"id": "t3", "userId": "u2", "projectId": "p2", "date": "2024-02-03", "hours": 2, "billable": false},
                {"id": "t4", "userId": "u2", "projectId": "p1", "date": "2024-03-01", "hours": 1, "billable": true},
            ])),
        }
    }

    fn engine() -> QueryEngine {
        let source = TableRowSource::new(
            Arc::new(InMemoryTableStore::new()),
            TableConfig::by_source_name(),
            SourcePolicy::Lenient,
        );
        QueryEngine::new(Arc::new(source))
    }

    #[test]
    fn test_conditions_from_request() {
        let request = TimeReportRequest {
            start_date: Some("2024-01-01".into()),
            user_ids: Some(vec!["u1".into()]),
            billable: Some(true),
            ..Default::default()
        };
        let conditions = request.conditions();
        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[0].operator, FilterOperator::DateRange);
        assert_eq!(conditions[1].operator, FilterOperator::In);
        assert_eq!(conditions[2].value, json!(true));

        assert!(TimeReportRequest::default().conditions().is_empty());
    }

    #[tokio::test]
    async fn test_summary_totals() {
        let engine = engine();
        let body = build(&engine, &TimeReportRequest::default(), &dataset()).unwrap();
        let summary: TimeSummary = serde_json::from_value(body.summary).unwrap();

        assert_eq!(summary.total_entries, 4);
        assert_eq!(summary.total_hours, 9.0);
        assert_eq!(summary.billable_hours, 7.0);
        assert_eq!(summary.non_billable_hours, 2.0);
        // 2*100 + 4*50 + 1*100
        assert_eq!(summary.total_amount, 500.0);
        assert_eq!(summary.average_hours_per_entry, 2.25);
        assert_eq!(summary.unique_users, 2);
        assert_eq!(summary.unique_projects, 2);
        assert_eq!(summary.billable_percentage, 77.78);
        assert!(summary.breakdown.is_none());

        // Default sort is newest first
        assert_eq!(body.data[0]["id"], json!("t4"));
        assert_eq!(body.data[3]["id"], json!("t1"));
    }

    #[tokio::test]
    async fn test_date_window_and_billable_filter() {
        let engine = engine();
        let request = TimeReportRequest {
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-01-31".into()),
            billable: Some(true),
            ..Default::default()
        };
        let body = build(&engine, &request, &dataset()).unwrap();
        let ids: Vec<_> = body.data.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("t2"), json!("t1")]);
        assert_eq!(body.summary["totalHours"].as_f64(), Some(6.0));
    }

    #[tokio::test]
    async fn test_grouped_by_user_breakdown() {
        let engine = engine();
        let request = TimeReportRequest {
            group_by: Some(TimeGrouping::User),
            ..Default::default()
        };
        let body = build(&engine, &request, &dataset()).unwrap();
        let summary: TimeSummary = serde_json::from_value(body.summary).unwrap();
        let breakdown = summary.breakdown.unwrap();

        assert_eq!(breakdown.len(), 2);
        let ada = breakdown.iter().find(|b| b.key == "u1").unwrap();
        assert_eq!(ada.label, "Ada");
        assert_eq!(ada.entries, 2);
        assert_eq!(ada.hours, 6.0);
        assert_eq!(ada.amount, 400.0);
        assert_eq!(body.grouped_data.map(|g| g.len()), Some(2));
    }

    #[tokio::test]
    async fn test_grouped_by_month() {
        let engine = engine();
        let request = TimeReportRequest {
            group_by: Some(TimeGrouping::Date),
            date_grouping: Some(DateGrouping::Month),
            include_details: Some(false),
            ..Default::default()
        };
        let body = build(&engine, &request, &dataset()).unwrap();
        let keys: Vec<String> = body.summary["breakdown"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["key"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["2024-01", "2024-02", "2024-03"]);

        // Details suppressed
        assert!(body.data.is_empty());
        assert!(body.grouped_data.is_none());
    }

    #[tokio::test]
    async fn test_paginated_details_keep_full_summary() {
        let engine = engine();
        let request = TimeReportRequest {
            pagination: Some(PaginationSpec {
                offset: 0,
                limit: Some(1),
            }),
            ..Default::default()
        };
        let body = build(&engine, &request, &dataset()).unwrap();
        assert_eq!(body.data.len(), 1);
        assert_eq!(body.summary["totalEntries"], json!(4));
        let page = body.pagination.unwrap();
        assert!(page.has_more);
        assert_eq!(page.total_count, 4);
    }
}
