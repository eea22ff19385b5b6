//! Project reports
//!
//! Every project becomes one derived row with totals over its time
//! entries. The rows then go through the regular filter and sort stages,
//! so project filters and sort keys behave exactly like a query against
//! the `projects` source.

use super::{date_window, field_number, id_condition, is_billable, round2, Dataset, ReportBody};
use crate::error::Result;
use crate::query::operators::FilterChain;
use crate::query::{FilterCondition, FilterOperator, FilterRequest, QueryEngine, ResultData, SortSpec};
use crate::types::{display_string, get_present_value, number_value, DataSource, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Project report parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReportRequest {
    /// Restrict to these projects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_ids: Option<Vec<String>>,
    /// Restrict to projects of these clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ids: Option<Vec<String>>,
    /// Restrict to one project status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Only count time entries on or after this date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Only count time entries up to this date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Return project rows (default: true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_details: Option<bool>,
    /// Sort keys (default: most hours first)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorting: Option<Vec<SortSpec>>,
}

impl ProjectReportRequest {
    /// Conditions on derived project rows
    pub fn conditions(&self) -> Vec<FilterCondition> {
        let mut conditions = Vec::new();
        if let Some(ids) = &self.project_ids {
            conditions.push(id_condition("id", ids));
        }
        if let Some(ids) = &self.client_ids {
            conditions.push(id_condition("clientId", ids));
        }
        if let Some(status) = &self.status {
            conditions.push(FilterCondition::new(
                "status",
                FilterOperator::Equals,
                Value::String(status.clone()),
            ));
        }
        conditions
    }

    fn sort_keys(&self) -> Vec<SortSpec> {
        match &self.sorting {
            Some(keys) if !keys.is_empty() => keys.clone(),
            _ => vec![SortSpec::desc("hours")],
        }
    }
}

/// Totals for one project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRow {
    /// Project id
    pub id: Value,
    /// Project name
    pub name: Value,
    /// Project status
    pub status: Value,
    /// Owning client id
    pub client_id: Value,
    /// Owning client name
    pub client_name: Value,
    /// Budget (0 when unset)
    pub budget: f64,
    /// Hours logged
    pub hours: f64,
    /// Billable hours logged
    pub billable_hours: f64,
    /// Billable amount
    pub amount: f64,
    /// Time entries counted
    pub entry_count: usize,
    /// Distinct users with entries
    pub team_size: usize,
    /// `amount / budget` in percent (0 without a budget)
    pub budget_utilization: f64,
}

impl ProjectRow {
    fn into_record(self) -> Record {
        let mut record = Record::new();
        record.insert("id".into(), self.id);
        record.insert("name".into(), self.name);
        record.insert("status".into(), self.status);
        record.insert("clientId".into(), self.client_id);
        record.insert("clientName".into(), self.client_name);
        record.insert("budget".into(), number_value(self.budget));
        record.insert("hours".into(), number_value(self.hours));
        record.insert("billableHours".into(), number_value(self.billable_hours));
        record.insert("amount".into(), number_value(self.amount));
        record.insert("entryCount".into(), Value::from(self.entry_count));
        record.insert("teamSize".into(), Value::from(self.team_size));
        record.insert("budgetUtilization".into(), number_value(self.budget_utilization));
        record
    }
}

#[derive(Default)]
struct ProjectTotals {
    hours: f64,
    billable_hours: f64,
    amount: f64,
    entries: usize,
    users: HashSet<String>,
}

/// Derive one row per project from its time entries
pub fn project_rows(dataset: &Dataset, entry_filter: &[FilterCondition]) -> Vec<ProjectRow> {
    let chain = FilterChain::new(entry_filter);
    let mut totals: HashMap<String, ProjectTotals> = HashMap::new();
    for entry in dataset.enriched_time_entries() {
        if !chain.matches(&entry) {
            continue;
        }
        let Some(project_id) = get_present_value(&entry, "projectId").map(display_string) else {
            continue;
        };
        let t = totals.entry(project_id).or_default();
        let hours = field_number(&entry, "hours").unwrap_or(0.0);
        t.hours += hours;
        if is_billable(&entry) {
            t.billable_hours += hours;
        }
        t.amount += field_number(&entry, "amount").unwrap_or(0.0);
        t.entries += 1;
        if let Some(user) = get_present_value(&entry, "userId") {
            t.users.insert(display_string(user));
        }
    }

    let client_names: HashMap<String, Value> = dataset
        .clients
        .iter()
        .filter_map(|c| {
            let id = get_present_value(c, "id")?;
            Some((display_string(id), c.get("name").cloned().unwrap_or(Value::Null)))
        })
        .collect();

    dataset
        .projects
        .iter()
        .map(|project| {
            let field = |name: &str| project.get(name).cloned().unwrap_or(Value::Null);
            let id = field("id");
            let client_id = field("clientId");
            let client_name = get_present_value(project, "clientId")
                .and_then(|c| client_names.get(&display_string(c)).cloned())
                .unwrap_or(Value::Null);
            let t = get_present_value(project, "id")
                .and_then(|id| totals.remove(&display_string(id)))
                .unwrap_or_default();
            let budget = field_number(project, "budget").unwrap_or(0.0);
            let budget_utilization = if budget > 0.0 {
                round2(t.amount / budget * 100.0)
            } else {
                0.0
            };

            ProjectRow {
                id,
                name: field("name"),
                status: field("status"),
                client_id,
                client_name,
                budget,
                hours: round2(t.hours),
                billable_hours: round2(t.billable_hours),
                amount: round2(t.amount),
                entry_count: t.entries,
                team_size: t.users.len(),
                budget_utilization,
            }
        })
        .collect()
}

/// Project report totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    /// Projects in the report
    pub total_projects: usize,
    /// Projects with status `active`
    pub active_projects: usize,
    /// Sum of budgets
    pub total_budget: f64,
    /// Sum of hours
    pub total_hours: f64,
    /// Sum of amounts
    pub total_amount: f64,
    /// Mean utilization over projects with a budget (0 when none)
    pub average_budget_utilization: f64,
}

impl ProjectSummary {
    /// Totals over derived project rows
    pub fn from_rows(rows: &[Record]) -> Self {
        fn number(row: &Record, field: &str) -> f64 {
            field_number(row, field).unwrap_or(0.0)
        }

        let budgeted: Vec<f64> = rows
            .iter()
            .filter(|&row| number(row, "budget") > 0.0)
            .map(|row| number(row, "budgetUtilization"))
            .collect();
        let average_budget_utilization = if budgeted.is_empty() {
            0.0
        } else {
            round2(budgeted.iter().sum::<f64>() / budgeted.len() as f64)
        };

        Self {
            total_projects: rows.len(),
            active_projects: rows
                .iter()
                .filter(|row| row.get("status").and_then(Value::as_str) == Some("active"))
                .count(),
            total_budget: round2(rows.iter().map(|r| number(r, "budget")).sum()),
            total_hours: round2(rows.iter().map(|r| number(r, "hours")).sum()),
            total_amount: round2(rows.iter().map(|r| number(r, "amount")).sum()),
            average_budget_utilization,
        }
    }
}

pub(super) fn build(
    engine: &QueryEngine,
    request: &ProjectReportRequest,
    dataset: &Dataset,
) -> Result<ReportBody> {
    let mut pipeline = FilterRequest::new(DataSource::Projects);
    pipeline.filters = Some(request.conditions());
    pipeline.sorting = Some(request.sort_keys());
    pipeline.validate()?;

    let entry_filter: Vec<FilterCondition> = date_window(
        "date",
        request.start_date.as_deref(),
        request.end_date.as_deref(),
    )
    .into_iter()
    .collect();
    let rows = project_rows(dataset, &entry_filter)
        .into_iter()
        .map(ProjectRow::into_record)
        .collect();

    let result = engine.run_pipeline(&pipeline, DataSource::Projects, rows);
    let rows = match result.data {
        ResultData::Records(rows) => rows,
        ResultData::Groups(_) => Vec::new(),
    };
    let summary = ProjectSummary::from_rows(&rows);

    Ok(ReportBody {
        summary: serde_json::to_value(&summary)?,
        data: if request.include_details.unwrap_or(true) {
            rows
        } else {
            Vec::new()
        },
        grouped_data: None,
        pagination: None,
    })
}
