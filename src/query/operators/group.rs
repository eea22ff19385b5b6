//! Group operator for partitioning filtered records
//!
//! Buckets records by one of three strategies (see [`GroupingMode`]):
//! calendar buckets of a date field, labelled custom ranges, or the `|`
//! joined values of one or more fields. Groups are emitted in the order
//! their first record was seen, and each group keeps its records in input
//! order.

use crate::query::ast::{CustomGrouping, DateGrouping, GroupBySpec, GroupingMode};
use crate::types::{display_string, get_present_value, strict_equals, to_date, to_number, Record};
use chrono::{DateTime, Datelike, Days, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key for records that match no custom range
pub const OTHER_GROUP: &str = "Other";

/// Key for records whose date field is missing or unparseable
pub const UNKNOWN_DATE_GROUP: &str = "Unknown";

/// One bucket of grouped records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Computed group key
    pub group_key: String,
    /// Number of records in the bucket
    pub count: usize,
    /// Records in encounter order
    pub items: Vec<Record>,
}

/// Operator that partitions records by a [`GroupBySpec`]
pub struct GroupOperator<'a> {
    spec: &'a GroupBySpec,
}

impl<'a> GroupOperator<'a> {
    /// Create a group operator
    pub fn new(spec: &'a GroupBySpec) -> Self {
        Self { spec }
    }

    /// Compute the group key for one record
    pub fn group_key(&self, record: &Record) -> String {
        match self.spec.mode() {
            GroupingMode::Date { field, granularity } => get_present_value(record, field)
                .and_then(to_date)
                .map(|date| date_bucket(date, granularity))
                .unwrap_or_else(|| UNKNOWN_DATE_GROUP.to_string()),
            GroupingMode::Custom(custom) => custom_bucket(record, custom).to_string(),
            GroupingMode::Fields(fields) => fields
                .iter()
                .map(|field| {
                    get_present_value(record, field)
                        .map(display_string)
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>()
                .join("|"),
        }
    }

    /// Partition records into groups
    pub fn apply(&self, records: &[Record]) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in records {
            let key = self.group_key(record);
            match index.get(&key) {
                Some(&i) => {
                    let group = &mut groups[i];
                    group.items.push(record.clone());
                    group.count += 1;
                },
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(Group {
                        group_key: key,
                        count: 1,
                        items: vec![record.clone()],
                    });
                },
            }
        }

        groups
    }
}

/// Format a timestamp as a calendar bucket key
///
/// Weeks start on Sunday.
pub fn date_bucket(date: DateTime<Utc>, granularity: DateGrouping) -> String {
    let day = date.date_naive();
    match granularity {
        DateGrouping::Day => day.format("%Y-%m-%d").to_string(),
        DateGrouping::Week => {
            let back = Days::new(u64::from(day.weekday().num_days_from_sunday()));
            let start = day.checked_sub_days(back).unwrap_or(day);
            format!("Week of {}", start.format("%Y-%m-%d"))
        },
        DateGrouping::Month => format!("{:04}-{:02}", day.year(), day.month()),
        DateGrouping::Quarter => format!("{:04}-Q{}", day.year(), (day.month() - 1) / 3 + 1),
        DateGrouping::Year => format!("{:04}", day.year()),
    }
}

/// Find the first custom range matching the record's value
///
/// A range's `values` allow-list is checked before its numeric bounds.
/// Ranges without any bound only match through their allow-list.
fn custom_bucket<'c>(record: &Record, custom: &'c CustomGrouping) -> &'c str {
    let Some(value) = get_present_value(record, &custom.field) else {
        return OTHER_GROUP;
    };
    let number = to_number(value);

    for range in &custom.ranges {
        if let Some(values) = &range.values {
            if values.iter().any(|v| strict_equals(value, v)) {
                return &range.label;
            }
        }

        if range.min.is_none() && range.max.is_none() {
            continue;
        }
        if let Some(n) = number {
            let above_min = range.min.map_or(true, |min| n >= min);
            let below_max = range.max.map_or(true, |max| n <= max);
            if above_min && below_max {
                return &range.label;
            }
        }
    }

    OTHER_GROUP
}
