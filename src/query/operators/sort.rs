//! Sort operator for ordering filtered records
//!
//! Multi-key, stable sort. Keys are compared in order and the first
//! non-equal comparison decides; records equal on every key keep their
//! input order.
//!
//! # Example
//!
//! ```rust
//! use tally_reports::query::operators::SortOperator;
//! use tally_reports::query::SortSpec;
//! use serde_json::json;
//!
//! let rows: Vec<_> = [json!({"hours": 2}), json!({"hours": 7})]
//!     .into_iter()
//!     .map(|v| v.as_object().cloned().unwrap())
//!     .collect();
//!
//! let keys = vec![SortSpec::desc("hours")];
//! let sorted = SortOperator::new(&keys).apply(rows);
//! assert_eq!(sorted[0]["hours"], json!(7));
//! ```

use crate::query::ast::{OrderDirection, SortSpec};
use crate::types::{get_present_value, Record};
use serde_json::Value;
use std::cmp::Ordering;

/// Operator that orders records by a list of [`SortSpec`] keys
pub struct SortOperator<'a> {
    keys: &'a [SortSpec],
}

impl<'a> SortOperator<'a> {
    /// Create a new SortOperator
    pub fn new(keys: &'a [SortSpec]) -> Self {
        Self { keys }
    }

    /// Compare two records on every key
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for key in self.keys {
            let left = get_present_value(a, &key.field);
            let right = get_present_value(b, &key.field);

            // Null placement ignores direction
            let cmp = match (left, right) {
                (None, None) => continue,
                (None, Some(_)) if key.nulls_first => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (Some(_), None) if key.nulls_first => return Ordering::Greater,
                (Some(_), None) => return Ordering::Less,
                (Some(l), Some(r)) => compare_values(l, r),
            };

            let cmp = match key.direction {
                OrderDirection::Asc => cmp,
                OrderDirection::Desc => cmp.reverse(),
            };

            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    }

    /// Sort records, preserving the relative order of equal records
    pub fn apply(&self, mut records: Vec<Record>) -> Vec<Record> {
        if self.keys.is_empty() || records.len() < 2 {
            return records;
        }
        records.sort_by(|a, b| self.compare(a, b));
        records
    }
}

/// Compare two present values
///
/// Values of different JSON types order by type first: null, bool, number,
/// string, array, object. Within a type numbers compare numerically and
/// strings use a locale-style comparison, so a numeric string is always a
/// string. The result is a total order for any mix of records.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        },
        (Value::String(x), Value::String(y)) => compare_text(x, y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        },
        _ => Ordering::Equal,
    })
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Case-insensitive ordering with lowercase before uppercase on ties
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}
