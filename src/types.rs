//! Core data types for the report engine
//!
//! Records are loosely-typed JSON objects whose shape differs per data
//! source. Nothing here enforces a schema; instead the helpers below give
//! typed, `Option`-returning views over a `serde_json::Value`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;

/// A single row from a data source
pub type Record = Map<String, Value>;

// ============================================================================
// Data Sources
// ============================================================================

/// Named data sources the engine can query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSource {
    /// Logged time entries
    #[serde(rename = "time-entries")]
    TimeEntries,
    /// Projects
    #[serde(rename = "projects")]
    Projects,
    /// Clients
    #[serde(rename = "clients")]
    Clients,
    /// Users
    #[serde(rename = "users")]
    Users,
}

impl DataSource {
    /// All known data sources
    pub const ALL: [DataSource; 4] = [
        DataSource::TimeEntries,
        DataSource::Projects,
        DataSource::Clients,
        DataSource::Users,
    ];

    /// Wire name of the data source
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::TimeEntries => "time-entries",
            DataSource::Projects => "projects",
            DataSource::Clients => "clients",
            DataSource::Users => "users",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataSource::ALL
            .iter()
            .copied()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| format!("unknown data source '{}'", s))
    }
}

// ============================================================================
// Field Access
// ============================================================================

/// Look up a possibly dotted field path (`metadata.userName`) in a record
///
/// Each segment descends into an object by key, or into an array when the
/// segment is a numeric index. Returns `None` as soon as a segment is missing.
pub fn get_nested_value<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get(first)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Look up a field and treat explicit JSON `null` the same as a missing field
pub fn get_present_value<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    get_nested_value(record, path).filter(|v| !v.is_null())
}

/// Set a possibly dotted field path, creating intermediate objects
///
/// Used when deriving enriched copies of records; existing non-object
/// values on the path are replaced.
pub fn set_nested_value(record: &mut Record, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            record.insert(path.to_string(), value);
        },
        Some((head, rest)) => {
            let entry = record
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_nested_value(child, rest, value);
            }
        },
    }
}

// ============================================================================
// Coercions
// ============================================================================

/// Numeric view of a value
///
/// Numbers pass through, booleans become 1/0, strings are parsed after
/// trimming (an empty string is 0). Anything else has no numeric view.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Some(0.0);
            }
            trimmed.parse::<f64>().ok().filter(|n| !n.is_nan())
        },
        _ => None,
    }
}

/// Date view of a value
///
/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS[.fff]` (taken as
/// UTC), plain `YYYY-MM-DD` dates (midnight UTC) and epoch milliseconds.
pub fn to_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// String view used by the string operators and group keys
pub fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => display_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Strict equality between two values
///
/// Numbers compare by numeric value so `5` and `5.0` are equal; all other
/// values compare structurally without any coercion.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Convert a computed float back into a JSON number
///
/// Integral values are emitted as integers so totals serialize as `5`
/// rather than `5.0`. Non-finite values become `null`.
pub fn number_value(n: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_data_source_round_trip_names() {
        for source in DataSource::ALL {
            assert_eq!(source.as_str().parse::<DataSource>().unwrap(), source);
        }
        assert!("invoices".parse::<DataSource>().is_err());
    }

    #[test]
    fn test_nested_lookup() {
        let r = record(json!({
            "id": "t1",
            "metadata": { "userName": "Ada", "tags": ["a", "b"] }
        }));

        assert_eq!(get_nested_value(&r, "id"), Some(&json!("t1")));
        assert_eq!(get_nested_value(&r, "metadata.userName"), Some(&json!("Ada")));
        assert_eq!(get_nested_value(&r, "metadata.tags.1"), Some(&json!("b")));
        assert_eq!(get_nested_value(&r, "metadata.missing"), None);
        assert_eq!(get_nested_value(&r, "id.deeper"), None);
    }

    #[test]
    fn test_present_value_skips_null() {
        let r = record(json!({ "a": null }));
        assert!(get_nested_value(&r, "a").is_some());
        assert!(get_present_value(&r, "a").is_none());
    }

    #[test]
    fn test_set_nested_value_creates_path() {
        let mut r = record(json!({ "id": "t1", "metadata": "flat" }));
        set_nested_value(&mut r, "metadata.userName", json!("Ada"));
        assert_eq!(get_nested_value(&r, "metadata.userName"), Some(&json!("Ada")));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(&json!(5)), Some(5.0));
        assert_eq!(to_number(&json!(" 2.5 ")), Some(2.5));
        assert_eq!(to_number(&json!("")), Some(0.0));
        assert_eq!(to_number(&json!(true)), Some(1.0));
        assert_eq!(to_number(&json!("abc")), None);
        assert_eq!(to_number(&json!([1])), None);
    }

    #[test]
    fn test_to_date_formats() {
        let a = to_date(&json!("2024-01-15")).unwrap();
        let b = to_date(&json!("2024-01-15T00:00:00Z")).unwrap();
        let c = to_date(&json!(a.timestamp_millis())).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(to_date(&json!("not a date")).is_none());
    }

    #[test]
    fn test_number_value_integral() {
        assert_eq!(number_value(5.0), json!(5));
        assert_eq!(number_value(2.5), json!(2.5));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn test_strict_equals_numbers() {
        assert!(strict_equals(&json!(5), &json!(5.0)));
        assert!(!strict_equals(&json!(5), &json!("5")));
        assert!(strict_equals(&json!("a"), &json!("a")));
    }
}
