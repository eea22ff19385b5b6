//! Filter Operator - Predicate evaluation
//!
//! Evaluates filter conditions against record fields and folds the
//! per-condition results into a single keep/drop decision per record.
//! Regex patterns are compiled once per chain, not once per row.

use crate::query::ast::{FilterCondition, FilterOperator, LogicalOperator};
use crate::query::error::QueryError;
use crate::query::executor::ExecutionContext;
use crate::types::{display_string, get_nested_value, strict_equals, to_date, to_number, Record};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::{debug, trace};

/// Compiled size limit for user-supplied patterns
const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

/// Evaluate a single condition against a field value
///
/// `value` is the field as found in the record (`None` when missing).
/// Conditions that cannot be evaluated (bad regex, failed numeric or date
/// cast) are treated as not matching.
pub fn evaluate_filter(value: Option<&Value>, condition: &FilterCondition) -> bool {
    let prepared = PreparedCondition::new(condition);
    match prepared.evaluate(value) {
        Ok(matched) => matched,
        Err(e) => {
            debug!(field = %condition.field, operator = %condition.operator, error = %e, "Predicate degraded to false");
            false
        },
    }
}

// ============================================================================
// Prepared Conditions
// ============================================================================

/// A condition with its regex (if any) compiled ahead of evaluation
struct PreparedCondition<'a> {
    condition: &'a FilterCondition,
    regex: Option<Result<Regex, String>>,
}

impl<'a> PreparedCondition<'a> {
    fn new(condition: &'a FilterCondition) -> Self {
        let regex = (condition.operator == FilterOperator::Regex).then(|| {
            RegexBuilder::new(&display_string(&condition.value))
                .case_insensitive(!condition.case_sensitive)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()
                .map_err(|e| e.to_string())
        });
        Self { condition, regex }
    }

    /// Evaluate against a field value
    ///
    /// Null handling comes first: `is_null`/`is_not_null` only look at
    /// presence, and every other operator fails on a null value.
    fn evaluate(&self, value: Option<&Value>) -> Result<bool, QueryError> {
        let condition = self.condition;
        let value = value.filter(|v| !v.is_null());

        let value = match (condition.operator, value) {
            (FilterOperator::IsNull, v) => return Ok(v.is_none()),
            (FilterOperator::IsNotNull, v) => return Ok(v.is_some()),
            (_, None) => return Ok(false),
            (_, Some(v)) => v,
        };

        let target = &condition.value;
        let fold = !condition.case_sensitive;

        let matched = match condition.operator {
            FilterOperator::Equals => loose_equals(value, target, fold),
            FilterOperator::NotEquals => !loose_equals(value, target, fold),
            FilterOperator::Contains => contains(value, target, fold),
            FilterOperator::NotContains => !contains(value, target, fold),
            FilterOperator::StartsWith => {
                fold_case(display_string(value), fold).starts_with(&fold_case(display_string(target), fold))
            },
            FilterOperator::EndsWith => {
                fold_case(display_string(value), fold).ends_with(&fold_case(display_string(target), fold))
            },
            FilterOperator::GreaterThan => numeric(value, "field")? > numeric(target, "value")?,
            FilterOperator::LessThan => numeric(value, "field")? < numeric(target, "value")?,
            FilterOperator::GreaterEqual => numeric(value, "field")? >= numeric(target, "value")?,
            FilterOperator::LessEqual => numeric(value, "field")? <= numeric(target, "value")?,
            FilterOperator::Between => {
                let v = numeric(value, "field")?;
                let low = numeric(target, "value")?;
                let high = numeric(self.second_value()?, "secondValue")?;
                low <= v && v <= high
            },
            FilterOperator::In => target
                .as_array()
                .map(|items| items.iter().any(|item| strict_equals(value, item)))
                .unwrap_or(false),
            FilterOperator::NotIn => target
                .as_array()
                .map(|items| !items.iter().any(|item| strict_equals(value, item)))
                .unwrap_or(false),
            FilterOperator::Regex => match &self.regex {
                Some(Ok(regex)) => regex.is_match(&display_string(value)),
                Some(Err(e)) => {
                    return Err(QueryError::partial(format!("invalid regex pattern: {}", e)))
                },
                None => false,
            },
            FilterOperator::DateRange => {
                let v = date(value, "field")?;
                let start = date(target, "value")?;
                let end = date(self.second_value()?, "secondValue")?;
                start <= v && v <= end
            },
            FilterOperator::IsNull => false,
            FilterOperator::IsNotNull => true,
        };

        Ok(matched)
    }

    fn second_value(&self) -> Result<&Value, QueryError> {
        self.condition
            .second_value
            .as_ref()
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                QueryError::partial(format!("{} requires secondValue", self.condition.operator))
            })
    }
}

fn fold_case(s: String, fold: bool) -> String {
    if fold {
        s.to_lowercase()
    } else {
        s
    }
}

/// String comparison honours case folding; everything else is strict
fn loose_equals(value: &Value, target: &Value, fold: bool) -> bool {
    match (value, target) {
        (Value::String(a), Value::String(b)) if fold => a.to_lowercase() == b.to_lowercase(),
        _ => strict_equals(value, target),
    }
}

/// Substring test on the string views of both sides
///
/// Arrays are joined with `,` first, so `["a", "b"]` contains `"a,b"`.
fn contains(value: &Value, target: &Value, fold: bool) -> bool {
    fold_case(display_string(value), fold).contains(&fold_case(display_string(target), fold))
}

fn numeric(value: &Value, role: &str) -> Result<f64, QueryError> {
    to_number(value)
        .ok_or_else(|| QueryError::partial(format!("{} {} is not numeric", role, value)))
}

fn date(value: &Value, role: &str) -> Result<chrono::DateTime<chrono::Utc>, QueryError> {
    to_date(value).ok_or_else(|| QueryError::partial(format!("{} {} is not a date", role, value)))
}

// ============================================================================
// Filter Chain
// ============================================================================

/// Ordered list of conditions folded left to right into one decision
///
/// The fold starts from `true` with a pending `AND`. Each condition is
/// combined using the *pending* operator, and only afterwards does its own
/// `logicalOperator` become pending. So a condition's `logicalOperator`
/// controls how the **next** condition joins, and the first condition
/// always ANDs against `true`. There is no operator precedence: results
/// of multi-condition OR queries depend on this exact fold.
pub struct FilterChain<'a> {
    conditions: Vec<PreparedCondition<'a>>,
}

impl<'a> FilterChain<'a> {
    /// Prepare a chain, compiling any regex conditions
    pub fn new(conditions: &'a [FilterCondition]) -> Self {
        Self {
            conditions: conditions.iter().map(PreparedCondition::new).collect(),
        }
    }

    /// Number of conditions in the chain
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Whether the chain is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Decide whether a record passes the chain
    pub fn matches(&self, record: &Record) -> bool {
        let mut degraded = 0;
        self.matches_counting(record, &mut degraded)
    }

    fn matches_counting(&self, record: &Record, degraded: &mut usize) -> bool {
        let mut result = true;
        let mut pending = LogicalOperator::And;

        for prepared in &self.conditions {
            // Skip evaluation when the pending operator cannot change the result
            let decided = matches!(
                (pending, result),
                (LogicalOperator::And, false) | (LogicalOperator::Or, true)
            );

            if !decided {
                let field = get_nested_value(record, &prepared.condition.field);
                let passed = match prepared.evaluate(field) {
                    Ok(passed) => passed,
                    Err(e) => {
                        *degraded += 1;
                        trace!(field = %prepared.condition.field, error = %e, "Predicate degraded to false");
                        false
                    },
                };
                result = match pending {
                    LogicalOperator::And => result && passed,
                    LogicalOperator::Or => result || passed,
                };
            }

            pending = prepared.condition.next_operator();
        }

        result
    }

    /// Keep the records that pass the chain, preserving order
    pub fn apply(&self, records: Vec<Record>, ctx: &mut ExecutionContext) -> Vec<Record> {
        if self.is_empty() {
            ctx.record_filtered(records.len());
            return records;
        }

        let mut degraded = 0;
        let kept: Vec<Record> = records
            .into_iter()
            .filter(|record| self.matches_counting(record, &mut degraded))
            .collect();

        if degraded > 0 {
            debug!(degraded, "Predicates degraded to false during filtering");
        }
        ctx.record_degraded(degraded);
        ctx.record_filtered(kept.len());
        kept
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::executor::ExecutorConfig;
    use serde_json::json;

    fn cond(field: &str, operator: FilterOperator, value: Value) -> FilterCondition {
        FilterCondition::new(field, operator, value)
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_null_short_circuit() {
        assert!(!evaluate_filter(None, &cond("x", FilterOperator::Equals, json!(5))));
        assert!(!evaluate_filter(Some(&Value::Null), &cond("x", FilterOperator::NotEquals, json!(5))));
        assert!(evaluate_filter(None, &FilterCondition::is_null("x")));
        assert!(evaluate_filter(Some(&Value::Null), &FilterCondition::is_null("x")));
        assert!(!evaluate_filter(Some(&json!(0)), &FilterCondition::is_null("x")));
        assert!(evaluate_filter(Some(&json!("")), &FilterCondition::is_not_null("x")));
    }

    #[test]
    fn test_equals_case_folding() {
        let c = cond("name", FilterOperator::Equals, json!("acme"));
        assert!(evaluate_filter(Some(&json!("ACME")), &c));
        assert!(!evaluate_filter(Some(&json!("ACME")), &c.clone().case_sensitive()));
        assert!(evaluate_filter(Some(&json!(true)), &cond("b", FilterOperator::Equals, json!(true))));
        assert!(!evaluate_filter(Some(&json!("5")), &cond("n", FilterOperator::Equals, json!(5))));
    }

    #[test]
    fn test_string_operators() {
        let v = json!("Website Redesign");
        assert!(evaluate_filter(Some(&v), &cond("n", FilterOperator::Contains, json!("redesign"))));
        assert!(evaluate_filter(Some(&v), &cond("n", FilterOperator::NotContains, json!("logo"))));
        assert!(evaluate_filter(Some(&v), &cond("n", FilterOperator::StartsWith, json!("web"))));
        assert!(evaluate_filter(Some(&v), &cond("n", FilterOperator::EndsWith, json!("DESIGN"))));
        assert!(!evaluate_filter(
            Some(&v),
            &cond("n", FilterOperator::StartsWith, json!("web")).case_sensitive()
        ));
    }

    #[test]
    fn test_contains_matches_joined_array_text() {
        let tags = json!(["Urgent", "billing"]);
        assert!(evaluate_filter(Some(&tags), &cond("t", FilterOperator::Contains, json!("urgent"))));
        assert!(evaluate_filter(Some(&tags), &cond("t", FilterOperator::Contains, json!("urg"))));
        assert!(evaluate_filter(Some(&tags), &cond("t", FilterOperator::Contains, json!("t,bill"))));
        assert!(evaluate_filter(Some(&tags), &cond("t", FilterOperator::NotContains, json!("invoice"))));

        // Numbers are matched on their text
        assert!(evaluate_filter(Some(&json!(2024)), &cond("y", FilterOperator::Contains, json!(2))));
        assert!(!evaluate_filter(Some(&json!(2024)), &cond("y", FilterOperator::NotContains, json!("20"))));
    }

    #[test]
    fn test_numeric_operators_coerce() {
        assert!(evaluate_filter(Some(&json!("10")), &cond("h", FilterOperator::GreaterThan, json!(5))));
        assert!(evaluate_filter(Some(&json!(5)), &cond("h", FilterOperator::GreaterEqual, json!("5"))));
        assert!(evaluate_filter(Some(&json!(4.5)), &cond("h", FilterOperator::LessThan, json!(5))));
        assert!(!evaluate_filter(Some(&json!("abc")), &cond("h", FilterOperator::LessEqual, json!(5))));
    }

    #[test]
    fn test_between_inclusive() {
        let c = FilterCondition::between("h", json!(1), json!(10));
        assert!(evaluate_filter(Some(&json!(5)), &c));
        assert!(evaluate_filter(Some(&json!(1)), &c));
        assert!(evaluate_filter(Some(&json!(10)), &c));
        assert!(!evaluate_filter(Some(&json!(10.5)), &c));
        // Missing upper bound cannot be evaluated
        assert!(!evaluate_filter(Some(&json!(5)), &cond("h", FilterOperator::Between, json!(1))));
    }

    #[test]
    fn test_in_requires_array() {
        let c = cond("status", FilterOperator::In, json!(["active", "paused"]));
        assert!(evaluate_filter(Some(&json!("active")), &c));
        assert!(!evaluate_filter(Some(&json!("ACTIVE")), &c));
        assert!(!evaluate_filter(Some(&json!("active")), &cond("s", FilterOperator::In, json!("active"))));

        let not_in = cond("status", FilterOperator::NotIn, json!(["archived"]));
        assert!(evaluate_filter(Some(&json!("active")), &not_in));
        assert!(!evaluate_filter(Some(&json!("archived")), &not_in));
        assert!(!evaluate_filter(Some(&json!("x")), &cond("s", FilterOperator::NotIn, json!(3))));
    }

    #[test]
    fn test_regex() {
        let c = cond("email", FilterOperator::Regex, json!("^[a-z]+@example\\.com$"));
        assert!(evaluate_filter(Some(&json!("ADA@example.com")), &c));
        assert!(!evaluate_filter(Some(&json!("ADA@example.com")), &c.clone().case_sensitive()));
        // Invalid pattern degrades to false instead of failing
        assert!(!evaluate_filter(Some(&json!("a")), &cond("e", FilterOperator::Regex, json!("(unclosed"))));
    }

    #[test]
    fn test_date_range_inclusive() {
        let c = FilterCondition::date_range("date", json!("2024-01-01"), json!("2024-01-31"));
        assert!(evaluate_filter(Some(&json!("2024-01-01")), &c));
        assert!(evaluate_filter(Some(&json!("2024-01-31T00:00:00Z")), &c));
        assert!(evaluate_filter(Some(&json!("2024-01-15T09:30:00Z")), &c));
        assert!(!evaluate_filter(Some(&json!("2024-02-01")), &c));
        assert!(!evaluate_filter(Some(&json!("garbage")), &c));
    }

    #[test]
    fn test_empty_chain_keeps_everything() {
        let records = vec![record(json!({"a": 1})), record(json!({"a": 2}))];
        let config = ExecutorConfig::default();
        let mut ctx = ExecutionContext::new(&config);
        let chain = FilterChain::new(&[]);
        assert_eq!(chain.apply(records.clone(), &mut ctx), records);
    }

    #[test]
    fn test_chain_and() {
        let conditions = vec![
            cond("billable", FilterOperator::Equals, json!(true)),
            cond("hours", FilterOperator::GreaterThan, json!(4)),
        ];
        let chain = FilterChain::new(&conditions);
        assert!(chain.matches(&record(json!({"billable": true, "hours": 5}))));
        assert!(!chain.matches(&record(json!({"billable": true, "hours": 3}))));
    }

    #[test]
    fn test_chain_operator_applies_to_following_condition() {
        // The OR on the first condition joins the *second* condition in.
        let conditions = vec![
            cond("a", FilterOperator::Equals, json!(1)).then(LogicalOperator::Or),
            cond("b", FilterOperator::Equals, json!(1)),
        ];
        let chain = FilterChain::new(&conditions);
        assert!(chain.matches(&record(json!({"a": 0, "b": 1}))));
        assert!(chain.matches(&record(json!({"a": 1, "b": 0}))));
        assert!(!chain.matches(&record(json!({"a": 0, "b": 0}))));

        // An OR on the last condition has nothing to join and is ignored,
        // so the pair behaves as a plain AND.
        let conditions = vec![
            cond("a", FilterOperator::Equals, json!(1)),
            cond("b", FilterOperator::Equals, json!(1)).then(LogicalOperator::Or),
        ];
        let chain = FilterChain::new(&conditions);
        assert!(!chain.matches(&record(json!({"a": 0, "b": 1}))));
        assert!(chain.matches(&record(json!({"a": 1, "b": 1}))));
    }

    #[test]
    fn test_chain_fold_is_left_to_right() {
        // (a OR b) AND c, not a OR (b AND c)
        let conditions = vec![
            cond("a", FilterOperator::Equals, json!(1)).then(LogicalOperator::Or),
            cond("b", FilterOperator::Equals, json!(1)),
            cond("c", FilterOperator::Equals, json!(1)),
        ];
        let chain = FilterChain::new(&conditions);
        assert!(!chain.matches(&record(json!({"a": 1, "b": 0, "c": 0}))));
        assert!(chain.matches(&record(json!({"a": 1, "b": 0, "c": 1}))));
    }

    #[test]
    fn test_chain_nested_fields() {
        let conditions = vec![cond("metadata.userName", FilterOperator::Equals, json!("ada"))];
        let chain = FilterChain::new(&conditions);
        assert!(chain.matches(&record(json!({"metadata": {"userName": "Ada"}}))));
        assert!(!chain.matches(&record(json!({"metadata": {}}))));
    }

    #[test]
    fn test_chain_counts_degraded_predicates() {
        let conditions = vec![cond("h", FilterOperator::GreaterThan, json!(1))];
        let chain = FilterChain::new(&conditions);
        let records = vec![record(json!({"h": "x"})), record(json!({"h": 2}))];

        let config = ExecutorConfig::default();
        let mut ctx = ExecutionContext::new(&config);
        let kept = chain.apply(records, &mut ctx);

        assert_eq!(kept.len(), 1);
        assert_eq!(ctx.stats().predicates_degraded, 1);
        assert_eq!(ctx.stats().rows_filtered, 1);
    }
}
