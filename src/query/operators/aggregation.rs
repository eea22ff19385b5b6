//! Aggregation Operator - summary statistics over filtered records
//!
//! Each [`AggregationSpec`] projects one field across the record set, drops
//! null and missing values, and reduces what remains. Numeric functions
//! skip values without a numeric view rather than failing the query.
//!
//! Sums use Kahan summation so long columns of fractional hours do not
//! drift.

use crate::query::ast::{AggregationFunction, AggregationSpec};
use crate::query::operators::numeric::KahanSum;
use crate::types::{get_present_value, number_value, to_number, Record};
use serde_json::{Map, Value};
use std::collections::HashSet;

// ============================================================================
// Aggregation State
// ============================================================================

/// Incremental state for one aggregation
#[derive(Debug, Clone)]
pub enum AggregationState {
    /// Count of non-null values
    Count(u64),

    /// Sum using Kahan summation
    Sum(KahanSum),

    /// Running sum and count of numeric values
    Avg {
        /// Sum of numeric values
        sum: KahanSum,
        /// Number of numeric values
        count: u64,
    },

    /// Minimum numeric value seen
    Min(Option<f64>),

    /// Maximum numeric value seen
    Max(Option<f64>),

    /// Canonical JSON of each distinct value
    Distinct(HashSet<String>),

    /// Collected numeric values for median and percentile
    Exact(Vec<f64>),
}

impl AggregationState {
    /// Create initial state for an aggregation function
    pub fn new(function: AggregationFunction) -> Self {
        match function {
            AggregationFunction::Count => AggregationState::Count(0),
            AggregationFunction::Sum => AggregationState::Sum(KahanSum::new()),
            AggregationFunction::Avg => AggregationState::Avg {
                sum: KahanSum::new(),
                count: 0,
            },
            AggregationFunction::Min => AggregationState::Min(None),
            AggregationFunction::Max => AggregationState::Max(None),
            AggregationFunction::DistinctCount => AggregationState::Distinct(HashSet::new()),
            AggregationFunction::Median | AggregationFunction::Percentile => {
                AggregationState::Exact(Vec::new())
            },
        }
    }

    /// Fold one non-null value into the state
    pub fn update(&mut self, value: &Value) {
        match self {
            AggregationState::Count(count) => *count += 1,
            AggregationState::Distinct(set) => {
                set.insert(value.to_string());
            },
            AggregationState::Sum(sum) => {
                if let Some(n) = to_number(value) {
                    sum.add(n);
                }
            },
            AggregationState::Avg { sum, count } => {
                if let Some(n) = to_number(value) {
                    sum.add(n);
                    *count += 1;
                }
            },
            AggregationState::Min(min) => {
                if let Some(n) = to_number(value) {
                    *min = Some(min.map_or(n, |m| m.min(n)));
                }
            },
            AggregationState::Max(max) => {
                if let Some(n) = to_number(value) {
                    *max = Some(max.map_or(n, |m| m.max(n)));
                }
            },
            AggregationState::Exact(values) => {
                if let Some(n) = to_number(value) {
                    values.push(n);
                }
            },
        }
    }

    /// Produce the final value
    ///
    /// `rank` is only consulted for percentiles. Empty input yields `0` for
    /// count, sum and avg, and `null` for min, max, median and percentile.
    pub fn finalize(self, function: AggregationFunction, rank: f64) -> Value {
        match self {
            AggregationState::Count(count) => Value::from(count),
            AggregationState::Distinct(set) => Value::from(set.len() as u64),
            AggregationState::Sum(sum) => number_value(sum.sum()),
            AggregationState::Avg { sum, count } => {
                if count == 0 {
                    Value::from(0)
                } else {
                    number_value(sum.sum() / count as f64)
                }
            },
            AggregationState::Min(min) => min.map_or(Value::Null, number_value),
            AggregationState::Max(max) => max.map_or(Value::Null, number_value),
            AggregationState::Exact(mut values) => {
                values.sort_by(|a, b| a.total_cmp(b));
                let result = match function {
                    AggregationFunction::Percentile => percentile(&values, rank),
                    _ => median(&values),
                };
                result.map_or(Value::Null, number_value)
            },
        }
    }
}

/// Median of sorted values, averaging the two middle values for even counts
pub fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    if n % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Nearest-rank percentile of sorted values
///
/// Index is `ceil(rank / 100 * n) - 1`, clamped to the slice.
pub fn percentile(sorted: &[f64], rank: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let index = ((rank / 100.0) * sorted.len() as f64).ceil() as i64 - 1;
    let index = index.clamp(0, sorted.len() as i64 - 1) as usize;
    Some(sorted[index])
}

// ============================================================================
// Aggregation Operator
// ============================================================================

/// Computes every requested aggregation over one record set
pub struct AggregationOperator<'a> {
    specs: &'a [AggregationSpec],
}

impl<'a> AggregationOperator<'a> {
    /// Create an aggregation operator
    pub fn new(specs: &'a [AggregationSpec]) -> Self {
        Self { specs }
    }

    /// Compute a single aggregation
    pub fn aggregate_one(spec: &AggregationSpec, records: &[Record]) -> Value {
        let mut state = AggregationState::new(spec.function);
        for value in records.iter().filter_map(|r| get_present_value(r, &spec.field)) {
            state.update(value);
        }
        state.finalize(spec.function, spec.percentile_rank())
    }

    /// Compute all aggregations, keyed by output name
    ///
    /// Later specs with the same output name overwrite earlier ones.
    pub fn apply(&self, records: &[Record]) -> Map<String, Value> {
        self.specs
            .iter()
            .map(|spec| (spec.output_name(), Self::aggregate_one(spec, records)))
            .collect()
    }
}
