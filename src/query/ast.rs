//! Query request model
//!
//! A [`FilterRequest`] names a data source and carries the filter chain plus
//! optional grouping, aggregation, sorting, pagination and output shape.
//! Everything deserializes from the camelCase JSON accepted by the HTTP
//! layer, and the builder methods give the same shape from Rust.
//!
//! # Example
//!
//! ```rust
//! use tally_reports::query::{AggregationFunction, AggregationSpec, FilterCondition, FilterOperator, FilterRequest};
//! use tally_reports::types::DataSource;
//! use serde_json::json;
//!
//! let request = FilterRequest::new(DataSource::TimeEntries)
//!     .filter(FilterCondition::new("billable", FilterOperator::Equals, json!(true)))
//!     .aggregate(AggregationSpec::new("hours", AggregationFunction::Sum).with_alias("totalHours"))
//!     .paginate(0, 25);
//!
//! assert!(request.validate().is_ok());
//! ```

use crate::query::error::QueryError;
use crate::types::DataSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// Filters
// ============================================================================

/// Comparison operators supported by a filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Field equals value
    Equals,
    /// Field does not equal value
    NotEquals,
    /// Field's string view contains value as a substring
    Contains,
    /// Negation of `contains`
    NotContains,
    /// Field starts with value
    StartsWith,
    /// Field ends with value
    EndsWith,
    /// Numeric `>`
    GreaterThan,
    /// Numeric `<`
    LessThan,
    /// Numeric `>=`
    GreaterEqual,
    /// Numeric `<=`
    LessEqual,
    /// Inclusive numeric range `[value, secondValue]`
    Between,
    /// Field is one of the values in the configured array
    In,
    /// Field is none of the values in the configured array
    NotIn,
    /// Field matches the configured pattern
    Regex,
    /// Field is missing or null
    IsNull,
    /// Field is present and not null
    IsNotNull,
    /// Inclusive date range `[value, secondValue]`
    DateRange,
}

impl FilterOperator {
    /// Wire name of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "not_contains",
            FilterOperator::StartsWith => "starts_with",
            FilterOperator::EndsWith => "ends_with",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::LessThan => "less_than",
            FilterOperator::GreaterEqual => "greater_equal",
            FilterOperator::LessEqual => "less_equal",
            FilterOperator::Between => "between",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::Regex => "regex",
            FilterOperator::IsNull => "is_null",
            FilterOperator::IsNotNull => "is_not_null",
            FilterOperator::DateRange => "date_range",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a condition joins the accumulated chain result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    /// Both sides must hold
    #[default]
    And,
    /// Either side may hold
    Or,
}

/// A single predicate against one record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    /// Field path, dot-separated for nested values
    pub field: String,

    /// Comparison operator
    pub operator: FilterOperator,

    /// Comparison operand
    #[serde(default)]
    pub value: Value,

    /// Upper bound for `between` and `date_range`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_value: Option<Value>,

    /// Operator used to fold the *next* condition into the chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<LogicalOperator>,

    /// Compare strings case-sensitively (default: false)
    #[serde(default)]
    pub case_sensitive: bool,
}

impl FilterCondition {
    /// Create a condition with no second operand and default chaining
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            second_value: None,
            logical_operator: None,
            case_sensitive: false,
        }
    }

    /// `is_null` condition
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, Value::Null)
    }

    /// `is_not_null` condition
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNotNull, Value::Null)
    }

    /// Inclusive numeric range condition
    pub fn between(field: impl Into<String>, low: Value, high: Value) -> Self {
        Self::new(field, FilterOperator::Between, low).with_second_value(high)
    }

    /// Inclusive date range condition
    pub fn date_range(field: impl Into<String>, start: Value, end: Value) -> Self {
        Self::new(field, FilterOperator::DateRange, start).with_second_value(end)
    }

    /// Set the second operand
    pub fn with_second_value(mut self, value: Value) -> Self {
        self.second_value = Some(value);
        self
    }

    /// Set the operator used to fold the following condition
    pub fn then(mut self, op: LogicalOperator) -> Self {
        self.logical_operator = Some(op);
        self
    }

    /// Compare strings case-sensitively
    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    /// Chaining operator with the default applied
    pub fn next_operator(&self) -> LogicalOperator {
        self.logical_operator.unwrap_or_default()
    }
}

// ============================================================================
// Grouping
// ============================================================================

/// Calendar bucket size for date grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateGrouping {
    /// `YYYY-MM-DD`
    Day,
    /// `Week of YYYY-MM-DD` (week starting Sunday)
    Week,
    /// `YYYY-MM`
    Month,
    /// `YYYY-Q<n>`
    Quarter,
    /// `YYYY`
    Year,
}

/// One labelled bucket of a custom grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRange {
    /// Group key for matching records
    pub label: String,
    /// Inclusive lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Explicit allow-list, checked before the numeric bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

impl CustomRange {
    /// Numeric range bucket
    pub fn range(label: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            label: label.into(),
            min,
            max,
            values: None,
        }
    }

    /// Allow-list bucket
    pub fn values(label: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            label: label.into(),
            min: None,
            max: None,
            values: Some(values),
        }
    }
}

/// Range- or value-based grouping of a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomGrouping {
    /// Field to bucket
    pub field: String,
    /// Buckets, first match wins
    pub ranges: Vec<CustomRange>,
}

/// Grouping specification
///
/// Accepts either a bare list of field names or an object with `fields`,
/// `dateGrouping` and `customGrouping`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "GroupByWire", rename_all = "camelCase")]
pub struct GroupBySpec {
    /// Fields whose values are joined into the group key
    #[serde(default)]
    pub fields: Vec<String>,

    /// Date bucketing for a single field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_grouping: Option<DateGrouping>,

    /// Custom range bucketing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_grouping: Option<CustomGrouping>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupByWire {
    Fields(Vec<String>),
    Field(String),
    Spec(GroupBySpecWire),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupBySpecWire {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    date_grouping: Option<DateGrouping>,
    #[serde(default)]
    custom_grouping: Option<CustomGrouping>,
}

impl From<GroupByWire> for GroupBySpec {
    fn from(wire: GroupByWire) -> Self {
        match wire {
            GroupByWire::Fields(fields) => GroupBySpec::fields(fields),
            GroupByWire::Field(field) => GroupBySpec::fields(vec![field]),
            GroupByWire::Spec(spec) => GroupBySpec {
                fields: spec.fields,
                date_grouping: spec.date_grouping,
                custom_grouping: spec.custom_grouping,
            },
        }
    }
}

/// Resolved grouping strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroupingMode<'a> {
    /// Bucket a single date field
    Date {
        /// Date field
        field: &'a str,
        /// Bucket size
        granularity: DateGrouping,
    },
    /// Bucket by custom ranges
    Custom(&'a CustomGrouping),
    /// Join field values with `|`
    Fields(&'a [String]),
}

impl GroupBySpec {
    /// Standard multi-field grouping
    pub fn fields<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            date_grouping: None,
            custom_grouping: None,
        }
    }

    /// Date-bucket grouping of one field
    pub fn by_date(field: impl Into<String>, granularity: DateGrouping) -> Self {
        Self {
            fields: vec![field.into()],
            date_grouping: Some(granularity),
            custom_grouping: None,
        }
    }

    /// Custom range grouping
    pub fn custom(field: impl Into<String>, ranges: Vec<CustomRange>) -> Self {
        Self {
            fields: Vec::new(),
            date_grouping: None,
            custom_grouping: Some(CustomGrouping {
                field: field.into(),
                ranges,
            }),
        }
    }

    /// Pick the grouping strategy
    ///
    /// Date grouping wins when set with exactly one field, then custom
    /// ranges, then plain field grouping.
    pub fn mode(&self) -> GroupingMode<'_> {
        if let (Some(granularity), [field]) = (self.date_grouping, self.fields.as_slice()) {
            return GroupingMode::Date { field, granularity };
        }
        if let Some(custom) = &self.custom_grouping {
            return GroupingMode::Custom(custom);
        }
        GroupingMode::Fields(&self.fields)
    }
}

// ============================================================================
// Aggregations
// ============================================================================

/// Aggregation functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationFunction {
    /// Sum of numeric values
    Sum,
    /// Arithmetic mean
    Avg,
    /// Count of non-null values
    Count,
    /// Count of distinct non-null values
    DistinctCount,
    /// Minimum numeric value
    Min,
    /// Maximum numeric value
    Max,
    /// Median (average of the two middle values for even counts)
    Median,
    /// Nearest-rank percentile
    Percentile,
}

impl AggregationFunction {
    /// Wire name, also used in default aliases
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationFunction::Sum => "sum",
            AggregationFunction::Avg => "avg",
            AggregationFunction::Count => "count",
            AggregationFunction::DistinctCount => "distinct_count",
            AggregationFunction::Min => "min",
            AggregationFunction::Max => "max",
            AggregationFunction::Median => "median",
            AggregationFunction::Percentile => "percentile",
        }
    }
}

/// A single aggregation over one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    /// Field path to aggregate
    pub field: String,
    /// Aggregation function
    pub function: AggregationFunction,
    /// Output name (default `<function>_<field>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Percentile rank in `0..=100` for `percentile`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
}

/// Percentile rank used when `percentile` is requested without one
pub const DEFAULT_PERCENTILE: f64 = 50.0;

impl AggregationSpec {
    /// Create an aggregation with the default alias
    pub fn new(field: impl Into<String>, function: AggregationFunction) -> Self {
        Self {
            field: field.into(),
            function,
            alias: None,
            percentile: None,
        }
    }

    /// Percentile aggregation at the given rank
    pub fn percentile(field: impl Into<String>, rank: f64) -> Self {
        Self {
            percentile: Some(rank),
            ..Self::new(field, AggregationFunction::Percentile)
        }
    }

    /// Set the output name
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name of this aggregation in the result map
    pub fn output_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.function.as_str(), self.field))
    }

    /// Percentile rank with the default applied
    pub fn percentile_rank(&self) -> f64 {
        self.percentile.unwrap_or(DEFAULT_PERCENTILE)
    }
}

// ============================================================================
// Sorting, Pagination, Output
// ============================================================================

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    /// Field path to sort by
    pub field: String,
    /// Direction
    #[serde(default)]
    pub direction: OrderDirection,
    /// Place null/missing values first (default: last)
    #[serde(default)]
    pub nulls_first: bool,
}

impl SortSpec {
    /// Ascending sort on a field
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
            nulls_first: false,
        }
    }

    /// Descending sort on a field
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            direction: OrderDirection::Desc,
            ..Self::asc(field)
        }
    }

    /// Place nulls before non-null values
    pub fn with_nulls_first(mut self) -> Self {
        self.nulls_first = true;
        self
    }
}

/// Offset/limit pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaginationSpec {
    /// Rows to skip
    #[serde(default)]
    pub offset: usize,
    /// Page size; the engine default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Result shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Full records
    #[default]
    Detailed,
    /// Records projected to a fixed set of keys
    Summary,
    /// Group buckets when grouping is requested
    Grouped,
}

// ============================================================================
// Filter Request
// ============================================================================

/// Top-level query request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    /// Data source name (`time-entries`, `projects`, `clients`, `users`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,

    /// Filter chain, evaluated left to right
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterCondition>>,

    /// Optional grouping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBySpec>,

    /// Optional aggregations over the filtered set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Vec<AggregationSpec>>,

    /// Optional sort keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorting: Option<Vec<SortSpec>>,

    /// Optional pagination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationSpec>,

    /// Result shape (default: detailed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
}

impl FilterRequest {
    /// Start a request against a data source with an empty filter chain
    pub fn new(source: DataSource) -> Self {
        Self {
            data_source: Some(source.as_str().to_string()),
            filters: Some(Vec::new()),
            ..Default::default()
        }
    }

    /// Parse a request from JSON
    ///
    /// Malformed JSON, unknown operators and unknown functions are all
    /// reported as validation errors.
    pub fn from_json(json: &str) -> Result<Self, QueryError> {
        serde_json::from_str(json)
            .map_err(|e| QueryError::validation(format!("invalid filter request: {}", e)))
    }

    /// Parse a request from an already-decoded JSON value
    pub fn from_value(value: Value) -> Result<Self, QueryError> {
        serde_json::from_value(value)
            .map_err(|e| QueryError::validation(format!("invalid filter request: {}", e)))
    }

    /// Append a filter condition
    pub fn filter(mut self, condition: FilterCondition) -> Self {
        self.filters.get_or_insert_with(Vec::new).push(condition);
        self
    }

    /// Set grouping
    pub fn group_by(mut self, spec: GroupBySpec) -> Self {
        self.group_by = Some(spec);
        self
    }

    /// Append an aggregation
    pub fn aggregate(mut self, spec: AggregationSpec) -> Self {
        self.aggregations.get_or_insert_with(Vec::new).push(spec);
        self
    }

    /// Append a sort key
    pub fn sort(mut self, spec: SortSpec) -> Self {
        self.sorting.get_or_insert_with(Vec::new).push(spec);
        self
    }

    /// Set pagination
    pub fn paginate(mut self, offset: usize, limit: usize) -> Self {
        self.pagination = Some(PaginationSpec {
            offset,
            limit: Some(limit),
        });
        self
    }

    /// Set output format
    pub fn output(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Filter chain (empty when absent)
    pub fn conditions(&self) -> &[FilterCondition] {
        self.filters.as_deref().unwrap_or_default()
    }

    /// Validate the request before any rows are fetched
    ///
    /// Returns the resolved data source.
    pub fn validate(&self) -> Result<DataSource, QueryError> {
        let name = self
            .data_source
            .as_deref()
            .ok_or_else(|| QueryError::validation("dataSource is required"))?;
        let source = name.parse::<DataSource>().map_err(QueryError::validation)?;

        if self.filters.is_none() {
            return Err(QueryError::validation("filters are required"));
        }

        for condition in self.conditions() {
            if condition.field.is_empty() {
                return Err(QueryError::validation("filter field cannot be empty"));
            }
        }

        if let Some(group_by) = &self.group_by {
            if group_by.fields.is_empty() && group_by.custom_grouping.is_none() {
                return Err(QueryError::validation(
                    "groupBy requires at least one field or a customGrouping",
                ));
            }
        }

        for agg in self.aggregations.as_deref().unwrap_or_default() {
            if agg.field.is_empty() {
                return Err(QueryError::validation("aggregation field cannot be empty"));
            }
            if let Some(rank) = agg.percentile {
                if !(0.0..=100.0).contains(&rank) {
                    return Err(QueryError::validation(format!(
                        "percentile must be within 0..=100, got {}",
                        rank
                    )));
                }
            }
        }

        Ok(source)
    }
}
