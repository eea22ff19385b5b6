//! Query engine for ad-hoc report filtering
//!
//! This module runs a [`FilterRequest`] against one data source:
//! - Left-fold filter chain with 17 comparison operators
//! - Field, calendar and custom-range grouping
//! - Summary aggregations including median and nearest-rank percentile
//! - Stable multi-key sorting with null placement
//! - Offset/limit pagination with a continuation cursor
//!
//! # Architecture
//!
//! ```text
//! FilterRequest (JSON)
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Validate   │  data source, filters, specs
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Fetch     │  RowSource (async)
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Execute    │  filter → group/aggregate → sort → paginate
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Format     │  detailed / summary / grouped
//! └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_reports::query::{FilterRequest, QueryEngine};
//!
//! let request = FilterRequest::from_json(body)?;
//! let engine = QueryEngine::new(source);
//! let result = engine.execute_query(&request).await?;
//! ```

pub mod ast;
pub mod error;
pub mod executor;
pub mod operators;
pub mod result;

// Re-export main types
pub use ast::{
    AggregationFunction, AggregationSpec, CustomGrouping, CustomRange, DateGrouping,
    FilterCondition, FilterOperator, FilterRequest, GroupBySpec, GroupingMode, LogicalOperator,
    OrderDirection, OutputFormat, PaginationSpec, SortSpec,
};
pub use error::{QueryError, QueryErrorKind};
pub use executor::{ExecutionContext, ExecutionStats, ExecutorConfig, QueryEngine};
pub use operators::Group;
pub use result::{FilterResult, OutputFormatter, PaginationInfo, ResultData};
