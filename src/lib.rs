//! Tally Reports - ad-hoc filtering, grouping and aggregation for time-tracking data
//!
//! This library provides the reporting core of a time-tracking service:
//! - Filter chains with 17 operators and left-to-right AND/OR folding
//! - Field, calendar-bucket and custom-range grouping
//! - Global aggregations (sum, avg, min, max, count, distinct, median, percentile)
//! - Multi-key stable sorting and offset/limit pagination
//! - Time and project reports behind a TTL report cache
//!
//! Records are schemaless JSON objects supplied by a pluggable row source.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Filter request model, pipeline operators and the query engine
pub mod query;

/// Row sources and table store backends
pub mod source;

/// Report cache with pluggable stores
pub mod cache;

/// Cached time and project reports
pub mod report;

// Re-export main types
pub use config::Config;
pub use error::{Error, Result};
pub use query::{FilterRequest, FilterResult, QueryEngine, QueryError};
pub use report::{ProjectReportRequest, ReportEnvelope, ReportService, TimeReportRequest};
pub use types::{DataSource, Record};
