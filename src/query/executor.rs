//! Query Executor - filter request pipeline
//!
//! Runs a [`FilterRequest`] against one data source. Each stage is a pure
//! function over the output of the previous one:
//!
//! ```text
//! ┌─────────────────┐
//! │ Output Formatter│  ← detailed / summary / grouped
//! └────────┬────────┘
//! ┌────────▼────────┐
//! │    Paginator    │  ← offset/limit slice + cursor
//! └────────┬────────┘
//! ┌────────▼────────┐
//! │      Sort       │  ← stable multi-key
//! └────────┬────────┘
//! ┌────────▼────────┐
//! │ Group/Aggregate │  ← both over the full filtered set
//! └────────┬────────┘
//! ┌────────▼────────┐
//! │  Filter Chain   │  ← left fold of predicates
//! └────────┬────────┘
//! ┌────────▼────────┐
//! │   Row Source    │  ← async fetch
//! └─────────────────┘
//! ```
//!
//! Nothing is shared between invocations, so concurrent queries never
//! interfere with each other.

use crate::query::ast::FilterRequest;
use crate::query::error::QueryError;
use crate::query::operators::{paginate, AggregationOperator, FilterChain, GroupOperator, SortOperator};
use crate::query::result::{FilterResult, OutputFormatter, PaginationInfo};
use crate::source::RowSource;
use crate::types::{DataSource, Record};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

// ============================================================================
// Executor Configuration
// ============================================================================

/// Configuration for query execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Page size used when a request paginates without a limit (default: 50)
    pub default_page_limit: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_page_limit: 50,
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default page size
    pub fn with_default_page_limit(mut self, limit: usize) -> Self {
        self.default_page_limit = limit.max(1);
        self
    }
}

// ============================================================================
// Execution Statistics
// ============================================================================

/// Row counts collected while running one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Rows returned by the row source
    pub rows_fetched: usize,

    /// Rows that passed the filter chain
    pub rows_filtered: usize,

    /// Predicates that failed to evaluate and were folded as `false`
    pub predicates_degraded: usize,

    /// Groups produced (0 when not grouping)
    pub groups: usize,

    /// Rows in the returned page
    pub rows_returned: usize,
}

impl ExecutionStats {
    /// Fraction of fetched rows that passed the filters
    pub fn selectivity(&self) -> f64 {
        if self.rows_fetched == 0 {
            1.0
        } else {
            self.rows_filtered as f64 / self.rows_fetched as f64
        }
    }
}

// ============================================================================
// Execution Context
// ============================================================================

/// Per-request state threaded through the operators
#[derive(Debug)]
pub struct ExecutionContext {
    /// Request start time
    pub start_time: Instant,

    /// Page size when the request omits one
    pub default_page_limit: usize,

    stats: ExecutionStats,
}

impl ExecutionContext {
    /// Create a new execution context from config
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            start_time: Instant::now(),
            default_page_limit: config.default_page_limit,
            stats: ExecutionStats::default(),
        }
    }

    /// Record rows received from the row source
    pub fn record_fetched(&mut self, count: usize) {
        self.stats.rows_fetched += count;
    }

    /// Record rows that passed the filter chain
    pub fn record_filtered(&mut self, count: usize) {
        self.stats.rows_filtered += count;
    }

    /// Record predicates degraded to `false`
    pub fn record_degraded(&mut self, count: usize) {
        self.stats.predicates_degraded += count;
    }

    /// Record the number of groups produced
    pub fn record_groups(&mut self, count: usize) {
        self.stats.groups += count;
    }

    /// Record rows placed in the returned page
    pub fn record_returned(&mut self, count: usize) {
        self.stats.rows_returned += count;
    }

    /// Statistics collected so far
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Time since the request started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

// ============================================================================
// Query Engine
// ============================================================================

/// Entry point for running filter requests
///
/// Owns a [`RowSource`] and applies the filter, group, aggregate, sort,
/// paginate and format stages to whatever it returns.
#[derive(Clone)]
pub struct QueryEngine {
    source: Arc<dyn RowSource>,
    config: ExecutorConfig,
}

impl QueryEngine {
    /// Create an engine with default configuration
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self::with_config(source, ExecutorConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(source: Arc<dyn RowSource>, config: ExecutorConfig) -> Self {
        Self { source, config }
    }

    /// Executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Row source backing this engine
    pub fn source(&self) -> &Arc<dyn RowSource> {
        &self.source
    }

    /// Validate, fetch and run a request
    ///
    /// Validation happens before any fetch. Fetch errors abort the request;
    /// per-row evaluation errors never do.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use serde_json::json;
    /// use tally_reports::query::{FilterCondition, FilterOperator, FilterRequest, QueryEngine};
    /// use tally_reports::source::{InMemoryTableStore, SourcePolicy, TableConfig, TableRowSource};
    /// use tally_reports::types::DataSource;
    ///
    /// # tokio_test_block(async {
    /// let store = InMemoryTableStore::new();
    /// store.insert_json("users", json!([{"id": "u1", "name": "Ada"}])).await.unwrap();
    /// let source = TableRowSource::new(Arc::new(store), TableConfig::by_source_name(), SourcePolicy::Strict);
    /// let engine = QueryEngine::new(Arc::new(source));
    ///
    /// let request = FilterRequest::new(DataSource::Users)
    ///     .filter(FilterCondition::new("name", FilterOperator::StartsWith, json!("a")));
    /// let result = engine.execute_query(&request).await.unwrap();
    /// assert_eq!(result.result_count, 1);
    /// # });
    /// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
    /// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
    /// # }
    /// ```
    pub async fn execute_query(&self, request: &FilterRequest) -> Result<FilterResult, QueryError> {
        let data_source = request.validate()?;
        debug!(source = %data_source, filters = request.conditions().len(), "Executing filter request");

        let records = self.source.fetch(data_source).await?;
        Ok(self.run_pipeline(request, data_source, records))
    }

    /// Run the in-memory stages over already fetched records
    ///
    /// The request is assumed to be validated.
    pub fn run_pipeline(
        &self,
        request: &FilterRequest,
        data_source: DataSource,
        records: Vec<Record>,
    ) -> FilterResult {
        let mut ctx = ExecutionContext::new(&self.config);
        ctx.record_fetched(records.len());

        let filtered = FilterChain::new(request.conditions()).apply(records, &mut ctx);

        let groups = request.group_by.as_ref().map(|spec| {
            let groups = GroupOperator::new(spec).apply(&filtered);
            ctx.record_groups(groups.len());
            groups
        });

        // Aggregates cover every filtered row, independent of grouping and paging
        let aggregations = request
            .aggregations
            .as_deref()
            .filter(|specs| !specs.is_empty())
            .map(|specs| AggregationOperator::new(specs).apply(&filtered));

        let sorted = match request.sorting.as_deref() {
            Some(keys) if !keys.is_empty() => SortOperator::new(keys).apply(filtered),
            _ => filtered,
        };
        let result_count = sorted.len();

        let (rows, pagination) = match request.pagination {
            Some(spec) => {
                let limit = spec.limit.unwrap_or(ctx.default_page_limit);
                let page = paginate(sorted, spec.offset, limit);
                let info = PaginationInfo {
                    offset: spec.offset,
                    limit,
                    total_count: result_count,
                    has_more: page.has_more,
                    next_cursor: page.next_cursor,
                };
                (page.data, Some(info))
            },
            None => (sorted, None),
        };
        ctx.record_returned(rows.len());

        let format = request.output_format.unwrap_or_default();
        let data = OutputFormatter::new(format).format(rows, groups.as_deref());

        let stats = *ctx.stats();
        info!(
            source = %data_source,
            fetched = stats.rows_fetched,
            matched = stats.rows_filtered,
            returned = stats.rows_returned,
            degraded = stats.predicates_degraded,
            selectivity = stats.selectivity(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "Filter request complete"
        );

        FilterResult::new(data_source, request.conditions().to_vec(), result_count, data)
            .with_groups(groups)
            .with_aggregations(aggregations)
            .with_pagination(pagination)
            .with_execution_time(ctx.elapsed())
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
