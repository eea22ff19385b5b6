//! Query Operators - pipeline stages over record sets
//!
//! This module provides the building blocks for query execution:
//! - Filter chain for predicate evaluation
//! - Group operator for bucketing records
//! - Aggregation operator for summary statistics
//! - Sort operator for stable multi-key ordering
//! - Pagination for offset/limit slicing
//!
//! Every operator is a pure function over owned or borrowed records.

pub mod aggregation;
pub mod filter;
pub mod group;
pub mod limit;
pub mod sort;

// Re-export commonly used types
pub use aggregation::{AggregationOperator, AggregationState};
pub use filter::{evaluate_filter, FilterChain};
pub use group::{Group, GroupOperator};
pub use limit::{paginate, Page};
pub use sort::SortOperator;

// ============================================================================
// Numeric Helpers
// ============================================================================

/// Numerically careful accumulators
pub mod numeric {
    /// Kahan summation for accurate floating-point sums
    #[derive(Debug, Clone, Default)]
    pub struct KahanSum {
        sum: f64,
        compensation: f64,
    }

    impl KahanSum {
        /// Create a new sum accumulator
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a value to the sum
        #[inline]
        pub fn add(&mut self, value: f64) {
            let y = value - self.compensation;
            let t = self.sum + y;
            self.compensation = (t - self.sum) - y;
            self.sum = t;
        }

        /// Get the current sum
        #[inline]
        pub fn sum(&self) -> f64 {
            self.sum
        }
    }
}
