//! Query error types
//!
//! Provides structured error handling for request validation, row fetching
//! and per-predicate evaluation.

use std::fmt;

/// Query error with context
#[derive(Debug)]
pub struct QueryError {
    /// Error kind for programmatic handling
    pub kind: QueryErrorKind,
    /// Human-readable message
    pub message: String,
    /// Optional source error
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl QueryError {
    /// Create a new query error
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add source error for error chaining
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ValidationError, message)
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ConfigurationError, message)
    }

    /// Create a fetch error
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::FetchError, message)
    }

    /// Create a partial evaluation error
    pub fn partial(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::PartialEvaluation, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Internal, message)
    }

    /// Whether the caller should reject the request rather than retry it
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind, QueryErrorKind::ValidationError)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Categories of query errors for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Request is malformed (unknown data source, missing filters, bad spec)
    ValidationError,
    /// A backing table identifier is not configured
    ConfigurationError,
    /// The row source failed to return records
    FetchError,
    /// A single predicate could not be evaluated (bad regex, failed cast)
    ///
    /// Never aborts a query; the predicate is treated as `false`.
    PartialEvaluation,
    /// Internal error (bug, unexpected state)
    Internal,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorKind::ValidationError => write!(f, "ValidationError"),
            QueryErrorKind::ConfigurationError => write!(f, "ConfigurationError"),
            QueryErrorKind::FetchError => write!(f, "FetchError"),
            QueryErrorKind::PartialEvaluation => write!(f, "PartialEvaluationError"),
            QueryErrorKind::Internal => write!(f, "Internal"),
        }
    }
}
