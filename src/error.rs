//! Error types for the report engine

use crate::query::QueryError;
use thiserror::Error;

/// Main error type for the report engine
#[derive(Error, Debug)]
pub enum Error {
    /// Query validation, fetch or execution error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Table backend error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Cache store error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Table backend errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Table does not exist in the backend
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Table contents are not a list of JSON objects
    #[error("Invalid data in table {table}: {message}")]
    InvalidData {
        /// Table identifier
        table: String,
        /// Description of the problem
        message: String,
    },

    /// Table identifier cannot be used by the backend
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),
}

/// Validation errors
///
/// Raised while checking configuration values.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Value is out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Field name being validated
        field: String,
        /// The invalid value
        value: String,
        /// Minimum allowed value
        min: String,
        /// Maximum allowed value
        max: String,
    },

    /// Required field is missing
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid format
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat {
        /// Field name being validated
        field: String,
        /// Description of the format error
        message: String,
    },
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Configuration(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_converts() {
        let err: Error = QueryError::validation("filters are required").into();
        assert!(matches!(err, Error::Query(_)));
        assert!(err.to_string().contains("filters are required"));
    }

    #[test]
    fn test_validation_error_is_configuration() {
        let err: Error = ValidationError::MissingField("sources.data_dir".into()).into();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("data_dir")));
    }

    #[test]
    fn test_serde_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
