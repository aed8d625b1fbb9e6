//! Error types for store operations

use thiserror::Error;

/// Error raised by a cache store or by value (de)serialization.
///
/// The coordinator never lets these reach the caller of a domain operation;
/// they are logged and degraded to a miss.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Backend connection failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Backend operation failed
    #[error("backend error: {0}")]
    Backend(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// Timeout
    #[error("operation timed out")]
    Timeout,
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, CacheError>;
