//! Error types for client operations

use thiserror::Error;

/// Error returned by every [`EyeClient`](crate::EyeClient) operation.
///
/// Cache failures never show up here: the coordinator logs them and falls
/// back to the remote service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EyeError {
    /// The service answered 403 with an error message
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The service answered with an error message
    #[error("api error: {0}")]
    Api(String),

    /// The service failed without an error message
    #[error("{operation} failed. Response: {body}")]
    Unknown { operation: String, body: String },

    /// The request could not be delivered or the response not read
    #[error("transport error: {0}")]
    Transport(String),

    /// No response within the configured request timeout
    #[error("request timed out")]
    Timeout,

    /// Success status, but the body does not fit the response schema
    #[error("{operation}: malformed response: {reason}")]
    Decode { operation: String, reason: String },

    /// The request was rejected before being sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Client configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl EyeError {
    /// `true` for failures reported by the service itself
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            EyeError::Unauthorized(_) | EyeError::Api(_) | EyeError::Unknown { .. }
        )
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, EyeError>;
