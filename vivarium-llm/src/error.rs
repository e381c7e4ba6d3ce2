//! Oracle error types.

use thiserror::Error;

/// Errors that can occur during oracle operations.
#[derive(Debug, Error)]
pub enum OracleError {
    /// HTTP request failed.
    #[error("oracle request failed: {0}")]
    RequestFailed(String),

    /// Response body was not in the expected shape.
    #[error("failed to parse oracle response: {0}")]
    ParseError(String),

    /// Request timed out.
    #[error("oracle request timed out after {0}ms")]
    Timeout(u64),

    /// No backend is configured or reachable.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// All retry attempts exhausted.
    #[error("all oracle retries exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The final failure.
        last_error: String,
    },

    /// The request waited in the queue past its deadline.
    #[error("oracle request expired in queue")]
    Expired,
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout(0)
        } else if err.is_connect() {
            OracleError::Unavailable(err.to_string())
        } else {
            OracleError::RequestFailed(err.to_string())
        }
    }
}
