//! REST client error types.

use thiserror::Error;

/// Result type for REST operations.
pub type RequestResult<T> = Result<T, RequestError>;

/// Errors that can occur during a REST call.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// The backend answered with a non-2xx status.
    #[error("HTTP error {status} from {url}")]
    Status { status: u16, url: String },

    /// The request never produced a response (refused, reset, timed out).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The response body was not the expected JSON.
    #[error("failed to parse response: {0}")]
    Decode(String),
}

impl RequestError {
    /// HTTP status, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a 404 answer.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
