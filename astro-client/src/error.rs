//! Client error types

use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Missing or rejected API token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Control plane refused the request (4xx other than the above)
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Control plane failed while handling the request (5xx)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Transport or protocol failure, as opposed to a refused operation
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::InvalidResponse(_) | Self::Internal(_) | Self::Serialization(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
