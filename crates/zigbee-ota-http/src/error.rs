//! Error types for the caching HTTP client

use thiserror::Error;

/// HTTP client errors
///
/// Errors are cloneable so that one failed request can be reported to every
/// caller that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The HTTP client could not be built
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    /// The URL could not be parsed
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl {
        /// URL as given
        url: String,
        /// Parser message
        reason: String,
    },

    /// A header name or value was rejected
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The request could not be sent or the body could not be read
    #[error("Request to {url} failed: {reason}")]
    Transport {
        /// Request URL
        url: String,
        /// Transport error message
        reason: String,
    },

    /// The server answered with a non-success status
    #[error("{url} returned error status: {status}")]
    Status {
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The body is not the expected JSON document
    #[error("Failed to decode response from {url}: {reason}")]
    Decode {
        /// Request URL
        url: String,
        /// Decoder message
        reason: String,
    },

    /// The background request task did not complete
    #[error("Request task failed: {0}")]
    Task(String),
}

impl HttpError {
    /// Check if retrying the same request later could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            HttpError::Transport { .. } | HttpError::Task(_) => true,
            HttpError::Status { status, .. } => *status >= 500 || *status == 429,
            HttpError::Client(_)
            | HttpError::InvalidUrl { .. }
            | HttpError::InvalidHeader(_)
            | HttpError::Decode { .. } => false,
        }
    }
}

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_recoverable() {
        let err = HttpError::Status {
            url: "http://x".to_string(),
            status: 503,
        };
        assert!(err.is_recoverable());

        let err = HttpError::Status {
            url: "http://x".to_string(),
            status: 404,
        };
        assert!(!err.is_recoverable());
    }
}
