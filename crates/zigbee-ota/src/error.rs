//! Error types for OTA image selection and retrieval

use thiserror::Error;
use zigbee_ota_http::HttpError;
use zigbee_ota_image::FormatError;
use zigbee_ota_validators::ValidationError;

/// Errors that can occur while loading indexes or serving images
#[derive(Error, Debug)]
pub enum OtaError {
    /// Malformed OTA image or container
    #[error("Invalid OTA image: {0}")]
    Format(#[from] FormatError),

    /// Embedded firmware is structurally corrupt
    #[error("Firmware validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Downloaded bytes do not match the declared checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    Checksum {
        /// Declared checksum
        expected: String,
        /// Checksum of the downloaded bytes
        actual: String,
    },

    /// Downloaded bytes do not match the declared size
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    Size {
        /// Declared size
        expected: u64,
        /// Size of the downloaded bytes
        actual: u64,
    },

    /// A vendor index does not match its expected shape
    #[error("Invalid {provider} index: {reason}")]
    Schema {
        /// Provider that loaded the index
        provider: String,
        /// What was wrong
        reason: String,
    },

    /// HTTP client error; network transport failures arrive here
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(String),

    /// A vendor archive could not be unpacked
    #[error("Archive error: {0}")]
    Archive(String),

    /// Block request past the end of the image
    #[error("Block offset {offset} is past the end of a {length}-byte image")]
    BlockOutOfRange {
        /// Requested offset
        offset: u32,
        /// Image length
        length: usize,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OtaError {
    /// Create a schema error for a provider's index
    pub fn schema(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Check if a later attempt could succeed without any change to the data
    pub fn is_recoverable(&self) -> bool {
        match self {
            OtaError::Io(_) => true,
            OtaError::Http(e) => e.is_recoverable(),
            OtaError::Format(_)
            | OtaError::Validation(_)
            | OtaError::Checksum { .. }
            | OtaError::Size { .. }
            | OtaError::Schema { .. }
            | OtaError::Json(_)
            | OtaError::Archive(_)
            | OtaError::BlockOutOfRange { .. }
            | OtaError::Config(_) => false,
        }
    }
}

impl From<serde_json::Error> for OtaError {
    fn from(e: serde_json::Error) -> Self {
        OtaError::Json(e.to_string())
    }
}

/// Result type for OTA operations
pub type Result<T> = std::result::Result<T, OtaError>;
