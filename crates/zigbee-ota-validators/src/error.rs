//! Error types for firmware structure validation

use thiserror::Error;

use crate::FirmwareFormat;

/// Structural corruption found in an embedded firmware image
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Image length is not a multiple of the required block size
    #[error("{format} image size {length} is not a multiple of {block}")]
    Misaligned {
        /// Firmware format
        format: FirmwareFormat,
        /// Image length in bytes
        length: usize,
        /// Required alignment
        block: usize,
    },

    /// The first record is not the expected header
    #[error("{format} image does not start with a valid header record")]
    InvalidHeader {
        /// Firmware format
        format: FirmwareFormat,
    },

    /// A record's tag, length or value runs past the end of the image
    #[error("{format} image is truncated: {what}")]
    Truncated {
        /// Firmware format
        format: FirmwareFormat,
        /// What was cut off
        what: &'static str,
    },

    /// The record stream ended without an end tag
    #[error("{format} image is truncated: no end tag found")]
    MissingEndTag {
        /// Firmware format
        format: FirmwareFormat,
    },

    /// Padding after the end tag contains bytes other than 0xFF
    #[error("{format} image padding contains invalid bytes")]
    InvalidPadding {
        /// Firmware format
        format: FirmwareFormat,
    },

    /// CRC-32 over the image does not leave the expected residue
    #[error("{format} image CRC is invalid: residue 0x{residue:08X}")]
    CrcMismatch {
        /// Firmware format
        format: FirmwareFormat,
        /// CRC-32 computed over the image and its stored checksum
        residue: u32,
    },
}

impl ValidationError {
    /// Format the error was found in
    pub fn format(&self) -> FirmwareFormat {
        match self {
            ValidationError::Misaligned { format, .. }
            | ValidationError::InvalidHeader { format }
            | ValidationError::Truncated { format, .. }
            | ValidationError::MissingEndTag { format }
            | ValidationError::InvalidPadding { format }
            | ValidationError::CrcMismatch { format, .. } => *format,
        }
    }
}

/// Result type for validation operations
pub type Result<T> = std::result::Result<T, ValidationError>;
