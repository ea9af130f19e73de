//! Error types for OTA image parsing and serialization

use thiserror::Error;

use crate::container::ContainerFormat;

/// Errors raised while decoding or encoding an OTA upgrade file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The upgrade file identifier does not match the OTA magic
    #[error("Invalid OTA magic: expected 0x{expected:08X}, got 0x{actual:08X}")]
    InvalidMagic {
        /// Expected magic value
        expected: u32,
        /// Value found in the data
        actual: u32,
    },

    /// Not enough bytes to decode the requested structure
    #[error("Data is too short for {what}: need {needed} bytes, have {available}")]
    Truncated {
        /// Structure being decoded
        what: &'static str,
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// The header length field disagrees with the fields actually present
    #[error("Header length mismatch: declared {declared}, computed {computed}")]
    HeaderLengthMismatch {
        /// Value of the header length field
        declared: u16,
        /// Length implied by the field control bits
        computed: u16,
    },

    /// The image size field disagrees with the serialized contents
    #[error("Image size mismatch: declared {declared}, computed {computed}")]
    ImageSizeMismatch {
        /// Value of the image size field
        declared: u32,
        /// Header length plus serialized sub-element sizes
        computed: u64,
    },

    /// A length does not fit the integer width of its wire field
    #[error("Length {length} of {what} does not fit its wire field")]
    LengthOverflow {
        /// Field being encoded
        what: &'static str,
        /// Offending length
        length: usize,
    },

    /// A vendor container could not be unwrapped
    #[error("Malformed {format} container: {reason}")]
    Container {
        /// Container format being unwrapped
        format: ContainerFormat,
        /// Why unwrapping failed
        reason: String,
    },

    /// A vendor-specific image carried the wrong manufacturer id
    #[error("Unexpected manufacturer id 0x{actual:04X} for {format}, expected 0x{expected:04X}")]
    UnexpectedManufacturer {
        /// Container format being parsed
        format: ContainerFormat,
        /// Manufacturer id the format requires
        expected: u16,
        /// Manufacturer id found in the header
        actual: u16,
    },

    /// Trailing bytes were found where none are allowed
    #[error("Unexpected {0} trailing bytes after image")]
    TrailingData(usize),

    /// An image with no sub-elements cannot absorb trailing bytes
    #[error("Image has no sub-elements to extend")]
    NoSubElements,

    /// No known canonical or container layout matched
    #[error("Unrecognized OTA image format")]
    UnrecognizedFormat,
}

impl FormatError {
    /// Create a truncation error
    pub fn truncated(what: &'static str, needed: usize, available: usize) -> Self {
        Self::Truncated {
            what,
            needed,
            available,
        }
    }

    /// Create a container error
    pub fn container(format: ContainerFormat, reason: impl Into<String>) -> Self {
        Self::Container {
            format,
            reason: reason.into(),
        }
    }
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, FormatError>;
