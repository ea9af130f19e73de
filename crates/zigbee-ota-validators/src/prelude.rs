//! Convenience re-exports for common validator types

pub use crate::FirmwareFormat;
pub use crate::ebl::{EblTag, parse_silabs_ebl};
pub use crate::error::ValidationError;
pub use crate::gbl::{GblTag, parse_silabs_gbl};
pub use crate::validate::{
    ValidationResult, detect_firmware_format, validate_firmware, validate_ota_image,
};
