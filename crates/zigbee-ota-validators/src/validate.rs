//! Format dispatch for embedded firmware and OTA images

use tracing::{debug, warn};
use zigbee_ota_image::{ElementTag, FirmwareImage};

use crate::ebl::{EBL_MAGIC, parse_silabs_ebl};
use crate::error::Result;
use crate::gbl::{GBL_MAGIC, parse_silabs_gbl};
use crate::FirmwareFormat;

/// Outcome of a successful validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationResult {
    /// Firmware was recognized and is structurally sound
    Valid,
    /// Firmware format is not one this crate understands
    Unknown,
}

/// Identify an embedded firmware format by its leading bytes
pub fn detect_firmware_format(data: &[u8]) -> Option<FirmwareFormat> {
    if data.starts_with(&EBL_MAGIC) {
        Some(FirmwareFormat::Ebl)
    } else if data.starts_with(&GBL_MAGIC) {
        Some(FirmwareFormat::Gbl)
    } else {
        None
    }
}

/// Validate a raw firmware blob
///
/// Unrecognized formats are [`ValidationResult::Unknown`], not errors.
/// Recognized formats are walked record by record and any structural
/// problem is returned as an error.
pub fn validate_firmware(data: &[u8]) -> Result<ValidationResult> {
    let Some(format) = detect_firmware_format(data) else {
        return Ok(ValidationResult::Unknown);
    };

    let records = match format {
        FirmwareFormat::Ebl => parse_silabs_ebl(data).try_fold(0usize, |n, r| r.map(|_| n + 1)),
        FirmwareFormat::Gbl => parse_silabs_gbl(data).try_fold(0usize, |n, r| r.map(|_| n + 1)),
    }?;

    debug!("Validated {} firmware: {} records, {} bytes", format, records, data.len());
    Ok(ValidationResult::Valid)
}

/// Validate every upgrade image carried by an OTA image
///
/// Returns [`ValidationResult::Valid`] if at least one upgrade image was
/// recognized and none was corrupt, [`ValidationResult::Unknown`] if there
/// are no upgrade images or none was recognized, and the first error if any
/// recognized upgrade image is corrupt.
pub fn validate_ota_image(image: &FirmwareImage) -> Result<ValidationResult> {
    let mut result = ValidationResult::Unknown;

    for element in image
        .sub_elements()
        .iter()
        .filter(|e| e.tag == ElementTag::UpgradeImage)
    {
        match validate_firmware(&element.data) {
            Ok(ValidationResult::Valid) => result = ValidationResult::Valid,
            Ok(ValidationResult::Unknown) => {}
            Err(e) => {
                warn!(
                    "Upgrade image of 0x{:04X}:0x{:04X} v0x{:08X} failed validation: {}",
                    image.header().manufacturer_id,
                    image.header().image_type,
                    image.header().file_version,
                    e
                );
                return Err(e);
            }
        }
    }

    Ok(result)
}
