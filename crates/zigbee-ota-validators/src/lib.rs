//! Structural validation of firmware embedded in Zigbee OTA images
//!
//! Silicon Labs devices ship their firmware as EBL or GBL files inside the
//! `UPGRADE_IMAGE` sub-element. Both are tag/length/value record streams
//! terminated by an end record whose CRC-32 leaves a fixed residue; walking
//! them catches truncated or corrupted images before they are served to a
//! device.
//!
//! # Architecture
//!
//! - [`ebl`]: EBL record parser
//! - [`gbl`]: GBL record parser
//! - [`validate`]: Format detection and OTA image validation
//! - [`error`]: Error types

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::fmt;

pub mod ebl;
pub mod error;
pub mod gbl;
pub mod prelude;
pub mod validate;

pub use ebl::{EblRecords, EblTag, parse_silabs_ebl};
pub use error::{Result, ValidationError};
pub use gbl::{GblRecords, GblTag, parse_silabs_gbl};
pub use validate::{ValidationResult, detect_firmware_format, validate_firmware, validate_ota_image};

/// CRC-32 of a Silicon Labs image including its stored checksum
pub const SILABS_CRC_RESIDUE: u32 = 0x2144_DF1C;

/// Embedded firmware formats this crate can validate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareFormat {
    /// Silicon Labs Ember Bootloader image
    Ebl,
    /// Silicon Labs Gecko Bootloader image
    Gbl,
}

impl fmt::Display for FirmwareFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareFormat::Ebl => f.write_str("EBL"),
            FirmwareFormat::Gbl => f.write_str("GBL"),
        }
    }
}
