//! Zigbee OTA upgrade file codec
//!
//! This crate decodes and encodes OTA upgrade files as defined by the Zigbee
//! OTA cluster:
//! - Header parsing with optional field-control sections
//! - Tagged sub-elements, unknown tags preserved
//! - Byte-exact serialization with a checked `image_size`
//! - Unwrapping of vendor containers around the canonical file
//!
//! # Architecture
//!
//! - [`header`]: Upgrade file header
//! - [`element`]: Tagged sub-elements
//! - [`image`]: Complete images and the standalone-bootloader variant
//! - [`container`]: Vendor container detection and unwrapping
//! - [`error`]: Error types
//!
//! The crate performs no I/O; every parser takes a byte slice and returns
//! the decoded value together with the bytes it did not consume.
//!
//! # Example
//!
//! ```
//! use zigbee_ota_image::prelude::*;
//!
//! # fn example() -> Result<(), FormatError> {
//! let image = OtaImage::assemble(
//!     OtaImageHeader::new(0x117C, 0x2101, 0x0100_0025),
//!     vec![SubElement::upgrade_image(vec![0xFF; 16])],
//! )?;
//! let bytes = image.serialize()?;
//!
//! let (parsed, remainder) = parse_ota_image(&bytes)?;
//! assert_eq!(parsed.key(), image.key());
//! assert!(remainder.is_empty());
//! # Ok(())
//! # }
//! # example().ok();
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod container;
pub mod element;
pub mod error;
pub mod header;
pub mod image;
pub mod prelude;

mod wire;

pub use container::{ContainerFormat, detect_container, parse_ota_image};
pub use element::{ElementTag, SubElement};
pub use error::{FormatError, Result};
pub use header::{HardwareVersionRange, OTA_MAGIC, OtaImageHeader};
pub use image::{FirmwareImage, HueSblImage, ImageKey, OtaImage};
