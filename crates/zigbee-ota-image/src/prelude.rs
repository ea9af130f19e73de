//! Convenience re-exports for common codec types

pub use crate::container::{ContainerFormat, detect_container, parse_ota_image};
pub use crate::element::{ElementTag, SubElement};
pub use crate::error::FormatError;
pub use crate::header::{HardwareVersionRange, OtaImageHeader};
pub use crate::image::{FirmwareImage, HueSblImage, ImageKey, OtaImage};
