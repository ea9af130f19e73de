//! OTA upgrade file header
//!
//! ```text
//! offset  size  field
//!      0     4  upgrade file identifier (0x0BEEF11E)
//!      4     2  header version
//!      6     2  header length
//!      8     2  header field control
//!     10     2  manufacturer code
//!     12     2  image type
//!     14     4  file version
//!     18     2  zigbee stack version
//!     20    32  header string
//!     52     4  total image size
//!     56     1  security credential version      (field control bit 0)
//!      -     8  upgrade file destination         (field control bit 1)
//!      -     4  minimum/maximum hardware version (field control bit 2)
//! ```
//!
//! All integers are little-endian.

use crate::error::{FormatError, Result};
use crate::wire::{take_array, take_u8, take_u16_le, take_u32_le};

/// Upgrade file identifier
pub const OTA_MAGIC: u32 = 0x0BEE_F11E;

/// Wire bytes of [`OTA_MAGIC`]
pub const OTA_MAGIC_BYTES: [u8; 4] = OTA_MAGIC.to_le_bytes();

/// Size of the mandatory part of the header
pub const FIXED_HEADER_LEN: u16 = 56;

/// Length of the header string field
pub const HEADER_STRING_LEN: usize = 32;

/// Header version used by the Zigbee OTA cluster specification
pub const DEFAULT_HEADER_VERSION: u16 = 0x0100;

/// Bits of the header field control
pub mod field_control {
    /// Security credential version is present
    pub const SECURITY_CREDENTIAL_VERSION: u16 = 0b001;
    /// Device-specific file: destination address is present
    pub const DEVICE_SPECIFIC_FILE: u16 = 0b010;
    /// Minimum/maximum hardware versions are present
    pub const HARDWARE_VERSIONS: u16 = 0b100;
    /// Bits that announce an optional section
    pub const KNOWN: u16 = SECURITY_CREDENTIAL_VERSION | DEVICE_SPECIFIC_FILE | HARDWARE_VERSIONS;
}

/// Inclusive hardware version range carried by the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareVersionRange {
    /// Minimum supported hardware version
    pub min: u16,
    /// Maximum supported hardware version
    pub max: u16,
}

impl HardwareVersionRange {
    /// Check whether `hw_version` falls within the range
    pub fn contains(&self, hw_version: u16) -> bool {
        self.min <= hw_version && hw_version <= self.max
    }
}

/// Parsed OTA upgrade file header
///
/// The header length and the known field control bits are derived from which
/// optional sections are present, so a header always serializes consistently.
/// Reserved field control bits are carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OtaImageHeader {
    /// Header version
    pub header_version: u16,
    /// Manufacturer code
    pub manufacturer_id: u16,
    /// Manufacturer-specific image type
    pub image_type: u16,
    /// File version, monotonically increasing per image type
    pub file_version: u32,
    /// Zigbee stack version
    pub stack_version: u16,
    /// Free-form header string, NUL padded
    pub header_string: [u8; HEADER_STRING_LEN],
    /// Total image size, header included
    pub image_size: u32,
    /// Security credential version
    pub security_credential_version: Option<u8>,
    /// Device-specific destination address (IEEE address, wire order)
    pub upgrade_file_destination: Option<[u8; 8]>,
    /// Supported hardware versions
    pub hardware_versions: Option<HardwareVersionRange>,
    /// Field control bits outside [`field_control::KNOWN`]
    pub reserved_field_control: u16,
}

impl OtaImageHeader {
    /// Create a header with no optional sections
    ///
    /// `image_size` is initialized to the header length; [`crate::OtaImage::new`]
    /// recomputes it from the sub-elements.
    pub fn new(manufacturer_id: u16, image_type: u16, file_version: u32) -> Self {
        Self {
            header_version: DEFAULT_HEADER_VERSION,
            manufacturer_id,
            image_type,
            file_version,
            stack_version: 2,
            header_string: [0u8; HEADER_STRING_LEN],
            image_size: u32::from(FIXED_HEADER_LEN),
            security_credential_version: None,
            upgrade_file_destination: None,
            hardware_versions: None,
            reserved_field_control: 0,
        }
    }

    /// Return a copy with the given header string, truncated to 32 bytes
    pub fn with_header_string(mut self, text: &str) -> Self {
        let mut buf = [0u8; HEADER_STRING_LEN];
        for (dst, src) in buf.iter_mut().zip(text.bytes()) {
            *dst = src;
        }
        self.header_string = buf;
        self
    }

    /// Return a copy restricted to the given hardware versions
    pub fn with_hardware_versions(mut self, min: u16, max: u16) -> Self {
        self.hardware_versions = Some(HardwareVersionRange { min, max });
        self
    }

    /// Field control bitmask: the optional sections plus any reserved bits
    pub fn field_control(&self) -> u16 {
        let mut bits = self.reserved_field_control & !field_control::KNOWN;
        if self.security_credential_version.is_some() {
            bits |= field_control::SECURITY_CREDENTIAL_VERSION;
        }
        if self.upgrade_file_destination.is_some() {
            bits |= field_control::DEVICE_SPECIFIC_FILE;
        }
        if self.hardware_versions.is_some() {
            bits |= field_control::HARDWARE_VERSIONS;
        }
        bits
    }

    /// Serialized length of this header
    pub fn header_length(&self) -> u16 {
        let mut len = FIXED_HEADER_LEN;
        if self.security_credential_version.is_some() {
            len += 1;
        }
        if self.upgrade_file_destination.is_some() {
            len += 8;
        }
        if self.hardware_versions.is_some() {
            len += 4;
        }
        len
    }

    /// Header string with NUL padding stripped
    pub fn header_string_lossy(&self) -> String {
        let end = self
            .header_string
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(HEADER_STRING_LEN);
        String::from_utf8_lossy(self.header_string.get(..end).unwrap_or_default()).into_owned()
    }

    /// Minimum hardware version, if the header carries a range
    pub fn minimum_hardware_version(&self) -> Option<u16> {
        self.hardware_versions.map(|r| r.min)
    }

    /// Maximum hardware version, if the header carries a range
    pub fn maximum_hardware_version(&self) -> Option<u16> {
        self.hardware_versions.map(|r| r.max)
    }

    /// Decode a header, returning it and the bytes that follow it
    pub fn deserialize(data: &[u8]) -> Result<(Self, &[u8])> {
        let (magic, rest) = take_u32_le(data, "upgrade file identifier")?;
        if magic != OTA_MAGIC {
            return Err(FormatError::InvalidMagic {
                expected: OTA_MAGIC,
                actual: magic,
            });
        }

        let (header_version, rest) = take_u16_le(rest, "header version")?;
        let (declared_length, rest) = take_u16_le(rest, "header length")?;
        let (control, rest) = take_u16_le(rest, "field control")?;
        let (manufacturer_id, rest) = take_u16_le(rest, "manufacturer code")?;
        let (image_type, rest) = take_u16_le(rest, "image type")?;
        let (file_version, rest) = take_u32_le(rest, "file version")?;
        let (stack_version, rest) = take_u16_le(rest, "stack version")?;
        let (header_string, rest) = take_array::<HEADER_STRING_LEN>(rest, "header string")?;
        let (image_size, mut rest) = take_u32_le(rest, "image size")?;

        let mut header = Self {
            header_version,
            manufacturer_id,
            image_type,
            file_version,
            stack_version,
            header_string,
            image_size,
            security_credential_version: None,
            upgrade_file_destination: None,
            hardware_versions: None,
            reserved_field_control: control & !field_control::KNOWN,
        };

        if control & field_control::SECURITY_CREDENTIAL_VERSION != 0 {
            let (version, r) = take_u8(rest, "security credential version")?;
            header.security_credential_version = Some(version);
            rest = r;
        }
        if control & field_control::DEVICE_SPECIFIC_FILE != 0 {
            let (address, r) = take_array::<8>(rest, "upgrade file destination")?;
            header.upgrade_file_destination = Some(address);
            rest = r;
        }
        if control & field_control::HARDWARE_VERSIONS != 0 {
            let (min, r) = take_u16_le(rest, "minimum hardware version")?;
            let (max, r) = take_u16_le(r, "maximum hardware version")?;
            header.hardware_versions = Some(HardwareVersionRange { min, max });
            rest = r;
        }

        let computed = header.header_length();
        if declared_length != computed {
            return Err(FormatError::HeaderLengthMismatch {
                declared: declared_length,
                computed,
            });
        }

        Ok((header, rest))
    }

    /// Encode the header
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(usize::from(self.header_length()));
        out.extend_from_slice(&OTA_MAGIC_BYTES);
        out.extend_from_slice(&self.header_version.to_le_bytes());
        out.extend_from_slice(&self.header_length().to_le_bytes());
        out.extend_from_slice(&self.field_control().to_le_bytes());
        out.extend_from_slice(&self.manufacturer_id.to_le_bytes());
        out.extend_from_slice(&self.image_type.to_le_bytes());
        out.extend_from_slice(&self.file_version.to_le_bytes());
        out.extend_from_slice(&self.stack_version.to_le_bytes());
        out.extend_from_slice(&self.header_string);
        out.extend_from_slice(&self.image_size.to_le_bytes());

        if let Some(version) = self.security_credential_version {
            out.push(version);
        }
        if let Some(address) = self.upgrade_file_destination {
            out.extend_from_slice(&address);
        }
        if let Some(range) = self.hardware_versions {
            out.extend_from_slice(&range.min.to_le_bytes());
            out.extend_from_slice(&range.max.to_le_bytes());
        }
        out
    }
}
