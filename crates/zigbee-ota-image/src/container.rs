//! Vendor container unwrapping
//!
//! Some vendors wrap the canonical OTA file in their own envelope. Formats
//! are tried in [`ContainerFormat::PRIORITY`] order and the first one whose
//! structural signature matches decides how the bytes are parsed. A format
//! that matches but then fails to parse is an error; later formats are not
//! tried.

use std::fmt;

use tracing::debug;

use crate::error::{FormatError, Result};
use crate::header::{OTA_MAGIC, OtaImageHeader};
use crate::image::{FirmwareImage, HUE_MANUFACTURER_ID, HUE_SBL_MARKER, HueSblImage, OtaImage};
use crate::wire::peek_u32_le;

/// ASCII signature of the gateway wrapper
pub const NGIS_SIGNATURE: &[u8; 4] = b"NGIS";

/// Gateway wrapper preamble: signature, reserved bytes, offset and size
const NGIS_PREAMBLE_LEN: usize = 24;

/// Flag byte plus trailer following a size-prefixed image
const SIZE_PREFIXED_TRAILER_LEN: usize = 17;

/// Whole-blob digest plus offset and size
const DIGEST_PREAMBLE_LEN: usize = 40;

/// Offset of the canonical image inside a fixed-offset container
pub const FIXED_CONTAINER_OFFSET: usize = 64;

/// Recognized on-disk layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// Plain OTA upgrade file
    Canonical,
    /// Standalone-bootloader image with an opaque payload
    HueSbl,
    /// Gateway wrapper with an offset/size table at bytes 16..24
    Ngis,
    /// u32 size, image, flag byte and 16-byte trailer
    SizePrefixed,
    /// 32-byte digest, u32 offset and u32 size, then the image
    DigestPrefixed,
    /// Image at a constant offset, padded at the end
    FixedOffset,
}

impl ContainerFormat {
    /// Order in which layouts are tried
    pub const PRIORITY: [ContainerFormat; 5] = [
        ContainerFormat::Canonical,
        ContainerFormat::Ngis,
        ContainerFormat::SizePrefixed,
        ContainerFormat::DigestPrefixed,
        ContainerFormat::FixedOffset,
    ];

    /// Whether `data` carries this layout's structural signature
    pub fn matches(self, data: &[u8]) -> bool {
        match self {
            ContainerFormat::Canonical => peek_u32_le(data, 0) == Some(OTA_MAGIC),
            ContainerFormat::HueSbl => is_hue_sbl(data),
            ContainerFormat::Ngis => data.starts_with(NGIS_SIGNATURE),
            ContainerFormat::SizePrefixed => peek_u32_le(data, 4) == Some(OTA_MAGIC),
            ContainerFormat::DigestPrefixed => digest_prefixed_range(data)
                .is_some_and(|(start, _)| peek_u32_le(data, start) == Some(OTA_MAGIC)),
            ContainerFormat::FixedOffset => {
                peek_u32_le(data, FIXED_CONTAINER_OFFSET) == Some(OTA_MAGIC)
            }
        }
    }

    fn unwrap<'a>(self, data: &'a [u8]) -> Result<(FirmwareImage, &'a [u8])> {
        match self {
            ContainerFormat::Canonical | ContainerFormat::HueSbl => parse_canonical(data),
            ContainerFormat::Ngis => unwrap_ngis(data),
            ContainerFormat::SizePrefixed => unwrap_size_prefixed(data),
            ContainerFormat::DigestPrefixed => unwrap_digest_prefixed(data),
            ContainerFormat::FixedOffset => {
                let inner = data.get(FIXED_CONTAINER_OFFSET..).unwrap_or_default();
                let (image, _padding) = parse_canonical(inner)?;
                Ok((image, &[]))
            }
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerFormat::Canonical => "canonical",
            ContainerFormat::HueSbl => "Hue SBL",
            ContainerFormat::Ngis => "NGIS",
            ContainerFormat::SizePrefixed => "size-prefixed",
            ContainerFormat::DigestPrefixed => "digest-prefixed",
            ContainerFormat::FixedOffset => "fixed-offset",
        };
        f.write_str(name)
    }
}

/// Parse an OTA file, unwrapping any known vendor container
///
/// Returns the image and any bytes that follow it inside the layout that
/// carried it. Containers that define their own trailer consume it.
pub fn parse_ota_image(data: &[u8]) -> Result<(FirmwareImage, &[u8])> {
    let format = ContainerFormat::PRIORITY
        .into_iter()
        .find(|format| format.matches(data))
        .ok_or(FormatError::UnrecognizedFormat)?;

    if format != ContainerFormat::Canonical {
        debug!("Unwrapping {} container ({} bytes)", format, data.len());
    }
    format.unwrap(data)
}

/// Identify which layout `data` uses without parsing it
pub fn detect_container(data: &[u8]) -> Option<ContainerFormat> {
    ContainerFormat::PRIORITY
        .into_iter()
        .find(|format| format.matches(data))
        .map(|format| {
            if format == ContainerFormat::Canonical && is_hue_sbl(data) {
                ContainerFormat::HueSbl
            } else {
                format
            }
        })
}

fn is_hue_sbl(data: &[u8]) -> bool {
    match OtaImageHeader::deserialize(data) {
        Ok((header, rest)) => {
            header.manufacturer_id == HUE_MANUFACTURER_ID && rest.starts_with(&HUE_SBL_MARKER)
        }
        Err(_) => false,
    }
}

fn parse_canonical(data: &[u8]) -> Result<(FirmwareImage, &[u8])> {
    if is_hue_sbl(data) {
        let (image, rest) = HueSblImage::deserialize(data)?;
        return Ok((image.into(), rest));
    }
    let (image, rest) = OtaImage::deserialize(data)?;
    Ok((image.into(), rest))
}

fn slice_at<'a>(
    data: &'a [u8],
    format: ContainerFormat,
    start: usize,
    size: usize,
) -> Result<&'a [u8]> {
    start
        .checked_add(size)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| {
            FormatError::container(
                format,
                format!(
                    "image at {start}..{} exceeds {} available bytes",
                    start.saturating_add(size),
                    data.len()
                ),
            )
        })
}

fn read_len(data: &[u8], offset: usize, format: ContainerFormat) -> Result<usize> {
    peek_u32_le(data, offset)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| FormatError::container(format, format!("missing length field at {offset}")))
}

fn unwrap_ngis(data: &[u8]) -> Result<(FirmwareImage, &[u8])> {
    if data.len() <= NGIS_PREAMBLE_LEN {
        return Err(FormatError::truncated(
            "NGIS preamble",
            NGIS_PREAMBLE_LEN + 1,
            data.len(),
        ));
    }
    let offset = read_len(data, 16, ContainerFormat::Ngis)?;
    let size = read_len(data, 20, ContainerFormat::Ngis)?;
    let inner = slice_at(data, ContainerFormat::Ngis, offset, size)?;
    parse_canonical(inner)
}

fn unwrap_size_prefixed(data: &[u8]) -> Result<(FirmwareImage, &[u8])> {
    let size = read_len(data, 0, ContainerFormat::SizePrefixed)?;
    let expected = size
        .checked_add(4 + SIZE_PREFIXED_TRAILER_LEN)
        .ok_or_else(|| FormatError::container(ContainerFormat::SizePrefixed, "size overflows"))?;
    if data.len() != expected {
        return Err(FormatError::container(
            ContainerFormat::SizePrefixed,
            format!("expected {expected} bytes in total, found {}", data.len()),
        ));
    }

    let inner = slice_at(data, ContainerFormat::SizePrefixed, 4, size)?;
    let (image, rest) = parse_canonical(inner)?;
    if !rest.is_empty() {
        return Err(FormatError::container(
            ContainerFormat::SizePrefixed,
            format!("{} bytes inside the declared size are not part of the image", rest.len()),
        ));
    }
    Ok((image, &[]))
}

fn digest_prefixed_range(data: &[u8]) -> Option<(usize, usize)> {
    let offset = usize::try_from(peek_u32_le(data, 32)?).ok()?;
    let size = usize::try_from(peek_u32_le(data, 36)?).ok()?;
    Some((DIGEST_PREAMBLE_LEN.checked_add(offset)?, size))
}

fn unwrap_digest_prefixed(data: &[u8]) -> Result<(FirmwareImage, &[u8])> {
    let (start, size) = digest_prefixed_range(data).ok_or_else(|| {
        FormatError::container(ContainerFormat::DigestPrefixed, "preamble is incomplete")
    })?;
    let inner = slice_at(data, ContainerFormat::DigestPrefixed, start, size)?;
    parse_canonical(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::SubElement;

    fn canonical() -> Vec<u8> {
        OtaImage::assemble(
            OtaImageHeader::new(0x117C, 0x2101, 0x0100_0025),
            vec![SubElement::upgrade_image(vec![0x5A; 20])],
        )
        .and_then(|image| image.serialize())
        .unwrap_or_default()
    }

    #[test]
    fn priority_starts_with_canonical() {
        assert_eq!(ContainerFormat::PRIORITY.first(), Some(&ContainerFormat::Canonical));
        assert!(!ContainerFormat::PRIORITY.contains(&ContainerFormat::HueSbl));
    }

    #[test]
    fn garbage_is_unrecognized() {
        assert_eq!(
            parse_ota_image(&[0u8; 200]).err(),
            Some(FormatError::UnrecognizedFormat)
        );
        assert_eq!(parse_ota_image(&[]).err(), Some(FormatError::UnrecognizedFormat));
        assert_eq!(detect_container(b"hello"), None);
    }

    #[test]
    fn short_ngis_wrapper_is_truncation() {
        let mut data = b"NGIS".to_vec();
        data.resize(24, 0);
        assert!(matches!(
            parse_ota_image(&data),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn size_prefixed_requires_exact_total_length() {
        let image = canonical();
        let mut data = (image.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&image);
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(detect_container(&data), Some(ContainerFormat::SizePrefixed));
        assert!(matches!(
            parse_ota_image(&data),
            Err(FormatError::Container {
                format: ContainerFormat::SizePrefixed,
                ..
            })
        ));
    }

    #[test]
    fn matching_format_that_fails_does_not_fall_through() {
        let mut data = canonical();
        data.truncate(60);
        assert!(matches!(
            parse_ota_image(&data),
            Err(FormatError::Truncated { .. })
        ));
    }
}
