//! Complete OTA upgrade images

use crate::container::ContainerFormat;
use crate::element::{ElementTag, SubElement};
use crate::error::{FormatError, Result};
use crate::header::OtaImageHeader;
use crate::wire::take;

/// Manufacturer id of the vendor shipping standalone-bootloader images
pub const HUE_MANUFACTURER_ID: u16 = 0x100B;

/// In-band marker that opens a standalone-bootloader payload
pub const HUE_SBL_MARKER: [u8; 3] = [0x2A, 0x00, 0x01];

/// Identity of an image: which devices it targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey {
    /// Manufacturer code
    pub manufacturer_id: u16,
    /// Image type
    pub image_type: u16,
}

fn body_length(header: &OtaImageHeader) -> Result<usize> {
    let header_length = u32::from(header.header_length());
    let body = header
        .image_size
        .checked_sub(header_length)
        .ok_or(FormatError::ImageSizeMismatch {
            declared: header.image_size,
            computed: u64::from(header_length),
        })?;
    usize::try_from(body).ok().ok_or(FormatError::LengthOverflow {
        what: "image body",
        length: usize::MAX,
    })
}

fn computed_image_size(header: &OtaImageHeader, elements: &[SubElement]) -> u64 {
    u64::from(header.header_length()) + elements.iter().map(SubElement::serialized_len).sum::<u64>()
}

/// A canonical OTA image: header followed by sub-elements
///
/// The header's `image_size` always equals the header length plus the
/// serialized size of every sub-element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OtaImage {
    header: OtaImageHeader,
    sub_elements: Vec<SubElement>,
}

impl OtaImage {
    /// Create an image, checking the header's declared size
    pub fn new(header: OtaImageHeader, sub_elements: Vec<SubElement>) -> Result<Self> {
        let computed = computed_image_size(&header, &sub_elements);
        if u64::from(header.image_size) != computed {
            return Err(FormatError::ImageSizeMismatch {
                declared: header.image_size,
                computed,
            });
        }
        Ok(Self {
            header,
            sub_elements,
        })
    }

    /// Create an image, recomputing the header's `image_size`
    pub fn assemble(mut header: OtaImageHeader, sub_elements: Vec<SubElement>) -> Result<Self> {
        let computed = computed_image_size(&header, &sub_elements);
        header.image_size = u32::try_from(computed).ok().ok_or(FormatError::LengthOverflow {
            what: "image size",
            length: usize::try_from(computed).unwrap_or(usize::MAX),
        })?;
        Ok(Self {
            header,
            sub_elements,
        })
    }

    /// Image header
    pub fn header(&self) -> &OtaImageHeader {
        &self.header
    }

    /// Sub-elements in wire order
    pub fn sub_elements(&self) -> &[SubElement] {
        &self.sub_elements
    }

    /// Payloads of all `UPGRADE_IMAGE` sub-elements
    pub fn upgrade_images(&self) -> impl Iterator<Item = &[u8]> {
        self.sub_elements
            .iter()
            .filter(|e| e.tag == ElementTag::UpgradeImage)
            .map(|e| e.data.as_slice())
    }

    /// Identity key of the image
    pub fn key(&self) -> ImageKey {
        ImageKey {
            manufacturer_id: self.header.manufacturer_id,
            image_type: self.header.image_type,
        }
    }

    /// Whether this image is newer than `file_version`
    pub fn is_newer_than(&self, file_version: u32) -> bool {
        self.header.file_version > file_version
    }

    /// Whether this image may be installed on `hw_version`
    pub fn supports_hardware_version(&self, hw_version: u16) -> bool {
        self.header
            .hardware_versions
            .is_none_or(|range| range.contains(hw_version))
    }

    /// Decode an image, returning any bytes past `image_size`
    pub fn deserialize(data: &[u8]) -> Result<(Self, &[u8])> {
        let (header, rest) = OtaImageHeader::deserialize(data)?;
        let (mut body, remainder) = take(rest, body_length(&header)?, "image body")?;

        let mut sub_elements = Vec::new();
        while !body.is_empty() {
            let (element, rest) = SubElement::deserialize(body)?;
            sub_elements.push(element);
            body = rest;
        }

        Ok((Self::new(header, sub_elements)?, remainder))
    }

    /// Encode the image
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let computed = computed_image_size(&self.header, &self.sub_elements);
        if u64::from(self.header.image_size) != computed {
            return Err(FormatError::ImageSizeMismatch {
                declared: self.header.image_size,
                computed,
            });
        }

        let mut out = self.header.serialize();
        for element in &self.sub_elements {
            out.extend_from_slice(&element.serialize()?);
        }
        Ok(out)
    }

    /// Fold `trailing` bytes into the last sub-element
    ///
    /// Some vendors append data after the declared end of the image; this
    /// rebuilds the image so that the extra bytes are part of it and every
    /// length field agrees.
    pub fn fold_trailing_bytes(&self, trailing: &[u8]) -> Result<Self> {
        let mut sub_elements = self.sub_elements.clone();
        let last = sub_elements.last_mut().ok_or(FormatError::NoSubElements)?;
        last.data.extend_from_slice(trailing);
        Self::assemble(self.header.clone(), sub_elements)
    }
}

/// Standalone-bootloader image: canonical header plus an opaque payload
///
/// The payload is not made of sub-elements; it opens with
/// [`HUE_SBL_MARKER`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HueSblImage {
    header: OtaImageHeader,
    data: Vec<u8>,
}

impl HueSblImage {
    /// Create an image, checking manufacturer, marker and size
    pub fn new(header: OtaImageHeader, data: Vec<u8>) -> Result<Self> {
        if header.manufacturer_id != HUE_MANUFACTURER_ID {
            return Err(FormatError::UnexpectedManufacturer {
                format: ContainerFormat::HueSbl,
                expected: HUE_MANUFACTURER_ID,
                actual: header.manufacturer_id,
            });
        }
        if !data.starts_with(&HUE_SBL_MARKER) {
            return Err(FormatError::container(
                ContainerFormat::HueSbl,
                "payload does not start with the bootloader marker",
            ));
        }
        let computed = u64::from(header.header_length()) + data.len() as u64;
        if u64::from(header.image_size) != computed {
            return Err(FormatError::ImageSizeMismatch {
                declared: header.image_size,
                computed,
            });
        }
        Ok(Self { header, data })
    }

    /// Image header
    pub fn header(&self) -> &OtaImageHeader {
        &self.header
    }

    /// Opaque payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decode an image, returning any bytes past `image_size`
    pub fn deserialize(data: &[u8]) -> Result<(Self, &[u8])> {
        let (header, rest) = OtaImageHeader::deserialize(data)?;
        let (payload, remainder) = take(rest, body_length(&header)?, "bootloader payload")?;
        Ok((Self::new(header, payload.to_vec())?, remainder))
    }

    /// Encode the image
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.header.serialize();
        out.extend_from_slice(&self.data);
        out
    }
}

/// Any image the codec knows how to serve
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FirmwareImage {
    /// Canonical image with sub-elements
    Standard(OtaImage),
    /// Standalone-bootloader image
    HueSbl(HueSblImage),
}

impl FirmwareImage {
    /// Image header
    pub fn header(&self) -> &OtaImageHeader {
        match self {
            FirmwareImage::Standard(image) => image.header(),
            FirmwareImage::HueSbl(image) => image.header(),
        }
    }

    /// Sub-elements; empty for standalone-bootloader images
    pub fn sub_elements(&self) -> &[SubElement] {
        match self {
            FirmwareImage::Standard(image) => image.sub_elements(),
            FirmwareImage::HueSbl(_) => &[],
        }
    }

    /// Identity key of the image
    pub fn key(&self) -> ImageKey {
        let header = self.header();
        ImageKey {
            manufacturer_id: header.manufacturer_id,
            image_type: header.image_type,
        }
    }

    /// File version from the header
    pub fn file_version(&self) -> u32 {
        self.header().file_version
    }

    /// Encode the image
    pub fn serialize(&self) -> Result<Vec<u8>> {
        match self {
            FirmwareImage::Standard(image) => image.serialize(),
            FirmwareImage::HueSbl(image) => Ok(image.serialize()),
        }
    }
}

impl From<OtaImage> for FirmwareImage {
    fn from(image: OtaImage) -> Self {
        FirmwareImage::Standard(image)
    }
}

impl From<HueSblImage> for FirmwareImage {
    fn from(image: HueSblImage) -> Self {
        FirmwareImage::HueSbl(image)
    }
}
