//! Tagged sub-elements that follow the OTA header

use std::fmt;

use crate::error::{FormatError, Result};
use crate::wire::{take, take_u16_le, take_u32_le};

/// Size of the tag id and length prefix of a sub-element
pub const SUB_ELEMENT_HEADER_LEN: usize = 6;

/// Sub-element tag identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementTag {
    /// Firmware payload to be flashed
    UpgradeImage,
    /// ECDSA signature, crypto suite 1
    EcdsaSignatureCryptoSuite1,
    /// ECDSA signing certificate, crypto suite 1
    EcdsaSigningCertificateCryptoSuite1,
    /// Image integrity code
    ImageIntegrityCode,
    /// Picture data
    PictureData,
    /// ECDSA signature, crypto suite 2
    EcdsaSignatureCryptoSuite2,
    /// ECDSA signing certificate, crypto suite 2
    EcdsaSigningCertificateCryptoSuite2,
    /// Manufacturer-specific or reserved tag
    Other(u16),
}

impl ElementTag {
    /// Wire value of the tag
    pub fn id(self) -> u16 {
        match self {
            ElementTag::UpgradeImage => 0x0000,
            ElementTag::EcdsaSignatureCryptoSuite1 => 0x0001,
            ElementTag::EcdsaSigningCertificateCryptoSuite1 => 0x0002,
            ElementTag::ImageIntegrityCode => 0x0003,
            ElementTag::PictureData => 0x0004,
            ElementTag::EcdsaSignatureCryptoSuite2 => 0x0005,
            ElementTag::EcdsaSigningCertificateCryptoSuite2 => 0x0006,
            ElementTag::Other(id) => id,
        }
    }
}

impl From<u16> for ElementTag {
    fn from(id: u16) -> Self {
        match id {
            0x0000 => ElementTag::UpgradeImage,
            0x0001 => ElementTag::EcdsaSignatureCryptoSuite1,
            0x0002 => ElementTag::EcdsaSigningCertificateCryptoSuite1,
            0x0003 => ElementTag::ImageIntegrityCode,
            0x0004 => ElementTag::PictureData,
            0x0005 => ElementTag::EcdsaSignatureCryptoSuite2,
            0x0006 => ElementTag::EcdsaSigningCertificateCryptoSuite2,
            other => ElementTag::Other(other),
        }
    }
}

impl fmt::Display for ElementTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.id())
    }
}

/// A tag id followed by a length-prefixed opaque payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubElement {
    /// Tag identifier
    pub tag: ElementTag,
    /// Payload bytes
    pub data: Vec<u8>,
}

impl SubElement {
    /// Create a sub-element
    pub fn new(tag: ElementTag, data: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            data: data.into(),
        }
    }

    /// Create an `UPGRADE_IMAGE` sub-element
    pub fn upgrade_image(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ElementTag::UpgradeImage, data)
    }

    /// Number of bytes this sub-element occupies on the wire
    pub fn serialized_len(&self) -> u64 {
        SUB_ELEMENT_HEADER_LEN as u64 + self.data.len() as u64
    }

    /// Decode one sub-element
    pub fn deserialize(data: &[u8]) -> Result<(Self, &[u8])> {
        let (tag, rest) = take_u16_le(data, "sub-element tag")?;
        let (length, rest) = take_u32_le(rest, "sub-element length")?;
        let length = usize::try_from(length).ok().ok_or(FormatError::LengthOverflow {
            what: "sub-element",
            length: usize::MAX,
        })?;
        let (payload, rest) = take(rest, length, "sub-element payload")?;

        Ok((Self::new(ElementTag::from(tag), payload), rest))
    }

    /// Encode the sub-element
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let length = u32::try_from(self.data.len()).ok().ok_or(FormatError::LengthOverflow {
            what: "sub-element",
            length: self.data.len(),
        })?;
        let mut out = Vec::with_capacity(SUB_ELEMENT_HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.tag.id().to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&self.data);
        Ok(out)
    }
}
