//! Silicon Labs GBL images
//!
//! A GBL image is a stream of records, each a little-endian u32 tag, a
//! little-endian u32 length and the value. The first record is an 8-byte
//! header and the stream ends with an end record holding the CRC. Some
//! vendors pad GBL images; anything after the end record is ignored.

use std::fmt;

use crate::error::{Result, ValidationError};
use crate::{FirmwareFormat, SILABS_CRC_RESIDUE};

/// Leading bytes of every GBL image: the header tag
pub const GBL_MAGIC: [u8; 4] = [0xEB, 0x17, 0xA6, 0x03];

/// Length of the header record value
pub const GBL_HEADER_LEN: usize = 8;

const FORMAT: FirmwareFormat = FirmwareFormat::Gbl;

/// GBL record tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GblTag {
    /// Image header
    Header,
    /// Application properties
    Application,
    /// Bootloader upgrade
    Bootloader,
    /// Secure element upgrade
    SeUpgrade,
    /// Metadata
    Metadata,
    /// Program data
    Prog,
    /// Erase, then program data
    EraseProg,
    /// LZ4-compressed program data
    ProgLz4,
    /// LZMA-compressed program data
    ProgLzma,
    /// Encryption nonce
    EncryptionInit,
    /// Encrypted records
    EncryptionData,
    /// ECDSA P-256 signature
    SignatureEcdsaP256,
    /// Signing certificate
    Certificate,
    /// End of image, carries the CRC
    End,
    /// Unrecognized tag
    Other(u32),
}

impl GblTag {
    /// Wire value of the tag
    pub fn id(self) -> u32 {
        match self {
            GblTag::Header => 0x03A6_17EB,
            GblTag::Application => 0xF40A_0AF4,
            GblTag::Bootloader => 0xF509_09F5,
            GblTag::SeUpgrade => 0x5EA6_17EB,
            GblTag::Metadata => 0xF608_08F6,
            GblTag::Prog => 0xFE01_01FE,
            GblTag::EraseProg => 0xFD03_03FD,
            GblTag::ProgLz4 => 0xFD05_05FD,
            GblTag::ProgLzma => 0xFD07_07FD,
            GblTag::EncryptionInit => 0xFA06_06FA,
            GblTag::EncryptionData => 0xF907_07F9,
            GblTag::SignatureEcdsaP256 => 0xF70A_0AF7,
            GblTag::Certificate => 0xF30B_0BF3,
            GblTag::End => 0xFC04_04FC,
            GblTag::Other(id) => id,
        }
    }
}

impl From<u32> for GblTag {
    fn from(id: u32) -> Self {
        match id {
            0x03A6_17EB => GblTag::Header,
            0xF40A_0AF4 => GblTag::Application,
            0xF509_09F5 => GblTag::Bootloader,
            0x5EA6_17EB => GblTag::SeUpgrade,
            0xF608_08F6 => GblTag::Metadata,
            0xFE01_01FE => GblTag::Prog,
            0xFD03_03FD => GblTag::EraseProg,
            0xFD05_05FD => GblTag::ProgLz4,
            0xFD07_07FD => GblTag::ProgLzma,
            0xFA06_06FA => GblTag::EncryptionInit,
            0xF907_07F9 => GblTag::EncryptionData,
            0xF70A_0AF7 => GblTag::SignatureEcdsaP256,
            0xF30B_0BF3 => GblTag::Certificate,
            0xFC04_04FC => GblTag::End,
            other => GblTag::Other(other),
        }
    }
}

impl fmt::Display for GblTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Records,
    Trailer,
    Done,
}

/// Lazy iterator over the records of a GBL image
///
/// Yields every record up to and including the end record, then one final
/// error if the CRC is wrong. Iteration stops after the first error.
#[derive(Debug, Clone)]
pub struct GblRecords<'a> {
    image: &'a [u8],
    pos: usize,
    state: State,
}

/// Parse a GBL image into its records
pub fn parse_silabs_gbl(image: &[u8]) -> GblRecords<'_> {
    GblRecords {
        image,
        pos: 0,
        state: State::Header,
    }
}

impl<'a> GblRecords<'a> {
    fn read_record(&mut self) -> Result<(GblTag, &'a [u8])> {
        let rest = self.image.get(self.pos..).unwrap_or_default();
        if rest.is_empty() {
            return Err(ValidationError::MissingEndTag { format: FORMAT });
        }

        let Some(&[t0, t1, t2, t3, l0, l1, l2, l3]) = rest.first_chunk::<8>() else {
            return Err(ValidationError::Truncated {
                format: FORMAT,
                what: "tag and size not present",
            });
        };
        let tag = GblTag::from(u32::from_le_bytes([t0, t1, t2, t3]));
        let truncated = ValidationError::Truncated {
            format: FORMAT,
            what: "tag value is cut off",
        };
        let length = usize::try_from(u32::from_le_bytes([l0, l1, l2, l3]))
            .ok()
            .ok_or(truncated.clone())?;

        let value = length
            .checked_add(8)
            .and_then(|end| rest.get(8..end))
            .ok_or(truncated)?;
        self.pos += 8 + length;
        Ok((tag, value))
    }

    fn check_crc(&self) -> Result<()> {
        let body = self.image.get(..self.pos).unwrap_or(self.image);
        let residue = crc32fast::hash(body);
        if residue != SILABS_CRC_RESIDUE {
            return Err(ValidationError::CrcMismatch {
                format: FORMAT,
                residue,
            });
        }
        Ok(())
    }
}

impl<'a> Iterator for GblRecords<'a> {
    type Item = Result<(GblTag, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.state {
            State::Done => return None,
            State::Trailer => {
                self.state = State::Done;
                return self.check_crc().err().map(Err);
            }
            State::Header => match self.read_record() {
                Ok((GblTag::Header, value)) if value.len() == GBL_HEADER_LEN => {
                    self.state = State::Records;
                    Ok((GblTag::Header, value))
                }
                Ok(_) => Err(ValidationError::InvalidHeader { format: FORMAT }),
                Err(e) => Err(e),
            },
            State::Records => self.read_record().inspect(|(tag, _)| {
                if *tag == GblTag::End {
                    self.state = State::Trailer;
                }
            }),
        };

        if result.is_err() {
            self.state = State::Done;
        }
        Some(result)
    }
}
