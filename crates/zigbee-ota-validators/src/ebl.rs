//! Silicon Labs EBL images
//!
//! An EBL image is a stream of records, each a big-endian u16 tag, a
//! big-endian u16 length and the value. The first record is a 140-byte
//! header and the stream ends with an end record holding the CRC. The image
//! is padded with `0xFF` up to a multiple of 64 bytes.

use std::fmt;

use crate::error::{Result, ValidationError};
use crate::{FirmwareFormat, SILABS_CRC_RESIDUE};

/// Leading bytes of every EBL image: header tag and 140-byte length
pub const EBL_MAGIC: [u8; 4] = [0x00, 0x00, 0x00, 0x8C];

/// Length of the header record value
pub const EBL_HEADER_LEN: usize = 140;

/// EBL images are padded to this size
pub const EBL_ALIGNMENT: usize = 64;

const FORMAT: FirmwareFormat = FirmwareFormat::Ebl;

/// EBL record tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EblTag {
    /// Image header
    Header,
    /// Program data
    Prog,
    /// Manufacturing token data
    MfgProg,
    /// Erase, then program data
    EraseProg,
    /// End of image, carries the CRC
    End,
    /// Application metadata
    Metadata,
    /// Encrypted image header
    EncHeader,
    /// Encryption nonce
    EncInitV,
    /// Encrypted program data
    EncEblData,
    /// Encryption authentication tag
    EncMac,
    /// Unrecognized tag
    Other(u16),
}

impl EblTag {
    /// Wire value of the tag
    pub fn id(self) -> u16 {
        match self {
            EblTag::Header => 0x0000,
            EblTag::Prog => 0xFE01,
            EblTag::MfgProg => 0x02FE,
            EblTag::EraseProg => 0xFD03,
            EblTag::End => 0xFC04,
            EblTag::Metadata => 0xF608,
            EblTag::EncHeader => 0xFB05,
            EblTag::EncInitV => 0xFA06,
            EblTag::EncEblData => 0xF907,
            EblTag::EncMac => 0xF709,
            EblTag::Other(id) => id,
        }
    }
}

impl From<u16> for EblTag {
    fn from(id: u16) -> Self {
        match id {
            0x0000 => EblTag::Header,
            0xFE01 => EblTag::Prog,
            0x02FE => EblTag::MfgProg,
            0xFD03 => EblTag::EraseProg,
            0xFC04 => EblTag::End,
            0xF608 => EblTag::Metadata,
            0xFB05 => EblTag::EncHeader,
            0xFA06 => EblTag::EncInitV,
            0xF907 => EblTag::EncEblData,
            0xF709 => EblTag::EncMac,
            other => EblTag::Other(other),
        }
    }
}

impl fmt::Display for EblTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Records,
    Trailer,
    Done,
}

/// Lazy iterator over the records of an EBL image
///
/// Yields every record up to and including the end record, then one final
/// error if the padding or CRC is wrong. Iteration stops after the first
/// error.
#[derive(Debug, Clone)]
pub struct EblRecords<'a> {
    image: &'a [u8],
    pos: usize,
    state: State,
}

/// Parse an EBL image into its records
pub fn parse_silabs_ebl(image: &[u8]) -> EblRecords<'_> {
    EblRecords {
        image,
        pos: 0,
        state: State::Header,
    }
}

impl<'a> EblRecords<'a> {
    fn read_record(&mut self) -> Result<(EblTag, &'a [u8])> {
        let rest = self.image.get(self.pos..).unwrap_or_default();
        if rest.is_empty() {
            return Err(ValidationError::MissingEndTag { format: FORMAT });
        }

        let Some(&[t0, t1, l0, l1]) = rest.first_chunk::<4>() else {
            return Err(ValidationError::Truncated {
                format: FORMAT,
                what: "tag and size not present",
            });
        };
        let tag = EblTag::from(u16::from_be_bytes([t0, t1]));
        let length = usize::from(u16::from_be_bytes([l0, l1]));

        let value = rest
            .get(4..4 + length)
            .ok_or(ValidationError::Truncated {
                format: FORMAT,
                what: "tag value is cut off",
            })?;
        self.pos += 4 + length;
        Ok((tag, value))
    }

    fn check_trailer(&self) -> Result<()> {
        let (body, padding) = self.image.split_at_checked(self.pos).unwrap_or((self.image, &[]));
        if padding.iter().any(|&b| b != 0xFF) {
            return Err(ValidationError::InvalidPadding { format: FORMAT });
        }
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

impl<'a> Iterator for EblRecords<'a> {
    type Item = Result<(EblTag, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.state {
            State::Done => return None,
            State::Trailer => {
                self.state = State::Done;
                return self.check_trailer().err().map(Err);
            }
            State::Header => {
                if !self.image.len().is_multiple_of(EBL_ALIGNMENT) {
                    Err(ValidationError::Misaligned {
                        format: FORMAT,
                        length: self.image.len(),
                        block: EBL_ALIGNMENT,
                    })
                } else {
                    match self.read_record() {
                        Ok((EblTag::Header, value)) if value.len() == EBL_HEADER_LEN => {
                            self.state = State::Records;
                            Ok((EblTag::Header, value))
                        }
                        Ok(_) => Err(ValidationError::InvalidHeader { format: FORMAT }),
                        Err(e) => Err(e),
                    }
                }
            }
            State::Records => self.read_record().inspect(|(tag, _)| {
                if *tag == EblTag::End {
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
