//! Declared image checksums
//!
//! Indexes publish digests as `algorithm:hex`. The digest is checked over
//! the downloaded bytes before they are parsed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512};
use sha3::Sha3_256;

use crate::error::{OtaError, Result};

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    /// SHA-256
    Sha256,
    /// SHA-512
    Sha512,
    /// SHA3-256
    Sha3_256,
}

impl ChecksumAlgorithm {
    /// Name used in `algorithm:hex` strings
    pub fn name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
            ChecksumAlgorithm::Sha3_256 => "sha3-256",
        }
    }

    /// Digest length in bytes
    pub fn digest_len(self) -> usize {
        match self {
            ChecksumAlgorithm::Sha256 | ChecksumAlgorithm::Sha3_256 => 32,
            ChecksumAlgorithm::Sha512 => 64,
        }
    }

    /// Compute the lowercase hex digest of `data`
    pub fn digest_hex(self, data: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            ChecksumAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
            ChecksumAlgorithm::Sha3_256 => hex::encode(Sha3_256::digest(data)),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = OtaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "sha512" => Ok(ChecksumAlgorithm::Sha512),
            "sha3-256" => Ok(ChecksumAlgorithm::Sha3_256),
            other => Err(OtaError::Config(format!("unsupported checksum algorithm: {other}"))),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared digest of an image file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    /// Digest algorithm
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hex digest
    pub digest: String,
}

impl Checksum {
    /// Create a checksum from a hex digest
    ///
    /// # Errors
    ///
    /// Returns an error if `digest` is not hex of the algorithm's length.
    pub fn new(algorithm: ChecksumAlgorithm, digest: &str) -> Result<Self> {
        let bytes = hex::decode(digest)
            .map_err(|e| OtaError::Config(format!("invalid {algorithm} digest {digest:?}: {e}")))?;
        if bytes.len() != algorithm.digest_len() {
            return Err(OtaError::Config(format!(
                "{algorithm} digest must be {} bytes, got {}",
                algorithm.digest_len(),
                bytes.len()
            )));
        }
        Ok(Self {
            algorithm,
            digest: digest.to_ascii_lowercase(),
        })
    }

    /// Compute the checksum of `data`
    pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest_hex(data),
        }
    }

    /// Check `data` against this checksum
    ///
    /// # Errors
    ///
    /// Returns [`OtaError::Checksum`] on mismatch.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let actual = self.algorithm.digest_hex(data);
        if !actual.eq_ignore_ascii_case(&self.digest) {
            return Err(OtaError::Checksum {
                expected: self.to_string(),
                actual: format!("{}:{}", self.algorithm, actual),
            });
        }
        Ok(())
    }
}

impl FromStr for Checksum {
    type Err = OtaError;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, digest) = s
            .split_once(':')
            .ok_or_else(|| OtaError::Config(format!("checksum {s:?} is not algorithm:hex")))?;
        Checksum::new(algorithm.parse()?, digest)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
