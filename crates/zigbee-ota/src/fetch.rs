//! Retrieving and verifying image bytes

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use tracing::{debug, info};
use zigbee_ota_http::CachingClient;
use zigbee_ota_image::{FirmwareImage, FormatError, parse_ota_image};

use crate::error::{OtaError, Result};
use crate::metadata::{ImageLocation, OtaImageMetadata, TrailingData};

impl OtaImageMetadata {
    /// Download, verify and parse the image this record describes
    ///
    /// Size and checksum are checked against the raw file before parsing.
    /// Integrity failures are never retried.
    ///
    /// # Errors
    ///
    /// Returns [`OtaError::Size`] or [`OtaError::Checksum`] when the bytes do
    /// not match the declared values, a transport error when the bytes cannot
    /// be read, or a format error when they do not form a valid image.
    pub async fn fetch(&self, client: &CachingClient) -> Result<FirmwareImage> {
        let location = self.location().ok_or_else(|| {
            OtaError::Config(format!("{} image has no location", self.source()))
        })?;

        info!("Fetching image {:#010x} from {}", self.file_version(), location);
        let data = read_location(location, client).await?;
        self.parse_verified(&data)
    }

    /// Verify `data` against this record and parse it
    pub fn parse_verified(&self, data: &[u8]) -> Result<FirmwareImage> {
        if let Some(expected) = self.file_size()
            && expected != data.len() as u64
        {
            return Err(OtaError::Size {
                expected,
                actual: data.len() as u64,
            });
        }

        if let Some(checksum) = self.checksum() {
            checksum.verify(data)?;
        }

        let (firmware, rest) = parse_ota_image(data)?;
        if rest.is_empty() {
            return Ok(firmware);
        }

        match (self.trailing_data(), firmware) {
            (TrailingData::FoldIntoLastElement, FirmwareImage::Standard(image)) => {
                debug!("Folding {} trailing bytes into the last sub-element", rest.len());
                Ok(image.fold_trailing_bytes(rest)?.into())
            }
            _ => Err(FormatError::TrailingData(rest.len()).into()),
        }
    }
}

async fn read_location(location: &ImageLocation, client: &CachingClient) -> Result<Bytes> {
    match location {
        ImageLocation::Url(url) => download(client, url).await,
        ImageLocation::File(path) => read_file(path).await,
        ImageLocation::SalusArchive(url) => {
            let archive = download(client, url).await?;
            let member = tokio::task::spawn_blocking(move || extract_ota_member(&archive))
                .await
                .map_err(|e| OtaError::Archive(e.to_string()))??;
            Ok(Bytes::from(member))
        }
        ImageLocation::Embedded(bytes) => Ok(bytes.clone()),
    }
}

async fn download(client: &CachingClient, url: &str) -> Result<Bytes> {
    // Image bodies are not kept in the response cache; coalescing still applies.
    let response = client.get_url(url, Duration::ZERO).await?.error_for_status()?;
    Ok(response.body)
}

async fn read_file(path: &Path) -> Result<Bytes> {
    let data = tokio::fs::read(path).await?;
    Ok(Bytes::from(data))
}

/// Extract the single `.ota` member of a gzip-compressed tarball
///
/// # Errors
///
/// Returns [`OtaError::Archive`] if the archive is unreadable or does not
/// contain exactly one `.ota` file.
pub fn extract_ota_member(archive: &[u8]) -> Result<Vec<u8>> {
    let archive_error = |e: std::io::Error| OtaError::Archive(e.to_string());

    let mut tarball = tar::Archive::new(GzDecoder::new(archive));
    let mut found: Option<Vec<u8>> = None;

    for entry in tarball.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        let is_ota = entry
            .path()
            .map_err(archive_error)?
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ota"));
        if !is_ota {
            continue;
        }
        if found.is_some() {
            return Err(OtaError::Archive(
                "archive contains more than one .ota file".to_string(),
            ));
        }
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(archive_error)?;
        found = Some(data);
    }

    found.ok_or_else(|| OtaError::Archive("archive contains no .ota file".to_string()))
}
