//! OTA files dropped into a local directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;
use zigbee_ota_image::parse_ota_image;

use super::{IndexState, OtaProvider};
use crate::checksum::{Checksum, ChecksumAlgorithm};
use crate::device::OtaDevice;
use crate::error::{OtaError, Result};
use crate::metadata::{ImageLocation, OtaImageMetadata};

const NAME: &str = "local files";

/// Describe one file, or explain why it cannot be served
fn describe(path: &Path, data: Bytes) -> Result<OtaImageMetadata> {
    let (firmware, rest) = parse_ota_image(&data)?;
    if !rest.is_empty() {
        return Err(OtaError::Format(zigbee_ota_image::FormatError::TrailingData(
            rest.len(),
        )));
    }

    let header = firmware.header();
    let mut builder = OtaImageMetadata::builder(header.file_version)
        .manufacturer_id(header.manufacturer_id)
        .image_type(header.image_type)
        .checksum(Checksum::compute(ChecksumAlgorithm::Sha256, &data))
        .file_size(data.len() as u64)
        .source(format!("{NAME}: {}", path.display()));
    if let Some(version) = header.minimum_hardware_version() {
        builder = builder.min_hardware_version(version);
    }
    if let Some(version) = header.maximum_hardware_version() {
        builder = builder.max_hardware_version(version);
    }

    Ok(builder.location(ImageLocation::Embedded(data)).build())
}

/// Provider serving every parseable OTA file in a directory
///
/// Files that fail to parse are skipped with a warning. Subdirectories are
/// not searched.
#[derive(Debug)]
pub struct LocalFilesProvider {
    dir: PathBuf,
    state: IndexState,
}

impl LocalFilesProvider {
    /// Serve files from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            state: IndexState::default(),
        }
    }

    /// Set the staleness window
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.state = IndexState::new(staleness);
        self
    }

    /// Directory being scanned
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl OtaProvider for LocalFilesProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn compatible_with_device(&self, _device: &dyn OtaDevice) -> bool {
        true
    }

    fn index_state(&self) -> &IndexState {
        &self.state
    }

    async fn fetch_index(&self) -> Result<Vec<OtaImageMetadata>> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let data = match tokio::fs::read(&path).await {
                Ok(data) => Bytes::from(data),
                Err(e) => {
                    warn!("Skipping unreadable file {}: {}", path.display(), e);
                    continue;
                }
            };
            match describe(&path, data) {
                Ok(meta) => records.push(meta),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }
}
