//! LEDVANCE / OSRAM index

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use zigbee_ota_http::CachingClient;

use super::{IndexState, OtaProvider, fetch_json, manufacturer_allowed};
use crate::checksum::{Checksum, ChecksumAlgorithm};
use crate::device::OtaDevice;
use crate::error::{OtaError, Result};
use crate::metadata::OtaImageMetadata;

/// Default index location
pub const LEDVANCE_INDEX_URL: &str = "https://api.update.ledvance.com/v1/zigbee/firmwares";

/// Base of the per-image download endpoint
pub const LEDVANCE_DOWNLOAD_URL: &str =
    "https://api.update.ledvance.com/v1/zigbee/firmwares/download";

/// Manufacturer codes served by this provider
pub const LEDVANCE_MANUFACTURER_IDS: &[u16] = &[0x1189];

const NAME: &str = "LEDVANCE";

#[derive(Debug, Deserialize)]
struct LedvanceIndex {
    firmwares: Vec<LedvanceFirmware>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedvanceFirmware {
    identity: Identity,
    full_name: String,
    product_name: String,
    #[serde(rename = "shA256")]
    sha256: String,
    length: u64,
    #[serde(default)]
    release_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Identity {
    company: u16,
    product: u16,
    version: Version,
}

#[derive(Debug, Deserialize)]
struct Version {
    major: u8,
    minor: u8,
    build: u16,
    revision: u16,
}

impl Version {
    fn file_version(&self) -> u32 {
        (u32::from(self.major) << 24) | (u32::from(self.minor) << 16) | u32::from(self.build)
    }
}

fn parse_index(
    index: LedvanceIndex,
    index_url: &str,
    download_url: &str,
) -> Result<Vec<OtaImageMetadata>> {
    index
        .firmwares
        .into_iter()
        .map(|fw| {
            let checksum = Checksum::new(ChecksumAlgorithm::Sha256, &fw.sha256)
                .map_err(|e| OtaError::schema(NAME, format!("{}: {e}", fw.full_name)))?;
            let Identity {
                company,
                product,
                version,
            } = &fw.identity;
            let url = format!(
                "{download_url}?Company={company}&Product={product}&Version={}.{}.{}.{}",
                version.major, version.minor, version.build, version.revision
            );

            let mut builder = OtaImageMetadata::builder(version.file_version())
                .manufacturer_id(*company)
                .image_type(*product)
                .checksum(checksum)
                .file_size(fw.length)
                .changelog(format!("{} ({})", fw.full_name, fw.product_name))
                .source(format!("{NAME}: {index_url}"))
                .url(url);
            if let Some(notes) = fw.release_notes {
                builder = builder.release_notes(notes);
            }
            Ok(builder.build())
        })
        .collect()
}

/// Provider for the LEDVANCE update service
#[derive(Debug)]
pub struct LedvanceProvider {
    client: CachingClient,
    url: String,
    download_url: String,
    state: IndexState,
}

impl LedvanceProvider {
    /// Use the default endpoints
    pub fn new(client: CachingClient) -> Self {
        Self::with_url(client, LEDVANCE_INDEX_URL)
    }

    /// Use a custom index URL
    pub fn with_url(client: CachingClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            download_url: LEDVANCE_DOWNLOAD_URL.to_string(),
            state: IndexState::default(),
        }
    }

    /// Use a custom download endpoint
    pub fn with_download_url(mut self, download_url: impl Into<String>) -> Self {
        self.download_url = download_url.into();
        self
    }

    /// Set the staleness window
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.state = IndexState::new(staleness);
        self
    }
}

#[async_trait]
impl OtaProvider for LedvanceProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn compatible_with_device(&self, device: &dyn OtaDevice) -> bool {
        manufacturer_allowed(LEDVANCE_MANUFACTURER_IDS, device)
    }

    fn index_state(&self) -> &IndexState {
        &self.state
    }

    async fn fetch_index(&self) -> Result<Vec<OtaImageMetadata>> {
        let index: LedvanceIndex = fetch_json(&self.client, NAME, &self.url).await?;
        parse_index(index, &self.url, &self.download_url)
    }
}
