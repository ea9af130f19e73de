//! Salus Controls index

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use zigbee_ota_http::CachingClient;

use super::{IndexState, OtaProvider, fetch_json, manufacturer_allowed, parse_hex_version};
use crate::device::OtaDevice;
use crate::error::Result;
use crate::metadata::{ImageLocation, OtaImageMetadata};

/// Default index location
pub const SALUS_INDEX_URL: &str = "https://eu.salusconnect.io/demo/default/status/firmware";

const SALUS_MANUFACTURER_ID: u16 = 0x1078;

/// Manufacturer codes served by this provider
pub const SALUS_MANUFACTURER_IDS: &[u16] = &[SALUS_MANUFACTURER_ID];

const NAME: &str = "Salus";

#[derive(Debug, Deserialize)]
struct SalusIndex {
    versions: Vec<SalusEntry>,
}

#[derive(Debug, Deserialize)]
struct SalusEntry {
    model: String,
    version: String,
    url: String,
}

fn parse_index(index: SalusIndex, index_url: &str) -> Result<Vec<OtaImageMetadata>> {
    index
        .versions
        .into_iter()
        .map(|entry| {
            let file_version = parse_hex_version(NAME, &entry.version)?;
            Ok(OtaImageMetadata::builder(file_version)
                .manufacturer_id(SALUS_MANUFACTURER_ID)
                .model_names([entry.model])
                .source(format!("{NAME}: {index_url}"))
                .location(ImageLocation::SalusArchive(entry.url))
                .build())
        })
        .collect()
}

/// Provider for the Salus firmware service
///
/// Images are published as `.tar.gz` archives holding one `.ota` file.
#[derive(Debug)]
pub struct SalusProvider {
    client: CachingClient,
    url: String,
    state: IndexState,
}

impl SalusProvider {
    /// Use the default index URL
    pub fn new(client: CachingClient) -> Self {
        Self::with_url(client, SALUS_INDEX_URL)
    }

    /// Use a custom index URL
    pub fn with_url(client: CachingClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            state: IndexState::default(),
        }
    }

    /// Set the staleness window
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.state = IndexState::new(staleness);
        self
    }
}

#[async_trait]
impl OtaProvider for SalusProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn compatible_with_device(&self, device: &dyn OtaDevice) -> bool {
        manufacturer_allowed(SALUS_MANUFACTURER_IDS, device)
    }

    fn index_state(&self) -> &IndexState {
        &self.state
    }

    async fn fetch_index(&self) -> Result<Vec<OtaImageMetadata>> {
        let index: SalusIndex = fetch_json(&self.client, NAME, &self.url).await?;
        parse_index(index, &self.url)
    }
}
