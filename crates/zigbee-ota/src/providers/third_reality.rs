//! Third Reality index

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use zigbee_ota_http::CachingClient;

use super::{IndexState, OtaProvider, fetch_json, manufacturer_allowed};
use crate::device::OtaDevice;
use crate::error::Result;
use crate::metadata::OtaImageMetadata;

/// Default index location
pub const THIRD_REALITY_INDEX_URL: &str = "https://tr-zha.s3.amazonaws.com/firmware.json";

/// Manufacturer codes served by this provider
pub const THIRD_REALITY_MANUFACTURER_IDS: &[u16] = &[0x1233, 0x130D, 0x1407];

const NAME: &str = "Third Reality";

#[derive(Debug, Deserialize)]
struct ThirdRealityIndex {
    versions: Vec<ThirdRealityEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThirdRealityEntry {
    model_id: String,
    url: String,
    image_type: u16,
    manufacturer_id: u16,
    file_version: u32,
}

fn parse_index(index: ThirdRealityIndex, index_url: &str) -> Vec<OtaImageMetadata> {
    index
        .versions
        .into_iter()
        .map(|entry| {
            OtaImageMetadata::builder(entry.file_version)
                .manufacturer_id(entry.manufacturer_id)
                .image_type(entry.image_type)
                .model_names([entry.model_id])
                .source(format!("{NAME}: {index_url}"))
                .url(entry.url)
                .build()
        })
        .collect()
}

/// Provider for Third Reality firmware
#[derive(Debug)]
pub struct ThirdRealityProvider {
    client: CachingClient,
    url: String,
    state: IndexState,
}

impl ThirdRealityProvider {
    /// Use the default index URL
    pub fn new(client: CachingClient) -> Self {
        Self::with_url(client, THIRD_REALITY_INDEX_URL)
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
impl OtaProvider for ThirdRealityProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn compatible_with_device(&self, device: &dyn OtaDevice) -> bool {
        manufacturer_allowed(THIRD_REALITY_MANUFACTURER_IDS, device)
    }

    fn index_state(&self) -> &IndexState {
        &self.state
    }

    async fn fetch_index(&self) -> Result<Vec<OtaImageMetadata>> {
        let index: ThirdRealityIndex = fetch_json(&self.client, NAME, &self.url).await?;
        Ok(parse_index(index, &self.url))
    }
}
