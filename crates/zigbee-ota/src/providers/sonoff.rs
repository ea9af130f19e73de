//! SONOFF index

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use zigbee_ota_http::CachingClient;

use super::{IndexState, OtaProvider, fetch_json, manufacturer_allowed};
use crate::device::OtaDevice;
use crate::error::Result;
use crate::metadata::{OtaImageMetadata, TrailingData};

/// Default index location
pub const SONOFF_INDEX_URL: &str = "https://zigbee-ota.sonoff.tech/releases/upgrade.json";

/// Manufacturer codes served by this provider
pub const SONOFF_MANUFACTURER_IDS: &[u16] = &[0x1286];

const NAME: &str = "SONOFF";

#[derive(Debug, Deserialize)]
struct SonoffEntry {
    fw_binary_url: String,
    fw_file_version: u32,
    fw_filesize: u64,
    fw_image_type: u16,
    fw_manufacturer_id: u16,
    model_id: String,
}

fn parse_index(entries: Vec<SonoffEntry>, index_url: &str) -> Vec<OtaImageMetadata> {
    entries
        .into_iter()
        .map(|entry| {
            OtaImageMetadata::builder(entry.fw_file_version)
                .manufacturer_id(entry.fw_manufacturer_id)
                .image_type(entry.fw_image_type)
                .file_size(entry.fw_filesize)
                .model_names([entry.model_id])
                .trailing_data(TrailingData::FoldIntoLastElement)
                .source(format!("{NAME}: {index_url}"))
                .url(entry.fw_binary_url)
                .build()
        })
        .collect()
}

/// Provider for the SONOFF release feed
///
/// Some SONOFF images carry bytes past their declared size; those are folded
/// into the last sub-element.
#[derive(Debug)]
pub struct SonoffProvider {
    client: CachingClient,
    url: String,
    state: IndexState,
}

impl SonoffProvider {
    /// Use the default index URL
    pub fn new(client: CachingClient) -> Self {
        Self::with_url(client, SONOFF_INDEX_URL)
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
impl OtaProvider for SonoffProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn compatible_with_device(&self, device: &dyn OtaDevice) -> bool {
        manufacturer_allowed(SONOFF_MANUFACTURER_IDS, device)
    }

    fn index_state(&self) -> &IndexState {
        &self.state
    }

    async fn fetch_index(&self) -> Result<Vec<OtaImageMetadata>> {
        let entries: Vec<SonoffEntry> = fetch_json(&self.client, NAME, &self.url).await?;
        Ok(parse_index(entries, &self.url))
    }
}
