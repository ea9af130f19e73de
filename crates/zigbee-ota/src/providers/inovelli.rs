//! Inovelli index

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use zigbee_ota_http::CachingClient;

use super::{IndexState, OtaProvider, fetch_json, manufacturer_allowed, parse_hex_version};
use crate::device::OtaDevice;
use crate::error::Result;
use crate::metadata::OtaImageMetadata;

/// Default index location
pub const INOVELLI_INDEX_URL: &str = "https://files.inovelli.com/firmware/firmware-zha-v2.json";

/// Manufacturer codes served by this provider
pub const INOVELLI_MANUFACTURER_IDS: &[u16] = &[0x122F];

/// Release channel offered to devices
const PRODUCTION_CHANNEL: &str = "production";

const NAME: &str = "Inovelli";

#[derive(Debug, Deserialize)]
struct InovelliEntry {
    version: String,
    channel: String,
    firmware: String,
    manufacturer_id: u16,
    image_type: u16,
}

type InovelliIndex = IndexMap<String, Vec<InovelliEntry>>;

fn parse_index(index: InovelliIndex, index_url: &str) -> Result<Vec<OtaImageMetadata>> {
    let mut records = Vec::new();
    for (model, entries) in index {
        for entry in entries {
            // Every entry must parse, whatever its channel
            let file_version = parse_hex_version(NAME, &entry.version)?;
            if entry.channel != PRODUCTION_CHANNEL {
                continue;
            }
            records.push(
                OtaImageMetadata::builder(file_version)
                    .manufacturer_id(entry.manufacturer_id)
                    .image_type(entry.image_type)
                    .model_names([model.clone()])
                    .source(format!("{NAME}: {index_url}"))
                    .url(entry.firmware)
                    .build(),
            );
        }
    }
    Ok(records)
}

/// Provider for Inovelli production firmware
#[derive(Debug)]
pub struct InovelliProvider {
    client: CachingClient,
    url: String,
    state: IndexState,
}

impl InovelliProvider {
    /// Use the default index URL
    pub fn new(client: CachingClient) -> Self {
        Self::with_url(client, INOVELLI_INDEX_URL)
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
impl OtaProvider for InovelliProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn compatible_with_device(&self, device: &dyn OtaDevice) -> bool {
        manufacturer_allowed(INOVELLI_MANUFACTURER_IDS, device)
    }

    fn index_state(&self) -> &IndexState {
        &self.state
    }

    async fn fetch_index(&self) -> Result<Vec<OtaImageMetadata>> {
        let index: InovelliIndex = fetch_json(&self.client, NAME, &self.url).await?;
        parse_index(index, &self.url)
    }
}
