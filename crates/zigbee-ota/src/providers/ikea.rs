//! IKEA TRÅDFRI index

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
pub const IKEA_INDEX_URL: &str = "https://fw.ota.homesmart.ikea.com/DIRIGERA/version_info.json";

/// Manufacturer codes served by this provider
pub const IKEA_MANUFACTURER_IDS: &[u16] = &[0x117C];

/// Entry type used for gateway firmware
const GATEWAY_FW_TYPE: u8 = 3;

const NAME: &str = "IKEA";

#[derive(Debug, Deserialize)]
struct IkeaEntry {
    fw_type: u8,
    fw_binary_url: String,
    #[serde(default)]
    fw_image_type: Option<u16>,
    #[serde(default)]
    fw_sha3_256: Option<String>,
    #[serde(default, rename = "fw_file_version_MSB")]
    fw_file_version_msb: Option<u16>,
    #[serde(default, rename = "fw_file_version_LSB")]
    fw_file_version_lsb: Option<u16>,
    #[serde(default)]
    fw_manufacturer_id: Option<u16>,
    #[serde(default)]
    fw_filesize: Option<u64>,
}

fn required<T>(value: Option<T>, field: &str, url: &str) -> Result<T> {
    value.ok_or_else(|| OtaError::schema(NAME, format!("{url}: missing field `{field}`")))
}

fn parse_index(entries: Vec<IkeaEntry>, index_url: &str) -> Result<Vec<OtaImageMetadata>> {
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some(image_type) = entry.fw_image_type else {
            continue;
        };
        if entry.fw_type == GATEWAY_FW_TYPE {
            continue;
        }

        let url = entry.fw_binary_url.as_str();
        let msb = required(entry.fw_file_version_msb, "fw_file_version_MSB", url)?;
        let lsb = required(entry.fw_file_version_lsb, "fw_file_version_LSB", url)?;
        let manufacturer_id = required(entry.fw_manufacturer_id, "fw_manufacturer_id", url)?;
        let digest = required(entry.fw_sha3_256.as_deref(), "fw_sha3_256", url)?;
        let checksum = Checksum::new(ChecksumAlgorithm::Sha3_256, digest)
            .map_err(|e| OtaError::schema(NAME, format!("{url}: {e}")))?;

        let mut builder = OtaImageMetadata::builder((u32::from(msb) << 16) | u32::from(lsb))
            .manufacturer_id(manufacturer_id)
            .image_type(image_type)
            .checksum(checksum)
            .source(format!("{NAME}: {index_url}"))
            .url(entry.fw_binary_url.clone());
        if let Some(size) = entry.fw_filesize {
            builder = builder.file_size(size);
        }
        records.push(builder.build());
    }

    Ok(records)
}

/// Provider for the IKEA firmware feed
#[derive(Debug)]
pub struct IkeaProvider {
    client: CachingClient,
    url: String,
    state: IndexState,
}

impl IkeaProvider {
    /// Use the default index URL
    pub fn new(client: CachingClient) -> Self {
        Self::with_url(client, IKEA_INDEX_URL)
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
impl OtaProvider for IkeaProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn compatible_with_device(&self, device: &dyn OtaDevice) -> bool {
        manufacturer_allowed(IKEA_MANUFACTURER_IDS, device)
    }

    fn index_state(&self) -> &IndexState {
        &self.state
    }

    async fn fetch_index(&self) -> Result<Vec<OtaImageMetadata>> {
        let entries: Vec<IkeaEntry> = fetch_json(&self.client, NAME, &self.url).await?;
        parse_index(entries, &self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SHA3: &str = "2f3ef4c38bb1d82ae8c0c26c7bb0e36a0fdd2fd4e8e70e94d2f2d6ba5ff1cf14";

    fn entries(value: serde_json::Value) -> Result<Vec<IkeaEntry>> {
        Ok(serde_json::from_value(value)?)
    }

    #[test]
    fn gateway_entries_are_skipped() -> Result<()> {
        let index = entries(json!([
            {
                "fw_type": 3,
                "fw_binary_url": "https://ikea.test/gateway.bin",
                "fw_update_prio": 5
            },
            {
                "fw_type": 2,
                "fw_image_type": 4353,
                "fw_file_version_MSB": 0x0102,
                "fw_file_version_LSB": 0x0304,
                "fw_manufacturer_id": 0x117C,
                "fw_sha3_256": SHA3,
                "fw_binary_url": "https://ikea.test/bulb.ota"
            }
        ]))?;

        let records = parse_index(index, IKEA_INDEX_URL)?;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.file_version(), 0x0102_0304);
        assert_eq!(record.image_type(), Some(4353));
        assert_eq!(
            record.checksum().map(|c| c.algorithm),
            Some(ChecksumAlgorithm::Sha3_256)
        );
        Ok(())
    }

    #[test]
    fn bad_digest_rejects_whole_index() -> Result<()> {
        let index = entries(json!([
            {
                "fw_type": 2,
                "fw_image_type": 1,
                "fw_file_version_MSB": 1,
                "fw_file_version_LSB": 1,
                "fw_manufacturer_id": 0x117C,
                "fw_sha3_256": "not-hex",
                "fw_binary_url": "https://ikea.test/a.ota"
            }
        ]))?;
        assert!(matches!(
            parse_index(index, IKEA_INDEX_URL),
            Err(OtaError::Schema { .. })
        ));
        Ok(())
    }

    #[test]
    fn only_ikea_devices_are_compatible() -> Result<()> {
        use crate::device::DeviceInfo;

        let provider = IkeaProvider::new(CachingClient::with_defaults()?);
        assert!(provider.compatible_with_device(&DeviceInfo::new("bulb", "IKEA of Sweden", 0x117C)));
        assert!(!provider.compatible_with_device(&DeviceInfo::new("bulb", "Other", 0x1189)));
        assert!(!provider.compatible_with_device(&DeviceInfo::default()));
        Ok(())
    }
}
