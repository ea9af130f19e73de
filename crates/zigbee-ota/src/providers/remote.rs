//! Canonical JSON index hosted at an arbitrary URL

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use zigbee_ota_http::CachingClient;

use super::{IndexState, OtaProvider, fetch_json, manufacturer_allowed, resolve_url};
use crate::checksum::Checksum;
use crate::device::OtaDevice;
use crate::error::{OtaError, Result};
use crate::metadata::OtaImageMetadata;

const NAME: &str = "remote index";

/// One record of the canonical index
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexEntry {
    #[serde(default)]
    binary_url: Option<String>,
    #[serde(default)]
    path: Option<String>,
    file_version: u32,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    image_type: Option<u16>,
    #[serde(default)]
    manufacturer_id: Option<u16>,
    #[serde(default)]
    manufacturer_names: Vec<String>,
    #[serde(default)]
    model_names: Vec<String>,
    #[serde(default)]
    checksum: Option<Checksum>,
    #[serde(default)]
    changelog: Option<String>,
    #[serde(default)]
    release_notes: Option<String>,
    #[serde(default)]
    min_hardware_version: Option<u16>,
    #[serde(default)]
    max_hardware_version: Option<u16>,
    #[serde(default)]
    min_current_file_version: Option<u32>,
    #[serde(default)]
    max_current_file_version: Option<u32>,
    #[serde(default)]
    specificity: Option<i32>,
}

impl IndexEntry {
    fn into_metadata(self, index_url: &str) -> Result<OtaImageMetadata> {
        let url = match (self.binary_url, self.path) {
            (Some(url), None) => url,
            (None, Some(path)) => resolve_url(NAME, index_url, &path)?,
            (Some(_), Some(_)) => {
                return Err(OtaError::schema(
                    NAME,
                    "`binary_url` and `path` are mutually exclusive",
                ));
            }
            (None, None) => {
                return Err(OtaError::schema(NAME, "one of `binary_url` or `path` is required"));
            }
        };

        let mut builder = OtaImageMetadata::builder(self.file_version)
            .manufacturer_names(self.manufacturer_names)
            .model_names(self.model_names)
            .source(format!("{NAME}: {index_url}"))
            .url(url);

        if let Some(size) = self.file_size {
            builder = builder.file_size(size);
        }
        if let Some(image_type) = self.image_type {
            builder = builder.image_type(image_type);
        }
        if let Some(id) = self.manufacturer_id {
            builder = builder.manufacturer_id(id);
        }
        if let Some(checksum) = self.checksum {
            builder = builder.checksum(checksum);
        }
        if let Some(changelog) = self.changelog {
            builder = builder.changelog(changelog);
        }
        if let Some(notes) = self.release_notes {
            builder = builder.release_notes(notes);
        }
        if let Some(version) = self.min_hardware_version {
            builder = builder.min_hardware_version(version);
        }
        if let Some(version) = self.max_hardware_version {
            builder = builder.max_hardware_version(version);
        }
        if let Some(version) = self.min_current_file_version {
            builder = builder.min_current_file_version(version);
        }
        if let Some(version) = self.max_current_file_version {
            builder = builder.max_current_file_version(version);
        }
        if let Some(specificity) = self.specificity {
            builder = builder.specificity(specificity);
        }

        Ok(builder.build())
    }
}

fn parse_index(entries: Vec<IndexEntry>, index_url: &str) -> Result<Vec<OtaImageMetadata>> {
    entries
        .into_iter()
        .map(|entry| entry.into_metadata(index_url))
        .collect()
}

/// Provider for a self-hosted index in the canonical format
///
/// Compatible with every device unless restricted to a set of manufacturer
/// codes; records carry their own matching rules.
#[derive(Debug)]
pub struct RemoteIndexProvider {
    client: CachingClient,
    url: String,
    manufacturer_ids: Option<Vec<u16>>,
    state: IndexState,
}

impl RemoteIndexProvider {
    /// Load the index at `url`
    pub fn new(client: CachingClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            manufacturer_ids: None,
            state: IndexState::default(),
        }
    }

    /// Only serve devices with one of these manufacturer codes
    pub fn with_manufacturer_ids(mut self, ids: impl Into<Vec<u16>>) -> Self {
        self.manufacturer_ids = Some(ids.into());
        self
    }

    /// Set the staleness window
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.state = IndexState::new(staleness);
        self
    }
}

#[async_trait]
impl OtaProvider for RemoteIndexProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn compatible_with_device(&self, device: &dyn OtaDevice) -> bool {
        self.manufacturer_ids
            .as_deref()
            .is_none_or(|ids| manufacturer_allowed(ids, device))
    }

    fn index_state(&self) -> &IndexState {
        &self.state
    }

    async fn fetch_index(&self) -> Result<Vec<OtaImageMetadata>> {
        let entries: Vec<IndexEntry> = fetch_json(&self.client, NAME, &self.url).await?;
        parse_index(entries, &self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use crate::metadata::ImageLocation;
    use serde_json::json;

    const INDEX_URL: &str = "https://ota.example.com/index/index.json";

    fn parse(value: serde_json::Value) -> Result<Vec<OtaImageMetadata>> {
        let entries: Vec<IndexEntry> =
            serde_json::from_value(value).map_err(|e| OtaError::schema(NAME, e.to_string()))?;
        parse_index(entries, INDEX_URL)
    }

    #[test]
    fn path_resolves_against_index() -> Result<()> {
        let records = parse(json!([
            {"path": "../images/a.ota", "file_version": 2, "model_names": ["lumi.switch"]},
            {"binary_url": "https://cdn.example.com/b.ota", "file_version": 3, "specificity": 7}
        ]))?;

        assert_eq!(
            records[0].location(),
            Some(&ImageLocation::Url("https://ota.example.com/images/a.ota".to_string()))
        );
        assert_eq!(records[0].specificity(), 1);
        assert_eq!(records[1].specificity(), 7);
        Ok(())
    }

    #[test]
    fn location_is_required_and_exclusive() {
        assert!(matches!(
            parse(json!([{"file_version": 1}])),
            Err(OtaError::Schema { .. })
        ));
        assert!(matches!(
            parse(json!([{"file_version": 1, "path": "a.ota", "binary_url": "https://x/a.ota"}])),
            Err(OtaError::Schema { .. })
        ));
    }

    #[test]
    fn checksum_must_be_well_formed() {
        assert!(matches!(
            parse(json!([{"file_version": 1, "path": "a.ota", "checksum": "sha256:1234"}])),
            Err(OtaError::Schema { .. })
        ));
    }

    #[test]
    fn manufacturer_restriction_is_optional() -> Result<()> {
        let client = CachingClient::with_defaults()?;
        let device = DeviceInfo::new("m", "Acme", 0x1234);

        let open = RemoteIndexProvider::new(client.clone(), INDEX_URL);
        assert!(open.compatible_with_device(&device));

        let restricted = RemoteIndexProvider::new(client, INDEX_URL).with_manufacturer_ids([0x1111]);
        assert!(!restricted.compatible_with_device(&device));
        Ok(())
    }
}
