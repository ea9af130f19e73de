//! zigbee2mqtt-style index, remote or on disk

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use zigbee_ota_http::CachingClient;

use super::{IndexState, OtaProvider, fetch_json, resolve_url};
use crate::checksum::{Checksum, ChecksumAlgorithm};
use crate::device::OtaDevice;
use crate::error::{OtaError, Result};
use crate::metadata::{ImageLocation, OtaImageMetadata};

const NAME: &str = "Z2M";

/// Where the index lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Z2mIndexSource {
    /// Index served over HTTP
    Url(String),
    /// Index file on disk
    File(PathBuf),
}

impl Z2mIndexSource {
    fn resolve(&self, reference: &str) -> Result<ImageLocation> {
        if Url::parse(reference).is_ok() {
            return Ok(ImageLocation::Url(reference.to_string()));
        }
        match self {
            Z2mIndexSource::Url(base) => Ok(ImageLocation::Url(resolve_url(NAME, base, reference)?)),
            Z2mIndexSource::File(path) => {
                let dir = path.parent().unwrap_or_else(|| Path::new(""));
                Ok(ImageLocation::File(dir.join(reference)))
            }
        }
    }

    fn label(&self) -> String {
        match self {
            Z2mIndexSource::Url(url) => url.clone(),
            Z2mIndexSource::File(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Z2mEntry {
    file_version: u32,
    file_size: u64,
    manufacturer_code: u16,
    image_type: u16,
    sha512: String,
    url: String,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    manufacturer_name: Option<Vec<String>>,
    #[serde(default)]
    min_file_version: Option<u32>,
    #[serde(default)]
    max_file_version: Option<u32>,
    #[serde(default)]
    hardware_version_min: Option<u16>,
    #[serde(default)]
    hardware_version_max: Option<u16>,
    #[serde(default)]
    release_notes: Option<String>,
}

fn parse_index(entries: Vec<Z2mEntry>, source: &Z2mIndexSource) -> Result<Vec<OtaImageMetadata>> {
    let label = source.label();
    entries
        .into_iter()
        .map(|entry| {
            let checksum = Checksum::new(ChecksumAlgorithm::Sha512, &entry.sha512)
                .map_err(|e| OtaError::schema(NAME, format!("{}: {e}", entry.url)))?;

            let mut builder = OtaImageMetadata::builder(entry.file_version)
                .manufacturer_id(entry.manufacturer_code)
                .image_type(entry.image_type)
                .file_size(entry.file_size)
                .checksum(checksum)
                .source(format!("{NAME}: {label}"))
                .location(source.resolve(&entry.url)?);

            if let Some(model) = entry.model_id {
                builder = builder.model_names([model]);
            }
            if let Some(names) = entry.manufacturer_name {
                builder = builder.manufacturer_names(names);
            }
            if let Some(version) = entry.min_file_version {
                builder = builder.min_current_file_version(version);
            }
            if let Some(version) = entry.max_file_version {
                builder = builder.max_current_file_version(version);
            }
            if let Some(version) = entry.hardware_version_min {
                builder = builder.min_hardware_version(version);
            }
            if let Some(version) = entry.hardware_version_max {
                builder = builder.max_hardware_version(version);
            }
            if let Some(notes) = entry.release_notes {
                builder = builder.release_notes(notes);
            }
            Ok(builder.build())
        })
        .collect()
}

/// Provider for a zigbee2mqtt-compatible index
#[derive(Debug)]
pub struct Z2mProvider {
    client: CachingClient,
    source: Z2mIndexSource,
    state: IndexState,
}

impl Z2mProvider {
    /// Load the index from `source`
    pub fn new(client: CachingClient, source: Z2mIndexSource) -> Self {
        Self {
            client,
            source,
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
impl OtaProvider for Z2mProvider {
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
        let entries: Vec<Z2mEntry> = match &self.source {
            Z2mIndexSource::Url(url) => fetch_json(&self.client, NAME, url).await?,
            Z2mIndexSource::File(path) => {
                let data = tokio::fs::read(path).await?;
                serde_json::from_slice(&data).map_err(|e| OtaError::schema(NAME, e.to_string()))?
            }
        };
        parse_index(entries, &self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(url: &str) -> serde_json::Value {
        json!({
            "fileVersion": 16,
            "fileSize": 100,
            "manufacturerCode": 4447,
            "imageType": 1,
            "sha512": "cd".repeat(64),
            "url": url,
            "modelId": "lumi.sensor",
            "hardwareVersionMin": 2
        })
    }

    fn parse(value: serde_json::Value, source: &Z2mIndexSource) -> Result<Vec<OtaImageMetadata>> {
        let entries: Vec<Z2mEntry> = serde_json::from_value(value)?;
        parse_index(entries, source)
    }

    #[test]
    fn relative_urls_follow_index_location() -> Result<()> {
        let remote = Z2mIndexSource::Url("https://z2m.test/ota/index.json".to_string());
        let records = parse(json!([entry("images/a.ota")]), &remote)?;
        assert_eq!(
            records[0].location(),
            Some(&ImageLocation::Url("https://z2m.test/ota/images/a.ota".to_string()))
        );

        let local = Z2mIndexSource::File(PathBuf::from("/srv/ota/index.json"));
        let records = parse(json!([entry("images/a.ota")]), &local)?;
        assert_eq!(
            records[0].location(),
            Some(&ImageLocation::File(PathBuf::from("/srv/ota/images/a.ota")))
        );

        let records = parse(json!([entry("https://cdn.test/a.ota")]), &local)?;
        assert_eq!(
            records[0].location(),
            Some(&ImageLocation::Url("https://cdn.test/a.ota".to_string()))
        );
        Ok(())
    }

    #[test]
    fn optional_fields_narrow_the_record() -> Result<()> {
        let remote = Z2mIndexSource::Url("https://z2m.test/index.json".to_string());
        let records = parse(json!([entry("a.ota")]), &remote)?;
        assert_eq!(records[0].model_names(), ["lumi.sensor".to_string()]);
        assert_eq!(records[0].min_hardware_version(), Some(2));
        assert_eq!(records[0].specificity(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn local_index_is_read_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("index.json");
        tokio::fs::write(&path, serde_json::to_vec(&json!([entry("fw.ota")]))?).await?;

        let provider = Z2mProvider::new(
            CachingClient::with_defaults()?,
            Z2mIndexSource::File(path.clone()),
        );
        let records = provider.load_index().await?;
        assert_eq!(
            records[0].location(),
            Some(&ImageLocation::File(dir.path().join("fw.ota")))
        );
        Ok(())
    }
}
