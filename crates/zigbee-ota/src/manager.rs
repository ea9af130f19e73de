//! OTA image server: aggregates providers, selects and serves images
//!
//! A lookup for a device runs in four steps:
//! 1. Load the index of every provider compatible with the device,
//!    concurrently. A provider that fails is logged and skipped.
//! 2. Select one candidate with [`select_candidate`].
//! 3. Fetch it, verify size and checksum, and validate embedded firmware.
//! 4. Memoize the result so repeated block requests reuse the same image.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use zigbee_ota_http::CachingClient;
use zigbee_ota_validators::{ValidationResult, validate_ota_image};

use crate::cached_image::{CachedImage, DEFAULT_EXPIRATION};
use crate::config::{OtaConfig, build_providers};
use crate::device::{ImageRequest, OtaDevice};
use crate::error::Result;
use crate::metadata::OtaImageMetadata;
use crate::providers::OtaProvider;
use crate::selection::{Selection, select_candidate};

/// Memo key: the request plus the device fields metadata can match on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequestIdentity {
    request: ImageRequest,
    model: Option<String>,
    manufacturer: Option<String>,
}

impl RequestIdentity {
    fn new(device: &dyn OtaDevice, request: &ImageRequest) -> Self {
        Self {
            request: *request,
            model: device.model().map(str::to_string),
            manufacturer: device.manufacturer().map(str::to_string),
        }
    }
}

/// Serves OTA images to devices from a set of providers
pub struct OtaManager {
    client: CachingClient,
    providers: Vec<Arc<dyn OtaProvider>>,
    image_cache_ttl: Duration,
    images: Mutex<HashMap<RequestIdentity, Arc<CachedImage>>>,
}

impl std::fmt::Debug for OtaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("OtaManager")
            .field("providers", &names)
            .field("image_cache_ttl", &self.image_cache_ttl)
            .field("cached_images", &self.images.lock().len())
            .finish()
    }
}

impl OtaManager {
    /// Create a manager with the providers named in `config`
    ///
    /// # Errors
    ///
    /// Returns an error if a provider entry is inconsistent.
    pub fn new(config: &OtaConfig, client: CachingClient) -> Result<Self> {
        config.validate()?;
        let providers = build_providers(config, &client)?;
        Ok(Self::with_providers(client, providers).with_image_cache_ttl(config.image_cache_ttl()))
    }

    /// Create a manager and its HTTP client from `config`
    pub fn from_config(config: &OtaConfig) -> Result<Self> {
        let client = CachingClient::new(config.client_config())?;
        Self::new(config, client)
    }

    /// Create a manager with explicit providers
    pub fn with_providers(client: CachingClient, providers: Vec<Arc<dyn OtaProvider>>) -> Self {
        Self {
            client,
            providers,
            image_cache_ttl: DEFAULT_EXPIRATION,
            images: Mutex::new(HashMap::new()),
        }
    }

    /// Set how long served images stay cached
    pub fn with_image_cache_ttl(mut self, ttl: Duration) -> Self {
        self.image_cache_ttl = ttl;
        self
    }

    /// Configured providers
    pub fn providers(&self) -> &[Arc<dyn OtaProvider>] {
        &self.providers
    }

    /// Shared HTTP client
    pub fn client(&self) -> &CachingClient {
        &self.client
    }

    /// Find, fetch and cache the image to offer `device` for `request`
    ///
    /// Returns `Ok(None)` when no provider has a suitable newer image or the
    /// best candidates are ambiguous. Repeated calls for the same request and
    /// device return the same cached image until it expires.
    ///
    /// # Errors
    ///
    /// Fails if the selected image cannot be fetched, does not match its
    /// declared size or checksum, or contains corrupt firmware. The next best
    /// candidate is not tried.
    pub async fn get_ota_image(
        &self,
        device: &dyn OtaDevice,
        request: &ImageRequest,
    ) -> Result<Option<Arc<CachedImage>>> {
        let identity = RequestIdentity::new(device, request);
        if let Some(image) = self.cached(&identity) {
            debug!(
                "Serving cached image {:#010x} for {:04x}:{:04x}",
                image.metadata().file_version(),
                request.manufacturer_code,
                request.image_type
            );
            return Ok(Some(image));
        }

        let candidates = self.load_candidates(device).await;
        let metadata = match select_candidate(&candidates, device, request) {
            Selection::Found(metadata) => metadata,
            Selection::Ambiguous(_) | Selection::None => return Ok(None),
        };

        let firmware = metadata.fetch(&self.client).await?;
        match validate_ota_image(&firmware)? {
            ValidationResult::Valid => debug!("Embedded firmware of {} is valid", metadata.source()),
            ValidationResult::Unknown => {
                debug!("Embedded firmware of {} has no known format", metadata.source())
            }
        }

        info!(
            "Selected image {:#010x} for {:04x}:{:04x} from {}",
            metadata.file_version(),
            request.manufacturer_code,
            request.image_type,
            metadata.source()
        );

        let image = Arc::new(CachedImage::new(metadata, firmware, self.image_cache_ttl)?);
        Ok(Some(self.remember(identity, image)))
    }

    /// Every candidate compatible with `device` and `request`, newest first
    ///
    /// Unlike [`Self::get_ota_image`] this ignores the version window and
    /// specificity ranking and never fetches images.
    pub async fn available_images(
        &self,
        device: &dyn OtaDevice,
        request: &ImageRequest,
    ) -> Vec<OtaImageMetadata> {
        let mut images: Vec<OtaImageMetadata> = self
            .load_candidates(device)
            .await
            .into_iter()
            .filter(|meta| meta.check_compatibility(device, request))
            .collect();
        images.sort_by(|a, b| b.file_version().cmp(&a.file_version()));
        images
    }

    /// Force every provider to fetch its index on next use
    pub fn invalidate_indexes(&self) {
        for provider in &self.providers {
            provider.index_state().reset();
        }
    }

    /// Drop every cached image and HTTP response
    pub fn clear_cache(&self) {
        self.images.lock().clear();
        self.client.clear();
    }

    /// Drop expired images and responses, returning how many images were removed
    pub fn sweep_expired(&self) -> usize {
        let removed = {
            let mut images = self.images.lock();
            let before = images.len();
            images.retain(|_, image| !image.is_expired());
            before.saturating_sub(images.len())
        };
        let responses = self.client.sweep();
        if removed > 0 || responses > 0 {
            debug!("Swept {} images and {} responses", removed, responses);
        }
        removed
    }

    /// Number of memoized images, including expired ones not yet swept
    pub fn cached_image_count(&self) -> usize {
        self.images.lock().len()
    }

    fn cached(&self, identity: &RequestIdentity) -> Option<Arc<CachedImage>> {
        let mut images = self.images.lock();
        match images.get(identity) {
            Some(image) if image.is_expired() => {
                images.remove(identity);
                None
            }
            Some(image) => Some(Arc::clone(image)),
            None => None,
        }
    }

    /// Store `image` unless a concurrent lookup already stored a live one
    fn remember(&self, identity: RequestIdentity, image: Arc<CachedImage>) -> Arc<CachedImage> {
        match self.images.lock().entry(identity) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired() {
                    entry.insert(Arc::clone(&image));
                    image
                } else {
                    Arc::clone(entry.get())
                }
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(image)),
        }
    }

    async fn load_candidates(&self, device: &dyn OtaDevice) -> Vec<OtaImageMetadata> {
        let loads = self
            .providers
            .iter()
            .filter(|provider| provider.compatible_with_device(device))
            .map(|provider| async move { (provider.name(), provider.load_index().await) });

        let mut candidates = Vec::new();
        for (name, result) in join_all(loads).await {
            match result {
                Ok(records) => candidates.extend(records.iter().cloned()),
                Err(e) => warn!("Skipping provider {}: {}", name, e),
            }
        }
        candidates
    }
}
