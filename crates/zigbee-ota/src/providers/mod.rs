//! Image index providers
//!
//! Each provider turns one vendor's index into [`OtaImageMetadata`] records.
//! Loading is gated by a per-provider [`IndexState`]: the index is fetched at
//! most once per staleness window, overlapping callers reuse the previous
//! records, and a failed fetch leaves the provider due for an immediate retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zigbee_ota_http::CachingClient;

use crate::device::OtaDevice;
use crate::error::{OtaError, Result};
use crate::metadata::OtaImageMetadata;

mod ikea;
mod inovelli;
mod ledvance;
mod local_files;
mod remote;
mod salus;
mod sonoff;
mod third_reality;
mod z2m;

pub use ikea::{IKEA_INDEX_URL, IKEA_MANUFACTURER_IDS, IkeaProvider};
pub use inovelli::{INOVELLI_INDEX_URL, INOVELLI_MANUFACTURER_IDS, InovelliProvider};
pub use ledvance::{
    LEDVANCE_DOWNLOAD_URL, LEDVANCE_INDEX_URL, LEDVANCE_MANUFACTURER_IDS, LedvanceProvider,
};
pub use local_files::LocalFilesProvider;
pub use remote::RemoteIndexProvider;
pub use salus::{SALUS_INDEX_URL, SALUS_MANUFACTURER_IDS, SalusProvider};
pub use sonoff::{SONOFF_INDEX_URL, SONOFF_MANUFACTURER_IDS, SonoffProvider};
pub use third_reality::{
    THIRD_REALITY_INDEX_URL, THIRD_REALITY_MANUFACTURER_IDS, ThirdRealityProvider,
};
pub use z2m::{Z2mIndexSource, Z2mProvider};

/// How long a loaded index is reused before it is fetched again
pub const DEFAULT_INDEX_STALENESS: Duration = Duration::from_secs(24 * 60 * 60);

/// Records sharing this key describe the same image slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdentityKey {
    manufacturer_id: Option<u16>,
    image_type: Option<u16>,
    model_names: Vec<String>,
    manufacturer_names: Vec<String>,
}

impl IdentityKey {
    fn of(meta: &OtaImageMetadata) -> Self {
        Self {
            manufacturer_id: meta.manufacturer_id(),
            image_type: meta.image_type(),
            model_names: meta.model_names().to_vec(),
            manufacturer_names: meta.manufacturer_names().to_vec(),
        }
    }
}

#[derive(Debug)]
struct IndexInner {
    last_refresh: Option<Instant>,
    records: Arc<[OtaImageMetadata]>,
}

/// Staleness gate and last loaded records of one provider
#[derive(Debug)]
pub struct IndexState {
    staleness: Duration,
    inner: Mutex<IndexInner>,
}

impl Default for IndexState {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_STALENESS)
    }
}

/// Result of checking the gate
#[derive(Debug)]
pub enum RefreshDecision {
    /// The records are fresh enough, or another caller is refreshing them
    Fresh(Arc<[OtaImageMetadata]>),
    /// The caller must fetch; carries the stamp to restore on failure
    Due(Option<Instant>),
}

impl IndexState {
    /// Create a gate with the given staleness window
    pub fn new(staleness: Duration) -> Self {
        Self {
            staleness,
            inner: Mutex::new(IndexInner {
                last_refresh: None,
                records: Arc::from(Vec::new()),
            }),
        }
    }

    /// Staleness window
    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// When the index was last refreshed
    pub fn last_refresh(&self) -> Option<Instant> {
        self.inner.lock().last_refresh
    }

    /// Most recently stored records
    pub fn records(&self) -> Arc<[OtaImageMetadata]> {
        Arc::clone(&self.inner.lock().records)
    }

    /// Decide whether the caller has to fetch
    ///
    /// When a fetch is due the refresh time is stamped immediately, so
    /// callers arriving while the fetch runs see the index as fresh.
    pub fn begin_refresh(&self) -> RefreshDecision {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.last_refresh {
            Some(last) if now.saturating_duration_since(last) < self.staleness => {
                RefreshDecision::Fresh(Arc::clone(&inner.records))
            }
            previous => {
                inner.last_refresh = Some(now);
                RefreshDecision::Due(previous)
            }
        }
    }

    /// Put back the stamp taken by [`Self::begin_refresh`] after a failure
    pub fn restore(&self, previous: Option<Instant>) {
        self.inner.lock().last_refresh = previous;
    }

    /// Store freshly fetched records
    ///
    /// Records with the same identity are collapsed; the last one wins but
    /// keeps the position of the first.
    pub fn store(&self, records: Vec<OtaImageMetadata>) -> Arc<[OtaImageMetadata]> {
        let mut unique: IndexMap<IdentityKey, OtaImageMetadata> = IndexMap::new();
        for record in records {
            unique.insert(IdentityKey::of(&record), record);
        }
        let records: Arc<[OtaImageMetadata]> = unique.into_values().collect();
        self.inner.lock().records = Arc::clone(&records);
        records
    }

    /// Forget the refresh time so the next load fetches
    pub fn reset(&self) {
        self.inner.lock().last_refresh = None;
    }
}

/// Puts the refresh stamp back unless the fetch it covers stores records
///
/// Dropping the guard early, including when the loading future is cancelled
/// mid-fetch, leaves the provider due for an immediate retry.
struct RefreshGuard<'a> {
    state: &'a IndexState,
    previous: Option<Option<Instant>>,
}

impl<'a> RefreshGuard<'a> {
    fn new(state: &'a IndexState, previous: Option<Instant>) -> Self {
        Self {
            state,
            previous: Some(previous),
        }
    }

    fn complete(mut self) {
        self.previous = None;
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.state.restore(previous);
        }
    }
}

/// A source of image metadata
#[async_trait]
pub trait OtaProvider: Send + Sync {
    /// Human readable provider name
    fn name(&self) -> &str;

    /// Whether this provider can have images for `device`
    fn compatible_with_device(&self, device: &dyn OtaDevice) -> bool;

    /// Staleness gate owned by this provider
    fn index_state(&self) -> &IndexState;

    /// Fetch and decode the whole index
    ///
    /// Implementations reject the entire index if any record is malformed.
    async fn fetch_index(&self) -> Result<Vec<OtaImageMetadata>>;

    /// Return the index, fetching it only if it has gone stale
    async fn load_index(&self) -> Result<Arc<[OtaImageMetadata]>> {
        let state = self.index_state();
        let previous = match state.begin_refresh() {
            RefreshDecision::Fresh(records) => {
                debug!("Using cached {} index ({} images)", self.name(), records.len());
                return Ok(records);
            }
            RefreshDecision::Due(previous) => previous,
        };

        let guard = RefreshGuard::new(state, previous);
        match self.fetch_index().await {
            Ok(records) => {
                let records = state.store(records);
                guard.complete();
                info!("Loaded {} images from {}", records.len(), self.name());
                Ok(records)
            }
            Err(e) => {
                drop(guard);
                warn!("Failed to load {} index: {}", self.name(), e);
                Err(e)
            }
        }
    }

    /// Fetch the index regardless of staleness
    async fn refresh(&self) -> Result<Arc<[OtaImageMetadata]>> {
        self.index_state().reset();
        self.load_index().await
    }
}

/// Whether the device's manufacturer code is in `allowed`
pub fn manufacturer_allowed(allowed: &[u16], device: &dyn OtaDevice) -> bool {
    device
        .manufacturer_id()
        .is_some_and(|id| allowed.contains(&id))
}

/// GET `url` and decode it as `T`, blaming `provider` for schema errors
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    client: &CachingClient,
    provider: &str,
    url: &str,
) -> Result<T> {
    let response = client
        .get_url(url, Duration::ZERO)
        .await?
        .error_for_status()?;
    serde_json::from_slice(&response.body).map_err(|e| OtaError::schema(provider, e.to_string()))
}

/// Parse a hexadecimal file version, with or without a `0x` prefix
pub(crate) fn parse_hex_version(provider: &str, text: &str) -> Result<u32> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16)
        .map_err(|e| OtaError::schema(provider, format!("invalid version {text:?}: {e}")))
}

/// Resolve `reference` against the URL of the index that contained it
pub(crate) fn resolve_url(provider: &str, base: &str, reference: &str) -> Result<String> {
    let base = Url::parse(base)
        .map_err(|e| OtaError::Config(format!("invalid {provider} index URL {base:?}: {e}")))?;
    base.join(reference)
        .map(String::from)
        .map_err(|e| OtaError::schema(provider, format!("invalid image URL {reference:?}: {e}")))
}
