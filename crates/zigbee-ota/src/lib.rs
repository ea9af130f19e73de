//! Zigbee OTA image server
//!
//! Answers a device's Query Next Image request with the best firmware image
//! published by any of a set of vendor indexes, and serves that image block by
//! block.
//!
//! # Architecture
//!
//! - [`manager`]: The [`OtaManager`] that aggregates providers and caches images
//! - [`providers`]: Vendor index providers and the staleness gate they share
//! - [`metadata`]: Immutable image descriptors and their matching rules
//! - [`selection`]: Ranking candidates down to one image
//! - [`fetch`]: Downloading and verifying image bytes
//! - [`cached_image`]: Block serving with sliding expiry
//! - [`checksum`]: Declared digests (`sha256`, `sha512`, `sha3-256`)
//! - [`device`]: The device and request an image is looked up for
//! - [`config`]: Serde configuration
//! - [`error`]: Error types
//!
//! Parsing lives in `zigbee-ota-image`, firmware validation in
//! `zigbee-ota-validators` and HTTP caching in `zigbee-ota-http`.
//!
//! # Example
//!
//! ```ignore
//! use zigbee_ota::prelude::*;
//!
//! # async fn example() -> Result<(), OtaError> {
//! let manager = OtaManager::from_config(&OtaConfig::default())?;
//!
//! let device = DeviceInfo::new("TRADFRI bulb E27 WS opal 980lm", "IKEA of Sweden", 0x117C);
//! let request = ImageRequest::new(0x117C, 0x2101, 0x1000_0000);
//!
//! if let Some(image) = manager.get_ota_image(&device, &request).await? {
//!     let block = image.get_image_block(0, 40)?;
//!     println!("first block: {} bytes of {}", block.len(), image.len());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cached_image;
pub mod checksum;
pub mod config;
pub mod device;
pub mod error;
pub mod fetch;
pub mod manager;
pub mod metadata;
pub mod prelude;
pub mod providers;
pub mod selection;

pub use cached_image::{CachedImage, DEFAULT_EXPIRATION, DELAY_EXPIRY, MAXIMUM_DATA_SIZE};
pub use checksum::{Checksum, ChecksumAlgorithm};
pub use config::{OtaConfig, ProviderConfig, build_providers};
pub use device::{DeviceInfo, ImageRequest, OtaDevice, QUERY_HARDWARE_VERSION_PRESENT};
pub use error::{OtaError, Result};
pub use fetch::extract_ota_member;
pub use manager::OtaManager;
pub use metadata::{
    ImageLocation, OtaImageMetadata, OtaImageMetadataBuilder, OtaImageWithMetadata, TrailingData,
};
pub use providers::{IndexState, OtaProvider};
pub use selection::{Selection, select_candidate};
