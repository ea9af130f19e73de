//! Convenience re-exports for common OTA server types

pub use crate::cached_image::CachedImage;
pub use crate::checksum::{Checksum, ChecksumAlgorithm};
pub use crate::config::{OtaConfig, ProviderConfig};
pub use crate::device::{DeviceInfo, ImageRequest, OtaDevice};
pub use crate::error::OtaError;
pub use crate::manager::OtaManager;
pub use crate::metadata::{ImageLocation, OtaImageMetadata, TrailingData};
pub use crate::providers::{
    IkeaProvider, InovelliProvider, LedvanceProvider, LocalFilesProvider, OtaProvider,
    RemoteIndexProvider, SalusProvider, SonoffProvider, ThirdRealityProvider, Z2mIndexSource,
    Z2mProvider,
};
pub use crate::selection::Selection;
pub use zigbee_ota_http::CachingClient;
pub use zigbee_ota_image::{FirmwareImage, OtaImage, OtaImageHeader};
