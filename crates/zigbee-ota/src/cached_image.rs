//! An image ready to be served block by block

use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;
use zigbee_ota_image::FirmwareImage;

use crate::error::{OtaError, Result};
use crate::metadata::OtaImageMetadata;

/// How long a served image stays cached
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(18 * 60 * 60);

/// Minimum lifetime left after a block is served
pub const DELAY_EXPIRY: Duration = Duration::from_secs(2 * 60);

/// Largest block payload returned by [`CachedImage::get_image_block`]
pub const MAXIMUM_DATA_SIZE: usize = 40;

/// A fetched and validated image with its serialized bytes
///
/// Serving a block pushes the expiry out so that an upgrade in progress does
/// not lose its image halfway through.
#[derive(Debug)]
pub struct CachedImage {
    metadata: OtaImageMetadata,
    firmware: FirmwareImage,
    data: Bytes,
    /// `None` when the expiry overflows the clock
    expires_at: Mutex<Option<Instant>>,
}

impl CachedImage {
    /// Wrap a fetched image, expiring after `ttl`
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be serialized.
    pub fn new(metadata: OtaImageMetadata, firmware: FirmwareImage, ttl: Duration) -> Result<Self> {
        let data = Bytes::from(firmware.serialize()?);
        Ok(Self {
            metadata,
            firmware,
            data,
            expires_at: Mutex::new(Instant::now().checked_add(ttl)),
        })
    }

    /// Metadata the image was selected by
    pub fn metadata(&self) -> &OtaImageMetadata {
        &self.metadata
    }

    /// Parsed image
    pub fn firmware(&self) -> &FirmwareImage {
        &self.firmware
    }

    /// Serialized image as sent to the device
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Total image size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image has no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// When the image expires, or `None` if it never does
    pub fn expires_at(&self) -> Option<Instant> {
        *self.expires_at.lock()
    }

    /// Whether the image has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.lock().is_some_and(|at| Instant::now() >= at)
    }

    /// Return up to `max_size` bytes starting at `offset`
    ///
    /// The block is capped at [`MAXIMUM_DATA_SIZE`] bytes and at the end of
    /// the image. An offset equal to the length yields an empty block.
    ///
    /// # Errors
    ///
    /// Returns [`OtaError::BlockOutOfRange`] if `offset` is past the end.
    pub fn get_image_block(&self, offset: u32, max_size: u8) -> Result<&[u8]> {
        let out_of_range = || OtaError::BlockOutOfRange {
            offset,
            length: self.data.len(),
        };
        let start = usize::try_from(offset).ok().ok_or_else(out_of_range)?;
        let remaining = self.data.get(start..).ok_or_else(out_of_range)?;

        let size = usize::from(max_size).min(MAXIMUM_DATA_SIZE).min(remaining.len());
        self.touch();
        Ok(remaining.get(..size).unwrap_or_default())
    }

    fn touch(&self) {
        let now = Instant::now();
        let mut expires_at = self.expires_at.lock();
        if let Some(at) = *expires_at
            && at.saturating_duration_since(now) < DELAY_EXPIRY
        {
            *expires_at = now.checked_add(DELAY_EXPIRY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zigbee_ota_image::{OtaImage, OtaImageHeader, SubElement};

    fn cached(ttl: Duration) -> Result<CachedImage> {
        let firmware = OtaImage::assemble(
            OtaImageHeader::new(0x117C, 0x2101, 2),
            vec![SubElement::upgrade_image(vec![0xAB; 100])],
        )?;
        CachedImage::new(OtaImageMetadata::builder(2).build(), firmware.into(), ttl)
    }

    #[test]
    fn blocks_are_capped() -> Result<()> {
        let image = cached(DEFAULT_EXPIRATION)?;
        assert_eq!(image.len(), 56 + 6 + 100);

        assert_eq!(image.get_image_block(0, 255)?.len(), MAXIMUM_DATA_SIZE);
        assert_eq!(image.get_image_block(0, 10)?.len(), 10);
        assert_eq!(image.get_image_block(150, 64)?.len(), 12);
        assert!(image.get_image_block(162, 64)?.is_empty());
        Ok(())
    }

    #[test]
    fn offset_past_end_is_error() -> Result<()> {
        let image = cached(DEFAULT_EXPIRATION)?;
        assert!(matches!(
            image.get_image_block(163, 10),
            Err(OtaError::BlockOutOfRange {
                offset: 163,
                length: 162
            })
        ));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn serving_a_block_delays_expiry() -> Result<()> {
        let image = cached(Duration::from_secs(60))?;
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!image.is_expired());

        image.get_image_block(0, 40)?;
        tokio::time::advance(Duration::from_secs(119)).await;
        assert!(!image.is_expired());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(image.is_expired());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn long_lived_image_is_not_shortened() -> Result<()> {
        let image = cached(DEFAULT_EXPIRATION)?;
        let before = image.expires_at();
        image.get_image_block(0, 40)?;
        assert_eq!(image.expires_at(), before);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn huge_ttl_never_expires() -> Result<()> {
        let ttl = crate::config::OtaConfig::default()
            .with_image_cache_ttl(Duration::from_secs(u64::MAX))
            .image_cache_ttl();
        let image = cached(ttl)?;
        assert!(image.expires_at().is_none());

        tokio::time::advance(Duration::from_secs(365 * 24 * 60 * 60)).await;
        image.get_image_block(0, 40)?;
        assert!(!image.is_expired());
        Ok(())
    }
}
