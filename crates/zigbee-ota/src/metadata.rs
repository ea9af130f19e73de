//! Image metadata and matching rules
//!
//! An [`OtaImageMetadata`] describes a candidate image without holding its
//! bytes. Providers build these from vendor indexes; the manager filters them
//! with [`OtaImageMetadata::check_compatibility`] and
//! [`OtaImageMetadata::check_version`], then ranks the survivors by
//! [`OtaImageMetadata::specificity`].
//!
//! Metadata is immutable. Changes go through [`OtaImageMetadata::to_builder`]
//! or one of the `with_*` methods, which return a new value.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use zigbee_ota_image::FirmwareImage;

use crate::checksum::Checksum;
use crate::device::{ImageRequest, OtaDevice};

/// Where an image's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    /// Plain HTTP download
    Url(String),
    /// File on the local filesystem
    File(PathBuf),
    /// `.tar.gz` download holding a single `.ota` file
    SalusArchive(String),
    /// Bytes already in memory
    Embedded(Bytes),
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLocation::Url(url) => f.write_str(url),
            ImageLocation::File(path) => write!(f, "{}", path.display()),
            ImageLocation::SalusArchive(url) => write!(f, "{url} (archive)"),
            ImageLocation::Embedded(bytes) => write!(f, "<{} embedded bytes>", bytes.len()),
        }
    }
}

/// What to do with bytes found after the declared end of an image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TrailingData {
    /// Trailing bytes are a format error
    #[default]
    Reject,
    /// Append trailing bytes to the last sub-element
    FoldIntoLastElement,
}

/// Descriptor of a candidate firmware image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtaImageMetadata {
    file_version: u32,
    manufacturer_id: Option<u16>,
    image_type: Option<u16>,
    checksum: Option<Checksum>,
    file_size: Option<u64>,
    manufacturer_names: Vec<String>,
    model_names: Vec<String>,
    changelog: Option<String>,
    release_notes: Option<String>,
    min_hardware_version: Option<u16>,
    max_hardware_version: Option<u16>,
    min_current_file_version: Option<u32>,
    max_current_file_version: Option<u32>,
    specificity: Option<i32>,
    source: String,
    location: Option<ImageLocation>,
    trailing_data: TrailingData,
}

impl OtaImageMetadata {
    /// Start building metadata for `file_version`
    pub fn builder(file_version: u32) -> OtaImageMetadataBuilder {
        OtaImageMetadataBuilder {
            inner: Self {
                file_version,
                manufacturer_id: None,
                image_type: None,
                checksum: None,
                file_size: None,
                manufacturer_names: Vec::new(),
                model_names: Vec::new(),
                changelog: None,
                release_notes: None,
                min_hardware_version: None,
                max_hardware_version: None,
                min_current_file_version: None,
                max_current_file_version: None,
                specificity: None,
                source: String::new(),
                location: None,
                trailing_data: TrailingData::Reject,
            },
        }
    }

    /// Builder initialized from this value
    pub fn to_builder(&self) -> OtaImageMetadataBuilder {
        OtaImageMetadataBuilder {
            inner: self.clone(),
        }
    }

    /// File version of the image
    pub fn file_version(&self) -> u32 {
        self.file_version
    }

    /// Manufacturer code, `None` matches any
    pub fn manufacturer_id(&self) -> Option<u16> {
        self.manufacturer_id
    }

    /// Image type, `None` matches any
    pub fn image_type(&self) -> Option<u16> {
        self.image_type
    }

    /// Declared checksum of the image file
    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }

    /// Declared size of the image file
    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    /// Manufacturer names the image is restricted to
    pub fn manufacturer_names(&self) -> &[String] {
        &self.manufacturer_names
    }

    /// Model names the image is restricted to
    pub fn model_names(&self) -> &[String] {
        &self.model_names
    }

    /// Changelog text
    pub fn changelog(&self) -> Option<&str> {
        self.changelog.as_deref()
    }

    /// Release notes text
    pub fn release_notes(&self) -> Option<&str> {
        self.release_notes.as_deref()
    }

    /// Minimum hardware version
    pub fn min_hardware_version(&self) -> Option<u16> {
        self.min_hardware_version
    }

    /// Maximum hardware version
    pub fn max_hardware_version(&self) -> Option<u16> {
        self.max_hardware_version
    }

    /// Lowest device file version eligible for this image
    pub fn min_current_file_version(&self) -> Option<u32> {
        self.min_current_file_version
    }

    /// Highest device file version eligible for this image
    pub fn max_current_file_version(&self) -> Option<u32> {
        self.max_current_file_version
    }

    /// Diagnostic label naming where this record came from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Where to fetch the image from
    pub fn location(&self) -> Option<&ImageLocation> {
        self.location.as_ref()
    }

    /// Handling of bytes past the end of the image
    pub fn trailing_data(&self) -> TrailingData {
        self.trailing_data
    }

    /// Explicit specificity override, if any
    pub fn specificity_override(&self) -> Option<i32> {
        self.specificity
    }

    /// Return a copy with an explicit specificity
    pub fn with_specificity(&self, specificity: i32) -> Self {
        self.to_builder().specificity(specificity).build()
    }

    /// Return a copy with a different source label
    pub fn with_source(&self, source: impl Into<String>) -> Self {
        self.to_builder().source(source).build()
    }

    /// Return a copy with a different location
    pub fn with_location(&self, location: ImageLocation) -> Self {
        self.to_builder().location(location).build()
    }

    /// How narrowly this record targets devices
    ///
    /// The explicit override wins when set. Otherwise every narrowing field
    /// that is present adds one, so a record whose narrowing fields are a
    /// strict superset of another's always scores higher.
    pub fn specificity(&self) -> i32 {
        if let Some(specificity) = self.specificity {
            return specificity;
        }

        [
            !self.manufacturer_names.is_empty(),
            !self.model_names.is_empty(),
            self.min_hardware_version.is_some(),
            self.max_hardware_version.is_some(),
            self.min_current_file_version.is_some(),
            self.max_current_file_version.is_some(),
        ]
        .into_iter()
        .map(i32::from)
        .sum()
    }

    /// Check whether this image may be offered to `device` for `request`
    ///
    /// Absent fields impose no constraint. A hardware range requires the
    /// request to carry a hardware version. The device's current file
    /// version is not considered here; see [`Self::check_version`].
    pub fn check_compatibility(&self, device: &dyn OtaDevice, request: &ImageRequest) -> bool {
        if self
            .manufacturer_id
            .is_some_and(|id| id != request.manufacturer_code)
        {
            return false;
        }
        if self.image_type.is_some_and(|t| t != request.image_type) {
            return false;
        }
        if !self.model_names.is_empty()
            && !device
                .model()
                .is_some_and(|model| self.model_names.iter().any(|n| n == model))
        {
            return false;
        }
        if !self.manufacturer_names.is_empty()
            && !device
                .manufacturer()
                .is_some_and(|name| self.manufacturer_names.iter().any(|n| n == name))
        {
            return false;
        }
        if self.min_hardware_version.is_some() || self.max_hardware_version.is_some() {
            let Some(hw) = request.hardware_version else {
                return false;
            };
            if self.min_hardware_version.is_some_and(|min| hw < min)
                || self.max_hardware_version.is_some_and(|max| hw > max)
            {
                return false;
            }
        }
        true
    }

    /// Check whether a device running `current_file_version` may take this
    /// image
    pub fn check_version(&self, current_file_version: u32) -> bool {
        self.min_current_file_version
            .is_none_or(|min| current_file_version >= min)
            && self
                .max_current_file_version
                .is_none_or(|max| current_file_version <= max)
    }

    /// Whether this image is newer than `file_version`
    pub fn is_newer_than(&self, file_version: u32) -> bool {
        self.file_version > file_version
    }
}

/// Builder for [`OtaImageMetadata`]
#[derive(Debug, Clone)]
pub struct OtaImageMetadataBuilder {
    inner: OtaImageMetadata,
}

impl OtaImageMetadataBuilder {
    /// Restrict to a manufacturer code
    pub fn manufacturer_id(mut self, manufacturer_id: u16) -> Self {
        self.inner.manufacturer_id = Some(manufacturer_id);
        self
    }

    /// Restrict to an image type
    pub fn image_type(mut self, image_type: u16) -> Self {
        self.inner.image_type = Some(image_type);
        self
    }

    /// Declare the file checksum
    pub fn checksum(mut self, checksum: Checksum) -> Self {
        self.inner.checksum = Some(checksum);
        self
    }

    /// Declare the file size
    pub fn file_size(mut self, file_size: u64) -> Self {
        self.inner.file_size = Some(file_size);
        self
    }

    /// Restrict to devices reporting one of these manufacturer names
    pub fn manufacturer_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.manufacturer_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict to devices reporting one of these models
    pub fn model_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.model_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the changelog
    pub fn changelog(mut self, changelog: impl Into<String>) -> Self {
        self.inner.changelog = Some(changelog.into());
        self
    }

    /// Set the release notes
    pub fn release_notes(mut self, release_notes: impl Into<String>) -> Self {
        self.inner.release_notes = Some(release_notes.into());
        self
    }

    /// Set the minimum hardware version
    pub fn min_hardware_version(mut self, version: u16) -> Self {
        self.inner.min_hardware_version = Some(version);
        self
    }

    /// Set the maximum hardware version
    pub fn max_hardware_version(mut self, version: u16) -> Self {
        self.inner.max_hardware_version = Some(version);
        self
    }

    /// Set the lowest eligible device file version
    pub fn min_current_file_version(mut self, version: u32) -> Self {
        self.inner.min_current_file_version = Some(version);
        self
    }

    /// Set the highest eligible device file version
    pub fn max_current_file_version(mut self, version: u32) -> Self {
        self.inner.max_current_file_version = Some(version);
        self
    }

    /// Override the computed specificity
    pub fn specificity(mut self, specificity: i32) -> Self {
        self.inner.specificity = Some(specificity);
        self
    }

    /// Set the diagnostic source label
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.inner.source = source.into();
        self
    }

    /// Set where the image is fetched from
    pub fn location(mut self, location: ImageLocation) -> Self {
        self.inner.location = Some(location);
        self
    }

    /// Fetch the image over HTTP
    pub fn url(self, url: impl Into<String>) -> Self {
        self.location(ImageLocation::Url(url.into()))
    }

    /// Set trailing-data handling
    pub fn trailing_data(mut self, trailing_data: TrailingData) -> Self {
        self.inner.trailing_data = trailing_data;
        self
    }

    /// Finish building
    pub fn build(self) -> OtaImageMetadata {
        self.inner
    }
}

/// A metadata record together with the image it describes, once fetched
///
/// Hardware range, manufacturer id and image type come from the metadata
/// when it declares them and fall back to the image header otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtaImageWithMetadata {
    /// Candidate metadata
    pub metadata: OtaImageMetadata,
    /// Fetched image
    pub firmware: Option<FirmwareImage>,
}

impl OtaImageWithMetadata {
    /// Pair metadata with a fetched image
    pub fn new(metadata: OtaImageMetadata, firmware: Option<FirmwareImage>) -> Self {
        Self { metadata, firmware }
    }

    /// File version from the metadata
    pub fn version(&self) -> u32 {
        self.metadata.file_version()
    }

    /// Minimum hardware version
    pub fn min_hardware_version(&self) -> Option<u16> {
        self.metadata.min_hardware_version().or_else(|| {
            self.firmware
                .as_ref()
                .and_then(|fw| fw.header().minimum_hardware_version())
        })
    }

    /// Maximum hardware version
    pub fn max_hardware_version(&self) -> Option<u16> {
        self.metadata.max_hardware_version().or_else(|| {
            self.firmware
                .as_ref()
                .and_then(|fw| fw.header().maximum_hardware_version())
        })
    }

    /// Manufacturer code
    pub fn manufacturer_id(&self) -> Option<u16> {
        self.metadata
            .manufacturer_id()
            .or_else(|| self.firmware.as_ref().map(|fw| fw.header().manufacturer_id))
    }

    /// Image type
    pub fn image_type(&self) -> Option<u16> {
        self.metadata
            .image_type()
            .or_else(|| self.firmware.as_ref().map(|fw| fw.header().image_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use zigbee_ota_image::{OtaImage, OtaImageHeader};

    fn device() -> DeviceInfo {
        DeviceInfo::new("TRADFRI bulb E27", "IKEA of Sweden", 0x117C)
    }

    #[test]
    fn specificity_counts_narrowing_fields() {
        let base = OtaImageMetadata::builder(1).manufacturer_id(0x117C).build();
        assert_eq!(base.specificity(), 0);

        let narrow = base
            .to_builder()
            .model_names(["TRADFRI bulb E27"])
            .min_hardware_version(1)
            .max_hardware_version(2)
            .build();
        assert_eq!(narrow.specificity(), 3);
        assert_eq!(narrow.with_specificity(-5).specificity(), -5);
    }

    #[test]
    fn with_methods_leave_original_untouched() {
        let original = OtaImageMetadata::builder(7).source("a").build();
        let renamed = original.with_source("b");
        assert_eq!(original.source(), "a");
        assert_eq!(renamed.source(), "b");
        assert_eq!(renamed.file_version(), 7);
    }

    #[test]
    fn wildcard_fields_match_anything() {
        let meta = OtaImageMetadata::builder(1).build();
        let request = ImageRequest::new(0x1234, 0x5678, 0);
        assert!(meta.check_compatibility(&DeviceInfo::default(), &request));
    }

    #[test]
    fn names_must_match_device() {
        let meta = OtaImageMetadata::builder(1)
            .manufacturer_names(["IKEA of Sweden"])
            .model_names(["TRADFRI bulb E14"])
            .build();
        let request = ImageRequest::new(0x117C, 0x2101, 0);
        assert!(!meta.check_compatibility(&device(), &request));

        let meta = meta.to_builder().model_names(["TRADFRI bulb E27"]).build();
        assert!(meta.check_compatibility(&device(), &request));
    }

    #[test]
    fn hardware_range_requires_request_hardware_version() {
        let meta = OtaImageMetadata::builder(1).min_hardware_version(2).build();
        let request = ImageRequest::new(0x117C, 0x2101, 0);

        assert!(!meta.check_compatibility(&device(), &request));
        assert!(!meta.check_compatibility(&device(), &request.with_hardware_version(1)));
        assert!(meta.check_compatibility(&device(), &request.with_hardware_version(2)));
    }

    #[test]
    fn version_window_is_inclusive() {
        let meta = OtaImageMetadata::builder(10)
            .min_current_file_version(3)
            .max_current_file_version(5)
            .build();
        assert!(!meta.check_version(2));
        assert!(meta.check_version(3));
        assert!(meta.check_version(5));
        assert!(!meta.check_version(6));
        assert!(OtaImageMetadata::builder(1).build().check_version(u32::MAX));
    }

    #[test]
    fn mirrored_fields_prefer_metadata() -> Result<(), zigbee_ota_image::FormatError> {
        let header = OtaImageHeader::new(0x1111, 0x2222, 5).with_hardware_versions(1, 9);
        let firmware: FirmwareImage = OtaImage::assemble(header, vec![])?.into();

        let bare = OtaImageWithMetadata::new(OtaImageMetadata::builder(5).build(), Some(firmware.clone()));
        assert_eq!(bare.manufacturer_id(), Some(0x1111));
        assert_eq!(bare.image_type(), Some(0x2222));
        assert_eq!(bare.min_hardware_version(), Some(1));
        assert_eq!(bare.max_hardware_version(), Some(9));

        let declared = OtaImageMetadata::builder(5)
            .manufacturer_id(0x3333)
            .max_hardware_version(4)
            .build();
        let with = OtaImageWithMetadata::new(declared, Some(firmware));
        assert_eq!(with.manufacturer_id(), Some(0x3333));
        assert_eq!(with.max_hardware_version(), Some(4));
        assert_eq!(with.min_hardware_version(), Some(1));

        let unknown = OtaImageWithMetadata::new(OtaImageMetadata::builder(5).build(), None);
        assert_eq!(unknown.image_type(), None);
        assert_eq!(unknown.min_hardware_version(), None);
        Ok(())
    }
}
