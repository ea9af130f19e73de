//! The device and request values an image lookup is made for

/// What the OTA server knows about the device asking for an image
pub trait OtaDevice: Send + Sync {
    /// Model identifier reported by the device
    fn model(&self) -> Option<&str>;

    /// Manufacturer name reported by the device
    fn manufacturer(&self) -> Option<&str>;

    /// Manufacturer code from the node descriptor
    fn manufacturer_id(&self) -> Option<u16>;
}

/// Plain [`OtaDevice`] implementation
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    /// Model identifier
    pub model: Option<String>,
    /// Manufacturer name
    pub manufacturer: Option<String>,
    /// Manufacturer code
    pub manufacturer_id: Option<u16>,
}

impl DeviceInfo {
    /// Create a device description
    pub fn new(
        model: impl Into<String>,
        manufacturer: impl Into<String>,
        manufacturer_id: u16,
    ) -> Self {
        Self {
            model: Some(model.into()),
            manufacturer: Some(manufacturer.into()),
            manufacturer_id: Some(manufacturer_id),
        }
    }

    /// Snapshot any [`OtaDevice`]
    pub fn from_device(device: &dyn OtaDevice) -> Self {
        Self {
            model: device.model().map(str::to_string),
            manufacturer: device.manufacturer().map(str::to_string),
            manufacturer_id: device.manufacturer_id(),
        }
    }
}

impl OtaDevice for DeviceInfo {
    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    fn manufacturer(&self) -> Option<&str> {
        self.manufacturer.as_deref()
    }

    fn manufacturer_id(&self) -> Option<u16> {
        self.manufacturer_id
    }
}

/// Field control bit of a Query Next Image request: hardware version present
pub const QUERY_HARDWARE_VERSION_PRESENT: u8 = 0x01;

/// The image a device asked for in a Query Next Image request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageRequest {
    /// Manufacturer code
    pub manufacturer_code: u16,
    /// Image type
    pub image_type: u16,
    /// File version currently running on the device
    pub current_file_version: u32,
    /// Hardware version, if the device sent one
    pub hardware_version: Option<u16>,
}

impl ImageRequest {
    /// Create a request without a hardware version
    pub fn new(manufacturer_code: u16, image_type: u16, current_file_version: u32) -> Self {
        Self {
            manufacturer_code,
            image_type,
            current_file_version,
            hardware_version: None,
        }
    }

    /// Return a copy carrying a hardware version
    pub fn with_hardware_version(mut self, hardware_version: u16) -> Self {
        self.hardware_version = Some(hardware_version);
        self
    }

    /// Build a request from Query Next Image fields
    ///
    /// `hardware_version` is only used when bit 0 of `field_control` is set.
    pub fn from_query(
        field_control: u8,
        manufacturer_code: u16,
        image_type: u16,
        current_file_version: u32,
        hardware_version: Option<u16>,
    ) -> Self {
        let hardware_version = if field_control & QUERY_HARDWARE_VERSION_PRESENT != 0 {
            hardware_version
        } else {
            None
        };
        Self {
            manufacturer_code,
            image_type,
            current_file_version,
            hardware_version,
        }
    }
}
