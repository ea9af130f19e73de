//! Fuzzes EBL and GBL firmware validation.
//!
//! Wraps arbitrary bytes in an upgrade-image sub-element and validates it.
//! Must never panic.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_validate_firmware
#![no_main]
use libfuzzer_sys::fuzz_target;
use zigbee_ota_image::{FirmwareImage, OtaImage, OtaImageHeader, SubElement};
use zigbee_ota_validators::{detect_firmware_format, validate_ota_image};

fuzz_target!(|data: &[u8]| {
    let _ = detect_firmware_format(data);

    let header = OtaImageHeader::new(0x1002, 0x0001, 1);
    if let Ok(image) = OtaImage::assemble(header, vec![SubElement::upgrade_image(data)]) {
        let _ = validate_ota_image(&FirmwareImage::Standard(image));
    }
});
