//! Fuzzes OTA container detection and parsing.
//!
//! Parsed images are serialized again and the remainder must be a suffix of
//! the input. Must never panic.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_parse_ota_image
#![no_main]
use libfuzzer_sys::fuzz_target;
use zigbee_ota_image::{detect_container, parse_ota_image};

fuzz_target!(|data: &[u8]| {
    let _ = detect_container(data);

    if let Ok((image, rest)) = parse_ota_image(data) {
        assert!(rest.len() <= data.len());
        assert!(data.ends_with(rest));
        let _ = image.serialize();
        let _ = image.key();
    }
});
