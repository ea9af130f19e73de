//! Integration tests for the OTA codec and container unwrapping

use zigbee_ota_image::image::{HUE_MANUFACTURER_ID, HUE_SBL_MARKER};
use zigbee_ota_image::prelude::*;

fn sample_image() -> OtaImage {
    let mut header = OtaImageHeader::new(0x117C, 0x2101, 0x2301_0631)
        .with_header_string("EBL tradfri_light_basic")
        .with_hardware_versions(1, 1);
    header.security_credential_version = Some(0);
    OtaImage::assemble(
        header,
        vec![
            SubElement::upgrade_image((0..=255u8).collect::<Vec<_>>()),
            SubElement::new(ElementTag::Other(0xF00D), vec![0xCA, 0xFE]),
        ],
    )
    .expect("valid image")
}

fn sample_bytes() -> Vec<u8> {
    sample_image().serialize().expect("serializable image")
}

mod canonical_tests {
    use super::*;

    #[test]
    fn test_round_trip_is_byte_exact() {
        let bytes = sample_bytes();
        let (image, rest) = OtaImage::deserialize(&bytes).expect("parse");
        assert!(rest.is_empty());
        assert_eq!(image.serialize().expect("serialize"), bytes);
    }

    #[test]
    fn test_unknown_tags_are_preserved() {
        let (image, _) = OtaImage::deserialize(&sample_bytes()).expect("parse");
        let tags: Vec<_> = image.sub_elements().iter().map(|e| e.tag).collect();
        assert_eq!(tags, vec![ElementTag::UpgradeImage, ElementTag::Other(0xF00D)]);
    }

    #[test]
    fn test_trailing_bytes_are_returned_as_remainder() {
        let mut bytes = sample_bytes();
        bytes.extend_from_slice(&[1, 2, 3]);

        let (image, rest) = parse_ota_image(&bytes).expect("parse");
        assert_eq!(rest, &[1, 2, 3]);
        assert_eq!(image, FirmwareImage::Standard(sample_image()));
    }

    #[test]
    fn test_tampered_image_size_fails() {
        let mut bytes = sample_bytes();
        // image_size lives at offset 52
        if let Some(b) = bytes.get_mut(52) {
            *b = b.wrapping_add(1);
        }
        assert!(OtaImage::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_serialize_rejects_stale_image_size() {
        let image = sample_image();
        let mut header = image.header().clone();
        header.image_size += 1;
        assert!(matches!(
            OtaImage::new(header, image.sub_elements().to_vec()),
            Err(FormatError::ImageSizeMismatch { .. })
        ));
    }
}

mod container_tests {
    use super::*;

    #[test]
    fn test_ngis_wrapper() {
        let image = sample_bytes();
        let offset = 48u32;
        let mut data = b"NGIS".to_vec();
        data.resize(16, 0);
        data.extend_from_slice(&offset.to_le_bytes());
        data.extend_from_slice(&(image.len() as u32).to_le_bytes());
        data.resize(offset as usize, 0xEE);
        data.extend_from_slice(&image);
        data.extend_from_slice(b"signature-block");

        assert_eq!(detect_container(&data), Some(ContainerFormat::Ngis));
        let (parsed, rest) = parse_ota_image(&data).expect("parse");
        assert_eq!(parsed, FirmwareImage::Standard(sample_image()));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_ngis_pointing_past_end_fails() {
        let mut data = b"NGIS".to_vec();
        data.resize(16, 0);
        data.extend_from_slice(&32u32.to_le_bytes());
        data.extend_from_slice(&4096u32.to_le_bytes());
        data.resize(64, 0);

        assert!(matches!(
            parse_ota_image(&data),
            Err(FormatError::Container {
                format: ContainerFormat::Ngis,
                ..
            })
        ));
    }

    #[test]
    fn test_size_prefixed_wrapper() {
        let image = sample_bytes();
        let mut data = (image.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&image);
        data.push(0x01);
        data.extend_from_slice(&[0xAB; 16]);

        assert_eq!(detect_container(&data), Some(ContainerFormat::SizePrefixed));
        let (parsed, rest) = parse_ota_image(&data).expect("parse");
        assert_eq!(parsed.key(), sample_image().key());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_digest_prefixed_wrapper() {
        let image = sample_bytes();
        let mut data = vec![0x42; 32];
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&(image.len() as u32).to_le_bytes());
        data.extend_from_slice(&[0u8; 8]);
        data.extend_from_slice(&image);

        assert_eq!(detect_container(&data), Some(ContainerFormat::DigestPrefixed));
        let (parsed, _) = parse_ota_image(&data).expect("parse");
        assert_eq!(parsed, FirmwareImage::Standard(sample_image()));
    }

    #[test]
    fn test_fixed_offset_discards_padding() {
        let image = sample_bytes();
        let mut data = vec![0u8; 64];
        data.extend_from_slice(&image);
        data.extend_from_slice(&[0xFF; 100]);

        assert_eq!(detect_container(&data), Some(ContainerFormat::FixedOffset));
        let (parsed, rest) = parse_ota_image(&data).expect("parse");
        assert_eq!(parsed, FirmwareImage::Standard(sample_image()));
        assert!(rest.is_empty());
    }
}

mod hue_sbl_tests {
    use super::*;

    fn hue_bytes(manufacturer_id: u16) -> Vec<u8> {
        let payload: Vec<u8> = HUE_SBL_MARKER.iter().copied().chain([0x10; 29]).collect();
        let mut header = OtaImageHeader::new(manufacturer_id, 0x0100, 0x0100_1234);
        header.image_size = 56 + payload.len() as u32;
        let mut bytes = header.serialize();
        bytes.extend_from_slice(&payload);
        bytes
    }

    #[test]
    fn test_hue_sbl_is_detected_and_round_trips() {
        let bytes = hue_bytes(HUE_MANUFACTURER_ID);
        assert_eq!(detect_container(&bytes), Some(ContainerFormat::HueSbl));

        let (image, rest) = parse_ota_image(&bytes).expect("parse");
        assert!(rest.is_empty());
        assert!(matches!(image, FirmwareImage::HueSbl(_)));
        assert!(image.sub_elements().is_empty());
        assert_eq!(image.serialize().expect("serialize"), bytes);
    }

    #[test]
    fn test_marker_from_other_vendor_is_not_hue_sbl() {
        let bytes = hue_bytes(0x1234);
        assert_eq!(detect_container(&bytes), Some(ContainerFormat::Canonical));
    }

    #[test]
    fn test_hue_sbl_deserialize_rejects_other_vendor() {
        let bytes = hue_bytes(0x1234);
        assert!(matches!(
            HueSblImage::deserialize(&bytes),
            Err(FormatError::UnexpectedManufacturer { .. })
        ));
    }
}

mod trailing_data_tests {
    use super::*;

    #[test]
    fn test_fold_trailing_bytes_round_trips() {
        let mut bytes = sample_bytes();
        bytes.extend_from_slice(b"appended");

        let (image, rest) = OtaImage::deserialize(&bytes).expect("parse");
        let folded = image.fold_trailing_bytes(rest).expect("fold");
        let serialized = folded.serialize().expect("serialize");

        assert_eq!(serialized.len(), bytes.len());
        assert_eq!(folded.header().image_size as usize, bytes.len());
        let (reparsed, rest) = OtaImage::deserialize(&serialized).expect("reparse");
        assert!(rest.is_empty());
        assert_eq!(reparsed, folded);
    }

    #[test]
    fn test_fold_without_elements_fails() {
        let image = OtaImage::assemble(OtaImageHeader::new(1, 2, 3), vec![]).expect("image");
        assert_eq!(
            image.fold_trailing_bytes(b"x").err(),
            Some(FormatError::NoSubElements)
        );
    }
}
