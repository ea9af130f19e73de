//! Integration tests for EBL/GBL validation

use tracing_test::traced_test;
use zigbee_ota_image::prelude::*;
use zigbee_ota_validators::prelude::*;

/// Build an EBL image with the given records between header and end
fn build_ebl(records: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut out = vec![0x00, 0x00, 0x00, 0x8C];
    out.extend_from_slice(&[0x11; 140]);
    for (tag, value) in records {
        out.extend_from_slice(&tag.to_be_bytes());
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(value);
    }
    out.extend_from_slice(&[0xFC, 0x04, 0x00, 0x04]);
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    while !out.len().is_multiple_of(64) {
        out.push(0xFF);
    }
    out
}

/// Build a GBL image with the given records between header and end
fn build_gbl(records: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut out = vec![0xEB, 0x17, 0xA6, 0x03, 0x08, 0x00, 0x00, 0x00];
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00]);
    for (tag, value) in records {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value);
    }
    out.extend_from_slice(&0xFC04_04FCu32.to_le_bytes());
    out.extend_from_slice(&4u32.to_le_bytes());
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

fn ota_with(payloads: Vec<Vec<u8>>) -> FirmwareImage {
    let elements = payloads.into_iter().map(SubElement::upgrade_image).collect();
    OtaImage::assemble(OtaImageHeader::new(0x1002, 0x0001, 0x10), elements)
        .expect("valid image")
        .into()
}

mod ebl_tests {
    use super::*;

    #[test]
    fn test_valid_ebl_validates() {
        let image = build_ebl(&[(0xFE01, vec![0xAB; 200]), (0xFE01, vec![0xCD; 33])]);
        assert_eq!(image.len() % 64, 0);
        assert_eq!(validate_firmware(&image), Ok(ValidationResult::Valid));

        let tags: Vec<_> = parse_silabs_ebl(&image)
            .map(|r| r.map(|(tag, _)| tag))
            .collect::<Result<_, _>>()
            .expect("valid records");
        assert_eq!(tags, vec![EblTag::Header, EblTag::Prog, EblTag::Prog, EblTag::End]);
    }

    #[test]
    fn test_truncated_by_one_byte_fails() {
        let mut image = build_ebl(&[(0xFE01, vec![0xAB; 200])]);
        image.pop();
        assert!(matches!(
            validate_firmware(&image),
            Err(ValidationError::Misaligned { .. })
        ));
    }

    #[test]
    fn test_non_ff_padding_fails() {
        let mut image = build_ebl(&[(0xFE01, vec![0xAB; 10])]);
        assert_eq!(image.last(), Some(&0xFF));
        if let Some(b) = image.last_mut() {
            *b = 0x00;
        }
        assert_eq!(
            validate_firmware(&image),
            Err(ValidationError::InvalidPadding {
                format: FirmwareFormat::Ebl
            })
        );
    }

    #[test]
    fn test_padding_past_boundary_fails() {
        let mut image = build_ebl(&[(0xFE01, vec![0xAB; 10])]);
        image.extend_from_slice(&[0x00; 64]);
        assert!(validate_firmware(&image).is_err());
    }

    #[test]
    fn test_corrupted_payload_fails_crc() {
        let mut image = build_ebl(&[(0xFE01, vec![0xAB; 200])]);
        if let Some(b) = image.get_mut(150) {
            *b ^= 0x01;
        }
        assert!(matches!(
            validate_firmware(&image),
            Err(ValidationError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_record_overrunning_image_is_truncation() {
        let mut image = vec![0x00, 0x00, 0x00, 0x8C];
        image.extend_from_slice(&[0x11; 140]);
        image.extend_from_slice(&[0xFE, 0x01, 0xFF, 0xFF]);
        image.resize(192, 0xFF);
        assert!(matches!(
            validate_firmware(&image),
            Err(ValidationError::Truncated { .. })
        ));
    }

    #[test]
    fn test_missing_end_tag() {
        let mut image = vec![0x00, 0x00, 0x00, 0x8C];
        image.extend_from_slice(&[0x11; 140]);
        image.extend_from_slice(&[0xFE, 0x01, 0x00, 0x2C]);
        image.resize(192, 0x00);
        assert_eq!(
            validate_firmware(&image),
            Err(ValidationError::MissingEndTag {
                format: FirmwareFormat::Ebl
            })
        );
    }
}

mod gbl_tests {
    use super::*;

    #[test]
    fn test_valid_gbl_validates() {
        let image = build_gbl(&[(0xF40A_0AF4, vec![0x01; 28]), (0xFE01_01FE, vec![0x5A; 300])]);
        assert_eq!(validate_firmware(&image), Ok(ValidationResult::Valid));
    }

    #[test]
    fn test_arbitrary_padding_is_accepted() {
        let mut image = build_gbl(&[(0xFE01_01FE, vec![0x5A; 300])]);
        image.extend_from_slice(&[0x00, 0x12, 0xFF, 0x34, 0x56]);
        assert_eq!(validate_firmware(&image), Ok(ValidationResult::Valid));
    }

    #[test]
    fn test_corrupted_payload_fails_crc() {
        let mut image = build_gbl(&[(0xFE01_01FE, vec![0x5A; 300])]);
        if let Some(b) = image.get_mut(40) {
            *b = 0x00;
        }
        assert!(matches!(
            validate_firmware(&image),
            Err(ValidationError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_record_fails() {
        let mut image = build_gbl(&[(0xFE01_01FE, vec![0x5A; 300])]);
        image.truncate(100);
        assert!(matches!(
            validate_firmware(&image),
            Err(ValidationError::Truncated { .. })
        ));
    }
}

mod dispatch_tests {
    use super::*;

    #[test]
    fn test_unknown_blob_is_not_an_error() {
        assert_eq!(validate_firmware(b"not firmware"), Ok(ValidationResult::Unknown));
        assert_eq!(validate_firmware(&[]), Ok(ValidationResult::Unknown));
        assert_eq!(detect_firmware_format(&[0x00, 0x00, 0x00, 0x8C]), Some(FirmwareFormat::Ebl));
        assert_eq!(detect_firmware_format(&[0xEB, 0x17, 0xA6, 0x03]), Some(FirmwareFormat::Gbl));
    }

    #[test]
    fn test_ota_without_upgrade_images_is_unknown() {
        assert_eq!(validate_ota_image(&ota_with(vec![])), Ok(ValidationResult::Unknown));
    }

    #[test]
    fn test_ota_with_only_unknown_payloads_is_unknown() {
        let image = ota_with(vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(validate_ota_image(&image), Ok(ValidationResult::Unknown));
    }

    #[test]
    fn test_ota_mixed_valid_and_unknown_is_valid() {
        let image = ota_with(vec![vec![1, 2, 3], build_gbl(&[])]);
        assert_eq!(validate_ota_image(&image), Ok(ValidationResult::Valid));
    }

    #[traced_test]
    #[test]
    fn test_ota_mixed_valid_and_corrupt_fails() {
        let mut corrupt = build_ebl(&[(0xFE01, vec![0xAB; 64])]);
        if let Some(b) = corrupt.get_mut(160) {
            *b ^= 0xFF;
        }
        let image = ota_with(vec![build_gbl(&[]), vec![9, 9], corrupt]);

        assert!(validate_ota_image(&image).is_err());
        assert!(logs_contain("failed validation"));
    }

    #[test]
    fn test_non_upgrade_elements_are_ignored() {
        let mut corrupt = build_ebl(&[]);
        if let Some(b) = corrupt.get_mut(150) {
            *b ^= 0xFF;
        }
        let image: FirmwareImage = OtaImage::assemble(
            OtaImageHeader::new(0x1002, 0x0001, 0x10),
            vec![SubElement::new(ElementTag::EcdsaSignatureCryptoSuite1, corrupt)],
        )
        .expect("valid image")
        .into();
        assert_eq!(validate_ota_image(&image), Ok(ValidationResult::Unknown));
    }
}
