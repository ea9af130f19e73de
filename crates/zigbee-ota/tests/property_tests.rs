//! Property-based tests for image matching and verification

use proptest::prelude::*;
use zigbee_ota::prelude::*;
use zigbee_ota::{OtaImageMetadataBuilder, Selection, select_candidate};
use zigbee_ota_image::SubElement;

#[derive(Debug, Clone, Default)]
struct Narrowing {
    manufacturer_names: bool,
    model_names: bool,
    min_hardware: bool,
    max_hardware: bool,
    min_current: bool,
    max_current: bool,
}

fn arb_narrowing() -> impl Strategy<Value = Narrowing> {
    any::<[bool; 6]>().prop_map(|flags| Narrowing {
        manufacturer_names: flags[0],
        model_names: flags[1],
        min_hardware: flags[2],
        max_hardware: flags[3],
        min_current: flags[4],
        max_current: flags[5],
    })
}

fn apply(narrowing: &Narrowing, mut builder: OtaImageMetadataBuilder) -> OtaImageMetadataBuilder {
    if narrowing.manufacturer_names {
        builder = builder.manufacturer_names(["Acme"]);
    }
    if narrowing.model_names {
        builder = builder.model_names(["lamp"]);
    }
    if narrowing.min_hardware {
        builder = builder.min_hardware_version(0);
    }
    if narrowing.max_hardware {
        builder = builder.max_hardware_version(u16::MAX);
    }
    if narrowing.min_current {
        builder = builder.min_current_file_version(0);
    }
    if narrowing.max_current {
        builder = builder.max_current_file_version(u32::MAX);
    }
    builder
}

fn arb_request() -> impl Strategy<Value = ImageRequest> {
    (any::<u16>(), any::<u16>(), any::<u32>(), prop::option::of(any::<u16>())).prop_map(
        |(manufacturer, image_type, current, hardware)| {
            let request = ImageRequest::new(manufacturer, image_type, current);
            match hardware {
                Some(hw) => request.with_hardware_version(hw),
                None => request,
            }
        },
    )
}

proptest! {
    #[test]
    fn prop_superset_is_more_specific(base in arb_narrowing(), extra in arb_narrowing()) {
        let superset = Narrowing {
            manufacturer_names: base.manufacturer_names || extra.manufacturer_names,
            model_names: base.model_names || extra.model_names,
            min_hardware: base.min_hardware || extra.min_hardware,
            max_hardware: base.max_hardware || extra.max_hardware,
            min_current: base.min_current || extra.min_current,
            max_current: base.max_current || extra.max_current,
        };
        let narrow = apply(&superset, OtaImageMetadata::builder(1)).build();
        let wide = apply(&base, OtaImageMetadata::builder(1)).build();

        prop_assert!(narrow.specificity() >= wide.specificity());
        if superset.model_names != base.model_names || superset.min_hardware != base.min_hardware {
            prop_assert!(narrow.specificity() > wide.specificity());
        }
    }

    #[test]
    fn prop_compatibility_ignores_current_version(
        request in arb_request(),
        other_current in any::<u32>(),
        manufacturer in prop::option::of(any::<u16>()),
        image_type in prop::option::of(any::<u16>()),
    ) {
        let mut builder = OtaImageMetadata::builder(1);
        if let Some(id) = manufacturer {
            builder = builder.manufacturer_id(id);
        }
        if let Some(image_type) = image_type {
            builder = builder.image_type(image_type);
        }
        let meta = builder.build();
        let device = DeviceInfo::new("lamp", "Acme", request.manufacturer_code);

        let moved = ImageRequest {
            current_file_version: other_current,
            ..request
        };
        prop_assert_eq!(
            meta.check_compatibility(&device, &request),
            meta.check_compatibility(&device, &moved)
        );
    }

    #[test]
    fn prop_selected_image_is_newer(
        versions in prop::collection::vec(any::<u32>(), 1..20),
        current in any::<u32>(),
    ) {
        let candidates: Vec<OtaImageMetadata> = versions
            .iter()
            .map(|&version| OtaImageMetadata::builder(version).build())
            .collect();
        let device = DeviceInfo::default();
        let request = ImageRequest::new(0x1234, 0x0001, current);

        match select_candidate(&candidates, &device, &request) {
            Selection::Found(meta) => {
                prop_assert!(meta.file_version() > current);
                prop_assert_eq!(Some(meta.file_version()), versions.iter().copied().max());
            }
            Selection::Ambiguous(tied) => {
                prop_assert!(tied.len() > 1);
                prop_assert!(tied.iter().all(|meta| meta.file_version() > current));
            }
            Selection::None => {
                prop_assert!(versions.iter().all(|&version| version <= current));
            }
        }
    }

    #[test]
    fn prop_parse_verified_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let meta = OtaImageMetadata::builder(1).build();
        let _ = meta.parse_verified(&data);
    }

    #[test]
    fn prop_valid_images_survive_verification(
        payload in prop::collection::vec(any::<u8>(), 0..256),
        version in any::<u32>(),
    ) {
        let header = OtaImageHeader::new(0x1234, 0x0001, version);
        let bytes = OtaImage::assemble(header, vec![SubElement::upgrade_image(payload)])
            .and_then(|image| image.serialize());
        prop_assume!(bytes.is_ok());
        let bytes = bytes.unwrap_or_default();

        let meta = OtaImageMetadata::builder(version)
            .file_size(bytes.len() as u64)
            .checksum(Checksum::compute(ChecksumAlgorithm::Sha512, &bytes))
            .build();
        let firmware = meta.parse_verified(&bytes);
        prop_assert!(firmware.is_ok());
        prop_assert_eq!(firmware.map(|fw| fw.file_version()).ok(), Some(version));
    }
}
