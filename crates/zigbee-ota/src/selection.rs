//! Choosing one image out of the aggregated candidates

use tracing::{debug, warn};

use crate::device::{ImageRequest, OtaDevice};
use crate::metadata::OtaImageMetadata;

/// Outcome of [`select_candidate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Exactly one best candidate
    Found(OtaImageMetadata),
    /// Several equally good candidates; nothing is offered
    Ambiguous(Vec<OtaImageMetadata>),
    /// No candidate applies
    None,
}

impl Selection {
    /// The selected candidate, if there is exactly one
    pub fn found(&self) -> Option<&OtaImageMetadata> {
        match self {
            Selection::Found(meta) => Some(meta),
            Selection::Ambiguous(_) | Selection::None => None,
        }
    }

    /// Consume and return the selected candidate
    pub fn into_found(self) -> Option<OtaImageMetadata> {
        match self {
            Selection::Found(meta) => Some(meta),
            Selection::Ambiguous(_) | Selection::None => None,
        }
    }
}

/// Pick the image to offer `device` for `request`
///
/// Candidates must pass the compatibility and version-window checks. Among
/// those, only the most specific are kept, then only those newer than the
/// running firmware, then only the highest file version. More than one
/// survivor is ambiguous, even if they declare the same checksum; give one
/// record a higher specificity override to prefer it.
pub fn select_candidate<'a, I>(
    candidates: I,
    device: &dyn OtaDevice,
    request: &ImageRequest,
) -> Selection
where
    I: IntoIterator<Item = &'a OtaImageMetadata>,
{
    let compatible: Vec<&OtaImageMetadata> = candidates
        .into_iter()
        .filter(|meta| meta.check_compatibility(device, request))
        .filter(|meta| meta.check_version(request.current_file_version))
        .collect();

    let Some(best_specificity) = compatible.iter().map(|meta| meta.specificity()).max() else {
        return Selection::None;
    };

    let newer: Vec<&OtaImageMetadata> = compatible
        .into_iter()
        .filter(|meta| meta.specificity() == best_specificity)
        .filter(|meta| meta.is_newer_than(request.current_file_version))
        .collect();

    let Some(best_version) = newer.iter().map(|meta| meta.file_version()).max() else {
        debug!(
            "No image newer than {:#010x} for {:04x}:{:04x}",
            request.current_file_version, request.manufacturer_code, request.image_type
        );
        return Selection::None;
    };

    let tied: Vec<&OtaImageMetadata> = newer
        .into_iter()
        .filter(|meta| meta.file_version() == best_version)
        .collect();

    match tied.as_slice() {
        [] => Selection::None,
        [only] => Selection::Found((*only).clone()),
        _ => {
            let sources: Vec<&str> = tied.iter().map(|meta| meta.source()).collect();
            warn!(
                "Ambiguous images {:#010x} for {:04x}:{:04x} from {:?}",
                best_version, request.manufacturer_code, request.image_type, sources
            );
            Selection::Ambiguous(tied.iter().map(|meta| (*meta).clone()).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{Checksum, ChecksumAlgorithm};
    use crate::device::DeviceInfo;

    fn device() -> DeviceInfo {
        DeviceInfo::new("SWITCH-1", "Acme", 0x1234)
    }

    fn request(current: u32) -> ImageRequest {
        ImageRequest::new(0x1234, 0x0001, current)
    }

    fn meta(version: u32, source: &str) -> OtaImageMetadata {
        OtaImageMetadata::builder(version)
            .manufacturer_id(0x1234)
            .image_type(0x0001)
            .source(source)
            .build()
    }

    #[test]
    fn picks_highest_newer_version() {
        let candidates = [meta(1, "a"), meta(3, "b"), meta(2, "c")];
        let selection = select_candidate(&candidates, &device(), &request(1));
        assert_eq!(selection.found().map(|m| m.source()), Some("b"));
    }

    #[test]
    fn nothing_newer_is_none() {
        let candidates = [meta(1, "a"), meta(2, "b")];
        assert_eq!(
            select_candidate(&candidates, &device(), &request(2)),
            Selection::None
        );
    }

    #[test]
    fn specific_record_shadows_newer_generic_one() {
        let generic = meta(9, "generic");
        let specific = meta(5, "specific")
            .to_builder()
            .model_names(["SWITCH-1"])
            .build();
        let selection = select_candidate([&generic, &specific], &device(), &request(1));
        assert_eq!(selection.found().map(|m| m.source()), Some("specific"));
    }

    #[test]
    fn tie_is_ambiguous_until_overridden() {
        let a = meta(4, "a");
        let b = meta(4, "b");
        let selection = select_candidate([&a, &b], &device(), &request(1));
        assert!(matches!(selection, Selection::Ambiguous(ref tied) if tied.len() == 2));

        let b = b.with_specificity(1);
        let selection = select_candidate([&a, &b], &device(), &request(1));
        assert_eq!(selection.found().map(|m| m.source()), Some("b"));
    }

    #[test]
    fn identical_checksums_still_tie() {
        let checksum = Checksum::compute(ChecksumAlgorithm::Sha256, b"same bytes");
        let a = meta(5, "a").to_builder().checksum(checksum.clone()).build();
        let b = meta(5, "b").to_builder().checksum(checksum).build();
        let selection = select_candidate([&a, &b], &device(), &request(1));
        assert!(matches!(selection, Selection::Ambiguous(ref tied) if tied.len() == 2));
        assert!(selection.into_found().is_none());
    }

    #[test]
    fn version_window_excludes_before_ranking() {
        let gated = meta(8, "gated")
            .to_builder()
            .min_current_file_version(5)
            .build();
        let open = meta(6, "open");
        let selection = select_candidate([&gated, &open], &device(), &request(2));
        assert_eq!(selection.found().map(|m| m.source()), Some("open"));
    }
}
