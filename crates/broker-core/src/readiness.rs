//! Readiness Evaluator (spec §4.2).
//!
//! Pure predicate over a job's required flags and its images' upload flags.
//! Production code never calls this at request time to decide a transition —
//! it is re-expressed as a single SQL `WHERE` clause in `broker-postgres` so
//! concurrent uploads can't observe a partial read (spec §4.2) — but the
//! *logic* lives here once, so it has one place to be tested and one place
//! to be wrong.

use crate::types::{ImageFlags, Requirements};

/// True once every required artifact has been uploaded for every image, and
/// metadata (if required) has been uploaded.
pub fn is_ready(required: &Requirements, images: &[ImageFlags], meta_uploaded: bool) -> bool {
    images_complete(required, images) && metadata_satisfied(required, meta_uploaded)
}

fn images_complete(required: &Requirements, images: &[ImageFlags]) -> bool {
    images.iter().all(|img| {
        img.image_uploaded
            && (!required.alto_required || img.alto_uploaded)
            && (!required.page_required || img.page_uploaded)
    })
}

fn metadata_satisfied(required: &Requirements, meta_uploaded: bool) -> bool {
    !required.meta_json_required || meta_uploaded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(image: bool, alto: bool, page: bool) -> ImageFlags {
        ImageFlags {
            image_uploaded: image,
            alto_uploaded: alto,
            page_uploaded: page,
        }
    }

    #[test]
    fn empty_job_with_no_requirements_is_ready() {
        let req = Requirements::default();
        assert!(is_ready(&req, &[], false));
    }

    #[test]
    fn not_ready_until_all_images_uploaded() {
        let req = Requirements::default();
        let images = vec![flags(true, false, false), flags(false, false, false)];
        assert!(!is_ready(&req, &images, false));
    }

    #[test]
    fn ready_once_all_images_uploaded_without_alto_or_page() {
        let req = Requirements::default();
        let images = vec![flags(true, false, false), flags(true, false, false)];
        assert!(is_ready(&req, &images, false));
    }

    #[test]
    fn alto_required_blocks_readiness_until_every_image_has_alto() {
        let req = Requirements {
            alto_required: true,
            ..Default::default()
        };
        let images = vec![flags(true, true, false), flags(true, false, false)];
        assert!(!is_ready(&req, &images, false));

        let images = vec![flags(true, true, false), flags(true, true, false)];
        assert!(is_ready(&req, &images, false));
    }

    #[test]
    fn page_required_independent_of_alto_required() {
        let req = Requirements {
            page_required: true,
            ..Default::default()
        };
        let images = vec![flags(true, false, true)];
        assert!(is_ready(&req, &images, false));

        let images = vec![flags(true, false, false)];
        assert!(!is_ready(&req, &images, false));
    }

    #[test]
    fn metadata_required_gates_readiness_independent_of_images() {
        let req = Requirements {
            meta_json_required: true,
            ..Default::default()
        };
        let images = vec![flags(true, false, false)];
        assert!(!is_ready(&req, &images, false));
        assert!(is_ready(&req, &images, true));
    }

    #[test]
    fn readiness_idempotence_reuploading_does_not_change_outcome() {
        // Law L1: re-marking the same flag true twice is the same input.
        let req = Requirements {
            alto_required: true,
            ..Default::default()
        };
        let images = vec![flags(true, true, false)];
        let first = is_ready(&req, &images, false);
        let images_again = vec![flags(true, true, false)];
        let second = is_ready(&req, &images_again, false);
        assert_eq!(first, second);
    }
}
