//! Source image identification with the `image` crate.
//!
//! Only the header is read: dimensions plus EXIF orientation. The pipeline
//! preamble runs `-auto-orient`, so crop geometry has to be computed against
//! the oriented size; a 90° or 270° orientation swaps width and height.

use super::backend::{BackendError, Dimensions};
use image::metadata::Orientation;
use image::{ImageDecoder, ImageReader};
use std::path::Path;

/// Extensions `run` and `plan` pick up when walking a directory.
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

/// True when `path` has an extension we can identify.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
}

/// Read the displayed (post auto-orient) dimensions of an image.
pub fn identify(path: &Path) -> Result<Dimensions, BackendError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let mut decoder = reader.into_decoder().map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let (width, height) = decoder.dimensions();
    // Missing or unreadable EXIF is treated as upright.
    let orientation = decoder
        .orientation()
        .unwrap_or(Orientation::NoTransforms);

    Ok(oriented(Dimensions { width, height }, orientation))
}

fn oriented(dims: Dimensions, orientation: Orientation) -> Dimensions {
    match orientation {
        Orientation::Rotate90
        | Orientation::Rotate270
        | Orientation::Rotate90FlipH
        | Orientation::Rotate270FlipH => Dimensions {
            width: dims.height,
            height: dims.width,
        },
        _ => dims,
    }
}
