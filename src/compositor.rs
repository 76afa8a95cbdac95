//! Mask compositing
//!
//! Sets the alpha channel of an image from a segmentation mask. RGB passes through
//! untouched; the mask must already match the image size.

use crate::{
    error::{IdPhotoError, Result},
    types::InferenceResult,
};
use image::RgbaImage;

/// Replace the alpha channel of `original` with `mask`
///
/// # Errors
/// - `DimensionMismatch` when the mask size differs from the image size
/// - `Internal` when the mask buffer is shorter than its stated dimensions
pub fn composite(original: &RgbaImage, mask: &InferenceResult) -> Result<RgbaImage> {
    let expected = original.dimensions();
    let actual = (mask.width, mask.height);
    if expected != actual {
        return Err(IdPhotoError::DimensionMismatch { expected, actual });
    }

    let pixel_count = expected.0 as usize * expected.1 as usize;
    if mask.alpha_mask.len() != pixel_count {
        return Err(IdPhotoError::internal(format!(
            "Mask buffer holds {} bytes, expected {pixel_count}",
            mask.alpha_mask.len()
        )));
    }

    let mut output = original.clone();
    for (pixel, &alpha) in output.pixels_mut().zip(&mask.alpha_mask) {
        pixel.0[3] = alpha;
    }
    Ok(output)
}

/// Flatten a cutout onto an opaque background color
#[must_use]
pub fn flatten_onto(cutout: &RgbaImage, background: [u8; 3]) -> RgbaImage {
    let mut output = cutout.clone();
    for pixel in output.pixels_mut() {
        let alpha = u32::from(pixel.0[3]);
        for channel in 0..3 {
            let fg = u32::from(pixel.0[channel]);
            let bg = u32::from(background[channel]);
            pixel.0[channel] = ((fg * alpha + bg * (255 - alpha) + 127) / 255) as u8;
        }
        pixel.0[3] = 255;
    }
    output
}
