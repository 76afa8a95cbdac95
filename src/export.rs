//! Print export of the finalized crop

use crate::{
    compositor::flatten_onto,
    error::{IdPhotoError, Result},
    presets::CompliancePreset,
    types::Rect,
    utils::preprocessing::RESAMPLE_FILTER,
};
use image::{imageops, DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Background behind transparent or out-of-image areas
pub const PRINT_BACKGROUND: [u8; 3] = [255, 255, 255];

/// Render `crop` (source pixels) at the preset's physical size and `dpi`
///
/// Transparent pixels are flattened onto white. Parts of the crop outside the
/// image are white too.
///
/// # Errors
/// - `MissingCropDimensions` for an empty crop rectangle
pub fn render_print(
    image: &DynamicImage,
    crop: Rect,
    preset: &CompliancePreset,
    dpi: u32,
) -> Result<RgbaImage> {
    if !(crop.width > 0.0 && crop.height > 0.0) {
        return Err(IdPhotoError::missing_crop_dimensions(format!(
            "crop must have a positive size, got {}x{}",
            crop.width, crop.height
        )));
    }

    let (out_width, out_height) = preset.pixel_size(dpi);
    let [r, g, b] = PRINT_BACKGROUND;
    let mut canvas = RgbaImage::from_pixel(out_width, out_height, Rgba([r, g, b, 255]));

    let scale_x = f64::from(out_width) / crop.width;
    let scale_y = f64::from(out_height) / crop.height;

    let left = crop.left().max(0.0).round();
    let top = crop.top().max(0.0).round();
    let right = crop.right().min(f64::from(image.width())).round();
    let bottom = crop.bottom().min(f64::from(image.height())).round();
    if right <= left || bottom <= top {
        log::warn!("Crop lies entirely outside the image; exporting a blank print");
        return Ok(canvas);
    }

    let source = image
        .crop_imm(left as u32, top as u32, (right - left) as u32, (bottom - top) as u32)
        .to_rgba8();
    let dest_width = (((right - left) * scale_x).round() as u32).max(1);
    let dest_height = (((bottom - top) * scale_y).round() as u32).max(1);
    let resized = imageops::resize(&source, dest_width, dest_height, RESAMPLE_FILTER);
    let flat = flatten_onto(&resized, PRINT_BACKGROUND);

    let dest_x = ((left - crop.left()) * scale_x).round() as i64;
    let dest_y = ((top - crop.top()) * scale_y).round() as i64;
    imageops::overlay(&mut canvas, &flat, dest_x, dest_y);
    Ok(canvas)
}

/// Encode an image as PNG bytes
///
/// # Errors
/// - Encoder failures
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Render and PNG-encode in one step
///
/// # Errors
/// - Same as [`render_print`] and [`encode_png`]
pub fn export_png(
    image: &DynamicImage,
    crop: Rect,
    preset: &CompliancePreset,
    dpi: u32,
) -> Result<Vec<u8>> {
    let print = render_print(image, crop, preset, dpi)?;
    log::info!(
        "Exporting {} at {}x{} ({dpi} dpi)",
        preset.label,
        print.width(),
        print.height()
    );
    encode_png(&print)
}
