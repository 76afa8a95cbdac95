//! Segmentation pre- and postprocessing
//!
//! The processor config is fixed apart from its square size: channel mean 0.5,
//! std 1.0, rescale by 1/255, bilinear resampling, no padding.

use crate::{
    error::{IdPhotoError, Result},
    types::InferenceResult,
};
use image::{imageops::FilterType, GrayImage, RgbImage};
use ndarray::Array4;

/// Resampling used in both directions
pub const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Processor configuration for one resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    /// Square edge the image is resized to
    pub target_size: u32,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
    pub rescale_factor: f32,
}

impl PreprocessingConfig {
    /// Build the processor configuration for a square resolution
    #[must_use]
    pub fn for_resolution(target_size: u32) -> Self {
        Self {
            target_size,
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
            rescale_factor: 1.0 / 255.0,
        }
    }
}

/// Image preprocessing for the segmentation model
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Resize to `target_size` square and convert to a normalized NCHW tensor
    ///
    /// # Errors
    /// - Zero-sized input image or zero target size
    pub fn preprocess(image: &RgbImage, config: &PreprocessingConfig) -> Result<Array4<f32>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(IdPhotoError::inference("Cannot preprocess an empty image"));
        }
        if config.target_size == 0 {
            return Err(IdPhotoError::invalid_config(
                "Processor resolution must be positive",
            ));
        }

        let resized = image::imageops::resize(
            image,
            config.target_size,
            config.target_size,
            RESAMPLE_FILTER,
        );
        Ok(Self::canvas_to_tensor(&resized, config))
    }

    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let size = config.target_size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        #[allow(clippy::indexing_slicing)]
        // tensor is allocated to the canvas size
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) * config.rescale_factor;
                tensor[[0, channel, y as usize, x as usize]] = (value
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
            }
        }

        tensor
    }

    /// Turn a `[1, 1, S, S]` probability map into an alpha mask at the original size
    ///
    /// Probabilities are scaled to 0-255 and resized back with the same resampling
    /// used in preprocessing.
    ///
    /// # Errors
    /// - Output tensor is not a single-channel square map
    pub fn postprocess(
        output: &Array4<f32>,
        original_width: u32,
        original_height: u32,
    ) -> Result<InferenceResult> {
        let shape = output.shape();
        let (channels, out_h, out_w) = match shape {
            [1, c, h, w] => (*c, *h, *w),
            _ => {
                return Err(IdPhotoError::inference(format!(
                    "Unexpected segmentation output shape {shape:?}"
                )))
            },
        };
        if channels != 1 || out_h == 0 || out_w == 0 {
            return Err(IdPhotoError::inference(format!(
                "Expected single-channel mask output, got shape {shape:?}"
            )));
        }

        let mut mask = GrayImage::new(out_w as u32, out_h as u32);
        for (x, y, pixel) in mask.enumerate_pixels_mut() {
            let probability = output
                .get([0, 0, y as usize, x as usize])
                .copied()
                .unwrap_or(0.0);
            pixel[0] = (probability.clamp(0.0, 1.0) * 255.0).round() as u8;
        }

        let resized = if mask.dimensions() == (original_width, original_height) {
            mask
        } else {
            image::imageops::resize(&mask, original_width, original_height, RESAMPLE_FILTER)
        };

        Ok(InferenceResult {
            alpha_mask: resized.into_raw(),
            width: original_width,
            height: original_height,
        })
    }

    /// Downscale so the longest side is at most `max_dimension`
    ///
    /// Aspect ratio is kept and dimensions round to the nearest pixel. Images
    /// already within the bound come back untouched.
    #[must_use]
    pub fn resize_to_max_dimension(
        image: image::DynamicImage,
        max_dimension: u32,
    ) -> image::DynamicImage {
        let (width, height) = (image.width(), image.height());
        let longest = width.max(height);
        if longest <= max_dimension || max_dimension == 0 {
            return image;
        }

        let scale = f64::from(max_dimension) / f64::from(longest);
        let new_width = ((f64::from(width) * scale).round() as u32).max(1);
        let new_height = ((f64::from(height) * scale).round() as u32).max(1);
        log::debug!("Downscaling {width}x{height} to {new_width}x{new_height}");
        image.resize_exact(new_width, new_height, RESAMPLE_FILTER)
    }
}
