//! Auto-crop engine and the crop-box capability
//!
//! Face geometry lives in source-image pixels; crop boxes live in display space.
//! [`DisplayTransform`] is the only place the two are converted.

use crate::{
    config::FramingConstants,
    error::{IdPhotoError, Result},
    face::FaceGeometry,
    types::{Point, Rect, Size},
};
use serde::{Deserialize, Serialize};

/// Scale-and-offset mapping from source pixels to display units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl DisplayTransform {
    #[must_use]
    pub fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    /// Fit an image inside a container, preserving aspect ratio, centered
    #[must_use]
    pub fn fit(image: Size, container: Rect) -> Self {
        let scale = (container.width / f64::from(image.width.max(1)))
            .min(container.height / f64::from(image.height.max(1)));
        let display_width = f64::from(image.width) * scale;
        let display_height = f64::from(image.height) * scale;
        Self {
            scale_x: scale,
            scale_y: scale,
            offset_x: container.x + (container.width - display_width) / 2.0,
            offset_y: container.y + (container.height - display_height) / 2.0,
        }
    }

    #[must_use]
    pub fn x_to_display(&self, x: f64) -> f64 {
        x * self.scale_x + self.offset_x
    }

    #[must_use]
    pub fn y_to_display(&self, y: f64) -> f64 {
        y * self.scale_y + self.offset_y
    }

    #[must_use]
    pub fn point_to_display(&self, point: Point) -> Point {
        Point::new(self.x_to_display(point.x), self.y_to_display(point.y))
    }

    #[must_use]
    pub fn rect_to_display(&self, rect: Rect) -> Rect {
        Rect::new(
            self.x_to_display(rect.x),
            self.y_to_display(rect.y),
            rect.width * self.scale_x,
            rect.height * self.scale_y,
        )
    }

    /// Map a display rectangle back to source pixels
    #[must_use]
    pub fn rect_to_source(&self, rect: Rect) -> Rect {
        Rect::new(
            (rect.x - self.offset_x) / self.scale_x,
            (rect.y - self.offset_y) / self.scale_y,
            rect.width / self.scale_x,
            rect.height / self.scale_y,
        )
    }
}

/// Compute a crop rectangle in display space from face geometry
///
/// The head (skull top to chin) takes `head_to_frame_ratio` of the crop height,
/// `top_margin` of the height sits above the head, and the face is centered
/// horizontally. The result is shrunk uniformly if it is larger than the
/// container, then moved inside it, so its aspect ratio is always
/// `target_aspect_ratio`.
///
/// # Errors
/// - `MissingCropDimensions` for a non-positive aspect ratio, container or head height
pub fn compute_crop(
    face: &FaceGeometry,
    target_aspect_ratio: f64,
    transform: &DisplayTransform,
    container: Rect,
    framing: &FramingConstants,
) -> Result<Rect> {
    if !(target_aspect_ratio.is_finite() && target_aspect_ratio > 0.0) {
        return Err(IdPhotoError::missing_crop_dimensions(format!(
            "target aspect ratio must be positive, got {target_aspect_ratio}"
        )));
    }
    if !(container.width > 0.0 && container.height > 0.0) {
        return Err(IdPhotoError::missing_crop_dimensions(format!(
            "container must have a positive size, got {}x{}",
            container.width, container.height
        )));
    }

    let head_top = transform.y_to_display(face.estimated_head_top);
    let head_height = face.estimated_head_height * transform.scale_y;
    let face_center_x = transform.x_to_display(face.face_center_x());
    if !(head_height > 0.0) {
        return Err(IdPhotoError::missing_crop_dimensions(
            "estimated head height must be positive",
        ));
    }

    let height = head_height / framing.head_to_frame_ratio;
    let (width, height) =
        fit_within(height * target_aspect_ratio, height, target_aspect_ratio, container);

    let left = face_center_x - width / 2.0;
    let top = head_top - framing.top_margin * height;

    Ok(Rect::new(
        place_within(left, width, container.left(), container.right()),
        place_within(top, height, container.top(), container.bottom()),
        width,
        height,
    ))
}

/// Shrink `width` x `height` uniformly until it fits `container`
///
/// The binding side is set to the container side exactly; the other side is
/// derived from `aspect_ratio` and capped so rounding never overflows.
fn fit_within(width: f64, height: f64, aspect_ratio: f64, container: Rect) -> (f64, f64) {
    if width <= container.width && height <= container.height {
        return (width, height);
    }
    if container.width / width <= container.height / height {
        (container.width, (container.width / aspect_ratio).min(container.height))
    } else {
        ((container.height * aspect_ratio).min(container.width), container.height)
    }
}

/// Move a span of `length` starting at `start` inside `[min, max]`
///
/// Never panics: a span longer than the range is pinned to `min`.
fn place_within(start: f64, length: f64, min: f64, max: f64) -> f64 {
    start.min(max - length).max(min)
}

/// Interactive crop-box capability consumed by the auto-crop step
///
/// Rectangles are in display space.
pub trait CropBox {
    /// Fixed aspect ratio (width / height)
    fn aspect_ratio(&self) -> f64;

    fn crop_rect(&self) -> Rect;

    /// Replace the crop rectangle; implementations keep it valid
    fn set_crop_rect(&mut self, rect: Rect);

    /// Zoom the image by a relative ratio (0.1 = 10% larger)
    fn zoom(&mut self, delta: f64);

    fn container_bounds(&self) -> Rect;

    /// Current source-to-display mapping
    fn display_transform(&self) -> DisplayTransform;

    /// Crop rectangle in source pixels
    fn source_crop(&self) -> Rect {
        self.display_transform().rect_to_source(self.crop_rect())
    }
}

/// Headless crop box: image fitted into a fixed viewport
#[derive(Debug, Clone, PartialEq)]
pub struct FixedCropBox {
    aspect_ratio: f64,
    container: Rect,
    transform: DisplayTransform,
    rect: Rect,
}

impl FixedCropBox {
    /// Fit `image` into a `viewport_width` x `viewport_height` container
    ///
    /// The initial crop is the largest rectangle of the given aspect ratio centered
    /// in the container.
    ///
    /// # Errors
    /// - `MissingCropDimensions` for a non-positive aspect ratio or viewport
    pub fn new(
        image: Size,
        viewport_width: f64,
        viewport_height: f64,
        aspect_ratio: f64,
    ) -> Result<Self> {
        if !(aspect_ratio.is_finite() && aspect_ratio > 0.0) {
            return Err(IdPhotoError::missing_crop_dimensions(format!(
                "aspect ratio must be positive, got {aspect_ratio}"
            )));
        }
        if !(viewport_width > 0.0 && viewport_height > 0.0) || image.width == 0 || image.height == 0
        {
            return Err(IdPhotoError::missing_crop_dimensions(
                "viewport and image must have a positive size",
            ));
        }

        let container = Rect::new(0.0, 0.0, viewport_width, viewport_height);
        let mut crop_box = Self {
            aspect_ratio,
            container,
            transform: DisplayTransform::fit(image, container),
            rect: container,
        };
        crop_box.set_crop_rect(container);
        Ok(crop_box)
    }

    fn constrain(&self, rect: Rect) -> Rect {
        let center_x = rect.x + rect.width / 2.0;
        let center_y = rect.y + rect.height / 2.0;

        // Enforce the aspect ratio from the requested width, then fit the container
        let width = rect.width.max(1.0);
        let (width, height) =
            fit_within(width, width / self.aspect_ratio, self.aspect_ratio, self.container);

        Rect::new(
            place_within(
                center_x - width / 2.0,
                width,
                self.container.left(),
                self.container.right(),
            ),
            place_within(
                center_y - height / 2.0,
                height,
                self.container.top(),
                self.container.bottom(),
            ),
            width,
            height,
        )
    }
}

impl CropBox for FixedCropBox {
    fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }

    fn crop_rect(&self) -> Rect {
        self.rect
    }

    fn set_crop_rect(&mut self, rect: Rect) {
        self.rect = self.constrain(rect);
    }

    fn zoom(&mut self, delta: f64) {
        let factor = 1.0 + delta;
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        // Zoom about the container center
        let cx = self.container.x + self.container.width / 2.0;
        let cy = self.container.y + self.container.height / 2.0;
        let t = &mut self.transform;
        t.scale_x *= factor;
        t.scale_y *= factor;
        t.offset_x = cx - (cx - t.offset_x) * factor;
        t.offset_y = cy - (cy - t.offset_y) * factor;
    }

    fn container_bounds(&self) -> Rect {
        self.container
    }

    fn display_transform(&self) -> DisplayTransform {
        self.transform
    }
}

/// Compute the crop for `face` and apply it to `crop_box`
///
/// Returns the applied rectangle in display space.
///
/// # Errors
/// - Same as [`compute_crop`]
pub fn apply_auto_crop(
    face: &FaceGeometry,
    crop_box: &mut dyn CropBox,
    framing: &FramingConstants,
) -> Result<Rect> {
    let rect = compute_crop(
        face,
        crop_box.aspect_ratio(),
        &crop_box.display_transform(),
        crop_box.container_bounds(),
        framing,
    )?;
    crop_box.set_crop_rect(rect);
    Ok(crop_box.crop_rect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(head_top: f64, head_height: f64, left: f64, right: f64) -> FaceGeometry {
        let face_top = head_top + head_height * 0.2;
        FaceGeometry {
            eye_center: Point::new((left + right) / 2.0, face_top + head_height * 0.3),
            face_bounds: Rect::from_edges(left, face_top, right, head_top + head_height),
            estimated_head_top: head_top,
            estimated_head_height: head_height,
            roll_angle_degrees: 0.0,
            source_image_size: Size::new(2000, 2000),
        }
    }

    #[test]
    fn test_crop_follows_framing_rules() {
        let face = face(400.0, 550.0, 800.0, 1200.0);
        let container = Rect::new(0.0, 0.0, 2000.0, 2000.0);
        let framing = FramingConstants::default();

        let rect = compute_crop(&face, 1.0, &DisplayTransform::identity(), container, &framing)
            .unwrap();

        assert!((rect.height - 1000.0).abs() < 1e-9);
        assert!((rect.width - 1000.0).abs() < 1e-9);
        assert!((rect.y - (400.0 - 180.0)).abs() < 1e-9);
        assert!((rect.center_x() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_crop_applies_display_transform() {
        let face = face(400.0, 550.0, 800.0, 1200.0);
        let transform = DisplayTransform {
            scale_x: 0.25,
            scale_y: 0.25,
            offset_x: 10.0,
            offset_y: 20.0,
        };
        let container = Rect::new(0.0, 0.0, 600.0, 600.0);

        let rect =
            compute_crop(&face, 1.0, &transform, container, &FramingConstants::default()).unwrap();

        assert!((rect.height - 250.0).abs() < 1e-9);
        assert!((rect.y - (120.0 - 45.0)).abs() < 1e-9);
        assert!((rect.center_x() - 260.0).abs() < 1e-9);
    }

    #[test]
    fn test_crop_keeps_aspect_and_stays_in_container() {
        let framing = FramingConstants::default();
        let aspects = [1.0, 35.0 / 45.0, 33.0 / 48.0, 5.0 / 7.0, 1.5];
        let faces = [
            face(400.0, 550.0, 800.0, 1200.0),
            face(0.0, 1800.0, 100.0, 1900.0),
            face(1500.0, 400.0, 1700.0, 1990.0),
            face(10.0, 60.0, 0.0, 30.0),
        ];
        let containers = [
            Rect::new(0.0, 0.0, 2000.0, 2000.0),
            Rect::new(0.0, 0.0, 600.0, 400.0),
            Rect::new(50.0, 25.0, 300.0, 900.0),
        ];

        for face in &faces {
            for &aspect in &aspects {
                for container in &containers {
                    let transform = DisplayTransform::fit(face.source_image_size, *container);
                    let rect = compute_crop(face, aspect, &transform, *container, &framing)
                        .unwrap();
                    assert!((rect.width / rect.height - aspect).abs() < 1e-6);
                    assert!(rect.left() >= container.left() - 1e-9);
                    assert!(rect.top() >= container.top() - 1e-9);
                    assert!(rect.right() <= container.right() + 1e-9);
                    assert!(rect.bottom() <= container.bottom() + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_crop_sweep_never_overflows_container() {
        let framing = FramingConstants::default();
        let identity = DisplayTransform::identity();
        let aspects = [1.0, 35.0 / 45.0, 33.0 / 48.0, 5.0 / 7.0];

        for &container_width in &[83.0, 123.45, 360.0, 599.7, 1024.0, 1999.9] {
            let container = Rect::new(0.0, 0.0, container_width, container_width * 0.731);
            for &aspect in &aspects {
                let mut head_height = 0.97;
                while head_height < 2000.0 {
                    let face = face(5.0, head_height, 10.0, 40.0);
                    let rect =
                        compute_crop(&face, aspect, &identity, container, &framing).unwrap();
                    assert!(container.contains_rect(&rect), "{rect:?} in {container:?}");
                    assert!((rect.width / rect.height - aspect).abs() < 1e-6);
                    head_height *= 1.013;
                }
            }
        }
    }

    #[test]
    fn test_crop_box_sweep_never_overflows_container() {
        for &viewport in &[83.0, 123.45, 360.0, 599.7, 1024.0, 1999.9] {
            for &aspect in &[1.0, 0.75, 35.0 / 45.0, 33.0 / 48.0, 5.0 / 7.0] {
                let mut crop_box =
                    FixedCropBox::new(Size::new(1000, 800), viewport, viewport * 0.731, aspect)
                        .unwrap();
                assert!(crop_box.container_bounds().contains_rect(&crop_box.crop_rect()));

                let mut width = 1.0;
                while width < 4000.0 {
                    crop_box.set_crop_rect(Rect::new(0.0, 0.0, width * 0.77, 10.0));
                    let rect = crop_box.crop_rect();
                    assert!(crop_box.container_bounds().contains_rect(&rect), "{rect:?}");
                    assert!((rect.aspect_ratio() - aspect).abs() < 1e-6);
                    width *= 1.01;
                }
            }
        }
    }

    #[test]
    fn test_missing_dimensions_rejected() {
        let face = face(400.0, 550.0, 800.0, 1200.0);
        let container = Rect::new(0.0, 0.0, 100.0, 100.0);
        let framing = FramingConstants::default();
        let identity = DisplayTransform::identity();

        for aspect in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                compute_crop(&face, aspect, &identity, container, &framing),
                Err(IdPhotoError::MissingCropDimensions(_))
            ));
        }
        assert!(compute_crop(&face, 1.0, &identity, Rect::default(), &framing).is_err());
    }

    #[test]
    fn test_transform_round_trip() {
        let transform = DisplayTransform::fit(Size::new(4000, 3000), Rect::new(0.0, 0.0, 600.0, 600.0));
        assert!((transform.scale_x - 0.15).abs() < 1e-12);
        assert!((transform.offset_y - 75.0).abs() < 1e-9);

        let source = Rect::new(100.0, 200.0, 800.0, 1000.0);
        let back = transform.rect_to_source(transform.rect_to_display(source));
        assert!((back.x - source.x).abs() < 1e-9);
        assert!((back.height - source.height).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_crop_box_constrains_rect() {
        let mut crop_box = FixedCropBox::new(Size::new(800, 600), 400.0, 300.0, 0.75).unwrap();

        let initial = crop_box.crop_rect();
        assert!((initial.aspect_ratio() - 0.75).abs() < 1e-9);
        assert!((initial.height - 300.0).abs() < 1e-9);

        crop_box.set_crop_rect(Rect::new(350.0, -20.0, 90.0, 10.0));
        let rect = crop_box.crop_rect();
        assert!((rect.aspect_ratio() - 0.75).abs() < 1e-9);
        assert!(crop_box.container_bounds().contains_rect(&rect));
    }

    #[test]
    fn test_zoom_changes_source_crop() {
        let mut crop_box = FixedCropBox::new(Size::new(600, 600), 600.0, 600.0, 1.0).unwrap();
        let before = crop_box.source_crop();
        crop_box.zoom(1.0);
        let after = crop_box.source_crop();
        assert!((after.width - before.width / 2.0).abs() < 1e-9);

        let transform = crop_box.display_transform();
        crop_box.zoom(-1.0);
        assert_eq!(transform, crop_box.display_transform());
    }

    #[test]
    fn test_apply_auto_crop_through_crop_box() {
        let face = face(400.0, 550.0, 800.0, 1200.0);
        let mut crop_box = FixedCropBox::new(Size::new(2000, 2000), 600.0, 600.0, 1.0).unwrap();

        let applied =
            apply_auto_crop(&face, &mut crop_box, &FramingConstants::default()).unwrap();
        let source = crop_box.source_crop();

        assert_eq!(applied, crop_box.crop_rect());
        assert!((source.height - 1000.0).abs() < 1e-6);
        assert!((source.y - 220.0).abs() < 1e-6);
    }
}
