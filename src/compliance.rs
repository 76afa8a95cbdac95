//! Compliance checking of a finalized crop against a preset
//!
//! All inputs are in source-image pixels. Display-space crops must be mapped back
//! with [`crate::crop::DisplayTransform::rect_to_source`] first.

use crate::{
    config::FramingConstants,
    error::{IdPhotoError, Result},
    face::FaceGeometry,
    presets::{CompliancePreset, FractionRange},
    types::Rect,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single compliance check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckId {
    HeadHeight,
    EyeHeight,
    HorizontalCenter,
    HeadTilt,
    FaceInFrame,
    TopMargin,
}

impl CheckId {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeadHeight => "head-height",
            Self::EyeHeight => "eye-height",
            Self::HorizontalCenter => "horizontal-center",
            Self::HeadTilt => "head-tilt",
            Self::FaceInFrame => "face-in-frame",
            Self::TopMargin => "top-margin",
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub id: CheckId,
    pub passed: bool,
    /// Human-readable measurement, e.g. `Head tilt: 7.5°`
    pub measured: String,
    /// Human-readable requirement, absent for boolean checks
    pub required_range: Option<String>,
}

impl fmt::Display for ComplianceCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "[{mark}] {}", self.measured)?;
        if let Some(required) = &self.required_range {
            write!(f, " (required: {required})")?;
        }
        Ok(())
    }
}

/// All evaluated checks for one crop and preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub checks: Vec<ComplianceCheck>,
    pub all_passed: bool,
}

impl ComplianceReport {
    /// Look up a check by id
    #[must_use]
    pub fn get(&self, id: CheckId) -> Option<&ComplianceCheck> {
        self.checks.iter().find(|c| c.id == id)
    }

    /// Checks that did not pass
    pub fn failures(&self) -> impl Iterator<Item = &ComplianceCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

fn percent(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}

fn percent_range(range: FractionRange) -> String {
    format!("{}\u{2013}{}", percent(range.min), percent(range.max))
}

/// Validate `crop` (source pixels) against `preset`
///
/// Pure: identical inputs always yield an identical report.
///
/// # Errors
/// - `MissingCropDimensions` when the crop has no positive width and height
pub fn check(
    face: &FaceGeometry,
    crop: Rect,
    preset: &CompliancePreset,
    framing: &FramingConstants,
) -> Result<ComplianceReport> {
    if !(crop.width > 0.0 && crop.height > 0.0) {
        return Err(IdPhotoError::missing_crop_dimensions(format!(
            "crop must have a positive size, got {}x{}",
            crop.width, crop.height
        )));
    }

    let mut checks = Vec::with_capacity(6);

    let head_ratio = face.estimated_head_height / crop.height;
    checks.push(ComplianceCheck {
        id: CheckId::HeadHeight,
        passed: preset.head_height_fraction.contains(head_ratio),
        measured: format!("Head height: {} of frame", percent(head_ratio)),
        required_range: Some(percent_range(preset.head_height_fraction)),
    });

    if let Some(eye_range) = preset.eye_height_fraction {
        let eye_from_bottom = (crop.bottom() - face.eye_center.y) / crop.height;
        checks.push(ComplianceCheck {
            id: CheckId::EyeHeight,
            passed: eye_range.contains(eye_from_bottom),
            measured: format!("Eye position: {} from bottom", percent(eye_from_bottom)),
            required_range: Some(percent_range(eye_range)),
        });
    }

    let center_deviation = ((face.face_center_x() - crop.x) / crop.width - 0.5).abs();
    checks.push(ComplianceCheck {
        id: CheckId::HorizontalCenter,
        passed: center_deviation < framing.centering_tolerance,
        measured: format!(
            "Face centering: {:.1}% off-center",
            center_deviation * 100.0
        ),
        required_range: Some(format!("< {}", percent(framing.centering_tolerance))),
    });

    let tilt = face.roll_angle_degrees.abs();
    checks.push(ComplianceCheck {
        id: CheckId::HeadTilt,
        passed: tilt < preset.max_tilt_degrees,
        measured: format!("Head tilt: {tilt:.1}\u{b0}"),
        required_range: Some(format!("< {}\u{b0}", preset.max_tilt_degrees)),
    });

    let in_frame = crop.contains_rect(&face.face_bounds);
    checks.push(ComplianceCheck {
        id: CheckId::FaceInFrame,
        passed: in_frame,
        measured: if in_frame {
            "Face fully within frame".to_string()
        } else {
            "Face partially outside frame".to_string()
        },
        required_range: None,
    });

    let (band_min, band_max) = framing.top_margin_band;
    let top_margin = (face.estimated_head_top - crop.y) / crop.height;
    let band = FractionRange::new(band_min, band_max);
    checks.push(ComplianceCheck {
        id: CheckId::TopMargin,
        passed: band.contains(top_margin),
        measured: format!("Top margin: {}", percent(top_margin)),
        required_range: Some(percent_range(band)),
    });

    let all_passed = checks.iter().all(|c| c.passed);
    Ok(ComplianceReport { checks, all_passed })
}
