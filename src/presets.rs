//! Regulatory photo presets
//!
//! Static catalog of ID document formats with their physical print size and the
//! framing tolerances checked by [`crate::compliance`].

use serde::Serialize;
use std::fmt;

/// Physical unit of a preset's print size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhysicalUnit {
    Inches,
    Cm,
}

impl PhysicalUnit {
    /// Convert a length in this unit to pixels at `dpi`
    #[must_use]
    pub fn to_pixels(self, length: f64, dpi: u32) -> u32 {
        let inches = match self {
            Self::Inches => length,
            Self::Cm => length / 2.54,
        };
        (inches * f64::from(dpi)).round().max(1.0) as u32
    }
}

impl fmt::Display for PhysicalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inches => write!(f, "in"),
            Self::Cm => write!(f, "cm"),
        }
    }
}

/// Inclusive `[min, max]` fraction of the crop height
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FractionRange {
    pub min: f64,
    pub max: f64,
}

impl FractionRange {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A named regulatory photo specification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompliancePreset {
    /// Stable identifier, e.g. `us-passport`
    pub id: &'static str,
    pub label: &'static str,
    pub region: &'static str,
    pub width: f64,
    pub height: f64,
    pub unit: PhysicalUnit,
    pub head_height_fraction: FractionRange,
    /// Eye height measured from the bottom edge; not every document defines one
    pub eye_height_fraction: Option<FractionRange>,
    pub max_tilt_degrees: f64,
}

impl CompliancePreset {
    /// Print width divided by print height
    #[must_use]
    pub fn target_aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    /// Print size in pixels at `dpi`
    #[must_use]
    pub fn pixel_size(&self, dpi: u32) -> (u32, u32) {
        (
            self.unit.to_pixels(self.width, dpi),
            self.unit.to_pixels(self.height, dpi),
        )
    }
}

impl fmt::Display for CompliancePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{} {}, {})",
            self.label, self.width, self.height, self.unit, self.region
        )
    }
}

const fn preset(
    id: &'static str,
    label: &'static str,
    region: &'static str,
    size: (f64, f64, PhysicalUnit),
    head: (f64, f64),
    eye: (f64, f64),
) -> CompliancePreset {
    CompliancePreset {
        id,
        label,
        region,
        width: size.0,
        height: size.1,
        unit: size.2,
        head_height_fraction: FractionRange::new(head.0, head.1),
        eye_height_fraction: Some(FractionRange::new(eye.0, eye.1)),
        max_tilt_degrees: 5.0,
    }
}

const NORTH_AMERICA: &str = "North America";
const EUROPE: &str = "Europe";
const ASIA_PACIFIC: &str = "Asia-Pacific";

/// Every supported preset, in display order
#[rustfmt::skip]
pub static PRESETS: [CompliancePreset; 9] = [
    preset("us-passport", "US Passport", NORTH_AMERICA, (2.0, 2.0, PhysicalUnit::Inches), (0.50, 0.69), (0.56, 0.69)),
    preset("us-visa", "US Visa", NORTH_AMERICA, (2.0, 2.0, PhysicalUnit::Inches), (0.50, 0.69), (0.56, 0.69)),
    preset("canada-passport", "Canada Passport", NORTH_AMERICA, (5.0, 7.0, PhysicalUnit::Cm), (0.46, 0.63), (0.55, 0.65)),
    preset("eu-schengen-id", "EU/Schengen ID", EUROPE, (3.5, 4.5, PhysicalUnit::Cm), (0.70, 0.80), (0.60, 0.70)),
    preset("uk-passport", "UK Passport", EUROPE, (3.5, 4.5, PhysicalUnit::Cm), (0.70, 0.80), (0.60, 0.70)),
    preset("china-passport", "China Passport", ASIA_PACIFIC, (3.3, 4.8, PhysicalUnit::Cm), (0.50, 0.70), (0.55, 0.70)),
    preset("india-passport", "India Passport", ASIA_PACIFIC, (3.5, 3.5, PhysicalUnit::Cm), (0.50, 0.70), (0.55, 0.70)),
    preset("japan-passport", "Japan Passport", ASIA_PACIFIC, (3.5, 4.5, PhysicalUnit::Cm), (0.70, 0.80), (0.60, 0.70)),
    preset("australia-passport", "Australia Passport", ASIA_PACIFIC, (3.5, 4.5, PhysicalUnit::Cm), (0.70, 0.80), (0.60, 0.70)),
];

/// Look up a preset by id or label, ignoring case
#[must_use]
pub fn find_preset(name: &str) -> Option<&'static CompliancePreset> {
    let name = name.trim();
    PRESETS
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(name) || p.label.eq_ignore_ascii_case(name))
}

/// The preset used when none is chosen
#[must_use]
pub fn default_preset() -> &'static CompliancePreset {
    &PRESETS[0]
}
