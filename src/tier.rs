//! Memory tier classification
//!
//! Picks a processor resolution and execution venue from coarse device signals.
//! Selection is a pure function; the caller logs the decision once per session.

use serde::{Deserialize, Serialize};

/// Where a segmentation pass runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionVenue {
    /// Dedicated worker task that keeps its model warm across calls
    Isolated,
    /// The caller's own context; model state is released after every call
    MainContext,
}

impl std::fmt::Display for ExecutionVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Isolated => write!(f, "isolated"),
            Self::MainContext => write!(f, "main-context"),
        }
    }
}

/// Ranked tier identifiers, highest resource assumption first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierLevel {
    High,
    Medium,
    Low,
}

/// Fixed fallback order
pub const TIER_ORDER: [TierLevel; 3] = [TierLevel::High, TierLevel::Medium, TierLevel::Low];

impl TierLevel {
    /// Parameters of this tier
    #[must_use]
    pub fn tier(self) -> MemoryTier {
        match self {
            Self::High => MemoryTier {
                level: self,
                processor_resolution: 1024,
                max_image_dimension: 2048,
                venue: ExecutionVenue::Isolated,
            },
            Self::Medium => MemoryTier {
                level: self,
                processor_resolution: 768,
                max_image_dimension: 1200,
                venue: ExecutionVenue::Isolated,
            },
            Self::Low => MemoryTier {
                level: self,
                processor_resolution: 256,
                max_image_dimension: 1200,
                venue: ExecutionVenue::MainContext,
            },
        }
    }

    /// Next tier down, if any
    #[must_use]
    pub fn lower(self) -> Option<Self> {
        match self {
            Self::High => Some(Self::Medium),
            Self::Medium => Some(Self::Low),
            Self::Low => None,
        }
    }

    /// This tier followed by every lower tier, in order
    pub fn descending(self) -> impl Iterator<Item = TierLevel> {
        TIER_ORDER.into_iter().filter(move |level| *level >= self)
    }
}

impl std::fmt::Display for TierLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for TierLevel {
    type Err = crate::error::IdPhotoError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(crate::error::IdPhotoError::invalid_config(format!(
                "Unknown tier '{other}' (expected high, medium or low)"
            ))),
        }
    }
}

/// Resolution and venue for segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryTier {
    pub level: TierLevel,
    /// Square edge the model runs at
    pub processor_resolution: u32,
    /// Longest side allowed for the working image
    pub max_image_dimension: u32,
    pub venue: ExecutionVenue,
}

/// Coarse device form factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    #[default]
    Desktop,
    Mobile,
}

/// Operating system family, as far as tier selection cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Mobile OS with a small per-worker memory ceiling
    Ios,
    Android,
    #[default]
    Other,
}

impl OsFamily {
    fn has_restrictive_worker_memory(self) -> bool {
        matches!(self, Self::Ios)
    }
}

/// Read-only device capability signals
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceSignals {
    pub form_factor: FormFactor,
    pub os: OsFamily,
    /// Shorter screen side in CSS pixels
    pub screen_min_dimension: Option<u32>,
    /// Reported device memory in GiB
    pub device_memory_gb: Option<f64>,
}

/// Screens at least this wide (short side) count as tablet-class
const LARGE_SCREEN_MIN_DIMENSION: u32 = 768;

/// Select the memory tier for a device
///
/// Always returns a tier; the result depends only on `signals`.
#[must_use]
pub fn select_tier(signals: &DeviceSignals) -> MemoryTier {
    select_level(signals).tier()
}

fn select_level(signals: &DeviceSignals) -> TierLevel {
    if signals.form_factor == FormFactor::Desktop {
        return TierLevel::High;
    }

    if signals.os.has_restrictive_worker_memory() {
        return match signals.screen_min_dimension {
            Some(min_dim) if min_dim >= LARGE_SCREEN_MIN_DIMENSION => TierLevel::Medium,
            _ => TierLevel::Low,
        };
    }

    match signals.device_memory_gb {
        Some(memory) if memory >= 8.0 => TierLevel::High,
        Some(memory) if memory >= 4.0 => TierLevel::Medium,
        Some(_) => TierLevel::Low,
        None => TierLevel::Medium,
    }
}
