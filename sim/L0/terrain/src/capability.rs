//! Per-backend capability flags.
//!
//! Backends differ in what they can represent. The facade consults these flags
//! before delegating so that a missing feature surfaces as
//! [`TerrainError::CapabilityUnavailable`](crate::TerrainError) or a
//! documented fallback, never as a silently wrong value.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An optional feature that a backend or build may lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Capability {
    /// Integration of the enclosed solid volume.
    Volume,
    /// Elevations below the shape's base plane.
    NegativeElevation,
    /// Decoding of geo-referenced elevation datasets.
    GeodataDecoding,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Volume => "volume integration",
            Self::NegativeElevation => "negative elevation",
            Self::GeodataDecoding => "geodata decoding",
        };
        f.write_str(name)
    }
}

/// How a backend treats elevations below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NegativeElevation {
    /// Represented as-is.
    Native,
    /// Raised to zero before building.
    Clamp,
    /// Build fails with `BackendBuildFailure`.
    Reject,
}

/// Capability flags for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BackendCapabilities {
    /// Whether the backend integrates volume itself.
    pub supports_volume: bool,
    /// Policy for samples below zero.
    pub negative_elevation: NegativeElevation,
    /// Whether `height_at` reads stored samples without arithmetic.
    pub exact_heights: bool,
    /// Largest grid side the backend accepts.
    pub max_side: usize,
}

impl BackendCapabilities {
    /// Whether negative elevations survive building unchanged.
    #[must_use]
    pub fn supports_negative_elevation(&self) -> bool {
        self.negative_elevation == NegativeElevation::Native
    }

    /// Check a single capability.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Volume => self.supports_volume,
            Capability::NegativeElevation => self.supports_negative_elevation(),
            Capability::GeodataDecoding => geodata_available(),
        }
    }
}

/// Whether this build can decode elevation datasets.
#[must_use]
pub const fn geodata_available() -> bool {
    cfg!(feature = "geodata")
}
