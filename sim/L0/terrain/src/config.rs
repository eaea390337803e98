//! Terrain configuration.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};

/// Output vertex count per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VertexCount {
    /// Keep the source resolution.
    #[default]
    UseSource,
    /// Subsample to exactly `x` by `y` vertices. Both must be equal and `2^n + 1`.
    Explicit {
        /// Vertices along X.
        x: usize,
        /// Vertices along Y.
        y: usize,
    },
}

/// Reference for the bottom of the rescaled elevation range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HeightDatum {
    /// The source minimum maps to `base_offset`.
    #[default]
    Base,
    /// The source minimum maps to `base_offset + source_min`, keeping signed
    /// dataset elevations in place.
    Source,
}

/// What `volume_estimate` does when the backend cannot integrate volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VolumeFallback {
    /// Report `CapabilityUnavailable`.
    #[default]
    Disabled,
    /// Sum mean cell elevation times cell area over the cached grid.
    CellSum,
}

/// Configuration of a terrain shape.
///
/// # Example
///
/// ```
/// use sim_terrain::{TerrainConfig, VolumeFallback};
/// use nalgebra::{Point3, Vector3};
///
/// let config = TerrainConfig::new(Vector3::new(129.0, 129.0, 10.0))
///     .at_position(Point3::new(0.0, 0.0, -1.0))
///     .with_vertex_count(65, 65)
///     .with_volume_fallback(VolumeFallback::CellSum);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TerrainConfig {
    /// Footprint along X and Y, and elevation range along Z.
    pub size: Vector3<f64>,
    /// World position of the footprint center at the base plane.
    pub position: Point3<f64>,
    /// Output vertex count.
    pub vertex_count: VertexCount,
    /// Elevation assigned to the lowest source sample.
    pub base_offset: f64,
    /// Datum for rescaling.
    pub datum: HeightDatum,
    /// Volume fallback policy.
    pub volume_fallback: VolumeFallback,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            size: Vector3::new(1.0, 1.0, 1.0),
            position: Point3::origin(),
            vertex_count: VertexCount::UseSource,
            base_offset: 0.0,
            datum: HeightDatum::Base,
            volume_fallback: VolumeFallback::Disabled,
        }
    }
}

impl TerrainConfig {
    /// Create a configuration with the given size and defaults otherwise.
    #[must_use]
    pub fn new(size: Vector3<f64>) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Set the world position.
    #[must_use]
    pub fn at_position(mut self, position: Point3<f64>) -> Self {
        self.position = position;
        self
    }

    /// Request an explicit vertex count.
    #[must_use]
    pub fn with_vertex_count(mut self, x: usize, y: usize) -> Self {
        self.vertex_count = VertexCount::Explicit { x, y };
        self
    }

    /// Set the base offset.
    #[must_use]
    pub fn with_base_offset(mut self, offset: f64) -> Self {
        self.base_offset = offset;
        self
    }

    /// Set the height datum.
    #[must_use]
    pub fn with_datum(mut self, datum: HeightDatum) -> Self {
        self.datum = datum;
        self
    }

    /// Set the volume fallback policy.
    #[must_use]
    pub fn with_volume_fallback(mut self, fallback: VolumeFallback) -> Self {
        self.volume_fallback = fallback;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::InvalidConfig`] for non-finite values, a
    /// non-positive footprint, a negative Z range, or a zero vertex count.
    pub fn validate(&self) -> Result<()> {
        if !self.size.iter().all(|v| v.is_finite()) {
            return Err(TerrainError::invalid_config("size must be finite"));
        }
        if self.size.x <= 0.0 || self.size.y <= 0.0 {
            return Err(TerrainError::invalid_config(format!(
                "footprint must be positive, got {}×{}",
                self.size.x, self.size.y
            )));
        }
        if self.size.z < 0.0 {
            return Err(TerrainError::invalid_config(format!(
                "elevation range must be non-negative, got {}",
                self.size.z
            )));
        }
        if !self.position.coords.iter().all(|v| v.is_finite()) {
            return Err(TerrainError::invalid_config("position must be finite"));
        }
        if !self.base_offset.is_finite() {
            return Err(TerrainError::invalid_config("base offset must be finite"));
        }
        if let VertexCount::Explicit { x, y } = self.vertex_count {
            if x == 0 || y == 0 {
                return Err(TerrainError::invalid_config(
                    "explicit vertex count must be positive",
                ));
            }
        }
        Ok(())
    }
}
