//! Interchangeable physics backends for terrain geometry.
//!
//! Each [`Backend`] variant turns a normalized [`ElevationGrid`] into its own
//! native representation:
//!
//! | Backend        | Representation              | Volume | Negative elevation |
//! |----------------|-----------------------------|--------|--------------------|
//! | `HeightField`  | grid-sampled height field   | exact  | native             |
//! | `TriangleMesh` | two triangles per grid cell | prism  | rejected           |
//! | `Sdf`          | column signed-distance grid | none   | clamped to zero    |
//!
//! All backends accept raster-order grid indices and world coordinates. The
//! translation to each native convention happens inside the backend.
//!
//! Building is eager: all derived data (vertices, triangles, distance values,
//! volume) is computed once in [`Backend::build`], so queries never mutate.

mod heightfield;
mod mesh;
mod sdf;

use std::borrow::Cow;
use std::str::FromStr;

use nalgebra::{Point2, Vector3};
use sim_types::Pose;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::capability::{BackendCapabilities, Capability, NegativeElevation};
use crate::config::TerrainConfig;
use crate::error::{Result, TerrainError};
use crate::grid::ElevationGrid;

pub use self::heightfield::{HeightFieldData, HeightFieldGeometry};
pub use self::mesh::{Triangle, TriangleMeshData, TriangleMeshGeometry};
pub use self::sdf::{SdfColumnData, SdfGeometry};

/// Physics backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Backend {
    /// Grid-sampled height field.
    HeightField,
    /// Explicit triangle mesh.
    TriangleMesh,
    /// Implicit surface from a signed-distance grid.
    Sdf,
}

impl Backend {
    /// Every backend, in a stable order.
    pub const ALL: [Self; 3] = [Self::HeightField, Self::TriangleMesh, Self::Sdf];

    /// Largest grid side accepted by any backend.
    #[must_use]
    pub fn max_supported_side() -> usize {
        Self::ALL
            .into_iter()
            .map(|b| b.capabilities().max_side)
            .max()
            .unwrap_or(crate::grid::MIN_SIDE)
    }

    /// Short identifier.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::HeightField => "heightfield",
            Self::TriangleMesh => "triangle-mesh",
            Self::Sdf => "sdf",
        }
    }

    /// Capability flags.
    #[must_use]
    pub fn capabilities(self) -> BackendCapabilities {
        match self {
            Self::HeightField => BackendCapabilities {
                supports_volume: true,
                negative_elevation: NegativeElevation::Native,
                exact_heights: true,
                max_side: 8193,
            },
            Self::TriangleMesh => BackendCapabilities {
                supports_volume: true,
                negative_elevation: NegativeElevation::Reject,
                exact_heights: true,
                max_side: 4097,
            },
            Self::Sdf => BackendCapabilities {
                supports_volume: false,
                negative_elevation: NegativeElevation::Clamp,
                exact_heights: false,
                max_side: 2049,
            },
        }
    }

    /// Build native geometry from a normalized grid.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::BackendBuildFailure`] if the grid exceeds the
    /// backend's size limit or holds negative elevations it rejects.
    pub fn build(self, grid: &ElevationGrid, config: &TerrainConfig) -> Result<BackendGeometry> {
        let caps = self.capabilities();
        if grid.side() > caps.max_side {
            return Err(TerrainError::build_failure(
                self,
                format!(
                    "{}×{} grid exceeds the limit of {}×{}",
                    grid.side(),
                    grid.side(),
                    caps.max_side,
                    caps.max_side
                ),
            ));
        }

        let grid = if grid.min_elevation() < 0.0 {
            match caps.negative_elevation {
                NegativeElevation::Native => Cow::Borrowed(grid),
                NegativeElevation::Clamp => {
                    warn!(
                        backend = self.name(),
                        min = grid.min_elevation(),
                        "negative elevations clamped to zero"
                    );
                    Cow::Owned(grid.clamped_below(0.0))
                }
                NegativeElevation::Reject => {
                    return Err(TerrainError::build_failure(
                        self,
                        format!(
                            "{} (minimum elevation {})",
                            Capability::NegativeElevation,
                            grid.min_elevation()
                        ),
                    ));
                }
            }
        } else {
            Cow::Borrowed(grid)
        };

        let placement = Placement::new(config, &grid);
        let geometry = match self {
            Self::HeightField => {
                BackendGeometry::HeightField(HeightFieldGeometry::build(&grid, placement))
            }
            Self::TriangleMesh => {
                BackendGeometry::TriangleMesh(TriangleMeshGeometry::build(&grid, placement))
            }
            Self::Sdf => BackendGeometry::Sdf(SdfGeometry::build(&grid, placement)),
        };
        debug!(backend = self.name(), side = grid.side(), "built backend geometry");
        Ok(geometry)
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = TerrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "heightfield" | "height-field" | "height_field" => Ok(Self::HeightField),
            "triangle-mesh" | "triangle_mesh" | "mesh" | "trimesh" => Ok(Self::TriangleMesh),
            "sdf" => Ok(Self::Sdf),
            other => Err(TerrainError::invalid_config(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

/// Where a grid sits in the world.
///
/// The footprint is centered on `pose.position` in X and Y. Elevations are
/// measured from `pose.position.z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Placement {
    pub pose: Pose,
    pub size: Vector3<f64>,
}

impl Placement {
    /// Footprint from the grid extent, elevation range from the config.
    pub(crate) fn new(config: &TerrainConfig, grid: &ElevationGrid) -> Self {
        let extent = grid.extent();
        Self {
            pose: Pose::from_position(config.position),
            size: Vector3::new(extent.x, extent.y, config.size.z),
        }
    }

    /// World XY of the north-west corner, which is raster index `(0, 0)`.
    pub(crate) fn north_west(&self) -> Point2<f64> {
        let p = self.pose.position;
        Point2::new(p.x - self.size.x * 0.5, p.y + self.size.y * 0.5)
    }

    /// World XY of the south-west corner.
    pub(crate) fn south_west(&self) -> Point2<f64> {
        let p = self.pose.position;
        Point2::new(p.x - self.size.x * 0.5, p.y - self.size.y * 0.5)
    }
}

/// Backend-native terrain geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendGeometry {
    /// Height field representation.
    HeightField(HeightFieldGeometry),
    /// Triangle mesh representation.
    TriangleMesh(TriangleMeshGeometry),
    /// Signed-distance representation.
    Sdf(SdfGeometry),
}

impl BackendGeometry {
    /// Backend that built this geometry.
    #[must_use]
    pub fn backend(&self) -> Backend {
        match self {
            Self::HeightField(_) => Backend::HeightField,
            Self::TriangleMesh(_) => Backend::TriangleMesh,
            Self::Sdf(_) => Backend::Sdf,
        }
    }

    /// Elevation at raster index `(x, y)`, relative to the base plane.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::IndexOutOfBounds`] outside the vertex grid.
    pub fn height_at(&self, x: usize, y: usize) -> Result<f64> {
        let (side, _) = self.vertex_count();
        let height = match self {
            Self::HeightField(g) => g.height_at(x, y),
            Self::TriangleMesh(g) => g.height_at(x, y),
            Self::Sdf(g) => g.height_at(x, y),
        };
        height.ok_or(TerrainError::IndexOutOfBounds { x, y, side })
    }

    /// Vertices along X and Y.
    #[must_use]
    pub fn vertex_count(&self) -> (usize, usize) {
        match self {
            Self::HeightField(g) => g.vertex_count(),
            Self::TriangleMesh(g) => g.vertex_count(),
            Self::Sdf(g) => g.vertex_count(),
        }
    }

    /// Enclosed volume above the datum `min(0, min_elevation)`.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::CapabilityUnavailable`] for backends that do
    /// not integrate volume.
    pub fn volume(&self) -> Result<f64> {
        match self {
            Self::HeightField(g) => Ok(g.volume()),
            Self::TriangleMesh(g) => Ok(g.volume()),
            Self::Sdf(_) => Err(TerrainError::unavailable(
                Capability::Volume,
                "sdf backend has no closed-form volume",
            )),
        }
    }

    /// World pose of the footprint center at the base plane.
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.placement().pose
    }

    /// Footprint along X and Y, elevation range along Z.
    #[must_use]
    pub fn size(&self) -> Vector3<f64> {
        self.placement().size
    }

    /// World Z of the surface above world `(x, y)`, or `None` off the footprint.
    #[must_use]
    pub fn surface_height(&self, x: f64, y: f64) -> Option<f64> {
        let local = match self {
            Self::HeightField(g) => g.sample(x, y),
            Self::TriangleMesh(g) => g.sample(x, y),
            Self::Sdf(g) => g.sample(x, y),
        }?;
        Some(self.placement().pose.position.z + local)
    }

    /// Upward surface normal at world `(x, y)`, or `None` off the footprint.
    #[must_use]
    pub fn surface_normal(&self, x: f64, y: f64) -> Option<Vector3<f64>> {
        match self {
            Self::HeightField(g) => g.normal(x, y),
            Self::TriangleMesh(g) => g.normal(x, y),
            Self::Sdf(g) => g.normal(x, y),
        }
    }

    fn placement(&self) -> &Placement {
        match self {
            Self::HeightField(g) => &g.placement,
            Self::TriangleMesh(g) => &g.placement,
            Self::Sdf(g) => &g.placement,
        }
    }
}

/// Datum for volume integration: the base plane, or the lowest sample if it
/// lies below the base plane.
pub(crate) fn volume_datum(min_elevation: f64) -> f64 {
    min_elevation.min(0.0)
}
