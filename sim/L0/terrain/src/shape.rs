//! Backend-agnostic terrain collision shape.
//!
//! A [`TerrainShape`] moves through a one-way lifecycle:
//!
//! ```text
//! Uninitialized ──load──▶ Loading ──▶ Ready
//!                                 └─▶ Failed
//! ```
//!
//! `Ready` and `Failed` are terminal. Queries before `Ready` fail with
//! [`TerrainError::NotReady`]; a failed shape keeps the [`TerrainFailure`]
//! that put it there. After loading, every query takes `&self` and nothing
//! is cached lazily, so a ready shape can be shared across threads behind an
//! `Arc` without locking.

use nalgebra::Vector3;
use sim_types::Pose;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::asset::AssetContext;
use crate::backend::{Backend, BackendGeometry};
use crate::capability::BackendCapabilities;
use crate::config::{TerrainConfig, VolumeFallback};
use crate::error::{LoadStage, Result, TerrainError, TerrainFailure};
use crate::grid::ElevationGrid;
use crate::normalize::normalize;
use crate::source::{self, AlphaState, ElevationSource, RawElevation};

/// Lifecycle state of a [`TerrainShape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeState {
    /// Created, not yet loaded.
    Uninitialized,
    /// Load in progress.
    Loading,
    /// Loaded; queries are answered.
    Ready,
    /// Load failed; terminal.
    Failed,
}

impl std::fmt::Display for ShapeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where a volume value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VolumeSource {
    /// Integrated by the backend.
    Backend,
    /// Approximated from the cached grid.
    CellSumFallback,
}

/// A volume value tagged with its provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeEstimate {
    /// Volume in cubic units.
    pub value: f64,
    /// How it was obtained.
    pub source: VolumeSource,
}

/// Everything a successful load produces.
#[derive(Debug)]
struct Loaded {
    grid: ElevationGrid,
    geometry: BackendGeometry,
    fallback_volume: Option<f64>,
    alpha: Option<AlphaState>,
}

/// Terrain collision shape over a chosen backend.
///
/// # Example
///
/// ```
/// use sim_terrain::{
///     AlphaState, Backend, ElevationGrid, RawElevation, ShapeState, TerrainConfig,
///     TerrainShape,
/// };
/// use nalgebra::{Vector2, Vector3};
///
/// let grid = ElevationGrid::flat(5, Vector2::new(1.0, 1.0), 1.0).unwrap();
/// let raw = RawElevation::from_image_grid(grid, AlphaState::Absent);
/// let config = TerrainConfig::new(Vector3::new(4.0, 4.0, 10.0));
///
/// let shape = TerrainShape::from_raw(Backend::HeightField, config, &raw);
/// assert_eq!(shape.state(), ShapeState::Ready);
/// assert_eq!(shape.height_at(2, 2).unwrap(), 10.0);
/// ```
#[derive(Debug)]
pub struct TerrainShape {
    backend: Backend,
    config: TerrainConfig,
    state: ShapeState,
    loaded: Option<Loaded>,
    failure: Option<TerrainFailure>,
}

impl TerrainShape {
    /// Create an unloaded shape.
    #[must_use]
    pub fn new(backend: Backend, config: TerrainConfig) -> Self {
        Self {
            backend,
            config,
            state: ShapeState::Uninitialized,
            loaded: None,
            failure: None,
        }
    }

    /// Create and load from a source. The result is `Ready` or `Failed`.
    #[must_use]
    pub fn from_source(
        backend: Backend,
        config: TerrainConfig,
        source: &ElevationSource,
        ctx: &AssetContext,
    ) -> Self {
        let mut shape = Self::new(backend, config);
        // The failure is recorded on the shape
        let _ = shape.load(source, ctx);
        shape
    }

    /// Create and load from decoded elevation. The result is `Ready` or `Failed`.
    #[must_use]
    pub fn from_raw(backend: Backend, config: TerrainConfig, raw: &RawElevation) -> Self {
        let mut shape = Self::new(backend, config);
        let _ = shape.load_raw(raw);
        shape
    }

    /// Resolve, decode, normalize, and build.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::AlreadyLoaded`] unless the shape is
    /// `Uninitialized`. Otherwise returns the error that moved the shape to
    /// `Failed`; the stage is available through [`TerrainShape::failure`].
    pub fn load(&mut self, source: &ElevationSource, ctx: &AssetContext) -> Result<()> {
        self.begin()?;
        debug!(path = %source.path.display(), kind = %source.kind, backend = %self.backend, "loading terrain");
        let outcome = ctx
            .resolve(&source.path)
            .map_err(|e| TerrainFailure::new(LoadStage::Resolve, e))
            .and_then(|path| {
                source::decode(source.kind, &path)
                    .map_err(|e| TerrainFailure::new(LoadStage::Decode, e))
            })
            .and_then(|raw| self.prepare(&raw));
        self.finish(outcome)
    }

    /// Normalize and build from already decoded elevation.
    ///
    /// # Errors
    ///
    /// As [`TerrainShape::load`], minus the resolve and decode stages.
    pub fn load_raw(&mut self, raw: &RawElevation) -> Result<()> {
        self.begin()?;
        let outcome = self.prepare(raw);
        self.finish(outcome)
    }

    fn begin(&mut self) -> Result<()> {
        if self.state != ShapeState::Uninitialized {
            return Err(TerrainError::AlreadyLoaded { state: self.state });
        }
        self.state = ShapeState::Loading;
        Ok(())
    }

    fn prepare(&self, raw: &RawElevation) -> std::result::Result<Loaded, TerrainFailure> {
        let grid = normalize(raw, &self.config)
            .map_err(|e| TerrainFailure::new(LoadStage::Normalize, e))?;
        let geometry = self
            .backend
            .build(&grid, &self.config)
            .map_err(|e| TerrainFailure::new(LoadStage::Build, e))?;

        let fallback_volume = match self.config.volume_fallback {
            VolumeFallback::CellSum if !self.backend.capabilities().supports_volume => {
                Some(cell_sum_volume(&grid))
            }
            _ => None,
        };

        Ok(Loaded {
            grid,
            geometry,
            fallback_volume,
            alpha: raw.alpha,
        })
    }

    fn finish(&mut self, outcome: std::result::Result<Loaded, TerrainFailure>) -> Result<()> {
        match outcome {
            Ok(loaded) => {
                let (side, _) = loaded.grid.vertex_count();
                if loaded.alpha == Some(AlphaState::Partial) {
                    debug!("heightmap has transparent pixels; alpha is ignored");
                }
                info!(
                    backend = %self.backend,
                    side,
                    min = loaded.grid.min_elevation(),
                    max = loaded.grid.max_elevation(),
                    "terrain ready"
                );
                self.loaded = Some(loaded);
                self.state = ShapeState::Ready;
                Ok(())
            }
            Err(failure) => {
                warn!(backend = %self.backend, %failure, "terrain load failed");
                let error = failure.error.clone();
                self.failure = Some(failure);
                self.state = ShapeState::Failed;
                Err(error)
            }
        }
    }

    fn ready(&self) -> Result<&Loaded> {
        match (&self.loaded, self.state) {
            (Some(loaded), ShapeState::Ready) => Ok(loaded),
            _ => Err(TerrainError::NotReady { state: self.state }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ShapeState {
        self.state
    }

    /// Whether the shape answers queries.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ShapeState::Ready
    }

    /// The failure that made the shape `Failed`.
    #[must_use]
    pub fn failure(&self) -> Option<&TerrainFailure> {
        self.failure.as_ref()
    }

    /// Selected backend.
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Capability flags of the selected backend.
    #[must_use]
    pub fn capabilities(&self) -> BackendCapabilities {
        self.backend.capabilities()
    }

    /// Configuration the shape was created with.
    #[must_use]
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Elevation at raster index `(x, y)`; `(0, 0)` is the north-west corner.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading, `IndexOutOfBounds` outside the grid.
    pub fn height_at(&self, x: usize, y: usize) -> Result<f64> {
        self.ready()?.geometry.height_at(x, y)
    }

    /// Vertices along X and Y.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading.
    pub fn vertex_count(&self) -> Result<(usize, usize)> {
        Ok(self.ready()?.geometry.vertex_count())
    }

    /// World pose of the footprint center at the base plane.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading.
    pub fn pose(&self) -> Result<Pose> {
        Ok(self.ready()?.geometry.pose())
    }

    /// Footprint and elevation range reported by the backend.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading.
    pub fn size(&self) -> Result<Vector3<f64>> {
        Ok(self.ready()?.geometry.size())
    }

    /// Volume integrated by the backend, or the cell-sum fallback when the
    /// backend cannot integrate volume and `VolumeFallback::CellSum` is set.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading, `CapabilityUnavailable` if the backend
    /// cannot integrate volume and no fallback is configured.
    pub fn volume(&self) -> Result<f64> {
        self.volume_estimate().map(|estimate| estimate.value)
    }

    /// Volume tagged with where it came from.
    ///
    /// # Errors
    ///
    /// As [`TerrainShape::volume`].
    pub fn volume_estimate(&self) -> Result<VolumeEstimate> {
        let loaded = self.ready()?;
        match loaded.geometry.volume() {
            Ok(value) => Ok(VolumeEstimate {
                value,
                source: VolumeSource::Backend,
            }),
            Err(e) if e.is_capability_gap() => match loaded.fallback_volume {
                Some(value) => Ok(VolumeEstimate {
                    value,
                    source: VolumeSource::CellSumFallback,
                }),
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Lowest elevation of the normalized grid.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading.
    pub fn min_height(&self) -> Result<f64> {
        Ok(self.ready()?.grid.min_elevation())
    }

    /// Highest elevation of the normalized grid.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading.
    pub fn max_height(&self) -> Result<f64> {
        Ok(self.ready()?.grid.max_elevation())
    }

    /// The normalized grid, before any backend-specific adjustment.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading.
    pub fn grid(&self) -> Result<&ElevationGrid> {
        Ok(&self.ready()?.grid)
    }

    /// Alpha status of the image source, `None` for datasets.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading.
    pub fn alpha(&self) -> Result<Option<AlphaState>> {
        Ok(self.ready()?.alpha)
    }

    /// World Z of the surface above world `(x, y)`, `None` off the footprint.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading.
    pub fn surface_height(&self, x: f64, y: f64) -> Result<Option<f64>> {
        Ok(self.ready()?.geometry.surface_height(x, y))
    }

    /// Upward surface normal at world `(x, y)`, `None` off the footprint.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading.
    pub fn surface_normal(&self, x: f64, y: f64) -> Result<Option<Vector3<f64>>> {
        Ok(self.ready()?.geometry.surface_normal(x, y))
    }

    /// Native geometry.
    ///
    /// # Errors
    ///
    /// `NotReady` before loading.
    pub fn geometry(&self) -> Result<&BackendGeometry> {
        Ok(&self.ready()?.geometry)
    }
}

/// Sum over cells of the mean corner elevation above the datum, times the
/// cell area. The datum is `min(0, min_elevation)`.
#[must_use]
pub fn cell_sum_volume(grid: &ElevationGrid) -> f64 {
    let datum = grid.min_elevation().min(0.0);
    let area = grid.cell_area();
    grid.cells()
        .map(|corners| (corners.iter().sum::<f64>() * 0.25 - datum) * area)
        .sum()
}
