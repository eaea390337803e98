//! Error types for terrain loading, normalization, and backend queries.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::Backend;
use crate::capability::Capability;
use crate::shape::ShapeState;

/// Errors that can occur while building or querying a terrain shape.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TerrainError {
    /// Raster width and height differ.
    #[error("image is {width}×{height}, expected square")]
    NotSquareImage {
        /// Raster width in samples.
        width: usize,
        /// Raster height in samples.
        height: usize,
    },

    /// Side length is not `2^n + 1`.
    #[error("grid is {width}×{height}, expected 2^n+1 samples per side (3, 5, 9, 17, ...)")]
    InvalidSize {
        /// Width in samples.
        width: usize,
        /// Height in samples.
        height: usize,
    },

    /// Requested vertex count exceeds the source resolution.
    #[error(
        "requested {requested}×{requested} vertices but the source has only {available}×{available}; upsampling is not supported"
    )]
    UnsupportedResolution {
        /// Requested vertices per side.
        requested: usize,
        /// Source samples per side.
        available: usize,
    },

    /// A backend or build-time capability is missing.
    ///
    /// This is an expected limitation, not a bug.
    #[error("{capability} is unavailable: {context}")]
    CapabilityUnavailable {
        /// The missing capability.
        capability: Capability,
        /// Which backend or build lacks it.
        context: String,
    },

    /// Query issued before the shape reached `Ready`.
    #[error("terrain shape is not ready (state: {state})")]
    NotReady {
        /// State the shape was in.
        state: ShapeState,
    },

    /// Loading was attempted on a shape that already left `Uninitialized`.
    #[error("terrain shape was already loaded (state: {state}); loads are never retried")]
    AlreadyLoaded {
        /// State the shape was in.
        state: ShapeState,
    },

    /// The physics backend rejected the geometry.
    #[error("{backend} backend rejected the geometry: {reason}")]
    BackendBuildFailure {
        /// Backend that refused the grid.
        backend: Backend,
        /// Why it was refused.
        reason: String,
    },

    /// Grid index outside the vertex grid.
    #[error("grid index ({x}, {y}) is outside the {side}×{side} vertex grid")]
    IndexOutOfBounds {
        /// Column index.
        x: usize,
        /// Row index.
        y: usize,
        /// Vertices per side.
        side: usize,
    },

    /// Elevation asset could not be located.
    #[error("asset '{}' not found (searched {} location(s))", .path.display(), .searched.len())]
    AssetNotFound {
        /// Path as requested.
        path: PathBuf,
        /// Candidate locations that were tried.
        searched: Vec<PathBuf>,
    },

    /// Elevation asset exists but could not be decoded.
    #[error("failed to decode '{}': {reason}", .path.display())]
    Decode {
        /// Resolved path.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// Elevation sample is `NaN` or infinite.
    #[error("elevation sample at ({x}, {y}) is not finite")]
    NonFiniteSample {
        /// Column index.
        x: usize,
        /// Row index.
        y: usize,
    },

    /// Invalid terrain configuration.
    #[error("invalid terrain configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },
}

impl TerrainError {
    /// Create a decode error.
    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a backend build failure.
    pub fn build_failure(backend: Backend, reason: impl Into<String>) -> Self {
        Self::BackendBuildFailure {
            backend,
            reason: reason.into(),
        }
    }

    /// Create a capability-unavailable error.
    pub fn unavailable(capability: Capability, context: impl Into<String>) -> Self {
        Self::CapabilityUnavailable {
            capability,
            context: context.into(),
        }
    }

    /// Check if this is a known capability gap rather than a failure.
    #[must_use]
    pub fn is_capability_gap(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable { .. })
    }

    /// Check if this is a grid geometry violation.
    #[must_use]
    pub fn is_geometry_violation(&self) -> bool {
        matches!(
            self,
            Self::NotSquareImage { .. }
                | Self::InvalidSize { .. }
                | Self::UnsupportedResolution { .. }
        )
    }
}

/// Step of the loading pipeline in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStage {
    /// Locating the elevation asset.
    Resolve,
    /// Decoding the raster or dataset.
    Decode,
    /// Validating, resampling, and rescaling.
    Normalize,
    /// Building the backend geometry.
    Build,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resolve => "resolve",
            Self::Decode => "decode",
            Self::Normalize => "normalize",
            Self::Build => "build",
        };
        f.write_str(name)
    }
}

/// Terminal failure recorded on a shape that entered `Failed`.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{stage} stage failed: {error}")]
pub struct TerrainFailure {
    /// Stage that produced the error.
    pub stage: LoadStage,
    /// The originating error.
    #[source]
    pub error: TerrainError,
}

impl TerrainFailure {
    /// Attach a stage to an error.
    #[must_use]
    pub fn new(stage: LoadStage, error: TerrainError) -> Self {
        Self { stage, error }
    }
}

/// Result type for terrain operations.
pub type Result<T> = std::result::Result<T, TerrainError>;
