//! Elevation source decoding.
//!
//! Two source kinds are supported:
//!
//! - **Image**: grayscale or color raster. Luminance is normalized to
//!   `[0, 1]`, so `source_min = 0` and `source_max = 1` regardless of content.
//!   An alpha channel never affects heights; it is only reported.
//! - **Dataset**: geo-referenced signed elevations (ESRI ASCII grid, GeoTIFF).
//!   Needs the `geodata` feature. Rectangular datasets are resampled onto the
//!   smallest enclosing `2^n + 1` square grid.

mod dataset;
mod raster;

use std::path::{Path, PathBuf};

use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::asset::AssetContext;
use crate::error::{Result, TerrainError};
use crate::grid::ElevationGrid;

pub use self::dataset::decode_dataset;
pub use self::raster::{decode_image, elevation_from_image};

/// Kind of elevation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SourceKind {
    /// Raster image; luminance is elevation.
    Image,
    /// Geo-referenced elevation dataset.
    Dataset,
}

impl SourceKind {
    /// Infer the kind from a file extension.
    ///
    /// `.tif`/`.tiff` are treated as datasets since GeoTIFF carries signed
    /// elevations; use [`ElevationSource::image`] to force raster decoding.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" | "bmp" | "jpg" | "jpeg" => Some(Self::Image),
            "asc" | "tif" | "tiff" => Some(Self::Dataset),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Dataset => f.write_str("dataset"),
        }
    }
}

/// Reference to an elevation asset.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElevationSource {
    /// Path or URI, resolved through an [`AssetContext`].
    pub path: PathBuf,
    /// How to decode it.
    pub kind: SourceKind,
}

impl ElevationSource {
    /// Raster image source.
    #[must_use]
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: SourceKind::Image,
        }
    }

    /// Dataset source.
    #[must_use]
    pub fn dataset(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: SourceKind::Dataset,
        }
    }

    /// Source with its kind inferred from the extension.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::InvalidConfig`] for an unknown extension.
    pub fn infer(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let kind = SourceKind::from_path(&path).ok_or_else(|| {
            TerrainError::invalid_config(format!(
                "cannot infer elevation source kind from '{}'",
                path.display()
            ))
        })?;
        Ok(Self { path, kind })
    }
}

/// Alpha channel status of an image source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AlphaState {
    /// No alpha channel.
    Absent,
    /// Alpha channel present and fully opaque.
    Opaque,
    /// Alpha channel present with transparent pixels. Heights are unaffected.
    Partial,
}

/// Decoded, not yet normalized elevation data.
#[derive(Debug, Clone, PartialEq)]
pub struct RawElevation {
    /// Samples at source resolution.
    pub grid: ElevationGrid,
    /// Lower bound of the source value range.
    pub source_min: f64,
    /// Upper bound of the source value range.
    pub source_max: f64,
    /// Kind of source.
    pub kind: SourceKind,
    /// Alpha status, `None` for datasets.
    pub alpha: Option<AlphaState>,
}

impl RawElevation {
    /// Raw image elevation with the fixed `[0, 1]` range.
    #[must_use]
    pub fn from_image_grid(grid: ElevationGrid, alpha: AlphaState) -> Self {
        Self {
            grid,
            source_min: 0.0,
            source_max: 1.0,
            kind: SourceKind::Image,
            alpha: Some(alpha),
        }
    }

    /// Raw dataset elevation whose range is the data range.
    #[must_use]
    pub fn from_dataset_grid(grid: ElevationGrid) -> Self {
        Self {
            source_min: grid.min_elevation(),
            source_max: grid.max_elevation(),
            grid,
            kind: SourceKind::Dataset,
            alpha: None,
        }
    }
}

/// Decode an already resolved file.
///
/// # Errors
///
/// Propagates decoder errors, geometry violations, and
/// `CapabilityUnavailable` for datasets without the `geodata` feature.
pub fn decode(kind: SourceKind, path: &Path) -> Result<RawElevation> {
    let raw = match kind {
        SourceKind::Image => decode_image(path)?,
        SourceKind::Dataset => decode_dataset(path)?,
    };
    debug!(
        path = %path.display(),
        %kind,
        side = raw.grid.side(),
        min = raw.source_min,
        max = raw.source_max,
        "decoded elevation source"
    );
    Ok(raw)
}

/// Resolve and decode a source.
///
/// # Errors
///
/// Returns `AssetNotFound` if resolution fails, otherwise as [`decode`].
pub fn load_elevation(source: &ElevationSource, ctx: &AssetContext) -> Result<RawElevation> {
    let path = ctx.resolve(&source.path)?;
    decode(source.kind, &path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(SourceKind::from_path(Path::new("a/b.PNG")), Some(SourceKind::Image));
        assert_eq!(SourceKind::from_path(Path::new("dem.asc")), Some(SourceKind::Dataset));
        assert_eq!(SourceKind::from_path(Path::new("dem.tif")), Some(SourceKind::Dataset));
        assert_eq!(SourceKind::from_path(Path::new("terrain")), None);
    }

    #[test]
    fn test_infer_unknown_extension() {
        assert!(ElevationSource::infer("terrain.xyz").is_err());
        assert_eq!(
            ElevationSource::infer("h.png").unwrap(),
            ElevationSource::image("h.png")
        );
    }

    #[test]
    fn test_dataset_range_from_data() {
        let grid = ElevationGrid::from_fn(3, Vector2::new(1.0, 1.0), |x, _| x as f64 * 5.0 - 3.0)
            .unwrap();
        let raw = RawElevation::from_dataset_grid(grid);
        assert_eq!(raw.source_min, -3.0);
        assert_eq!(raw.source_max, 7.0);
        assert_eq!(raw.alpha, None);
    }

    #[test]
    fn test_load_missing_asset() {
        let ctx = AssetContext::new();
        let err = load_elevation(&ElevationSource::image("/nope/h.png"), &ctx).unwrap_err();
        assert!(matches!(err, TerrainError::AssetNotFound { .. }));
    }
}
