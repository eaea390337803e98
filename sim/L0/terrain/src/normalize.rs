//! Resampling and rescaling of decoded elevation into the configured frame.
//!
//! Output elevation for a source value `v` is
//!
//! ```text
//! h = (v − source_min) / (source_max − source_min) × size.z + offset
//! ```
//!
//! where `offset` is `base_offset`, plus `source_min` under
//! [`HeightDatum::Source`]. A flat source (`source_max == source_min`) maps
//! every sample to `offset`.

#![allow(clippy::cast_precision_loss)]

use nalgebra::Vector2;
use tracing::debug;

use crate::config::{HeightDatum, TerrainConfig, VertexCount};
use crate::error::{Result, TerrainError};
use crate::grid::{is_valid_side, ElevationGrid};
use crate::source::RawElevation;

/// Vertices per side the configuration asks for, given the source side.
///
/// # Errors
///
/// - [`TerrainError::InvalidSize`] for non-square or non-`2^n + 1` counts
/// - [`TerrainError::UnsupportedResolution`] if the count exceeds the source
pub fn target_side(vertex_count: VertexCount, source_side: usize) -> Result<usize> {
    match vertex_count {
        VertexCount::UseSource => Ok(source_side),
        VertexCount::Explicit { x, y } => {
            if x != y || !is_valid_side(x) {
                return Err(TerrainError::InvalidSize {
                    width: x,
                    height: y,
                });
            }
            if x > source_side {
                return Err(TerrainError::UnsupportedResolution {
                    requested: x,
                    available: source_side,
                });
            }
            Ok(x)
        }
    }
}

/// Produce the backend-ready grid.
///
/// Subsampling keeps every `stride`-th source sample, so both edges and the
/// corners always survive. World spacing is `size.xy / (side − 1)`.
///
/// # Errors
///
/// Returns configuration errors from [`TerrainConfig::validate`] and
/// resolution errors from [`target_side`].
pub fn normalize(raw: &RawElevation, config: &TerrainConfig) -> Result<ElevationGrid> {
    config.validate()?;

    let source_side = raw.grid.side();
    let side = target_side(config.vertex_count, source_side)?;
    let stride = (source_side - 1) / (side - 1);

    let offset = match config.datum {
        HeightDatum::Base => config.base_offset,
        HeightDatum::Source => config.base_offset + raw.source_min,
    };
    let range = raw.source_max - raw.source_min;
    let scale = if range > 0.0 { config.size.z / range } else { 0.0 };

    let source = raw.grid.samples();
    let mut samples = Vec::with_capacity(side * side);
    for y in 0..side {
        let row = y * stride * source_side;
        for x in 0..side {
            let v = source[row + x * stride];
            samples.push((v - raw.source_min) * scale + offset);
        }
    }

    let cells = (side - 1) as f64;
    let spacing = Vector2::new(config.size.x / cells, config.size.y / cells);
    let grid = ElevationGrid::new(samples, side, side, spacing)?;

    debug!(
        source_side,
        side,
        stride,
        min = grid.min_elevation(),
        max = grid.max_elevation(),
        "normalized elevation grid"
    );
    Ok(grid)
}
