//! Geo-referenced elevation datasets.
//!
//! Supported formats are ESRI ASCII grids (`.asc`) and single-band GeoTIFF
//! (`.tif`, `.tiff`). Cells equal to the dataset's no-data value are filled
//! with the lowest valid elevation. Rows are north first in both formats,
//! matching raster order.

#![cfg_attr(
    feature = "geodata",
    allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )
)]

use std::path::Path;

use super::RawElevation;
use crate::error::Result;

#[cfg(not(feature = "geodata"))]
use crate::{capability::Capability, error::TerrainError};

/// Decode an elevation dataset.
///
/// # Errors
///
/// Returns `CapabilityUnavailable` when built without `geodata`.
#[cfg(not(feature = "geodata"))]
pub fn decode_dataset(path: &Path) -> Result<RawElevation> {
    Err(TerrainError::unavailable(
        Capability::GeodataDecoding,
        format!(
            "'{}' needs the `geodata` feature of sim-terrain",
            path.display()
        ),
    ))
}

/// Decode an elevation dataset.
///
/// # Errors
///
/// Returns `Decode` for unreadable or malformed files and unsupported
/// extensions.
#[cfg(feature = "geodata")]
pub fn decode_dataset(path: &Path) -> Result<RawElevation> {
    geodata::decode(path)
}

#[cfg(feature = "geodata")]
mod geodata {
    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;

    use nalgebra::Vector2;
    use tiff::decoder::{Decoder, DecodingResult};
    use tiff::tags::Tag;
    use tiff::ColorType;
    use tracing::{debug, warn};

    use super::RawElevation;
    use crate::backend::Backend;
    use crate::error::{Result, TerrainError};
    use crate::grid::{smallest_valid_side, ElevationGrid};

    /// GeoTIFF `ModelPixelScaleTag`.
    const MODEL_PIXEL_SCALE_TAG: u16 = 33550;
    /// GDAL no-data tag, stored as ASCII.
    const GDAL_NODATA_TAG: u16 = 42113;

    /// Samples as read from disk, before filling and resampling.
    #[derive(Debug)]
    pub(super) struct DatasetSamples {
        pub values: Vec<f64>,
        pub width: usize,
        pub height: usize,
        pub spacing: Vector2<f64>,
        pub nodata: Option<f64>,
    }

    pub(super) fn decode(path: &Path) -> Result<RawElevation> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let samples = match ext.as_str() {
            "asc" => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| TerrainError::decode(path, e.to_string()))?;
                parse_ascii_grid(&text, path)?
            }
            "tif" | "tiff" => read_geotiff(path)?,
            other => {
                return Err(TerrainError::decode(
                    path,
                    format!("unsupported dataset format '{other}'"),
                ))
            }
        };
        into_raw(samples, path)
    }

    /// Parse an ESRI ASCII grid.
    pub(super) fn parse_ascii_grid(text: &str, path: &Path) -> Result<DatasetSamples> {
        let bad = |reason: String| TerrainError::decode(path, reason);

        let mut ncols = None;
        let mut nrows = None;
        let mut cellsize = 1.0;
        let mut nodata = None;

        let mut tokens = text.split_whitespace().peekable();
        while let Some(token) = tokens.peek() {
            if !token.starts_with(|c: char| c.is_ascii_alphabetic()) {
                break;
            }
            let key = token.to_ascii_lowercase();
            tokens.next();
            let value = tokens
                .next()
                .ok_or_else(|| bad(format!("header key '{key}' has no value")))?;
            let count = || {
                value.parse::<u32>().map(|n| n as usize).map_err(|_| {
                    bad(format!("header '{key}' must be a non-negative integer, got '{value}'"))
                })
            };
            let number = || {
                value
                    .parse::<f64>()
                    .map_err(|_| bad(format!("header '{key}' has non-numeric value '{value}'")))
            };
            match key.as_str() {
                "ncols" => ncols = Some(count()?),
                "nrows" => nrows = Some(count()?),
                "cellsize" => cellsize = number()?,
                "nodata_value" => nodata = Some(number()?),
                "xllcorner" | "yllcorner" | "xllcenter" | "yllcenter" => {
                    number()?;
                }
                _ => return Err(bad(format!("unknown header key '{key}'"))),
            }
        }

        let width = ncols.ok_or_else(|| bad("missing ncols".to_string()))?;
        let height = nrows.ok_or_else(|| bad("missing nrows".to_string()))?;
        let expected = width
            .checked_mul(height)
            .ok_or_else(|| bad(format!("{width}x{height} grid is too large")))?;
        if !(cellsize.is_finite() && cellsize > 0.0) {
            return Err(bad(format!("cellsize must be positive, got {cellsize}")));
        }

        let values = tokens
            .map(|t| {
                t.parse::<f64>()
                    .map_err(|_| bad(format!("invalid elevation value '{t}'")))
            })
            .collect::<Result<Vec<f64>>>()?;
        if values.len() != expected {
            return Err(bad(format!(
                "expected {expected} values for {width}x{height}, found {}",
                values.len()
            )));
        }

        Ok(DatasetSamples {
            values,
            width,
            height,
            spacing: Vector2::new(cellsize, cellsize),
            nodata,
        })
    }

    fn read_geotiff(path: &Path) -> Result<DatasetSamples> {
        let err = |e: &dyn std::fmt::Display| TerrainError::decode(path, e.to_string());

        let file = File::open(path).map_err(|e| err(&e))?;
        let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| err(&e))?;
        let (width, height) = decoder.dimensions().map_err(|e| err(&e))?;
        let channels = match decoder.colortype().map_err(|e| err(&e))? {
            ColorType::Gray(_) => 1,
            ColorType::GrayA(_) => 2,
            ColorType::RGB(_) => 3,
            ColorType::RGBA(_) => 4,
            other => {
                return Err(TerrainError::decode(
                    path,
                    format!("unsupported color type {other:?}"),
                ))
            }
        };

        let spacing = decoder
            .get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE_TAG))
            .ok()
            .filter(|s| s.len() >= 2 && s[0] > 0.0 && s[1] > 0.0)
            .map_or_else(|| Vector2::new(1.0, 1.0), |s| Vector2::new(s[0], s[1]));
        let nodata = decoder
            .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA_TAG))
            .ok()
            .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok());

        let values: Vec<f64> = match decoder.read_image().map_err(|e| err(&e))? {
            DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
            DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
            DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::F64(data) => data,
        };
        if channels > 1 {
            warn!(path = %path.display(), channels, "multi-band dataset, using the first band");
        }
        let values: Vec<f64> = values.into_iter().step_by(channels).collect();

        Ok(DatasetSamples {
            values,
            width: width as usize,
            height: height as usize,
            spacing,
            nodata,
        })
    }

    /// Fill no-data cells and resample onto a `2^n + 1` square.
    pub(super) fn into_raw(samples: DatasetSamples, path: &Path) -> Result<RawElevation> {
        let DatasetSamples {
            mut values,
            width,
            height,
            spacing,
            nodata,
        } = samples;

        if width < 2 || height < 2 {
            return Err(TerrainError::decode(
                path,
                format!("dataset is {width}x{height}, needs at least 2x2 samples"),
            ));
        }

        let side = smallest_valid_side(width.max(height));
        let limit = Backend::max_supported_side();
        if side > limit {
            return Err(TerrainError::decode(
                path,
                format!(
                    "dataset is {width}x{height}, which resamples to a {side}x{side} grid; \
                     no backend accepts more than {limit}x{limit}"
                ),
            ));
        }

        let is_nodata = |v: f64| !v.is_finite() || nodata.is_some_and(|nd| (v - nd).abs() < 1e-9);
        let floor = values
            .iter()
            .copied()
            .filter(|&v| !is_nodata(v))
            .fold(f64::INFINITY, f64::min);
        if !floor.is_finite() {
            return Err(TerrainError::decode(path, "dataset has no valid samples"));
        }
        let mut filled = 0_usize;
        for v in &mut values {
            if is_nodata(*v) {
                *v = floor;
                filled += 1;
            }
        }
        if filled > 0 {
            debug!(path = %path.display(), filled, fill = floor, "filled no-data cells");
        }

        let (values, side) = resample_square(&values, width, height);
        let spacing = Vector2::new(
            spacing.x * (width - 1) as f64 / (side - 1) as f64,
            spacing.y * (height - 1) as f64 / (side - 1) as f64,
        );
        if side != width || side != height {
            debug!(path = %path.display(), width, height, side, "resampled dataset");
        }
        let grid = ElevationGrid::new(values, side, side, spacing)?;
        Ok(RawElevation::from_dataset_grid(grid))
    }

    /// Bilinearly resample onto the smallest enclosing valid square.
    pub(super) fn resample_square(values: &[f64], width: usize, height: usize) -> (Vec<f64>, usize) {
        let side = smallest_valid_side(width.max(height));
        if width == side && height == side {
            return (values.to_vec(), side);
        }

        let step_x = (width - 1) as f64 / (side - 1) as f64;
        let step_y = (height - 1) as f64 / (side - 1) as f64;
        let mut out = Vec::with_capacity(side * side);
        for y in 0..side {
            let gy = y as f64 * step_y;
            let y0 = (gy.floor() as usize).min(height - 2);
            let fy = gy - y0 as f64;
            for x in 0..side {
                let gx = x as f64 * step_x;
                let x0 = (gx.floor() as usize).min(width - 2);
                let fx = gx - x0 as f64;

                let h00 = values[y0 * width + x0];
                let h10 = values[y0 * width + x0 + 1];
                let h01 = values[(y0 + 1) * width + x0];
                let h11 = values[(y0 + 1) * width + x0 + 1];

                let h0 = h00 + fx * (h10 - h00);
                let h1 = h01 + fx * (h11 - h01);
                out.push(h0 + fy * (h1 - h0));
            }
        }
        (out, side)
    }

}
