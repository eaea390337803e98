//! Normalized elevation grid shared by every backend.
//!
//! # Conventions
//!
//! Samples are stored row-major in raster order: index `(x, y)` lives at
//! `samples[y * side + x]`, where `x` is the column and `y` the row. Row 0 is
//! the top of the source image, which maps to the north edge (+Y) of the
//! terrain footprint:
//!
//! ```text
//!   y=0    ● ─ ● ─ ●     north (+Y)
//!          │   │   │
//!   y=1    ● ─ ● ─ ●
//!          │   │   │
//!   y=2    ● ─ ● ─ ●     south (−Y)
//!         x=0     x=2
//! ```
//!
//! Every grid is square with `2^n + 1` samples per side, so that power-of-two
//! subsampling always keeps both edges.

#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use image::{ImageBuffer, Luma};
use nalgebra::Vector2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};

/// Smallest side length a grid may have (`2^1 + 1`).
pub const MIN_SIDE: usize = 3;

/// Whether `side` has the form `2^n + 1` with `n >= 1`.
#[must_use]
pub fn is_valid_side(side: usize) -> bool {
    side >= MIN_SIDE && (side - 1).is_power_of_two()
}

/// Smallest valid side length that holds `samples` samples.
#[must_use]
pub fn smallest_valid_side(samples: usize) -> usize {
    if samples <= MIN_SIDE {
        MIN_SIDE
    } else {
        (samples - 1).next_power_of_two() + 1
    }
}

/// Square grid of finite elevation samples.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElevationGrid {
    /// Samples in raster order. Access pattern: `samples[y * side + x]`.
    samples: Vec<f64>,
    /// Samples per side.
    side: usize,
    /// Distance between neighbouring samples along X and Y.
    spacing: Vector2<f64>,
    /// Cached minimum sample.
    min_elevation: f64,
    /// Cached maximum sample.
    max_elevation: f64,
}

impl ElevationGrid {
    /// Create a grid from raster-order samples.
    ///
    /// # Errors
    ///
    /// - [`TerrainError::NotSquareImage`] if `width != height`
    /// - [`TerrainError::InvalidSize`] if the side is not `2^n + 1`
    /// - [`TerrainError::NonFiniteSample`] on `NaN` or infinite samples
    /// - [`TerrainError::InvalidConfig`] on a length mismatch or bad spacing
    pub fn new(
        samples: Vec<f64>,
        width: usize,
        height: usize,
        spacing: Vector2<f64>,
    ) -> Result<Self> {
        if width != height {
            return Err(TerrainError::NotSquareImage { width, height });
        }
        if !is_valid_side(width) {
            return Err(TerrainError::InvalidSize { width, height });
        }
        if samples.len() != width * height {
            return Err(TerrainError::invalid_config(format!(
                "grid data length {} doesn't match dimensions {width}x{height}",
                samples.len()
            )));
        }
        if !(spacing.x.is_finite() && spacing.y.is_finite() && spacing.x > 0.0 && spacing.y > 0.0)
        {
            return Err(TerrainError::invalid_config(format!(
                "sample spacing must be positive and finite, got ({}, {})",
                spacing.x, spacing.y
            )));
        }
        if let Some(i) = samples.iter().position(|h| !h.is_finite()) {
            return Err(TerrainError::NonFiniteSample {
                x: i % width,
                y: i / width,
            });
        }

        let (min_elevation, max_elevation) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &h| {
                (min.min(h), max.max(h))
            });

        Ok(Self {
            samples,
            side: width,
            spacing,
            min_elevation,
            max_elevation,
        })
    }

    /// Create a flat grid at a given elevation.
    ///
    /// # Errors
    ///
    /// Same as [`ElevationGrid::new`].
    pub fn flat(side: usize, spacing: Vector2<f64>, elevation: f64) -> Result<Self> {
        Self::new(vec![elevation; side * side], side, side, spacing)
    }

    /// Create a grid by evaluating `f(x, y)` at every raster index.
    ///
    /// # Errors
    ///
    /// Same as [`ElevationGrid::new`].
    pub fn from_fn<F>(side: usize, spacing: Vector2<f64>, f: F) -> Result<Self>
    where
        F: Fn(usize, usize) -> f64,
    {
        let mut samples = Vec::with_capacity(side * side);
        for y in 0..side {
            for x in 0..side {
                samples.push(f(x, y));
            }
        }
        Self::new(samples, side, side, spacing)
    }

    /// Samples per side.
    #[must_use]
    pub fn side(&self) -> usize {
        self.side
    }

    /// Vertex counts along X and Y. Always equal.
    #[must_use]
    pub fn vertex_count(&self) -> (usize, usize) {
        (self.side, self.side)
    }

    /// Number of cells per side.
    #[must_use]
    pub fn cells_per_side(&self) -> usize {
        self.side - 1
    }

    /// Sample spacing along X and Y.
    #[must_use]
    pub fn spacing(&self) -> Vector2<f64> {
        self.spacing
    }

    /// Footprint covered by the grid along X and Y.
    #[must_use]
    pub fn extent(&self) -> Vector2<f64> {
        self.spacing * self.cells_per_side() as f64
    }

    /// Area of a single cell.
    #[must_use]
    pub fn cell_area(&self) -> f64 {
        self.spacing.x * self.spacing.y
    }

    /// Smallest sample.
    #[must_use]
    pub fn min_elevation(&self) -> f64 {
        self.min_elevation
    }

    /// Largest sample.
    #[must_use]
    pub fn max_elevation(&self) -> f64 {
        self.max_elevation
    }

    /// Whether every sample has the same value.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.max_elevation <= self.min_elevation
    }

    /// All samples in raster order.
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Sample at raster index `(x, y)`, or `None` outside the grid.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x < self.side && y < self.side {
            Some(self.samples[y * self.side + x])
        } else {
            None
        }
    }

    /// Sample at `(x, y)`, failing with [`TerrainError::IndexOutOfBounds`].
    ///
    /// # Errors
    ///
    /// Returns an error if either index is `>= side`.
    pub fn try_get(&self, x: usize, y: usize) -> Result<f64> {
        self.get(x, y).ok_or(TerrainError::IndexOutOfBounds {
            x,
            y,
            side: self.side,
        })
    }

    /// The four corner samples of cell `(cx, cy)`: NW, NE, SW, SE.
    #[must_use]
    pub fn cell_corners(&self, cx: usize, cy: usize) -> Option<[f64; 4]> {
        if cx >= self.side - 1 || cy >= self.side - 1 {
            return None;
        }
        let row = cy * self.side;
        let next = row + self.side;
        Some([
            self.samples[row + cx],
            self.samples[row + cx + 1],
            self.samples[next + cx],
            self.samples[next + cx + 1],
        ])
    }

    /// Iterate over the corner samples of every cell.
    pub fn cells(&self) -> impl Iterator<Item = [f64; 4]> + '_ {
        let cells = self.cells_per_side();
        (0..cells).flat_map(move |cy| (0..cells).filter_map(move |cx| self.cell_corners(cx, cy)))
    }

    /// Copy of this grid with every sample below `floor` raised to it.
    #[must_use]
    pub fn clamped_below(&self, floor: f64) -> Self {
        let samples: Vec<f64> = self.samples.iter().map(|h| h.max(floor)).collect();
        Self {
            samples,
            side: self.side,
            spacing: self.spacing,
            min_elevation: self.min_elevation.max(floor),
            max_elevation: self.max_elevation.max(floor),
        }
    }

    /// Render the grid as a 16-bit grayscale image, mapping the sample range
    /// onto `0..=u16::MAX`. A flat grid renders black.
    #[must_use]
    pub fn to_image(&self) -> ImageBuffer<Luma<u16>, Vec<u16>> {
        let range = self.max_elevation - self.min_elevation;
        let side = self.side as u32;
        ImageBuffer::from_fn(side, side, |x, y| {
            let h = self.samples[y as usize * self.side + x as usize];
            let level = if !self.is_flat() {
                ((h - self.min_elevation) / range * f64::from(u16::MAX)).round()
            } else {
                0.0
            };
            #[allow(clippy::cast_sign_loss)]
            Luma([level.clamp(0.0, f64::from(u16::MAX)) as u16])
        })
    }
}
