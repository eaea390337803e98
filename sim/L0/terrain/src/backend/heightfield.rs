//! Grid-sampled height field backend.
//!
//! # Coordinate System
//!
//! The native height field has its origin at the south-west corner of the
//! footprint:
//! - X axis spans `[0, (width - 1) * cell_size.x]`
//! - Y axis spans `[0, (depth - 1) * cell_size.y]`, row 0 at the south edge
//! - Z values come from the height data
//!
//! Raster row `y` of the elevation grid is native row `depth - 1 - y`.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]

use nalgebra::{Point3, Vector2, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{volume_datum, Placement};
use crate::grid::ElevationGrid;

/// Height values on a regular grid.
///
/// Heights are stored in row-major order (X varies fastest), south row first.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeightFieldData {
    /// Height values. Access pattern: `heights[y * width + x]`
    heights: Vec<f64>,
    /// Number of columns (samples along X axis).
    width: usize,
    /// Number of rows (samples along Y axis).
    depth: usize,
    /// Size of each cell along X and Y.
    cell_size: Vector2<f64>,
    /// Minimum height value (cached for AABB).
    min_height: f64,
    /// Maximum height value (cached for AABB).
    max_height: f64,
}

impl HeightFieldData {
    /// Build from a raster-order elevation grid, flipping rows south first.
    #[must_use]
    pub fn from_grid(grid: &ElevationGrid) -> Self {
        let side = grid.side();
        let mut heights = Vec::with_capacity(side * side);
        for row in grid.samples().chunks_exact(side).rev() {
            heights.extend_from_slice(row);
        }
        Self {
            heights,
            width: side,
            depth: side,
            cell_size: grid.spacing(),
            min_height: grid.min_elevation(),
            max_height: grid.max_elevation(),
        }
    }

    /// Get the width (number of columns).
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Get the depth (number of rows).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Get the cell size along X and Y.
    #[must_use]
    pub fn cell_size(&self) -> Vector2<f64> {
        self.cell_size
    }

    /// Get the total X extent.
    #[must_use]
    pub fn extent_x(&self) -> f64 {
        (self.width - 1) as f64 * self.cell_size.x
    }

    /// Get the total Y extent.
    #[must_use]
    pub fn extent_y(&self) -> f64 {
        (self.depth - 1) as f64 * self.cell_size.y
    }

    /// Get the minimum height value.
    #[must_use]
    pub fn min_height(&self) -> f64 {
        self.min_height
    }

    /// Get the maximum height value.
    #[must_use]
    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    /// Get the height at native grid coordinates (x, y).
    ///
    /// Returns `None` if coordinates are out of bounds.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x < self.width && y < self.depth {
            Some(self.heights[y * self.width + x])
        } else {
            None
        }
    }

    /// Get the interpolated height at local (x, y) coordinates.
    ///
    /// Uses bilinear interpolation. Returns `None` outside the bounds.
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        if x < 0.0 || y < 0.0 || x > self.extent_x() || y > self.extent_y() {
            return None;
        }

        let gx = x / self.cell_size.x;
        let gy = y / self.cell_size.y;

        // The far edge belongs to the last cell
        let x0 = (gx.floor() as usize).min(self.width - 2);
        let y0 = (gy.floor() as usize).min(self.depth - 2);
        let fx = gx - x0 as f64;
        let fy = gy - y0 as f64;

        let [h00, h10, h01, h11] = self.cell_heights(x0, y0)?;

        let h0 = h00 + fx * (h10 - h00);
        let h1 = h01 + fx * (h11 - h01);
        Some(h0 + fy * (h1 - h0))
    }

    /// Get the interpolated height, clamping to bounds if outside.
    #[must_use]
    pub fn sample_clamped(&self, x: f64, y: f64) -> f64 {
        let x = x.clamp(0.0, self.extent_x());
        let y = y.clamp(0.0, self.extent_y());
        self.sample(x, y).unwrap_or(self.min_height)
    }

    /// Get the surface normal at local (x, y) coordinates.
    ///
    /// Uses central differences, one-sided at the edges.
    #[must_use]
    pub fn normal(&self, x: f64, y: f64) -> Option<Vector3<f64>> {
        self.sample(x, y)?;
        let ex = self.cell_size.x * 0.1;
        let ey = self.cell_size.y * 0.1;

        let x_lo = (x - ex).max(0.0);
        let x_hi = (x + ex).min(self.extent_x());
        let y_lo = (y - ey).max(0.0);
        let y_hi = (y + ey).min(self.extent_y());

        let dx = (self.sample_clamped(x_hi, y) - self.sample_clamped(x_lo, y)) / (x_hi - x_lo);
        let dy = (self.sample_clamped(x, y_hi) - self.sample_clamped(x, y_lo)) / (y_hi - y_lo);

        Some(Vector3::new(-dx, -dy, 1.0).normalize())
    }

    /// Local AABB.
    #[must_use]
    pub fn aabb(&self) -> (Point3<f64>, Point3<f64>) {
        let min = Point3::new(0.0, 0.0, self.min_height);
        let max = Point3::new(self.extent_x(), self.extent_y(), self.max_height);
        (min, max)
    }

    /// The four corner heights of a cell: `(cx, cy)`, `(cx+1, cy)`,
    /// `(cx, cy+1)`, `(cx+1, cy+1)`.
    #[must_use]
    pub fn cell_heights(&self, cx: usize, cy: usize) -> Option<[f64; 4]> {
        if cx >= self.width - 1 || cy >= self.depth - 1 {
            return None;
        }

        Some([
            self.heights[cy * self.width + cx],
            self.heights[cy * self.width + cx + 1],
            self.heights[(cy + 1) * self.width + cx],
            self.heights[(cy + 1) * self.width + cx + 1],
        ])
    }

    /// Integral of the bilinear surface above `datum`.
    ///
    /// A bilinear patch integrates to the cell area times the mean of its
    /// corners, so this is exact for the interpolated surface.
    #[must_use]
    pub fn volume_above(&self, datum: f64) -> f64 {
        let area = self.cell_size.x * self.cell_size.y;
        let mut total = 0.0;
        for cy in 0..self.depth - 1 {
            for cx in 0..self.width - 1 {
                if let Some(corners) = self.cell_heights(cx, cy) {
                    let mean = corners.iter().sum::<f64>() * 0.25;
                    total += (mean - datum) * area;
                }
            }
        }
        total
    }
}

/// Height field terrain geometry placed in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightFieldGeometry {
    data: HeightFieldData,
    pub(super) placement: Placement,
    volume: f64,
}

impl HeightFieldGeometry {
    pub(super) fn build(grid: &ElevationGrid, placement: Placement) -> Self {
        let data = HeightFieldData::from_grid(grid);
        let volume = data.volume_above(volume_datum(data.min_height()));
        Self {
            data,
            placement,
            volume,
        }
    }

    /// Native height field.
    #[must_use]
    pub fn data(&self) -> &HeightFieldData {
        &self.data
    }

    pub(super) fn vertex_count(&self) -> (usize, usize) {
        (self.data.width(), self.data.depth())
    }

    pub(super) fn height_at(&self, x: usize, y: usize) -> Option<f64> {
        let row = self.data.depth().checked_sub(y + 1)?;
        self.data.get(x, row)
    }

    pub(super) fn volume(&self) -> f64 {
        self.volume
    }

    fn to_local(&self, x: f64, y: f64) -> (f64, f64) {
        let origin = self.placement.south_west();
        (x - origin.x, y - origin.y)
    }

    pub(super) fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (lx, ly) = self.to_local(x, y);
        self.data.sample(lx, ly)
    }

    pub(super) fn normal(&self, x: f64, y: f64) -> Option<Vector3<f64>> {
        let (lx, ly) = self.to_local(x, y);
        self.data.normal(lx, ly)
    }
}
