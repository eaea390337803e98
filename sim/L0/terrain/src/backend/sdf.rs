//! Signed-distance backend.
//!
//! Terrain is stored implicitly as a column field: for each grid node, a
//! stack of `depth` samples of `z − h(x, y)`. The field is negative inside the
//! ground and positive above it, and its zero set is the terrain surface.
//! Heights are recovered by root finding along a column, so they match the
//! grid only to [`ROOT_TOLERANCE`].
//!
//! The field has no closed-form enclosed volume, and negative elevations are
//! clamped to zero before building.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::similar_names
)]

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::Placement;
use crate::grid::ElevationGrid;

/// Convergence tolerance for column root finding.
pub const ROOT_TOLERANCE: f64 = 1e-12;

/// Upper bound on bisection steps.
const MAX_ROOT_ITERATIONS: usize = 200;

/// Number of Z layers per column.
const COLUMN_LAYERS: usize = 2;

/// Signed distance values on a regular 3D grid.
///
/// Values are stored in ZYX order (Z varies slowest, X varies fastest). Y rows
/// start at the south edge.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SdfColumnData {
    /// Access pattern: `values[z * width * height + y * width + x]`
    values: Vec<f64>,
    width: usize,
    height: usize,
    depth: usize,
    /// Cell size along each axis.
    cell_size: Vector3<f64>,
    /// Minimum corner in local coordinates.
    origin: Point3<f64>,
}

impl SdfColumnData {
    /// Build the column field for a raster-order grid.
    ///
    /// The field spans from `padding` below the lowest sample to `padding`
    /// above the highest one.
    #[must_use]
    pub fn from_grid(grid: &ElevationGrid, padding: f64) -> Self {
        let side = grid.side();
        let z_lo = grid.min_elevation() - padding;
        let z_hi = grid.max_elevation() + padding;
        let dz = (z_hi - z_lo) / (COLUMN_LAYERS - 1) as f64;

        let samples = grid.samples();
        let mut values = Vec::with_capacity(side * side * COLUMN_LAYERS);
        for layer in 0..COLUMN_LAYERS {
            let z = z_lo + layer as f64 * dz;
            for raster_row in (0..side).rev() {
                let row = &samples[raster_row * side..(raster_row + 1) * side];
                values.extend(row.iter().map(|h| z - h));
            }
        }

        let spacing = grid.spacing();
        Self {
            values,
            width: side,
            height: side,
            depth: COLUMN_LAYERS,
            cell_size: Vector3::new(spacing.x, spacing.y, dz),
            origin: Point3::new(0.0, 0.0, z_lo),
        }
    }

    /// Samples along X.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Samples along Y.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Samples along Z.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Minimum corner.
    #[must_use]
    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    fn extent(&self) -> Vector3<f64> {
        Vector3::new(
            (self.width - 1) as f64 * self.cell_size.x,
            (self.height - 1) as f64 * self.cell_size.y,
            (self.depth - 1) as f64 * self.cell_size.z,
        )
    }

    /// Value at grid indices.
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        if x < self.width && y < self.height && z < self.depth {
            Some(self.values[z * self.width * self.height + y * self.width + x])
        } else {
            None
        }
    }

    fn local_to_grid(&self, point: Point3<f64>) -> (f64, f64, f64) {
        let gx = (point.x - self.origin.x) / self.cell_size.x;
        let gy = (point.y - self.origin.y) / self.cell_size.y;
        let gz = (point.z - self.origin.z) / self.cell_size.z;
        (gx, gy, gz)
    }

    /// Trilinearly interpolated value at a local point, `None` outside.
    #[must_use]
    pub fn distance(&self, point: Point3<f64>) -> Option<f64> {
        let (gx, gy, gz) = self.local_to_grid(point);

        if gx < 0.0
            || gy < 0.0
            || gz < 0.0
            || gx > (self.width - 1) as f64
            || gy > (self.height - 1) as f64
            || gz > (self.depth - 1) as f64
        {
            return None;
        }

        let x0 = (gx.floor() as usize).min(self.width - 2);
        let y0 = (gy.floor() as usize).min(self.height - 2);
        let z0 = (gz.floor() as usize).min(self.depth - 2);
        let (x1, y1, z1) = (x0 + 1, y0 + 1, z0 + 1);

        let fx = gx - x0 as f64;
        let fy = gy - y0 as f64;
        let fz = gz - z0 as f64;

        let layer = self.width * self.height;
        let at = |x: usize, y: usize, z: usize| self.values[z * layer + y * self.width + x];

        let v00 = at(x0, y0, z0) + fx * (at(x1, y0, z0) - at(x0, y0, z0));
        let v10 = at(x0, y1, z0) + fx * (at(x1, y1, z0) - at(x0, y1, z0));
        let v01 = at(x0, y0, z1) + fx * (at(x1, y0, z1) - at(x0, y0, z1));
        let v11 = at(x0, y1, z1) + fx * (at(x1, y1, z1) - at(x0, y1, z1));

        let v0 = v00 + fy * (v10 - v00);
        let v1 = v01 + fy * (v11 - v01);

        Some(v0 + fz * (v1 - v0))
    }

    fn clamp_to_bounds(&self, point: Point3<f64>) -> Point3<f64> {
        let max = self.origin + self.extent();
        Point3::new(
            point.x.clamp(self.origin.x, max.x),
            point.y.clamp(self.origin.y, max.y),
            point.z.clamp(self.origin.z, max.z),
        )
    }

    /// Value at a local point, clamped into the grid.
    #[must_use]
    pub fn distance_clamped(&self, point: Point3<f64>) -> f64 {
        let clamped = self.clamp_to_bounds(point);
        self.distance(clamped).unwrap_or(f64::INFINITY)
    }

    /// Normalized gradient at a local point.
    ///
    /// Central differences, one-sided where the stencil leaves the grid.
    #[must_use]
    pub fn gradient(&self, point: Point3<f64>) -> Option<Vector3<f64>> {
        self.distance(point)?;

        let mut grad = Vector3::zeros();
        for axis in 0..3 {
            let eps = self.cell_size[axis] * 0.1;
            let mut lo = point;
            let mut hi = point;
            lo[axis] -= eps;
            hi[axis] += eps;
            let lo = self.clamp_to_bounds(lo);
            let hi = self.clamp_to_bounds(hi);
            let span = hi[axis] - lo[axis];
            if span > 0.0 {
                grad[axis] = (self.distance_clamped(hi) - self.distance_clamped(lo)) / span;
            }
        }

        let norm = grad.norm();
        if norm > 1e-10 {
            Some(grad / norm)
        } else {
            Some(Vector3::z())
        }
    }

    /// Local Z of the zero crossing above local `(x, y)`, `None` outside.
    #[must_use]
    pub fn surface_z(&self, x: f64, y: f64) -> Option<f64> {
        let at = |z: f64| self.distance(Point3::new(x, y, z));
        let mut lo = self.origin.z;
        let mut hi = self.origin.z + self.extent().z;
        let mut d_lo = at(lo)?;
        let mut d_hi = at(hi)?;
        if d_lo > 0.0 || d_hi < 0.0 {
            return None;
        }

        for _ in 0..MAX_ROOT_ITERATIONS {
            if hi - lo <= ROOT_TOLERANCE {
                break;
            }
            let mid = 0.5 * (lo + hi);
            let d_mid = at(mid)?;
            if d_mid <= 0.0 {
                lo = mid;
                d_lo = d_mid;
            } else {
                hi = mid;
                d_hi = d_mid;
            }
        }
        Some(secant(lo, d_lo, hi, d_hi))
    }

    /// Local Z of the zero crossing in the column at node `(x, y)`.
    #[must_use]
    pub fn node_surface_z(&self, x: usize, y: usize) -> Option<f64> {
        let mut below = self.get(x, y, 0)?;
        if below > 0.0 {
            return None;
        }
        for z in 1..self.depth {
            let above = self.get(x, y, z)?;
            if above >= 0.0 {
                let z_lo = self.origin.z + (z - 1) as f64 * self.cell_size.z;
                return Some(secant(z_lo, below, z_lo + self.cell_size.z, above));
            }
            below = above;
        }
        None
    }
}

/// Zero of the line through `(a, fa)` and `(b, fb)`, with `fa <= 0 <= fb`.
fn secant(a: f64, fa: f64, b: f64, fb: f64) -> f64 {
    let span = fb - fa;
    if span > 0.0 {
        a - fa * (b - a) / span
    } else {
        0.5 * (a + b)
    }
}

/// Signed-distance terrain geometry placed in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct SdfGeometry {
    data: SdfColumnData,
    side: usize,
    pub(super) placement: Placement,
}

impl SdfGeometry {
    pub(super) fn build(grid: &ElevationGrid, placement: Placement) -> Self {
        let relief = grid.max_elevation() - grid.min_elevation();
        let padding = (relief * 0.1).max(1.0);
        Self {
            data: SdfColumnData::from_grid(grid, padding),
            side: grid.side(),
            placement,
        }
    }

    /// Native column field.
    #[must_use]
    pub fn data(&self) -> &SdfColumnData {
        &self.data
    }

    pub(super) fn vertex_count(&self) -> (usize, usize) {
        (self.side, self.side)
    }

    pub(super) fn height_at(&self, x: usize, y: usize) -> Option<f64> {
        let row = self.side.checked_sub(y + 1)?;
        self.data.node_surface_z(x, row)
    }

    fn to_local(&self, x: f64, y: f64) -> (f64, f64) {
        let origin = self.placement.south_west();
        (x - origin.x, y - origin.y)
    }

    pub(super) fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (lx, ly) = self.to_local(x, y);
        self.data.surface_z(lx, ly)
    }

    pub(super) fn normal(&self, x: f64, y: f64) -> Option<Vector3<f64>> {
        let (lx, ly) = self.to_local(x, y);
        let z = self.data.surface_z(lx, ly)?;
        self.data.gradient(Point3::new(lx, ly, z))
    }
}
