//! Triangle mesh backend.
//!
//! Every grid cell becomes two counter-clockwise triangles split along the
//! south-west to north-east diagonal:
//!
//! ```text
//!   NW ●────● NE
//!      │ b ╱│
//!      │  ╱ │
//!      │ ╱ a│
//!   SW ●────● SE
//! ```
//!
//! Vertices are stored in raster order centered on the mesh origin, so vertex
//! `(x, y)` is `vertices[y * side + x]` and its `z` is the exact elevation.

#![allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]

use nalgebra::{Point3, Vector2, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{volume_datum, Placement};
use crate::grid::ElevationGrid;

/// Small epsilon for numerical comparisons.
const EPSILON: f64 = 1e-10;

/// A single triangle defined by three vertex indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Triangle {
    /// Index of first vertex.
    pub v0: usize,
    /// Index of second vertex.
    pub v1: usize,
    /// Index of third vertex.
    pub v2: usize,
}

impl Triangle {
    /// Create a new triangle from vertex indices.
    #[must_use]
    pub const fn new(v0: usize, v1: usize, v2: usize) -> Self {
        Self { v0, v1, v2 }
    }
}

/// Vertices and triangles of a terrain mesh, in local coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriangleMeshData {
    vertices: Vec<Point3<f64>>,
    triangles: Vec<Triangle>,
    aabb_min: Point3<f64>,
    aabb_max: Point3<f64>,
}

impl TriangleMeshData {
    /// Triangulate a raster-order grid centered on the origin.
    #[must_use]
    pub fn from_grid(grid: &ElevationGrid) -> Self {
        let side = grid.side();
        let spacing = grid.spacing();
        let half = grid.extent() * 0.5;

        let mut vertices = Vec::with_capacity(side * side);
        for (i, &h) in grid.samples().iter().enumerate() {
            let (x, y) = (i % side, i / side);
            vertices.push(Point3::new(
                x as f64 * spacing.x - half.x,
                half.y - y as f64 * spacing.y,
                h,
            ));
        }

        let cells = side - 1;
        let mut triangles = Vec::with_capacity(cells * cells * 2);
        for cy in 0..cells {
            for cx in 0..cells {
                let nw = cy * side + cx;
                let ne = nw + 1;
                let sw = nw + side;
                let se = sw + 1;
                triangles.push(Triangle::new(sw, se, ne));
                triangles.push(Triangle::new(sw, ne, nw));
            }
        }

        let aabb_min = Point3::new(-half.x, -half.y, grid.min_elevation());
        let aabb_max = Point3::new(half.x, half.y, grid.max_elevation());

        Self {
            vertices,
            triangles,
            aabb_min,
            aabb_max,
        }
    }

    /// Get the vertices.
    #[must_use]
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// Get the triangles.
    #[must_use]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Get the number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Get the local-space AABB.
    #[must_use]
    pub fn aabb(&self) -> (Point3<f64>, Point3<f64>) {
        (self.aabb_min, self.aabb_max)
    }

    /// Get a triangle's vertices.
    #[must_use]
    pub fn triangle_vertices(&self, tri: &Triangle) -> (Point3<f64>, Point3<f64>, Point3<f64>) {
        (
            self.vertices[tri.v0],
            self.vertices[tri.v1],
            self.vertices[tri.v2],
        )
    }

    /// Compute the unit normal of a triangle.
    #[must_use]
    pub fn triangle_normal(&self, tri: &Triangle) -> Vector3<f64> {
        let (v0, v1, v2) = self.triangle_vertices(tri);
        let normal = (v1 - v0).cross(&(v2 - v0));
        let norm = normal.norm();
        if norm > EPSILON {
            normal / norm
        } else {
            Vector3::z()
        }
    }

    /// Volume of the vertical prisms between each triangle and `datum`.
    #[must_use]
    pub fn prism_volume(&self, datum: f64) -> f64 {
        self.triangles
            .iter()
            .map(|tri| {
                let (a, b, c) = self.triangle_vertices(tri);
                let area = 0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs();
                let mean = (a.z + b.z + c.z) / 3.0;
                area * (mean - datum)
            })
            .sum()
    }
}

/// Triangle mesh terrain geometry placed in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMeshGeometry {
    mesh: TriangleMeshData,
    side: usize,
    spacing: Vector2<f64>,
    pub(super) placement: Placement,
    volume: f64,
}

impl TriangleMeshGeometry {
    pub(super) fn build(grid: &ElevationGrid, placement: Placement) -> Self {
        let mesh = TriangleMeshData::from_grid(grid);
        let volume = mesh.prism_volume(volume_datum(grid.min_elevation()));
        Self {
            mesh,
            side: grid.side(),
            spacing: grid.spacing(),
            placement,
            volume,
        }
    }

    /// Native mesh.
    #[must_use]
    pub fn mesh(&self) -> &TriangleMeshData {
        &self.mesh
    }

    pub(super) fn vertex_count(&self) -> (usize, usize) {
        (self.side, self.side)
    }

    pub(super) fn height_at(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.side || y >= self.side {
            return None;
        }
        Some(self.mesh.vertices[y * self.side + x].z)
    }

    pub(super) fn volume(&self) -> f64 {
        self.volume
    }

    /// Locate world `(x, y)`: the triangle under it and its fractional
    /// position `(fx, fy)` within the cell, `fy` growing southward.
    fn locate(&self, x: f64, y: f64) -> Option<(usize, f64, f64)> {
        let nw = self.placement.north_west();
        let gx = (x - nw.x) / self.spacing.x;
        let gy = (nw.y - y) / self.spacing.y;
        let last = (self.side - 1) as f64;
        if !(0.0..=last).contains(&gx) || !(0.0..=last).contains(&gy) {
            return None;
        }

        let cx = (gx.floor() as usize).min(self.side - 2);
        let cy = (gy.floor() as usize).min(self.side - 2);
        let fx = gx - cx as f64;
        let fy = gy - cy as f64;

        let base = 2 * (cy * (self.side - 1) + cx);
        let index = if fx + fy >= 1.0 { base } else { base + 1 };
        Some((index, fx, fy))
    }

    pub(super) fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (index, fx, fy) = self.locate(x, y)?;
        let tri = &self.mesh.triangles[index];
        let (sw, b, c) = self.mesh.triangle_vertices(tri);
        if index % 2 == 0 {
            // a: SW, SE, NE
            let (se, ne) = (b, c);
            Some(se.z + (1.0 - fx) * (sw.z - se.z) + (1.0 - fy) * (ne.z - se.z))
        } else {
            // b: SW, NE, NW
            let (ne, nw) = (b, c);
            Some(nw.z + fx * (ne.z - nw.z) + fy * (sw.z - nw.z))
        }
    }

    pub(super) fn normal(&self, x: f64, y: f64) -> Option<Vector3<f64>> {
        let (index, _, _) = self.locate(x, y)?;
        Some(self.mesh.triangle_normal(&self.mesh.triangles[index]))
    }
}
