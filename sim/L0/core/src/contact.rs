//! Body–terrain contact by vertical projection.
//!
//! Each body is probed at its support offsets. The deepest probe below the
//! terrain surface defines the contact; resolution lifts the body out along Z
//! and removes the approaching normal velocity, with Coulomb friction on the
//! tangential part.

use nalgebra::{Point3, Vector3};
use sim_terrain::TerrainShape;
use sim_types::BodyId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::body::Body;

/// Material parameters for terrain contact.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactParams {
    /// Coulomb friction coefficient.
    pub friction: f64,
    /// Coefficient of restitution in `[0, 1]`.
    pub restitution: f64,
}

impl Default for ContactParams {
    fn default() -> Self {
        Self {
            friction: 0.8,
            restitution: 0.0,
        }
    }
}

/// A body penetrating a terrain surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainContact {
    /// Body in contact.
    pub body: BodyId,
    /// Name of the terrain.
    pub terrain: String,
    /// Surface point below the deepest probe.
    pub point: Point3<f64>,
    /// Upward surface normal.
    pub normal: Vector3<f64>,
    /// Penetration depth, positive.
    pub penetration: f64,
}

/// Deepest contact of `body` with `shape`, if any probe is below the surface.
///
/// Probes outside the terrain footprint never touch it.
#[must_use]
pub fn detect(body: &Body, terrain: &str, shape: &TerrainShape) -> Option<TerrainContact> {
    let bottom = body.bottom();
    let mut deepest: Option<(f64, f64, f64, f64)> = None;

    for (dx, dy) in body.shape.support_offsets() {
        let (x, y) = (body.position.x + dx, body.position.y + dy);
        let Ok(Some(surface)) = shape.surface_height(x, y) else {
            continue;
        };
        let penetration = surface - bottom;
        if penetration > 0.0 && deepest.map_or(true, |(_, _, _, d)| penetration > d) {
            deepest = Some((x, y, surface, penetration));
        }
    }

    let (x, y, surface, penetration) = deepest?;
    let normal = shape
        .surface_normal(x, y)
        .ok()
        .flatten()
        .unwrap_or_else(Vector3::z);

    Some(TerrainContact {
        body: body.id,
        terrain: terrain.to_string(),
        point: Point3::new(x, y, surface),
        normal,
        penetration,
    })
}

/// Push `body` out of the surface and apply the velocity response.
pub fn resolve(body: &mut Body, contact: &TerrainContact, params: &ContactParams) {
    body.position.z += contact.penetration;

    let n = contact.normal;
    let vn = body.velocity.dot(&n);
    if vn >= 0.0 {
        return;
    }

    let normal_change = -(1.0 + params.restitution) * vn;
    body.velocity += n * normal_change;

    let tangential = body.velocity - n * body.velocity.dot(&n);
    let speed = tangential.norm();
    let max_friction = params.friction * normal_change;
    if speed <= max_friction {
        body.velocity -= tangential;
    } else if speed > 0.0 {
        body.velocity -= tangential * (max_friction / speed);
    }
}
