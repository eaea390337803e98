//! Translational rigid bodies.
//!
//! Bodies carry a position and a linear velocity. Orientation is fixed to
//! identity, which is all terrain settling tests need.

use nalgebra::{Point3, Vector3};
use sim_types::{BodyId, Pose, Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Collision geometry of a body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BodyShape {
    /// Sphere centered on the body position.
    Sphere {
        /// Radius in meters.
        radius: f64,
    },
    /// Axis-aligned box centered on the body position.
    Box {
        /// Half extents along X, Y, Z.
        half_extents: Vector3<f64>,
    },
}

impl BodyShape {
    /// Sphere shape.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Sphere { radius }
    }

    /// Box shape from full side lengths.
    #[must_use]
    pub fn cuboid(size: Vector3<f64>) -> Self {
        Self::Box {
            half_extents: size * 0.5,
        }
    }

    /// Distance from the body position down to the lowest point.
    #[must_use]
    pub fn bottom_offset(&self) -> f64 {
        match self {
            Self::Sphere { radius } => *radius,
            Self::Box { half_extents } => half_extents.z,
        }
    }

    /// XY offsets at which the shape is tested against terrain.
    #[must_use]
    pub fn support_offsets(&self) -> Vec<(f64, f64)> {
        match self {
            Self::Sphere { .. } => vec![(0.0, 0.0)],
            Self::Box { half_extents } => {
                let (hx, hy) = (half_extents.x, half_extents.y);
                vec![(0.0, 0.0), (-hx, -hy), (hx, -hy), (-hx, hy), (hx, hy)]
            }
        }
    }

    /// Check that every dimension is positive and finite.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] for degenerate shapes.
    pub fn validate(&self) -> Result<()> {
        let ok = match self {
            Self::Sphere { radius } => radius.is_finite() && *radius > 0.0,
            Self::Box { half_extents } => half_extents.iter().all(|h| h.is_finite() && *h > 0.0),
        };
        if ok {
            Ok(())
        } else {
            Err(SimError::invalid_config(format!("degenerate body shape {self:?}")))
        }
    }
}

/// A dynamic body.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Unique identifier.
    pub id: BodyId,
    /// Name, unique within a world.
    pub name: String,
    /// Collision geometry.
    pub shape: BodyShape,
    /// Mass in kilograms.
    pub mass: f64,
    /// World position of the center.
    pub position: Point3<f64>,
    /// Linear velocity.
    pub velocity: Vector3<f64>,
    /// Accumulated external force (cleared each step).
    pub accumulated_force: Vector3<f64>,
    /// Whether the body touched terrain during the last step.
    pub in_contact: bool,
}

impl Body {
    /// Create a body at rest.
    #[must_use]
    pub fn new(
        id: BodyId,
        name: impl Into<String>,
        shape: BodyShape,
        mass: f64,
        position: Point3<f64>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            shape,
            mass,
            position,
            velocity: Vector3::zeros(),
            accumulated_force: Vector3::zeros(),
            in_contact: false,
        }
    }

    /// Pose with identity rotation.
    #[must_use]
    pub fn pose(&self) -> Pose {
        Pose::from_position(self.position)
    }

    /// Add a force for the next step.
    pub fn apply_force(&mut self, force: Vector3<f64>) {
        self.accumulated_force += force;
    }

    /// Clear accumulated forces.
    pub fn clear_forces(&mut self) {
        self.accumulated_force = Vector3::zeros();
    }

    /// Acceleration from accumulated forces.
    #[must_use]
    pub fn linear_acceleration(&self) -> Vector3<f64> {
        self.accumulated_force / self.mass
    }

    /// Kinetic energy.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.velocity.norm_squared()
    }

    /// World Z of the lowest point.
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.position.z - self.shape.bottom_offset()
    }

    /// Whether position and velocity are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|v| v.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
    }
}
