//! Core types for terrain-aware physics simulation.
//!
//! This crate provides the foundational data shared by the terrain and
//! simulation crates:
//!
//! - [`Pose`] - Position and orientation of a shape or body
//! - [`Gravity`] - Uniform gravitational acceleration
//! - [`SimulationConfig`] - Timestep, gravity, time limit
//! - [`SimError`] - Errors raised while building or stepping a world
//!
//! # Layer 0
//!
//! These types are **pure data**. They have no physics and no I/O, so they can
//! be shared between physics backends, the stepping loop, and external tools.
//!
//! # Coordinate System
//!
//! - X: east
//! - Y: north
//! - Z: up
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use sim_types::Pose;
//! use nalgebra::Point3;
//!
//! let pose = Pose::from_position(Point3::new(0.0, 0.0, 1.0));
//! assert_eq!(pose.position.z, 1.0);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::missing_errors_doc,        // Error docs added where non-obvious
    clippy::neg_cmp_op_on_partial_ord, // !(x > 0.0) is intentional for NaN rejection
)]

mod body;
mod config;
mod dynamics;
mod error;

pub use body::{BodyId, Pose};
pub use config::SimulationConfig;
pub use dynamics::Gravity;
pub use error::SimError;

// Re-export math types for convenience
pub use nalgebra::{Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
