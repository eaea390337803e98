//! World stepping loop for bodies resting on terrain.
//!
//! This crate advances translational bodies under gravity and resolves their
//! contact with [`sim_terrain::TerrainShape`] surfaces. Terrain is queried
//! through the backend-independent facade, so the same world runs on every
//! terrain backend.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   add_terrain (Ready only)   ┌──────────────────┐
//! │ TerrainShape │ ───────────────────────────▶ │      World       │
//! └──────────────┘                              │ bodies, terrains │
//!                                               └────────┬─────────┘
//!                                                        │ step
//!                                                        ▼
//! ┌──────────────┐   publish / apply_commands   ┌──────────────────┐
//! │   SimIface   │ ◀──────────────────────────▶ │     Stepper      │
//! └──────────────┘                              └──────────────────┘
//! ```
//!
//! # Layer 0 Crate
//!
//! No rendering or engine dependencies. The [`SimIface`] buffer is the only
//! surface shared with outside clients.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use nalgebra::{Point3, Vector2, Vector3};
//! use sim_core::{BodyShape, Stepper, World};
//! use sim_terrain::{AlphaState, Backend, ElevationGrid, RawElevation, TerrainConfig, TerrainShape};
//!
//! let grid = ElevationGrid::flat(5, Vector2::new(1.0, 1.0), 0.0).unwrap();
//! let raw = RawElevation::from_image_grid(grid, AlphaState::Absent);
//! let shape = TerrainShape::from_raw(
//!     Backend::HeightField,
//!     TerrainConfig::new(Vector3::new(4.0, 4.0, 1.0)),
//!     &raw,
//! );
//!
//! let mut world = World::default();
//! world.add_terrain("ground", Arc::new(shape)).unwrap();
//! world
//!     .add_body("ball", BodyShape::sphere(0.25), 1.0, Point3::new(0.0, 0.0, 1.0))
//!     .unwrap();
//!
//! let settled = Stepper::new().run_until_settled(&mut world, 2.0, 1e-3).unwrap();
//! assert!(settled);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-core/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::must_use_candidate,    // Accessors are obvious
)]

pub mod body;
pub mod contact;
pub mod iface;
pub mod stepper;
pub mod world;

pub use body::{Body, BodyShape};
pub use contact::{ContactParams, TerrainContact};
pub use iface::{BodyCommand, BodySnapshot, SimIface, SimIfaceData};
pub use stepper::{StepResult, Stepper, StepperConfig};
pub use world::{TerrainEntry, World};

// Re-export key types from sim-types for convenience
pub use sim_types::{BodyId, Gravity, Pose, Result, SimError, SimulationConfig};
