//! Heightfield terrain collision shapes.
//!
//! This crate turns elevation data (grayscale images or geo-referenced
//! datasets) into terrain collision geometry for one of several physics
//! backends, behind a single backend-agnostic facade.
//!
//! # Pipeline
//!
//! ```text
//! ElevationSource ─resolve─▶ path ─decode─▶ RawElevation
//!        ─normalize─▶ ElevationGrid ─build─▶ BackendGeometry
//! ```
//!
//! [`TerrainShape`] drives the pipeline, records which stage failed, and
//! answers queries (heights, volume, surface normals) once ready.
//!
//! # Backends
//!
//! | Backend                  | Heights   | Volume  | Negative elevation |
//! |--------------------------|-----------|---------|--------------------|
//! | [`Backend::HeightField`] | exact     | exact   | yes                |
//! | [`Backend::TriangleMesh`]| exact     | prisms  | build fails        |
//! | [`Backend::Sdf`]         | 1e-12     | no      | clamped to 0       |
//!
//! Missing capabilities surface as [`TerrainError::CapabilityUnavailable`],
//! never as sentinel values. See [`Backend::capabilities`].
//!
//! # Grid conventions
//!
//! Grids are square with `2^n + 1` samples per side. Index `(0, 0)` is the
//! top-left pixel of the source image, placed at the north-west corner of the
//! footprint. The footprint is centered on the configured position.
//!
//! # Features
//!
//! - `geodata` (default): decode `.asc` and GeoTIFF elevation datasets
//! - `serde`: serialization of configuration and data types

#![doc(html_root_url = "https://docs.rs/sim-terrain/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,    // Many methods can't be const due to nalgebra
    clippy::module_name_repetitions, // TerrainShape, TerrainError read better than Shape, Error
    clippy::must_use_candidate,      // Query methods return Result already
)]

mod asset;
pub mod backend;
mod capability;
mod config;
mod error;
mod grid;
pub mod normalize;
pub mod source;
mod shape;

pub use asset::AssetContext;
pub use backend::{Backend, BackendGeometry};
pub use capability::{geodata_available, BackendCapabilities, Capability, NegativeElevation};
pub use config::{HeightDatum, TerrainConfig, VertexCount, VolumeFallback};
pub use error::{LoadStage, Result, TerrainError, TerrainFailure};
pub use grid::{is_valid_side, smallest_valid_side, ElevationGrid};
pub use shape::{cell_sum_volume, ShapeState, TerrainShape, VolumeEstimate, VolumeSource};
pub use source::{AlphaState, ElevationSource, RawElevation, SourceKind};
