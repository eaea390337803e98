//! Integration tests for the sim-* crate ecosystem.
//!
//! These tests verify end-to-end terrain behavior on every backend:
//! - Image and dataset files → `TerrainShape` → height and volume queries
//! - Malformed sources → `Failed` shapes with stage-tagged errors
//! - Bodies dropped onto terrain → settled `World` state
//!
//! Backends that cannot run a scenario are listed in the exclusion table in
//! [`terrain_test_utils`], never skipped inline.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

pub mod heightmap;
pub mod terrain_test_utils;
pub mod world_settling;
