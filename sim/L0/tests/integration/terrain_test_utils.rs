//! Terrain test infrastructure.
//!
//! Fixture writers for elevation files and the per-backend exclusion table.
//!
//! # Exclusions
//!
//! Some backends cannot run some scenarios because of a known capability
//! gap. Those pairs live in [`EXCLUSIONS`] and tests iterate
//! [`backends_for`], so a gap shows up in one table instead of as conditional
//! returns scattered across test bodies.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayAlphaImage, GrayImage, LumaA};
use sim_terrain::{Backend, Capability};

// ============================================================================
// Tolerances
// ============================================================================

/// Height agreement for backends that interpolate.
pub const HEIGHT_TOL: f64 = 1e-4;

/// Idempotence of repeated volume queries.
pub const VOLUME_REPEAT_TOL: f64 = 1e-9;

/// Agreement between the cell-sum fallback and an independent computation.
pub const FALLBACK_TOL: f64 = 1e-6;

// ============================================================================
// Exclusion table
// ============================================================================

/// Test scenarios parameterized over backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Load a bowl image and check placement.
    PhysicsLoad,
    /// White image with an opaque alpha channel.
    WhiteAlpha,
    /// White image without alpha.
    WhiteNoAlpha,
    /// Volume queries.
    Volume,
    /// Body settling on a dataset with negative elevations.
    LoadDem,
    /// Explicit vertex count below the source resolution.
    Subsampling,
}

/// A backend that cannot run a scenario.
#[derive(Debug, Clone, Copy)]
pub struct Exclusion {
    /// Excluded backend.
    pub backend: Backend,
    /// Scenario it cannot run.
    pub scenario: Scenario,
    /// Missing capability.
    pub missing: Capability,
    /// Human-readable reason.
    pub reason: &'static str,
}

/// Known backend gaps.
pub const EXCLUSIONS: &[Exclusion] = &[
    Exclusion {
        backend: Backend::TriangleMesh,
        scenario: Scenario::LoadDem,
        missing: Capability::NegativeElevation,
        reason: "rejects negative elevations at build",
    },
    Exclusion {
        backend: Backend::Sdf,
        scenario: Scenario::LoadDem,
        missing: Capability::NegativeElevation,
        reason: "clamps negative elevations to zero",
    },
];

/// Exclusion entry for a backend and scenario.
pub fn exclusion(backend: Backend, scenario: Scenario) -> Option<&'static Exclusion> {
    EXCLUSIONS
        .iter()
        .find(|e| e.backend == backend && e.scenario == scenario)
}

/// Backends that run `scenario`.
pub fn backends_for(scenario: Scenario) -> impl Iterator<Item = Backend> {
    Backend::ALL.into_iter().filter(move |&b| {
        let excluded = exclusion(b, scenario);
        if let Some(e) = excluded {
            eprintln!("skipping {scenario:?} on {b}: {}", e.reason);
        }
        excluded.is_none()
    })
}

// ============================================================================
// Fixtures
// ============================================================================

/// Save `img` as PNG under `dir`.
pub fn write_png(dir: &Path, name: &str, img: &DynamicImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

/// Uniform white image, with a fully opaque alpha channel when `alpha` is set.
pub fn white_image(side: u32, alpha: bool) -> DynamicImage {
    if alpha {
        DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(side, side, LumaA([255, 255])))
    } else {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(side, side, image::Luma([255])))
    }
}

/// Black `width`×`height` image.
pub fn blank_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::new(width, height))
}

/// Radially symmetric bowl: black at the center, white at the rim.
pub fn bowl_image(side: u32) -> DynamicImage {
    let c = f64::from(side - 1) / 2.0;
    DynamicImage::ImageLuma8(GrayImage::from_fn(side, side, |x, y| {
        let dx = (f64::from(x) - c) / c;
        let dy = (f64::from(y) - c) / c;
        let r2 = (dx * dx + dy * dy).min(1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        image::Luma([(r2 * 255.0).round() as u8])
    }))
}

/// Write an ESRI ASCII grid whose value at column `x`, row `y` is `f(x, y)`.
pub fn write_asc(
    dir: &Path,
    name: &str,
    ncols: usize,
    nrows: usize,
    cellsize: f64,
    f: impl Fn(usize, usize) -> f64,
) -> PathBuf {
    let mut text = format!(
        "ncols {ncols}\nnrows {nrows}\nxllcorner 0.0\nyllcorner 0.0\ncellsize {cellsize}\nNODATA_value -9999\n"
    );
    for y in 0..nrows {
        let row: Vec<String> = (0..ncols).map(|x| format!("{:.6}", f(x, y))).collect();
        text.push_str(&row.join(" "));
        text.push('\n');
    }
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Bowl of negative elevations, `-212` at the center rising to `-200` at the
/// corners.
#[allow(clippy::cast_precision_loss)]
pub fn negative_bowl(side: usize) -> impl Fn(usize, usize) -> f64 {
    let c = (side - 1) as f64 / 2.0;
    move |x, y| {
        let dx = (x as f64 - c) / c;
        let dy = (y as f64 - c) / c;
        -212.0 + 6.0 * (dx * dx + dy * dy)
    }
}

// ============================================================================
// Table sanity
// ============================================================================

#[test]
fn exclusions_match_capabilities() {
    for e in EXCLUSIONS {
        assert!(
            !e.backend.capabilities().supports(e.missing),
            "{} is excluded from {:?} but supports {}",
            e.backend,
            e.scenario,
            e.missing
        );
    }
}

#[test]
fn every_scenario_has_a_backend() {
    for scenario in [
        Scenario::PhysicsLoad,
        Scenario::WhiteAlpha,
        Scenario::WhiteNoAlpha,
        Scenario::Volume,
        Scenario::LoadDem,
        Scenario::Subsampling,
    ] {
        assert!(backends_for(scenario).next().is_some(), "{scenario:?}");
    }
}
