//! Heightmap loading and query conformance across terrain backends.
//!
//! Each scenario builds a fixture file, loads it through the full
//! resolve → decode → normalize → build path, and checks the facade queries.

use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use sim_terrain::{
    cell_sum_volume, AlphaState, AssetContext, Backend, ElevationGrid, ElevationSource,
    HeightDatum, LoadStage, RawElevation, ShapeState, TerrainConfig, TerrainError, TerrainShape,
    VolumeFallback, VolumeSource,
};
use tempfile::TempDir;

use crate::terrain_test_utils::{
    backends_for, blank_image, bowl_image, negative_bowl, white_image, write_asc, write_png,
    Scenario, FALLBACK_TOL, HEIGHT_TOL, VOLUME_REPEAT_TOL,
};

/// Size used by the 129×129 scenarios.
fn size_129() -> Vector3<f64> {
    Vector3::new(129.0, 129.0, 10.0)
}

fn load_png(
    backend: Backend,
    config: TerrainConfig,
    name: &str,
    img: &image::DynamicImage,
) -> (TempDir, TerrainShape) {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), name, img);
    let ctx = AssetContext::with_base_dir(dir.path());
    let shape = TerrainShape::from_source(backend, config, &ElevationSource::image(name), &ctx);
    (dir, shape)
}

/// Independent cell-sum volume above `min(0, min_height)`.
fn reference_cell_sum(grid: &ElevationGrid) -> f64 {
    let side = grid.side();
    let h = grid.samples();
    let datum = grid.min_elevation().min(0.0);
    let spacing = grid.spacing();
    let mut total = 0.0;
    for y in 0..side - 1 {
        for x in 0..side - 1 {
            let mean = (h[y * side + x]
                + h[y * side + x + 1]
                + h[(y + 1) * side + x]
                + h[(y + 1) * side + x + 1])
                / 4.0;
            total += (mean - datum) * spacing.x * spacing.y;
        }
    }
    total
}

// ============================================================================
// Load and placement
// ============================================================================

#[test]
fn physics_load() {
    for backend in backends_for(Scenario::PhysicsLoad) {
        let source = bowl_image(129);
        let (_dir, shape) = load_png(backend, TerrainConfig::new(size_129()), "bowl.png", &source);

        assert_eq!(shape.state(), ShapeState::Ready, "{backend}");
        assert_eq!(shape.pose().unwrap().position, Point3::origin());
        let size = shape.size().unwrap();
        assert_relative_eq!(size, size_129(), epsilon = 1e-9);
        assert_eq!(shape.vertex_count().unwrap(), (129, 129));
        assert!(shape.max_height().unwrap() >= shape.min_height().unwrap());

        // Rendering the grid back reproduces the source raster
        let rendered = shape.grid().unwrap().to_image();
        let original = source.to_luma16();
        assert_eq!(rendered.dimensions(), original.dimensions());
        for (r, o) in rendered.pixels().zip(original.pixels()) {
            assert!(r.0[0].abs_diff(o.0[0]) <= 1);
        }

        // Facade heights agree with the normalized grid
        let grid = shape.grid().unwrap();
        for (x, y) in [(0, 0), (64, 64), (128, 0), (17, 93), (128, 128)] {
            assert_relative_eq!(
                shape.height_at(x, y).unwrap(),
                grid.get(x, y).unwrap(),
                epsilon = HEIGHT_TOL
            );
        }
    }
}

#[test]
fn positioned_terrain_offsets_surface() {
    for backend in Backend::ALL {
        let config = TerrainConfig::new(Vector3::new(8.0, 8.0, 1.0))
            .at_position(Point3::new(100.0, -50.0, 2.0));
        let (_dir, shape) = load_png(backend, config, "white.png", &white_image(9, false));

        assert_eq!(shape.pose().unwrap().position, Point3::new(100.0, -50.0, 2.0));
        let z = shape.surface_height(100.0, -50.0).unwrap().unwrap();
        assert_relative_eq!(z, 3.0, epsilon = HEIGHT_TOL);
        assert!(shape.surface_height(0.0, 0.0).unwrap().is_none());
    }
}

// ============================================================================
// Flat white images
// ============================================================================

fn assert_all_heights(shape: &TerrainShape, expected: f64, exact: bool) {
    let (nx, ny) = shape.vertex_count().unwrap();
    for y in 0..ny {
        for x in 0..nx {
            let h = shape.height_at(x, y).unwrap();
            if exact {
                assert_eq!(h, expected, "({x}, {y}) on {}", shape.backend());
            } else {
                assert_relative_eq!(h, expected, epsilon = HEIGHT_TOL);
            }
        }
    }
}

#[test]
fn white_alpha() {
    for backend in backends_for(Scenario::WhiteAlpha) {
        let (_dir, shape) = load_png(
            backend,
            TerrainConfig::new(size_129()),
            "white_alpha.png",
            &white_image(129, true),
        );
        assert!(shape.is_ready(), "{backend}: {:?}", shape.failure());
        assert_eq!(shape.alpha().unwrap(), Some(AlphaState::Opaque));
        assert_all_heights(&shape, 10.0, false);
    }
}

#[test]
fn white_no_alpha() {
    for backend in backends_for(Scenario::WhiteNoAlpha) {
        let (_dir, shape) = load_png(
            backend,
            TerrainConfig::new(size_129()),
            "white.png",
            &white_image(129, false),
        );
        assert!(shape.is_ready(), "{backend}: {:?}", shape.failure());
        assert_eq!(shape.alpha().unwrap(), Some(AlphaState::Absent));
        let exact = backend.capabilities().exact_heights;
        assert_all_heights(&shape, 10.0, exact);
    }
}

#[test]
fn flat_dataset_sits_at_base_offset() {
    let dir = TempDir::new().unwrap();
    write_asc(dir.path(), "flat.asc", 9, 9, 2.0, |_, _| 37.5);
    let ctx = AssetContext::with_base_dir(dir.path());
    for backend in Backend::ALL {
        let config = TerrainConfig::new(Vector3::new(16.0, 16.0, 5.0)).with_base_offset(4.25);
        let shape =
            TerrainShape::from_source(backend, config, &ElevationSource::dataset("flat.asc"), &ctx);
        assert!(shape.is_ready(), "{backend}: {:?}", shape.failure());
        assert_eq!(shape.alpha().unwrap(), None);
        assert_all_heights(&shape, 4.25, false);
    }
}

// ============================================================================
// Volume
// ============================================================================

#[test]
fn volume() {
    for backend in backends_for(Scenario::Volume) {
        let (_dir, shape) =
            load_png(backend, TerrainConfig::new(size_129()), "bowl.png", &bowl_image(129));
        let caps = shape.capabilities();

        if caps.supports_volume {
            let first = shape.volume().unwrap();
            assert!(first >= 0.0);
            for _ in 0..3 {
                assert_relative_eq!(shape.volume().unwrap(), first, epsilon = VOLUME_REPEAT_TOL);
            }
            let estimate = shape.volume_estimate().unwrap();
            assert_eq!(estimate.source, VolumeSource::Backend);
        } else {
            let err = shape.volume().unwrap_err();
            assert!(err.is_capability_gap(), "{backend}: {err}");
            assert!(shape.volume_estimate().unwrap_err().is_capability_gap());
        }
    }
}

#[test]
fn volume_of_flat_white_slab() {
    let capable = backends_for(Scenario::Volume).filter(|b| b.capabilities().supports_volume);
    for backend in capable {
        let (_dir, shape) = load_png(
            backend,
            TerrainConfig::new(size_129()),
            "white.png",
            &white_image(129, false),
        );
        assert_relative_eq!(
            shape.volume().unwrap(),
            10.0 * 129.0 * 129.0,
            max_relative = 1e-12
        );
    }
}

#[test]
fn heightfield_volume_matches_cell_sum() {
    let (_dir, shape) = load_png(
        Backend::HeightField,
        TerrainConfig::new(size_129()),
        "bowl.png",
        &bowl_image(129),
    );
    let expected = reference_cell_sum(shape.grid().unwrap());
    assert_relative_eq!(shape.volume().unwrap(), expected, max_relative = FALLBACK_TOL);
}

#[test]
fn volume_fallback_matches_reference() {
    for backend in Backend::ALL {
        let config = TerrainConfig::new(size_129()).with_volume_fallback(VolumeFallback::CellSum);
        let (_dir, shape) = load_png(backend, config, "bowl.png", &bowl_image(129));
        let estimate = shape.volume_estimate().unwrap();
        let grid = shape.grid().unwrap();

        if backend.capabilities().supports_volume {
            assert_eq!(estimate.source, VolumeSource::Backend);
        } else {
            assert_eq!(estimate.source, VolumeSource::CellSumFallback);
            assert_relative_eq!(
                estimate.value,
                reference_cell_sum(grid),
                max_relative = FALLBACK_TOL
            );
            assert_relative_eq!(estimate.value, cell_sum_volume(grid), epsilon = 1e-9);
            assert_eq!(shape.volume().unwrap(), estimate.value);
            // The backend itself still reports the gap
            assert!(shape.geometry().unwrap().volume().unwrap_err().is_capability_gap());
        }
    }
}

// ============================================================================
// Malformed sources
// ============================================================================

#[test]
fn not_square_image() {
    for backend in Backend::ALL {
        let (_dir, shape) =
            load_png(backend, TerrainConfig::new(size_129()), "wide.png", &blank_image(128, 64));

        assert_eq!(shape.state(), ShapeState::Failed);
        let failure = shape.failure().unwrap();
        assert_eq!(failure.stage, LoadStage::Decode);
        assert_eq!(
            failure.error,
            TerrainError::NotSquareImage {
                width: 128,
                height: 64
            }
        );
        assert!(failure.error.is_geometry_violation());
        assert!(failure.to_string().contains("128×64"));
        assert!(matches!(
            shape.height_at(0, 0),
            Err(TerrainError::NotReady {
                state: ShapeState::Failed
            })
        ));
    }
}

#[test]
fn invalid_size_image() {
    for backend in Backend::ALL {
        let (_dir, shape) = load_png(
            backend,
            TerrainConfig::new(size_129()),
            "even.png",
            &blank_image(128, 128),
        );
        assert_eq!(shape.state(), ShapeState::Failed);
        let failure = shape.failure().unwrap();
        assert_eq!(failure.stage, LoadStage::Decode);
        assert!(matches!(
            failure.error,
            TerrainError::InvalidSize {
                width: 128,
                height: 128
            }
        ));
    }
}

#[test]
fn missing_asset_fails_at_resolve() {
    let dir = TempDir::new().unwrap();
    let ctx = AssetContext::with_base_dir(dir.path()).with_search_path(dir.path().join("media"));
    let shape = TerrainShape::from_source(
        Backend::HeightField,
        TerrainConfig::new(size_129()),
        &ElevationSource::image("nowhere.png"),
        &ctx,
    );
    let failure = shape.failure().unwrap();
    assert_eq!(failure.stage, LoadStage::Resolve);
    match &failure.error {
        TerrainError::AssetNotFound { searched, .. } => assert_eq!(searched.len(), 2),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn reload_is_rejected() {
    let (dir, mut shape) = load_png(
        Backend::HeightField,
        TerrainConfig::new(size_129()),
        "white.png",
        &white_image(129, false),
    );
    let ctx = AssetContext::with_base_dir(dir.path());
    let err = shape
        .load(&ElevationSource::image("white.png"), &ctx)
        .unwrap_err();
    assert_eq!(
        err,
        TerrainError::AlreadyLoaded {
            state: ShapeState::Ready
        }
    );
    assert!(shape.is_ready());
}

// ============================================================================
// Subsampling
// ============================================================================

#[test]
fn subsampling_keeps_source_samples() {
    for backend in backends_for(Scenario::Subsampling) {
        let source = bowl_image(129);
        let config = TerrainConfig::new(size_129()).with_vertex_count(33, 33);
        let (_dir, shape) = load_png(backend, config, "bowl.png", &source);

        assert_eq!(shape.vertex_count().unwrap(), (33, 33));
        let luma = source.to_luma8();
        for (x, y) in [(0, 0), (32, 0), (0, 32), (32, 32), (16, 16), (5, 27)] {
            let pixel = luma.get_pixel(x * 4, y * 4).0[0];
            let expected = f64::from(pixel) / 255.0 * 10.0;
            assert_relative_eq!(
                shape.height_at(x as usize, y as usize).unwrap(),
                expected,
                epsilon = HEIGHT_TOL
            );
        }
        assert_relative_eq!(shape.size().unwrap(), size_129(), epsilon = 1e-9);
    }
}

#[test]
fn unsupported_vertex_counts() {
    let cases = [
        ((257, 257), LoadStage::Normalize, "requested"),
        ((33, 17), LoadStage::Normalize, "invalid"),
        ((32, 32), LoadStage::Normalize, "invalid"),
    ];
    for ((vx, vy), stage, kind) in cases {
        let config = TerrainConfig::new(size_129()).with_vertex_count(vx, vy);
        let (_dir, shape) =
            load_png(Backend::HeightField, config, "white.png", &white_image(129, false));
        let failure = shape.failure().unwrap();
        assert_eq!(failure.stage, stage);
        match kind {
            "requested" => assert!(matches!(
                failure.error,
                TerrainError::UnsupportedResolution { .. }
            )),
            _ => assert!(matches!(failure.error, TerrainError::InvalidSize { .. })),
        }
    }
}

// ============================================================================
// Negative elevations
// ============================================================================

fn negative_dem_shape(backend: Backend, dir: &TempDir) -> TerrainShape {
    write_asc(dir.path(), "dem_neg.asc", 33, 33, 2.0, negative_bowl(33));
    let ctx = AssetContext::with_base_dir(dir.path());
    let config = TerrainConfig::new(Vector3::new(64.0, 64.0, 12.0)).with_datum(HeightDatum::Source);
    TerrainShape::from_source(backend, config, &ElevationSource::dataset("dem_neg.asc"), &ctx)
}

#[test]
fn negative_elevation_policy_is_deterministic() {
    let dir = TempDir::new().unwrap();
    for backend in Backend::ALL {
        let first = negative_dem_shape(backend, &dir);
        let second = negative_dem_shape(backend, &dir);
        assert_eq!(first.state(), second.state(), "{backend}");
        assert_eq!(first.failure(), second.failure(), "{backend}");

        let caps = backend.capabilities();
        if caps.supports_negative_elevation() {
            assert_relative_eq!(first.min_height().unwrap(), -212.0, epsilon = 1e-9);
            assert_relative_eq!(first.max_height().unwrap(), -200.0, epsilon = 1e-9);
        } else if first.is_ready() {
            // Clamping policy: the normalized grid keeps its datum, the
            // backend surface sits at zero
            assert_relative_eq!(first.min_height().unwrap(), -212.0, epsilon = 1e-9);
            assert_relative_eq!(first.height_at(16, 16).unwrap(), 0.0, epsilon = HEIGHT_TOL);
            assert_eq!(first.height_at(16, 16).unwrap(), second.height_at(16, 16).unwrap());
        } else {
            let failure = first.failure().unwrap();
            assert_eq!(failure.stage, LoadStage::Build);
            assert!(matches!(
                failure.error,
                TerrainError::BackendBuildFailure { .. }
            ));
        }
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_reads_agree() {
    let (_dir, shape) = load_png(
        Backend::HeightField,
        TerrainConfig::new(Vector3::new(32.0, 32.0, 4.0)),
        "bowl.png",
        &bowl_image(33),
    );
    let shape = Arc::new(shape);
    let expected: Vec<f64> = shape.grid().unwrap().samples().to_vec();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let shape = Arc::clone(&shape);
            thread::spawn(move || {
                let mut heights = Vec::with_capacity(33 * 33);
                for y in 0..33 {
                    for x in 0..33 {
                        heights.push(shape.height_at(x, y).unwrap());
                    }
                }
                let probe = f64::from(i) - 2.0;
                let surface = shape.surface_height(probe, probe).unwrap().unwrap();
                (heights, surface)
            })
        })
        .collect();

    for handle in handles {
        let (heights, surface) = handle.join().unwrap();
        assert_eq!(heights, expected);
        assert!(surface.is_finite());
    }
    assert_eq!(shape.volume().unwrap(), shape.volume().unwrap());
}

// ============================================================================
// Normalizer properties
// ============================================================================

#[allow(clippy::cast_precision_loss)]
fn raw_from(side: usize, seed: u64) -> RawElevation {
    let grid = ElevationGrid::from_fn(side, nalgebra::Vector2::new(1.0, 1.0), |x, y| {
        ((x as u64 * 31 + y as u64 * 17 + seed) % 101) as f64 / 100.0
    })
    .unwrap();
    RawElevation::from_image_grid(grid, AlphaState::Absent)
}

proptest! {
    #[test]
    fn subsampled_grid_has_requested_count(
        source_exp in 2u32..7,
        drop in 0u32..4,
        seed in 0u64..1000,
        size_z in 0.5f64..50.0,
        offset in -10.0f64..10.0,
    ) {
        let source_side = (1usize << source_exp) + 1;
        let target_exp = source_exp.saturating_sub(drop).max(1);
        let target_side = (1usize << target_exp) + 1;
        let raw = raw_from(source_side, seed);
        let config = TerrainConfig::new(Vector3::new(10.0, 20.0, size_z))
            .with_base_offset(offset)
            .with_vertex_count(target_side, target_side);

        let shape = TerrainShape::from_raw(Backend::HeightField, config, &raw);
        prop_assert!(shape.is_ready());
        prop_assert_eq!(shape.vertex_count().unwrap(), (target_side, target_side));

        // Corners survive decimation
        let last = target_side - 1;
        let src_last = source_side - 1;
        for (x, y, sx, sy) in [(0, 0, 0, 0), (last, 0, src_last, 0), (0, last, 0, src_last), (last, last, src_last, src_last)] {
            let expected = raw.grid.get(sx, sy).unwrap() * size_z + offset;
            prop_assert!((shape.height_at(x, y).unwrap() - expected).abs() < 1e-9);
        }

        // Heights stay inside the configured band and the aspect is preserved
        let grid = shape.grid().unwrap();
        prop_assert!(grid.min_elevation() >= offset - 1e-9);
        prop_assert!(grid.max_elevation() <= offset + size_z + 1e-9);
        let extent = grid.extent();
        prop_assert!((extent.x - 10.0).abs() < 1e-9 && (extent.y - 20.0).abs() < 1e-9);
    }
}
