//! Bodies falling onto terrain through the world stepping loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use sim_core::{BodyShape, SimIface, Stepper, World};
use sim_terrain::{
    AssetContext, Backend, ElevationSource, HeightDatum, TerrainConfig, TerrainShape,
};
use sim_types::{SimError, SimulationConfig};
use tempfile::TempDir;

use crate::terrain_test_utils::{
    backends_for, blank_image, bowl_image, negative_bowl, write_asc, write_png, Scenario,
};

fn bowl_terrain(backend: Backend, dir: &TempDir) -> Arc<TerrainShape> {
    write_png(dir.path(), "bowl.png", &bowl_image(33));
    let ctx = AssetContext::with_base_dir(dir.path());
    let shape = TerrainShape::from_source(
        backend,
        TerrainConfig::new(Vector3::new(32.0, 32.0, 4.0)),
        &ElevationSource::image("bowl.png"),
        &ctx,
    );
    assert!(shape.is_ready(), "{backend}: {:?}", shape.failure());
    Arc::new(shape)
}

#[test]
fn load_dem_box_comes_to_rest() {
    for backend in backends_for(Scenario::LoadDem) {
        let dir = TempDir::new().unwrap();
        write_asc(dir.path(), "dem_neg.asc", 33, 33, 2.0, negative_bowl(33));
        let ctx = AssetContext::with_base_dir(dir.path());
        let config = TerrainConfig::new(Vector3::new(64.0, 64.0, 12.0))
            .with_datum(HeightDatum::Source);
        let shape =
            TerrainShape::from_source(backend, config, &ElevationSource::dataset("dem_neg.asc"), &ctx);

        assert_eq!(shape.pose().unwrap().position, Point3::origin());
        let min_height = shape.min_height().unwrap();
        let max_height = shape.max_height().unwrap();
        assert!(max_height >= min_height);

        let mut world = World::new(SimulationConfig::default());
        world.add_terrain("heightmap", Arc::new(shape)).unwrap();
        let init = Point3::new(0.0, 0.0, -207.0);
        let id = world
            .add_body("box", BodyShape::cuboid(Vector3::new(1.0, 1.0, 1.0)), 1.0, init)
            .unwrap();
        assert!(init.z >= min_height);

        let mut stepper = Stepper::new();
        stepper.run(&mut world, Some(1000)).unwrap();
        let rest = world.body(id).unwrap().position;
        assert_ne!(rest, init);
        assert!(rest.z >= min_height);
        assert!(world.body(id).unwrap().in_contact);

        stepper.run(&mut world, Some(100)).unwrap();
        let new_rest = world.body(id).unwrap().position;
        assert_relative_eq!(new_rest, rest, epsilon = 1e-9);
    }
}

#[test]
fn sphere_settles_in_bowl_on_every_backend() {
    for backend in Backend::ALL {
        let dir = TempDir::new().unwrap();
        let terrain = bowl_terrain(backend, &dir);
        let mut world = World::default();
        world.add_terrain("bowl", Arc::clone(&terrain)).unwrap();
        world
            .add_body("ball", BodyShape::sphere(0.5), 1.0, Point3::new(0.0, 0.0, 3.0))
            .unwrap();

        let settled = Stepper::new()
            .run_until_settled(&mut world, 5.0, 1e-3)
            .unwrap();
        assert!(settled, "{backend}");

        let ball = world.body_by_name("ball").unwrap();
        let surface = terrain.surface_height(0.0, 0.0).unwrap().unwrap();
        assert_relative_eq!(ball.bottom(), surface, epsilon = 1e-3);
    }
}

#[test]
fn failed_terrain_aborts_only_its_model() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "wide.png", &blank_image(128, 64));
    let ctx = AssetContext::with_base_dir(dir.path());
    let failed = TerrainShape::from_source(
        Backend::HeightField,
        TerrainConfig::default(),
        &ElevationSource::image("wide.png"),
        &ctx,
    );

    let mut world = World::default();
    let err = world.add_terrain("broken", Arc::new(failed)).unwrap_err();
    match &err {
        SimError::TerrainLoad { name, reason } => {
            assert_eq!(name, "broken");
            assert!(reason.contains("decode stage failed"));
            assert!(reason.contains("128×64"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    world.add_terrain("bowl", bowl_terrain(Backend::HeightField, &dir)).unwrap();
    assert_eq!(world.terrains().len(), 1);
    world
        .add_body("ball", BodyShape::sphere(0.5), 1.0, Point3::new(0.0, 0.0, 2.0))
        .unwrap();
    assert!(Stepper::new().run_until_settled(&mut world, 5.0, 1e-3).unwrap());
}

#[test]
fn client_reads_while_stepping() {
    let dir = TempDir::new().unwrap();
    let mut world = World::default();
    world.add_terrain("bowl", bowl_terrain(Backend::HeightField, &dir)).unwrap();
    world
        .add_body("ball", BodyShape::sphere(0.5), 1.0, Point3::new(0.0, 0.0, 3.0))
        .unwrap();

    let iface = Arc::new(SimIface::new());
    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let iface = Arc::clone(&iface);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut last = 0.0;
            let mut reads = 0u64;
            loop {
                let finished = done.load(Ordering::Acquire);
                let time = iface.with_locked(|data| {
                    if let Some(ball) = data.body("ball") {
                        assert!(ball.pose.position.z.is_finite());
                    }
                    data.sim_time
                });
                assert!(time >= last);
                last = time;
                reads += 1;
                if finished {
                    return reads;
                }
            }
        })
    };

    let mut stepper = Stepper::new().with_iface(Arc::clone(&iface));
    stepper.run(&mut world, Some(480)).unwrap();
    done.store(true, Ordering::Release);
    assert!(reader.join().unwrap() > 0);

    let data = iface.snapshot();
    assert_eq!(data.step_count, 480);
    assert!(data.body("ball").unwrap().in_contact);
}
