//! # Waypoint Navigation Benchmark

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Vector3;

use nav_lib::{
    sim::SimWorld,
    wp_nav::{Params, SplineSegmentEnd, WpNav},
};

fn wp_nav_benchmark(c: &mut Criterion) {
    // ---- Straight segment, mid-flight ----

    let mut world = SimWorld::new(Vector3::zeros());
    let mut wp_nav = WpNav::new(Params::default(), &world.ahrs);
    wp_nav.wp_and_spline_init(&mut world.io());
    wp_nav
        .set_wp_destination(&mut world.io(), Vector3::new(1e6, 1e6, 1000.0), false)
        .unwrap();

    for _ in 0..500 {
        wp_nav.update_wpnav(&mut world.io()).unwrap();
        world.step();
    }

    c.bench_function("WpNav::update_wpnav", |b| {
        b.iter(|| {
            wp_nav.update_wpnav(&mut world.io()).unwrap();
            world.step();
        })
    });

    // ---- Spline segment ----

    let mut world = SimWorld::new(Vector3::zeros());
    let mut wp_nav = WpNav::new(Params::default(), &world.ahrs);
    wp_nav.wp_and_spline_init(&mut world.io());

    c.bench_function("WpNav::set_spline_destination", |b| {
        b.iter(|| {
            wp_nav
                .set_spline_destination(
                    &mut world.io(),
                    Vector3::new(5000.0, 2000.0, 500.0),
                    false,
                    true,
                    SplineSegmentEnd::Spline(Vector3::new(8000.0, 0.0, 500.0)),
                )
                .unwrap()
        })
    });

    // Long spline so the target never reaches the destination while benching
    wp_nav
        .set_spline_destination(
            &mut world.io(),
            Vector3::new(1e6, 0.0, 0.0),
            false,
            true,
            SplineSegmentEnd::Stop,
        )
        .unwrap();

    c.bench_function("WpNav::update_spline", |b| {
        b.iter(|| {
            wp_nav.update_spline(&mut world.io()).unwrap();
            world.step();
        })
    });
}

criterion_group!(benches, wp_nav_benchmark);
criterion_main!(benches);
