//! Benchmarks for fixstep
//!
//! Run with: `cargo bench` (add `--features parallel` for the batched solver)

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use fixstep::collider::AABB;
use fixstep::dynamic_bvh::DynamicAabbTree;
use fixstep::gjk::convex_contact;
use fixstep::prelude::*;
use fixstep::scenario;
use fixstep::shape::WorldConvex;

// ============================================================================
// Step benchmarks
// ============================================================================

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");

    group.bench_function("pyramid_210_single_step", |b| {
        let mut space = scenario::pyramid(20);
        // let the stack settle so the benchmark measures resting contact
        for _ in 0..30 {
            space.update();
        }
        b.iter(|| {
            space.update();
            black_box(space.frame())
        });
    });

    group.bench_function("random_boxes_500_broad_phase", |b| {
        let mut space = scenario::random_boxes(11, 500, Fix64::from_int(40));
        b.iter(|| {
            space.update();
            black_box(space.stats().broad_pairs)
        });
    });

    group.sample_size(10);
    group.bench_function("pyramid_210_1000_steps_hashed", |b| {
        b.iter(|| {
            let mut space = scenario::pyramid(20);
            let mut trace = HashTrace::new(20);
            for _ in 0..1000 {
                space.update();
                trace.observe(&space);
            }
            black_box(trace.hashes().len())
        });
    });

    group.finish();
}

// ============================================================================
// Math operation benchmarks
// ============================================================================

fn bench_math_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("math_ops");

    let a = Fix64::from_ratio(12345, 7);
    let b = Fix64::from_ratio(-6789, 13);

    group.bench_function("fix64_mul", |bench| {
        bench.iter(|| black_box(black_box(a) * black_box(b)));
    });

    group.bench_function("fix64_div", |bench| {
        bench.iter(|| black_box(black_box(a) / black_box(b)));
    });

    group.bench_function("fix64_sqrt", |bench| {
        let val = Fix64::from_int(12345);
        bench.iter(|| black_box(black_box(val).sqrt_sat()));
    });

    group.bench_function("fix64_sin_cos", |bench| {
        let angle = Fix64::from_ratio(1, 4);
        bench.iter(|| black_box(black_box(angle).sin_cos()));
    });

    let va = Vec3Fix::from_int(3, 4, 5);
    let vb = Vec3Fix::from_int(6, 7, 8);

    group.bench_function("vec3_cross", |bench| {
        bench.iter(|| black_box(black_box(va).cross(black_box(vb))));
    });

    group.bench_function("vec3_normalize", |bench| {
        bench.iter(|| black_box(black_box(va).normalize()));
    });

    group.finish();
}

// ============================================================================
// Collision benchmarks
// ============================================================================

fn bench_collision(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision");

    let hull = ConvexShape::cylinder(Fix64::ONE, Fix64::ONE).expect("cylinder");
    let cube = ConvexShape::cuboid(Vec3Fix::splat(Fix64::ONE)).expect("box");
    let rot = QuatFix::from_axis_angle(Vec3Fix::UNIT_Z, Fix64::QUARTER_PI);
    let ta = Transform::IDENTITY;
    let tb = Transform::new(Vec3Fix::new(Fix64::from_ratio(17, 10), Fix64::ZERO, Fix64::ZERO), rot);

    group.bench_function("gjk_epa_cylinder_box", |bench| {
        bench.iter(|| {
            black_box(convex_contact(
                &WorldConvex::new(&hull, ta),
                &WorldConvex::new(&cube, tb),
                Fix64::ZERO,
            ))
        });
    });

    let mut space = scenario::random_boxes(5, 300, Fix64::from_int(30));
    space.update();
    let ray = Ray::new(Vec3Fix::from_int(-40, 0, 0), Vec3Fix::UNIT_X, Fix64::from_int(80));
    group.bench_function("ray_cast_300_boxes", |bench| {
        bench.iter(|| black_box(space.ray_cast(black_box(&ray), &QueryFilter::new())));
    });

    let mut tree = DynamicAabbTree::new();
    for i in 0u32..1000 {
        let x = Fix64::from_int(i64::from(i % 32) * 2);
        let z = Fix64::from_int(i64::from(i / 32) * 2);
        let min = Vec3Fix::new(x, Fix64::ZERO, z);
        tree.insert(AABB::new(min, min + Vec3Fix::splat(Fix64::ONE)), i);
    }
    group.bench_function("dynamic_tree_query_1000", |bench| {
        let q = AABB::new(Vec3Fix::from_int(10, 0, 10), Vec3Fix::from_int(20, 1, 20));
        bench.iter(|| black_box(tree.query(black_box(&q))));
    });

    group.finish();
}

criterion_group!(benches, bench_step, bench_math_ops, bench_collision);
criterion_main!(benches);
