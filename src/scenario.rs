//! Benchmark Scenarios
//!
//! Ready-made spaces used by the benchmarks, the determinism checks and
//! the integration tests.
//!
//! # Features
//!
//! - **Pyramid**: stacked boxes on a static platform, the standard stacking
//!   and determinism workload
//! - **Fast spheres**: spheres dropped at 100 m/s onto a thin slab, the
//!   tunnelling and determinism workload
//! - **Random boxes**: seeded scatter for broad-phase soundness checks

use crate::body::RigidBody;
use crate::fixed::Fix64;
use crate::math::{QuatFix, Vec3Fix};
use crate::rng::DeterministicRng;
use crate::shape::Shape;
use crate::space::{Space, SpaceConfig};

/// Edge length of a pyramid box
pub const PYRAMID_BOX_SIZE: Fix64 = Fix64::TWO;

/// Mass of a pyramid box
pub const PYRAMID_BOX_MASS: Fix64 = Fix64::from_int(20);

/// Number of boxes in a pyramid with `base` boxes on the bottom row
pub const fn pyramid_box_count(base: usize) -> usize {
    base * (base + 1) / 2
}

/// Pyramid of `base` rows on a static platform, default configuration.
///
/// Row `i` holds `base - i` boxes. The platform is slot 0 and boxes follow
/// row by row, left to right.
pub fn pyramid(base: usize) -> Space {
    let mut space = Space::new(SpaceConfig::default());
    let n = base as i64;
    let s = PYRAMID_BOX_SIZE;

    let width = Fix64::from_int(n * 2 + 20);
    let depth = Fix64::from_int((n * 2 + 10).min(50));
    let platform_half = Vec3Fix::new(width.half(), Fix64::HALF, depth.half());
    let platform = Shape::cuboid(platform_half).map(|shape| {
        RigidBody::new_static(Vec3Fix::new(Fix64::ZERO, -Fix64::HALF, Fix64::ZERO)).with_shape(shape)
    });

    let half = Vec3Fix::splat(s.half());
    let cube = Shape::cuboid(half);
    if let (Ok(platform), Ok(cube)) = (platform, cube) {
        // fresh space with validated shapes: insertion cannot fail
        let _ = space.add_body(platform);
        for i in 0..n {
            for j in 0..(n - i) {
                let x = -(s * Fix64::from_int(n)).half() + s.half() * Fix64::from_int(i) + s * Fix64::from_int(j);
                let y = s.half() + s * Fix64::from_int(i);
                let body = RigidBody::new_dynamic(Vec3Fix::new(x, y, Fix64::ZERO), PYRAMID_BOX_MASS).with_shape(cube.clone());
                let _ = space.add_body(body);
            }
        }
    }
    space
}

/// Launch speed of the fast spheres
pub const FAST_SPHERE_SPEED: Fix64 = Fix64::from_int(100);

/// Half thickness of the slab the fast spheres land on
pub const FAST_SPHERE_SLAB_HALF_HEIGHT: Fix64 = Fix64::from_ratio(5, 100);

/// Radii of the fast spheres; each one is launched twice, at `x` and `-x`
pub const FAST_SPHERE_RADII: [Fix64; 3] = [Fix64::HALF, Fix64::from_ratio(1, 4), Fix64::from_ratio(1, 10)];

/// Six unit-mass spheres launched downward at [`FAST_SPHERE_SPEED`] from
/// a height of 150 onto a static 20 × 0.1 × 20 slab.
///
/// The slab is slot 3; spheres at `x = -6, -4, -2` precede it and their
/// mirrors at `x = 6, 4, 2` follow.
pub fn fast_spheres() -> Space {
    let mut space = Space::new(SpaceConfig::default());
    let height = Fix64::from_int(150);
    let velocity = Vec3Fix::new(Fix64::ZERO, -FAST_SPHERE_SPEED, Fix64::ZERO);
    let add_spheres = |space: &mut Space, side: i64| {
        for (i, radius) in FAST_SPHERE_RADII.into_iter().enumerate() {
            let x = Fix64::from_int(side * (6 - 2 * i as i64));
            if let Ok(shape) = Shape::sphere(radius) {
                let body = RigidBody::new_dynamic(Vec3Fix::new(x, height, Fix64::ZERO), Fix64::ONE)
                    .with_shape(shape)
                    .with_velocity(velocity, Vec3Fix::ZERO);
                let _ = space.add_body(body);
            }
        }
    };

    add_spheres(&mut space, -1);
    let slab_half = Vec3Fix::new(Fix64::from_int(10), FAST_SPHERE_SLAB_HALF_HEIGHT, Fix64::from_int(10));
    if let Ok(slab) = Shape::cuboid(slab_half) {
        let _ = space.add_body(RigidBody::new_static(Vec3Fix::ZERO).with_shape(slab));
    }
    add_spheres(&mut space, 1);
    space
}

/// `count` randomly placed and oriented boxes inside `[-extent, extent]³`,
/// with gravity off
pub fn random_boxes(seed: u64, count: usize, extent: Fix64) -> Space {
    let mut space = Space::new(SpaceConfig {
        gravity: Vec3Fix::ZERO,
        ..SpaceConfig::default()
    });
    let mut rng = DeterministicRng::new(seed);
    let lo = Vec3Fix::splat(-extent);
    let hi = Vec3Fix::splat(extent);
    for _ in 0..count {
        let position = rng.next_vec3_in_box(lo, hi);
        let half = Vec3Fix::new(
            rng.next_range(Fix64::from_ratio(1, 4), Fix64::ONE),
            rng.next_range(Fix64::from_ratio(1, 4), Fix64::ONE),
            rng.next_range(Fix64::from_ratio(1, 4), Fix64::ONE),
        );
        let orientation = QuatFix::from_axis_angle(rng.next_direction(), rng.next_range(Fix64::ZERO, Fix64::PI));
        if let Ok(shape) = Shape::cuboid(half) {
            let body = RigidBody::new_dynamic(position, Fix64::ONE)
                .with_shape(shape)
                .with_orientation(orientation);
            let _ = space.add_body(body);
        }
    }
    space
}
