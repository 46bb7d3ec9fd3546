#![no_main]
use arbitrary::Arbitrary;
use fixstep::prelude::*;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum FuzzShape {
    Sphere(u8),
    Cuboid(u8, u8, u8),
    Capsule(u8, u8),
    None,
}

#[derive(Debug, Arbitrary)]
struct FuzzBody {
    position: (i16, i16, i16),
    velocity: (i8, i8, i8),
    mass: u16,
    shape: FuzzShape,
    is_static: bool,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    bodies: Vec<FuzzBody>,
    /// Raw time step; non-positive values must be ignored
    dt_raw: i32,
    /// Number of simulation steps (capped)
    step_count: u8,
    /// Slots to remove halfway through
    removals: Vec<u8>,
}

fn tenths(v: u8) -> Fix64 {
    Fix64::from_ratio(i64::from(v), 10)
}

// Fuzz the full step: arbitrary bodies, shapes (including invalid ones),
// time steps and removals. Must never panic and must stay deterministic.
fuzz_target!(|input: FuzzInput| {
    let run = || {
        let mut space = Space::default();
        let mut handles = Vec::new();
        for body in input.bodies.iter().take(24) {
            let (px, py, pz) = body.position;
            let position = Vec3Fix::from_int(i64::from(px), i64::from(py), i64::from(pz));
            let mut rigid = if body.is_static {
                RigidBody::new_static(position)
            } else {
                RigidBody::new_dynamic(position, Fix64::from_int(i64::from(body.mass.max(1))))
            };
            let (vx, vy, vz) = body.velocity;
            rigid = rigid.with_velocity(Vec3Fix::from_int(i64::from(vx), i64::from(vy), i64::from(vz)), Vec3Fix::ZERO);
            let shape = match body.shape {
                FuzzShape::Sphere(r) => Shape::sphere(tenths(r)).ok(),
                FuzzShape::Cuboid(x, y, z) => Shape::cuboid(Vec3Fix::new(tenths(x), tenths(y), tenths(z))).ok(),
                FuzzShape::Capsule(r, h) => Shape::capsule(tenths(r), tenths(h)).ok(),
                FuzzShape::None => None,
            };
            if let Some(shape) = shape {
                rigid = rigid.with_shape(shape);
            }
            match space.add_body(rigid) {
                Ok(h) | Err(PhysicsError::MissingShape { handle: h }) => handles.push(h),
                Err(_) => {}
            }
        }

        let dt = Fix64::from_raw(i64::from(input.dt_raw));
        let steps = usize::from(input.step_count).min(32);
        for i in 0..steps {
            if i == steps / 2 {
                for &slot in &input.removals {
                    if let Some(&h) = handles.get(usize::from(slot)) {
                        space.remove_body(h);
                    }
                }
            }
            space.step(dt);
        }
        state_hash(&space)
    };
    assert_eq!(run(), run(), "identical inputs must hash identically");
});
