#![no_main]
use arbitrary::Arbitrary;
use fixstep::gjk::convex_contact;
use fixstep::narrowphase::collide;
use fixstep::prelude::*;
use fixstep::shape::WorldConvex;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct CollisionInput {
    /// Half extents / radii in hundredths
    size_a: (u8, u8, u8),
    size_b: (u8, u8, u8),
    kind_a: u8,
    kind_b: u8,
    /// Relative placement in hundredths (close together to force overlap)
    offset: (i8, i8, i8),
    /// Rotation of B, raw angle bits
    angle: i16,
}

fn make(kind: u8, (x, y, z): (u8, u8, u8)) -> Option<ConvexShape> {
    let h = |v: u8| Fix64::from_ratio(i64::from(v), 100);
    match kind % 5 {
        0 => ConvexShape::sphere(h(x)).ok(),
        1 => ConvexShape::cuboid(Vec3Fix::new(h(x), h(y), h(z))).ok(),
        2 => ConvexShape::capsule(h(x), h(y)).ok(),
        3 => ConvexShape::cylinder(h(x), h(y)).ok(),
        _ => ConvexShape::cone(h(x), h(y)).ok(),
    }
}

// Fuzz the narrow phase with arbitrary convex pairs. Must never panic and
// every reported contact must have a unit normal.
fuzz_target!(|input: CollisionInput| {
    let (Some(a), Some(b)) = (make(input.kind_a, input.size_a), make(input.kind_b, input.size_b)) else {
        return;
    };
    let (ox, oy, oz) = input.offset;
    let offset = Vec3Fix::new(
        Fix64::from_ratio(i64::from(ox), 100),
        Fix64::from_ratio(i64::from(oy), 100),
        Fix64::from_ratio(i64::from(oz), 100),
    );
    let angle = Fix64::from_ratio(i64::from(input.angle), 1000);
    let ta = Transform::IDENTITY;
    let tb = Transform::new(offset, QuatFix::from_axis_angle(Vec3Fix::new(Fix64::ONE, Fix64::ONE, Fix64::ZERO), angle));

    let _ = convex_contact(&WorldConvex::new(&a, ta), &WorldConvex::new(&b, tb), Fix64::from_ratio(2, 100));

    let mut contacts = Vec::new();
    collide(&Shape::Convex(a), &ta, &Shape::Convex(b), &tb, Fix64::from_ratio(2, 100), &mut contacts);
    for contact in &contacts {
        let len = contact.normal.length();
        assert!((len - Fix64::ONE).abs() < Fix64::from_ratio(1, 100), "normal length {len}");
    }
});
