//! Raycasting Primitives
//!
//! Exact ray tests against shapes in their local frame. The space-level
//! query in [`crate::query`] transforms a world ray into each candidate
//! body's frame and dispatches here.
//!
//! # Features
//!
//! - Ray-Sphere (analytic)
//! - Ray-Box (slab method)
//! - Ray-Triangle (Möller–Trumbore)
//!
//! Rays that start inside a solid report a hit at distance zero with the
//! normal facing back along the ray.

use serde::{Deserialize, Serialize};

use crate::body::BodyHandle;
use crate::fixed::Fix64;
use crate::math::Vec3Fix;
use crate::trimesh::Triangle;

/// Determinant below this is treated as a ray parallel to the triangle.
const RAY_PARALLEL_EPSILON: Fix64 = Fix64::from_raw(1 << 8);

/// A ray with a finite reach
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ray {
    /// Ray origin point
    pub origin: Vec3Fix,
    /// Unit direction
    pub direction: Vec3Fix,
    /// Farthest distance considered
    pub max_distance: Fix64,
}

impl Ray {
    /// Create a new ray (direction is normalized, zero becomes +X)
    pub fn new(origin: Vec3Fix, direction: Vec3Fix, max_distance: Fix64) -> Self {
        let dir = direction.normalize();
        Self {
            origin,
            direction: if dir.is_zero() { Vec3Fix::UNIT_X } else { dir },
            max_distance,
        }
    }

    /// Point at distance `t`
    #[inline]
    pub fn at(&self, t: Fix64) -> Vec3Fix {
        self.origin + self.direction * t
    }
}

/// Closest hit returned by a space-level ray cast
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RayHit {
    /// Body that was hit
    pub body: BodyHandle,
    /// Distance along the ray
    pub distance: Fix64,
    /// World-space hit point
    pub point: Vec3Fix,
    /// World-space surface normal (faces the ray)
    pub normal: Vec3Fix,
}

/// Hit against a single shape in its local frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShapeHit {
    /// Distance along the ray
    pub distance: Fix64,
    /// Local surface normal
    pub normal: Vec3Fix,
}

/// Ray against a sphere centred at the origin
pub fn ray_sphere(origin: Vec3Fix, dir: Vec3Fix, radius: Fix64, max_t: Fix64) -> Option<ShapeHit> {
    let b = origin.dot(dir);
    let c = origin.length_squared() - radius * radius;
    if c <= Fix64::ZERO {
        return Some(ShapeHit {
            distance: Fix64::ZERO,
            normal: -dir,
        });
    }
    // Origin outside and pointing away
    if b > Fix64::ZERO {
        return None;
    }
    let disc = b * b - c;
    if disc.is_negative() {
        return None;
    }
    let t = -b - disc.sqrt_sat();
    if t > max_t {
        return None;
    }
    let t = t.max(Fix64::ZERO);
    let normal = (origin + dir * t).normalize();
    Some(ShapeHit { distance: t, normal })
}

/// Ray against a box `[-half, half]` (slab method)
pub fn ray_box(origin: Vec3Fix, dir: Vec3Fix, half: Vec3Fix, max_t: Fix64) -> Option<ShapeHit> {
    let mut t_enter = Fix64::MIN;
    let mut t_exit = Fix64::MAX;
    let mut enter_axis = usize::MAX;
    let mut enter_sign = Fix64::ZERO;

    for axis in 0..3 {
        let o = origin.axis(axis);
        let d = dir.axis(axis);
        let h = half.axis(axis);
        if d.is_zero() {
            if o < -h || o > h {
                return None;
            }
            continue;
        }
        let t1 = (-h - o) / d;
        let t2 = (h - o) / d;
        let (near, far, sign) = if t1 <= t2 {
            (t1, t2, Fix64::NEG_ONE)
        } else {
            (t2, t1, Fix64::ONE)
        };
        if near > t_enter {
            t_enter = near;
            enter_axis = axis;
            enter_sign = sign;
        }
        t_exit = t_exit.min(far);
    }

    if t_enter > t_exit || t_exit.is_negative() {
        return None;
    }
    if t_enter <= Fix64::ZERO {
        // Started inside
        return Some(ShapeHit {
            distance: Fix64::ZERO,
            normal: -dir,
        });
    }
    if t_enter > max_t {
        return None;
    }
    let mut normal = Vec3Fix::ZERO;
    match enter_axis {
        0 => normal.x = enter_sign,
        1 => normal.y = enter_sign,
        _ => normal.z = enter_sign,
    }
    Some(ShapeHit {
        distance: t_enter,
        normal,
    })
}

/// Ray-Triangle intersection (Möller–Trumbore), double sided
pub fn ray_triangle(origin: Vec3Fix, dir: Vec3Fix, tri: &Triangle, max_t: Fix64) -> Option<ShapeHit> {
    let e1 = tri.v1 - tri.v0;
    let e2 = tri.v2 - tri.v0;
    let h = dir.cross(e2);
    let det = e1.dot(h);
    if det.abs() < RAY_PARALLEL_EPSILON {
        return None;
    }

    let s = origin - tri.v0;
    let u = s.dot(h) / det;
    if u < Fix64::ZERO || u > Fix64::ONE {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) / det;
    if v < Fix64::ZERO || u + v > Fix64::ONE {
        return None;
    }
    let t = e2.dot(q) / det;
    if t < Fix64::ZERO || t > max_t {
        return None;
    }

    let n = tri.unit_normal();
    let normal = if n.dot(dir) > Fix64::ZERO { -n } else { n };
    Some(ShapeHit { distance: t, normal })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down() -> Vec3Fix {
        -Vec3Fix::UNIT_Y
    }

    #[test]
    fn test_ray_new_normalizes() {
        let r = Ray::new(Vec3Fix::ZERO, Vec3Fix::from_int(0, 0, 5), Fix64::from_int(10));
        assert_eq!(r.direction, Vec3Fix::UNIT_Z);
        let z = Ray::new(Vec3Fix::ZERO, Vec3Fix::ZERO, Fix64::ONE);
        assert_eq!(z.direction, Vec3Fix::UNIT_X);
    }

    #[test]
    fn test_ray_sphere_hit() {
        let hit = ray_sphere(Vec3Fix::from_int(0, 10, 0), down(), Fix64::ONE, Fix64::from_int(100))
            .expect("should hit");
        assert_eq!(hit.distance, Fix64::from_int(9));
        assert_eq!(hit.normal, Vec3Fix::UNIT_Y);
    }

    #[test]
    fn test_ray_sphere_miss_and_range() {
        assert!(ray_sphere(Vec3Fix::from_int(5, 10, 0), down(), Fix64::ONE, Fix64::from_int(100)).is_none());
        assert!(ray_sphere(Vec3Fix::from_int(0, 10, 0), down(), Fix64::ONE, Fix64::from_int(5)).is_none());
        assert!(ray_sphere(Vec3Fix::from_int(0, 10, 0), Vec3Fix::UNIT_Y, Fix64::ONE, Fix64::from_int(100)).is_none());
    }

    #[test]
    fn test_ray_sphere_inside() {
        let hit = ray_sphere(Vec3Fix::ZERO, Vec3Fix::UNIT_X, Fix64::ONE, Fix64::ONE).expect("inside");
        assert!(hit.distance.is_zero());
    }

    #[test]
    fn test_ray_box() {
        let half = Vec3Fix::from_int(1, 2, 1);
        let hit = ray_box(Vec3Fix::from_int(-5, 0, 0), Vec3Fix::UNIT_X, half, Fix64::from_int(10))
            .expect("should hit -X face");
        assert_eq!(hit.distance, Fix64::from_int(4));
        assert_eq!(hit.normal, -Vec3Fix::UNIT_X);

        let top = ray_box(Vec3Fix::from_int(0, 7, 0), down(), half, Fix64::from_int(10)).expect("top");
        assert_eq!(top.distance, Fix64::from_int(5));
        assert_eq!(top.normal, Vec3Fix::UNIT_Y);

        assert!(ray_box(Vec3Fix::from_int(-5, 3, 0), Vec3Fix::UNIT_X, half, Fix64::from_int(10)).is_none());
    }

    #[test]
    fn test_ray_triangle_hit_and_miss() {
        let tri = Triangle::new(
            Vec3Fix::from_int(-1, 0, -1),
            Vec3Fix::from_int(0, 0, 1),
            Vec3Fix::from_int(1, 0, -1),
        );
        let hit = ray_triangle(Vec3Fix::from_int(0, 5, 0), down(), &tri, Fix64::from_int(100)).expect("hit");
        assert_eq!(hit.distance, Fix64::from_int(5));
        assert_eq!(hit.normal, Vec3Fix::UNIT_Y, "Normal faces the ray");

        assert!(ray_triangle(Vec3Fix::from_int(5, 5, 0), down(), &tri, Fix64::from_int(100)).is_none());
    }
}
