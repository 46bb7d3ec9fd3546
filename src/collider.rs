//! Collision Primitives
//!
//! Axis-aligned bounding boxes, the support-mapping trait used by GJK/EPA,
//! and the contact record produced by every narrow-phase routine.
//!
//! # Conventions
//!
//! - Contact normals point from body A to body B
//! - Depth is signed: positive means penetrating, negative means separated
//!   (speculative contact)

use serde::{Deserialize, Serialize};

use crate::fixed::Fix64;
use crate::math::{Transform, Vec3Fix};

// ============================================================================
// Support Mapping
// ============================================================================

/// Support function trait for GJK
pub trait Support {
    /// Returns the point on the shape furthest in the given direction
    fn support(&self, direction: Vec3Fix) -> Vec3Fix;

    /// A point strictly inside the shape (GJK seed direction)
    fn center(&self) -> Vec3Fix {
        Vec3Fix::ZERO
    }
}

/// Single point (ray casts are GJK against a point)
#[derive(Clone, Copy, Debug)]
pub struct PointSupport(pub Vec3Fix);

impl Support for PointSupport {
    #[inline]
    fn support(&self, _direction: Vec3Fix) -> Vec3Fix {
        self.0
    }

    #[inline]
    fn center(&self) -> Vec3Fix {
        self.0
    }
}

/// Triangle support (mesh and height-field narrow phase)
#[derive(Clone, Copy, Debug)]
pub struct TriangleSupport(pub [Vec3Fix; 3]);

impl TriangleSupport {
    /// Unnormalized face normal (counter-clockwise winding)
    #[inline]
    pub fn normal(&self) -> Vec3Fix {
        let [a, b, c] = self.0;
        (b - a).cross(c - a)
    }
}

impl Support for TriangleSupport {
    fn support(&self, direction: Vec3Fix) -> Vec3Fix {
        let mut best = self.0[0];
        let mut best_dot = best.dot(direction);
        for &v in &self.0[1..] {
            let d = v.dot(direction);
            if d > best_dot {
                best = v;
                best_dot = d;
            }
        }
        best
    }

    fn center(&self) -> Vec3Fix {
        let s = self.0[0] + self.0[1] + self.0[2];
        Vec3Fix::new(s.x.div_int(3), s.y.div_int(3), s.z.div_int(3))
    }
}

/// A support mapping translated by a fixed offset (convex cast sweeps)
#[derive(Clone, Copy, Debug)]
pub struct Translated<'a, S: ?Sized> {
    /// Inner shape
    pub shape: &'a S,
    /// World offset
    pub offset: Vec3Fix,
}

impl<S: Support + ?Sized> Support for Translated<'_, S> {
    #[inline]
    fn support(&self, direction: Vec3Fix) -> Vec3Fix {
        self.shape.support(direction) + self.offset
    }

    #[inline]
    fn center(&self) -> Vec3Fix {
        self.shape.center() + self.offset
    }
}

// ============================================================================
// Axis-Aligned Bounding Box
// ============================================================================

/// Axis-Aligned Bounding Box
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AABB {
    /// Minimum corner
    pub min: Vec3Fix,
    /// Maximum corner
    pub max: Vec3Fix,
}

impl AABB {
    /// Create a new AABB from min and max corners
    #[inline]
    pub const fn new(min: Vec3Fix, max: Vec3Fix) -> Self {
        Self { min, max }
    }

    /// Create AABB from center and half-extents
    #[inline]
    pub fn from_center_half(center: Vec3Fix, half: Vec3Fix) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Tight box around a point set (`None` when empty)
    pub fn from_points(points: &[Vec3Fix]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = Self::new(*first, *first);
        for &p in rest {
            aabb.min = aabb.min.min(p);
            aabb.max = aabb.max.max(p);
        }
        Some(aabb)
    }

    /// World box of a local box under a rigid transform (conservative)
    pub fn transformed(&self, transform: &Transform) -> Self {
        let center = transform.transform_point(self.center());
        let rot = transform.orientation.to_mat3().abs();
        let half = rot.mul_vec(self.half_extents());
        Self::from_center_half(center, half)
    }

    /// Check if two AABBs intersect (touching counts)
    #[inline]
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// `true` if `other` lies entirely inside `self`
    #[inline]
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// `true` if the point lies inside or on the boundary
    #[inline]
    pub fn contains_point(&self, p: Vec3Fix) -> bool {
        p.x >= self.min.x
            && p.y >= self.min.y
            && p.z >= self.min.z
            && p.x <= self.max.x
            && p.y <= self.max.y
            && p.z <= self.max.z
    }

    /// Compute union of two AABBs
    #[inline]
    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grow by `margin` on every side
    #[inline]
    pub fn expanded(&self, margin: Fix64) -> AABB {
        let m = Vec3Fix::splat(margin);
        AABB {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Extend toward `displacement` so the box covers its motion
    #[inline]
    pub fn swept(&self, displacement: Vec3Fix) -> AABB {
        self.union(&AABB {
            min: self.min + displacement,
            max: self.max + displacement,
        })
    }

    /// Center point
    #[inline]
    pub fn center(&self) -> Vec3Fix {
        Vec3Fix::new(
            (self.min.x + self.max.x).half(),
            (self.min.y + self.max.y).half(),
            (self.min.z + self.max.z).half(),
        )
    }

    /// Half extents
    #[inline]
    pub fn half_extents(&self) -> Vec3Fix {
        let d = self.max - self.min;
        Vec3Fix::new(d.x.half(), d.y.half(), d.z.half())
    }

    /// Surface area (for BVH heuristics)
    pub fn surface_area(&self) -> Fix64 {
        let d = self.max - self.min;
        (d.x * d.y + d.y * d.z + d.z * d.x).double()
    }

    /// Slab test: entry distance along `dir` within `[0, max_t]`
    ///
    /// Returns `Some(0)` when the origin starts inside.
    pub fn ray_intersect(&self, origin: Vec3Fix, dir: Vec3Fix, max_t: Fix64) -> Option<Fix64> {
        let mut t_min = Fix64::ZERO;
        let mut t_max = max_t;
        for axis in 0..3 {
            let o = origin.axis(axis);
            let d = dir.axis(axis);
            let lo = self.min.axis(axis);
            let hi = self.max.axis(axis);
            if d.is_zero() {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let t1 = (lo - o) / d;
            let t2 = (hi - o) / d;
            let (near, far) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            t_min = t_min.max(near);
            t_max = t_max.min(far);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

impl Support for AABB {
    #[inline]
    fn support(&self, direction: Vec3Fix) -> Vec3Fix {
        Vec3Fix::new(
            if direction.x >= Fix64::ZERO {
                self.max.x
            } else {
                self.min.x
            },
            if direction.y >= Fix64::ZERO {
                self.max.y
            } else {
                self.min.y
            },
            if direction.z >= Fix64::ZERO {
                self.max.z
            } else {
                self.min.z
            },
        )
    }

    #[inline]
    fn center(&self) -> Vec3Fix {
        AABB::center(self)
    }
}

// ============================================================================
// Contact
// ============================================================================

/// A single contact between two shapes, in world space
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contact {
    /// Contact point (midway between the surfaces)
    pub point: Vec3Fix,
    /// Unit normal pointing from A to B
    pub normal: Vec3Fix,
    /// Signed depth: `> 0` penetrating, `< 0` separated
    pub depth: Fix64,
}

impl Contact {
    /// Create a new contact
    #[inline]
    pub const fn new(point: Vec3Fix, normal: Vec3Fix, depth: Fix64) -> Self {
        Self {
            point,
            normal,
            depth,
        }
    }

    /// Same contact seen from the other body
    #[inline]
    pub fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }

    /// Surface point on A
    #[inline]
    pub fn point_on_a(&self) -> Vec3Fix {
        self.point + self.normal * self.depth.half()
    }

    /// Surface point on B
    #[inline]
    pub fn point_on_b(&self) -> Vec3Fix {
        self.point - self.normal * self.depth.half()
    }
}
