//! Ray Cast, Convex Cast and Overlap Queries
//!
//! Spatial queries for game logic. Candidates come from the broad-phase
//! tree; each candidate is then tested exactly.
//!
//! # Features
//!
//! - `ray_cast`: closest hit along a ray (analytic sphere/box, Möller–Trumbore
//!   triangles, GJK for the remaining convex shapes)
//! - `convex_cast`: sweep a convex shape, time of impact in `[0, 1]`
//! - `query_aabb`: bodies whose bounds overlap a box
//!
//! Candidates are visited in ascending slot order and only a strictly
//! closer hit replaces the current one, so equal distances resolve to the
//! lowest slot.

use crate::body::{BodyHandle, RigidBody};
use crate::collider::{TriangleSupport, AABB};
use crate::fixed::Fix64;
use crate::filter::CollisionGroup;
use crate::gjk::{self, CastHit};
use crate::math::{Transform, Vec3Fix};
use crate::raycast::{ray_box, ray_sphere, Ray, RayHit, ShapeHit};
use crate::shape::{ConvexShape, Shape, WorldConvex};
use crate::space::Space;
use crate::trimesh::Triangle;

// ============================================================================
// Filter
// ============================================================================

/// Which bodies a query may report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryFilter {
    /// Never report this body
    pub exclude: Option<BodyHandle>,
    /// Query as this group; bodies whose rule skips the narrow phase are ignored
    pub group: Option<CollisionGroup>,
    /// Report sensor bodies too
    pub include_sensors: bool,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn excluding(mut self, body: BodyHandle) -> Self {
        self.exclude = Some(body);
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: CollisionGroup) -> Self {
        self.group = Some(group);
        self
    }

    #[must_use]
    pub fn with_sensors(mut self) -> Self {
        self.include_sensors = true;
        self
    }
}

/// Result of a convex cast
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvexHit {
    pub body: BodyHandle,
    /// Fraction of the sweep in `[0, 1]`
    pub toi: Fix64,
    /// Contact point on the hit body
    pub point: Vec3Fix,
    /// Hit body's surface normal, facing the cast shape
    pub normal: Vec3Fix,
}

// ============================================================================
// Exact Tests
// ============================================================================

/// Ray against one convex shape placed by `transform`; world-space normal
fn ray_convex(shape: &ConvexShape, transform: &Transform, ray: &Ray) -> Option<ShapeHit> {
    let origin = transform.inverse_transform_point(ray.origin);
    let dir = transform.inverse_transform_vector(ray.direction);
    let local = match shape {
        ConvexShape::Sphere { radius } => ray_sphere(origin, dir, *radius, ray.max_distance),
        ConvexShape::Box { half_extents } => ray_box(origin, dir, *half_extents, ray.max_distance),
        other => gjk::ray_cast_support(origin, dir, ray.max_distance, other)
            .map(|(distance, normal)| ShapeHit { distance, normal }),
    }?;
    Some(ShapeHit {
        distance: local.distance,
        normal: transform.transform_vector(local.normal),
    })
}

fn ray_shape(shape: &Shape, transform: &Transform, ray: &Ray) -> Option<ShapeHit> {
    match shape {
        Shape::Convex(c) => ray_convex(c, transform, ray),
        Shape::Compound(compound) => {
            let mut best: Option<ShapeHit> = None;
            for (child_transform, child) in compound.children() {
                let world = transform.compose(child_transform);
                if let Some(hit) = ray_convex(child, &world, ray) {
                    if best.map_or(true, |b| hit.distance < b.distance) {
                        best = Some(hit);
                    }
                }
            }
            best
        }
        Shape::TriangleMesh(mesh) => {
            let origin = transform.inverse_transform_point(ray.origin);
            let dir = transform.inverse_transform_vector(ray.direction);
            mesh.ray_cast(origin, dir, ray.max_distance).map(|h| ShapeHit {
                distance: h.distance,
                normal: transform.transform_vector(h.normal),
            })
        }
        Shape::HeightField(field) => {
            let origin = transform.inverse_transform_point(ray.origin);
            let dir = transform.inverse_transform_vector(ray.direction);
            field.ray_cast(origin, dir, ray.max_distance).map(|h| ShapeHit {
                distance: h.distance,
                normal: transform.transform_vector(h.normal),
            })
        }
    }
}

fn world_triangle(tri: &Triangle, transform: &Transform) -> TriangleSupport {
    let [a, b, c] = tri.vertices();
    TriangleSupport([
        transform.transform_point(a),
        transform.transform_point(b),
        transform.transform_point(c),
    ])
}

fn earlier(best: Option<CastHit>, hit: CastHit) -> Option<CastHit> {
    match best {
        Some(b) if b.toi <= hit.toi => Some(b),
        _ => Some(hit),
    }
}

/// Sweep `moving` against one shape; `bounds` is the world box of the sweep
fn cast_shape(moving: &WorldConvex<'_>, sweep: Vec3Fix, bounds: &AABB, shape: &Shape, transform: &Transform) -> Option<CastHit> {
    match shape {
        Shape::Convex(c) => gjk::convex_cast(moving, sweep, &WorldConvex::new(c, *transform)),
        Shape::Compound(compound) => {
            let mut best = None;
            for (child_transform, child) in compound.children() {
                let target = WorldConvex::new(child, transform.compose(child_transform));
                if let Some(hit) = gjk::convex_cast(moving, sweep, &target) {
                    best = earlier(best, hit);
                }
            }
            best
        }
        Shape::TriangleMesh(mesh) => {
            let local_bounds = bounds.transformed(&transform.inverse());
            let mut best = None;
            for id in mesh.triangles_in_aabb(&local_bounds) {
                let tri = world_triangle(&mesh.triangle(id), transform);
                if let Some(hit) = gjk::convex_cast(moving, sweep, &tri) {
                    best = earlier(best, hit);
                }
            }
            best
        }
        Shape::HeightField(field) => {
            let local_bounds = bounds.transformed(&transform.inverse());
            let mut best = None;
            for id in field.triangles_in_aabb(&local_bounds) {
                let tri = world_triangle(&field.triangle(id), transform);
                if let Some(hit) = gjk::convex_cast(moving, sweep, &tri) {
                    best = earlier(best, hit);
                }
            }
            best
        }
    }
}

// ============================================================================
// Space Queries
// ============================================================================

impl Space {
    /// Filtered candidate bodies (with shapes) in slot order
    fn query_candidates<'a>(
        &'a self,
        slots: Vec<u32>,
        filter: &'a QueryFilter,
    ) -> impl Iterator<Item = (BodyHandle, &'a RigidBody, &'a Shape)> + 'a {
        slots.into_iter().filter_map(move |slot| {
            let handle = self.bodies.handle_at(slot)?;
            let body = self.bodies.get(handle)?;
            let shape = body.shape()?;
            if filter.exclude == Some(handle) {
                return None;
            }
            if body.is_sensor && !filter.include_sensors {
                return None;
            }
            if let Some(group) = filter.group {
                if !self.config.collision_rules.rule(group, body.group).allows_narrow_phase() {
                    return None;
                }
            }
            Some((handle, body, shape))
        })
    }

    /// Closest body hit by `ray`
    pub fn ray_cast(&self, ray: &Ray, filter: &QueryFilter) -> Option<RayHit> {
        let slots = self.broad_phase.ray_query(ray.origin, ray.direction, ray.max_distance);
        let mut best: Option<RayHit> = None;
        for (handle, body, shape) in self.query_candidates(slots, filter) {
            let Some(hit) = ray_shape(shape, &body.transform(), ray) else {
                continue;
            };
            if best.map_or(true, |b| hit.distance < b.distance) {
                best = Some(RayHit {
                    body: handle,
                    distance: hit.distance,
                    point: ray.at(hit.distance),
                    normal: hit.normal,
                });
            }
        }
        best
    }

    /// Sweep `shape` from `start` by `sweep`; first body touched
    pub fn convex_cast(&self, shape: &ConvexShape, start: &Transform, sweep: Vec3Fix, filter: &QueryFilter) -> Option<ConvexHit> {
        let bounds = shape.aabb(start).swept(sweep);
        let moving = WorldConvex::new(shape, *start);
        let slots = self.broad_phase.query(&bounds);
        let mut best: Option<ConvexHit> = None;
        for (handle, body, target) in self.query_candidates(slots, filter) {
            let Some(hit) = cast_shape(&moving, sweep, &bounds, target, &body.transform()) else {
                continue;
            };
            if best.map_or(true, |b| hit.toi < b.toi) {
                best = Some(ConvexHit {
                    body: handle,
                    toi: hit.toi,
                    point: hit.point,
                    normal: hit.normal,
                });
            }
        }
        best
    }

    /// Bodies whose tight bounds overlap `aabb`, in slot order
    pub fn query_aabb(&self, aabb: &AABB, filter: &QueryFilter) -> Vec<BodyHandle> {
        let slots = self.broad_phase.query(aabb);
        self.query_candidates(slots, filter)
            .filter(|(_, body, shape)| shape.aabb(&body.transform()).intersects(aabb))
            .map(|(handle, _, _)| handle)
            .collect()
    }
}
