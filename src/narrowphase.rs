//! Narrow Phase
//!
//! Exact contact generation for broad-phase candidates, persistent
//! manifolds, and the touching state machine behind collision events.
//!
//! # Features
//!
//! - **Analytic pairs**: sphere-sphere, sphere-box, sphere-capsule,
//!   capsule-capsule, box-box (SAT + clipping)
//! - **Generic convex**: GJK distance with an EPA fallback
//! - **Compounds**: recurse per child
//! - **Meshes and height fields**: per triangle, back-facing contacts dropped
//! - **Speculative contacts** within the configured margin
//!
//! All contact normals point from body A (lower slot) to body B.

use std::collections::{BTreeMap, BTreeSet};

use crate::body::{BodyHandle, BodySet, RigidBody};
use crate::box_collider::{box_box, sphere_box, OrientedBox};
use crate::broadphase::BroadPair;
use crate::collider::{Contact, TriangleSupport};
use crate::contact_cache::ContactManifold;
use crate::event::{CollisionEvent, CollisionEventKind, EndReason, EventDispatcher};
use crate::filter::CollisionRule;
use crate::fixed::Fix64;
use crate::gjk::convex_contact;
use crate::math::{Transform, Vec3Fix};
use crate::shape::{ConvexShape, Shape, WorldConvex};
use crate::trimesh::Triangle;

// ============================================================================
// Geometry Helpers
// ============================================================================

/// Closest point to `p` on segment `a`-`b`
pub fn closest_point_on_segment(p: Vec3Fix, a: Vec3Fix, b: Vec3Fix) -> Vec3Fix {
    let ab = b - a;
    let denom = ab.length_squared();
    if denom.is_zero() {
        return a;
    }
    let t = ((p - a).dot(ab) / denom).clamp(Fix64::ZERO, Fix64::ONE);
    a + ab * t
}

/// Closest points between segments `p1`-`q1` and `p2`-`q2`
///
/// Parallel segments resolve to the first segment's start.
pub fn closest_points_segments(p1: Vec3Fix, q1: Vec3Fix, p2: Vec3Fix, q2: Vec3Fix) -> (Vec3Fix, Vec3Fix) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);
    let unit = |x: Fix64| x.clamp(Fix64::ZERO, Fix64::ONE);

    if a.is_zero() && e.is_zero() {
        return (p1, p2);
    }
    let (s, t) = if a.is_zero() {
        (Fix64::ZERO, unit(f / e))
    } else {
        let c = d1.dot(r);
        if e.is_zero() {
            (unit(-c / a), Fix64::ZERO)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let s = if denom > Fix64::ZERO {
                unit((b * f - c * e) / denom)
            } else {
                Fix64::ZERO
            };
            let t = (b * s + f) / e;
            if t < Fix64::ZERO {
                (unit(-c / a), Fix64::ZERO)
            } else if t > Fix64::ONE {
                (unit((b - c) / a), Fix64::ONE)
            } else {
                (s, t)
            }
        }
    };
    (p1 + d1 * s, p2 + d2 * t)
}

/// Contact between two spheres, or `None` beyond `margin`
pub fn sphere_sphere(ca: Vec3Fix, ra: Fix64, cb: Vec3Fix, rb: Fix64, margin: Fix64) -> Option<Contact> {
    let (mut normal, dist) = (cb - ca).normalize_with_length();
    let separation = dist - ra - rb;
    if separation > margin {
        return None;
    }
    if normal.is_zero() {
        normal = Vec3Fix::UNIT_Y;
    }
    let pa = ca + normal * ra;
    let pb = cb - normal * rb;
    Some(Contact::new((pa + pb) * Fix64::HALF, normal, -separation))
}

/// Sphere against a single triangle (normal from the sphere to the triangle)
pub fn sphere_triangle(center: Vec3Fix, radius: Fix64, tri: &Triangle, margin: Fix64) -> Option<Contact> {
    let closest = tri.closest_point(center);
    let (mut normal, dist) = (closest - center).normalize_with_length();
    let separation = dist - radius;
    if separation > margin {
        return None;
    }
    if normal.is_zero() {
        normal = -tri.unit_normal();
    }
    let pa = center + normal * radius;
    Some(Contact::new((pa + closest) * Fix64::HALF, normal, -separation))
}

fn capsule_segment(half_length: Fix64, t: &Transform) -> (Vec3Fix, Vec3Fix) {
    let tip = Vec3Fix::new(Fix64::ZERO, half_length, Fix64::ZERO);
    (t.transform_point(-tip), t.transform_point(tip))
}

// ============================================================================
// Contact Generation
// ============================================================================

/// Contacts between two convex shapes, appended to `out`
///
/// Returns `true` when the generator reports a single point per step, so
/// the manifold should keep previous points that are still valid.
pub fn collide_convex(
    a: &ConvexShape,
    ta: &Transform,
    b: &ConvexShape,
    tb: &Transform,
    margin: Fix64,
    out: &mut Vec<Contact>,
) -> bool {
    use ConvexShape as C;
    match (a, b) {
        (C::Sphere { radius: ra }, C::Sphere { radius: rb }) => {
            out.extend(sphere_sphere(ta.position, *ra, tb.position, *rb, margin));
            false
        }
        (C::Sphere { radius }, C::Box { half_extents }) => {
            let obb = OrientedBox::from_transform(*half_extents, tb);
            out.extend(sphere_box(ta.position, *radius, &obb, margin));
            false
        }
        (C::Box { half_extents }, C::Sphere { radius }) => {
            let obb = OrientedBox::from_transform(*half_extents, ta);
            out.extend(sphere_box(tb.position, *radius, &obb, margin).map(Contact::flipped));
            false
        }
        (C::Sphere { radius }, C::Capsule { radius: rc, half_length }) => {
            let (p, q) = capsule_segment(*half_length, tb);
            let on_axis = closest_point_on_segment(ta.position, p, q);
            out.extend(sphere_sphere(ta.position, *radius, on_axis, *rc, margin));
            false
        }
        (C::Capsule { radius: rc, half_length }, C::Sphere { radius }) => {
            let (p, q) = capsule_segment(*half_length, ta);
            let on_axis = closest_point_on_segment(tb.position, p, q);
            out.extend(sphere_sphere(on_axis, *rc, tb.position, *radius, margin));
            false
        }
        (
            C::Capsule {
                radius: ra,
                half_length: la,
            },
            C::Capsule {
                radius: rb,
                half_length: lb,
            },
        ) => {
            let (pa, qa) = capsule_segment(*la, ta);
            let (pb, qb) = capsule_segment(*lb, tb);
            let (ca, cb) = closest_points_segments(pa, qa, pb, qb);
            out.extend(sphere_sphere(ca, *ra, cb, *rb, margin));
            true
        }
        (C::Box { half_extents: ha }, C::Box { half_extents: hb }) => {
            let box_a = OrientedBox::from_transform(*ha, ta);
            let box_b = OrientedBox::from_transform(*hb, tb);
            out.extend(box_box(&box_a, &box_b, margin));
            false
        }
        _ => {
            let wa = WorldConvex::new(a, *ta);
            let wb = WorldConvex::new(b, *tb);
            out.extend(convex_contact(&wa, &wb, margin));
            true
        }
    }
}

/// Convex shape against one world-space triangle with outward `face_normal`
fn collide_triangle(
    a: &ConvexShape,
    ta: &Transform,
    tri: &Triangle,
    face_normal: Vec3Fix,
    margin: Fix64,
    out: &mut Vec<Contact>,
) {
    let contact = match a {
        ConvexShape::Sphere { radius } => sphere_triangle(ta.position, *radius, tri, margin),
        _ => convex_contact(&WorldConvex::new(a, *ta), &TriangleSupport(tri.vertices()), margin),
    };
    // Pushing the shape through the back of the face is never a valid contact
    if let Some(c) = contact.filter(|c| c.normal.dot(face_normal) <= Fix64::ZERO) {
        out.push(c);
    }
}

/// Triangles of a static-only shape near a convex shape, in world space
fn nearby_triangles(a: &ConvexShape, ta: &Transform, b: &Shape, tb: &Transform, margin: Fix64) -> Vec<Triangle> {
    let local_box = a.aabb(ta).expanded(margin).transformed(&tb.inverse());
    let to_world = |t: Triangle| {
        let [v0, v1, v2] = t.vertices();
        Triangle::new(tb.transform_point(v0), tb.transform_point(v1), tb.transform_point(v2))
    };
    match b {
        Shape::TriangleMesh(mesh) => mesh
            .triangles_in_aabb(&local_box)
            .into_iter()
            .map(|id| to_world(mesh.triangle(id)))
            .collect(),
        Shape::HeightField(field) => field
            .triangles_in_aabb(&local_box)
            .into_iter()
            .map(|id| to_world(field.triangle(id)))
            .collect(),
        _ => Vec::new(),
    }
}

fn convex_vs_shape(
    a: &ConvexShape,
    ta: &Transform,
    b: &Shape,
    tb: &Transform,
    margin: Fix64,
    out: &mut Vec<Contact>,
) -> bool {
    match b {
        Shape::Convex(sb) => collide_convex(a, ta, sb, tb, margin, out),
        Shape::Compound(compound) => {
            let mut persistent = false;
            for (local, child) in compound.children() {
                persistent |= collide_convex(a, ta, child, &tb.compose(local), margin, out);
            }
            persistent
        }
        Shape::TriangleMesh(_) | Shape::HeightField(_) => {
            for tri in nearby_triangles(a, ta, b, tb, margin) {
                let face_normal = tri.unit_normal();
                collide_triangle(a, ta, &tri, face_normal, margin, out);
            }
            true
        }
    }
}

/// Contacts between two placed shapes, normals from `a` to `b`
///
/// Returns whether the manifold should keep still-valid previous points.
/// Two static-only shapes never produce contacts.
pub fn collide(a: &Shape, ta: &Transform, b: &Shape, tb: &Transform, margin: Fix64, out: &mut Vec<Contact>) -> bool {
    match a {
        Shape::Convex(sa) => convex_vs_shape(sa, ta, b, tb, margin, out),
        Shape::Compound(compound) => {
            let mut persistent = false;
            for (local, child) in compound.children() {
                persistent |= convex_vs_shape(child, &ta.compose(local), b, tb, margin, out);
            }
            persistent
        }
        Shape::TriangleMesh(_) | Shape::HeightField(_) => {
            if b.is_static_only() {
                return false;
            }
            let start = out.len();
            let persistent = collide(b, tb, a, ta, margin, out);
            for c in &mut out[start..] {
                *c = c.flipped();
            }
            persistent
        }
    }
}

// ============================================================================
// Pair State
// ============================================================================

/// A broad-phase pair with its manifold and touching state
#[derive(Clone, Debug)]
pub struct ContactPair {
    body_a: BodyHandle,
    body_b: BodyHandle,
    rule: CollisionRule,
    sensor: bool,
    touching: bool,
    pub(crate) manifold: ContactManifold,
}

impl ContactPair {
    fn new(body_a: BodyHandle, body_b: BodyHandle, rule: CollisionRule) -> Self {
        Self {
            body_a,
            body_b,
            rule,
            sensor: false,
            touching: false,
            manifold: ContactManifold::new(),
        }
    }

    /// Body with the lower slot
    #[inline]
    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    #[inline]
    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    /// Effective collision rule
    #[inline]
    pub fn rule(&self) -> CollisionRule {
        self.rule
    }

    /// Either body is a sensor
    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    /// At least one contact the solver acts on, speculative ones included
    #[inline]
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    #[inline]
    pub fn manifold(&self) -> &ContactManifold {
        &self.manifold
    }

    /// Whether the solver should push the bodies apart
    #[inline]
    pub fn is_solvable(&self) -> bool {
        self.rule.allows_solver() && !self.manifold.is_empty()
    }

    fn event(&self, kind: CollisionEventKind) -> CollisionEvent {
        CollisionEvent {
            body_a: self.body_a,
            body_b: self.body_b,
            kind,
            sensor: self.sensor,
        }
    }

    #[inline]
    fn involves_both(&self, a: BodyHandle, b: BodyHandle) -> bool {
        (self.body_a == a && self.body_b == b) || (self.body_a == b && self.body_b == a)
    }

    fn deepest_contact(&self) -> Option<Contact> {
        self.manifold
            .points()
            .iter()
            .max_by(|x, y| x.depth.cmp(&y.depth))
            .map(|p| p.contact())
    }
}

/// Per-step statistics of the narrow phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NarrowPhaseStats {
    pub pairs: usize,
    pub touching: usize,
    pub contacts: usize,
}

/// Persistent pair map keyed by `(slot a, slot b)`
#[derive(Clone, Debug, Default)]
pub struct NarrowPhase {
    pairs: BTreeMap<(u32, u32), ContactPair>,
    scratch: Vec<Contact>,
}

impl NarrowPhase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh every pair against the current broad-phase candidates.
    ///
    /// Transitions fire through `events` in pair order. Pairs missing from
    /// `broad_pairs` are dropped, ending them if they were touching.
    pub fn update(
        &mut self,
        bodies: &BodySet,
        broad_pairs: &[BroadPair],
        margin: Fix64,
        events: &mut EventDispatcher,
    ) -> NarrowPhaseStats {
        let mut old = std::mem::take(&mut self.pairs);
        let candidates: BTreeMap<(u32, u32), CollisionRule> =
            broad_pairs.iter().map(|p| ((p.a, p.b), p.rule)).collect();
        let keys: BTreeSet<(u32, u32)> = old.keys().chain(candidates.keys()).copied().collect();
        let mut stats = NarrowPhaseStats::default();

        for key in keys {
            let previous = old.remove(&key);
            let current = candidates.get(&key).and_then(|&rule| {
                let ha = bodies.handle_at(key.0)?;
                let hb = bodies.handle_at(key.1)?;
                Some((ha, hb, rule))
            });
            let Some((ha, hb, rule)) = current else {
                if let Some(pair) = previous.filter(|p| p.touching) {
                    events.emit(pair.event(CollisionEventKind::Ended {
                        reason: EndReason::PairLost,
                    }));
                }
                continue;
            };

            let mut pair = match previous {
                Some(p) if p.body_a == ha && p.body_b == hb => p,
                _ => ContactPair::new(ha, hb, rule),
            };
            pair.rule = rule;
            let (Some(ba), Some(bb)) = (bodies.by_index(key.0), bodies.by_index(key.1)) else {
                continue;
            };
            pair.sensor = ba.is_sensor || bb.is_sensor;
            self.refresh(&mut pair, ba, bb, margin);

            let was_touching = pair.touching;
            pair.touching = pair.manifold.is_touching();
            if pair.touching && !was_touching {
                if let Some(contact) = pair.deepest_contact() {
                    events.emit(pair.event(CollisionEventKind::Began { contact }));
                }
            } else if was_touching && !pair.touching {
                events.emit(pair.event(CollisionEventKind::Ended {
                    reason: EndReason::Separated,
                }));
            }

            stats.pairs += 1;
            stats.contacts += pair.manifold.len();
            if pair.touching {
                stats.touching += 1;
            }
            self.pairs.insert(key, pair);
        }
        stats
    }

    fn refresh(&mut self, pair: &mut ContactPair, a: &RigidBody, b: &RigidBody, margin: Fix64) {
        if !pair.rule.allows_narrow_phase() {
            pair.manifold.clear();
            return;
        }
        let (Some(sa), Some(sb)) = (a.shape(), b.shape()) else {
            pair.manifold.clear();
            return;
        };
        let (ta, tb) = (a.transform(), b.transform());
        self.scratch.clear();
        let persistent = collide(sa, &ta, sb, &tb, margin, &mut self.scratch);
        pair.manifold.update(&self.scratch, &ta, &tb, persistent);
    }

    /// Drop every pair involving `slot`, ending touching ones in pair order
    pub fn remove_body(&mut self, slot: u32, events: &mut EventDispatcher) {
        let keys: Vec<(u32, u32)> = self
            .pairs
            .keys()
            .filter(|(a, b)| *a == slot || *b == slot)
            .copied()
            .collect();
        for key in keys {
            if let Some(pair) = self.pairs.remove(&key).filter(|p| p.touching) {
                events.emit(pair.event(CollisionEventKind::Ended {
                    reason: EndReason::BodyRemoved,
                }));
            }
        }
    }

    /// Pairs in `(slot a, slot b)` order
    pub fn pairs(&self) -> impl Iterator<Item = &ContactPair> {
        self.pairs.values()
    }

    pub(crate) fn pairs_with_keys(&self) -> impl Iterator<Item = (&(u32, u32), &ContactPair)> {
        self.pairs.iter()
    }

    pub(crate) fn manifold_mut(&mut self, key: (u32, u32)) -> Option<&mut ContactManifold> {
        self.pairs.get_mut(&key).map(|p| &mut p.manifold)
    }

    /// Pair of two bodies, in either order
    pub fn pair(&self, a: BodyHandle, b: BodyHandle) -> Option<&ContactPair> {
        let key = if a.index() <= b.index() {
            (a.index(), b.index())
        } else {
            (b.index(), a.index())
        };
        self.pairs.get(&key).filter(|p| p.involves_both(a, b))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
