//! Oriented Box Collision
//!
//! Analytic contact generation for boxes.
//!
//! # Features
//!
//! - **OBB**: box with centre, half-extents and rotation, usable with GJK
//! - **Box vs box**: separating axis test over the 15 candidate axes, then
//!   Sutherland–Hodgman clipping of the incident face against the reference
//!   face (up to 8 points, reduced later by the manifold)
//! - **Sphere vs box**: closest point on the box, with a face fallback when
//!   the centre is inside
//!
//! Face axes win ties against edge axes unless an edge separates by more
//! than [`EDGE_AXIS_BIAS`], so resting boxes keep a stable face manifold.

use crate::collider::{Contact, Support, AABB};
use crate::fixed::Fix64;
use crate::math::{Mat3Fix, QuatFix, Transform, Vec3Fix};

/// An edge axis must beat the best face axis by this much to be chosen
pub const EDGE_AXIS_BIAS: Fix64 = Fix64::from_ratio(1, 200);

/// Cross products shorter than this (squared) are treated as parallel edges
const PARALLEL_EDGE_SQ: Fix64 = Fix64::from_ratio(1, 1_000_000);

/// Oriented Bounding Box (OBB) collider
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrientedBox {
    /// Centre in world space
    pub center: Vec3Fix,
    /// Half-size on each local axis
    pub half_extents: Vec3Fix,
    /// Orientation
    pub rotation: QuatFix,
}

impl OrientedBox {
    #[inline]
    pub fn new(center: Vec3Fix, half_extents: Vec3Fix, rotation: QuatFix) -> Self {
        Self {
            center,
            half_extents,
            rotation,
        }
    }

    /// Box with no rotation
    #[inline]
    pub fn axis_aligned(center: Vec3Fix, half_extents: Vec3Fix) -> Self {
        Self::new(center, half_extents, QuatFix::IDENTITY)
    }

    /// Box placed by a body transform
    #[inline]
    pub fn from_transform(half_extents: Vec3Fix, transform: &Transform) -> Self {
        Self::new(transform.position, half_extents, transform.orientation)
    }

    /// World-space unit axes
    #[inline]
    pub fn axes(&self) -> [Vec3Fix; 3] {
        let m = Mat3Fix::from_quat(self.rotation);
        [m.col0, m.col1, m.col2]
    }

    /// Corner by index (bit 0 → x, bit 1 → y, bit 2 → z; set bit is negative)
    pub fn corner(&self, index: usize) -> Vec3Fix {
        let h = self.half_extents;
        let pick = |bit: usize, v: Fix64| if index & bit == 0 { v } else { -v };
        let local = Vec3Fix::new(pick(1, h.x), pick(2, h.y), pick(4, h.z));
        self.center + self.rotation.rotate_vec(local)
    }

    pub fn corners(&self) -> [Vec3Fix; 8] {
        let mut result = [Vec3Fix::ZERO; 8];
        for (i, item) in result.iter_mut().enumerate() {
            *item = self.corner(i);
        }
        result
    }

    /// World-space AABB enclosing this OBB
    pub fn aabb(&self) -> AABB {
        let m = Mat3Fix::from_quat(self.rotation).abs();
        AABB::from_center_half(self.center, m.mul_vec(self.half_extents))
    }

    /// Half-width of the box projected on a unit axis
    #[inline]
    fn projected_radius(&self, axes: &[Vec3Fix; 3], axis: Vec3Fix) -> Fix64 {
        self.half_extents.x * axes[0].dot(axis).abs()
            + self.half_extents.y * axes[1].dot(axis).abs()
            + self.half_extents.z * axes[2].dot(axis).abs()
    }
}

impl Support for OrientedBox {
    fn support(&self, direction: Vec3Fix) -> Vec3Fix {
        let local_dir = self.rotation.inverse_rotate_vec(direction);
        let h = self.half_extents;
        let pick = |d: Fix64, v: Fix64| if d >= Fix64::ZERO { v } else { -v };
        let local = Vec3Fix::new(pick(local_dir.x, h.x), pick(local_dir.y, h.y), pick(local_dir.z, h.z));
        self.center + self.rotation.rotate_vec(local)
    }

    fn center(&self) -> Vec3Fix {
        self.center
    }
}

// ============================================================================
// Sphere vs Box
// ============================================================================

/// Contact between a sphere (A) and a box (B).
///
/// Returns `None` when the surfaces are further apart than `margin`.
pub fn sphere_box(center: Vec3Fix, radius: Fix64, b: &OrientedBox, margin: Fix64) -> Option<Contact> {
    let local = b.rotation.inverse_rotate_vec(center - b.center);
    let h = b.half_extents;
    let clamped = local.max(-h).min(h);

    // `outward` points from the box surface towards the sphere centre
    let (surface, outward, distance) = if clamped != local {
        let (dir, dist) = (local - clamped).normalize_with_length();
        (clamped, dir, dist)
    } else {
        // Centre inside: push out through the nearest face
        let mut best_axis = 0;
        let mut best_gap = h.x - local.x.abs();
        for axis in 1..3 {
            let gap = h.axis(axis) - local.axis(axis).abs();
            if gap < best_gap {
                best_gap = gap;
                best_axis = axis;
            }
        }
        let sign = if local.axis(best_axis).is_negative() {
            Fix64::NEG_ONE
        } else {
            Fix64::ONE
        };
        let mut dir = Vec3Fix::ZERO;
        let mut surface = local;
        match best_axis {
            0 => {
                dir.x = sign;
                surface.x = h.x * sign;
            }
            1 => {
                dir.y = sign;
                surface.y = h.y * sign;
            }
            _ => {
                dir.z = sign;
                surface.z = h.z * sign;
            }
        }
        (surface, dir, -best_gap)
    };

    let depth = radius - distance;
    if depth < -margin {
        return None;
    }
    let outward = b.rotation.rotate_vec(outward);
    let on_box = b.center + b.rotation.rotate_vec(surface);
    let on_sphere = center - outward * radius;
    Some(Contact::new((on_box + on_sphere) * Fix64::HALF, -outward, depth))
}

// ============================================================================
// Box vs Box (SAT + clipping)
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    FaceA(usize),
    FaceB(usize),
    Edge(usize, usize),
}

/// Contacts between two boxes, normal from A to B.
///
/// Returns an empty list when a separating axis leaves more than `margin`
/// between the boxes. Face contacts yield up to 8 points, edge contacts one.
pub fn box_box(a: &OrientedBox, b: &OrientedBox, margin: Fix64) -> Vec<Contact> {
    let axes_a = a.axes();
    let axes_b = b.axes();
    let d = b.center - a.center;

    let separation = |axis: Vec3Fix| -> Fix64 {
        d.dot(axis).abs() - a.projected_radius(&axes_a, axis) - b.projected_radius(&axes_b, axis)
    };

    let mut best_face = Axis::FaceA(0);
    let mut best_face_sep = Fix64::MIN;
    for (i, &axis) in axes_a.iter().enumerate() {
        let sep = separation(axis);
        if sep > margin {
            return Vec::new();
        }
        if sep > best_face_sep {
            best_face_sep = sep;
            best_face = Axis::FaceA(i);
        }
    }
    for (j, &axis) in axes_b.iter().enumerate() {
        let sep = separation(axis);
        if sep > margin {
            return Vec::new();
        }
        if sep > best_face_sep {
            best_face_sep = sep;
            best_face = Axis::FaceB(j);
        }
    }

    let mut best_edge: Option<(Axis, Vec3Fix, Fix64)> = None;
    for (i, &ea) in axes_a.iter().enumerate() {
        for (j, &eb) in axes_b.iter().enumerate() {
            let cross = ea.cross(eb);
            if cross.length_squared() < PARALLEL_EDGE_SQ {
                continue;
            }
            let axis = cross.normalize();
            let sep = separation(axis);
            if sep > margin {
                return Vec::new();
            }
            if best_edge.map_or(true, |(_, _, s)| sep > s) {
                best_edge = Some((Axis::Edge(i, j), axis, sep));
            }
        }
    }

    match best_edge {
        Some((Axis::Edge(i, j), axis, sep)) if sep > best_face_sep + EDGE_AXIS_BIAS => {
            let normal = if axis.dot(d).is_negative() { -axis } else { axis };
            edge_contact(a, &axes_a, i, b, &axes_b, j, normal, sep)
                .into_iter()
                .collect()
        }
        _ => match best_face {
            Axis::FaceA(i) => {
                let n = if axes_a[i].dot(d).is_negative() {
                    -axes_a[i]
                } else {
                    axes_a[i]
                };
                face_contacts(a, &axes_a, i, n, b, &axes_b, margin)
            }
            Axis::FaceB(j) => {
                // Reference face on B: solve with roles swapped, then flip back
                let n = if axes_b[j].dot(d).is_negative() {
                    axes_b[j]
                } else {
                    -axes_b[j]
                };
                face_contacts(b, &axes_b, j, n, a, &axes_a, margin)
                    .into_iter()
                    .map(Contact::flipped)
                    .collect()
            }
            Axis::Edge(..) => Vec::new(),
        },
    }
}

/// Clip the incident face of `inc` against the reference face `ref_axis`
/// of `reference`. `normal` points from `reference` towards `inc`.
fn face_contacts(
    reference: &OrientedBox,
    ref_axes: &[Vec3Fix; 3],
    ref_axis: usize,
    normal: Vec3Fix,
    inc: &OrientedBox,
    inc_axes: &[Vec3Fix; 3],
    margin: Fix64,
) -> Vec<Contact> {
    // Incident face: the face of `inc` most anti-parallel to the normal
    let mut inc_axis = 0;
    let mut best = inc_axes[0].dot(normal).abs();
    for (k, axis) in inc_axes.iter().enumerate().skip(1) {
        let v = axis.dot(normal).abs();
        if v > best {
            best = v;
            inc_axis = k;
        }
    }
    let inc_normal = if inc_axes[inc_axis].dot(normal).is_negative() {
        inc_axes[inc_axis]
    } else {
        -inc_axes[inc_axis]
    };
    let inc_center = inc.center + inc_normal * inc.half_extents.axis(inc_axis);
    let (u, v) = ((inc_axis + 1) % 3, (inc_axis + 2) % 3);
    let eu = inc_axes[u] * inc.half_extents.axis(u);
    let ev = inc_axes[v] * inc.half_extents.axis(v);
    let mut polygon = vec![
        inc_center + eu + ev,
        inc_center - eu + ev,
        inc_center - eu - ev,
        inc_center + eu - ev,
    ];

    // Side planes of the reference face
    for side in [(ref_axis + 1) % 3, (ref_axis + 2) % 3] {
        let axis = ref_axes[side];
        let extent = reference.half_extents.axis(side);
        let offset = reference.center.dot(axis);
        polygon = clip_polygon(&polygon, axis, offset + extent);
        polygon = clip_polygon(&polygon, -axis, extent - offset);
        if polygon.is_empty() {
            return Vec::new();
        }
    }

    let face_offset = reference.center.dot(normal) + reference.half_extents.axis(ref_axis);
    polygon
        .into_iter()
        .filter_map(|p| {
            let depth = face_offset - p.dot(normal);
            (depth >= -margin).then(|| Contact::new(p + normal * depth.half(), normal, depth))
        })
        .collect()
}

/// Keep the part of `polygon` with `p · normal <= offset`
fn clip_polygon(polygon: &[Vec3Fix], normal: Vec3Fix, offset: Fix64) -> Vec<Vec3Fix> {
    let mut out = Vec::with_capacity(polygon.len() + 1);
    for (i, &a) in polygon.iter().enumerate() {
        let b = polygon[(i + 1) % polygon.len()];
        let da = a.dot(normal) - offset;
        let db = b.dot(normal) - offset;
        if da <= Fix64::ZERO {
            out.push(a);
        }
        if (da < Fix64::ZERO && db > Fix64::ZERO) || (da > Fix64::ZERO && db < Fix64::ZERO) {
            let t = da / (da - db);
            out.push(a + (b - a) * t);
        }
    }
    out
}

/// Closest points between the two supporting edges of an edge–edge axis
#[allow(clippy::too_many_arguments)]
fn edge_contact(
    a: &OrientedBox,
    axes_a: &[Vec3Fix; 3],
    edge_a: usize,
    b: &OrientedBox,
    axes_b: &[Vec3Fix; 3],
    edge_b: usize,
    normal: Vec3Fix,
    separation: Fix64,
) -> Option<Contact> {
    let mut pa = a.center;
    for (k, &axis) in axes_a.iter().enumerate() {
        if k != edge_a {
            let h = a.half_extents.axis(k);
            pa += if axis.dot(normal).is_negative() { -axis * h } else { axis * h };
        }
    }
    let mut pb = b.center;
    for (k, &axis) in axes_b.iter().enumerate() {
        if k != edge_b {
            let h = b.half_extents.axis(k);
            pb += if axis.dot(normal).is_negative() { axis * h } else { -axis * h };
        }
    }

    let u = axes_a[edge_a];
    let v = axes_b[edge_b];
    let r = pa - pb;
    let uv = u.dot(v);
    let denom = Fix64::ONE - uv * uv;
    if denom <= Fix64::ZERO {
        return None;
    }
    let du = u.dot(r);
    let dv = v.dot(r);
    let ha = a.half_extents.axis(edge_a);
    let hb = b.half_extents.axis(edge_b);
    let s = ((uv * dv - du) / denom).clamp(-ha, ha);
    let t = (dv + s * uv).clamp(-hb, hb);
    let on_a = pa + u * s;
    let on_b = pb + v * t;
    Some(Contact::new((on_a + on_b) * Fix64::HALF, normal, -separation))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(center: Vec3Fix) -> OrientedBox {
        OrientedBox::axis_aligned(center, Vec3Fix::ONE)
    }

    #[test]
    fn test_support_exact_half_extent() {
        let b = OrientedBox::axis_aligned(Vec3Fix::ZERO, Vec3Fix::from_int(2, 3, 4));
        let s = b.support(Vec3Fix::UNIT_X);
        assert_eq!(s.x, Fix64::from_int(2), "support along +X must be exactly hx");
        assert_eq!(b.support(-Vec3Fix::UNIT_X).x, Fix64::from_int(-2));
    }

    #[test]
    fn test_box_aabb_rotated() {
        let rot = QuatFix::from_axis_angle(Vec3Fix::UNIT_Y, Fix64::QUARTER_PI);
        let b = OrientedBox::new(Vec3Fix::ZERO, Vec3Fix::ONE, rot);
        let aabb = b.aabb();
        // sqrt(2) on X and Z, unchanged on Y
        let sqrt2 = Fix64::TWO.sqrt_sat();
        assert!((aabb.max.x - sqrt2).abs() < Fix64::from_ratio(1, 1000), "x extent {}", aabb.max.x);
        assert!((aabb.max.y - Fix64::ONE).abs() < Fix64::from_ratio(1, 1000));
    }

    #[test]
    fn test_box_corners_distance() {
        let corners = unit_box(Vec3Fix::ZERO).corners();
        for c in &corners {
            assert_eq!(c.length_squared(), Fix64::from_int(3), "corner {c:?}");
        }
    }

    #[test]
    fn test_sphere_box_outside_face() {
        let b = unit_box(Vec3Fix::ZERO);
        let c = sphere_box(Vec3Fix::from_int(0, 2, 0), Fix64::from_ratio(3, 2), &b, Fix64::ZERO)
            .expect("overlapping");
        assert_eq!(c.depth, Fix64::HALF, "depth");
        assert_eq!(c.normal, -Vec3Fix::UNIT_Y, "normal points from sphere into box");
        assert_eq!(c.point_on_b().y, Fix64::ONE, "box surface point");
    }

    #[test]
    fn test_sphere_box_inside() {
        let b = unit_box(Vec3Fix::ZERO);
        let center = Vec3Fix::new(Fix64::ZERO, Fix64::from_ratio(8, 10), Fix64::ZERO);
        let c = sphere_box(center, Fix64::HALF, &b, Fix64::ZERO).expect("inside");
        // Gap to the +Y face is 0.2, so depth = 0.5 + 0.2
        assert!((c.depth - Fix64::from_ratio(7, 10)).abs() <= Fix64::from_raw(4), "depth {}", c.depth);
        assert_eq!(c.normal, -Vec3Fix::UNIT_Y);
    }

    #[test]
    fn test_sphere_box_speculative() {
        let b = unit_box(Vec3Fix::ZERO);
        let center = Vec3Fix::new(Fix64::ZERO, Fix64::from_ratio(201, 100), Fix64::ZERO);
        let margin = Fix64::from_ratio(2, 100);
        let c = sphere_box(center, Fix64::ONE, &b, margin).expect("within margin");
        assert!(c.depth.is_negative(), "speculative contact has negative depth");
        assert!(sphere_box(center, Fix64::ONE, &b, Fix64::ZERO).is_none());
    }

    #[test]
    fn test_box_box_face_four_points() {
        let ground = OrientedBox::axis_aligned(Vec3Fix::ZERO, Vec3Fix::from_int(5, 1, 5));
        let top_y = Fix64::from_int(2) - Fix64::from_ratio(1, 10);
        let top = unit_box(Vec3Fix::new(Fix64::ZERO, top_y, Fix64::ZERO));
        let contacts = box_box(&ground, &top, Fix64::ZERO);
        assert_eq!(contacts.len(), 4, "resting box yields a face manifold");
        for c in &contacts {
            assert_eq!(c.normal, Vec3Fix::UNIT_Y, "normal from ground to box");
            assert_eq!(c.depth, Fix64::from_ratio(1, 10), "depth");
        }
    }

    #[test]
    fn test_box_box_clips_to_smaller_face() {
        let small = unit_box(Vec3Fix::ZERO);
        let big_y = Fix64::from_int(2) - Fix64::from_ratio(1, 10);
        let big = OrientedBox::axis_aligned(Vec3Fix::new(Fix64::ZERO, big_y, Fix64::ZERO), Vec3Fix::from_int(5, 1, 5));
        let contacts = box_box(&small, &big, Fix64::ZERO);
        assert_eq!(contacts.len(), 4);
        for c in &contacts {
            assert_eq!(c.normal, Vec3Fix::UNIT_Y, "normal from A to B");
            assert!(c.point.x.abs() <= Fix64::ONE && c.point.z.abs() <= Fix64::ONE, "clipped to the small face");
        }
    }

    #[test]
    fn test_box_box_reference_on_b() {
        // A is tilted, so B's bottom face is the best axis
        let tilt = QuatFix::from_axis_angle(Vec3Fix::UNIT_X, Fix64::from_ratio(1, 10));
        let a = OrientedBox::new(Vec3Fix::ZERO, Vec3Fix::ONE, tilt);
        let big_y = Fix64::from_int(2) - Fix64::from_ratio(1, 10);
        let b = OrientedBox::axis_aligned(Vec3Fix::new(Fix64::ZERO, big_y, Fix64::ZERO), Vec3Fix::from_int(5, 1, 5));
        let contacts = box_box(&a, &b, Fix64::ZERO);
        assert_eq!(contacts.len(), 2, "only the raised edge of the tilted face touches");
        for c in &contacts {
            assert_eq!(c.normal, Vec3Fix::UNIT_Y, "normal flipped back to A to B");
            assert!(c.depth > Fix64::from_ratio(15, 100), "depth {}", c.depth);
        }
    }

    #[test]
    fn test_box_box_separated() {
        let a = unit_box(Vec3Fix::ZERO);
        let b = unit_box(Vec3Fix::from_int(3, 0, 0));
        assert!(box_box(&a, &b, Fix64::from_ratio(2, 100)).is_empty());
    }

    #[test]
    fn test_box_box_edge_edge() {
        // Two boxes rotated 45 degrees about perpendicular axes touch edge to edge
        let ra = QuatFix::from_axis_angle(Vec3Fix::UNIT_Z, Fix64::QUARTER_PI);
        let rb = QuatFix::from_axis_angle(Vec3Fix::UNIT_X, Fix64::QUARTER_PI);
        let a = OrientedBox::new(Vec3Fix::ZERO, Vec3Fix::ONE, ra);
        let gap = Fix64::TWO.sqrt_sat().double() - Fix64::from_ratio(1, 10);
        let b = OrientedBox::new(Vec3Fix::new(Fix64::ZERO, gap, Fix64::ZERO), Vec3Fix::ONE, rb);
        let contacts = box_box(&a, &b, Fix64::ZERO);
        assert_eq!(contacts.len(), 1, "edge-edge yields one point");
        let c = contacts[0];
        assert!(c.normal.y > Fix64::from_ratio(99, 100), "normal {:?}", c.normal);
        assert!((c.depth - Fix64::from_ratio(1, 10)).abs() < Fix64::from_ratio(1, 1000), "depth {}", c.depth);
    }

    #[test]
    fn test_clip_polygon_half() {
        let square = [
            Vec3Fix::from_int(1, 0, 1),
            Vec3Fix::from_int(-1, 0, 1),
            Vec3Fix::from_int(-1, 0, -1),
            Vec3Fix::from_int(1, 0, -1),
        ];
        let clipped = clip_polygon(&square, Vec3Fix::UNIT_X, Fix64::ZERO);
        assert_eq!(clipped.len(), 4);
        assert!(clipped.iter().all(|p| p.x <= Fix64::ZERO));
    }
}
