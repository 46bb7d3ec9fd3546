//! GJK / EPA and Shape Casting
//!
//! Distance queries between any two [`Support`] mappings.
//!
//! # Features
//!
//! - GJK distance with a Johnson-style sub-simplex solver that keeps the
//!   barycentric weights, so witness points on both shapes are exact
//! - EPA penetration depth when GJK finds the origin inside the
//!   Minkowski difference
//! - Conservative advancement for ray casts and linear convex casts
//!
//! All loops run a fixed iteration budget and break ties by vertex order,
//! so results are identical on every platform.

use crate::collider::{Contact, PointSupport, Support, Translated};
use crate::fixed::Fix64;
use crate::math::{unit_scale_shift, Vec3Fix};

/// Iteration budget for GJK, EPA and conservative advancement
pub const MAX_ITERATIONS: usize = 32;

/// Squared distance at which GJK reports overlap
const OVERLAP_EPSILON_SQ: Fix64 = Fix64::from_raw(1 << 8);

/// Relative progress below which GJK stops refining
const GJK_RELATIVE_TOLERANCE: Fix64 = Fix64::from_raw(1 << 16);

/// Absolute progress floor (squared units)
const GJK_ABSOLUTE_TOLERANCE: Fix64 = Fix64::from_raw(1 << 6);

/// EPA stops when the polytope grows less than this
const EPA_TOLERANCE: Fix64 = Fix64::from_ratio(1, 10_000);

/// Gap at which a cast reports time of impact
pub const CAST_TOLERANCE: Fix64 = Fix64::from_ratio(1, 10_000);

// ============================================================================
// Simplex
// ============================================================================

/// Minkowski-difference vertex with its witnesses on both shapes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimplexVertex {
    /// `a - b`
    pub w: Vec3Fix,
    /// Support point on A
    pub a: Vec3Fix,
    /// Support point on B
    pub b: Vec3Fix,
}

#[inline]
fn minkowski_support<A, B>(a: &A, b: &B, direction: Vec3Fix) -> SimplexVertex
where
    A: Support + ?Sized,
    B: Support + ?Sized,
{
    let pa = a.support(direction);
    let pb = b.support(-direction);
    SimplexVertex {
        w: pa - pb,
        a: pa,
        b: pb,
    }
}

/// Up to four vertices with barycentric weights of the closest point
#[derive(Clone, Copy, Debug, Default)]
pub struct Simplex {
    vertices: [SimplexVertex; 4],
    weights: [Fix64; 4],
    count: usize,
}

impl Simplex {
    fn single(v: SimplexVertex) -> Self {
        let mut s = Self::default();
        s.vertices[0] = v;
        s.weights[0] = Fix64::ONE;
        s.count = 1;
        s
    }

    fn from_weighted(entries: &[(SimplexVertex, Fix64)]) -> Self {
        let mut s = Self::default();
        for (i, &(v, w)) in entries.iter().enumerate() {
            s.vertices[i] = v;
            s.weights[i] = w;
        }
        s.count = entries.len();
        s
    }

    /// Active vertices
    #[inline]
    pub fn vertices(&self) -> &[SimplexVertex] {
        &self.vertices[..self.count]
    }

    /// Number of active vertices
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn contains(&self, w: Vec3Fix) -> bool {
        self.vertices().iter().any(|v| v.w == w)
    }

    fn with(&self, v: SimplexVertex) -> Self {
        let mut s = *self;
        s.vertices[s.count] = v;
        s.count += 1;
        s
    }

    /// Weighted sum of `f` over the active vertices
    fn combine(&self, f: impl Fn(&SimplexVertex) -> Vec3Fix) -> Vec3Fix {
        let mut out = Vec3Fix::ZERO;
        for i in 0..self.count {
            out += f(&self.vertices[i]) * self.weights[i];
        }
        out
    }

    /// Closest point of the simplex to the origin
    fn closest(&self) -> Vec3Fix {
        self.combine(|v| v.w)
    }

    /// Reduce to the sub-simplex supporting the closest point to the origin
    fn solve(&self) -> Self {
        let v = &self.vertices;
        match self.count {
            1 => *self,
            2 => solve_segment(v[0], v[1]),
            3 => solve_triangle(v[0], v[1], v[2]),
            _ => solve_tetrahedron(v[0], v[1], v[2], v[3]),
        }
    }
}

/// Rescale points so the largest component lands in [0.5, 1)
///
/// Barycentric weights are scale invariant, and the rescaled products stay
/// well inside the fixed-point range.
fn normalized<const N: usize>(points: [Vec3Fix; N]) -> [Vec3Fix; N] {
    let max = points.iter().map(|p| p.max_abs_raw()).max().unwrap_or(0);
    if max == 0 {
        return points;
    }
    let shift = unit_scale_shift(max);
    points.map(|p| p.shifted(shift))
}

fn solve_segment(a: SimplexVertex, b: SimplexVertex) -> Simplex {
    let [pa, pb] = normalized([a.w, b.w]);
    let ab = pb - pa;
    let t_num = -pa.dot(ab);
    if t_num <= Fix64::ZERO {
        return Simplex::single(a);
    }
    let denom = ab.length_squared();
    if t_num >= denom {
        return Simplex::single(b);
    }
    let t = t_num / denom;
    Simplex::from_weighted(&[(a, Fix64::ONE - t), (b, t)])
}

/// Ericson's closest point on a triangle to the origin, as barycentrics
fn solve_triangle(a: SimplexVertex, b: SimplexVertex, c: SimplexVertex) -> Simplex {
    let zero = Fix64::ZERO;
    let [pa, pb, pc] = normalized([a.w, b.w, c.w]);
    let ab = pb - pa;
    let ac = pc - pa;

    let d1 = -ab.dot(pa);
    let d2 = -ac.dot(pa);
    if d1 <= zero && d2 <= zero {
        return Simplex::single(a);
    }

    let d3 = -ab.dot(pb);
    let d4 = -ac.dot(pb);
    if d3 >= zero && d4 <= d3 {
        return Simplex::single(b);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= zero && d1 >= zero && d3 <= zero {
        let v = d1 / (d1 - d3);
        return Simplex::from_weighted(&[(a, Fix64::ONE - v), (b, v)]);
    }

    let d5 = -ab.dot(pc);
    let d6 = -ac.dot(pc);
    if d6 >= zero && d5 <= d6 {
        return Simplex::single(c);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= zero && d2 >= zero && d6 <= zero {
        let w = d2 / (d2 - d6);
        return Simplex::from_weighted(&[(a, Fix64::ONE - w), (c, w)]);
    }

    let va = d3 * d6 - d5 * d4;
    let d4_d3 = d4 - d3;
    let d5_d6 = d5 - d6;
    if va <= zero && d4_d3 >= zero && d5_d6 >= zero {
        let w = d4_d3 / (d4_d3 + d5_d6);
        return Simplex::from_weighted(&[(b, Fix64::ONE - w), (c, w)]);
    }

    let denom = va + vb + vc;
    if denom.is_zero() {
        // Degenerate triangle: fall back to its best edge
        return solve_segment(a, b);
    }
    let v = vb / denom;
    let w = vc / denom;
    Simplex::from_weighted(&[(a, Fix64::ONE - v - w), (b, v), (c, w)])
}

/// Is the origin on the far side of plane `abc` from `d`?
fn origin_outside_plane(a: Vec3Fix, b: Vec3Fix, c: Vec3Fix, d: Vec3Fix) -> bool {
    let n = (b - a).cross(c - a);
    let sign_o = -a.dot(n);
    let sign_d = (d - a).dot(n);
    if sign_d.is_zero() {
        return true;
    }
    !sign_o.is_zero() && sign_o.is_negative() != sign_d.is_negative()
}

fn solve_tetrahedron(a: SimplexVertex, b: SimplexVertex, c: SimplexVertex, d: SimplexVertex) -> Simplex {
    let [pa, pb, pc, pd] = normalized([a.w, b.w, c.w, d.w]);
    let faces = [
        ((a, b, c), origin_outside_plane(pa, pb, pc, pd)),
        ((a, c, d), origin_outside_plane(pa, pc, pd, pb)),
        ((a, d, b), origin_outside_plane(pa, pd, pb, pc)),
        ((b, d, c), origin_outside_plane(pb, pd, pc, pa)),
    ];

    let mut best: Option<(Simplex, Fix64)> = None;
    for ((x, y, z), outside) in faces {
        if !outside {
            continue;
        }
        let candidate = solve_triangle(x, y, z);
        let dist = candidate.closest().length_squared();
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((candidate, dist));
        }
    }

    match best {
        Some((s, _)) => s,
        // Origin enclosed: keep the whole tetrahedron
        None => Simplex::from_weighted(&[
            (a, Fix64::ZERO),
            (b, Fix64::ZERO),
            (c, Fix64::ZERO),
            (d, Fix64::ZERO),
        ]),
    }
}

// ============================================================================
// GJK Distance
// ============================================================================

/// Result of a GJK distance query
#[derive(Clone, Copy, Debug)]
pub struct GjkResult {
    /// Separation distance (zero when overlapping)
    pub distance: Fix64,
    /// Closest point on A
    pub point_a: Vec3Fix,
    /// Closest point on B
    pub point_b: Vec3Fix,
    /// Unit direction from A to B (zero when overlapping)
    pub normal: Vec3Fix,
    /// Shapes overlap (or touch within numerical tolerance)
    pub overlapping: bool,
    /// Terminal simplex (EPA seed)
    pub simplex: Simplex,
}

/// GJK distance between two convex support mappings
pub fn gjk_distance<A, B>(a: &A, b: &B) -> GjkResult
where
    A: Support + ?Sized,
    B: Support + ?Sized,
{
    let mut seed = a.center() - b.center();
    if seed.is_zero() {
        seed = Vec3Fix::UNIT_X;
    }
    let mut simplex = Simplex::single(minkowski_support(a, b, seed));
    let mut v = simplex.closest();
    let mut overlapping = false;

    for _ in 0..MAX_ITERATIONS {
        let vv = v.length_squared();
        if vv <= OVERLAP_EPSILON_SQ {
            overlapping = true;
            break;
        }

        let w = minkowski_support(a, b, -v);
        let progress = vv - v.dot(w.w);
        if progress <= (vv * GJK_RELATIVE_TOLERANCE).max(GJK_ABSOLUTE_TOLERANCE) {
            break;
        }
        if simplex.contains(w.w) {
            break;
        }

        let candidate = simplex.with(w).solve();
        if candidate.len() == 4 {
            simplex = candidate;
            overlapping = true;
            break;
        }
        let next_v = candidate.closest();
        if next_v.length_squared() >= vv {
            // Numerical stall: keep the previous simplex
            break;
        }
        simplex = candidate;
        v = next_v;
    }

    if overlapping {
        let point_a = if simplex.len() == 4 {
            a.center()
        } else {
            simplex.combine(|s| s.a)
        };
        return GjkResult {
            distance: Fix64::ZERO,
            point_a,
            point_b: point_a,
            normal: Vec3Fix::ZERO,
            overlapping: true,
            simplex,
        };
    }

    let point_a = simplex.combine(|s| s.a);
    let point_b = simplex.combine(|s| s.b);
    let (normal, distance) = (-v).normalize_with_length();
    GjkResult {
        distance,
        point_a,
        point_b,
        normal,
        overlapping: false,
        simplex,
    }
}

// ============================================================================
// EPA
// ============================================================================

/// Penetration reported by EPA
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Penetration {
    /// Penetration depth (non-negative)
    pub depth: Fix64,
    /// Unit normal from A to B
    pub normal: Vec3Fix,
    /// Deepest point of A inside B
    pub point_a: Vec3Fix,
    /// Deepest point of B inside A
    pub point_b: Vec3Fix,
}

#[derive(Clone, Copy, Debug)]
struct EpaFace {
    indices: [usize; 3],
    normal: Vec3Fix,
    distance: Fix64,
}

fn make_face(vertices: &[SimplexVertex], interior: Vec3Fix, i: usize, j: usize, k: usize) -> Option<EpaFace> {
    let (a, b, c) = (vertices[i].w, vertices[j].w, vertices[k].w);
    let mut normal = (b - a).cross(c - a).normalize();
    if normal.is_zero() {
        return None;
    }
    let mut indices = [i, j, k];
    if normal.dot(a - interior) < Fix64::ZERO {
        normal = -normal;
        indices = [i, k, j];
    }
    Some(EpaFace {
        indices,
        normal,
        distance: normal.dot(a).max(Fix64::ZERO),
    })
}

/// Grow a degenerate GJK simplex into a tetrahedron that encloses volume
fn complete_simplex<A, B>(a: &A, b: &B, simplex: &Simplex) -> Option<Vec<SimplexVertex>>
where
    A: Support + ?Sized,
    B: Support + ?Sized,
{
    const AXES: [Vec3Fix; 6] = [
        Vec3Fix::UNIT_X,
        Vec3Fix::new(Fix64::NEG_ONE, Fix64::ZERO, Fix64::ZERO),
        Vec3Fix::UNIT_Y,
        Vec3Fix::new(Fix64::ZERO, Fix64::NEG_ONE, Fix64::ZERO),
        Vec3Fix::UNIT_Z,
        Vec3Fix::new(Fix64::ZERO, Fix64::ZERO, Fix64::NEG_ONE),
    ];
    let tolerance = EPA_TOLERANCE;
    let mut vertices: Vec<SimplexVertex> = simplex.vertices().to_vec();
    if vertices.is_empty() {
        vertices.push(minkowski_support(a, b, Vec3Fix::UNIT_X));
    }

    if vertices.len() == 1 {
        let origin = vertices[0].w;
        let found = AXES
            .iter()
            .map(|&d| minkowski_support(a, b, d))
            .find(|s| (s.w - origin).length() > tolerance)?;
        vertices.push(found);
    }

    if vertices.len() == 2 {
        let seg = vertices[1].w - vertices[0].w;
        let (t1, t2) = seg.normalize().orthonormal_basis();
        let base = vertices[0].w;
        let found = [t1, -t1, t2, -t2]
            .iter()
            .map(|&d| minkowski_support(a, b, d))
            .find(|s| seg.cross(s.w - base).length() > tolerance)?;
        vertices.push(found);
    }

    if vertices.len() == 3 {
        let base = vertices[0].w;
        let n = (vertices[1].w - base).cross(vertices[2].w - base).normalize();
        let found = [n, -n]
            .iter()
            .map(|&d| minkowski_support(a, b, d))
            .find(|s| (s.w - base).dot(n).abs() > tolerance)?;
        vertices.push(found);
    }

    Some(vertices)
}

/// Expanding polytope penetration from an overlapping GJK simplex
///
/// Returns `None` when the overlap is too shallow to build a polytope
/// (touching shapes).
pub fn epa<A, B>(a: &A, b: &B, simplex: &Simplex) -> Option<Penetration>
where
    A: Support + ?Sized,
    B: Support + ?Sized,
{
    let mut vertices = complete_simplex(a, b, simplex)?;
    let interior = {
        let s = vertices[0].w + vertices[1].w + vertices[2].w + vertices[3].w;
        Vec3Fix::new(s.x.div_int(4), s.y.div_int(4), s.z.div_int(4))
    };

    let mut faces: Vec<EpaFace> = Vec::with_capacity(32);
    for [i, j, k] in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
        faces.push(make_face(&vertices, interior, i, j, k)?);
    }

    let mut closest = closest_face(&faces)?;
    for _ in 0..MAX_ITERATIONS {
        let face = faces[closest];
        let support = minkowski_support(a, b, face.normal);
        let reach = face.normal.dot(support.w);
        if reach - face.distance < EPA_TOLERANCE || vertices.iter().any(|v| v.w == support.w) {
            break;
        }

        let new_index = vertices.len();
        vertices.push(support);

        // Remove every face the new point can see and collect the horizon
        let mut edges: Vec<(usize, usize)> = Vec::new();
        let mut kept = Vec::with_capacity(faces.len());
        for f in faces.drain(..) {
            let v0 = vertices[f.indices[0]].w;
            if f.normal.dot(support.w - v0) > Fix64::ZERO {
                for (e0, e1) in [
                    (f.indices[0], f.indices[1]),
                    (f.indices[1], f.indices[2]),
                    (f.indices[2], f.indices[0]),
                ] {
                    if let Some(pos) = edges.iter().position(|&(x, y)| x == e1 && y == e0) {
                        edges.remove(pos);
                    } else {
                        edges.push((e0, e1));
                    }
                }
            } else {
                kept.push(f);
            }
        }
        faces = kept;
        for (e0, e1) in edges {
            if let Some(f) = make_face(&vertices, interior, e0, e1, new_index) {
                faces.push(f);
            }
        }
        closest = closest_face(&faces)?;
    }

    let face = faces[closest];
    let [i, j, k] = face.indices;
    let weights = barycentric(
        face.normal * face.distance,
        vertices[i].w,
        vertices[j].w,
        vertices[k].w,
    );
    let blend = |f: fn(&SimplexVertex) -> Vec3Fix| {
        f(&vertices[i]) * weights[0] + f(&vertices[j]) * weights[1] + f(&vertices[k]) * weights[2]
    };
    Some(Penetration {
        depth: face.distance,
        normal: face.normal,
        point_a: blend(|v| v.a),
        point_b: blend(|v| v.b),
    })
}

fn closest_face(faces: &[EpaFace]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, f) in faces.iter().enumerate() {
        if best.map_or(true, |b| f.distance < faces[b].distance) {
            best = Some(i);
        }
    }
    best
}

/// Barycentric weights of `p` (assumed in the plane of `a b c`)
fn barycentric(p: Vec3Fix, a: Vec3Fix, b: Vec3Fix, c: Vec3Fix) -> [Fix64; 3] {
    let [p, a, b, c] = normalized([p, a, b, c]);
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.is_zero() {
        return [Fix64::ONE, Fix64::ZERO, Fix64::ZERO];
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    [Fix64::ONE - v - w, v, w]
}

// ============================================================================
// Contact Generation
// ============================================================================

/// Contact between two convex shapes, or `None` if they are farther apart
/// than `margin`
///
/// Separated shapes within the margin produce a speculative contact with
/// negative depth.
pub fn convex_contact<A, B>(a: &A, b: &B, margin: Fix64) -> Option<Contact>
where
    A: Support + ?Sized,
    B: Support + ?Sized,
{
    let g = gjk_distance(a, b);
    if !g.overlapping {
        if g.distance > margin {
            return None;
        }
        let point = (g.point_a + g.point_b).scale(Fix64::HALF);
        return Some(Contact::new(point, g.normal, -g.distance));
    }

    match epa(a, b, &g.simplex) {
        Some(p) => {
            let point = (p.point_a + p.point_b).scale(Fix64::HALF);
            Some(Contact::new(point, p.normal, p.depth))
        }
        None => {
            // Touching: use the centre line as the normal
            let mut normal = (b.center() - a.center()).normalize();
            if normal.is_zero() {
                normal = Vec3Fix::UNIT_Y;
            }
            Some(Contact::new(g.point_a, normal, Fix64::ZERO))
        }
    }
}

// ============================================================================
// Conservative Advancement
// ============================================================================

/// Time of impact of a linear cast
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CastHit {
    /// Fraction of the sweep in `[0, 1]`
    pub toi: Fix64,
    /// Contact point on the target at impact
    pub point: Vec3Fix,
    /// Target surface normal, facing the moving shape
    pub normal: Vec3Fix,
}

/// Sweep `moving` by `sweep` against a static `target`
///
/// Each iteration advances by `gap / closing speed` along the current
/// separating axis, which can never tunnel through the target.
pub fn convex_cast<A, B>(moving: &A, sweep: Vec3Fix, target: &B) -> Option<CastHit>
where
    A: Support + ?Sized,
    B: Support + ?Sized,
{
    let mut t = Fix64::ZERO;
    let mut normal = -sweep.normalize();
    if normal.is_zero() {
        normal = Vec3Fix::UNIT_Y;
    }
    for _ in 0..MAX_ITERATIONS {
        let placed = Translated {
            shape: moving,
            offset: sweep * t,
        };
        let g = gjk_distance(&placed, target);
        if g.overlapping {
            // Overlapping after an advance: keep the last separating axis
            return Some(CastHit {
                toi: t,
                point: g.point_b,
                normal,
            });
        }
        normal = -g.normal;
        if g.distance <= CAST_TOLERANCE {
            return Some(CastHit {
                toi: t,
                point: g.point_b,
                normal,
            });
        }

        let closing = sweep.dot(g.normal);
        if closing <= Fix64::ZERO {
            return None;
        }
        t += g.distance / closing;
        if t > Fix64::ONE {
            return None;
        }
    }
    None
}

/// Ray against a convex support mapping: `(distance, normal)` of the hit
pub fn ray_cast_support<S>(origin: Vec3Fix, direction: Vec3Fix, max_distance: Fix64, shape: &S) -> Option<(Fix64, Vec3Fix)>
where
    S: Support + ?Sized,
{
    let hit = convex_cast(&PointSupport(origin), direction * max_distance, shape)?;
    Some((hit.toi * max_distance, hit.normal))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{QuatFix, Transform};
    use crate::shape::{ConvexShape, WorldConvex};

    fn close(a: Fix64, b: Fix64, tol: Fix64) -> bool {
        (a - b).abs() <= tol
    }

    fn tol() -> Fix64 {
        Fix64::from_ratio(1, 1000)
    }

    fn sphere_at(r: i64, x: i64, y: i64, z: i64) -> (ConvexShape, Transform) {
        (
            ConvexShape::sphere(Fix64::from_int(r)).expect("sphere"),
            Transform::from_position(Vec3Fix::from_int(x, y, z)),
        )
    }

    #[test]
    fn test_gjk_separated_spheres() {
        let (sa, ta) = sphere_at(1, 0, 0, 0);
        let (sb, tb) = sphere_at(1, 5, 0, 0);
        let g = gjk_distance(&WorldConvex::new(&sa, ta), &WorldConvex::new(&sb, tb));
        assert!(!g.overlapping);
        assert!(close(g.distance, Fix64::from_int(3), tol()), "distance {}", g.distance);
        assert!(close(g.normal.x, Fix64::ONE, tol()), "normal points A to B");
        assert!(close(g.point_a.x, Fix64::ONE, tol()));
        assert!(close(g.point_b.x, Fix64::from_int(4), tol()));
    }

    #[test]
    fn test_gjk_boxes_distance() {
        let half = Vec3Fix::ONE;
        let a = ConvexShape::cuboid(half).expect("box");
        let b = ConvexShape::cuboid(half).expect("box");
        let wa = WorldConvex::new(&a, Transform::IDENTITY);
        let wb = WorldConvex::new(&b, Transform::from_position(Vec3Fix::from_int(1, 4, 0)));
        let g = gjk_distance(&wa, &wb);
        assert!(!g.overlapping);
        assert!(close(g.distance, Fix64::TWO, tol()), "distance {}", g.distance);
        assert!(close(g.normal.y, Fix64::ONE, tol()));
    }

    #[test]
    fn test_gjk_overlap_and_epa_depth() {
        let a = ConvexShape::cuboid(Vec3Fix::ONE).expect("box");
        let b = ConvexShape::cuboid(Vec3Fix::ONE).expect("box");
        let wa = WorldConvex::new(&a, Transform::IDENTITY);
        let offset = Vec3Fix::new(Fix64::from_ratio(3, 2), Fix64::ZERO, Fix64::ZERO);
        let wb = WorldConvex::new(&b, Transform::from_position(offset));
        let g = gjk_distance(&wa, &wb);
        assert!(g.overlapping, "Boxes overlap by 0.5");

        let p = epa(&wa, &wb, &g.simplex).expect("penetration");
        assert!(close(p.depth, Fix64::HALF, tol()), "depth {}", p.depth);
        assert!(close(p.normal.x, Fix64::ONE, tol()), "normal {:?}", p.normal);
    }

    #[test]
    fn test_convex_contact_speculative() {
        let (sa, ta) = sphere_at(1, 0, 0, 0);
        let sb = ConvexShape::sphere(Fix64::ONE).expect("sphere");
        let tb = Transform::from_position(Vec3Fix::new(Fix64::from_ratio(201, 100), Fix64::ZERO, Fix64::ZERO));
        let wa = WorldConvex::new(&sa, ta);
        let wb = WorldConvex::new(&sb, tb);
        let c = convex_contact(&wa, &wb, Fix64::from_ratio(2, 100)).expect("within margin");
        assert!(c.depth < Fix64::ZERO, "Separated contact has negative depth");
        assert!(convex_contact(&wa, &wb, Fix64::from_ratio(1, 1000)).is_none());
    }

    #[test]
    fn test_convex_contact_capsule_box() {
        let cap = ConvexShape::capsule(Fix64::HALF, Fix64::ONE).expect("capsule");
        let cube = ConvexShape::cuboid(Vec3Fix::ONE).expect("box");
        let wa = WorldConvex::new(&cap, Transform::IDENTITY);
        let offset = Vec3Fix::new(Fix64::from_ratio(5, 4), Fix64::ZERO, Fix64::ZERO);
        let wb = WorldConvex::new(&cube, Transform::from_position(offset));
        let c = convex_contact(&wa, &wb, Fix64::ZERO).expect("overlapping");
        assert!(close(c.depth, Fix64::from_ratio(1, 4), Fix64::from_ratio(1, 100)), "depth {}", c.depth);
        assert!(c.normal.x > Fix64::from_ratio(9, 10), "normal {:?}", c.normal);
    }

    #[test]
    fn test_ray_cast_support_rotated_box() {
        let b = ConvexShape::cuboid(Vec3Fix::ONE).expect("box");
        let rot = QuatFix::from_axis_angle(Vec3Fix::UNIT_Y, Fix64::QUARTER_PI);
        let wb = WorldConvex::new(&b, Transform::new(Vec3Fix::ZERO, rot));
        let (dist, normal) =
            ray_cast_support(Vec3Fix::from_int(0, 10, 0), -Vec3Fix::UNIT_Y, Fix64::from_int(20), &wb)
                .expect("hits top face");
        assert!(close(dist, Fix64::from_int(9), tol()), "distance {dist}");
        assert!(close(normal.y, Fix64::ONE, tol()), "normal {normal:?}");

        assert!(ray_cast_support(Vec3Fix::from_int(5, 10, 0), -Vec3Fix::UNIT_Y, Fix64::from_int(20), &wb).is_none());
    }

    #[test]
    fn test_convex_cast_sphere_onto_box() {
        let ground = ConvexShape::cuboid(Vec3Fix::new(Fix64::from_int(10), Fix64::ONE, Fix64::from_int(10))).expect("box");
        let ball = ConvexShape::sphere(Fix64::ONE).expect("sphere");
        let target = WorldConvex::new(&ground, Transform::IDENTITY);
        let start = WorldConvex::new(&ball, Transform::from_position(Vec3Fix::from_int(0, 10, 0)));
        let hit = convex_cast(&start, Vec3Fix::from_int(0, -16, 0), &target).expect("lands");
        // Travels 8 of 16
        assert!(close(hit.toi, Fix64::HALF, tol()), "toi {}", hit.toi);
        assert!(close(hit.normal.y, Fix64::ONE, tol()));

        assert!(convex_cast(&start, Vec3Fix::from_int(0, 16, 0), &target).is_none(), "Moving away");
        assert!(convex_cast(&start, Vec3Fix::from_int(0, -4, 0), &target).is_none(), "Too short");
    }

    #[test]
    fn test_convex_cast_starting_inside() {
        let a = ConvexShape::sphere(Fix64::ONE).expect("sphere");
        let wa = WorldConvex::new(&a, Transform::IDENTITY);
        let wb = WorldConvex::new(&a, Transform::from_position(Vec3Fix::new(Fix64::HALF, Fix64::ZERO, Fix64::ZERO)));
        let hit = convex_cast(&wa, Vec3Fix::UNIT_X, &wb).expect("overlapping");
        assert!(hit.toi.is_zero());
        assert_eq!(hit.normal, -Vec3Fix::UNIT_X);
    }

    #[test]
    fn test_gjk_deterministic() {
        let hull = ConvexShape::convex_hull(&[
            Vec3Fix::from_int(0, 0, 0),
            Vec3Fix::from_int(2, 0, 0),
            Vec3Fix::from_int(0, 2, 0),
            Vec3Fix::from_int(0, 0, 2),
        ])
        .expect("tetra");
        let ball = ConvexShape::sphere(Fix64::ONE).expect("sphere");
        let wa = WorldConvex::new(&hull, Transform::IDENTITY);
        let wb = WorldConvex::new(&ball, Transform::from_position(Vec3Fix::from_int(2, 2, 2)));
        let g1 = gjk_distance(&wa, &wb);
        let g2 = gjk_distance(&wa, &wb);
        assert_eq!(g1.distance, g2.distance);
        assert_eq!(g1.point_a, g2.point_a);
        assert!(!g1.overlapping);
    }
}
