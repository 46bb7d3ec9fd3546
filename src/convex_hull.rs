//! Convex Hull Builder
//!
//! Incremental convex hull construction from a set of 3D points using
//! deterministic fixed-point arithmetic.
//!
//! # Algorithm
//!
//! 1. Weld points closer than [`HULL_WELD_DISTANCE`]
//! 2. Find an initial tetrahedron from 4 non-coplanar points
//! 3. For each remaining point, test against all faces
//! 4. If the point is outside any face, remove visible faces and patch the hull
//!
//! # Validation
//!
//! Construction fails with [`PhysicsError::InvalidShape`] for fewer than four
//! distinct points, coplanar input, and points strictly inside the hull
//! (the caller handed in a non-convex point set). The finished hull is
//! recentred on its volume centroid.

use crate::collider::{Support, AABB};
use crate::error::{PhysicsError, Result};
use crate::fixed::Fix64;
use crate::mass_properties::{convex_hull_mass_properties, surface_volume_centroid, MassProperties};
use crate::math::Vec3Fix;

/// Points closer than this are merged into one.
pub const HULL_WELD_DISTANCE: Fix64 = Fix64::from_ratio(1, 10_000);

/// Face of the hull under construction (unit outward normal)
#[derive(Clone, Copy, Debug)]
struct HullFace {
    indices: [usize; 3],
    normal: Vec3Fix,
    offset: Fix64,
}

impl HullFace {
    #[inline]
    fn distance(&self, p: Vec3Fix) -> Fix64 {
        self.normal.dot(p) - self.offset
    }
}

/// Validated convex hull, centred on its volume centroid
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvexHull {
    vertices: Vec<Vec3Fix>,
    faces: Vec<[u32; 3]>,
    /// Offset subtracted from the input points during recentring
    centroid: Vec3Fix,
}

impl ConvexHull {
    /// Build and validate a hull from raw points
    pub fn new(points: &[Vec3Fix]) -> Result<Self> {
        let welded = weld_points(points);
        if welded.len() < 4 {
            return Err(PhysicsError::shape(format!(
                "convex hull needs at least 4 distinct points, got {}",
                welded.len()
            )));
        }

        let tet = find_initial_tetrahedron(&welded)?;
        let mut verts: Vec<Vec3Fix> = tet.iter().map(|&i| welded[i]).collect();
        let interior = centroid_of(&verts);

        let mut faces = Vec::with_capacity(32);
        for fi in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
            faces.push(make_face(&verts, fi, interior));
        }

        for (i, &p) in welded.iter().enumerate() {
            if tet.contains(&i) {
                continue;
            }
            insert_point(&mut verts, &mut faces, p, interior);
        }

        // Every input point must be a hull vertex or lie on the surface
        for &p in &welded {
            let strictly_inside = faces
                .iter()
                .all(|f| f.distance(p) < -HULL_WELD_DISTANCE);
            if strictly_inside {
                return Err(PhysicsError::shape(
                    "convex hull input contains interior points (non-convex point set)",
                ));
            }
        }

        // Compact to referenced vertices in first-use order
        let mut remap = vec![u32::MAX; verts.len()];
        let mut vertices = Vec::new();
        let mut out_faces = Vec::with_capacity(faces.len());
        for f in &faces {
            let mut tri = [0u32; 3];
            for (slot, &idx) in tri.iter_mut().zip(f.indices.iter()) {
                if remap[idx] == u32::MAX {
                    remap[idx] = vertices.len() as u32;
                    vertices.push(verts[idx]);
                }
                *slot = remap[idx];
            }
            out_faces.push(tri);
        }

        let (volume, centroid) = surface_volume_centroid(&vertices, &out_faces, interior);
        if volume <= Fix64::ZERO {
            return Err(PhysicsError::shape("convex hull has no volume"));
        }
        for v in &mut vertices {
            *v -= centroid;
        }

        Ok(Self {
            vertices,
            faces: out_faces,
            centroid,
        })
    }

    /// Hull vertices (relative to the volume centroid)
    #[inline]
    pub fn vertices(&self) -> &[Vec3Fix] {
        &self.vertices
    }

    /// Triangulated faces with outward winding
    #[inline]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Volume centroid of the input points (the translation removed at construction)
    #[inline]
    pub fn original_centroid(&self) -> Vec3Fix {
        self.centroid
    }

    /// Local bounding box
    pub fn local_aabb(&self) -> AABB {
        AABB::from_points(&self.vertices).unwrap_or_default()
    }

    /// Mass properties at the given density
    pub fn mass_properties(&self, density: Fix64) -> MassProperties {
        convex_hull_mass_properties(&self.vertices, &self.faces, density)
    }
}

impl Support for ConvexHull {
    fn support(&self, direction: Vec3Fix) -> Vec3Fix {
        let mut best = self.vertices[0];
        let mut best_dot = best.dot(direction);
        for &v in &self.vertices[1..] {
            let d = v.dot(direction);
            if d > best_dot {
                best = v;
                best_dot = d;
            }
        }
        best
    }
}

fn weld_points(points: &[Vec3Fix]) -> Vec<Vec3Fix> {
    let tol_sq = HULL_WELD_DISTANCE * HULL_WELD_DISTANCE;
    let mut out: Vec<Vec3Fix> = Vec::with_capacity(points.len());
    for &p in points {
        if !out.iter().any(|&q| (p - q).length_squared() <= tol_sq) {
            out.push(p);
        }
    }
    out
}

fn centroid_of(points: &[Vec3Fix]) -> Vec3Fix {
    let mut sum = Vec3Fix::ZERO;
    for &p in points {
        sum += p;
    }
    sum / Fix64::from_int(points.len() as i64)
}

fn make_face(verts: &[Vec3Fix], indices: [usize; 3], interior: Vec3Fix) -> HullFace {
    let a = verts[indices[0]];
    let b = verts[indices[1]];
    let c = verts[indices[2]];
    let mut normal = (b - a).cross(c - a).normalize();
    let mut indices = indices;
    if normal.dot(interior - a) > Fix64::ZERO {
        normal = -normal;
        indices.swap(1, 2);
    }
    HullFace {
        indices,
        normal,
        offset: normal.dot(a),
    }
}

/// Indices of 4 non-coplanar points (extreme pair, farthest from line, farthest from plane)
fn find_initial_tetrahedron(points: &[Vec3Fix]) -> Result<[usize; 4]> {
    let n = points.len();

    let (mut i0, mut i1) = (0usize, 1usize);
    let mut max_dist = Fix64::ZERO;
    for i in 0..n {
        for j in (i + 1)..n {
            let d = (points[i] - points[j]).length_squared();
            if d > max_dist {
                max_dist = d;
                i0 = i;
                i1 = j;
            }
        }
    }

    let line_dir = (points[i1] - points[i0]).normalize();
    let mut i2 = usize::MAX;
    let mut max_line = HULL_WELD_DISTANCE;
    for (i, p) in points.iter().enumerate() {
        if i == i0 || i == i1 {
            continue;
        }
        let d = line_dir.cross(*p - points[i0]).length();
        if d > max_line {
            max_line = d;
            i2 = i;
        }
    }
    if i2 == usize::MAX {
        return Err(PhysicsError::shape("convex hull input is collinear"));
    }

    let plane = (points[i1] - points[i0]).cross(points[i2] - points[i0]).normalize();
    let mut i3 = usize::MAX;
    let mut max_plane = HULL_WELD_DISTANCE;
    for (i, p) in points.iter().enumerate() {
        if i == i0 || i == i1 || i == i2 {
            continue;
        }
        let d = plane.dot(*p - points[i0]).abs();
        if d > max_plane {
            max_plane = d;
            i3 = i;
        }
    }
    if i3 == usize::MAX {
        return Err(PhysicsError::shape("convex hull input is coplanar"));
    }

    Ok([i0, i1, i2, i3])
}

/// Insert a point, replacing the faces it can see
fn insert_point(verts: &mut Vec<Vec3Fix>, faces: &mut Vec<HullFace>, point: Vec3Fix, interior: Vec3Fix) {
    let visible: Vec<usize> = faces
        .iter()
        .enumerate()
        .filter(|(_, f)| f.distance(point) > HULL_WELD_DISTANCE)
        .map(|(i, _)| i)
        .collect();

    if visible.is_empty() {
        return;
    }

    // Horizon: edges of visible faces whose reverse is not on another visible face
    let mut horizon: Vec<(usize, usize)> = Vec::new();
    for &fi in &visible {
        let face = faces[fi];
        for k in 0..3 {
            let e0 = face.indices[k];
            let e1 = face.indices[(k + 1) % 3];
            let shared = visible.iter().any(|&other| {
                other != fi && {
                    let o = faces[other].indices;
                    (0..3).any(|m| o[m] == e1 && o[(m + 1) % 3] == e0)
                }
            });
            if !shared {
                horizon.push((e0, e1));
            }
        }
    }

    // Drop visible faces, keeping the order of the survivors
    let mut keep = vec![true; faces.len()];
    for &fi in &visible {
        keep[fi] = false;
    }
    let mut idx = 0;
    faces.retain(|_| {
        let k = keep[idx];
        idx += 1;
        k
    });

    let new_idx = verts.len();
    verts.push(point);
    for (e0, e1) in horizon {
        faces.push(make_face(verts, [e0, e1, new_idx], interior));
    }
}
