//! Triangle Mesh Collision
//!
//! Static, immutable triangle mesh with BVH acceleration. Meshes are only
//! ever attached to static bodies; the narrow phase collides convex shapes
//! against the triangles returned by [`TriangleMesh::triangles_in_aabb`].

use crate::bvh::{BvhPrimitive, LinearBvh};
use crate::collider::AABB;
use crate::error::{PhysicsError, Result};
use crate::fixed::Fix64;
use crate::math::Vec3Fix;
use crate::raycast::{ray_triangle, ShapeHit};

/// A single triangle (counter-clockwise winding seen from the front)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Triangle {
    pub v0: Vec3Fix,
    pub v1: Vec3Fix,
    pub v2: Vec3Fix,
}

impl Triangle {
    #[inline]
    pub fn new(v0: Vec3Fix, v1: Vec3Fix, v2: Vec3Fix) -> Self {
        Self { v0, v1, v2 }
    }

    /// Vertices as an array
    #[inline]
    pub fn vertices(&self) -> [Vec3Fix; 3] {
        [self.v0, self.v1, self.v2]
    }

    /// Face normal (not normalized)
    #[inline]
    pub fn normal(&self) -> Vec3Fix {
        (self.v1 - self.v0).cross(self.v2 - self.v0)
    }

    /// Unit face normal
    #[inline]
    pub fn unit_normal(&self) -> Vec3Fix {
        self.normal().normalize()
    }

    /// AABB enclosing this triangle
    pub fn aabb(&self) -> AABB {
        AABB::new(
            self.v0.min(self.v1).min(self.v2),
            self.v0.max(self.v1).max(self.v2),
        )
    }

    /// Closest point on the triangle to `p` (Ericson's region test)
    pub fn closest_point(&self, p: Vec3Fix) -> Vec3Fix {
        let zero = Fix64::ZERO;
        let ab = self.v1 - self.v0;
        let ac = self.v2 - self.v0;
        let ap = p - self.v0;

        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= zero && d2 <= zero {
            return self.v0;
        }

        let bp = p - self.v1;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= zero && d4 <= d3 {
            return self.v1;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= zero && d1 >= zero && d3 <= zero {
            let v = d1 / (d1 - d3);
            return self.v0 + ab * v;
        }

        let cp = p - self.v2;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= zero && d5 <= d6 {
            return self.v2;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= zero && d2 >= zero && d6 <= zero {
            let w = d2 / (d2 - d6);
            return self.v0 + ac * w;
        }

        let va = d3 * d6 - d5 * d4;
        let d4_d3 = d4 - d3;
        let d5_d6 = d5 - d6;
        if va <= zero && d4_d3 >= zero && d5_d6 >= zero {
            let w = d4_d3 / (d4_d3 + d5_d6);
            return self.v1 + (self.v2 - self.v1) * w;
        }

        let denom = va + vb + vc;
        if denom.is_zero() {
            return self.v0;
        }
        self.v0 + ab * (vb / denom) + ac * (vc / denom)
    }
}

/// Static triangle mesh with BVH acceleration
#[derive(Clone, Debug)]
pub struct TriangleMesh {
    triangles: Vec<Triangle>,
    bvh: LinearBvh,
}

impl TriangleMesh {
    /// Build from vertices and triangle indices (three per triangle)
    pub fn new(vertices: &[Vec3Fix], indices: &[u32]) -> Result<Self> {
        if indices.is_empty() || indices.len() % 3 != 0 {
            return Err(PhysicsError::shape(format!(
                "triangle mesh needs a non-empty multiple of 3 indices, got {}",
                indices.len()
            )));
        }
        let mut triangles = Vec::with_capacity(indices.len() / 3);
        for (t, tri) in indices.chunks_exact(3).enumerate() {
            let mut v = [Vec3Fix::ZERO; 3];
            for (slot, &i) in v.iter_mut().zip(tri) {
                *slot = *vertices.get(i as usize).ok_or_else(|| {
                    PhysicsError::shape(format!(
                        "triangle {t} references vertex {i}, mesh has {}",
                        vertices.len()
                    ))
                })?;
            }
            triangles.push(Triangle::new(v[0], v[1], v[2]));
        }
        Self::from_triangles(triangles)
    }

    /// Build from raw triangles
    pub fn from_triangles(triangles: Vec<Triangle>) -> Result<Self> {
        if triangles.is_empty() {
            return Err(PhysicsError::shape("triangle mesh has no triangles"));
        }
        if let Some(t) = triangles.iter().position(|t| t.normal().is_zero()) {
            return Err(PhysicsError::shape(format!("triangle {t} is degenerate")));
        }
        let prims = triangles
            .iter()
            .enumerate()
            .map(|(i, tri)| BvhPrimitive::new(tri.aabb(), i as u32))
            .collect();
        Ok(Self {
            bvh: LinearBvh::build(prims),
            triangles,
        })
    }

    /// All triangles
    #[inline]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Triangle by index
    #[inline]
    pub fn triangle(&self, index: u32) -> Triangle {
        self.triangles[index as usize]
    }

    /// Number of triangles
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Local bounds
    #[inline]
    pub fn bounds(&self) -> AABB {
        self.bvh.bounds
    }

    /// Indices of triangles whose bounds overlap `aabb`, ascending
    pub fn triangles_in_aabb(&self, aabb: &AABB) -> Vec<u32> {
        self.bvh
            .query(aabb)
            .into_iter()
            .filter(|&i| self.triangles[i as usize].aabb().intersects(aabb))
            .collect()
    }

    /// Closest hit of a local-space ray (Möller–Trumbore per candidate)
    pub fn ray_cast(&self, origin: Vec3Fix, direction: Vec3Fix, max_t: Fix64) -> Option<ShapeHit> {
        let end = origin + direction * max_t;
        let segment = AABB::new(origin.min(end), origin.max(end));
        let mut best: Option<ShapeHit> = None;
        let mut best_t = max_t;
        for i in self.bvh.query(&segment) {
            let tri = &self.triangles[i as usize];
            if let Some(hit) = ray_triangle(origin, direction, tri, best_t) {
                // Strict improvement keeps the lowest index on ties
                if best.is_none() || hit.distance < best_t {
                    best_t = hit.distance;
                    best = Some(hit);
                }
            }
        }
        best
    }

    /// Closest point on the mesh within `max_distance` of `point`
    pub fn closest_point(&self, point: Vec3Fix, max_distance: Fix64) -> Option<(Vec3Fix, u32)> {
        let query = AABB::new(point, point).expanded(max_distance);
        let mut best: Option<(Vec3Fix, u32)> = None;
        let mut best_d = max_distance * max_distance;
        for i in self.bvh.query(&query) {
            let cp = self.triangles[i as usize].closest_point(point);
            let d = (cp - point).length_squared();
            if d <= best_d && best.map_or(true, |_| d < best_d) {
                best_d = d;
                best = Some((cp, i));
            }
        }
        best
    }
}
