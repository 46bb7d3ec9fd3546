//! Height Field Collision
//!
//! Grid-based terrain collider. Heights are stored row-major (Z-major):
//! `index = x + z * width`, starting at the local `origin` corner. Each grid
//! cell is split into two upward-facing triangles, which the narrow phase
//! and ray casts consume through [`HeightField::triangles_in_aabb`].

use crate::collider::AABB;
use crate::error::{PhysicsError, Result};
use crate::fixed::Fix64;
use crate::math::Vec3Fix;
use crate::raycast::{ray_triangle, ShapeHit};
use crate::trimesh::Triangle;

/// Immutable height field terrain
#[derive(Clone, Debug)]
pub struct HeightField {
    heights: Vec<Fix64>,
    width: u32,
    depth: u32,
    spacing: Fix64,
    origin: Vec3Fix,
    bounds: AABB,
}

impl HeightField {
    /// Create a height field from a grid of heights
    pub fn new(heights: Vec<Fix64>, width: u32, depth: u32, spacing: Fix64, origin: Vec3Fix) -> Result<Self> {
        if width < 2 || depth < 2 {
            return Err(PhysicsError::shape(format!(
                "height field grid must be at least 2x2, got {width}x{depth}"
            )));
        }
        let expected = width as usize * depth as usize;
        if heights.len() != expected {
            return Err(PhysicsError::shape(format!(
                "height field expects {expected} heights, got {}",
                heights.len()
            )));
        }
        if spacing <= Fix64::ZERO {
            return Err(PhysicsError::shape("height field spacing must be positive"));
        }

        let min_h = heights.iter().copied().min().unwrap_or_default();
        let max_h = heights.iter().copied().max().unwrap_or_default();
        let bounds = AABB::new(
            Vec3Fix::new(origin.x, origin.y + min_h, origin.z),
            Vec3Fix::new(
                origin.x + spacing.mul_int((width - 1) as i64),
                origin.y + max_h,
                origin.z + spacing.mul_int((depth - 1) as i64),
            ),
        );

        Ok(Self {
            heights,
            width,
            depth,
            spacing,
            origin,
            bounds,
        })
    }

    /// Flat height field at a given height
    pub fn flat(width: u32, depth: u32, spacing: Fix64, origin: Vec3Fix, height: Fix64) -> Result<Self> {
        let count = width as usize * depth as usize;
        Self::new(vec![height; count], width, depth, spacing, origin)
    }

    /// Grid width (columns along X)
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid depth (rows along Z)
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Distance between neighbouring samples
    #[inline]
    pub fn spacing(&self) -> Fix64 {
        self.spacing
    }

    /// Local bounds
    #[inline]
    pub fn bounds(&self) -> AABB {
        self.bounds
    }

    /// Height at grid coordinates (clamped to bounds)
    #[inline]
    pub fn get_height(&self, gx: u32, gz: u32) -> Fix64 {
        let gx = gx.min(self.width - 1);
        let gz = gz.min(self.depth - 1);
        self.heights[(gx + gz * self.width) as usize]
    }

    #[inline]
    fn vertex(&self, gx: u32, gz: u32) -> Vec3Fix {
        Vec3Fix::new(
            self.origin.x + self.spacing.mul_int(gx as i64),
            self.origin.y + self.get_height(gx, gz),
            self.origin.z + self.spacing.mul_int(gz as i64),
        )
    }

    /// Triangle `id` (two per cell: `id = 2 * (cx + cz * (width - 1)) + k`)
    pub fn triangle(&self, id: u32) -> Triangle {
        let cells_x = self.width - 1;
        let cell = id / 2;
        let (cx, cz) = (cell % cells_x, cell / cells_x);
        let p00 = self.vertex(cx, cz);
        let p10 = self.vertex(cx + 1, cz);
        let p01 = self.vertex(cx, cz + 1);
        if id % 2 == 0 {
            Triangle::new(p00, p01, p10)
        } else {
            Triangle::new(p10, p01, self.vertex(cx + 1, cz + 1))
        }
    }

    /// Cell range `[lo, hi]` covering a local coordinate interval
    fn cell_range(&self, lo: Fix64, hi: Fix64, origin: Fix64, cells: u32) -> Option<(u32, u32)> {
        let a = ((lo - origin) / self.spacing).floor().to_int();
        let b = ((hi - origin) / self.spacing).floor().to_int();
        let last = cells as i64 - 1;
        if b < 0 || a > last {
            return None;
        }
        Some((a.max(0) as u32, b.min(last) as u32))
    }

    /// Ids of triangles in cells overlapping `aabb`, ascending
    pub fn triangles_in_aabb(&self, aabb: &AABB) -> Vec<u32> {
        let mut out = Vec::new();
        if !self.bounds.intersects(aabb) {
            return out;
        }
        let Some((x0, x1)) = self.cell_range(aabb.min.x, aabb.max.x, self.origin.x, self.width - 1) else {
            return out;
        };
        let Some((z0, z1)) = self.cell_range(aabb.min.z, aabb.max.z, self.origin.z, self.depth - 1) else {
            return out;
        };
        for cz in z0..=z1 {
            for cx in x0..=x1 {
                let base = 2 * (cx + cz * (self.width - 1));
                for id in [base, base + 1] {
                    if self.triangle(id).aabb().intersects(aabb) {
                        out.push(id);
                    }
                }
            }
        }
        out
    }

    /// Bilinear height at local XZ (clamped to the grid)
    pub fn sample_height(&self, x: Fix64, z: Fix64) -> Fix64 {
        let gx = ((x - self.origin.x) / self.spacing).clamp(
            Fix64::ZERO,
            Fix64::from_int((self.width - 1) as i64),
        );
        let gz = ((z - self.origin.z) / self.spacing).clamp(
            Fix64::ZERO,
            Fix64::from_int((self.depth - 1) as i64),
        );
        let gx0 = (gx.to_int() as u32).min(self.width - 2);
        let gz0 = (gz.to_int() as u32).min(self.depth - 2);
        let fx = gx - Fix64::from_int(gx0 as i64);
        let fz = gz - Fix64::from_int(gz0 as i64);

        let h00 = self.get_height(gx0, gz0);
        let h10 = self.get_height(gx0 + 1, gz0);
        let h01 = self.get_height(gx0, gz0 + 1);
        let h11 = self.get_height(gx0 + 1, gz0 + 1);

        let h0 = h00 + (h10 - h00) * fx;
        let h1 = h01 + (h11 - h01) * fx;
        self.origin.y + h0 + (h1 - h0) * fz
    }

    /// Surface normal via central difference
    pub fn sample_normal(&self, x: Fix64, z: Fix64) -> Vec3Fix {
        let eps = self.spacing.half();
        let dx = self.sample_height(x + eps, z) - self.sample_height(x - eps, z);
        let dz = self.sample_height(x, z + eps) - self.sample_height(x, z - eps);
        Vec3Fix::new(-dx, self.spacing, -dz).normalize()
    }

    /// Height of a point above the terrain (negative below)
    #[inline]
    pub fn signed_distance(&self, point: Vec3Fix) -> Fix64 {
        point.y - self.sample_height(point.x, point.z)
    }

    /// Closest hit of a local-space ray
    pub fn ray_cast(&self, origin: Vec3Fix, direction: Vec3Fix, max_t: Fix64) -> Option<ShapeHit> {
        let end = origin + direction * max_t;
        let segment = AABB::new(origin.min(end), origin.max(end));
        let mut best: Option<ShapeHit> = None;
        let mut best_t = max_t;
        for id in self.triangles_in_aabb(&segment) {
            if let Some(hit) = ray_triangle(origin, direction, &self.triangle(id), best_t) {
                if best.is_none() || hit.distance < best_t {
                    best_t = hit.distance;
                    best = Some(hit);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slope() -> HeightField {
        // Heights increase with X
        let mut heights = Vec::new();
        for _z in 0..4 {
            for x in 0..4 {
                heights.push(Fix64::from_int(x));
            }
        }
        HeightField::new(heights, 4, 4, Fix64::ONE, Vec3Fix::ZERO).expect("valid grid")
    }

    #[test]
    fn test_validation() {
        assert!(HeightField::flat(1, 4, Fix64::ONE, Vec3Fix::ZERO, Fix64::ZERO).is_err());
        assert!(HeightField::new(vec![Fix64::ZERO; 5], 2, 2, Fix64::ONE, Vec3Fix::ZERO).is_err());
        let err = HeightField::flat(3, 3, Fix64::ZERO, Vec3Fix::ZERO, Fix64::ZERO).unwrap_err();
        assert!(err.to_string().contains("spacing"));
    }

    #[test]
    fn test_interpolation() {
        let hf = slope();
        assert_eq!(hf.sample_height(Fix64::ZERO, Fix64::ONE), Fix64::ZERO);
        assert_eq!(hf.sample_height(Fix64::from_ratio(5, 2), Fix64::ONE), Fix64::from_ratio(5, 2));
        // Clamped beyond the grid
        assert_eq!(hf.sample_height(Fix64::from_int(40), Fix64::ONE), Fix64::from_int(3));
    }

    #[test]
    fn test_triangles_face_up() {
        let hf = slope();
        for id in 0..(2 * 3 * 3) {
            assert!(hf.triangle(id).normal().y > Fix64::ZERO, "triangle {id} faces down");
        }
    }

    #[test]
    fn test_triangles_in_aabb() {
        let hf = HeightField::flat(10, 10, Fix64::ONE, Vec3Fix::ZERO, Fix64::ZERO).expect("flat");
        let q = AABB::new(
            Vec3Fix::new(Fix64::from_ratio(5, 2), Fix64::NEG_ONE, Fix64::from_ratio(5, 2)),
            Vec3Fix::new(Fix64::from_ratio(11, 4), Fix64::ONE, Fix64::from_ratio(11, 4)),
        );
        let ids = hf.triangles_in_aabb(&q);
        assert!(!ids.is_empty() && ids.len() <= 2, "one cell: {ids:?}");
        let above = AABB::new(Vec3Fix::from_int(2, 5, 2), Vec3Fix::from_int(3, 6, 3));
        assert!(hf.triangles_in_aabb(&above).is_empty());
    }

    #[test]
    fn test_ray_cast() {
        let hf = HeightField::flat(10, 10, Fix64::ONE, Vec3Fix::ZERO, Fix64::TWO).expect("flat");
        let hit = hf
            .ray_cast(Vec3Fix::from_int(4, 10, 5), -Vec3Fix::UNIT_Y, Fix64::from_int(50))
            .expect("hits terrain");
        assert_eq!(hit.distance, Fix64::from_int(8));
        assert_eq!(hit.normal, Vec3Fix::UNIT_Y);
    }

    #[test]
    fn test_normal_and_distance() {
        let hf = HeightField::flat(10, 10, Fix64::ONE, Vec3Fix::ZERO, Fix64::ZERO).expect("flat");
        assert_eq!(hf.sample_normal(Fix64::from_int(5), Fix64::from_int(5)), Vec3Fix::UNIT_Y);
        assert!(hf.signed_distance(Vec3Fix::from_int(5, 3, 5)) > Fix64::ZERO);
        assert!(hf.signed_distance(Vec3Fix::from_int(5, -2, 5)) < Fix64::ZERO);
        assert_eq!(hf.bounds().max.x, Fix64::from_int(9));
    }
}
