//! Mass Property Computation from Geometry
//!
//! Computes volume, center of mass, and inertia tensors for the collision
//! shapes using deterministic fixed-point arithmetic.
//!
//! # Supported Shapes
//!
//! - Sphere
//! - Box (axis-aligned half-extents)
//! - Capsule (cylinder + hemisphere caps, Y axis)
//! - Cylinder (Y axis)
//! - Cone (Y axis, origin at the centroid)
//! - Convex hull (exact tetrahedron decomposition over the hull faces)
//!
//! # Parallel Axis Theorem
//!
//! [`translate_inertia`] shifts an inertia tensor to a new reference point.
//! Compound shapes use it to express every child about the compound origin.

use crate::fixed::Fix64;
use crate::math::{Mat3Fix, Vec3Fix};

// ============================================================================
// Mass Properties
// ============================================================================

/// Mass, volume, center of mass, and inertia tensor of a shape at some density.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MassProperties {
    /// Total mass (`volume * density`)
    pub mass: Fix64,
    /// Enclosed volume
    pub volume: Fix64,
    /// Center of mass in local coordinates
    pub center_of_mass: Vec3Fix,
    /// Inertia tensor about the local origin
    pub inertia_tensor: Mat3Fix,
}

impl MassProperties {
    /// Zero mass properties
    pub const ZERO: Self = Self {
        mass: Fix64::ZERO,
        volume: Fix64::ZERO,
        center_of_mass: Vec3Fix::ZERO,
        inertia_tensor: Mat3Fix::ZERO,
    };

    /// Rescale to a target total mass, keeping the mass distribution
    #[must_use]
    pub fn with_mass(&self, mass: Fix64) -> Self {
        if self.mass.is_zero() {
            return Self { mass, ..*self };
        }
        let factor = mass / self.mass;
        Self {
            mass,
            volume: self.volume,
            center_of_mass: self.center_of_mass,
            inertia_tensor: self.inertia_tensor.scale(factor),
        }
    }

    /// Sum of two bodies of mass, both expressed about the same origin
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        let mass = self.mass + other.mass;
        let center_of_mass = if mass.is_zero() {
            Vec3Fix::ZERO
        } else {
            (self.center_of_mass * self.mass + other.center_of_mass * other.mass) / mass
        };
        Self {
            mass,
            volume: self.volume + other.volume,
            center_of_mass,
            inertia_tensor: self.inertia_tensor + other.inertia_tensor,
        }
    }
}

// ============================================================================
// Shape-specific mass property functions
// ============================================================================

#[inline]
fn sphere_volume(r: Fix64) -> Fix64 {
    Fix64::from_ratio(4, 3) * Fix64::PI * r * r * r
}

/// Solid sphere. Inertia: `I = 2/5 * m * r^2`.
#[must_use]
pub fn sphere_mass_properties(radius: Fix64, density: Fix64) -> MassProperties {
    let volume = sphere_volume(radius);
    let mass = volume * density;
    let i = Fix64::from_ratio(2, 5) * mass * radius * radius;
    MassProperties {
        mass,
        volume,
        center_of_mass: Vec3Fix::ZERO,
        inertia_tensor: Mat3Fix::diagonal(i, i, i),
    }
}

/// Box from half-extents. Inertia: `Ixx = m/12 * (h^2 + d^2)`, etc.
#[must_use]
pub fn box_mass_properties(half_extents: Vec3Fix, density: Fix64) -> MassProperties {
    let w = half_extents.x.double();
    let h = half_extents.y.double();
    let d = half_extents.z.double();

    let volume = w * h * d;
    let mass = volume * density;

    let (w2, h2, d2) = (w * w, h * h, d * d);
    let factor = mass.div_int(12);

    MassProperties {
        mass,
        volume,
        center_of_mass: Vec3Fix::ZERO,
        inertia_tensor: Mat3Fix::diagonal(factor * (h2 + d2), factor * (w2 + d2), factor * (w2 + h2)),
    }
}

/// Solid cylinder along Y.
#[must_use]
pub fn cylinder_mass_properties(radius: Fix64, half_height: Fix64, density: Fix64) -> MassProperties {
    let h = half_height.double();
    let r2 = radius * radius;

    let volume = Fix64::PI * r2 * h;
    let mass = volume * density;

    // Iyy = m r^2 / 2, Ixx = Izz = m/12 (3 r^2 + h^2)
    let iyy = (mass * r2).half();
    let ixx = mass.div_int(12) * (r2.mul_int(3) + h * h);

    MassProperties {
        mass,
        volume,
        center_of_mass: Vec3Fix::ZERO,
        inertia_tensor: Mat3Fix::diagonal(ixx, iyy, ixx),
    }
}

/// Capsule along Y: a cylinder of length `2 * half_length` plus two hemispheres.
#[must_use]
pub fn capsule_mass_properties(radius: Fix64, half_length: Fix64, density: Fix64) -> MassProperties {
    let r2 = radius * radius;
    let h = half_length.double();

    let cyl_vol = Fix64::PI * r2 * h;
    let cyl_mass = cyl_vol * density;
    let sph_vol = sphere_volume(radius);
    let sph_mass = sph_vol * density;

    let cyl_iyy = (cyl_mass * r2).half();
    let cyl_ixx = cyl_mass.div_int(12) * (r2.mul_int(3) + h * h);

    let sph_i_own = Fix64::from_ratio(2, 5) * sph_mass * r2;
    // Hemisphere centroids sit 3r/8 beyond each segment end
    let hemi_offset = half_length + Fix64::from_ratio(3, 8) * radius;
    let sph_ixx = sph_i_own + sph_mass * hemi_offset * hemi_offset;

    MassProperties {
        mass: cyl_mass + sph_mass,
        volume: cyl_vol + sph_vol,
        center_of_mass: Vec3Fix::ZERO,
        inertia_tensor: Mat3Fix::diagonal(cyl_ixx + sph_ixx, cyl_iyy + sph_i_own, cyl_ixx + sph_ixx),
    }
}

/// Solid cone along Y, measured about its centroid.
///
/// `Iyy = 3/10 m r^2`, `Ixx = Izz = 3/20 m r^2 + 3/80 m h^2`.
#[must_use]
pub fn cone_mass_properties(radius: Fix64, height: Fix64, density: Fix64) -> MassProperties {
    let r2 = radius * radius;
    let volume = (Fix64::PI * r2 * height).div_int(3);
    let mass = volume * density;
    let iyy = Fix64::from_ratio(3, 10) * mass * r2;
    let ixx = Fix64::from_ratio(3, 20) * mass * r2 + Fix64::from_ratio(3, 80) * mass * height * height;
    MassProperties {
        mass,
        volume,
        center_of_mass: Vec3Fix::ZERO,
        inertia_tensor: Mat3Fix::diagonal(ixx, iyy, ixx),
    }
}

/// Volume and centroid of a closed triangle surface (outward winding).
///
/// Tetrahedra are formed from `reference` to each face, so the result is
/// exact for any reference point; pick one near the surface to keep the
/// intermediate products small.
#[must_use]
pub fn surface_volume_centroid(
    vertices: &[Vec3Fix],
    faces: &[[u32; 3]],
    reference: Vec3Fix,
) -> (Fix64, Vec3Fix) {
    let mut volume = Fix64::ZERO;
    let mut weighted = Vec3Fix::ZERO;
    for f in faces {
        let a = vertices[f[0] as usize] - reference;
        let b = vertices[f[1] as usize] - reference;
        let c = vertices[f[2] as usize] - reference;
        let v = a.dot(b.cross(c)).div_int(6);
        volume += v;
        // Tetra centroid relative to reference is (a + b + c) / 4
        weighted += (a + b + c) * v.div_int(4);
    }
    if volume.is_zero() {
        return (Fix64::ZERO, reference);
    }
    (volume, reference + weighted / volume)
}

/// Mass properties of a closed convex surface, inertia about the local origin.
///
/// Each face contributes the canonical covariance of the tetrahedron
/// `(origin, a, b, c)`: `C = det/120 * (aaᵀ + bbᵀ + ccᵀ + ssᵀ)` with
/// `s = a + b + c`, and `I = tr(C)·E - C`.
#[must_use]
pub fn convex_hull_mass_properties(
    vertices: &[Vec3Fix],
    faces: &[[u32; 3]],
    density: Fix64,
) -> MassProperties {
    let (volume, center_of_mass) = surface_volume_centroid(vertices, faces, Vec3Fix::ZERO);
    if volume.is_zero() {
        return MassProperties::ZERO;
    }

    let mut cov = Mat3Fix::ZERO;
    for f in faces {
        let a = vertices[f[0] as usize];
        let b = vertices[f[1] as usize];
        let c = vertices[f[2] as usize];
        let det = a.dot(b.cross(c));
        let s = a + b + c;
        let sum = outer(a, a) + outer(b, b) + outer(c, c) + outer(s, s);
        cov = cov + sum.scale(det.div_int(120));
    }
    let cov = cov.scale(density);
    let trace = cov.col0.x + cov.col1.y + cov.col2.z;
    let inertia = Mat3Fix::diagonal(trace, trace, trace) - cov;

    MassProperties {
        mass: volume * density,
        volume,
        center_of_mass,
        inertia_tensor: inertia,
    }
}

#[inline]
fn outer(a: Vec3Fix, b: Vec3Fix) -> Mat3Fix {
    Mat3Fix::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Translate an inertia tensor by `offset` using the parallel axis theorem.
///
/// `I_new = I_cm + m * (d·d * E - d ⊗ d)`
#[must_use]
pub fn translate_inertia(props: &MassProperties, offset: Vec3Fix) -> Mat3Fix {
    let m = props.mass;
    let d2 = offset.dot(offset);
    let diag = Mat3Fix::diagonal(m * d2, m * d2, m * d2);
    props.inertia_tensor + diag - outer(offset, offset).scale(m)
}

/// Rotate an inertia tensor into another frame: `R I Rᵀ`.
#[must_use]
pub fn rotate_inertia(inertia: Mat3Fix, rotation: Mat3Fix) -> Mat3Fix {
    rotation * inertia * rotation.transpose()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Fix64, b: Fix64, epsilon: Fix64) -> bool {
        (a - b).abs() < epsilon
    }

    fn cube_faces() -> (Vec<Vec3Fix>, Vec<[u32; 3]>) {
        let h = Fix64::HALF;
        let mut v = Vec::new();
        for i in 0..8 {
            let x = if i & 1 == 0 { -h } else { h };
            let y = if i & 2 == 0 { -h } else { h };
            let z = if i & 4 == 0 { -h } else { h };
            v.push(Vec3Fix::new(x, y, z));
        }
        let faces = vec![
            [0, 2, 3], [0, 3, 1], // -z
            [4, 5, 7], [4, 7, 6], // +z
            [0, 1, 5], [0, 5, 4], // -y
            [2, 6, 7], [2, 7, 3], // +y
            [0, 4, 6], [0, 6, 2], // -x
            [1, 3, 7], [1, 7, 5], // +x
        ];
        (v, faces)
    }

    #[test]
    fn test_sphere_mass() {
        let props = sphere_mass_properties(Fix64::ONE, Fix64::ONE);
        assert!(props.mass > Fix64::from_int(4) && props.mass < Fix64::from_int(5));
        let i = props.inertia_tensor;
        assert_eq!(i.col0.x, i.col1.y);
        assert_eq!(i.col1.y, i.col2.z);
    }

    #[test]
    fn test_box_inertia_unit_cube() {
        let props = box_mass_properties(Vec3Fix::splat(Fix64::HALF), Fix64::ONE);
        assert_eq!(props.mass, Fix64::ONE);
        // I = m/6 for a unit cube
        assert!(approx_eq(props.inertia_tensor.col0.x, Fix64::from_ratio(1, 6), Fix64::from_ratio(1, 10000)));
    }

    #[test]
    fn test_pyramid_box_inertia() {
        // 2x2x2 box scaled to 20 kg: I = 20/12 * 8
        let props = box_mass_properties(Vec3Fix::splat(Fix64::ONE), Fix64::ONE).with_mass(Fix64::from_int(20));
        let expected = Fix64::from_ratio(160, 12);
        assert!(approx_eq(props.inertia_tensor.col1.y, expected, Fix64::from_ratio(1, 1000)));
    }

    #[test]
    fn test_capsule_heavier_than_sphere() {
        let cap = capsule_mass_properties(Fix64::ONE, Fix64::ONE, Fix64::ONE);
        let sph = sphere_mass_properties(Fix64::ONE, Fix64::ONE);
        assert!(cap.mass > sph.mass);
        assert!(cap.inertia_tensor.col0.x > cap.inertia_tensor.col1.y, "Long axis is easier to spin about");
    }

    #[test]
    fn test_cone_volume() {
        let props = cone_mass_properties(Fix64::ONE, Fix64::from_int(3), Fix64::ONE);
        assert!(approx_eq(props.volume, Fix64::PI, Fix64::from_ratio(1, 10000)));
    }

    #[test]
    fn test_hull_matches_box() {
        let (v, f) = cube_faces();
        let hull = convex_hull_mass_properties(&v, &f, Fix64::ONE);
        let boxed = box_mass_properties(Vec3Fix::splat(Fix64::HALF), Fix64::ONE);
        assert!(approx_eq(hull.volume, Fix64::ONE, Fix64::from_ratio(1, 10000)), "volume {}", hull.volume);
        assert!(hull.center_of_mass.length() < Fix64::from_ratio(1, 10000));
        let eps = Fix64::from_ratio(1, 1000);
        assert!(approx_eq(hull.inertia_tensor.col0.x, boxed.inertia_tensor.col0.x, eps));
        assert!(approx_eq(hull.inertia_tensor.col1.y, boxed.inertia_tensor.col1.y, eps));
        assert!(approx_eq(hull.inertia_tensor.col0.y, Fix64::ZERO, eps), "Off-diagonals vanish");
    }

    #[test]
    fn test_translate_inertia() {
        let props = sphere_mass_properties(Fix64::ONE, Fix64::ONE);
        let moved = translate_inertia(&props, Vec3Fix::from_int(2, 0, 0));
        // X axis passes through the offset: unchanged; Y gains m * 4
        assert_eq!(moved.col0.x, props.inertia_tensor.col0.x);
        assert!(approx_eq(
            moved.col1.y,
            props.inertia_tensor.col1.y + props.mass.mul_int(4),
            Fix64::from_ratio(1, 10000)
        ));
    }
}
