//! Collision Shapes
//!
//! Closed set of shapes a body can carry.
//!
//! # Shape Kinds
//!
//! - [`ConvexShape`]: sphere, box, capsule, cylinder, cone, convex hull,
//!   Minkowski sum and transformed child. Every variant has a local support
//!   mapping, a local AABB and mass properties.
//! - [`CompoundShape`]: rigidly attached convex children.
//! - [`TriangleMesh`] and [`HeightField`]: immutable static geometry,
//!   shared through `Arc`.
//!
//! Capsules, cylinders and cones are aligned with the local Y axis. A cone's
//! origin sits on its centroid: the apex is at `+3h/4` and the base at `-h/4`.

use std::sync::Arc;

use crate::collider::{Support, AABB};
use crate::convex_hull::ConvexHull;
use crate::error::{PhysicsError, Result};
use crate::fixed::Fix64;
use crate::heightfield::HeightField;
use crate::mass_properties::{
    box_mass_properties, capsule_mass_properties, cone_mass_properties, cylinder_mass_properties,
    rotate_inertia, sphere_mass_properties, translate_inertia, MassProperties,
};
use crate::math::{Transform, Vec3Fix};
use crate::trimesh::TriangleMesh;

// ============================================================================
// Convex Shapes
// ============================================================================

/// Convex collision shape in its local frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConvexShape {
    /// Sphere centred at the origin
    Sphere { radius: Fix64 },
    /// Box `[-half_extents, half_extents]`
    Box { half_extents: Vec3Fix },
    /// Segment `[-half_length, half_length]` on Y, swept by `radius`
    Capsule { radius: Fix64, half_length: Fix64 },
    /// Cylinder on Y
    Cylinder { radius: Fix64, half_height: Fix64 },
    /// Cone on Y, origin at the centroid
    Cone { radius: Fix64, height: Fix64 },
    /// Validated convex hull
    ConvexHull(Arc<ConvexHull>),
    /// Minkowski sum of two convex shapes
    MinkowskiSum(Box<ConvexShape>, Box<ConvexShape>),
    /// A convex shape under a local transform
    Transformed {
        transform: Transform,
        shape: Box<ConvexShape>,
    },
}

fn positive(value: Fix64, what: &str) -> Result<()> {
    if value > Fix64::ZERO {
        Ok(())
    } else {
        Err(PhysicsError::shape(format!("{what} must be positive, got {value}")))
    }
}

impl ConvexShape {
    /// Validated sphere
    pub fn sphere(radius: Fix64) -> Result<Self> {
        let s = Self::Sphere { radius };
        s.validate()?;
        Ok(s)
    }

    /// Validated box from half extents
    pub fn cuboid(half_extents: Vec3Fix) -> Result<Self> {
        let s = Self::Box { half_extents };
        s.validate()?;
        Ok(s)
    }

    /// Validated capsule
    pub fn capsule(radius: Fix64, half_length: Fix64) -> Result<Self> {
        let s = Self::Capsule {
            radius,
            half_length,
        };
        s.validate()?;
        Ok(s)
    }

    /// Validated cylinder
    pub fn cylinder(radius: Fix64, half_height: Fix64) -> Result<Self> {
        let s = Self::Cylinder {
            radius,
            half_height,
        };
        s.validate()?;
        Ok(s)
    }

    /// Validated cone
    pub fn cone(radius: Fix64, height: Fix64) -> Result<Self> {
        let s = Self::Cone { radius, height };
        s.validate()?;
        Ok(s)
    }

    /// Hull of a point cloud (see [`ConvexHull::new`] for validation)
    pub fn convex_hull(points: &[Vec3Fix]) -> Result<Self> {
        Ok(Self::ConvexHull(Arc::new(ConvexHull::new(points)?)))
    }

    /// Minkowski sum `a ⊕ b`
    pub fn minkowski_sum(a: ConvexShape, b: ConvexShape) -> Result<Self> {
        let s = Self::MinkowskiSum(Box::new(a), Box::new(b));
        s.validate()?;
        Ok(s)
    }

    /// Child under a local transform
    pub fn transformed(shape: ConvexShape, transform: Transform) -> Result<Self> {
        let s = Self::Transformed {
            transform,
            shape: Box::new(shape),
        };
        s.validate()?;
        Ok(s)
    }

    /// Check every dimension is strictly positive
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Sphere { radius } => positive(*radius, "sphere radius"),
            Self::Box { half_extents } => {
                positive(half_extents.x, "box half extent x")?;
                positive(half_extents.y, "box half extent y")?;
                positive(half_extents.z, "box half extent z")
            }
            Self::Capsule {
                radius,
                half_length,
            } => {
                positive(*radius, "capsule radius")?;
                positive(*half_length, "capsule half length")
            }
            Self::Cylinder {
                radius,
                half_height,
            } => {
                positive(*radius, "cylinder radius")?;
                positive(*half_height, "cylinder half height")
            }
            Self::Cone { radius, height } => {
                positive(*radius, "cone radius")?;
                positive(*height, "cone height")
            }
            Self::ConvexHull(_) => Ok(()),
            Self::MinkowskiSum(a, b) => {
                a.validate()?;
                b.validate()
            }
            Self::Transformed { shape, .. } => shape.validate(),
        }
    }

    /// `true` for the sphere variant
    #[inline]
    pub fn is_sphere(&self) -> bool {
        matches!(self, Self::Sphere { .. })
    }

    /// Local bounding box
    pub fn local_aabb(&self) -> AABB {
        match self {
            Self::Sphere { radius } => AABB::from_center_half(Vec3Fix::ZERO, Vec3Fix::splat(*radius)),
            Self::Box { half_extents } => AABB::from_center_half(Vec3Fix::ZERO, *half_extents),
            Self::Capsule {
                radius,
                half_length,
            } => AABB::from_center_half(
                Vec3Fix::ZERO,
                Vec3Fix::new(*radius, *half_length + *radius, *radius),
            ),
            Self::Cylinder {
                radius,
                half_height,
            } => AABB::from_center_half(Vec3Fix::ZERO, Vec3Fix::new(*radius, *half_height, *radius)),
            Self::Cone { radius, height } => {
                let (apex, base) = cone_extent(*height);
                AABB::new(
                    Vec3Fix::new(-*radius, base, -*radius),
                    Vec3Fix::new(*radius, apex, *radius),
                )
            }
            Self::ConvexHull(hull) => hull.local_aabb(),
            Self::MinkowskiSum(a, b) => {
                let (a, b) = (a.local_aabb(), b.local_aabb());
                AABB::new(a.min + b.min, a.max + b.max)
            }
            Self::Transformed { transform, shape } => shape.local_aabb().transformed(transform),
        }
    }

    /// World bounding box under `transform`
    pub fn aabb(&self, transform: &Transform) -> AABB {
        match self {
            Self::Sphere { radius } => AABB::from_center_half(transform.position, Vec3Fix::splat(*radius)),
            _ => self.local_aabb().transformed(transform),
        }
    }

    /// Volume, centroid and inertia about the local origin
    pub fn mass_properties(&self, density: Fix64) -> MassProperties {
        match self {
            Self::Sphere { radius } => sphere_mass_properties(*radius, density),
            Self::Box { half_extents } => box_mass_properties(*half_extents, density),
            Self::Capsule {
                radius,
                half_length,
            } => capsule_mass_properties(*radius, *half_length, density),
            Self::Cylinder {
                radius,
                half_height,
            } => cylinder_mass_properties(*radius, *half_height, density),
            Self::Cone { radius, height } => cone_mass_properties(*radius, *height, density),
            Self::ConvexHull(hull) => hull.mass_properties(density),
            // Bounding-box approximation of the swept volume
            Self::MinkowskiSum(..) => box_mass_properties(self.local_aabb().half_extents(), density),
            Self::Transformed { transform, shape } => {
                let inner = shape.mass_properties(density);
                let rotated = MassProperties {
                    inertia_tensor: rotate_inertia(inner.inertia_tensor, transform.orientation.to_mat3()),
                    ..inner
                };
                let offset = transform.transform_point(inner.center_of_mass);
                MassProperties {
                    center_of_mass: offset,
                    inertia_tensor: translate_inertia(&rotated, offset),
                    ..rotated
                }
            }
        }
    }
}

/// `(apex_y, base_y)` of a centroid-centred cone
#[inline]
fn cone_extent(height: Fix64) -> (Fix64, Fix64) {
    (height * Fix64::from_ratio(3, 4), -(height * Fix64::from_ratio(1, 4)))
}

/// `sign(d) * v`, ties toward positive
#[inline]
fn signed(d: Fix64, v: Fix64) -> Fix64 {
    if d >= Fix64::ZERO {
        v
    } else {
        -v
    }
}

impl Support for ConvexShape {
    fn support(&self, d: Vec3Fix) -> Vec3Fix {
        match self {
            Self::Sphere { radius } => d.normalize() * *radius,
            Self::Box { half_extents: h } => Vec3Fix::new(signed(d.x, h.x), signed(d.y, h.y), signed(d.z, h.z)),
            Self::Capsule {
                radius,
                half_length,
            } => Vec3Fix::new(Fix64::ZERO, signed(d.y, *half_length), Fix64::ZERO) + d.normalize() * *radius,
            Self::Cylinder {
                radius,
                half_height,
            } => {
                let radial = Vec3Fix::new(d.x, Fix64::ZERO, d.z).normalize() * *radius;
                Vec3Fix::new(radial.x, signed(d.y, *half_height), radial.z)
            }
            Self::Cone { radius, height } => {
                let (apex_y, base_y) = cone_extent(*height);
                let apex = Vec3Fix::new(Fix64::ZERO, apex_y, Fix64::ZERO);
                let radial = Vec3Fix::new(d.x, Fix64::ZERO, d.z).normalize() * *radius;
                let rim = Vec3Fix::new(radial.x, base_y, radial.z);
                if apex.dot(d) >= rim.dot(d) {
                    apex
                } else {
                    rim
                }
            }
            Self::ConvexHull(hull) => hull.support(d),
            Self::MinkowskiSum(a, b) => a.support(d) + b.support(d),
            Self::Transformed { transform, shape } => {
                transform.transform_point(shape.support(transform.inverse_transform_vector(d)))
            }
        }
    }

    fn center(&self) -> Vec3Fix {
        match self {
            Self::MinkowskiSum(a, b) => a.center() + b.center(),
            Self::Transformed { transform, shape } => transform.transform_point(shape.center()),
            _ => Vec3Fix::ZERO,
        }
    }
}

/// A convex shape placed in the world
#[derive(Clone, Copy, Debug)]
pub struct WorldConvex<'a> {
    /// Local shape
    pub shape: &'a ConvexShape,
    /// Local-to-world transform
    pub transform: Transform,
}

impl<'a> WorldConvex<'a> {
    #[inline]
    pub fn new(shape: &'a ConvexShape, transform: Transform) -> Self {
        Self { shape, transform }
    }
}

impl Support for WorldConvex<'_> {
    #[inline]
    fn support(&self, d: Vec3Fix) -> Vec3Fix {
        let local = self.transform.inverse_transform_vector(d);
        self.transform.transform_point(self.shape.support(local))
    }

    #[inline]
    fn center(&self) -> Vec3Fix {
        self.transform.transform_point(self.shape.center())
    }
}

// ============================================================================
// Compound
// ============================================================================

/// Rigid set of convex children, each with a local transform
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompoundShape {
    children: Vec<(Transform, ConvexShape)>,
}

impl CompoundShape {
    /// Build from children; fails when empty or any child is invalid
    pub fn new(children: Vec<(Transform, ConvexShape)>) -> Result<Self> {
        if children.is_empty() {
            return Err(PhysicsError::shape("compound shape has no children"));
        }
        for (_, child) in &children {
            child.validate()?;
        }
        Ok(Self { children })
    }

    /// Children in insertion order
    #[inline]
    pub fn children(&self) -> &[(Transform, ConvexShape)] {
        &self.children
    }

    /// Local bounding box
    pub fn local_aabb(&self) -> AABB {
        let mut iter = self.children.iter().map(|(t, c)| c.aabb(t));
        let first = iter.next().unwrap_or_default();
        iter.fold(first, |acc, b| acc.union(&b))
    }

    /// Sum of child mass properties about the compound origin
    pub fn mass_properties(&self, density: Fix64) -> MassProperties {
        self.children
            .iter()
            .map(|(t, c)| {
                ConvexShape::Transformed {
                    transform: *t,
                    shape: Box::new(c.clone()),
                }
                .mass_properties(density)
            })
            .fold(MassProperties::ZERO, |acc, m| acc.combine(&m))
    }
}

// ============================================================================
// Top-level Shape
// ============================================================================

/// Shape attached to a body
#[derive(Clone, Debug)]
pub enum Shape {
    /// Single convex shape
    Convex(ConvexShape),
    /// Several convex children
    Compound(CompoundShape),
    /// Static triangle mesh
    TriangleMesh(Arc<TriangleMesh>),
    /// Static terrain
    HeightField(Arc<HeightField>),
}

impl Shape {
    /// Validated sphere
    pub fn sphere(radius: Fix64) -> Result<Self> {
        ConvexShape::sphere(radius).map(Self::Convex)
    }

    /// Validated box from half extents
    pub fn cuboid(half_extents: Vec3Fix) -> Result<Self> {
        ConvexShape::cuboid(half_extents).map(Self::Convex)
    }

    /// Validated capsule
    pub fn capsule(radius: Fix64, half_length: Fix64) -> Result<Self> {
        ConvexShape::capsule(radius, half_length).map(Self::Convex)
    }

    /// Re-check dimensions of convex parts
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Convex(c) => c.validate(),
            Self::Compound(c) => c.children.iter().try_for_each(|(_, s)| s.validate()),
            Self::TriangleMesh(_) | Self::HeightField(_) => Ok(()),
        }
    }

    /// Meshes and terrain may only be attached to static bodies
    #[inline]
    pub fn is_static_only(&self) -> bool {
        matches!(self, Self::TriangleMesh(_) | Self::HeightField(_))
    }

    /// The convex shape, if this is one
    #[inline]
    pub fn as_convex(&self) -> Option<&ConvexShape> {
        match self {
            Self::Convex(c) => Some(c),
            _ => None,
        }
    }

    /// Local bounding box
    pub fn local_aabb(&self) -> AABB {
        match self {
            Self::Convex(c) => c.local_aabb(),
            Self::Compound(c) => c.local_aabb(),
            Self::TriangleMesh(m) => m.bounds(),
            Self::HeightField(h) => h.bounds(),
        }
    }

    /// World bounding box under `transform`
    pub fn aabb(&self, transform: &Transform) -> AABB {
        match self {
            Self::Convex(c) => c.aabb(transform),
            _ => self.local_aabb().transformed(transform),
        }
    }

    /// Mass properties; static-only geometry has none
    pub fn mass_properties(&self, density: Fix64) -> MassProperties {
        match self {
            Self::Convex(c) => c.mass_properties(density),
            Self::Compound(c) => c.mass_properties(density),
            Self::TriangleMesh(_) | Self::HeightField(_) => MassProperties::ZERO,
        }
    }
}

impl From<ConvexShape> for Shape {
    fn from(c: ConvexShape) -> Self {
        Self::Convex(c)
    }
}

impl From<CompoundShape> for Shape {
    fn from(c: CompoundShape) -> Self {
        Self::Compound(c)
    }
}

impl From<TriangleMesh> for Shape {
    fn from(m: TriangleMesh) -> Self {
        Self::TriangleMesh(Arc::new(m))
    }
}

impl From<HeightField> for Shape {
    fn from(h: HeightField) -> Self {
        Self::HeightField(Arc::new(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::QuatFix;

    #[test]
    fn test_box_support_exact() {
        let b = ConvexShape::cuboid(Vec3Fix::from_int(3, 2, 1)).expect("valid box");
        let s = b.support(Vec3Fix::UNIT_X);
        assert_eq!(s.x, Fix64::from_int(3), "Support along +X is exactly hx");
        // Zero components tie toward the positive side
        assert_eq!(s.y, Fix64::from_int(2));
        assert_eq!(s.z, Fix64::ONE);
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(ConvexShape::sphere(Fix64::ZERO).is_err());
        assert!(ConvexShape::cuboid(Vec3Fix::from_int(1, -1, 1)).is_err());
        assert!(ConvexShape::capsule(Fix64::ONE, Fix64::ZERO).is_err());
        let err = ConvexShape::cone(Fix64::NEG_ONE, Fix64::ONE).unwrap_err();
        assert!(err.to_string().contains("cone radius"), "{err}");
        assert!(CompoundShape::new(Vec::new()).is_err());
    }

    #[test]
    fn test_capsule_support() {
        let c = ConvexShape::capsule(Fix64::HALF, Fix64::ONE).expect("valid");
        let top = c.support(Vec3Fix::UNIT_Y);
        assert_eq!(top.y, Fix64::from_ratio(3, 2));
        let side = c.support(Vec3Fix::UNIT_X);
        assert_eq!(side.x, Fix64::HALF);
    }

    #[test]
    fn test_cone_support_and_aabb() {
        let c = ConvexShape::cone(Fix64::ONE, Fix64::from_int(4)).expect("valid");
        assert_eq!(c.support(Vec3Fix::UNIT_Y).y, Fix64::from_int(3), "Apex at 3h/4");
        assert_eq!(c.support(-Vec3Fix::UNIT_Y).y, Fix64::NEG_ONE, "Base at -h/4");
        let aabb = c.local_aabb();
        assert_eq!(aabb.max.y, Fix64::from_int(3));
        assert_eq!(aabb.min.y, Fix64::NEG_ONE);
    }

    #[test]
    fn test_cylinder_support() {
        let c = ConvexShape::cylinder(Fix64::TWO, Fix64::ONE).expect("valid");
        let s = c.support(Vec3Fix::from_int(1, -1, 0));
        assert_eq!(s, Vec3Fix::from_int(2, -1, 0));
    }

    #[test]
    fn test_minkowski_and_transformed() {
        let sphere = ConvexShape::sphere(Fix64::ONE).expect("valid");
        let cube = ConvexShape::cuboid(Vec3Fix::splat(Fix64::ONE)).expect("valid");
        let rounded = ConvexShape::minkowski_sum(cube.clone(), sphere).expect("valid");
        assert_eq!(rounded.support(Vec3Fix::UNIT_X).x, Fix64::TWO);

        let moved = ConvexShape::transformed(cube, Transform::from_position(Vec3Fix::from_int(5, 0, 0)))
            .expect("valid");
        assert_eq!(moved.support(Vec3Fix::UNIT_X).x, Fix64::from_int(6));
        assert_eq!(moved.local_aabb().min.x, Fix64::from_int(4));
    }

    #[test]
    fn test_world_aabb_rotated_box() {
        let b = Shape::cuboid(Vec3Fix::from_int(2, 1, 1)).expect("valid");
        let t = Transform::new(
            Vec3Fix::from_int(10, 0, 0),
            QuatFix::from_axis_angle(Vec3Fix::UNIT_Z, Fix64::HALF_PI),
        );
        let aabb = b.aabb(&t);
        // Long axis now along Y
        assert!((aabb.max.y - Fix64::TWO).abs() < Fix64::from_ratio(1, 1000));
        assert!((aabb.max.x - Fix64::from_int(11)).abs() < Fix64::from_ratio(1, 1000));
    }

    #[test]
    fn test_compound_mass_uses_parallel_axis() {
        let cube = ConvexShape::cuboid(Vec3Fix::splat(Fix64::HALF)).expect("valid");
        let compound = CompoundShape::new(vec![
            (Transform::from_position(Vec3Fix::from_int(-1, 0, 0)), cube.clone()),
            (Transform::from_position(Vec3Fix::from_int(1, 0, 0)), cube),
        ])
        .expect("valid");
        let mp = compound.mass_properties(Fix64::ONE);
        assert_eq!(mp.mass, Fix64::TWO);
        assert!(mp.center_of_mass.length() < Fix64::from_ratio(1, 1000));
        // Spinning about Y sweeps the children around: much larger than about X
        assert!(mp.inertia_tensor.col1.y > mp.inertia_tensor.col0.x.mul_int(4));
    }
}
