//! Deterministic Linear Algebra
//!
//! Vectors, quaternions and matrices built exclusively on [`Fix64`].
//!
//! # Conventions
//!
//! - Right-handed coordinates, +Y up
//! - Quaternions are stored `(x, y, z, w)` and compose with the Hamilton
//!   product: `a * b` applies `b` first, then `a`
//! - `rotate_vec(v)` computes `q · v · q*`
//! - Matrices are column-major (`col0`, `col1`, `col2`)
//!
//! # Precision
//!
//! `length` and `normalize` rescale the vector by a power of two before
//! squaring. Large vectors do not saturate and tiny vectors keep their
//! direction. Anything whose largest component is below
//! [`NORMALIZE_EPSILON`] normalizes to zero.

use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::fixed::Fix64;

/// Components at or below this magnitude are treated as a zero vector by `normalize`.
pub const NORMALIZE_EPSILON: Fix64 = Fix64::from_raw(16);

/// Power-of-two exponent that brings `max_raw` into [2^31, 2^32) (i.e. [0.5, 1)).
#[inline]
pub(crate) fn unit_scale_shift(max_raw: u64) -> i32 {
    max_raw.leading_zeros() as i32 - 32
}

// ============================================================================
// Vec2Fix
// ============================================================================

/// 2D vector (height-field cells, planar helpers).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vec2Fix {
    pub x: Fix64,
    pub y: Fix64,
}

impl Vec2Fix {
    /// Zero vector
    pub const ZERO: Self = Self::new(Fix64::ZERO, Fix64::ZERO);

    #[inline]
    pub const fn new(x: Fix64, y: Fix64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn from_int(x: i64, y: i64) -> Self {
        Self::new(Fix64::from_int(x), Fix64::from_int(y))
    }

    #[inline]
    pub fn dot(self, rhs: Self) -> Fix64 {
        self.x * rhs.x + self.y * rhs.y
    }

    /// z-component of the 3D cross product
    #[inline]
    pub fn perp_dot(self, rhs: Self) -> Fix64 {
        self.x * rhs.y - self.y * rhs.x
    }

    #[inline]
    pub fn length_squared(self) -> Fix64 {
        self.dot(self)
    }

    pub fn length(self) -> Fix64 {
        let m = self.x.raw().unsigned_abs().max(self.y.raw().unsigned_abs());
        if m == 0 {
            return Fix64::ZERO;
        }
        let shift = unit_scale_shift(m);
        let scaled = Self::new(self.x.shifted(shift), self.y.shifted(shift));
        scaled.length_squared().sqrt_sat().shifted(-shift)
    }

    pub fn normalize(self) -> Self {
        let m = self.x.raw().unsigned_abs().max(self.y.raw().unsigned_abs());
        if m <= NORMALIZE_EPSILON.raw() as u64 {
            return Self::ZERO;
        }
        let shift = unit_scale_shift(m);
        let scaled = Self::new(self.x.shifted(shift), self.y.shifted(shift));
        let len = scaled.length_squared().sqrt_sat();
        Self::new(scaled.x / len, scaled.y / len)
    }
}

impl Add for Vec2Fix {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2Fix {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<Fix64> for Vec2Fix {
    type Output = Self;
    #[inline]
    fn mul(self, s: Fix64) -> Self {
        Self::new(self.x * s, self.y * s)
    }
}

impl Neg for Vec2Fix {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

// ============================================================================
// Vec3Fix - 3D Vector with Fixed-Point Components
// ============================================================================

/// 3D vector using Fix64 components
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vec3Fix {
    pub x: Fix64,
    pub y: Fix64,
    pub z: Fix64,
}

impl Vec3Fix {
    /// Zero vector
    pub const ZERO: Self = Self::new(Fix64::ZERO, Fix64::ZERO, Fix64::ZERO);
    /// (1, 1, 1)
    pub const ONE: Self = Self::new(Fix64::ONE, Fix64::ONE, Fix64::ONE);
    /// Unit X
    pub const UNIT_X: Self = Self::new(Fix64::ONE, Fix64::ZERO, Fix64::ZERO);
    /// Unit Y
    pub const UNIT_Y: Self = Self::new(Fix64::ZERO, Fix64::ONE, Fix64::ZERO);
    /// Unit Z
    pub const UNIT_Z: Self = Self::new(Fix64::ZERO, Fix64::ZERO, Fix64::ONE);

    /// Create new vector
    #[inline]
    pub const fn new(x: Fix64, y: Fix64, z: Fix64) -> Self {
        Self { x, y, z }
    }

    /// Create from integers
    #[inline]
    pub const fn from_int(x: i64, y: i64, z: i64) -> Self {
        Self::new(Fix64::from_int(x), Fix64::from_int(y), Fix64::from_int(z))
    }

    /// All three components equal to `v`
    #[inline]
    pub const fn splat(v: Fix64) -> Self {
        Self::new(v, v, v)
    }

    /// Dot product
    #[inline]
    pub fn dot(self, rhs: Self) -> Fix64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Cross product
    #[inline]
    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    /// Squared length
    #[inline]
    pub fn length_squared(self) -> Fix64 {
        self.dot(self)
    }

    /// Largest component magnitude, in raw units
    #[inline]
    pub(crate) fn max_abs_raw(self) -> u64 {
        self.x
            .raw()
            .unsigned_abs()
            .max(self.y.raw().unsigned_abs())
            .max(self.z.raw().unsigned_abs())
    }

    /// Scale every component by `2^shift`
    #[inline]
    pub(crate) fn shifted(self, shift: i32) -> Self {
        Self::new(
            self.x.shifted(shift),
            self.y.shifted(shift),
            self.z.shifted(shift),
        )
    }

    /// Length (overflow-free for any representable vector)
    pub fn length(self) -> Fix64 {
        let m = self.max_abs_raw();
        if m == 0 {
            return Fix64::ZERO;
        }
        let shift = unit_scale_shift(m);
        self.shifted(shift)
            .length_squared()
            .sqrt_sat()
            .shifted(-shift)
    }

    /// Unit vector in the same direction, or zero below [`NORMALIZE_EPSILON`]
    pub fn normalize(self) -> Self {
        self.normalize_with_length().0
    }

    /// `(unit direction, length)`; below [`NORMALIZE_EPSILON`] the direction
    /// is zero and the length is still [`Vec3Fix::length`]
    pub fn normalize_with_length(self) -> (Self, Fix64) {
        let m = self.max_abs_raw();
        if m <= NORMALIZE_EPSILON.raw() as u64 {
            return (Self::ZERO, self.length());
        }
        let shift = unit_scale_shift(m);
        let scaled = self.shifted(shift);
        let len = scaled.length_squared().sqrt_sat();
        (scaled / len, len.shifted(-shift))
    }

    /// Distance between two points
    #[inline]
    pub fn distance(self, rhs: Self) -> Fix64 {
        (self - rhs).length()
    }

    /// Scale by scalar
    #[inline]
    pub fn scale(self, s: Fix64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    /// Component-wise product
    #[inline]
    pub fn mul_elem(self, rhs: Self) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }

    /// Component-wise minimum
    #[inline]
    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    /// Component-wise maximum
    #[inline]
    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    /// Component-wise absolute value
    #[inline]
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    /// Linear interpolation `self + (rhs - self) * t`
    #[inline]
    pub fn lerp(self, rhs: Self, t: Fix64) -> Self {
        self + (rhs - self) * t
    }

    /// `true` if every component is exactly zero
    #[inline]
    pub fn is_zero(self) -> bool {
        self.x.is_zero() && self.y.is_zero() && self.z.is_zero()
    }

    /// Component by axis index (0 = x, 1 = y, otherwise z)
    #[inline]
    pub fn axis(self, i: usize) -> Fix64 {
        match i {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Raw bits of each component
    #[inline]
    pub fn to_raw(self) -> [i64; 3] {
        [self.x.raw(), self.y.raw(), self.z.raw()]
    }

    /// Build from raw bits
    #[inline]
    pub const fn from_raw(raw: [i64; 3]) -> Self {
        Self::new(
            Fix64::from_raw(raw[0]),
            Fix64::from_raw(raw[1]),
            Fix64::from_raw(raw[2]),
        )
    }

    /// Two unit vectors completing an orthonormal basis with `self` (assumed unit)
    pub fn orthonormal_basis(self) -> (Self, Self) {
        // Pick the axis least aligned with self
        let helper = if self.x.abs() < Fix64::from_ratio(57, 100) {
            Self::UNIT_X
        } else {
            Self::UNIT_Y
        };
        let t1 = self.cross(helper).normalize();
        let t2 = self.cross(t1);
        (t1, t2)
    }
}

impl Add for Vec3Fix {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3Fix {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<Fix64> for Vec3Fix {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Fix64) -> Self {
        self.scale(rhs)
    }
}

impl Div<Fix64> for Vec3Fix {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Fix64) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vec3Fix {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl AddAssign for Vec3Fix {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Vec3Fix {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

// ============================================================================
// QuatFix - Quaternion with Fixed-Point Components
// ============================================================================

/// Quaternion using Fix64 components (for rotations)
///
/// Stored as (x, y, z, w) where w is the scalar part
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuatFix {
    pub x: Fix64,
    pub y: Fix64,
    pub z: Fix64,
    pub w: Fix64,
}

impl Default for QuatFix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl QuatFix {
    /// Identity quaternion (no rotation)
    pub const IDENTITY: Self = Self::new(Fix64::ZERO, Fix64::ZERO, Fix64::ZERO, Fix64::ONE);

    /// Create new quaternion
    #[inline]
    pub const fn new(x: Fix64, y: Fix64, z: Fix64, w: Fix64) -> Self {
        Self { x, y, z, w }
    }

    /// Create from axis-angle representation
    pub fn from_axis_angle(axis: Vec3Fix, angle: Fix64) -> Self {
        let (sin_ha, cos_ha) = angle.half().sin_cos();
        let axis = axis.normalize();
        Self::new(axis.x * sin_ha, axis.y * sin_ha, axis.z * sin_ha, cos_ha)
    }

    /// Hamilton product: the result applies `rhs` first, then `self`
    pub fn mul(self, rhs: Self) -> Self {
        Self {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }

    /// Conjugate (inverse for unit quaternions)
    #[inline]
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// 4D dot product
    #[inline]
    pub fn dot(self, rhs: Self) -> Fix64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z + self.w * rhs.w
    }

    /// Squared magnitude
    #[inline]
    pub fn length_squared(self) -> Fix64 {
        self.dot(self)
    }

    /// Magnitude
    #[inline]
    pub fn length(self) -> Fix64 {
        self.length_squared().sqrt_sat()
    }

    /// Normalize to unit quaternion (identity if degenerate)
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len <= NORMALIZE_EPSILON {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Vector part
    #[inline]
    pub fn xyz(self) -> Vec3Fix {
        Vec3Fix::new(self.x, self.y, self.z)
    }

    /// Rotate a vector by this quaternion
    ///
    /// Expanded form of `q · v · q*`: `v + 2w(u × v) + 2u × (u × v)`.
    pub fn rotate_vec(self, v: Vec3Fix) -> Vec3Fix {
        let u = self.xyz();
        let t = u.cross(v).scale(Fix64::TWO);
        v + t * self.w + u.cross(t)
    }

    /// Rotate by the inverse of this (unit) quaternion
    #[inline]
    pub fn inverse_rotate_vec(self, v: Vec3Fix) -> Vec3Fix {
        self.conjugate().rotate_vec(v)
    }

    /// Advance orientation by angular velocity `omega` over `dt`
    ///
    /// `q' = normalize(q + ½ (ω, 0) q dt)`
    pub fn integrate(self, omega: Vec3Fix, dt: Fix64) -> Self {
        let half_dt = dt.half();
        let spin = Self::new(omega.x, omega.y, omega.z, Fix64::ZERO).mul(self);
        Self::new(
            self.x + spin.x * half_dt,
            self.y + spin.y * half_dt,
            self.z + spin.z * half_dt,
            self.w + spin.w * half_dt,
        )
        .normalize()
    }

    /// Rotation matrix
    pub fn to_mat3(self) -> Mat3Fix {
        Mat3Fix::from_quat(self)
    }

    /// Raw bits `[x, y, z, w]`
    #[inline]
    pub fn to_raw(self) -> [i64; 4] {
        [self.x.raw(), self.y.raw(), self.z.raw(), self.w.raw()]
    }

    /// Build from raw bits `[x, y, z, w]`
    #[inline]
    pub const fn from_raw(raw: [i64; 4]) -> Self {
        Self::new(
            Fix64::from_raw(raw[0]),
            Fix64::from_raw(raw[1]),
            Fix64::from_raw(raw[2]),
            Fix64::from_raw(raw[3]),
        )
    }
}

impl Mul for QuatFix {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        QuatFix::mul(self, rhs)
    }
}

// ============================================================================
// 3x3 Matrix (Inertia Tensor, Rotation)
// ============================================================================

/// 3x3 Matrix for inertia tensors and rotations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mat3Fix {
    /// Column 0
    pub col0: Vec3Fix,
    /// Column 1
    pub col1: Vec3Fix,
    /// Column 2
    pub col2: Vec3Fix,
}

impl Mat3Fix {
    /// Identity matrix
    pub const IDENTITY: Self = Self::from_cols(Vec3Fix::UNIT_X, Vec3Fix::UNIT_Y, Vec3Fix::UNIT_Z);

    /// Zero matrix
    pub const ZERO: Self = Self::from_cols(Vec3Fix::ZERO, Vec3Fix::ZERO, Vec3Fix::ZERO);

    /// Create from columns
    #[inline]
    pub const fn from_cols(col0: Vec3Fix, col1: Vec3Fix, col2: Vec3Fix) -> Self {
        Self { col0, col1, col2 }
    }

    /// Create from rows
    #[inline]
    pub fn from_rows(r0: Vec3Fix, r1: Vec3Fix, r2: Vec3Fix) -> Self {
        Self::from_cols(r0, r1, r2).transpose()
    }

    /// Create diagonal matrix
    #[inline]
    pub fn diagonal(x: Fix64, y: Fix64, z: Fix64) -> Self {
        Self::from_cols(
            Vec3Fix::new(x, Fix64::ZERO, Fix64::ZERO),
            Vec3Fix::new(Fix64::ZERO, y, Fix64::ZERO),
            Vec3Fix::new(Fix64::ZERO, Fix64::ZERO, z),
        )
    }

    /// Diagonal entries
    #[inline]
    pub fn diagonal_vec(self) -> Vec3Fix {
        Vec3Fix::new(self.col0.x, self.col1.y, self.col2.z)
    }

    /// Rotation matrix of a unit quaternion
    pub fn from_quat(q: QuatFix) -> Self {
        let two = Fix64::TWO;
        let (x, y, z, w) = (q.x, q.y, q.z, q.w);
        let (xx, yy, zz) = (x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);
        Self::from_cols(
            Vec3Fix::new(
                Fix64::ONE - two * (yy + zz),
                two * (xy + wz),
                two * (xz - wy),
            ),
            Vec3Fix::new(
                two * (xy - wz),
                Fix64::ONE - two * (xx + zz),
                two * (yz + wx),
            ),
            Vec3Fix::new(
                two * (xz + wy),
                two * (yz - wx),
                Fix64::ONE - two * (xx + yy),
            ),
        )
    }

    /// Rotation about `axis` by `angle` radians
    #[inline]
    pub fn from_axis_angle(axis: Vec3Fix, angle: Fix64) -> Self {
        Self::from_quat(QuatFix::from_axis_angle(axis, angle))
    }

    /// Cross-product matrix: `skew(a) * b == a × b`
    pub fn skew(a: Vec3Fix) -> Self {
        let z = Fix64::ZERO;
        Self::from_cols(
            Vec3Fix::new(z, a.z, -a.y),
            Vec3Fix::new(-a.z, z, a.x),
            Vec3Fix::new(a.y, -a.x, z),
        )
    }

    /// Row `i` as a vector
    #[inline]
    pub fn row(self, i: usize) -> Vec3Fix {
        Vec3Fix::new(self.col0.axis(i), self.col1.axis(i), self.col2.axis(i))
    }

    /// Matrix-vector multiplication
    #[inline]
    pub fn mul_vec(self, v: Vec3Fix) -> Vec3Fix {
        Vec3Fix::new(
            self.col0.x * v.x + self.col1.x * v.y + self.col2.x * v.z,
            self.col0.y * v.x + self.col1.y * v.y + self.col2.y * v.z,
            self.col0.z * v.x + self.col1.z * v.y + self.col2.z * v.z,
        )
    }

    /// `transpose(self) * v`
    #[inline]
    pub fn mul_transpose_vec(self, v: Vec3Fix) -> Vec3Fix {
        Vec3Fix::new(self.col0.dot(v), self.col1.dot(v), self.col2.dot(v))
    }

    /// Transpose
    #[inline]
    pub fn transpose(self) -> Self {
        Self::from_cols(self.row(0), self.row(1), self.row(2))
    }

    /// Scale all elements
    #[inline]
    pub fn scale(self, s: Fix64) -> Self {
        Self::from_cols(self.col0.scale(s), self.col1.scale(s), self.col2.scale(s))
    }

    /// Element-wise absolute value
    #[inline]
    pub fn abs(self) -> Self {
        Self::from_cols(self.col0.abs(), self.col1.abs(), self.col2.abs())
    }

    /// Determinant
    #[inline]
    pub fn determinant(self) -> Fix64 {
        self.col0.dot(self.col1.cross(self.col2))
    }

    /// Inverse, or `ZERO` if singular
    pub fn inverse(self) -> Self {
        let det = self.determinant();
        if det.is_zero() {
            return Self::ZERO;
        }
        // Rows of the inverse are the cross products of the columns
        let r0 = self.col1.cross(self.col2) / det;
        let r1 = self.col2.cross(self.col0) / det;
        let r2 = self.col0.cross(self.col1) / det;
        Self::from_rows(r0, r1, r2)
    }

    /// Inverse of a symmetric positive semi-definite matrix
    ///
    /// Falls back to inverting only the non-zero diagonal entries when the
    /// determinant underflows (e.g. joints attached to static bodies along a
    /// constrained axis).
    pub fn inverse_spd(self) -> Self {
        let det = self.determinant();
        if !det.is_zero() {
            return self.inverse();
        }
        let d = self.diagonal_vec();
        let inv = |v: Fix64| {
            if v.is_zero() {
                Fix64::ZERO
            } else {
                Fix64::ONE / v
            }
        };
        Self::diagonal(inv(d.x), inv(d.y), inv(d.z))
    }

    /// `R * D * Rᵀ` for a diagonal `D`, e.g. local to world inertia
    pub fn rotate_diagonal(rotation: Self, diag: Vec3Fix) -> Self {
        let scaled = Self::from_cols(
            rotation.col0 * diag.x,
            rotation.col1 * diag.y,
            rotation.col2 * diag.z,
        );
        scaled * rotation.transpose()
    }
}

impl Mul<Mat3Fix> for Mat3Fix {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::from_cols(
            self.mul_vec(rhs.col0),
            self.mul_vec(rhs.col1),
            self.mul_vec(rhs.col2),
        )
    }
}

impl Add for Mat3Fix {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::from_cols(self.col0 + rhs.col0, self.col1 + rhs.col1, self.col2 + rhs.col2)
    }
}

impl Sub for Mat3Fix {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::from_cols(self.col0 - rhs.col0, self.col1 - rhs.col1, self.col2 - rhs.col2)
    }
}

// ============================================================================
// 4x4 Matrix (Homogeneous Transform)
// ============================================================================

/// 4x4 column-major matrix for homogeneous transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mat4Fix {
    /// Columns, each `[x, y, z, w]`
    pub cols: [[Fix64; 4]; 4],
}

impl Default for Mat4Fix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4Fix {
    /// Identity
    pub const IDENTITY: Self = {
        let o = Fix64::ONE;
        let z = Fix64::ZERO;
        Self {
            cols: [[o, z, z, z], [z, o, z, z], [z, z, o, z], [z, z, z, o]],
        }
    };

    /// Rotation followed by translation
    pub fn from_rotation_translation(rotation: QuatFix, translation: Vec3Fix) -> Self {
        let m = rotation.to_mat3();
        let z = Fix64::ZERO;
        Self {
            cols: [
                [m.col0.x, m.col0.y, m.col0.z, z],
                [m.col1.x, m.col1.y, m.col1.z, z],
                [m.col2.x, m.col2.y, m.col2.z, z],
                [translation.x, translation.y, translation.z, Fix64::ONE],
            ],
        }
    }

    /// Matrix form of a rigid transform
    #[inline]
    pub fn from_transform(t: &Transform) -> Self {
        Self::from_rotation_translation(t.orientation, t.position)
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> Fix64 {
        self.cols[col][row]
    }

    /// Transform a point (w = 1)
    pub fn transform_point(&self, p: Vec3Fix) -> Vec3Fix {
        let v = [p.x, p.y, p.z, Fix64::ONE];
        let row = |r: usize| (0..4).map(|c| self.get(r, c) * v[c]).sum::<Fix64>();
        Vec3Fix::new(row(0), row(1), row(2))
    }

    /// Transform a direction (w = 0)
    pub fn transform_vector(&self, d: Vec3Fix) -> Vec3Fix {
        let v = [d.x, d.y, d.z];
        let row = |r: usize| (0..3).map(|c| self.get(r, c) * v[c]).sum::<Fix64>();
        Vec3Fix::new(row(0), row(1), row(2))
    }

    /// Transpose
    pub fn transpose(&self) -> Self {
        let mut cols = [[Fix64::ZERO; 4]; 4];
        for (c, col) in cols.iter_mut().enumerate() {
            for (r, value) in col.iter_mut().enumerate() {
                *value = self.get(c, r);
            }
        }
        Self { cols }
    }
}

impl Mul for Mat4Fix {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut cols = [[Fix64::ZERO; 4]; 4];
        for (c, col) in cols.iter_mut().enumerate() {
            for (r, value) in col.iter_mut().enumerate() {
                *value = (0..4).map(|k| self.get(r, k) * rhs.get(k, c)).sum();
            }
        }
        Self { cols }
    }
}

// ============================================================================
// Transform (rigid: rotation then translation)
// ============================================================================

/// Rigid transform: `world = position + orientation · local`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation
    pub position: Vec3Fix,
    /// Rotation
    pub orientation: QuatFix,
}

impl Transform {
    /// No rotation, no translation
    pub const IDENTITY: Self = Self {
        position: Vec3Fix::ZERO,
        orientation: QuatFix::IDENTITY,
    };

    #[inline]
    pub const fn new(position: Vec3Fix, orientation: QuatFix) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Pure translation
    #[inline]
    pub const fn from_position(position: Vec3Fix) -> Self {
        Self::new(position, QuatFix::IDENTITY)
    }

    /// Local point to world
    #[inline]
    pub fn transform_point(&self, p: Vec3Fix) -> Vec3Fix {
        self.position + self.orientation.rotate_vec(p)
    }

    /// World point to local
    #[inline]
    pub fn inverse_transform_point(&self, p: Vec3Fix) -> Vec3Fix {
        self.orientation.inverse_rotate_vec(p - self.position)
    }

    /// Local direction to world
    #[inline]
    pub fn transform_vector(&self, v: Vec3Fix) -> Vec3Fix {
        self.orientation.rotate_vec(v)
    }

    /// World direction to local
    #[inline]
    pub fn inverse_transform_vector(&self, v: Vec3Fix) -> Vec3Fix {
        self.orientation.inverse_rotate_vec(v)
    }

    /// `self ∘ inner`: apply `inner` first, then `self`
    pub fn compose(&self, inner: &Transform) -> Transform {
        Transform {
            position: self.transform_point(inner.position),
            orientation: self.orientation.mul(inner.orientation).normalize(),
        }
    }

    /// Inverse transform
    pub fn inverse(&self) -> Transform {
        let inv_rot = self.orientation.conjugate();
        Transform {
            position: -inv_rot.rotate_vec(self.position),
            orientation: inv_rot,
        }
    }

    /// Homogeneous matrix
    #[inline]
    pub fn to_mat4(&self) -> Mat4Fix {
        Mat4Fix::from_transform(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Fix64, b: Fix64, tol_raw: i64) -> bool {
        (a - b).abs().raw() <= tol_raw
    }

    fn vec_close(a: Vec3Fix, b: Vec3Fix, tol_raw: i64) -> bool {
        close(a.x, b.x, tol_raw) && close(a.y, b.y, tol_raw) && close(a.z, b.z, tol_raw)
    }

    #[test]
    fn test_vec3_dot() {
        let a = Vec3Fix::from_int(1, 2, 3);
        let b = Vec3Fix::from_int(4, 5, 6);
        assert_eq!(a.dot(b), Fix64::from_int(32));
    }

    #[test]
    fn test_vec3_cross() {
        let cross = Vec3Fix::UNIT_X.cross(Vec3Fix::UNIT_Y);
        assert_eq!(cross, Vec3Fix::UNIT_Z, "X × Y must be Z (right-handed)");
    }

    #[test]
    fn test_length_large_and_tiny() {
        // 3-4-5 triangle far beyond the squared-range limit
        let big = Vec3Fix::from_int(300_000, 400_000, 0);
        assert_eq!(big.length(), Fix64::from_int(500_000));

        let tiny = Vec3Fix::new(Fix64::from_raw(300), Fix64::from_raw(400), Fix64::ZERO);
        assert!(close(tiny.length(), Fix64::from_raw(500), 1));
        let n = tiny.normalize();
        assert!(close(n.x, Fix64::from_ratio(3, 5), 4));
        assert!(close(n.y, Fix64::from_ratio(4, 5), 4));
    }

    #[test]
    fn test_normalize_below_epsilon_is_zero() {
        let v = Vec3Fix::new(Fix64::from_raw(3), Fix64::from_raw(-2), Fix64::ZERO);
        assert_eq!(v.normalize(), Vec3Fix::ZERO);
        assert_eq!(Vec3Fix::ZERO.normalize(), Vec3Fix::ZERO);
    }

    #[test]
    fn test_normalize_with_length_below_epsilon_keeps_length() {
        let v = Vec3Fix::new(Fix64::from_raw(12), Fix64::ZERO, Fix64::ZERO);
        let (dir, len) = v.normalize_with_length();
        assert_eq!(dir, Vec3Fix::ZERO);
        assert_eq!(len, v.length(), "the length is reported even when the direction is dropped");
        assert_eq!(Vec3Fix::ZERO.normalize_with_length(), (Vec3Fix::ZERO, Fix64::ZERO));
    }

    #[test]
    fn test_quat_identity() {
        let v = Vec3Fix::from_int(1, 2, 3);
        assert_eq!(QuatFix::IDENTITY.rotate_vec(v), v);
    }

    #[test]
    fn test_quat_rotation_handedness() {
        // +90° about Y maps +X to -Z in a right-handed frame
        let q = QuatFix::from_axis_angle(Vec3Fix::UNIT_Y, Fix64::HALF_PI);
        let r = q.rotate_vec(Vec3Fix::UNIT_X);
        assert!(vec_close(r, -Vec3Fix::UNIT_Z, 64), "got {:?}", r);
    }

    #[test]
    fn test_quat_composition_order() {
        let a = QuatFix::from_axis_angle(Vec3Fix::UNIT_Z, Fix64::HALF_PI);
        let b = QuatFix::from_axis_angle(Vec3Fix::UNIT_X, Fix64::HALF_PI);
        let v = Vec3Fix::UNIT_Y;
        let composed = (a * b).rotate_vec(v);
        let sequential = a.rotate_vec(b.rotate_vec(v));
        assert!(vec_close(composed, sequential, 64));
    }

    #[test]
    fn test_quat_integrate_matches_axis_angle() {
        let omega = Vec3Fix::new(Fix64::ZERO, Fix64::ONE, Fix64::ZERO);
        let dt = Fix64::from_ratio(1, 60);
        let mut q = QuatFix::IDENTITY;
        for _ in 0..60 {
            q = q.integrate(omega, dt);
        }
        let expected = QuatFix::from_axis_angle(Vec3Fix::UNIT_Y, Fix64::ONE);
        assert!(close(q.w, expected.w, 1 << 20), "w {:?} vs {:?}", q.w, expected.w);
        assert!(close(q.y, expected.y, 1 << 20));
    }

    #[test]
    fn test_mat3_from_quat_matches_rotate() {
        let q = QuatFix::from_axis_angle(Vec3Fix::from_int(1, 2, 3), Fix64::from_ratio(7, 10));
        let v = Vec3Fix::from_int(4, -1, 2);
        assert!(vec_close(q.to_mat3().mul_vec(v), q.rotate_vec(v), 64));
    }

    #[test]
    fn test_mat3_inverse() {
        let m = Mat3Fix::from_rows(
            Vec3Fix::from_int(2, 0, 1),
            Vec3Fix::from_int(1, 3, 0),
            Vec3Fix::from_int(0, 1, 4),
        );
        let p = m * m.inverse();
        assert!(vec_close(p.col0, Vec3Fix::UNIT_X, 64));
        assert!(vec_close(p.col1, Vec3Fix::UNIT_Y, 64));
        assert!(vec_close(p.col2, Vec3Fix::UNIT_Z, 64));
        assert_eq!(Mat3Fix::ZERO.inverse(), Mat3Fix::ZERO);
    }

    #[test]
    fn test_skew_is_cross() {
        let a = Vec3Fix::from_int(1, -2, 3);
        let b = Vec3Fix::from_int(4, 5, -6);
        assert_eq!(Mat3Fix::skew(a).mul_vec(b), a.cross(b));
    }

    #[test]
    fn test_transform_round_trip() {
        let t = Transform::new(
            Vec3Fix::from_int(1, 2, 3),
            QuatFix::from_axis_angle(Vec3Fix::UNIT_Y, Fix64::from_ratio(1, 3)),
        );
        let p = Vec3Fix::from_int(-5, 7, 2);
        let back = t.inverse_transform_point(t.transform_point(p));
        assert!(vec_close(back, p, 64));
        let via_inverse = t.inverse().transform_point(t.transform_point(p));
        assert!(vec_close(via_inverse, p, 64));
        let via_mat = t.to_mat4().transform_point(p);
        assert!(vec_close(via_mat, t.transform_point(p), 64));
    }

    #[test]
    fn test_orthonormal_basis() {
        let n = Vec3Fix::from_int(1, 1, 0).normalize();
        let (t1, t2) = n.orthonormal_basis();
        assert!(close(n.dot(t1), Fix64::ZERO, 64));
        assert!(close(n.dot(t2), Fix64::ZERO, 64));
        assert!(close(t1.dot(t2), Fix64::ZERO, 64));
        assert!(close(t1.length(), Fix64::ONE, 64));
    }
}
