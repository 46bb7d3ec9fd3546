//! Joint Constraints for Rigid Body Connections
//!
//! Velocity-level joints solved alongside contacts by the sequential
//! impulse solver, with Baumgarte stabilisation or spring softness.
//!
//! # Joint Types
//!
//! - **BallSocket**: anchors coincide, rotation free (3×3 point block)
//! - **Distance**: anchors keep a fixed distance
//! - **Hinge**: point block plus 2 angular rows, optional motor and limits
//! - **Weld**: point block plus 3 angular rows
//! - **DistanceSpring**: soft distance row driven by [`SpringSettings`]
//! - **AngularMotor**: drives the relative angular velocity, torque-limited
//!
//! Anchors and axes are given in each body's local frame. By default the two
//! connected bodies do not collide with each other.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::body::{BodyHandle, RigidBody};
use crate::error::{PhysicsError, Result};
use crate::fixed::Fix64;
use crate::math::{Mat3Fix, QuatFix, Vec3Fix};
use crate::solver::{reciprocal, relative_velocity, BodyMass, Velocity, BIAS_FACTOR, MAX_CORRECTION_VELOCITY};

/// Anchor separations below this leave the distance row without a direction
const MIN_AXIS_LENGTH: Fix64 = Fix64::from_ratio(1, 10_000);

// ============================================================================
// Handles and Settings
// ============================================================================

/// Joint handle, issued in insertion order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JointHandle(pub(crate) u32);

impl JointHandle {
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for JointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "joint#{}", self.0)
    }
}

/// Spring stiffness and damping for soft constraints
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpringSettings {
    /// Stiffness `k` (N/m)
    pub stiffness: Fix64,
    /// Damping `c` (N·s/m)
    pub damping: Fix64,
}

impl SpringSettings {
    pub fn new(stiffness: Fix64, damping: Fix64) -> Self {
        Self { stiffness, damping }
    }

    /// Error reduction and softness for a step of length `h`:
    /// `erp = h·k / (h·k + c)` and `γ = 1 / (h·(h·k + c))`.
    ///
    /// `None` when the spring has neither stiffness nor damping.
    pub fn coefficients(&self, h: Fix64) -> Option<(Fix64, Fix64)> {
        let hk = h * self.stiffness;
        let denom = hk + self.damping;
        if denom <= Fix64::ZERO {
            return None;
        }
        Some((hk / denom, reciprocal(h * denom)))
    }
}

/// Velocity motor on a hinge axis
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HingeMotor {
    /// Target relative angular speed (rad/s)
    pub target_velocity: Fix64,
    /// Torque limit
    pub max_torque: Fix64,
}

/// Angle range of a hinge, in radians
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HingeLimits {
    pub lower: Fix64,
    pub upper: Fix64,
}

// ============================================================================
// Joint Definitions
// ============================================================================

/// Joint variant and its local-frame parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointKind {
    BallSocket {
        local_anchor_a: Vec3Fix,
        local_anchor_b: Vec3Fix,
    },
    Distance {
        local_anchor_a: Vec3Fix,
        local_anchor_b: Vec3Fix,
        rest_length: Fix64,
    },
    Hinge {
        local_anchor_a: Vec3Fix,
        local_anchor_b: Vec3Fix,
        local_axis_a: Vec3Fix,
        local_axis_b: Vec3Fix,
        limits: Option<HingeLimits>,
        motor: Option<HingeMotor>,
    },
    Weld {
        local_anchor_a: Vec3Fix,
        local_anchor_b: Vec3Fix,
        /// `qA⁻¹·qB` to hold
        relative_orientation: QuatFix,
    },
    DistanceSpring {
        local_anchor_a: Vec3Fix,
        local_anchor_b: Vec3Fix,
        rest_length: Fix64,
        spring: SpringSettings,
    },
    AngularMotor {
        /// Target `ωB - ωA` in world space
        target_velocity: Vec3Fix,
        max_torque: Fix64,
    },
}

/// Accumulated joint impulses, kept across steps for warm starting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointImpulse {
    pub point: Vec3Fix,
    pub axial: Fix64,
    pub angular: Vec3Fix,
    pub motor: Fix64,
    pub lower: Fix64,
    pub upper: Fix64,
}

/// A joint between two bodies
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joint {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub kind: JointKind,
    /// Whether the connected bodies still collide with each other
    pub collide_connected: bool,
    #[serde(default)]
    pub(crate) impulse: JointImpulse,
}

impl Joint {
    fn new(body_a: BodyHandle, body_b: BodyHandle, kind: JointKind) -> Self {
        Self {
            body_a,
            body_b,
            kind,
            collide_connected: false,
            impulse: JointImpulse::default(),
        }
    }

    pub fn ball_socket(a: BodyHandle, b: BodyHandle, anchor_a: Vec3Fix, anchor_b: Vec3Fix) -> Self {
        Self::new(
            a,
            b,
            JointKind::BallSocket {
                local_anchor_a: anchor_a,
                local_anchor_b: anchor_b,
            },
        )
    }

    pub fn distance(a: BodyHandle, b: BodyHandle, anchor_a: Vec3Fix, anchor_b: Vec3Fix, rest_length: Fix64) -> Self {
        Self::new(
            a,
            b,
            JointKind::Distance {
                local_anchor_a: anchor_a,
                local_anchor_b: anchor_b,
                rest_length,
            },
        )
    }

    /// Hinge about `axis_a` (A's frame) / `axis_b` (B's frame). The angle is
    /// zero when the first basis vectors perpendicular to both axes align.
    pub fn hinge(
        a: BodyHandle,
        b: BodyHandle,
        anchor_a: Vec3Fix,
        anchor_b: Vec3Fix,
        axis_a: Vec3Fix,
        axis_b: Vec3Fix,
    ) -> Self {
        Self::new(
            a,
            b,
            JointKind::Hinge {
                local_anchor_a: anchor_a,
                local_anchor_b: anchor_b,
                local_axis_a: axis_a.normalize(),
                local_axis_b: axis_b.normalize(),
                limits: None,
                motor: None,
            },
        )
    }

    pub fn weld(
        a: BodyHandle,
        b: BodyHandle,
        anchor_a: Vec3Fix,
        anchor_b: Vec3Fix,
        relative_orientation: QuatFix,
    ) -> Self {
        Self::new(
            a,
            b,
            JointKind::Weld {
                local_anchor_a: anchor_a,
                local_anchor_b: anchor_b,
                relative_orientation: relative_orientation.normalize(),
            },
        )
    }

    pub fn distance_spring(
        a: BodyHandle,
        b: BodyHandle,
        anchor_a: Vec3Fix,
        anchor_b: Vec3Fix,
        rest_length: Fix64,
        spring: SpringSettings,
    ) -> Self {
        Self::new(
            a,
            b,
            JointKind::DistanceSpring {
                local_anchor_a: anchor_a,
                local_anchor_b: anchor_b,
                rest_length,
                spring,
            },
        )
    }

    pub fn angular_motor(a: BodyHandle, b: BodyHandle, target_velocity: Vec3Fix, max_torque: Fix64) -> Self {
        Self::new(
            a,
            b,
            JointKind::AngularMotor {
                target_velocity,
                max_torque,
            },
        )
    }

    /// Angle limits for a hinge (ignored by other kinds)
    pub fn with_limits(mut self, lower: Fix64, upper: Fix64) -> Self {
        if let JointKind::Hinge { limits, .. } = &mut self.kind {
            *limits = Some(HingeLimits { lower, upper });
        }
        self
    }

    /// Velocity motor for a hinge (ignored by other kinds)
    pub fn with_motor(mut self, target_velocity: Fix64, max_torque: Fix64) -> Self {
        if let JointKind::Hinge { motor, .. } = &mut self.kind {
            *motor = Some(HingeMotor {
                target_velocity,
                max_torque,
            });
        }
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }

    #[inline]
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.body_a, self.body_b)
    }

    /// Accumulated impulses from the last step
    #[inline]
    pub fn impulse(&self) -> &JointImpulse {
        &self.impulse
    }

    /// Reject joints that cannot be solved
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason| Err(PhysicsError::InvalidConstraint { reason });
        if self.body_a == self.body_b {
            return invalid("a joint needs two different bodies");
        }
        match &self.kind {
            JointKind::Distance { rest_length, .. } if rest_length.is_negative() => {
                invalid("rest length must not be negative")
            }
            JointKind::DistanceSpring {
                rest_length, spring, ..
            } => {
                if rest_length.is_negative() {
                    invalid("rest length must not be negative")
                } else if spring.stiffness.is_negative() || spring.damping.is_negative() {
                    invalid("spring stiffness and damping must not be negative")
                } else {
                    Ok(())
                }
            }
            JointKind::Hinge {
                local_axis_a,
                local_axis_b,
                limits,
                motor,
                ..
            } => {
                if local_axis_a.is_zero() || local_axis_b.is_zero() {
                    invalid("hinge axis must not be zero")
                } else if limits.map_or(false, |l| l.lower > l.upper) {
                    invalid("hinge lower limit exceeds upper limit")
                } else if motor.map_or(false, |m| m.max_torque.is_negative()) {
                    invalid("motor torque must not be negative")
                } else {
                    Ok(())
                }
            }
            JointKind::AngularMotor { max_torque, .. } if max_torque.is_negative() => {
                invalid("motor torque must not be negative")
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Prepared Constraint
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct PointBlock {
    ra: Vec3Fix,
    rb: Vec3Fix,
    /// Inverse of the 3×3 effective mass matrix
    mass: Mat3Fix,
    bias: Vec3Fix,
}

#[derive(Clone, Copy, Debug)]
struct AxialRow {
    ra: Vec3Fix,
    rb: Vec3Fix,
    axis: Vec3Fix,
    /// `1 / (k + γ)`
    mass: Fix64,
    bias: Fix64,
    gamma: Fix64,
}

#[derive(Clone, Copy, Debug)]
struct AngularRow {
    axis: Vec3Fix,
    mass: Fix64,
    bias: Fix64,
}

#[derive(Clone, Copy, Debug)]
struct AngularBlock {
    mass: Mat3Fix,
    bias: Vec3Fix,
}

#[derive(Clone, Copy, Debug)]
struct MotorRow {
    axis: Vec3Fix,
    mass: Fix64,
    target: Fix64,
    max_impulse: Fix64,
}

#[derive(Clone, Copy, Debug)]
struct LimitRows {
    axis: Vec3Fix,
    mass: Fix64,
    lower_bias: Fix64,
    upper_bias: Fix64,
}

#[derive(Clone, Copy, Debug)]
struct AngularMotorBlock {
    mass: Mat3Fix,
    target: Vec3Fix,
    max_impulse: Fix64,
}

/// A joint prepared for one step
#[derive(Clone, Debug)]
pub(crate) struct JointConstraint {
    pub handle: JointHandle,
    pub slot_a: usize,
    pub slot_b: usize,
    pub ma: BodyMass,
    pub mb: BodyMass,
    pub impulse: JointImpulse,
    motor: Option<MotorRow>,
    limits: Option<LimitRows>,
    hinge_rows: Option<[AngularRow; 2]>,
    weld: Option<AngularBlock>,
    angular_motor: Option<AngularMotorBlock>,
    point: Option<PointBlock>,
    axial: Option<AxialRow>,
}

/// Inverse of the point-to-point effective mass
fn point_mass(ma: &BodyMass, mb: &BodyMass, ra: Vec3Fix, rb: Vec3Fix) -> Mat3Fix {
    let sa = Mat3Fix::skew(ra);
    let sb = Mat3Fix::skew(rb);
    let k = Mat3Fix::IDENTITY.scale(ma.inv_mass + mb.inv_mass)
        - sa * ma.inv_inertia * sa
        - sb * mb.inv_inertia * sb;
    k.inverse_spd()
}

/// Baumgarte bias for a position error, capped like contacts
#[inline]
fn baumgarte(inv_dt: Fix64, error: Fix64) -> Fix64 {
    (BIAS_FACTOR * inv_dt * error).clamp(-MAX_CORRECTION_VELOCITY, MAX_CORRECTION_VELOCITY)
}

#[inline]
fn baumgarte_vec(inv_dt: Fix64, error: Vec3Fix) -> Vec3Fix {
    Vec3Fix::new(
        baumgarte(inv_dt, error.x),
        baumgarte(inv_dt, error.y),
        baumgarte(inv_dt, error.z),
    )
}

/// Relative hinge angle of B about `axis`
fn hinge_angle(a: &RigidBody, b: &RigidBody, local_axis_a: Vec3Fix, local_axis_b: Vec3Fix, axis: Vec3Fix) -> Fix64 {
    let ref_a = a.orientation.rotate_vec(local_axis_a.orthonormal_basis().0);
    let ref_b = b.orientation.rotate_vec(local_axis_b.orthonormal_basis().0);
    Fix64::atan2(ref_a.cross(ref_b).dot(axis), ref_a.dot(ref_b))
}

impl JointConstraint {
    /// Pre-step for `joint` between `a` (slot `slot_a`) and `b` (slot `slot_b`)
    pub fn prepare(
        handle: JointHandle,
        joint: &Joint,
        slot_a: usize,
        a: &RigidBody,
        slot_b: usize,
        b: &RigidBody,
        dt: Fix64,
    ) -> Self {
        let inv_dt = reciprocal(dt);
        let ma = BodyMass::of(a);
        let mb = BodyMass::of(b);
        let mut c = Self {
            handle,
            slot_a,
            slot_b,
            ma,
            mb,
            impulse: joint.impulse,
            motor: None,
            limits: None,
            hinge_rows: None,
            weld: None,
            angular_motor: None,
            point: None,
            axial: None,
        };

        let point_block = |anchor_a: Vec3Fix, anchor_b: Vec3Fix| {
            let ra = a.orientation.rotate_vec(anchor_a);
            let rb = b.orientation.rotate_vec(anchor_b);
            let error = (b.position + rb) - (a.position + ra);
            PointBlock {
                ra,
                rb,
                mass: point_mass(&ma, &mb, ra, rb),
                bias: baumgarte_vec(inv_dt, error),
            }
        };

        match &joint.kind {
            JointKind::BallSocket {
                local_anchor_a,
                local_anchor_b,
            } => {
                c.point = Some(point_block(*local_anchor_a, *local_anchor_b));
            }
            JointKind::Distance {
                local_anchor_a,
                local_anchor_b,
                rest_length,
            } => {
                c.axial = Self::axial_row(a, b, &ma, &mb, *local_anchor_a, *local_anchor_b, *rest_length, None, dt);
            }
            JointKind::DistanceSpring {
                local_anchor_a,
                local_anchor_b,
                rest_length,
                spring,
            } => {
                c.axial = spring.coefficients(dt).and_then(|soft| {
                    Self::axial_row(a, b, &ma, &mb, *local_anchor_a, *local_anchor_b, *rest_length, Some(soft), dt)
                });
            }
            JointKind::Hinge {
                local_anchor_a,
                local_anchor_b,
                local_axis_a,
                local_axis_b,
                limits,
                motor,
            } => {
                c.point = Some(point_block(*local_anchor_a, *local_anchor_b));
                let axis_a = a.orientation.rotate_vec(*local_axis_a);
                let axis_b = b.orientation.rotate_vec(*local_axis_b);
                let (b1, b2) = axis_a.orthonormal_basis();
                let row = |perp: Vec3Fix| {
                    let axis = axis_b.cross(perp);
                    AngularRow {
                        axis,
                        mass: reciprocal(ma.inv_angular(axis) + mb.inv_angular(axis)),
                        bias: baumgarte(inv_dt, axis_b.dot(perp)),
                    }
                };
                c.hinge_rows = Some([row(b1), row(b2)]);

                let axial_mass = reciprocal(ma.inv_angular(axis_a) + mb.inv_angular(axis_a));
                if let Some(m) = motor {
                    c.motor = Some(MotorRow {
                        axis: axis_a,
                        mass: axial_mass,
                        target: m.target_velocity,
                        max_impulse: m.max_torque * dt,
                    });
                } else {
                    c.impulse.motor = Fix64::ZERO;
                }
                if let Some(l) = limits {
                    let angle = hinge_angle(a, b, *local_axis_a, *local_axis_b, axis_a);
                    let bias = |error: Fix64| {
                        if error > Fix64::ZERO {
                            // Not yet at the stop: allow closing the gap this step
                            error * inv_dt
                        } else {
                            baumgarte(inv_dt, error)
                        }
                    };
                    c.limits = Some(LimitRows {
                        axis: axis_a,
                        mass: axial_mass,
                        lower_bias: bias(angle - l.lower),
                        upper_bias: bias(l.upper - angle),
                    });
                } else {
                    c.impulse.lower = Fix64::ZERO;
                    c.impulse.upper = Fix64::ZERO;
                }
            }
            JointKind::Weld {
                local_anchor_a,
                local_anchor_b,
                relative_orientation,
            } => {
                c.point = Some(point_block(*local_anchor_a, *local_anchor_b));
                // Rotation taking the target orientation of B to its actual one
                let target = a.orientation.mul(*relative_orientation);
                let mut error = b.orientation.mul(target.conjugate());
                if error.w.is_negative() {
                    error = QuatFix::new(-error.x, -error.y, -error.z, -error.w);
                }
                let k = ma.inv_inertia + mb.inv_inertia;
                c.weld = Some(AngularBlock {
                    mass: k.inverse_spd(),
                    bias: baumgarte_vec(inv_dt, error.xyz() * Fix64::TWO),
                });
            }
            JointKind::AngularMotor {
                target_velocity,
                max_torque,
            } => {
                let k = ma.inv_inertia + mb.inv_inertia;
                c.angular_motor = Some(AngularMotorBlock {
                    mass: k.inverse_spd(),
                    target: *target_velocity,
                    max_impulse: *max_torque * dt,
                });
            }
        }
        c
    }

    #[allow(clippy::too_many_arguments)]
    fn axial_row(
        a: &RigidBody,
        b: &RigidBody,
        ma: &BodyMass,
        mb: &BodyMass,
        anchor_a: Vec3Fix,
        anchor_b: Vec3Fix,
        rest_length: Fix64,
        soft: Option<(Fix64, Fix64)>,
        dt: Fix64,
    ) -> Option<AxialRow> {
        let inv_dt = reciprocal(dt);
        let ra = a.orientation.rotate_vec(anchor_a);
        let rb = b.orientation.rotate_vec(anchor_b);
        let (axis, length) = ((b.position + rb) - (a.position + ra)).normalize_with_length();
        if length < MIN_AXIS_LENGTH {
            return None;
        }
        let error = length - rest_length;
        let k = ma.inv_effective(ra, axis) + mb.inv_effective(rb, axis);
        let (bias, gamma) = match soft {
            Some((erp, gamma)) => (erp * inv_dt * error, gamma),
            None => (baumgarte(inv_dt, error), Fix64::ZERO),
        };
        Some(AxialRow {
            ra,
            rb,
            axis,
            mass: reciprocal(k + gamma),
            bias,
            gamma,
        })
    }

    pub fn warm_start(&self, va: &mut Velocity, vb: &mut Velocity) {
        let imp = &self.impulse;
        let mut angular = Vec3Fix::ZERO;
        if let Some(m) = &self.motor {
            angular += m.axis * imp.motor;
        }
        if let Some(l) = &self.limits {
            angular += l.axis * (imp.lower - imp.upper);
        }
        if let Some(rows) = &self.hinge_rows {
            angular += rows[0].axis * imp.angular.x + rows[1].axis * imp.angular.y;
        }
        if self.weld.is_some() || self.angular_motor.is_some() {
            angular += imp.angular;
        }
        self.ma.apply_angular(va, -angular);
        self.mb.apply_angular(vb, angular);

        if let Some(p) = &self.point {
            self.ma.apply(va, p.ra, -imp.point);
            self.mb.apply(vb, p.rb, imp.point);
        }
        if let Some(r) = &self.axial {
            let impulse = r.axis * imp.axial;
            self.ma.apply(va, r.ra, -impulse);
            self.mb.apply(vb, r.rb, impulse);
        }
    }

    /// Apply an angular impulse `+l` to B and `-l` to A
    #[inline]
    fn push_angular(&self, va: &mut Velocity, vb: &mut Velocity, l: Vec3Fix) {
        self.ma.apply_angular(va, -l);
        self.mb.apply_angular(vb, l);
    }

    pub fn solve(&mut self, va: &mut Velocity, vb: &mut Velocity) {
        if let Some(m) = self.motor {
            let cdot = (vb.angular - va.angular).dot(m.axis) - m.target;
            let lambda = -(m.mass * cdot);
            let accumulated = (self.impulse.motor + lambda).clamp(-m.max_impulse, m.max_impulse);
            let lambda = accumulated - self.impulse.motor;
            self.impulse.motor = accumulated;
            self.push_angular(va, vb, m.axis * lambda);
        }

        if let Some(l) = self.limits {
            let cdot = (vb.angular - va.angular).dot(l.axis);
            let lambda = -(l.mass * (cdot + l.lower_bias));
            let accumulated = (self.impulse.lower + lambda).max(Fix64::ZERO);
            let lambda = accumulated - self.impulse.lower;
            self.impulse.lower = accumulated;
            self.push_angular(va, vb, l.axis * lambda);

            let cdot = -(vb.angular - va.angular).dot(l.axis);
            let lambda = -(l.mass * (cdot + l.upper_bias));
            let accumulated = (self.impulse.upper + lambda).max(Fix64::ZERO);
            let lambda = accumulated - self.impulse.upper;
            self.impulse.upper = accumulated;
            self.push_angular(va, vb, -(l.axis * lambda));
        }

        if let Some(rows) = self.hinge_rows {
            for (k, row) in rows.iter().enumerate() {
                let cdot = (vb.angular - va.angular).dot(row.axis);
                let lambda = -(row.mass * (cdot + row.bias));
                if k == 0 {
                    self.impulse.angular.x += lambda;
                } else {
                    self.impulse.angular.y += lambda;
                }
                self.push_angular(va, vb, row.axis * lambda);
            }
        }

        if let Some(w) = self.weld {
            let cdot = vb.angular - va.angular;
            let lambda = -w.mass.mul_vec(cdot + w.bias);
            self.impulse.angular += lambda;
            self.push_angular(va, vb, lambda);
        }

        if let Some(m) = self.angular_motor {
            let cdot = vb.angular - va.angular - m.target;
            let lambda = -m.mass.mul_vec(cdot);
            let mut accumulated = self.impulse.angular + lambda;
            let (dir, magnitude) = accumulated.normalize_with_length();
            if magnitude > m.max_impulse {
                accumulated = dir * m.max_impulse;
            }
            let lambda = accumulated - self.impulse.angular;
            self.impulse.angular = accumulated;
            self.push_angular(va, vb, lambda);
        }

        if let Some(p) = self.point {
            let cdot = relative_velocity(va, vb, p.ra, p.rb);
            let lambda = -p.mass.mul_vec(cdot + p.bias);
            self.impulse.point += lambda;
            self.ma.apply(va, p.ra, -lambda);
            self.mb.apply(vb, p.rb, lambda);
        }

        if let Some(r) = self.axial {
            let cdot = relative_velocity(va, vb, r.ra, r.rb).dot(r.axis);
            let lambda = -(r.mass * (cdot + r.bias + r.gamma * self.impulse.axial));
            self.impulse.axial += lambda;
            let impulse = r.axis * lambda;
            self.ma.apply(va, r.ra, -impulse);
            self.mb.apply(vb, r.rb, impulse);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    fn handle(i: u32) -> BodyHandle {
        BodyHandle::new(i, 0)
    }

    fn ball(position: Vec3Fix) -> RigidBody {
        RigidBody::new_dynamic(position, Fix64::ONE).with_shape(Shape::sphere(Fix64::HALF).expect("valid sphere"))
    }

    /// Run `steps` of gravity + joint solve + integration on two bodies
    fn simulate(joint: &Joint, a: &mut RigidBody, b: &mut RigidBody, steps: usize) {
        let dt = Fix64::from_ratio(1, 60);
        let gravity = Vec3Fix::new(Fix64::ZERO, Fix64::from_ratio(-981, 100), Fix64::ZERO);
        let mut impulse = joint.impulse;
        for _ in 0..steps {
            for body in [&mut *a, &mut *b] {
                if body.is_dynamic() {
                    body.linear_velocity += gravity * dt;
                }
            }
            let mut j = joint.clone();
            j.impulse = impulse;
            let mut c = JointConstraint::prepare(JointHandle(0), &j, 0, a, 1, b, dt);
            let mut va = Velocity::of(a);
            let mut vb = Velocity::of(b);
            c.warm_start(&mut va, &mut vb);
            for _ in 0..10 {
                c.solve(&mut va, &mut vb);
            }
            impulse = c.impulse;
            for (body, v) in [(&mut *a, va), (&mut *b, vb)] {
                if body.is_dynamic() {
                    body.linear_velocity = v.linear;
                    body.angular_velocity = v.angular;
                    body.position += v.linear * dt;
                    body.orientation = body.orientation.integrate(v.angular, dt);
                    body.update_world_inertia();
                }
            }
        }
    }

    #[test]
    fn test_spring_coefficients() {
        let s = SpringSettings::new(Fix64::from_int(100), Fix64::ONE);
        let h = Fix64::from_ratio(1, 10);
        let (erp, gamma) = s.coefficients(h).expect("active spring");
        // h·k = 10, h·k + c = 11
        let tol = Fix64::from_ratio(1, 10_000);
        assert!((erp - Fix64::from_ratio(10, 11)).abs() < tol, "erp {erp}");
        assert!((gamma - Fix64::from_ratio(10, 11)).abs() < tol, "gamma {gamma}");
        assert!(SpringSettings::new(Fix64::ZERO, Fix64::ZERO).coefficients(h).is_none());
    }

    #[test]
    fn test_ball_socket_holds_pendulum() {
        let mut anchor = RigidBody::new_static(Vec3Fix::from_int(0, 10, 0));
        let mut bob = ball(Vec3Fix::from_int(2, 10, 0));
        let joint = Joint::ball_socket(handle(0), handle(1), Vec3Fix::ZERO, Vec3Fix::from_int(-2, 0, 0));
        simulate(&joint, &mut anchor, &mut bob, 60);
        let dist = (bob.position - anchor.position).length();
        let drift = (dist - Fix64::TWO).abs();
        assert!(drift < Fix64::from_ratio(5, 100), "rope length drift {drift}");
        assert!(bob.position.y < Fix64::from_int(10), "bob swung down");
    }

    #[test]
    fn test_distance_joint_keeps_length() {
        let mut anchor = RigidBody::new_static(Vec3Fix::ZERO);
        let mut bob = ball(Vec3Fix::from_int(0, -3, 0));
        bob.linear_velocity = Vec3Fix::from_int(4, 0, 0);
        let joint = Joint::distance(handle(0), handle(1), Vec3Fix::ZERO, Vec3Fix::ZERO, Fix64::from_int(3));
        simulate(&joint, &mut anchor, &mut bob, 60);
        let drift = (bob.position.length() - Fix64::from_int(3)).abs();
        assert!(drift < Fix64::from_ratio(5, 100), "distance drift {drift}");
    }

    #[test]
    fn test_weld_resists_gravity_torque() {
        let mut wall = RigidBody::new_static(Vec3Fix::ZERO);
        let mut beam = ball(Vec3Fix::from_int(1, 0, 0));
        let joint = Joint::weld(handle(0), handle(1), Vec3Fix::from_int(1, 0, 0), Vec3Fix::ZERO, QuatFix::IDENTITY);
        simulate(&joint, &mut wall, &mut beam, 60);
        let sag = beam.position.y.abs();
        assert!(sag < Fix64::from_ratio(5, 100), "weld sag {sag}");
        assert!(beam.orientation.w > Fix64::from_ratio(99, 100), "weld keeps orientation");
    }

    #[test]
    fn test_hinge_motor_spins() {
        let mut base = RigidBody::new_static(Vec3Fix::ZERO);
        let mut wheel = ball(Vec3Fix::ZERO);
        let joint = Joint::hinge(handle(0), handle(1), Vec3Fix::ZERO, Vec3Fix::ZERO, Vec3Fix::UNIT_Z, Vec3Fix::UNIT_Z)
            .with_motor(Fix64::TWO, Fix64::from_int(100));
        simulate(&joint, &mut base, &mut wheel, 30);
        let spin = wheel.angular_velocity.z;
        assert!((spin - Fix64::TWO).abs() < Fix64::from_ratio(1, 10), "motor speed {spin}");
        assert!(wheel.angular_velocity.x.abs() < Fix64::from_ratio(1, 10), "off-axis spin suppressed");
    }

    #[test]
    fn test_hinge_limit_stops_rotation() {
        let mut base = RigidBody::new_static(Vec3Fix::ZERO);
        let mut door = ball(Vec3Fix::ZERO);
        let quarter = Fix64::QUARTER_PI;
        let joint = Joint::hinge(handle(0), handle(1), Vec3Fix::ZERO, Vec3Fix::ZERO, Vec3Fix::UNIT_Y, Vec3Fix::UNIT_Y)
            .with_limits(-quarter, quarter)
            .with_motor(Fix64::from_int(3), Fix64::from_int(100));
        simulate(&joint, &mut base, &mut door, 120);
        let axis = Vec3Fix::UNIT_Y;
        let angle = hinge_angle(&base, &door, axis, axis, axis);
        assert!(angle < quarter + Fix64::from_ratio(5, 100), "angle {angle} past the upper limit");
        assert!(angle > quarter - Fix64::from_ratio(2, 10), "motor drove to the stop, angle {angle}");
    }

    #[test]
    fn test_distance_spring_oscillates_toward_rest() {
        let mut anchor = RigidBody::new_static(Vec3Fix::ZERO);
        let mut bob = ball(Vec3Fix::from_int(0, -1, 0));
        let spring = SpringSettings::new(Fix64::from_int(200), Fix64::from_int(5));
        let joint = Joint::distance_spring(handle(0), handle(1), Vec3Fix::ZERO, Vec3Fix::ZERO, Fix64::ONE, spring);
        simulate(&joint, &mut anchor, &mut bob, 240);
        // Static stretch under gravity: m·g / k ≈ 0.049
        let stretch = bob.position.length() - Fix64::ONE;
        assert!(stretch > Fix64::ZERO, "gravity stretches the spring");
        assert!(stretch < Fix64::from_ratio(15, 100), "spring holds, stretch {stretch}");
    }

    #[test]
    fn test_angular_motor_torque_limit() {
        let mut base = RigidBody::new_static(Vec3Fix::ZERO);
        let mut body = ball(Vec3Fix::ZERO);
        let target = Vec3Fix::from_int(0, 10, 0);
        let joint = Joint::angular_motor(handle(0), handle(1), target, Fix64::from_ratio(1, 100));
        simulate(&joint, &mut base, &mut body, 1);
        // Inertia 0.1, impulse ≤ 0.01/60: tiny speed-up
        assert!(body.angular_velocity.y > Fix64::ZERO);
        assert!(body.angular_velocity.y < Fix64::ONE, "torque-limited, got {}", body.angular_velocity.y);
    }

    #[test]
    fn test_validate() {
        let same = Joint::ball_socket(handle(1), handle(1), Vec3Fix::ZERO, Vec3Fix::ZERO);
        assert!(matches!(same.validate(), Err(PhysicsError::InvalidConstraint { .. })));
        let bad_limits = Joint::hinge(handle(0), handle(1), Vec3Fix::ZERO, Vec3Fix::ZERO, Vec3Fix::UNIT_Y, Vec3Fix::UNIT_Y)
            .with_limits(Fix64::ONE, Fix64::NEG_ONE);
        assert!(bad_limits.validate().is_err());
        let negative = Joint::distance(handle(0), handle(1), Vec3Fix::ZERO, Vec3Fix::ZERO, Fix64::NEG_ONE);
        assert!(negative.validate().is_err());
        let ok = Joint::distance(handle(0), handle(1), Vec3Fix::ZERO, Vec3Fix::ZERO, Fix64::ONE);
        assert!(ok.validate().is_ok());
    }
}
