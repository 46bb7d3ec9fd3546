//! Sequential Impulse Solver - Batched Edition
//!
//! Velocity-level solver for contacts and joints with warm starting and a
//! fixed iteration budget.
//!
//! # Key Features
//!
//! - Baumgarte position correction with slop and a capped correction speed
//! - Speculative contacts: separated points only limit the approach speed
//! - Coulomb friction on two tangents, clamped to `±μ·λn`
//! - Restitution above [`RESTITUTION_VELOCITY_THRESHOLD`]
//! - **Constraint Batching**: greedy graph colouring into body-disjoint
//!   batches, always solved in colour order
//! - **Optional Parallelism**: with the `parallel` feature each batch is
//!   solved on the rayon pool and the velocity writes are applied in batch
//!   order, so results are bit-identical to the sequential build
//!
//! # Batching Strategy
//!
//! Constraints are coloured in the order they are handed in (joints in
//! insertion order, then contacts in pair order). Only dynamic bodies count
//! as conflicts: static and kinematic bodies are read but never written.

use crate::body::{BodySet, RigidBody};
use crate::contact_cache::{tangent_frame, ContactManifold};
use crate::fixed::Fix64;
use crate::joint::JointConstraint;
use crate::material::CombinedMaterial;
use crate::math::{Mat3Fix, Vec3Fix};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Fraction of the position error removed per step
pub const BIAS_FACTOR: Fix64 = Fix64::from_ratio(2, 10);

/// Penetration tolerated without correction
pub const PENETRATION_SLOP: Fix64 = Fix64::from_ratio(5, 1000);

/// Cap on the separating speed produced by position correction
pub const MAX_CORRECTION_VELOCITY: Fix64 = Fix64::from_int(2);

/// Closing speed above which restitution applies
pub const RESTITUTION_VELOCITY_THRESHOLD: Fix64 = Fix64::ONE;

// ============================================================================
// Body State
// ============================================================================

/// Linear and angular velocity of one body
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Velocity {
    pub linear: Vec3Fix,
    pub angular: Vec3Fix,
}

impl Velocity {
    #[inline]
    pub fn of(body: &RigidBody) -> Self {
        Self {
            linear: body.linear_velocity,
            angular: body.angular_velocity,
        }
    }

    /// Velocity of the point at offset `r` from the body origin
    #[inline]
    pub fn at(&self, r: Vec3Fix) -> Vec3Fix {
        self.linear + self.angular.cross(r)
    }
}

/// Relative velocity of B with respect to A at the given offsets
#[inline]
pub(crate) fn relative_velocity(va: &Velocity, vb: &Velocity, ra: Vec3Fix, rb: Vec3Fix) -> Vec3Fix {
    vb.at(rb) - va.at(ra)
}

/// Inverse mass and world inverse inertia as seen by the solver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BodyMass {
    pub inv_mass: Fix64,
    pub inv_inertia: Mat3Fix,
}

impl BodyMass {
    pub fn of(body: &RigidBody) -> Self {
        if body.is_dynamic() {
            Self {
                inv_mass: body.inverse_mass(),
                inv_inertia: body.inverse_inertia_world(),
            }
        } else {
            Self {
                inv_mass: Fix64::ZERO,
                inv_inertia: Mat3Fix::ZERO,
            }
        }
    }

    /// Whether impulses can change this body's velocity
    #[inline]
    pub fn is_movable(&self) -> bool {
        !self.inv_mass.is_zero()
    }

    /// Apply `impulse` at offset `r`
    #[inline]
    pub fn apply(&self, v: &mut Velocity, r: Vec3Fix, impulse: Vec3Fix) {
        v.linear += impulse * self.inv_mass;
        v.angular += self.inv_inertia.mul_vec(r.cross(impulse));
    }

    #[inline]
    pub fn apply_angular(&self, v: &mut Velocity, impulse: Vec3Fix) {
        v.angular += self.inv_inertia.mul_vec(impulse);
    }

    /// Inverse effective mass of a point row along `axis` at offset `r`
    #[inline]
    pub fn inv_effective(&self, r: Vec3Fix, axis: Vec3Fix) -> Fix64 {
        let rn = r.cross(axis);
        self.inv_mass + rn.dot(self.inv_inertia.mul_vec(rn))
    }

    /// Inverse effective mass of an angular row about `axis`
    #[inline]
    pub fn inv_angular(&self, axis: Vec3Fix) -> Fix64 {
        axis.dot(self.inv_inertia.mul_vec(axis))
    }
}

#[inline]
pub(crate) fn reciprocal(k: Fix64) -> Fix64 {
    if k > Fix64::ZERO {
        Fix64::ONE / k
    } else {
        Fix64::ZERO
    }
}

// ============================================================================
// Contact Constraint
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct ContactPoint {
    ra: Vec3Fix,
    rb: Vec3Fix,
    normal_mass: Fix64,
    tangent_mass: [Fix64; 2],
    /// Minimum separating normal velocity
    target: Fix64,
    normal_impulse: Fix64,
    tangent_impulse: [Fix64; 2],
}

/// Prepared contact manifold for one body pair
#[derive(Clone, Debug)]
pub(crate) struct ContactConstraint {
    /// Slot pair, used to store impulses back into the manifold
    pub key: (u32, u32),
    a: usize,
    b: usize,
    ma: BodyMass,
    mb: BodyMass,
    normal: Vec3Fix,
    tangents: [Vec3Fix; 2],
    friction: Fix64,
    points: Vec<ContactPoint>,
}

impl ContactConstraint {
    /// Pre-step: effective masses, bias and restitution targets
    pub fn prepare(
        key: (u32, u32),
        body_a: &RigidBody,
        body_b: &RigidBody,
        manifold: &ContactManifold,
        material: CombinedMaterial,
        inv_dt: Fix64,
    ) -> Self {
        let ma = BodyMass::of(body_a);
        let mb = BodyMass::of(body_b);
        let va = Velocity::of(body_a);
        let vb = Velocity::of(body_b);
        let normal = manifold.normal;
        let (t1, t2) = tangent_frame(normal);

        let points = manifold
            .points()
            .iter()
            .map(|p| {
                let ra = p.point - body_a.position;
                let rb = p.point - body_b.position;
                let normal_mass = reciprocal(ma.inv_effective(ra, normal) + mb.inv_effective(rb, normal));
                let tangent_mass = [
                    reciprocal(ma.inv_effective(ra, t1) + mb.inv_effective(rb, t1)),
                    reciprocal(ma.inv_effective(ra, t2) + mb.inv_effective(rb, t2)),
                ];

                let mut target = if p.depth > Fix64::ZERO {
                    let correction = (p.depth - PENETRATION_SLOP).max(Fix64::ZERO);
                    (BIAS_FACTOR * inv_dt * correction).min(MAX_CORRECTION_VELOCITY)
                } else {
                    // Speculative: may close the remaining gap this step
                    p.depth * inv_dt
                };
                let vn = relative_velocity(&va, &vb, ra, rb).dot(normal);
                if vn < -RESTITUTION_VELOCITY_THRESHOLD && material.restitution > Fix64::ZERO {
                    target = target.max(-(material.restitution * vn));
                }

                ContactPoint {
                    ra,
                    rb,
                    normal_mass,
                    tangent_mass,
                    target,
                    normal_impulse: p.normal_impulse,
                    tangent_impulse: p.tangent_impulse,
                }
            })
            .collect();

        Self {
            key,
            a: key.0 as usize,
            b: key.1 as usize,
            ma,
            mb,
            normal,
            tangents: [t1, t2],
            friction: material.friction,
            points,
        }
    }

    fn warm_start(&self, va: &mut Velocity, vb: &mut Velocity) {
        for p in &self.points {
            let impulse = self.normal * p.normal_impulse
                + self.tangents[0] * p.tangent_impulse[0]
                + self.tangents[1] * p.tangent_impulse[1];
            self.ma.apply(va, p.ra, -impulse);
            self.mb.apply(vb, p.rb, impulse);
        }
    }

    fn solve(&mut self, va: &mut Velocity, vb: &mut Velocity) {
        for p in &mut self.points {
            // Friction first so the normal row has the last word
            let max_friction = self.friction * p.normal_impulse;
            for k in 0..2 {
                let tangent = self.tangents[k];
                let vt = relative_velocity(va, vb, p.ra, p.rb).dot(tangent);
                let lambda = -(p.tangent_mass[k] * vt);
                let accumulated = (p.tangent_impulse[k] + lambda).clamp(-max_friction, max_friction);
                let lambda = accumulated - p.tangent_impulse[k];
                p.tangent_impulse[k] = accumulated;
                let impulse = tangent * lambda;
                self.ma.apply(va, p.ra, -impulse);
                self.mb.apply(vb, p.rb, impulse);
            }

            let vn = relative_velocity(va, vb, p.ra, p.rb).dot(self.normal);
            let lambda = -(p.normal_mass * (vn - p.target));
            let accumulated = (p.normal_impulse + lambda).max(Fix64::ZERO);
            let lambda = accumulated - p.normal_impulse;
            p.normal_impulse = accumulated;
            let impulse = self.normal * lambda;
            self.ma.apply(va, p.ra, -impulse);
            self.mb.apply(vb, p.rb, impulse);
        }
    }

    /// Write accumulated impulses back for next step's warm start
    pub fn store(&self, manifold: &mut ContactManifold) {
        for (cached, p) in manifold.points_mut().iter_mut().zip(&self.points) {
            cached.normal_impulse = p.normal_impulse;
            cached.tangent_impulse = p.tangent_impulse;
        }
    }
}

// ============================================================================
// Constraint Batching (Graph Coloring)
// ============================================================================

/// Any constraint the solver iterates
#[derive(Clone, Debug)]
pub(crate) enum SolverConstraint {
    Joint(JointConstraint),
    Contact(ContactConstraint),
}

impl SolverConstraint {
    #[inline]
    fn slots(&self) -> (usize, usize) {
        match self {
            Self::Joint(j) => (j.slot_a, j.slot_b),
            Self::Contact(c) => (c.a, c.b),
        }
    }

    #[inline]
    fn movable(&self) -> (bool, bool) {
        match self {
            Self::Joint(j) => (j.ma.is_movable(), j.mb.is_movable()),
            Self::Contact(c) => (c.ma.is_movable(), c.mb.is_movable()),
        }
    }

    fn warm_start(&self, va: &mut Velocity, vb: &mut Velocity) {
        match self {
            Self::Joint(j) => j.warm_start(va, vb),
            Self::Contact(c) => c.warm_start(va, vb),
        }
    }

    fn solve(&mut self, va: &mut Velocity, vb: &mut Velocity) {
        match self {
            Self::Joint(j) => j.solve(va, vb),
            Self::Contact(c) => c.solve(va, vb),
        }
    }
}

/// Find first color where both bodies are free (greedy coloring)
fn find_free_color(body_colors: &[Vec<usize>], a: Option<usize>, b: Option<usize>) -> usize {
    let free = |slot: Option<usize>, color: usize| {
        slot.and_then(|s| body_colors.get(s))
            .map_or(true, |colors| !colors.contains(&color))
    };
    let mut color = 0;
    while !(free(a, color) && free(b, color)) {
        color += 1;
    }
    color
}

/// Greedy colouring of `constraints` into body-disjoint batches.
///
/// Returns constraint indices per colour, each batch in input order.
pub(crate) fn color_batches(constraints: &[SolverConstraint], slot_count: usize) -> Vec<Vec<usize>> {
    let mut batches: Vec<Vec<usize>> = Vec::new();
    let mut body_colors: Vec<Vec<usize>> = vec![Vec::new(); slot_count];

    for (index, constraint) in constraints.iter().enumerate() {
        let (a, b) = constraint.slots();
        let (move_a, move_b) = constraint.movable();
        let a = move_a.then_some(a);
        let b = move_b.then_some(b);

        let color = find_free_color(&body_colors, a, b);
        while batches.len() <= color {
            batches.push(Vec::new());
        }
        batches[color].push(index);

        for slot in [a, b].into_iter().flatten() {
            if let Some(colors) = body_colors.get_mut(slot) {
                colors.push(color);
            }
        }
    }
    batches
}

// ============================================================================
// Solver
// ============================================================================

/// Statistics of the last solve
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub joints: usize,
    pub contacts: usize,
    pub batches: usize,
    pub iterations: usize,
}

/// Runs warm start and the fixed iteration budget over prepared constraints
#[derive(Debug, Default)]
pub(crate) struct Solver {
    batches: Vec<Vec<SolverConstraint>>,
    velocities: Vec<Velocity>,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve and write the new velocities into `bodies`.
    ///
    /// Returns the constraints (in colour order) so their accumulated
    /// impulses can be stored for warm starting.
    pub fn solve(
        &mut self,
        bodies: &mut BodySet,
        constraints: Vec<SolverConstraint>,
        iterations: usize,
    ) -> (Vec<SolverConstraint>, SolverStats) {
        let mut stats = SolverStats {
            iterations,
            ..SolverStats::default()
        };
        for c in &constraints {
            match c {
                SolverConstraint::Joint(_) => stats.joints += 1,
                SolverConstraint::Contact(_) => stats.contacts += 1,
            }
        }

        let order = color_batches(&constraints, bodies.slot_count());
        stats.batches = order.len();
        let mut slots: Vec<Option<SolverConstraint>> = constraints.into_iter().map(Some).collect();
        self.batches = order
            .into_iter()
            .map(|batch| batch.into_iter().filter_map(|i| slots[i].take()).collect())
            .collect();

        self.velocities.clear();
        self.velocities.resize(bodies.slot_count(), Velocity::default());
        for (handle, body) in bodies.iter() {
            self.velocities[handle.index() as usize] = Velocity::of(body);
        }

        for batch in &self.batches {
            for c in batch {
                let (a, b) = c.slots();
                let (mut va, mut vb) = (self.velocities[a], self.velocities[b]);
                c.warm_start(&mut va, &mut vb);
                write_back(&mut self.velocities, c, va, vb);
            }
        }

        for _ in 0..iterations {
            for batch in &mut self.batches {
                solve_batch(batch, &mut self.velocities);
            }
        }

        for (handle, body) in bodies.iter_mut() {
            if body.is_dynamic() {
                let v = self.velocities[handle.index() as usize];
                body.linear_velocity = v.linear;
                body.angular_velocity = v.angular;
            }
        }

        let solved = self.batches.drain(..).flatten().collect();
        (solved, stats)
    }
}

#[inline]
fn write_back(velocities: &mut [Velocity], c: &SolverConstraint, va: Velocity, vb: Velocity) {
    let (a, b) = c.slots();
    let (move_a, move_b) = c.movable();
    if move_a {
        velocities[a] = va;
    }
    if move_b {
        velocities[b] = vb;
    }
}

#[cfg(not(feature = "parallel"))]
fn solve_batch(batch: &mut [SolverConstraint], velocities: &mut [Velocity]) {
    for c in batch.iter_mut() {
        let (a, b) = c.slots();
        let (mut va, mut vb) = (velocities[a], velocities[b]);
        c.solve(&mut va, &mut vb);
        write_back(velocities, c, va, vb);
    }
}

/// Constraints in one batch share no movable body, so solving them against
/// the same velocity snapshot equals solving them one after another.
#[cfg(feature = "parallel")]
fn solve_batch(batch: &mut [SolverConstraint], velocities: &mut [Velocity]) {
    let snapshot: &[Velocity] = velocities;
    let updates: Vec<(Velocity, Velocity)> = batch
        .par_iter_mut()
        .map(|c| {
            let (a, b) = c.slots();
            let (mut va, mut vb) = (snapshot[a], snapshot[b]);
            c.solve(&mut va, &mut vb);
            (va, vb)
        })
        .collect();
    for (c, (va, vb)) in batch.iter().zip(updates) {
        write_back(velocities, c, va, vb);
    }
}

// ============================================================================
// Integration
// ============================================================================

/// Advance position and orientation by the solved velocity
pub(crate) fn integrate_position(body: &mut RigidBody, dt: Fix64, max_linear_speed: Fix64) {
    if body.is_static() || body.is_inert() {
        return;
    }
    let speed_sq = body.linear_velocity.length_squared();
    if speed_sq > max_linear_speed * max_linear_speed {
        body.linear_velocity = body.linear_velocity.normalize() * max_linear_speed;
    }
    body.position += body.linear_velocity * dt;
    if !body.angular_velocity.is_zero() {
        body.orientation = body.orientation.integrate(body.angular_velocity, dt);
        body.update_world_inertia();
    }
}
