//! Simulation Space
//!
//! Owns every body, joint and force field and advances them with a fixed,
//! deterministic pipeline.
//!
//! # Step Stages
//!
//! 1. Forces: gravity, force fields and accumulators, then damping
//! 2. Broad phase: refit swept proxies and rebuild the candidate pairs
//! 3. Narrow phase: manifolds and collision events
//! 4. Solver: pre-step, warm start and the fixed iteration budget
//! 5. Integration of positions and orientations
//! 6. Broad-phase refit against the new poses
//! 7. Deferred commands queued by listeners
//!
//! Structural edits (`add_*`/`remove_*`) take effect immediately; since
//! [`Space::step`] takes `&mut self` they can only happen between steps.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::body::{BodyHandle, BodySet, RigidBody};
use crate::broadphase::BroadPhase;
use crate::dynamic_bvh::DEFAULT_FAT_MARGIN;
use crate::error::{PhysicsError, Result};
use crate::event::{CollisionEvent, CollisionListener, Command, EventDispatcher};
use crate::filter::CollisionRules;
use crate::fixed::Fix64;
use crate::force::{ForceFieldHandle, ForceFieldInstance, ForceFieldSet};
use crate::joint::{Joint, JointConstraint, JointHandle};
use crate::material::{combine, CombineRule};
use crate::math::{QuatFix, Vec3Fix};
use crate::narrowphase::{ContactPair, NarrowPhase, NarrowPhaseStats};
use crate::shape::Shape;
use crate::solver::{integrate_position, reciprocal, ContactConstraint, Solver, SolverConstraint, SolverStats};

// ============================================================================
// Configuration
// ============================================================================

/// Space configuration, loadable from JSON
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Gravity acceleration (m/s²)
    pub gravity: Vec3Fix,
    /// Step length used by [`Space::update`]
    pub time_step: Fix64,
    /// Solver iterations per step
    pub iterations: usize,
    /// Separation within which contacts are kept speculatively
    pub speculative_margin: Fix64,
    /// Broad-phase proxy enlargement
    pub fat_margin: Fix64,
    pub friction_combine: CombineRule,
    pub restitution_combine: CombineRule,
    pub collision_rules: CollisionRules,
    /// Linear damping per second for bodies without their own
    pub default_linear_damping: Fix64,
    /// Angular damping per second for bodies without their own
    pub default_angular_damping: Fix64,
    /// Linear speed cap applied before integration
    pub max_linear_speed: Fix64,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3Fix::new(Fix64::ZERO, Fix64::from_ratio(-981, 100), Fix64::ZERO),
            time_step: Fix64::from_ratio(1, 60),
            iterations: 10,
            speculative_margin: Fix64::from_ratio(2, 100),
            fat_margin: DEFAULT_FAT_MARGIN,
            friction_combine: CombineRule::Average,
            restitution_combine: CombineRule::Max,
            collision_rules: CollisionRules::new(),
            default_linear_damping: Fix64::from_ratio(3, 100),
            default_angular_damping: Fix64::from_ratio(15, 100),
            max_linear_speed: Fix64::from_int(100),
        }
    }
}

impl SpaceConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(PhysicsError::InvalidConfiguration {
                reason: reason.to_string(),
            })
        };
        if self.time_step <= Fix64::ZERO {
            return invalid("time_step must be positive");
        }
        if self.iterations == 0 {
            return invalid("iterations must be at least 1");
        }
        if self.speculative_margin.is_negative() || self.fat_margin.is_negative() {
            return invalid("margins must not be negative");
        }
        if self.default_linear_damping.is_negative() || self.default_angular_damping.is_negative() {
            return invalid("damping must not be negative");
        }
        if self.max_linear_speed <= Fix64::ZERO {
            return invalid("max_linear_speed must be positive");
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration; missing fields use defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters from the last completed step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    pub frame: u64,
    pub bodies: usize,
    pub proxies: usize,
    pub broad_pairs: usize,
    pub narrow: NarrowPhaseStats,
    pub solver: SolverStats,
    pub commands: usize,
}

// ============================================================================
// Space
// ============================================================================

/// The simulation space
#[derive(Debug)]
pub struct Space {
    pub(crate) config: SpaceConfig,
    pub(crate) bodies: BodySet,
    pub(crate) broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    joints: BTreeMap<JointHandle, Joint>,
    next_joint: u32,
    fields: ForceFieldSet,
    events: EventDispatcher,
    solver: Solver,
    frame: u64,
    stats: StepStats,
}

impl Default for Space {
    fn default() -> Self {
        Self::new(SpaceConfig::default())
    }
}

impl Space {
    pub fn new(config: SpaceConfig) -> Self {
        Self {
            broad_phase: BroadPhase::new(config.fat_margin),
            config,
            bodies: BodySet::new(),
            narrow_phase: NarrowPhase::new(),
            joints: BTreeMap::new(),
            next_joint: 0,
            fields: ForceFieldSet::new(),
            events: EventDispatcher::new(),
            solver: Solver::new(),
            frame: 0,
            stats: StepStats::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    pub fn set_gravity(&mut self, gravity: Vec3Fix) {
        self.config.gravity = gravity;
    }

    /// Replace the collision rule table; takes effect on the next step
    pub fn set_collision_rules(&mut self, rules: CollisionRules) {
        self.config.collision_rules = rules;
    }

    /// Completed steps
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn stats(&self) -> &StepStats {
        &self.stats
    }

    // ------------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------------

    fn check_shape(body: &RigidBody, shape: &Shape) -> Result<()> {
        shape.validate()?;
        if shape.is_static_only() && !body.is_static() {
            return Err(PhysicsError::shape("triangle meshes and height fields need a static body"));
        }
        Ok(())
    }

    /// Add a body.
    ///
    /// A body without a shape is still stored, but stays inert until
    /// [`Self::set_body_shape`] is called; that case returns
    /// [`PhysicsError::MissingShape`] carrying the new handle.
    pub fn add_body(&mut self, mut body: RigidBody) -> Result<BodyHandle> {
        if let Some(shape) = body.shape() {
            Self::check_shape(&body, shape)?;
        }
        body.update_world_inertia();
        let aabb = body.shape().map(|s| s.aabb(&body.transform()));
        let body_type = body.body_type();
        let handle = self.bodies.insert(body);
        match aabb {
            Some(aabb) => {
                self.broad_phase.insert(handle.index(), aabb);
                debug!("added {body_type:?} body {handle}");
                Ok(handle)
            }
            None => {
                warn!("body {handle} has no shape; stored inert");
                Err(PhysicsError::MissingShape { handle })
            }
        }
    }

    /// Remove a body with its proxy, pairs and joints.
    ///
    /// Touching pairs end with [`crate::EndReason::BodyRemoved`]. Returns
    /// `false` (and changes nothing) for stale or unknown handles.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        if !self.bodies.contains(handle) {
            return false;
        }
        let slot = handle.index();
        self.narrow_phase.remove_body(slot, &mut self.events);
        self.broad_phase.remove(slot);
        let attached: Vec<JointHandle> = self
            .joints
            .iter()
            .filter(|(_, j)| j.body_a == handle || j.body_b == handle)
            .map(|(h, _)| *h)
            .collect();
        for joint in attached {
            self.remove_joint(joint);
        }
        self.bodies.remove(handle);
        debug!("removed body {handle}");
        true
    }

    /// Replace a body's shape, recomputing its mass properties and proxy
    pub fn set_body_shape(&mut self, handle: BodyHandle, shape: Shape) -> Result<()> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidHandle { kind: "body" })?;
        Self::check_shape(body, &shape)?;
        let aabb = shape.aabb(&body.transform());
        body.set_shape(shape);
        self.broad_phase.insert(handle.index(), aabb);
        debug!("reshaped body {handle}");
        Ok(())
    }

    #[inline]
    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    /// Live bodies in slot order
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> {
        self.bodies.iter()
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn contains_body(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody> {
        self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidHandle { kind: "body" })
    }

    pub fn position(&self, handle: BodyHandle) -> Option<Vec3Fix> {
        self.body(handle).map(|b| b.position)
    }

    pub fn set_position(&mut self, handle: BodyHandle, position: Vec3Fix) -> Result<()> {
        self.body_mut(handle)?.position = position;
        Ok(())
    }

    pub fn orientation(&self, handle: BodyHandle) -> Option<QuatFix> {
        self.body(handle).map(|b| b.orientation)
    }

    pub fn set_orientation(&mut self, handle: BodyHandle, orientation: QuatFix) -> Result<()> {
        let body = self.body_mut(handle)?;
        body.orientation = orientation.normalize();
        body.update_world_inertia();
        Ok(())
    }

    pub fn linear_velocity(&self, handle: BodyHandle) -> Option<Vec3Fix> {
        self.body(handle).map(|b| b.linear_velocity)
    }

    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3Fix) -> Result<()> {
        self.body_mut(handle)?.linear_velocity = velocity;
        Ok(())
    }

    pub fn angular_velocity(&self, handle: BodyHandle) -> Option<Vec3Fix> {
        self.body(handle).map(|b| b.angular_velocity)
    }

    pub fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3Fix) -> Result<()> {
        self.body_mut(handle)?.angular_velocity = velocity;
        Ok(())
    }

    pub fn mass(&self, handle: BodyHandle) -> Option<Fix64> {
        self.body(handle).map(RigidBody::mass)
    }

    pub fn inverse_mass(&self, handle: BodyHandle) -> Option<Fix64> {
        self.body(handle).map(RigidBody::inverse_mass)
    }

    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3Fix) -> Result<()> {
        self.body_mut(handle)?.apply_impulse(impulse);
        Ok(())
    }

    /// Force accumulated until the next step
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec3Fix) -> Result<()> {
        self.body_mut(handle)?.apply_force(force);
        Ok(())
    }

    pub fn apply_torque(&mut self, handle: BodyHandle, torque: Vec3Fix) -> Result<()> {
        self.body_mut(handle)?.apply_torque(torque);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Joints
    // ------------------------------------------------------------------------

    /// Add a joint; unless `collide_connected` is set the two bodies stop
    /// colliding with each other
    pub fn add_joint(&mut self, joint: Joint) -> Result<JointHandle> {
        joint.validate()?;
        if !self.bodies.contains(joint.body_a) || !self.bodies.contains(joint.body_b) {
            return Err(PhysicsError::InvalidHandle { kind: "body" });
        }
        if !joint.collide_connected {
            self.broad_phase.exclude_pair(joint.body_a.index(), joint.body_b.index());
        }
        let handle = JointHandle(self.next_joint);
        self.next_joint += 1;
        debug!("added joint {handle} between {} and {}", joint.body_a, joint.body_b);
        self.joints.insert(handle, joint);
        Ok(handle)
    }

    /// Remove a joint; `false` if it does not exist
    pub fn remove_joint(&mut self, handle: JointHandle) -> bool {
        let Some(joint) = self.joints.remove(&handle) else {
            return false;
        };
        if !joint.collide_connected {
            self.broad_phase.include_pair(joint.body_a.index(), joint.body_b.index());
        }
        debug!("removed joint {handle}");
        true
    }

    #[inline]
    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(&handle)
    }

    /// Joints in insertion order
    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter().map(|(h, j)| (*h, j))
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // ------------------------------------------------------------------------
    // Force fields, listeners, results
    // ------------------------------------------------------------------------

    pub fn add_force_field(&mut self, field: impl Into<ForceFieldInstance>) -> ForceFieldHandle {
        self.fields.insert(field.into())
    }

    pub fn remove_force_field(&mut self, handle: ForceFieldHandle) -> bool {
        self.fields.remove(handle).is_some()
    }

    pub fn force_field(&self, handle: ForceFieldHandle) -> Option<&ForceFieldInstance> {
        self.fields.get(handle)
    }

    pub fn force_field_mut(&mut self, handle: ForceFieldHandle) -> Option<&mut ForceFieldInstance> {
        self.fields.get_mut(handle)
    }

    /// Register a collision listener (called in registration order)
    pub fn add_listener(&mut self, listener: Box<dyn CollisionListener + Send>) {
        self.events.add_listener(listener);
    }

    /// Events of the last step, plus any fired by removals since
    #[inline]
    pub fn events(&self) -> &[CollisionEvent] {
        self.events.events()
    }

    /// Narrow-phase pairs in slot order
    pub fn contact_pairs(&self) -> impl Iterator<Item = &ContactPair> {
        self.narrow_phase.pairs()
    }

    pub fn contact_pair(&self, a: BodyHandle, b: BodyHandle) -> Option<&ContactPair> {
        self.narrow_phase.pair(a, b)
    }

    // ------------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------------

    /// Step by the configured time step
    pub fn update(&mut self) {
        self.step(self.config.time_step);
    }

    /// Advance the simulation by `dt` seconds; non-positive steps are ignored
    pub fn step(&mut self, dt: Fix64) {
        if dt <= Fix64::ZERO {
            warn!("ignoring non-positive time step {dt}");
            return;
        }
        self.events.begin_step();

        self.integrate_forces(dt);

        self.refit_proxies(dt);
        let broad_pairs = self
            .broad_phase
            .compute_pairs(&self.bodies, &self.config.collision_rules)
            .to_vec();

        let narrow = self.narrow_phase.update(
            &self.bodies,
            &broad_pairs,
            self.config.speculative_margin,
            &mut self.events,
        );

        let solver = self.solve(dt);

        for (_, body) in self.bodies.iter_mut() {
            integrate_position(body, dt, self.config.max_linear_speed);
        }

        self.refit_proxies(Fix64::ZERO);

        let commands = self.apply_commands();

        self.frame += 1;
        self.stats = StepStats {
            frame: self.frame,
            bodies: self.bodies.len(),
            proxies: self.broad_phase.proxy_count(),
            broad_pairs: broad_pairs.len(),
            narrow,
            solver,
            commands,
        };
        trace!("step {:?}", self.stats);
    }

    /// Stage 1: external forces, gravity and damping into velocities
    fn integrate_forces(&mut self, dt: Fix64) {
        self.fields.apply(&mut self.bodies);
        let gravity = self.config.gravity;
        let (lin_default, ang_default) = (self.config.default_linear_damping, self.config.default_angular_damping);
        for (_, body) in self.bodies.iter_mut() {
            if body.is_dynamic() && !body.is_inert() {
                let acceleration = gravity * body.gravity_scale + body.force() * body.inverse_mass();
                body.linear_velocity += acceleration * dt;
                let angular = body.inverse_inertia_world().mul_vec(body.torque());
                body.angular_velocity += angular * dt;

                let lin = body.linear_damping.unwrap_or(lin_default);
                let ang = body.angular_damping.unwrap_or(ang_default);
                body.linear_velocity = body.linear_velocity * (Fix64::ONE / (Fix64::ONE + dt * lin));
                body.angular_velocity = body.angular_velocity * (Fix64::ONE / (Fix64::ONE + dt * ang));
            }
            body.clear_accumulators();
        }
    }

    /// Refit every proxy against its tight box swept over `dt`
    fn refit_proxies(&mut self, dt: Fix64) {
        for (handle, body) in self.bodies.iter() {
            if let Some(shape) = body.shape() {
                let aabb = shape.aabb(&body.transform());
                let sweep = body.linear_velocity * dt;
                self.broad_phase.update(handle.index(), aabb, sweep);
            }
        }
    }

    /// Stage 4: build constraints, solve, and keep impulses for warm starting
    fn solve(&mut self, dt: Fix64) -> SolverStats {
        let inv_dt = reciprocal(dt);
        let mut constraints = Vec::new();

        for (&handle, joint) in &self.joints {
            let (slot_a, slot_b) = (joint.body_a.index(), joint.body_b.index());
            let (Some(a), Some(b)) = (self.bodies.get(joint.body_a), self.bodies.get(joint.body_b)) else {
                continue;
            };
            if a.is_inert() || b.is_inert() {
                continue;
            }
            constraints.push(SolverConstraint::Joint(JointConstraint::prepare(
                handle,
                joint,
                slot_a as usize,
                a,
                slot_b as usize,
                b,
                dt,
            )));
        }

        for (&key, pair) in self.narrow_phase.pairs_with_keys() {
            if !pair.is_solvable() {
                continue;
            }
            let (Some(a), Some(b)) = (self.bodies.by_index(key.0), self.bodies.by_index(key.1)) else {
                continue;
            };
            let material = combine(
                &a.material,
                &b.material,
                self.config.friction_combine,
                self.config.restitution_combine,
            );
            constraints.push(SolverConstraint::Contact(ContactConstraint::prepare(
                key,
                a,
                b,
                pair.manifold(),
                material,
                inv_dt,
            )));
        }

        let (solved, stats) = self.solver.solve(&mut self.bodies, constraints, self.config.iterations);
        for constraint in solved {
            match constraint {
                SolverConstraint::Joint(j) => {
                    if let Some(joint) = self.joints.get_mut(&j.handle) {
                        joint.impulse = j.impulse;
                    }
                }
                SolverConstraint::Contact(c) => {
                    if let Some(manifold) = self.narrow_phase.manifold_mut(c.key) {
                        c.store(manifold);
                    }
                }
            }
        }
        stats
    }

    /// Stage 7: apply queued commands until the queue is empty
    fn apply_commands(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let commands = self.events.take_commands();
            if commands.is_empty() {
                return applied;
            }
            for command in commands {
                applied += 1;
                match command {
                    Command::RemoveBody(handle) => {
                        self.remove_body(handle);
                    }
                    Command::RemoveJoint(handle) => {
                        self.remove_joint(handle);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CommandQueue;
    use crate::force::ForceField;
    use crate::heightfield::HeightField;

    fn ball_at(y: i64) -> RigidBody {
        RigidBody::new_dynamic(Vec3Fix::from_int(0, y, 0), Fix64::ONE).with_shape(Shape::sphere(Fix64::HALF).expect("sphere"))
    }

    fn ground() -> RigidBody {
        let half = Vec3Fix::new(Fix64::from_int(10), Fix64::HALF, Fix64::from_int(10));
        RigidBody::new_static(Vec3Fix::new(Fix64::ZERO, Fix64::from_ratio(-1, 2), Fix64::ZERO))
            .with_shape(Shape::cuboid(half).expect("box"))
    }

    #[test]
    fn test_config_defaults_and_json() {
        let config = SpaceConfig::default();
        assert_eq!(config.iterations, 10);
        assert_eq!(config.time_step, Fix64::from_ratio(1, 60));
        assert_eq!(config.default_linear_damping, Fix64::from_ratio(3, 100));
        let json = config.to_json_string().expect("serialize");
        let back = SpaceConfig::from_json_str(&json).expect("parse");
        assert_eq!(back, config, "JSON round trip");

        let partial = SpaceConfig::from_json_str(r#"{ "iterations": 4 }"#).expect("partial config");
        assert_eq!(partial.iterations, 4);
        assert_eq!(partial.gravity, config.gravity, "missing fields use defaults");

        let bad = SpaceConfig::from_json_str(r#"{ "iterations": 0 }"#);
        assert!(matches!(bad, Err(PhysicsError::InvalidConfiguration { .. })));
        assert!(matches!(SpaceConfig::from_json_str("{"), Err(PhysicsError::Serialization(_))));
    }

    #[test]
    fn test_non_positive_step_ignored() {
        let mut space = Space::default();
        let h = space.add_body(ball_at(5)).expect("add");
        space.step(Fix64::ZERO);
        space.step(-Fix64::ONE);
        assert_eq!(space.frame(), 0);
        assert_eq!(space.position(h), Some(Vec3Fix::from_int(0, 5, 0)));
    }

    #[test]
    fn test_free_fall() {
        let mut space = Space::default();
        let h = space.add_body(ball_at(10)).expect("add");
        for _ in 0..60 {
            space.update();
        }
        let v = space.linear_velocity(h).expect("body");
        // 9.81 m/s minus a few percent of damping
        assert!(v.y < Fix64::from_int(-9) && v.y > Fix64::from_int(-10), "vy {}", v.y);
        assert_eq!(space.frame(), 60);
    }

    #[test]
    fn test_missing_shape_is_inert_until_shaped() {
        let mut space = Space::default();
        let body = RigidBody::new_dynamic(Vec3Fix::from_int(0, 5, 0), Fix64::ONE);
        let handle = match space.add_body(body) {
            Err(PhysicsError::MissingShape { handle }) => handle,
            other => panic!("expected MissingShape, got {other:?}"),
        };
        assert_eq!(space.body_count(), 1, "the body is stored");
        space.update();
        assert_eq!(space.position(handle), Some(Vec3Fix::from_int(0, 5, 0)), "inert bodies do not move");

        space
            .set_body_shape(handle, Shape::sphere(Fix64::HALF).expect("sphere"))
            .expect("reshape");
        space.update();
        assert!(space.position(handle).map_or(false, |p| p.y < Fix64::from_int(5)), "shaped body falls");
    }

    #[test]
    fn test_static_only_shape_rejected_on_dynamic_body() {
        let mut space = Space::default();
        let field = HeightField::flat(3, 3, Fix64::ONE, Vec3Fix::ZERO, Fix64::ZERO).expect("field");
        let body = RigidBody::new_dynamic(Vec3Fix::ZERO, Fix64::ONE).with_shape(field);
        assert!(matches!(space.add_body(body), Err(PhysicsError::InvalidShape { .. })));
        assert_eq!(space.body_count(), 0, "rejected bodies are not stored");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut space = Space::default();
        let a = space.add_body(ball_at(0)).expect("add");
        assert!(space.remove_body(a));
        assert!(!space.remove_body(a), "second removal is a no-op");
        let b = space.add_body(ball_at(3)).expect("add");
        assert_eq!(b.index(), a.index(), "slot reused");
        assert!(!space.remove_body(a), "stale handle never aliases the new body");
        assert!(space.contains_body(b));
    }

    #[test]
    fn test_joint_lifecycle() {
        let mut space = Space::default();
        let a = space.add_body(ball_at(0)).expect("add");
        let b = space.add_body(ball_at(1)).expect("add");
        let joint = Joint::ball_socket(a, b, Vec3Fix::ZERO, Vec3Fix::from_int(0, -1, 0));
        let j = space.add_joint(joint).expect("joint");
        assert!(space.broad_phase.is_excluded(a.index(), b.index()), "connected bodies stop colliding");

        space.update();
        assert!(space.contact_pair(a, b).is_none());

        assert!(space.remove_body(b));
        assert!(space.joint(j).is_none(), "joints die with their bodies");
        assert!(!space.remove_joint(j));
        assert!(!space.broad_phase.is_excluded(a.index(), b.index()));

        let missing = Joint::distance(a, b, Vec3Fix::ZERO, Vec3Fix::ZERO, Fix64::ONE);
        assert!(matches!(space.add_joint(missing), Err(PhysicsError::InvalidHandle { .. })));
    }

    struct Despawner;

    impl CollisionListener for Despawner {
        fn collision_began(&mut self, event: &CollisionEvent, commands: &mut CommandQueue) {
            commands.remove_body(event.body_b);
        }
    }

    #[test]
    fn test_listener_commands_apply_at_end_of_step() {
        let mut space = Space::default();
        space.add_body(ground()).expect("ground");
        let ball = space.add_body(ball_at(0)).expect("ball");
        space.add_listener(Box::new(Despawner));
        space.update();
        assert!(!space.contains_body(ball), "removed by the deferred command");
        assert_eq!(space.stats().commands, 1);
        let began = space.events().iter().filter(|e| e.is_began()).count();
        let ended = space.events().iter().filter(|e| e.is_ended()).count();
        assert_eq!((began, ended), (1, 1), "removal ends the touching pair");
    }

    #[test]
    fn test_force_field_affects_step() {
        let mut space = Space::new(SpaceConfig {
            gravity: Vec3Fix::ZERO,
            default_linear_damping: Fix64::ZERO,
            ..SpaceConfig::default()
        });
        let h = space.add_body(ball_at(0)).expect("add");
        let wind = space.add_force_field(ForceField::Directional {
            acceleration: Vec3Fix::from_int(6, 0, 0),
        });
        space.step(Fix64::HALF);
        let vx = space.linear_velocity(h).map(|v| v.x);
        assert_eq!(vx, Some(Fix64::from_int(3)), "a·dt");
        assert!(space.remove_force_field(wind));
        assert!(!space.remove_force_field(wind));
    }
}
