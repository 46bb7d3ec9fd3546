//! Rigid Bodies and the Body Arena
//!
//! [`RigidBody`] holds the full dynamic state of one body; [`BodySet`] is a
//! generational arena handing out [`BodyHandle`]s.
//!
//! # Arena rules
//!
//! - Freed slots are reused last-in first-out
//! - Each reuse bumps the slot generation, so a stale handle never aliases
//!   the new occupant
//! - Iteration always walks slots in ascending index order

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::CollisionGroup;
use crate::fixed::Fix64;
use crate::mass_properties::rotate_inertia;
use crate::material::Material;
use crate::math::{Mat3Fix, QuatFix, Transform, Vec3Fix};
use crate::shape::Shape;

// ============================================================================
// Body Type
// ============================================================================

/// Type of rigid body
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BodyType {
    /// Moved by physics (gravity, constraints, impulses)
    Dynamic = 0,
    /// Moved by user code through its velocity, infinite mass
    Kinematic = 1,
    /// Never moves
    Static = 2,
}

// ============================================================================
// Handle
// ============================================================================

/// Generational body handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyHandle {
    index: u32,
    generation: u32,
}

impl BodyHandle {
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at the time the handle was issued
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

// ============================================================================
// Rigid Body
// ============================================================================

/// Rigid body state
#[derive(Clone, Debug)]
pub struct RigidBody {
    /// Position of the body origin (centre of rotation)
    pub position: Vec3Fix,
    /// Orientation
    pub orientation: QuatFix,
    /// Linear velocity
    pub linear_velocity: Vec3Fix,
    /// Angular velocity (world frame)
    pub angular_velocity: Vec3Fix,
    /// Surface response
    pub material: Material,
    /// Collision group
    pub group: CollisionGroup,
    /// Sensors report contacts and events but never receive impulses
    pub is_sensor: bool,
    /// Gravity multiplier (1 = normal)
    pub gravity_scale: Fix64,
    /// Linear damping per second; `None` uses the space default
    pub linear_damping: Option<Fix64>,
    /// Angular damping per second; `None` uses the space default
    pub angular_damping: Option<Fix64>,
    body_type: BodyType,
    mass: Fix64,
    inv_mass: Fix64,
    inv_inertia_local: Mat3Fix,
    inv_inertia_world: Mat3Fix,
    shape: Option<Shape>,
    force: Vec3Fix,
    torque: Vec3Fix,
}

impl RigidBody {
    fn with_type(position: Vec3Fix, body_type: BodyType, mass: Fix64) -> Self {
        let mut body = Self {
            position,
            orientation: QuatFix::IDENTITY,
            linear_velocity: Vec3Fix::ZERO,
            angular_velocity: Vec3Fix::ZERO,
            material: Material::default(),
            group: CollisionGroup::DEFAULT,
            is_sensor: false,
            gravity_scale: Fix64::ONE,
            linear_damping: None,
            angular_damping: None,
            body_type,
            mass,
            inv_mass: Fix64::ZERO,
            inv_inertia_local: Mat3Fix::ZERO,
            inv_inertia_world: Mat3Fix::ZERO,
            shape: None,
            force: Vec3Fix::ZERO,
            torque: Vec3Fix::ZERO,
        };
        body.update_mass_properties();
        body
    }

    /// Dynamic body of the given mass
    pub fn new_dynamic(position: Vec3Fix, mass: Fix64) -> Self {
        Self::with_type(position, BodyType::Dynamic, mass)
    }

    /// Kinematic body (moved through its velocity, unaffected by contacts)
    pub fn new_kinematic(position: Vec3Fix) -> Self {
        Self::with_type(position, BodyType::Kinematic, Fix64::ZERO)
    }

    /// Static (immovable) body
    pub fn new_static(position: Vec3Fix) -> Self {
        Self::with_type(position, BodyType::Static, Fix64::ZERO)
    }

    /// Attach a collision shape (recomputes inertia)
    #[must_use]
    pub fn with_shape(mut self, shape: impl Into<Shape>) -> Self {
        self.set_shape(shape.into());
        self
    }

    #[must_use]
    pub fn with_orientation(mut self, orientation: QuatFix) -> Self {
        self.orientation = orientation.normalize();
        self.update_world_inertia();
        self
    }

    #[must_use]
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: CollisionGroup) -> Self {
        self.group = group;
        self
    }

    /// Mark as sensor
    #[must_use]
    pub fn as_sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    #[must_use]
    pub fn with_velocity(mut self, linear: Vec3Fix, angular: Vec3Fix) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    #[must_use]
    pub fn with_gravity_scale(mut self, scale: Fix64) -> Self {
        self.gravity_scale = scale;
        self
    }

    #[must_use]
    pub fn with_damping(mut self, linear: Fix64, angular: Fix64) -> Self {
        self.linear_damping = Some(linear);
        self.angular_damping = Some(angular);
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    #[inline]
    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    /// Bodies without a shape are stored but never simulated or collided
    #[inline]
    pub fn is_inert(&self) -> bool {
        self.shape.is_none()
    }

    /// Mass (zero for kinematic and static bodies)
    #[inline]
    pub fn mass(&self) -> Fix64 {
        self.mass
    }

    /// Inverse mass (zero for kinematic and static bodies)
    #[inline]
    pub fn inverse_mass(&self) -> Fix64 {
        self.inv_mass
    }

    /// Inverse inertia tensor in body space
    #[inline]
    pub fn inverse_inertia_local(&self) -> Mat3Fix {
        self.inv_inertia_local
    }

    /// Inverse inertia tensor in world space
    #[inline]
    pub fn inverse_inertia_world(&self) -> Mat3Fix {
        self.inv_inertia_world
    }

    #[inline]
    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    /// Local-to-world transform
    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.orientation)
    }

    /// Accumulated force for the next step
    #[inline]
    pub fn force(&self) -> Vec3Fix {
        self.force
    }

    /// Accumulated torque for the next step
    #[inline]
    pub fn torque(&self) -> Vec3Fix {
        self.torque
    }

    /// Velocity of a world point rigidly attached to the body
    #[inline]
    pub fn velocity_at(&self, point: Vec3Fix) -> Vec3Fix {
        self.linear_velocity + self.angular_velocity.cross(point - self.position)
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Replace the shape and recompute inertia
    pub fn set_shape(&mut self, shape: Shape) {
        self.shape = Some(shape);
        self.update_mass_properties();
    }

    /// Detach the shape, making the body inert
    pub fn take_shape(&mut self) -> Option<Shape> {
        let shape = self.shape.take();
        self.update_mass_properties();
        shape
    }

    fn update_mass_properties(&mut self) {
        if !self.is_dynamic() || self.mass <= Fix64::ZERO {
            self.mass = if self.is_dynamic() { self.mass } else { Fix64::ZERO };
            self.inv_mass = Fix64::ZERO;
            self.inv_inertia_local = Mat3Fix::ZERO;
            self.inv_inertia_world = Mat3Fix::ZERO;
            return;
        }
        self.inv_mass = Fix64::ONE / self.mass;

        let inertia = match &self.shape {
            Some(shape) if !shape.is_static_only() => {
                shape.mass_properties(Fix64::ONE).with_mass(self.mass).inertia_tensor
            }
            // Unit sphere until a shape is attached
            _ => {
                let i = self.mass * Fix64::from_ratio(2, 5);
                Mat3Fix::diagonal(i, i, i)
            }
        };
        self.inv_inertia_local = inertia.inverse_spd();
        self.update_world_inertia();
    }

    /// Refresh the world inverse inertia after the orientation changed
    #[inline]
    pub fn update_world_inertia(&mut self) {
        if self.inv_mass.is_zero() {
            return;
        }
        self.inv_inertia_world = rotate_inertia(self.inv_inertia_local, self.orientation.to_mat3());
    }

    /// Apply an impulse at the body origin
    pub fn apply_impulse(&mut self, impulse: Vec3Fix) {
        if self.is_dynamic() {
            self.linear_velocity += impulse * self.inv_mass;
        }
    }

    /// Apply an impulse at a world-space point
    pub fn apply_impulse_at(&mut self, impulse: Vec3Fix, point: Vec3Fix) {
        if self.is_dynamic() {
            self.linear_velocity += impulse * self.inv_mass;
            let r = point - self.position;
            self.angular_velocity += self.inv_inertia_world.mul_vec(r.cross(impulse));
        }
    }

    /// Apply an angular impulse
    pub fn apply_angular_impulse(&mut self, impulse: Vec3Fix) {
        if self.is_dynamic() {
            self.angular_velocity += self.inv_inertia_world.mul_vec(impulse);
        }
    }

    /// Accumulate a force for the next step
    pub fn apply_force(&mut self, force: Vec3Fix) {
        self.force += force;
    }

    /// Accumulate a force applied at a world point
    pub fn apply_force_at(&mut self, force: Vec3Fix, point: Vec3Fix) {
        self.force += force;
        self.torque += (point - self.position).cross(force);
    }

    /// Accumulate a torque for the next step
    pub fn apply_torque(&mut self, torque: Vec3Fix) {
        self.torque += torque;
    }

    pub(crate) fn clear_accumulators(&mut self) {
        self.force = Vec3Fix::ZERO;
        self.torque = Vec3Fix::ZERO;
    }
}

// ============================================================================
// Body Set (generational arena)
// ============================================================================

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    body: Option<RigidBody>,
}

/// Generational arena of rigid bodies
#[derive(Clone, Debug, Default)]
pub struct BodySet {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl BodySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a body, reusing the most recently freed slot
    pub fn insert(&mut self, body: RigidBody) -> BodyHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.body = Some(body);
            return BodyHandle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            body: Some(body),
        });
        BodyHandle::new(index, 0)
    }

    /// Remove a body; `None` for stale or unknown handles
    pub fn remove(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation || slot.body.is_none() {
            return None;
        }
        let body = slot.body.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        body
    }

    #[inline]
    pub fn get(&self, handle: BodyHandle) -> Option<&RigidBody> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.body.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.body.as_mut()
    }

    #[inline]
    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Handle of the body currently occupying `index`
    #[inline]
    pub fn handle_at(&self, index: u32) -> Option<BodyHandle> {
        let slot = self.slots.get(index as usize)?;
        slot.body.as_ref().map(|_| BodyHandle::new(index, slot.generation))
    }

    /// Body by slot index, ignoring generations
    #[inline]
    pub(crate) fn by_index(&self, index: u32) -> Option<&RigidBody> {
        self.slots.get(index as usize).and_then(|s| s.body.as_ref())
    }

    #[cfg(test)]
    pub(crate) fn by_index_mut(&mut self, index: u32) -> Option<&mut RigidBody> {
        self.slots.get_mut(index as usize).and_then(|s| s.body.as_mut())
    }

    /// Number of live bodies
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated (live or free)
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Live bodies in slot order
    pub fn iter(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.body
                .as_ref()
                .map(|b| (BodyHandle::new(i as u32, s.generation), b))
        })
    }

    /// Live bodies in slot order, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (BodyHandle, &mut RigidBody)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.body
                .as_mut()
                .map(|b| (BodyHandle::new(i as u32, generation), b))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
