//! Force Fields
//!
//! Directional gravity, point gravity, drag and buoyancy applied to
//! dynamic bodies during the force stage of each step.
//!
//! # Features
//!
//! - **Directional**: uniform acceleration (wind, tilted gravity)
//! - **Gravitational**: `min(max_acceleration, multiplier / r²)` toward a centre
//! - **Drag**: velocity-proportional resistance
//! - **Buoyancy**: upward force below a surface plus fluid drag
//!
//! Fields are evaluated in insertion order and may be restricted to a
//! region and/or an explicit body list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::body::{BodyHandle, BodySet, RigidBody};
use crate::collider::AABB;
use crate::fixed::Fix64;
use crate::math::Vec3Fix;

/// Force field definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForceField {
    /// Uniform acceleration, independent of mass
    Directional { acceleration: Vec3Fix },

    /// Point attractor with a capped inverse-square pull
    Gravitational {
        center: Vec3Fix,
        /// Acceleration at unit distance
        multiplier: Fix64,
        /// Cap near the centre
        max_acceleration: Fix64,
    },

    /// Linear drag, `F = -c·v`
    Drag { coefficient: Fix64 },

    /// Upward force proportional to depth below `surface_y`
    Buoyancy {
        surface_y: Fix64,
        density: Fix64,
        /// Fluid drag applied while submerged
        drag: Fix64,
    },
}

impl ForceField {
    /// Force this field exerts on `body`
    #[must_use]
    pub fn force_on(&self, body: &RigidBody) -> Vec3Fix {
        match *self {
            Self::Directional { acceleration } => acceleration * body.mass(),

            Self::Gravitational {
                center,
                multiplier,
                max_acceleration,
            } => {
                let delta = center - body.position;
                let (direction, dist) = delta.normalize_with_length();
                if direction.is_zero() {
                    return Vec3Fix::ZERO;
                }
                let pull = (multiplier / (dist * dist)).min(max_acceleration);
                direction * (pull * body.mass())
            }

            Self::Drag { coefficient } => -(body.linear_velocity * coefficient),

            Self::Buoyancy {
                surface_y,
                density,
                drag,
            } => {
                let depth = surface_y - body.position.y;
                if depth <= Fix64::ZERO {
                    return Vec3Fix::ZERO;
                }
                let lift = Vec3Fix::new(Fix64::ZERO, density * depth, Fix64::ZERO);
                lift - body.linear_velocity * drag
            }
        }
    }
}

/// Handle of a registered force field
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ForceFieldHandle(pub(crate) u32);

/// A force field with optional filters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceFieldInstance {
    pub field: ForceField,
    /// Only bodies whose origin lies inside this box are affected
    pub region: Option<AABB>,
    /// Only these bodies are affected
    pub affected_bodies: Option<Vec<BodyHandle>>,
    pub enabled: bool,
}

impl ForceFieldInstance {
    /// Field affecting every dynamic body
    #[must_use]
    pub fn new(field: ForceField) -> Self {
        Self {
            field,
            region: None,
            affected_bodies: None,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: AABB) -> Self {
        self.region = Some(region);
        self
    }

    #[must_use]
    pub fn with_affected_bodies(mut self, bodies: Vec<BodyHandle>) -> Self {
        self.affected_bodies = Some(bodies);
        self
    }

    #[inline]
    fn affects(&self, handle: BodyHandle, body: &RigidBody) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(region) = &self.region {
            if !region.contains_point(body.position) {
                return false;
            }
        }
        self.affected_bodies.as_ref().map_or(true, |list| list.contains(&handle))
    }
}

impl From<ForceField> for ForceFieldInstance {
    fn from(field: ForceField) -> Self {
        Self::new(field)
    }
}

/// Registered force fields in insertion order
#[derive(Clone, Debug, Default)]
pub struct ForceFieldSet {
    fields: BTreeMap<ForceFieldHandle, ForceFieldInstance>,
    next_id: u32,
}

impl ForceFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: ForceFieldInstance) -> ForceFieldHandle {
        let handle = ForceFieldHandle(self.next_id);
        self.next_id += 1;
        self.fields.insert(handle, field);
        handle
    }

    pub fn remove(&mut self, handle: ForceFieldHandle) -> Option<ForceFieldInstance> {
        self.fields.remove(&handle)
    }

    pub fn get(&self, handle: ForceFieldHandle) -> Option<&ForceFieldInstance> {
        self.fields.get(&handle)
    }

    pub fn get_mut(&mut self, handle: ForceFieldHandle) -> Option<&mut ForceFieldInstance> {
        self.fields.get_mut(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ForceFieldHandle, &ForceFieldInstance)> {
        self.fields.iter().map(|(h, f)| (*h, f))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Accumulate every field's force on the dynamic bodies
    pub fn apply(&self, bodies: &mut BodySet) {
        if self.fields.is_empty() {
            return;
        }
        for (handle, body) in bodies.iter_mut() {
            if !body.is_dynamic() || body.is_inert() {
                continue;
            }
            let mut total = Vec3Fix::ZERO;
            for field in self.fields.values() {
                if field.affects(handle, body) {
                    total += field.field.force_on(body);
                }
            }
            body.apply_force(total);
        }
    }
}
