//! Surface Materials and Combine Rules
//!
//! Each body carries a [`Material`]. When two bodies touch, their friction
//! and restitution are merged with the [`CombineRule`]s configured on the
//! space.

use serde::{Deserialize, Serialize};

use crate::fixed::Fix64;

/// Combine rule for friction/restitution when two materials interact
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombineRule {
    /// Average of two values
    #[default]
    Average,
    /// Minimum of two values
    Min,
    /// Maximum of two values
    Max,
    /// Multiply two values
    Multiply,
}

impl CombineRule {
    /// Apply the combine rule to two values
    #[inline]
    pub fn apply(self, a: Fix64, b: Fix64) -> Fix64 {
        match self {
            CombineRule::Average => (a + b).half(),
            CombineRule::Min => a.min(b),
            CombineRule::Max => a.max(b),
            CombineRule::Multiply => a * b,
        }
    }
}

/// Surface response of a body
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Material {
    /// Coulomb friction coefficient
    pub friction: Fix64,
    /// Bounciness in [0, 1]
    pub restitution: Fix64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: Fix64::from_ratio(1, 2),
            restitution: Fix64::ZERO,
        }
    }
}

impl Material {
    /// Create a material; restitution is clamped into [0, 1] and friction
    /// to non-negative values
    pub fn new(friction: Fix64, restitution: Fix64) -> Self {
        Self {
            friction: friction.max(Fix64::ZERO),
            restitution: restitution.clamp(Fix64::ZERO, Fix64::ONE),
        }
    }

    /// Frictionless, perfectly elastic
    pub fn bouncy() -> Self {
        Self::new(Fix64::ZERO, Fix64::ONE)
    }

    /// Rubber-like: high friction, some bounce
    pub fn rubber() -> Self {
        Self::new(Fix64::from_ratio(9, 10), Fix64::from_ratio(6, 10))
    }

    /// Ice-like: almost no friction
    pub fn ice() -> Self {
        Self::new(Fix64::from_ratio(2, 100), Fix64::from_ratio(5, 100))
    }
}

/// Material parameters for a contact pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CombinedMaterial {
    pub friction: Fix64,
    pub restitution: Fix64,
}

/// Merge two materials with the given rules
#[inline]
pub fn combine(a: &Material, b: &Material, friction: CombineRule, restitution: CombineRule) -> CombinedMaterial {
    CombinedMaterial {
        friction: friction.apply(a.friction, b.friction),
        restitution: restitution.apply(a.restitution, b.restitution),
    }
}
