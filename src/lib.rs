//! # fixstep
//!
//! **Deterministic Fixed-Point Rigid Body Physics**
//!
//! A 3D rigid body engine built entirely on Q31.32 fixed-point arithmetic.
//! Identical inputs produce bit-identical trajectories on every platform,
//! which makes it suitable for lockstep networking and replay validation.
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Fix64** | Saturating Q31.32 scalar with deterministic sqrt and trig |
//! | **Shapes** | Sphere, box, capsule, cylinder, cone, hull, Minkowski sum, compound, mesh, height field |
//! | **Broad Phase** | Dynamic AABB tree with fat, velocity-swept proxies |
//! | **Narrow Phase** | Analytic pairs, box SAT, GJK/EPA, persistent manifolds |
//! | **Solver** | Sequential impulses with warm starting and graph-coloured batches |
//! | **Joints** | Ball socket, distance, hinge (limits, motor), weld, spring, angular motor |
//! | **Events** | Began/ended listeners with deferred structural commands |
//! | **Queries** | Ray cast, convex cast, AABB overlap |
//! | **Verification** | Raw-state logs, replay comparison, SHA-256 state hashes |
//!
//! ## Design Principles
//!
//! - **No floats in the step**: every stage works on [`Fix64`]
//! - **Stable iteration**: bodies, pairs and constraints are visited in slot
//!   or insertion order, never hash order
//! - **Errors, not panics**: invalid shapes, stale handles and bad
//!   configuration return [`PhysicsError`]
//!
//! ## Quick Start
//!
//! ```rust
//! use fixstep::prelude::*;
//!
//! let mut space = Space::new(SpaceConfig::default());
//!
//! let ground = RigidBody::new_static(Vec3Fix::from_int(0, -1, 0))
//!     .with_shape(Shape::cuboid(Vec3Fix::from_int(10, 1, 10)).unwrap());
//! space.add_body(ground).unwrap();
//!
//! let ball = RigidBody::new_dynamic(Vec3Fix::from_int(0, 5, 0), Fix64::ONE)
//!     .with_shape(Shape::sphere(Fix64::HALF).unwrap());
//! let ball = space.add_body(ball).unwrap();
//!
//! for _ in 0..120 {
//!     space.update();
//! }
//! let y = space.position(ball).unwrap().y;
//! assert!(y < Fix64::ONE, "the ball has landed");
//! ```

pub mod body;
pub mod box_collider;
pub mod broadphase;
pub mod bvh;
pub mod collider;
pub mod contact_cache;
pub mod convex_hull;
pub mod dynamic_bvh;
pub mod error;
pub mod event;
pub mod filter;
pub mod fixed;
pub mod force;
pub mod gjk;
pub mod heightfield;
pub mod joint;
pub mod mass_properties;
pub mod material;
pub mod math;
pub mod narrowphase;
pub mod query;
pub mod raycast;
pub mod rng;
pub mod scenario;
pub mod shape;
pub mod solver;
pub mod space;
pub mod trimesh;
pub mod verify;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::body::{BodyHandle, BodyType, RigidBody};
    pub use crate::collider::{Contact, AABB};
    pub use crate::error::{PhysicsError, Result};
    pub use crate::event::{
        CollisionEvent, CollisionEventKind, CollisionListener, Command, CommandQueue, EndReason,
    };
    pub use crate::filter::{CollisionGroup, CollisionRule, CollisionRules};
    pub use crate::fixed::Fix64;
    pub use crate::force::{ForceField, ForceFieldHandle, ForceFieldInstance};
    pub use crate::heightfield::HeightField;
    pub use crate::joint::{HingeLimits, HingeMotor, Joint, JointHandle, JointKind, SpringSettings};
    pub use crate::material::{CombineRule, Material};
    pub use crate::math::{Mat3Fix, QuatFix, Transform, Vec3Fix};
    pub use crate::query::{ConvexHit, QueryFilter};
    pub use crate::raycast::{Ray, RayHit};
    pub use crate::rng::DeterministicRng;
    pub use crate::shape::{CompoundShape, ConvexShape, Shape};
    pub use crate::space::{Space, SpaceConfig, StepStats};
    pub use crate::trimesh::TriangleMesh;
    pub use crate::verify::{state_hash, DeterminismLog, Divergence, HashTrace, StateHash};
}

// Re-export main types at crate root
pub use prelude::*;
pub use contact_cache::ContactManifold;
pub use narrowphase::ContactPair;

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_sphere_lands_on_box() {
        let mut space = Space::default();
        let ground = RigidBody::new_static(Vec3Fix::from_int(0, -1, 0))
            .with_shape(Shape::cuboid(Vec3Fix::from_int(10, 1, 10)).expect("box"));
        space.add_body(ground).expect("ground");
        let ball = RigidBody::new_dynamic(Vec3Fix::from_int(0, 3, 0), Fix64::ONE)
            .with_shape(Shape::sphere(Fix64::HALF).expect("sphere"));
        let ball = space.add_body(ball).expect("ball");
        for _ in 0..180 {
            space.update();
        }
        let p = space.position(ball).expect("live");
        assert!((p.y - Fix64::HALF).abs() < Fix64::from_ratio(5, 100), "resting at radius height, got {}", p.y);
        let v = space.linear_velocity(ball).expect("live");
        assert!(v.y.abs() < Fix64::from_ratio(1, 10), "settled, vy {}", v.y);
    }

    #[test]
    fn test_prelude_round_trip_of_config() {
        let config = SpaceConfig {
            iterations: 6,
            ..SpaceConfig::default()
        };
        let json = config.to_json_string().expect("json");
        assert_eq!(SpaceConfig::from_json_str(&json).expect("parse").iterations, 6);
    }
}
