//! Persistent Contact Manifolds with Warm Starting
//!
//! A manifold holds up to four contact points for one body pair and lives
//! across steps, so the solver can start each step from the impulses it
//! found in the previous one.
//!
//! # Features
//!
//! - **4-point reduction**: deepest point, farthest from it, farthest from
//!   that line, then the point adding the most area
//! - **Anchor matching**: new points inherit accumulated impulses from the
//!   previous point whose anchor in body A's local frame lies within
//!   [`WARM_START_DISTANCE_SQ`]
//! - **Persistence for single-point generators**: GJK/EPA report one point
//!   per step; earlier points are kept while they remain within
//!   [`CONTACT_BREAKING_DISTANCE`] both along and across the normal

use crate::collider::Contact;
use crate::fixed::Fix64;
use crate::math::{Transform, Vec3Fix};

/// Maximum contact points per manifold
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Squared anchor distance for matching a point to last step's point (0.01 m)
pub const WARM_START_DISTANCE_SQ: Fix64 = Fix64::from_ratio(1, 10_000);

/// Separation or tangential drift beyond which a kept point is dropped
pub const CONTACT_BREAKING_DISTANCE: Fix64 = Fix64::from_ratio(2, 100);

/// A single contact point within a manifold
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManifoldPoint {
    /// Surface point on A, in A's local frame
    pub local_a: Vec3Fix,
    /// Surface point on B, in B's local frame
    pub local_b: Vec3Fix,
    /// World contact point (midway between the surfaces)
    pub point: Vec3Fix,
    /// World normal, A to B
    pub normal: Vec3Fix,
    /// Signed depth, `> 0` penetrating
    pub depth: Fix64,
    /// Accumulated normal impulse
    pub normal_impulse: Fix64,
    /// Accumulated friction impulses along the two tangents
    pub tangent_impulse: [Fix64; 2],
    /// Steps this point has been matched in a row
    pub age: u32,
}

impl ManifoldPoint {
    fn from_contact(contact: &Contact, ta: &Transform, tb: &Transform) -> Self {
        Self {
            local_a: ta.inverse_transform_point(contact.point_on_a()),
            local_b: tb.inverse_transform_point(contact.point_on_b()),
            point: contact.point,
            normal: contact.normal,
            depth: contact.depth,
            normal_impulse: Fix64::ZERO,
            tangent_impulse: [Fix64::ZERO; 2],
            age: 0,
        }
    }

    /// The point as a plain contact
    #[inline]
    pub fn contact(&self) -> Contact {
        Contact::new(self.point, self.normal, self.depth)
    }
}

/// Contact manifold for one body pair
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContactManifold {
    /// Normal of the deepest point
    pub normal: Vec3Fix,
    points: Vec<ManifoldPoint>,
}

impl ContactManifold {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points
    }

    #[inline]
    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.normal = Vec3Fix::ZERO;
    }

    /// At least one point the solver acts on: penetrating, or separated by
    /// no more than [`CONTACT_BREAKING_DISTANCE`]
    pub fn is_touching(&self) -> bool {
        self.points.iter().any(|p| p.depth >= -CONTACT_BREAKING_DISTANCE)
    }

    /// Largest depth, if any point exists
    pub fn max_depth(&self) -> Option<Fix64> {
        self.points.iter().map(|p| p.depth).max()
    }

    /// Replace the manifold with this step's contacts.
    ///
    /// `persistent` keeps valid points from the previous step alongside the
    /// new ones; use it for generators that report a single point.
    pub fn update(&mut self, contacts: &[Contact], ta: &Transform, tb: &Transform, persistent: bool) {
        let mut candidates: Vec<Contact> = contacts.to_vec();

        if persistent {
            let normal = contacts.first().map_or(self.normal, |c| c.normal);
            for old in &self.points {
                if let Some(refreshed) = refresh(old, normal, ta, tb) {
                    let local_a = ta.inverse_transform_point(refreshed.point_on_a());
                    let duplicate = contacts.iter().any(|c| {
                        let anchor = ta.inverse_transform_point(c.point_on_a());
                        (anchor - local_a).length_squared() < WARM_START_DISTANCE_SQ
                    });
                    if !duplicate {
                        candidates.push(refreshed);
                    }
                }
            }
        }

        let reduced = reduce_contacts(&candidates);
        let mut matched = [false; MAX_MANIFOLD_POINTS];
        let mut next = Vec::with_capacity(reduced.len());
        for contact in &reduced {
            let mut point = ManifoldPoint::from_contact(contact, ta, tb);
            let mut best: Option<usize> = None;
            let mut best_dist = WARM_START_DISTANCE_SQ;
            for (i, old) in self.points.iter().enumerate() {
                if matched[i] {
                    continue;
                }
                let dist = (old.local_a - point.local_a).length_squared();
                if dist < best_dist {
                    best_dist = dist;
                    best = Some(i);
                }
            }
            if let Some(i) = best {
                matched[i] = true;
                let old = &self.points[i];
                point.normal_impulse = old.normal_impulse;
                point.tangent_impulse = old.tangent_impulse;
                point.age = old.age + 1;
            }
            next.push(point);
        }

        self.normal = next.first().map_or(Vec3Fix::ZERO, |p| p.normal);
        self.points = next;
    }
}

/// Re-evaluate an old point at the bodies' current transforms
fn refresh(old: &ManifoldPoint, normal: Vec3Fix, ta: &Transform, tb: &Transform) -> Option<Contact> {
    let on_a = ta.transform_point(old.local_a);
    let on_b = tb.transform_point(old.local_b);
    let gap = on_a - on_b;
    let depth = gap.dot(normal);
    if depth < -CONTACT_BREAKING_DISTANCE {
        return None;
    }
    let drift = gap - normal * depth;
    if drift.length() > CONTACT_BREAKING_DISTANCE {
        return None;
    }
    Some(Contact::new((on_a + on_b) * Fix64::HALF, normal, depth))
}

/// Reduce a contact set to at most [`MAX_MANIFOLD_POINTS`].
///
/// Order of the result: deepest, farthest from it, farthest from their
/// line, then the point that enlarges the contact polygon the most.
pub fn reduce_contacts(contacts: &[Contact]) -> Vec<Contact> {
    if contacts.len() <= MAX_MANIFOLD_POINTS {
        return contacts.to_vec();
    }

    let argmax = |score: &dyn Fn(&Contact) -> Fix64, skip: &[usize]| -> usize {
        let mut best = usize::MAX;
        let mut best_score = Fix64::MIN;
        for (i, c) in contacts.iter().enumerate() {
            if skip.contains(&i) {
                continue;
            }
            let s = score(c);
            if best == usize::MAX || s > best_score {
                best = i;
                best_score = s;
            }
        }
        best
    };

    let i0 = argmax(&|c| c.depth, &[]);
    let p0 = contacts[i0].point;
    let i1 = argmax(&|c| (c.point - p0).length(), &[i0]);
    let p1 = contacts[i1].point;
    let edge = p1 - p0;
    let i2 = argmax(&|c| edge.cross(c.point - p0).length(), &[i0, i1]);
    let p2 = contacts[i2].point;

    // Orient the triangle counter-clockwise around the contact normal
    let normal = contacts[i0].normal;
    let (q1, q2) = if edge.cross(p2 - p0).dot(normal).is_negative() {
        (p2, p1)
    } else {
        (p1, p2)
    };
    let triangle = [p0, q1, q2];
    let outside = |c: &Contact| -> Fix64 {
        let mut worst = Fix64::MAX;
        for k in 0..3 {
            let a = triangle[k];
            let b = triangle[(k + 1) % 3];
            let signed = (b - a).cross(c.point - a).dot(normal);
            worst = worst.min(signed);
        }
        -worst
    };
    let i3 = argmax(&outside, &[i0, i1, i2]);

    vec![contacts[i0], contacts[i1], contacts[i2], contacts[i3]]
}

/// Orthonormal tangents spanning the plane perpendicular to `normal`
#[inline]
pub fn tangent_frame(normal: Vec3Fix) -> (Vec3Fix, Vec3Fix) {
    normal.orthonormal_basis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_at(x: i64, z: i64, depth: Fix64) -> Contact {
        Contact::new(Vec3Fix::from_int(x, 0, z), Vec3Fix::UNIT_Y, depth)
    }

    #[test]
    fn test_reduce_keeps_small_sets() {
        let cs = [contact_at(0, 0, Fix64::ONE), contact_at(1, 0, Fix64::ONE)];
        assert_eq!(reduce_contacts(&cs), cs.to_vec());
    }

    #[test]
    fn test_reduce_to_four() {
        let small = Fix64::from_ratio(1, 100);
        let cs = vec![
            contact_at(0, 0, small),
            contact_at(1, 1, small),
            contact_at(-1, -1, small),
            contact_at(2, 0, Fix64::HALF), // deepest
            contact_at(-2, 0, small),
            contact_at(0, 2, small),
            contact_at(0, -2, small),
        ];
        let reduced = reduce_contacts(&cs);
        assert_eq!(reduced.len(), 4);
        assert_eq!(reduced[0].point, Vec3Fix::from_int(2, 0, 0), "deepest first");
        assert_eq!(reduced[1].point, Vec3Fix::from_int(-2, 0, 0), "farthest from deepest");
        let rest: Vec<_> = reduced[2..].iter().map(|c| c.point).collect();
        assert!(rest.contains(&Vec3Fix::from_int(0, 0, 2)), "{rest:?}");
        assert!(rest.contains(&Vec3Fix::from_int(0, 0, -2)), "{rest:?}");
    }

    #[test]
    fn test_warm_start_matching() {
        let t = Transform::IDENTITY;
        let mut m = ContactManifold::new();
        m.update(&[contact_at(0, 0, Fix64::HALF)], &t, &t, false);
        m.points_mut()[0].normal_impulse = Fix64::from_int(7);

        // Moved by less than 1 cm: impulse survives
        let nudged = Contact::new(
            Vec3Fix::new(Fix64::from_ratio(5, 1000), Fix64::ZERO, Fix64::ZERO),
            Vec3Fix::UNIT_Y,
            Fix64::HALF,
        );
        m.update(&[nudged], &t, &t, false);
        assert_eq!(m.points()[0].normal_impulse, Fix64::from_int(7), "matched point inherits impulse");
        assert_eq!(m.points()[0].age, 1);

        // Moved by 2 cm: a fresh point
        let moved = Contact::new(
            Vec3Fix::new(Fix64::from_ratio(25, 1000), Fix64::ZERO, Fix64::ZERO),
            Vec3Fix::UNIT_Y,
            Fix64::HALF,
        );
        m.update(&[moved], &t, &t, false);
        assert_eq!(m.points()[0].normal_impulse, Fix64::ZERO, "unmatched point starts cold");
    }

    #[test]
    fn test_persistent_keeps_valid_points() {
        let t = Transform::IDENTITY;
        let mut m = ContactManifold::new();
        let depth = Fix64::from_ratio(1, 100);
        m.update(&[contact_at(1, 0, depth)], &t, &t, true);
        m.update(&[contact_at(-1, 0, depth)], &t, &t, true);
        assert_eq!(m.len(), 2, "old point is still within breaking distance");

        // Body B moves away along the normal: old points break
        let away = Transform::from_position(Vec3Fix::from_int(0, 1, 0));
        m.update(&[contact_at(0, 3, depth)], &t, &away, true);
        assert_eq!(m.len(), 1, "separated points are dropped");
    }

    #[test]
    fn test_touching_state() {
        let t = Transform::IDENTITY;
        let mut m = ContactManifold::new();
        assert!(!m.is_touching(), "empty manifold");
        m.update(&[contact_at(0, 0, Fix64::from_ratio(-1, 100))], &t, &t, false);
        assert!(m.is_touching(), "speculative points inside the breaking distance count");
        m.update(&[contact_at(0, 0, Fix64::ZERO)], &t, &t, false);
        assert!(m.is_touching(), "zero depth counts as touching");
        m.update(&[contact_at(0, 0, Fix64::from_ratio(-3, 100))], &t, &t, false);
        assert!(!m.is_touching(), "beyond the breaking distance");
        m.update(&[], &t, &t, false);
        assert!(!m.is_touching());
    }

    #[test]
    fn test_tangent_frame_orthonormal() {
        let n = Vec3Fix::new(Fix64::ONE, Fix64::TWO, Fix64::from_int(3)).normalize();
        let (t1, t2) = tangent_frame(n);
        let tol = Fix64::from_ratio(1, 10_000);
        assert!(t1.dot(n).abs() < tol);
        assert!(t2.dot(n).abs() < tol);
        assert!(t1.dot(t2).abs() < tol);
        assert!((t1.length() - Fix64::ONE).abs() < tol);
    }
}
