//! Broad Phase
//!
//! One [`DynamicAabbTree`] proxy per collidable body, keyed by the body's
//! arena slot. Every step the proxies are refitted against velocity-swept
//! bounds and the candidate pair list is rebuilt.
//!
//! # Guarantees
//!
//! - Any two bodies whose current AABBs overlap are reported (fat boxes
//!   always contain the tight box, so there are no false negatives)
//! - Pairs come out sorted by `(slot a, slot b)` with `a < b`

use std::collections::BTreeMap;

use crate::body::{BodySet, RigidBody};
use crate::collider::AABB;
use crate::dynamic_bvh::{DynamicAabbTree, ProxyId, NULL_NODE};
use crate::filter::{CollisionRule, CollisionRules};
use crate::fixed::Fix64;
use crate::math::Vec3Fix;

/// Candidate pair produced by the broad phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BroadPair {
    /// Lower slot index
    pub a: u32,
    /// Higher slot index
    pub b: u32,
    /// Effective collision rule for the pair
    pub rule: CollisionRule,
}

#[inline]
fn ordered(a: u32, b: u32) -> (u32, u32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Effective rule for two bodies, or `None` if the pair is never collided
pub fn pair_rule(a: &RigidBody, b: &RigidBody, rules: &CollisionRules) -> Option<CollisionRule> {
    if a.is_inert() || b.is_inert() {
        return None;
    }
    // Neither side can respond to the other
    if !a.is_dynamic() && !b.is_dynamic() && !a.is_sensor && !b.is_sensor {
        return None;
    }
    let rule = rules.resolve(a.group, a.is_sensor, b.group, b.is_sensor);
    rule.allows_broad_phase().then_some(rule)
}

/// Dynamic-tree broad phase
#[derive(Clone, Debug, Default)]
pub struct BroadPhase {
    tree: DynamicAabbTree,
    /// Proxy per body slot (`NULL_NODE` when absent)
    proxies: Vec<ProxyId>,
    /// Explicitly excluded slot pairs with a reference count
    excluded: BTreeMap<(u32, u32), u32>,
    pairs: Vec<BroadPair>,
}

impl BroadPhase {
    /// Empty broad phase with the given fat margin
    pub fn new(fat_margin: Fix64) -> Self {
        Self {
            tree: DynamicAabbTree::with_margin(fat_margin),
            ..Self::default()
        }
    }

    /// Fat margin used for (re)inserted proxies
    #[inline]
    pub fn fat_margin(&self) -> Fix64 {
        self.tree.margin
    }

    pub fn set_fat_margin(&mut self, margin: Fix64) {
        self.tree.margin = margin;
    }

    #[inline]
    fn proxy(&self, slot: u32) -> Option<ProxyId> {
        self.proxies.get(slot as usize).copied().filter(|&p| p != NULL_NODE)
    }

    /// Whether a slot currently has a proxy
    #[inline]
    pub fn contains(&self, slot: u32) -> bool {
        self.proxy(slot).is_some()
    }

    /// Insert (or replace) the proxy of a slot
    pub fn insert(&mut self, slot: u32, aabb: AABB) {
        self.remove(slot);
        if self.proxies.len() <= slot as usize {
            self.proxies.resize(slot as usize + 1, NULL_NODE);
        }
        self.proxies[slot as usize] = self.tree.insert(aabb, slot);
    }

    /// Drop a slot's proxy and every cached pair that references it
    ///
    /// Pair exclusions are kept; their owners (joints) release them.
    pub fn remove(&mut self, slot: u32) -> bool {
        let Some(proxy) = self.proxy(slot) else {
            return false;
        };
        self.tree.remove(proxy);
        self.proxies[slot as usize] = NULL_NODE;
        self.pairs.retain(|p| p.a != slot && p.b != slot);
        true
    }

    /// Refit a proxy against its tight box swept by `displacement`
    ///
    /// Returns `true` if the proxy was reinserted.
    pub fn update(&mut self, slot: u32, aabb: AABB, displacement: Vec3Fix) -> bool {
        match self.proxy(slot) {
            Some(proxy) => self.tree.update(proxy, aabb.swept(displacement)),
            None => false,
        }
    }

    /// Stored fat box of a slot
    pub fn fat_aabb(&self, slot: u32) -> Option<AABB> {
        self.proxy(slot).map(|p| self.tree.fat_aabb(p))
    }

    /// Never pair `a` and `b` (reference counted)
    pub fn exclude_pair(&mut self, a: u32, b: u32) {
        *self.excluded.entry(ordered(a, b)).or_insert(0) += 1;
    }

    /// Undo one [`Self::exclude_pair`]
    pub fn include_pair(&mut self, a: u32, b: u32) {
        let key = ordered(a, b);
        if let Some(count) = self.excluded.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.excluded.remove(&key);
            }
        }
    }

    #[inline]
    pub fn is_excluded(&self, a: u32, b: u32) -> bool {
        self.excluded.contains_key(&ordered(a, b))
    }

    /// Rebuild the filtered, sorted candidate list
    pub fn compute_pairs(&mut self, bodies: &BodySet, rules: &CollisionRules) -> &[BroadPair] {
        let mut pairs = Vec::new();
        for (a, b) in self.tree.find_pairs() {
            if self.is_excluded(a, b) {
                continue;
            }
            let (Some(ba), Some(bb)) = (bodies.by_index(a), bodies.by_index(b)) else {
                continue;
            };
            if let Some(rule) = pair_rule(ba, bb, rules) {
                pairs.push(BroadPair { a, b, rule });
            }
        }
        self.pairs = pairs;
        &self.pairs
    }

    /// Pairs from the last [`Self::compute_pairs`]
    #[inline]
    pub fn pairs(&self) -> &[BroadPair] {
        &self.pairs
    }

    /// Slots whose fat box overlaps `aabb`, ascending
    pub fn query(&self, aabb: &AABB) -> Vec<u32> {
        self.tree.query(aabb)
    }

    /// Slots whose fat box the ray touches, ascending
    pub fn ray_query(&self, origin: Vec3Fix, direction: Vec3Fix, max_t: Fix64) -> Vec<u32> {
        self.tree.ray_query(origin, direction, max_t)
    }

    /// Number of proxies
    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.tree.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic_bvh::DEFAULT_FAT_MARGIN;
    use crate::filter::CollisionGroup;
    use crate::rng::DeterministicRng;
    use crate::shape::Shape;

    fn dyn_box(p: Vec3Fix) -> RigidBody {
        RigidBody::new_dynamic(p, Fix64::ONE).with_shape(Shape::cuboid(Vec3Fix::ONE).expect("box"))
    }

    fn fill(bodies: &BodySet, bp: &mut BroadPhase) {
        for (h, b) in bodies.iter() {
            if let Some(shape) = b.shape() {
                bp.insert(h.index(), shape.aabb(&b.transform()));
            }
        }
    }

    #[test]
    fn test_pairs_sorted_and_filtered() {
        let mut bodies = BodySet::new();
        bodies.insert(dyn_box(Vec3Fix::from_int(0, 0, 0)));
        bodies.insert(RigidBody::new_static(Vec3Fix::from_int(1, 0, 0)).with_shape(Shape::cuboid(Vec3Fix::ONE).expect("box")));
        bodies.insert(RigidBody::new_static(Vec3Fix::from_int(2, 0, 0)).with_shape(Shape::cuboid(Vec3Fix::ONE).expect("box")));
        bodies.insert(dyn_box(Vec3Fix::from_int(50, 0, 0)));

        let mut bp = BroadPhase::new(DEFAULT_FAT_MARGIN);
        fill(&bodies, &mut bp);
        let pairs: Vec<(u32, u32)> = bp
            .compute_pairs(&bodies, &CollisionRules::new())
            .iter()
            .map(|p| (p.a, p.b))
            .collect();
        // Static-static (1,2) is dropped, (0,2) overlaps at x = 1
        assert_eq!(pairs, vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn test_rules_and_exclusions() {
        let mut bodies = BodySet::new();
        bodies.insert(dyn_box(Vec3Fix::ZERO).with_group(CollisionGroup::PLAYER));
        bodies.insert(dyn_box(Vec3Fix::UNIT_X).with_group(CollisionGroup::PROJECTILE_PLAYER));
        bodies.insert(dyn_box(Vec3Fix::UNIT_Y));

        let mut bp = BroadPhase::new(DEFAULT_FAT_MARGIN);
        fill(&bodies, &mut bp);
        let preset = bp.compute_pairs(&bodies, &CollisionRules::game_preset()).to_vec();
        assert_eq!(preset.len(), 3, "the preset leaves player and own projectile alone");
        assert_eq!(preset[0].rule, CollisionRule::Normal);

        let rules = CollisionRules::game_preset().with(
            CollisionGroup::PLAYER,
            CollisionGroup::PROJECTILE_PLAYER,
            CollisionRule::NoBroadPhase,
        );
        let pairs: Vec<(u32, u32)> = bp.compute_pairs(&bodies, &rules).iter().map(|p| (p.a, p.b)).collect();
        assert_eq!(pairs, vec![(0, 2), (1, 2)], "NoBroadPhase pairs are pruned");

        bp.exclude_pair(2, 0);
        let pairs: Vec<(u32, u32)> = bp.compute_pairs(&bodies, &rules).iter().map(|p| (p.a, p.b)).collect();
        assert_eq!(pairs, vec![(1, 2)]);
        bp.include_pair(0, 2);
        assert!(!bp.is_excluded(0, 2));
    }

    #[test]
    fn test_sensor_pairs_with_static() {
        let mut bodies = BodySet::new();
        bodies.insert(RigidBody::new_static(Vec3Fix::ZERO).with_shape(Shape::cuboid(Vec3Fix::ONE).expect("box")));
        bodies.insert(
            RigidBody::new_kinematic(Vec3Fix::ZERO)
                .with_shape(Shape::sphere(Fix64::ONE).expect("sphere"))
                .as_sensor(),
        );
        let mut bp = BroadPhase::new(DEFAULT_FAT_MARGIN);
        fill(&bodies, &mut bp);
        let pairs = bp.compute_pairs(&bodies, &CollisionRules::new());
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].rule, CollisionRule::NoSolver);
    }

    #[test]
    fn test_soundness_against_brute_force() {
        let mut rng = DeterministicRng::new(7);
        let mut bodies = BodySet::new();
        let extent = Vec3Fix::from_int(20, 20, 20);
        for _ in 0..120 {
            bodies.insert(dyn_box(rng.next_vec3_in_box(-extent, extent)));
        }
        let mut bp = BroadPhase::new(DEFAULT_FAT_MARGIN);
        fill(&bodies, &mut bp);

        // Move everything and refit with a sweep
        let moves: Vec<(u32, Vec3Fix)> = bodies
            .iter()
            .map(|(h, _)| (h.index(), rng.next_vec3_in_box(-Vec3Fix::ONE, Vec3Fix::ONE)))
            .collect();
        for (slot, d) in moves {
            let b = bodies.by_index_mut(slot).expect("live");
            b.position += d;
            let aabb = b.shape().expect("shape").aabb(&b.transform());
            bp.update(slot, aabb, d);
        }

        let found: Vec<(u32, u32)> = bp
            .compute_pairs(&bodies, &CollisionRules::new())
            .iter()
            .map(|p| (p.a, p.b))
            .collect();
        let boxes: Vec<(u32, AABB)> = bodies
            .iter()
            .map(|(h, b)| (h.index(), b.shape().expect("shape").aabb(&b.transform())))
            .collect();
        for (i, (sa, a)) in boxes.iter().enumerate() {
            for (sb, b) in &boxes[i + 1..] {
                if a.intersects(b) {
                    assert!(found.binary_search(&(*sa, *sb)).is_ok(), "missed pair ({sa}, {sb})");
                }
            }
        }
    }

    #[test]
    fn test_remove_drops_pairs() {
        let mut bodies = BodySet::new();
        bodies.insert(dyn_box(Vec3Fix::ZERO));
        bodies.insert(dyn_box(Vec3Fix::UNIT_X));
        let mut bp = BroadPhase::new(DEFAULT_FAT_MARGIN);
        fill(&bodies, &mut bp);
        assert_eq!(bp.compute_pairs(&bodies, &CollisionRules::new()).len(), 1);
        assert!(bp.remove(1));
        assert!(!bp.remove(1), "Second remove is a no-op");
        assert!(bp.pairs().is_empty());
        assert_eq!(bp.proxy_count(), 1);
    }
}
