//! Collision Filtering (Groups and Rules)
//!
//! Every body belongs to one [`CollisionGroup`]. A [`CollisionRules`] table
//! maps unordered group pairs to a [`CollisionRule`] that decides how far
//! down the pipeline a pair may travel.
//!
//! # Usage
//!
//! ```
//! use fixstep::filter::{CollisionGroup, CollisionRule, CollisionRules};
//!
//! let rules = CollisionRules::game_preset();
//! assert_eq!(
//!     rules.rule(CollisionGroup::PLAYER, CollisionGroup::AREA),
//!     CollisionRule::NoSolver
//! );
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Collision group id
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollisionGroup(pub u16);

impl CollisionGroup {
    /// Default group for world geometry and props
    pub const DEFAULT: Self = Self(0);
    /// Player characters
    pub const PLAYER: Self = Self(1);
    /// Enemy characters
    pub const ENEMY: Self = Self(2);
    /// Projectiles fired by players
    pub const PROJECTILE_PLAYER: Self = Self(3);
    /// Projectiles fired by enemies
    pub const PROJECTILE_ENEMY: Self = Self(4);
    /// Trigger areas
    pub const AREA: Self = Self(5);

    /// All presets, in id order
    pub const PRESETS: [Self; 6] = [
        Self::DEFAULT,
        Self::PLAYER,
        Self::ENEMY,
        Self::PROJECTILE_PLAYER,
        Self::PROJECTILE_ENEMY,
        Self::AREA,
    ];
}

/// How far a pair travels through the pipeline.
///
/// Variants are ordered from most permissive to most restrictive, so the
/// effective rule of several sources is their maximum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CollisionRule {
    /// Contacts, events and impulses
    #[default]
    Normal,
    /// Contacts and events, but no impulses
    NoSolver,
    /// Broad-phase pair only, no contacts
    NoNarrowPhase,
    /// Never paired
    NoBroadPhase,
}

impl CollisionRule {
    /// Whether the broad phase keeps the pair
    #[inline]
    pub fn allows_broad_phase(self) -> bool {
        self < CollisionRule::NoBroadPhase
    }

    /// Whether contacts are generated
    #[inline]
    pub fn allows_narrow_phase(self) -> bool {
        self < CollisionRule::NoNarrowPhase
    }

    /// Whether the solver applies impulses
    #[inline]
    pub fn allows_solver(self) -> bool {
        self == CollisionRule::Normal
    }
}

/// Rule table keyed by unordered group pair
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionRules {
    /// Rule for pairs without an entry
    pub default_rule: CollisionRule,
    /// Explicit pair rules, keyed `(low, high)`
    #[serde(with = "pair_table")]
    pairs: BTreeMap<(CollisionGroup, CollisionGroup), CollisionRule>,
}

#[inline]
fn key(a: CollisionGroup, b: CollisionGroup) -> (CollisionGroup, CollisionGroup) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl CollisionRules {
    /// Empty table with the `Normal` default
    pub fn new() -> Self {
        Self::default()
    }

    /// The group table the demo game ships with: every group passes through
    /// `AREA`, and enemy projectiles report hits on the player without
    /// pushing it
    pub fn game_preset() -> Self {
        let mut rules = Self::new();
        for group in CollisionGroup::PRESETS {
            if group != CollisionGroup::AREA {
                rules.set(group, CollisionGroup::AREA, CollisionRule::NoSolver);
            }
        }
        rules.set(
            CollisionGroup::PLAYER,
            CollisionGroup::PROJECTILE_ENEMY,
            CollisionRule::NoSolver,
        );
        rules
    }

    /// Set the rule for a group pair (order does not matter)
    pub fn set(&mut self, a: CollisionGroup, b: CollisionGroup, rule: CollisionRule) {
        self.pairs.insert(key(a, b), rule);
    }

    /// Builder form of [`Self::set`]
    pub fn with(mut self, a: CollisionGroup, b: CollisionGroup, rule: CollisionRule) -> Self {
        self.set(a, b, rule);
        self
    }

    /// Remove an explicit pair rule
    pub fn clear(&mut self, a: CollisionGroup, b: CollisionGroup) -> Option<CollisionRule> {
        self.pairs.remove(&key(a, b))
    }

    /// Rule for a group pair
    #[inline]
    pub fn rule(&self, a: CollisionGroup, b: CollisionGroup) -> CollisionRule {
        self.pairs.get(&key(a, b)).copied().unwrap_or(self.default_rule)
    }

    /// Effective rule for two bodies, taking sensors into account
    pub fn resolve(&self, a: CollisionGroup, a_sensor: bool, b: CollisionGroup, b_sensor: bool) -> CollisionRule {
        let rule = self.rule(a, b);
        if a_sensor || b_sensor {
            rule.max(CollisionRule::NoSolver)
        } else {
            rule
        }
    }

    /// Number of explicit pair rules
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// JSON maps need string keys, so the pair table travels as a list
mod pair_table {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{key, CollisionGroup, CollisionRule};

    #[derive(Serialize, Deserialize)]
    struct Entry {
        a: CollisionGroup,
        b: CollisionGroup,
        rule: CollisionRule,
    }

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<(CollisionGroup, CollisionGroup), CollisionRule>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let entries: Vec<Entry> = map
            .iter()
            .map(|(&(a, b), &rule)| Entry { a, b, rule })
            .collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<(CollisionGroup, CollisionGroup), CollisionRule>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (key(e.a, e.b), e.rule)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_order() {
        assert!(CollisionRule::Normal < CollisionRule::NoSolver);
        assert!(CollisionRule::NoSolver < CollisionRule::NoNarrowPhase);
        assert!(CollisionRule::NoNarrowPhase < CollisionRule::NoBroadPhase);
        assert!(CollisionRule::NoSolver.allows_narrow_phase());
        assert!(!CollisionRule::NoSolver.allows_solver());
        assert!(!CollisionRule::NoBroadPhase.allows_broad_phase());
    }

    #[test]
    fn test_unordered_pairs() {
        let rules = CollisionRules::new().with(CollisionGroup(7), CollisionGroup(3), CollisionRule::NoNarrowPhase);
        assert_eq!(rules.rule(CollisionGroup(3), CollisionGroup(7)), CollisionRule::NoNarrowPhase);
        assert_eq!(rules.rule(CollisionGroup(7), CollisionGroup(3)), CollisionRule::NoNarrowPhase);
        assert_eq!(rules.rule(CollisionGroup(1), CollisionGroup(3)), CollisionRule::Normal);
    }

    #[test]
    fn test_game_preset() {
        let rules = CollisionRules::game_preset();
        assert_eq!(rules.len(), 6, "five AREA rules plus PLAYER vs PROJECTILE_ENEMY");
        for g in CollisionGroup::PRESETS {
            if g != CollisionGroup::AREA {
                assert_eq!(rules.rule(g, CollisionGroup::AREA), CollisionRule::NoSolver, "{g:?} vs AREA");
            }
        }
        assert_eq!(
            rules.rule(CollisionGroup::PROJECTILE_ENEMY, CollisionGroup::PLAYER),
            CollisionRule::NoSolver
        );
        assert_eq!(rules.rule(CollisionGroup::AREA, CollisionGroup::AREA), CollisionRule::Normal);
        assert_eq!(
            rules.rule(CollisionGroup::PLAYER, CollisionGroup::PROJECTILE_PLAYER),
            CollisionRule::Normal
        );
        assert_eq!(
            rules.rule(CollisionGroup::ENEMY, CollisionGroup::PROJECTILE_ENEMY),
            CollisionRule::Normal
        );
        assert_eq!(rules.rule(CollisionGroup::PLAYER, CollisionGroup::ENEMY), CollisionRule::Normal);
    }

    #[test]
    fn test_sensor_at_least_no_solver() {
        let rules = CollisionRules::new().with(CollisionGroup(1), CollisionGroup(2), CollisionRule::NoBroadPhase);
        let d = CollisionGroup::DEFAULT;
        assert_eq!(rules.resolve(d, true, d, false), CollisionRule::NoSolver);
        assert_eq!(rules.resolve(d, false, d, false), CollisionRule::Normal);
        // A stricter table rule still wins
        assert_eq!(
            rules.resolve(CollisionGroup(1), true, CollisionGroup(2), false),
            CollisionRule::NoBroadPhase
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let rules = CollisionRules::game_preset();
        let json = serde_json::to_string(&rules).expect("serialize");
        let back: CollisionRules = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, rules);
    }
}
