//! Clock cycle timing attached to every [crate::Exit].
//!
//! A latency is either absolute, with known minimum and maximum clock counts,
//! or open, anchored to a [LatencyKey] whose timing is only known at run time.
//! Several latencies can be combined: an `And` latency completes when all of
//! its members have completed and an `Or` latency when any of them has.
use crate::ExitIdx;
use lim_utils::{Error, LimResult};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The origin of an open latency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LatencyKey {
    /// The start of the enclosing procedure.
    Base,
    /// The completion of an exit with unknown timing.
    Exit(ExitIdx),
}

/// Key of an `And` latency. The origin never takes part in comparisons: two
/// `And` latencies over the same members complete at the same clock.
#[derive(Clone, Copy, Debug)]
pub struct AndKey(pub LatencyKey);

impl PartialEq for AndKey {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for AndKey {}

impl PartialOrd for AndKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AndKey {
    fn cmp(&self, _other: &Self) -> std::cmp::Ordering {
        std::cmp::Ordering::Equal
    }
}

impl Hash for AndKey {
    fn hash<H: Hasher>(&self, _state: &mut H) {}
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Latency {
    Absolute {
        min: u32,
        max: u32,
        key: LatencyKey,
    },
    Open {
        min: u32,
        key: LatencyKey,
    },
    And {
        set: BTreeSet<Latency>,
        key: AndKey,
    },
    Or {
        set: BTreeSet<Latency>,
        key: LatencyKey,
    },
}

impl Latency {
    pub const ZERO: Latency = Latency::Absolute {
        min: 0,
        max: 0,
        key: LatencyKey::Base,
    };

    pub const ONE: Latency = Latency::Absolute {
        min: 1,
        max: 1,
        key: LatencyKey::Base,
    };

    /// An absolute latency of between `min` and `max` clocks.
    pub fn get(min: u32, max: u32) -> LimResult<Latency> {
        if max < min {
            return Err(Error::misc(format!("invalid clocks: {min},{max}")));
        }
        Ok(Latency::ZERO.increment(min, max))
    }

    /// An absolute latency of exactly `clocks` clocks.
    pub fn fixed(clocks: u32) -> Latency {
        Latency::Absolute {
            min: clocks,
            max: clocks,
            key: LatencyKey::Base,
        }
    }

    /// Completes when any member completes. A single member stands for
    /// itself.
    pub fn or(set: BTreeSet<Latency>, key: LatencyKey) -> Latency {
        if set.len() == 1 {
            return set.into_iter().next().unwrap_or(Latency::ZERO);
        }
        let set = set
            .into_iter()
            .flat_map(|l| match l {
                Latency::Or { set, .. } => set.into_iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect();
        Latency::Or { set, key }
    }

    /// Completes when every member has completed. A single member stands for
    /// itself.
    pub fn and(set: BTreeSet<Latency>, key: LatencyKey) -> Latency {
        if set.len() == 1 {
            return set.into_iter().next().unwrap_or(Latency::ZERO);
        }
        let set = set
            .into_iter()
            .flat_map(|l| match l {
                Latency::And { set, .. } => {
                    set.into_iter().collect::<Vec<_>>()
                }
                other => vec![other],
            })
            .collect();
        Latency::And {
            set,
            key: AndKey(key),
        }
    }

    /// Keep only the latencies that no other latency in `map` is known to
    /// follow. Entries with equal latencies keep the first key.
    pub fn latest<K: Clone>(map: &[(K, Latency)]) -> Vec<(K, Latency)> {
        let mut latest: Vec<(K, Latency)> = Vec::with_capacity(map.len());
        for (value, latency) in map {
            let mut add = true;
            let mut trash = Vec::new();
            for (idx, (_, saved)) in latest.iter().enumerate() {
                if latency == saved {
                    add = false;
                    break;
                } else if latency.is_ge(saved) {
                    trash.push(idx);
                } else if saved.is_ge(latency) {
                    add = false;
                    break;
                }
            }
            if add {
                for idx in trash.into_iter().rev() {
                    latest.remove(idx);
                }
                latest.push((value.clone(), latency.clone()));
            }
        }
        latest
    }

    /// This latency followed by an open interval anchored at `key`.
    pub fn open(&self, key: LatencyKey) -> Latency {
        self.increment_open(0, key)
    }

    pub fn min_clocks(&self) -> u32 {
        match self {
            Latency::Absolute { min, .. } | Latency::Open { min, .. } => *min,
            Latency::And { set, .. } => {
                set.iter().map(Latency::min_clocks).max().unwrap_or(0)
            }
            Latency::Or { set, .. } => {
                set.iter().map(Latency::min_clocks).min().unwrap_or(0)
            }
        }
    }

    /// The maximum number of clocks, if it is known.
    pub fn max_clocks(&self) -> Option<u32> {
        match self {
            Latency::Absolute { max, .. } => Some(*max),
            Latency::Open { .. } => None,
            Latency::And { set, .. } | Latency::Or { set, .. } => set
                .iter()
                .map(Latency::max_clocks)
                .try_fold(0, |acc, m| m.map(|m| acc.max(m))),
        }
    }

    pub fn key(&self) -> LatencyKey {
        match self {
            Latency::Absolute { key, .. }
            | Latency::Open { key, .. }
            | Latency::Or { key, .. } => *key,
            Latency::And { key, .. } => key.0,
        }
    }

    /// True for an absolute latency with equal minimum and maximum.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Latency::Absolute { min, max, .. } if min == max)
    }

    pub fn is_open(&self) -> bool {
        match self {
            Latency::Absolute { .. } => false,
            Latency::Open { .. } => true,
            Latency::And { set, .. } | Latency::Or { set, .. } => {
                set.iter().any(Latency::is_open)
            }
        }
    }

    /// True if this latency is known to complete strictly after `other`.
    /// Nothing is known to follow an open latency it does not share a key
    /// with.
    pub fn is_gt(&self, other: &Latency) -> bool {
        match (self, other) {
            (Latency::And { set, .. }, _) => set.iter().any(|l| l.is_gt(other)),
            (Latency::Or { set, .. }, _) => set.iter().all(|l| l.is_gt(other)),
            (_, Latency::And { set, .. }) => set.iter().all(|l| self.is_gt(l)),
            (_, Latency::Or { set, .. }) => set.iter().any(|l| self.is_gt(l)),
            (Latency::Absolute { min, .. }, Latency::Absolute { max, .. }) => {
                min > max
            }
            (Latency::Absolute { .. }, Latency::Open { .. }) => false,
            (
                Latency::Open { min, key },
                Latency::Open {
                    min: other_min,
                    key: other_key,
                },
            ) => key == other_key && min > other_min,
            (Latency::Open { min, .. }, Latency::Absolute { max, .. }) => {
                min > max
            }
        }
    }

    /// True if this latency is known to complete no earlier than `other`.
    pub fn is_ge(&self, other: &Latency) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Latency::And { set, .. }, Latency::And { set: others, .. }) => {
                if others.is_subset(set) {
                    return true;
                }
                let covered = others
                    .iter()
                    .all(|o| set.iter().any(|l| l.is_descendant_of(o)));
                covered || set.iter().any(|l| l.is_ge(other))
            }
            (Latency::And { set, .. }, _) => set.iter().any(|l| l.is_ge(other)),
            (Latency::Or { set, .. }, _) => set.iter().all(|l| l.is_ge(other)),
            _ => self.is_gt(other),
        }
    }

    /// True if this latency was derived from `other` by adding clocks to it.
    pub fn is_descendant_of(&self, other: &Latency) -> bool {
        match (self, other) {
            (Latency::And { set, .. }, _) | (Latency::Or { set, .. }, _) => {
                set.iter().any(|l| l.is_descendant_of(other))
            }
            (_, Latency::And { set, .. }) | (_, Latency::Or { set, .. }) => {
                set.iter().all(|o| self.is_descendant_of(o))
            }
            (
                Latency::Absolute { min, max, .. },
                Latency::Absolute {
                    min: other_min,
                    max: other_max,
                    ..
                },
            ) => min >= other_min && max >= other_max,
            (Latency::Absolute { .. }, Latency::Open { .. }) => false,
            (Latency::Open { min, .. }, Latency::Absolute { min: other, .. }) => {
                min >= other
            }
            (
                Latency::Open { min, key },
                Latency::Open {
                    min: other_min,
                    key: other_key,
                },
            ) => key == other_key && min >= other_min,
        }
    }

    /// The latency of something that starts once `other` has completed and
    /// then takes this long.
    pub fn add_to(&self, other: &Latency) -> Latency {
        match self {
            Latency::Absolute { min, max, .. } => other.increment(*min, *max),
            Latency::Open { min, key } => other.increment_open(*min, *key),
            Latency::And { set, key } => Latency::And {
                set: set.iter().map(|l| l.add_to(other)).collect(),
                key: *key,
            },
            Latency::Or { set, key } => Latency::Or {
                set: set.iter().map(|l| l.add_to(other)).collect(),
                key: *key,
            },
        }
    }

    /// Add between `min` and `max` clocks.
    pub fn increment(&self, min: u32, max: u32) -> Latency {
        if min == 0 && max == 0 {
            return self.clone();
        }
        match self {
            Latency::Absolute {
                min: base_min,
                max: base_max,
                key,
            } => Latency::Absolute {
                min: base_min + min,
                max: base_max + max,
                key: *key,
            },
            Latency::Open { min: base, key } => Latency::Open {
                min: base + min,
                key: *key,
            },
            Latency::And { set, key } => Latency::And {
                set: set.iter().map(|l| l.increment(min, max)).collect(),
                key: *key,
            },
            Latency::Or { set, key } => Latency::Or {
                set: set.iter().map(|l| l.increment(min, max)).collect(),
                key: *key,
            },
        }
    }

    /// Add at least `min` clocks of unknown total length anchored at `key`.
    pub fn increment_open(&self, min: u32, key: LatencyKey) -> Latency {
        match self {
            Latency::Absolute { min: base, .. }
            | Latency::Open { min: base, .. } => Latency::Open {
                min: base + min,
                key,
            },
            Latency::And { set, key: own } => Latency::And {
                set: set.iter().map(|l| l.increment_open(min, key)).collect(),
                key: *own,
            },
            Latency::Or { set, key: own } => Latency::Or {
                set: set.iter().map(|l| l.increment_open(min, key)).collect(),
                key: *own,
            },
        }
    }
}

impl Default for Latency {
    fn default() -> Self {
        Latency::ZERO
    }
}

impl fmt::Display for LatencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyKey::Base => write!(f, "base"),
            LatencyKey::Exit(e) => write!(f, "exit{}", e.0),
        }
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn members(
            f: &mut fmt::Formatter<'_>,
            set: &BTreeSet<Latency>,
        ) -> fmt::Result {
            let mut first = true;
            for l in set {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                write!(f, "{l}")?;
            }
            Ok(())
        }
        match self {
            Latency::Absolute { min, max, .. } if min == max => {
                write!(f, "{min}")
            }
            Latency::Absolute { min, max, .. } => write!(f, "{min}..{max}"),
            Latency::Open { min, key } => write!(f, "{min}+<{key}>"),
            Latency::And { set, .. } => {
                write!(f, "and{{")?;
                members(f, set)?;
                write!(f, "}}")
            }
            Latency::Or { set, key } => {
                write!(f, "or<{key}>{{")?;
                members(f, set)?;
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Debug for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn abs(min: u32, max: u32) -> Latency {
        Latency::get(min, max).unwrap()
    }

    #[test]
    fn zero_increment_is_identity() {
        let l = abs(2, 3);
        assert_eq!(l.increment(0, 0), l);
        assert_eq!(l.increment(1, 2), abs(3, 5));
        assert!(Latency::get(3, 2).is_err());
    }

    #[test]
    fn open_latencies_with_same_key_compare_by_min() {
        let a = Latency::ZERO.open(LatencyKey::Base).increment(3, 3);
        let b = Latency::ZERO.open(LatencyKey::Base).increment(1, 1);
        assert!(a.is_gt(&b));
        assert!(a.is_ge(&b));
        assert!(!b.is_gt(&a));
        assert!(a.is_open());
        assert_eq!(a.max_clocks(), None);
        assert_eq!(a.min_clocks(), 3);
    }

    #[test]
    fn and_or_bounds() {
        let and = Latency::and(
            [abs(1, 2), abs(3, 4)].into_iter().collect(),
            LatencyKey::Base,
        );
        assert_eq!(and.min_clocks(), 3);
        assert_eq!(and.max_clocks(), Some(4));
        let or = Latency::or(
            [abs(1, 2), abs(3, 4)].into_iter().collect(),
            LatencyKey::Base,
        );
        assert_eq!(or.min_clocks(), 1);
        assert!(and.is_gt(&abs(0, 2)));
        assert!(!or.is_gt(&abs(0, 2)));
        assert!(or.is_gt(&abs(0, 0)));
    }

    #[test]
    fn singletons_collapse_and_nesting_flattens() {
        let single = Latency::or([abs(2, 2)].into_iter().collect(), LatencyKey::Base);
        assert_eq!(single, abs(2, 2));
        let inner = Latency::and(
            [abs(1, 1), abs(2, 2)].into_iter().collect(),
            LatencyKey::Base,
        );
        let outer =
            Latency::and([inner, abs(5, 5)].into_iter().collect(), LatencyKey::Base);
        match outer {
            Latency::And { set, .. } => assert_eq!(set.len(), 3),
            _ => panic!("expected an and latency"),
        }
    }

    #[test]
    fn latest_drops_dominated() {
        let map = vec![("a", abs(1, 1)), ("b", abs(4, 4)), ("c", abs(2, 5))];
        let latest = Latency::latest(&map);
        let keys: Vec<_> = latest.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    proptest! {
        #[test]
        fn absolute_never_bounds_open(min in 0u32..100, span in 0u32..100, omin in 0u32..100) {
            let a = abs(min, min + span);
            let o = Latency::ZERO.increment_open(omin, LatencyKey::Base);
            prop_assert!(!a.is_ge(&o));
            prop_assert!(!a.is_gt(&o));
        }
    }
}
