//! Deduplicated, immutable sets of values
//!
//! Members are kept sorted by id so equality and hashing do not depend on the
//! order in which values were discovered.

use crate::core::value::ValueId;
use smallvec::SmallVec;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ValueSet {
    items: SmallVec<[ValueId; 2]>,
}

impl ValueSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(value: ValueId) -> Self {
        let mut items = SmallVec::new();
        items.push(value);
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, value: ValueId) -> bool {
        self.items.binary_search(&value).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.items.iter().copied()
    }

    pub fn as_slice(&self) -> &[ValueId] {
        &self.items
    }

    /// Deduplicating set union
    pub fn union(&self, other: &ValueSet) -> ValueSet {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let (a, b) = (&self.items, &other.items);
        let mut items = SmallVec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            if a[i] < b[j] {
                items.push(a[i]);
                i += 1;
            } else if b[j] < a[i] {
                items.push(b[j]);
                j += 1;
            } else {
                items.push(a[i]);
                i += 1;
                j += 1;
            }
        }
        items.extend_from_slice(&a[i..]);
        items.extend_from_slice(&b[j..]);
        ValueSet { items }
    }

    pub fn union_with(&mut self, other: &ValueSet) {
        if !other.is_empty() {
            *self = self.union(other);
        }
    }

    /// Apply `f` to each member and union the results
    pub fn flat_map<F>(&self, mut f: F) -> ValueSet
    where
        F: FnMut(ValueId) -> ValueSet,
    {
        let mut out = ValueSet::empty();
        for value in self.iter() {
            out.union_with(&f(value));
        }
        out
    }

    pub fn filter<F>(&self, mut keep: F) -> ValueSet
    where
        F: FnMut(ValueId) -> bool,
    {
        ValueSet {
            items: self.items.iter().copied().filter(|&v| keep(v)).collect(),
        }
    }

    pub fn without(&self, value: ValueId) -> ValueSet {
        self.filter(|v| v != value)
    }
}

impl FromIterator<ValueId> for ValueSet {
    fn from_iter<I: IntoIterator<Item = ValueId>>(iter: I) -> Self {
        let mut items: SmallVec<[ValueId; 2]> = iter.into_iter().collect();
        items.sort_unstable();
        items.dedup();
        ValueSet { items }
    }
}

impl FromIterator<ValueSet> for ValueSet {
    fn from_iter<I: IntoIterator<Item = ValueSet>>(iter: I) -> Self {
        let mut out = ValueSet::empty();
        for set in iter {
            out.union_with(&set);
        }
        out
    }
}

impl<'a> IntoIterator for &'a ValueSet {
    type Item = ValueId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, ValueId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(ids: &[u32]) -> ValueSet {
        ids.iter().map(|&i| ValueId(i)).collect()
    }

    #[test]
    fn test_dedup_and_order() {
        let s = set(&[3, 1, 3, 2]);
        assert_eq!(s.len(), 3);
        assert_eq!(s.as_slice(), &[ValueId(1), ValueId(2), ValueId(3)]);
        assert!(s.contains(ValueId(2)));
        assert!(!s.contains(ValueId(4)));
    }

    #[test]
    fn test_empty_is_distinct_from_nonempty() {
        assert!(ValueSet::empty().is_empty());
        assert_ne!(ValueSet::empty(), ValueSet::single(ValueId(0)));
    }

    #[test]
    fn test_flat_map_unions() {
        let s = set(&[1, 2]);
        let mapped = s.flat_map(|v| set(&[v.0 * 10, 5]));
        assert_eq!(mapped, set(&[5, 10, 20]));
    }

    proptest! {
        #[test]
        fn union_is_commutative(a in prop::collection::vec(0u32..64, 0..12), b in prop::collection::vec(0u32..64, 0..12)) {
            let (a, b) = (set(&a), set(&b));
            prop_assert_eq!(a.union(&b), b.union(&a));
        }

        #[test]
        fn union_is_idempotent(a in prop::collection::vec(0u32..64, 0..12)) {
            let a = set(&a);
            prop_assert_eq!(a.union(&a), a.clone());
        }

        #[test]
        fn construction_ignores_order(ids in prop::collection::vec(0u32..64, 0..16)) {
            let forward = set(&ids);
            let mut ids = ids;
            ids.reverse();
            prop_assert_eq!(forward, set(&ids));
        }

        #[test]
        fn union_contains_both(a in prop::collection::vec(0u32..64, 0..12), b in prop::collection::vec(0u32..64, 0..12)) {
            let u = set(&a).union(&set(&b));
            for id in a.iter().chain(b.iter()) {
                prop_assert!(u.contains(ValueId(*id)));
            }
        }
    }
}
