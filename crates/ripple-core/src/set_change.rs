//! Removed/inserted deltas of unordered sets.
//!
//! # Invariants
//!
//! 1. `removed` and `inserted` are disjoint. Recording an insertion of an
//!    element that the change removes cancels the removal (and vice versa),
//!    which is exact for well-formed changes where `removed` is a subset of
//!    the source set and `inserted` is disjoint from it.
//! 2. `apply` subtracts `removed`, then adds `inserted`.
//! 3. `c.merged(c.reversed())` is empty for every `c`.

use std::hash::Hash;

use ahash::AHashSet;

use crate::change::{Change, ElementChange};

/// The change of a set: elements that left and elements that joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetChange<T: Eq + Hash> {
    removed: AHashSet<T>,
    inserted: AHashSet<T>,
}

impl<T: Eq + Hash> Default for SetChange<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash> SetChange<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            removed: AHashSet::new(),
            inserted: AHashSet::new(),
        }
    }

    /// Build a change from raw sets, cancelling elements present in both.
    pub fn from_parts(
        removed: impl IntoIterator<Item = T>,
        inserted: impl IntoIterator<Item = T>,
    ) -> Self {
        let mut change = Self::new();
        for element in removed {
            change.record_removal(element);
        }
        for element in inserted {
            change.record_insertion(element);
        }
        change
    }

    #[must_use]
    pub fn removed(&self) -> &AHashSet<T> {
        &self.removed
    }

    #[must_use]
    pub fn inserted(&self) -> &AHashSet<T> {
        &self.inserted
    }

    pub fn into_parts(self) -> (AHashSet<T>, AHashSet<T>) {
        (self.removed, self.inserted)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.inserted.is_empty()
    }

    /// Note that `element` joined the set after the current state.
    pub fn record_insertion(&mut self, element: T) {
        if !self.removed.remove(&element) {
            self.inserted.insert(element);
        }
    }

    /// Note that `element` left the set after the current state.
    pub fn record_removal(&mut self, element: T) {
        if !self.inserted.remove(&element) {
            self.removed.insert(element);
        }
    }
}

impl<T: Eq + Hash + Clone> SetChange<T> {
    /// The change that turns `old` into `new`.
    #[must_use]
    pub fn from_difference(old: &AHashSet<T>, new: &AHashSet<T>) -> Self {
        Self {
            removed: old.difference(new).cloned().collect(),
            inserted: new.difference(old).cloned().collect(),
        }
    }

    /// Transform every element. Elements colliding under `f` cancel as if
    /// the change had been recorded element by element.
    pub fn map<U: Eq + Hash>(&self, mut f: impl FnMut(&T) -> U) -> SetChange<U> {
        let removed: Vec<U> = self.removed.iter().map(&mut f).collect();
        let inserted: Vec<U> = self.inserted.iter().map(&mut f).collect();
        SetChange::from_parts(removed, inserted)
    }
}

impl<T: Eq + Hash + Clone + 'static> Change for SetChange<T> {
    type Value = AHashSet<T>;

    fn is_empty(&self) -> bool {
        SetChange::is_empty(self)
    }

    fn apply(&self, value: &mut AHashSet<T>) {
        for element in &self.removed {
            value.remove(element);
        }
        for element in &self.inserted {
            value.insert(element.clone());
        }
    }

    fn merge(&mut self, next: Self) {
        let (removed, inserted) = next.into_parts();
        for element in removed {
            self.record_removal(element);
        }
        for element in inserted {
            self.record_insertion(element);
        }
    }

    fn reversed(&self) -> Self {
        Self {
            removed: self.inserted.clone(),
            inserted: self.removed.clone(),
        }
    }
}

impl<T: Eq + Hash + Clone + 'static> ElementChange for SetChange<T> {
    type Element = T;

    fn for_each_removed(&self, f: &mut dyn FnMut(&T)) {
        self.removed.iter().for_each(f);
    }

    fn for_each_inserted(&self, f: &mut dyn FnMut(&T)) {
        self.inserted.iter().for_each(f);
    }

    fn count_delta(&self) -> isize {
        self.inserted.len() as isize - self.removed.len() as isize
    }

    fn for_each_element(value: &AHashSet<T>, f: &mut dyn FnMut(&T)) {
        value.iter().for_each(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[i32]) -> AHashSet<i32> {
        items.iter().copied().collect()
    }

    #[test]
    fn apply_subtracts_then_adds() {
        let mut value = set(&[1, 2, 3]);
        SetChange::from_parts([1], [4]).apply(&mut value);
        assert_eq!(value, set(&[2, 3, 4]));
    }

    #[test]
    fn removal_then_reinsertion_cancels() {
        let mut change = SetChange::from_parts([1], []);
        change.merge(SetChange::from_parts([], [1]));
        assert!(change.is_empty());
    }

    #[test]
    fn insertion_then_removal_cancels() {
        let merged = SetChange::from_parts([], [7]).merged(SetChange::from_parts([7], []));
        assert!(merged.is_empty());
    }

    #[test]
    fn merge_with_reverse_is_empty() {
        let change = SetChange::from_parts([1, 2], [3, 4]);
        assert!(change.clone().merged(change.reversed()).is_empty());
    }

    #[test]
    fn from_parts_keeps_sets_disjoint() {
        let change = SetChange::from_parts([1, 2], [2, 3]);
        assert_eq!(change.removed(), &set(&[1]));
        assert_eq!(change.inserted(), &set(&[3]));
    }

    #[test]
    fn difference_round_trips() {
        let old = set(&[1, 2, 3]);
        let new = set(&[2, 3, 5, 8]);
        let change = SetChange::from_difference(&old, &new);
        let mut value = old.clone();
        change.apply(&mut value);
        assert_eq!(value, new);
        change.reversed().apply(&mut value);
        assert_eq!(value, old);
    }

    #[test]
    fn map_collapses_collisions() {
        let change = SetChange::from_parts([1], [-1, 2]);
        let mapped = change.map(|x: &i32| x.abs());
        assert_eq!(mapped.removed(), &AHashSet::new());
        assert_eq!(mapped.inserted(), &set(&[2]));
    }
}
