//! Sets projected into sorted arrays.
//!
//! # Design
//!
//! The projection keeps [`KeyCounts`]: the distinct sort keys in ascending
//! order, each with the number of parent elements carrying it. A key's array
//! position is its index there, found by binary search. Only the first
//! element with a key makes it visible and only the last one to leave
//! removes it, so elements sharing a key never produce an array change among
//! themselves.
//!
//! # Cost
//!
//! Locating a key is `O(log n)` in the number of distinct keys. Making a key
//! visible or removing it shifts the tail of a contiguous buffer, which is
//! `O(n)` element moves; a change to a key that is already present costs
//! only the search.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::rc::Rc;

use ripple_core::{ArrayChange, ArrayModification, SetChange, Update, Violation, fatal};

use crate::array::{ArrayUpdate, ObservableArray};
use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};
use crate::value::Coalescer;

use super::{AnyObservableSet, ObservableSet, SetUpdate};

/// Distinct keys in ascending order with their multiplicities.
struct KeyCounts<K> {
    entries: Vec<(K, usize)>,
}

impl<K: Ord> KeyCounts<K> {
    fn tally(keys: impl IntoIterator<Item = K>) -> Self {
        let mut counts = BTreeMap::new();
        for key in keys {
            *counts.entry(key).or_insert(0) += 1;
        }
        Self {
            entries: counts.into_iter().collect(),
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn search(&self, key: &K) -> Result<usize, usize> {
        self.entries.binary_search_by(|(entry, _)| entry.cmp(key))
    }

    /// Count one more element with `key`; returns its position if the key
    /// just became visible.
    fn add(&mut self, key: K) -> Option<usize> {
        match self.search(&key) {
            Ok(at) => {
                self.entries[at].1 += 1;
                None
            }
            Err(at) => {
                self.entries.insert(at, (key, 1));
                Some(at)
            }
        }
    }

    /// Count one element fewer with `key`; returns its position if the key
    /// is gone.
    fn release(&mut self, key: &K) -> Option<usize> {
        let Ok(at) = self.search(key) else {
            fatal(Violation::MissingElement);
        };
        let count = &mut self.entries[at].1;
        if *count > 1 {
            *count -= 1;
            return None;
        }
        self.entries.remove(at);
        Some(at)
    }

    fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(key, _)| key)
    }

    fn into_keys(self) -> impl Iterator<Item = K> {
        self.entries.into_iter().map(|(key, _)| key)
    }
}

struct SortedInner<T: Eq + Hash, K> {
    parent: AnyObservableSet<T>,
    key: Box<dyn Fn(&T) -> K>,
    keys: RefCell<Option<KeyCounts<K>>>,
    signal: TransactionalSignal<ArrayChange<K>>,
    pending: Coalescer<ArrayChange<K>>,
    upstream: Upstream,
}

impl<T, K> SortedInner<T, K>
where
    T: Clone + Eq + Hash + 'static,
    K: Clone + Ord + 'static,
{
    fn receive(&self, update: &SetUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                if let Some(sorted) = self.apply(change) {
                    self.pending.push(sorted);
                }
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }

    fn apply(&self, change: &SetChange<T>) -> Option<ArrayChange<K>> {
        let mut keys = self.keys.borrow_mut();
        let keys = keys.as_mut()?;
        let mut sorted = ArrayChange::new(keys.len());
        for element in change.removed() {
            let key = (self.key)(element);
            if let Some(at) = keys.release(&key) {
                sorted.push(ArrayModification::Remove { element: key, at });
            }
        }
        for element in change.inserted() {
            let key = (self.key)(element);
            if let Some(at) = keys.add(key.clone()) {
                sorted.push(ArrayModification::Insert { element: key, at });
            }
        }
        Some(sorted)
    }

    fn tally(&self) -> KeyCounts<K> {
        KeyCounts::tally(self.parent.value().iter().map(|element| (self.key)(element)))
    }
}

/// The distinct sort keys of a set's elements, as an ascending array.
pub struct SortedArray<T: Eq + Hash, K> {
    inner: Rc<SortedInner<T, K>>,
}

impl<T, K> SortedArray<T, K>
where
    T: Clone + Eq + Hash + 'static,
    K: Clone + Ord + 'static,
{
    pub fn new(parent: AnyObservableSet<T>, key: impl Fn(&T) -> K + 'static) -> Self {
        Self {
            inner: Rc::new(SortedInner {
                parent,
                key: Box::new(key),
                keys: RefCell::new(None),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }
}

impl<T, K> Source<ArrayUpdate<K>> for SortedArray<T, K>
where
    T: Clone + Eq + Hash + 'static,
    K: Clone + Ord + 'static,
{
    fn add_sink(&self, sink: AnySink<ArrayUpdate<K>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "set.sorted", "activated");
            self.inner.keys.replace(Some(self.inner.tally()));
            let connection = subscribe_weak(&self.inner.parent, &self.inner, |inner, update| {
                inner.receive(update);
            });
            self.inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<ArrayUpdate<K>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "set.sorted", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
            self.inner.keys.replace(None);
        }
    }
}

impl<T, K> ObservableArray<K> for SortedArray<T, K>
where
    T: Clone + Eq + Hash + 'static,
    K: Clone + Ord + 'static,
{
    fn count(&self) -> usize {
        if let Some(keys) = self.inner.keys.borrow().as_ref() {
            return keys.len();
        }
        self.inner.tally().len()
    }

    fn value(&self) -> Vec<K> {
        if let Some(keys) = self.inner.keys.borrow().as_ref() {
            return keys.keys().cloned().collect();
        }
        self.inner.tally().into_keys().collect()
    }
}

impl<T: Eq + Hash, K> Clone for SortedArray<T, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::{ObservableSetExt, SetVariable};
    use crate::source::SourceExt;

    #[test]
    fn inserts_land_at_sorted_offsets() {
        let set = SetVariable::new([30, 10]);
        let sorted = set.sorted();
        assert_eq!(sorted.value(), vec![10, 30]);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let _c = sorted.subscribe(move |u: &ArrayUpdate<i32>| {
            if let Update::Change(c) = u {
                log.borrow_mut().extend(c.modifications().iter().cloned());
            }
        });
        set.insert(20);
        set.remove(&10);
        assert_eq!(
            *seen.borrow(),
            vec![
                ArrayModification::Insert { element: 20, at: 1 },
                ArrayModification::Remove { element: 10, at: 0 },
            ]
        );
        assert_eq!(sorted.value(), vec![20, 30]);
    }

    #[test]
    fn shared_keys_are_counted() {
        let set = SetVariable::new(["apple", "avocado", "banana"]);
        let initials = set.sort_by_key(|s| s.chars().next().unwrap_or(' '));
        let seen = Rc::new(RefCell::new(0));
        let count = Rc::clone(&seen);
        let _c = initials.subscribe(move |u: &ArrayUpdate<char>| {
            if u.change().is_some_and(|c| !c.is_empty()) {
                *count.borrow_mut() += 1;
            }
        });
        assert_eq!(initials.value(), vec!['a', 'b']);
        set.remove(&"apple");
        assert_eq!(*seen.borrow(), 0);
        set.remove(&"avocado");
        assert_eq!(*seen.borrow(), 1);
        assert_eq!(initials.value(), vec!['b']);
        assert_eq!(initials.element(0), 'b');
    }

    #[test]
    fn positions_track_a_large_shuffled_set() {
        let set = SetVariable::new((0..64).map(|i| i * 3));
        let sorted = set.sort_by_key(|x| x % 97);
        let shadow = Rc::new(RefCell::new(sorted.value()));
        let target = Rc::clone(&shadow);
        let _c = sorted.subscribe(move |u: &ArrayUpdate<i32>| {
            if let Update::Change(c) = u {
                let next = c.applied(&target.borrow());
                *target.borrow_mut() = next;
            }
        });

        set.transaction(|set| {
            for i in (0..200).map(|i| (i * 37) % 211) {
                if !set.remove(&i) {
                    set.insert(i);
                }
            }
        });
        for i in (0..150).step_by(7) {
            set.insert(i + 1000);
        }

        let mut expected: Vec<i32> = set.value().iter().map(|x| x % 97).collect();
        expected.sort_unstable();
        expected.dedup();
        assert_eq!(*shadow.borrow(), expected);
        assert_eq!(sorted.value(), expected);
        assert_eq!(sorted.count(), expected.len());
    }
}
