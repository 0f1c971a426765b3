//! Order-preserving array filter.
//!
//! # Design
//!
//! While observed, the filter keeps `matching`: for every element of the
//! filtered array, the index of that element in the parent. It also keeps
//! the matched elements themselves, as delivered. Reads serve that copy, so a
//! parent mutated ahead of its queued changes never meets a stale index. A parent
//! modification only re-evaluates the predicate for its own new elements;
//! the filtered positions it touches are found by binary search and every
//! later entry is shifted by the modification's size delta.
//!
//! # Invariants
//!
//! 1. `matching` is strictly increasing.
//! 2. Every entry refers to a parent element that satisfied the predicate
//!    when it was inserted.
//! 3. The tracked parent count equals each incoming change's
//!    `initial_count`.
//! 4. `elements` and `matching` have the same length.

use std::cell::RefCell;
use std::rc::Rc;

use ripple_core::{ArrayChange, ArrayModification, Update, Violation, fatal};

use crate::config::SELF_CHECKS;
use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};
use crate::value::Coalescer;

use super::{AnyObservableArray, ArrayUpdate, ObservableArray};

struct FilterState<T> {
    matching: Vec<usize>,
    elements: Vec<T>,
    parent_count: usize,
}

impl<T> FilterState<T> {
    fn check_order(&self) {
        if let Some(position) = self.matching.windows(2).position(|w| w[0] >= w[1]) {
            fatal(Violation::UnorderedIndexMap { position });
        }
    }
}

struct FilteredInner<T> {
    parent: AnyObservableArray<T>,
    predicate: Box<dyn Fn(&T) -> bool>,
    state: RefCell<Option<FilterState<T>>>,
    signal: TransactionalSignal<ArrayChange<T>>,
    pending: Coalescer<ArrayChange<T>>,
    upstream: Upstream,
}

impl<T: Clone + 'static> FilteredInner<T> {
    fn receive(&self, update: &ArrayUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                if let Some(filtered) = self.apply(change) {
                    self.pending.push(filtered);
                }
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }

    fn apply(&self, change: &ArrayChange<T>) -> Option<ArrayChange<T>> {
        let mut state = self.state.borrow_mut();
        let state = state.as_mut()?;
        if state.parent_count != change.initial_count() {
            fatal(Violation::CountMismatch {
                expected: change.initial_count(),
                actual: state.parent_count,
            });
        }
        let mut filtered = ArrayChange::new(state.matching.len());
        for modification in change.modifications() {
            if let Some(modification) = self.apply_modification(state, modification) {
                filtered.push(modification);
            }
        }
        state.parent_count = change.final_count();
        if SELF_CHECKS {
            state.check_order();
        }
        Some(filtered)
    }

    /// Update `matching` and `elements` for one parent modification and return the
    /// equivalent modification of the filtered array.
    fn apply_modification(
        &self,
        state: &mut FilterState<T>,
        modification: &ArrayModification<T>,
    ) -> Option<ArrayModification<T>> {
        let at = modification.at();
        let old = modification.old_elements();
        let new = modification.new_elements();
        let end = at + old.len();

        let lo = state.matching.partition_point(|&i| i < at);
        let hi = state.matching.partition_point(|&i| i < end);

        let mut inserted = Vec::new();
        let mut inserted_indices = Vec::new();
        for (offset, element) in new.iter().enumerate() {
            if (self.predicate)(element) {
                inserted.push(element.clone());
                inserted_indices.push(at + offset);
            }
        }

        for index in &mut state.matching[hi..] {
            *index = *index + new.len() - old.len();
        }
        state.matching.splice(lo..hi, inserted_indices);
        let removed: Vec<T> = state.elements.splice(lo..hi, inserted.clone()).collect();

        ArrayModification::from_parts(lo, removed, inserted)
    }

    fn activate(&self) {
        let value = self.parent.value();
        let parent_count = value.len();
        let (matching, elements) = value
            .into_iter()
            .enumerate()
            .filter(|(_, element)| (self.predicate)(element))
            .unzip();
        self.state.replace(Some(FilterState {
            matching,
            elements,
            parent_count,
        }));
    }
}

/// The elements of a parent array that satisfy a predicate, in order.
///
/// Unobserved, every read filters the parent from scratch. Observed, reads
/// serve the maintained copy of the matched elements.
pub struct FilteredArray<T> {
    inner: Rc<FilteredInner<T>>,
}

impl<T: Clone + 'static> FilteredArray<T> {
    pub fn new(parent: AnyObservableArray<T>, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        Self {
            inner: Rc::new(FilteredInner {
                parent,
                predicate: Box::new(predicate),
                state: RefCell::new(None),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }

}

impl<T: Clone + 'static> Source<ArrayUpdate<T>> for FilteredArray<T> {
    fn add_sink(&self, sink: AnySink<ArrayUpdate<T>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "array.filter", "activated");
            self.inner.activate();
            let connection = subscribe_weak(&self.inner.parent, &self.inner, |inner, update| {
                inner.receive(update);
            });
            self.inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<ArrayUpdate<T>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "array.filter", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
            self.inner.state.replace(None);
        }
    }
}

impl<T: Clone + 'static> ObservableArray<T> for FilteredArray<T> {
    fn count(&self) -> usize {
        if let Some(state) = self.inner.state.borrow().as_ref() {
            return state.elements.len();
        }
        self.value().len()
    }

    fn value(&self) -> Vec<T> {
        if let Some(state) = self.inner.state.borrow().as_ref() {
            return state.elements.clone();
        }
        self.inner
            .parent
            .value()
            .into_iter()
            .filter(|element| (self.inner.predicate)(element))
            .collect()
    }

    fn element(&self, index: usize) -> T {
        let cached = self
            .inner
            .state
            .borrow()
            .as_ref()
            .map(|state| (state.elements.get(index).cloned(), state.elements.len()));
        let (element, len) = match cached {
            Some(found) => found,
            None => {
                let value = self.value();
                (value.get(index).cloned(), value.len())
            }
        };
        match element {
            Some(element) => element,
            None => fatal(Violation::IndexOutOfBounds { index, len }),
        }
    }
}

impl<T> Clone for FilteredArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArrayVariable, ObservableArrayExt};
    use crate::source::SourceExt;

    fn even(x: &i32) -> bool {
        x % 2 == 0
    }

    fn observe(array: &FilteredArray<i32>) -> (Rc<RefCell<Vec<i32>>>, crate::Connection) {
        let shadow = Rc::new(RefCell::new(array.value()));
        let target = Rc::clone(&shadow);
        let c = array.subscribe(move |u: &ArrayUpdate<i32>| {
            if let Update::Change(change) = u {
                let next = change.applied(&target.borrow());
                *target.borrow_mut() = next;
            }
        });
        (shadow, c)
    }

    #[test]
    fn unobserved_filter_recomputes() {
        let source = ArrayVariable::new(vec![1, 2, 3, 4]);
        let evens = source.filter(even);
        assert_eq!(evens.value(), vec![2, 4]);
        source.push(6);
        assert_eq!(evens.count(), 3);
        assert_eq!(evens.element(2), 6);
    }

    #[test]
    fn replacement_flips_membership() {
        let source = ArrayVariable::new(vec![1, 2, 3, 4]);
        let evens = source.filter(even);
        let (shadow, _c) = observe(&evens);
        source.replace(0, 10);
        source.replace(1, 11);
        source.replace(3, 12);
        assert_eq!(*shadow.borrow(), vec![10, 12]);
        assert_eq!(evens.value(), vec![10, 12]);
        assert_eq!(evens.element(1), 12);
    }

    #[test]
    fn range_replacement_shifts_later_matches() {
        let source = ArrayVariable::new(vec![2, 1, 1, 4, 6]);
        let evens = source.filter(even);
        let (shadow, _c) = observe(&evens);
        source.replace_range(1..3, vec![8, 3, 10, 5]);
        assert_eq!(*shadow.borrow(), vec![2, 8, 10, 4, 6]);
        source.replace_range(0..4, vec![]);
        assert_eq!(*shadow.borrow(), vec![4, 6]);
        assert_eq!(evens.value(), vec![4, 6]);
    }

    #[test]
    fn non_matching_edit_emits_empty_change() {
        let source = ArrayVariable::new(vec![2, 3]);
        let evens = source.filter(even);
        let emitted = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&emitted);
        let _c = evens.subscribe(move |u: &ArrayUpdate<i32>| log.borrow_mut().push(u.clone()));
        source.push(5);
        assert_eq!(
            *emitted.borrow(),
            vec![Update::BeginTransaction, Update::EndTransaction]
        );
    }

    #[test]
    fn reads_stay_consistent_while_parent_runs_ahead() {
        let source = ArrayVariable::new(vec![1, 2, 3, 4]);
        let cleared = Rc::new(std::cell::Cell::new(false));
        let _mutator = {
            let (target, cleared) = (source.clone(), Rc::clone(&cleared));
            source.subscribe(move |u: &ArrayUpdate<i32>| {
                if matches!(u, Update::EndTransaction) && !cleared.replace(true) {
                    target.set_value(Vec::new());
                }
            })
        };
        let evens = source.filter(even);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _reader = {
            let (reader, seen) = (evens.clone(), Rc::clone(&seen));
            evens.subscribe(move |u: &ArrayUpdate<i32>| {
                if matches!(u, Update::EndTransaction) {
                    let first = (reader.count() > 0).then(|| reader.element(0));
                    seen.borrow_mut().push((reader.value(), first));
                }
            })
        };

        source.push(6);
        assert_eq!(
            *seen.borrow(),
            vec![(vec![2, 4, 6], Some(2)), (vec![], None)]
        );
        assert!(evens.value().is_empty());
    }
}
