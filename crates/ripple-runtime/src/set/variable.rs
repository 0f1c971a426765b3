//! Storage-backed sets.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::AHashSet;
use ripple_core::{Change, SetChange};

use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;

use super::{ObservableSet, SetUpdate};

struct SetVariableInner<T: Eq + Hash> {
    value: RefCell<AHashSet<T>>,
    signal: TransactionalSignal<SetChange<T>>,
}

/// A mutable observable set.
///
/// Mutations are reduced to their effective part before being sent:
/// removing an absent element or inserting a present one is not reported.
pub struct SetVariable<T: Eq + Hash> {
    inner: Rc<SetVariableInner<T>>,
}

impl<T: Clone + Eq + Hash + 'static> SetVariable<T> {
    pub fn new(value: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: Rc::new(SetVariableInner {
                value: RefCell::new(value.into_iter().collect()),
                signal: TransactionalSignal::new(),
            }),
        }
    }

    /// Apply the effective part of `change`.
    pub fn apply(&self, change: SetChange<T>) {
        let effective = {
            let mut value = self.inner.value.borrow_mut();
            let (removed, inserted) = change.into_parts();
            let removed: Vec<T> = removed.into_iter().filter(|e| value.contains(e)).collect();
            let inserted: Vec<T> = inserted
                .into_iter()
                .filter(|e| !value.contains(e) || removed.contains(e))
                .collect();
            let effective = SetChange::from_parts(removed, inserted);
            effective.apply(&mut value);
            effective
        };
        if !effective.is_empty() && self.inner.signal.is_connected() {
            self.inner.signal.send_transaction(effective);
        }
    }

    /// Insert `element`; returns whether it was absent.
    pub fn insert(&self, element: T) -> bool {
        let inserted = self.inner.value.borrow_mut().insert(element.clone());
        if inserted && self.inner.signal.is_connected() {
            self.inner
                .signal
                .send_transaction(SetChange::from_parts([], [element]));
        }
        inserted
    }

    /// Remove `element`; returns whether it was present.
    pub fn remove(&self, element: &T) -> bool {
        let removed = self.inner.value.borrow_mut().remove(element);
        if removed && self.inner.signal.is_connected() {
            self.inner
                .signal
                .send_transaction(SetChange::from_parts([element.clone()], []));
        }
        removed
    }

    /// Replace the whole set.
    pub fn set_value(&self, value: AHashSet<T>) {
        let old = self.inner.value.replace(value);
        if self.inner.signal.is_connected() {
            let change = SetChange::from_difference(&old, &self.inner.value.borrow());
            if !change.is_empty() {
                self.inner.signal.send_transaction(change);
            }
        }
    }

    /// Group every mutation made by `f` into one transaction.
    pub fn transaction<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.inner.signal.begin();
        let result = f(self);
        self.inner.signal.end();
        result
    }

    pub fn with<R>(&self, f: impl FnOnce(&AHashSet<T>) -> R) -> R {
        f(&self.inner.value.borrow())
    }
}

impl<T: Clone + Eq + Hash + 'static> Source<SetUpdate<T>> for SetVariable<T> {
    fn add_sink(&self, sink: AnySink<SetUpdate<T>>) {
        self.inner.signal.add(sink);
    }

    fn remove_sink(&self, sink: &AnySink<SetUpdate<T>>) {
        self.inner.signal.remove(sink);
    }
}

impl<T: Clone + Eq + Hash + 'static> ObservableSet<T> for SetVariable<T> {
    fn value(&self) -> AHashSet<T> {
        self.inner.value.borrow().clone()
    }

    fn count(&self) -> usize {
        self.inner.value.borrow().len()
    }

    fn contains(&self, element: &T) -> bool {
        self.inner.value.borrow().contains(element)
    }
}

impl<T: Eq + Hash> Clone for SetVariable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Eq + Hash + fmt::Debug> fmt::Debug for SetVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetVariable")
            .field("value", &*self.inner.value.borrow())
            .field("signal", &self.inner.signal)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceExt;
    use ripple_core::Update;

    fn record(set: &SetVariable<i32>) -> (Rc<RefCell<Vec<SetChange<i32>>>>, crate::Connection) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink_log = Rc::clone(&log);
        let c = set.subscribe(move |u: &SetUpdate<i32>| {
            if let Update::Change(change) = u {
                sink_log.borrow_mut().push(change.clone());
            }
        });
        (log, c)
    }

    #[test]
    fn redundant_mutations_are_silent() {
        let set = SetVariable::new([1, 2]);
        let (log, _c) = record(&set);
        assert!(!set.insert(1));
        assert!(!set.remove(&5));
        assert!(log.borrow().is_empty());
        assert!(set.insert(3));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn apply_reports_only_effective_part() {
        let set = SetVariable::new([1, 2]);
        let (log, _c) = record(&set);
        set.apply(SetChange::from_parts([2, 9], [1, 4]));
        assert_eq!(log.borrow()[0], SetChange::from_parts([2], [4]));
        assert!(set.contains(&1));
        assert_eq!(set.count(), 2);
    }

    #[test]
    fn set_value_sends_difference() {
        let set = SetVariable::new([1, 2, 3]);
        let (log, _c) = record(&set);
        set.set_value([3, 4].into_iter().collect());
        assert_eq!(log.borrow()[0], SetChange::from_parts([1, 2], [4]));
    }
}
