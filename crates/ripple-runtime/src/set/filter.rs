//! Set filters.
//!
//! [`FilteredSet`] applies a plain predicate and keeps no state.
//! [`ObservablyFilteredSet`] asks every element for an observable boolean
//! and follows each one individually.
//!
//! # Invariants
//!
//! 1. While observed, [`ObservablyFilteredSet`] holds exactly one
//!    predicate subscription per element of its parent.
//! 2. A predicate flip emits a singleton insert or remove without any
//!    change from the parent.
//! 3. Predicate subscriptions are created and dropped outside of the
//!    membership borrow, because both can deliver transaction frames back
//!    into the filter synchronously.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use ripple_core::{SetChange, Update, ValueChange};

use crate::connection::Connection;
use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};
use crate::value::{AnyObservableValue, Coalescer, ObservableValue, ValueUpdate};

use super::{AnyObservableSet, ObservableSet, SetUpdate};

struct FilteredInner<T: Eq + Hash> {
    parent: AnyObservableSet<T>,
    predicate: Box<dyn Fn(&T) -> bool>,
    signal: TransactionalSignal<SetChange<T>>,
    pending: Coalescer<SetChange<T>>,
    upstream: Upstream,
}

impl<T: Clone + Eq + Hash + 'static> FilteredInner<T> {
    fn receive(&self, update: &SetUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                let keep = |e: &&T| (self.predicate)(e);
                let filtered = SetChange::from_parts(
                    change.removed().iter().filter(keep).cloned(),
                    change.inserted().iter().filter(keep).cloned(),
                );
                self.pending.push(filtered);
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }
}

/// The elements of a parent set satisfying a predicate.
pub struct FilteredSet<T: Eq + Hash> {
    inner: Rc<FilteredInner<T>>,
}

impl<T: Clone + Eq + Hash + 'static> FilteredSet<T> {
    pub fn new(parent: AnyObservableSet<T>, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        Self {
            inner: Rc::new(FilteredInner {
                parent,
                predicate: Box::new(predicate),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }
}

impl<T: Clone + Eq + Hash + 'static> Source<SetUpdate<T>> for FilteredSet<T> {
    fn add_sink(&self, sink: AnySink<SetUpdate<T>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "set.filter", "activated");
            let connection = subscribe_weak(&self.inner.parent, &self.inner, |inner, update| {
                inner.receive(update);
            });
            self.inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<SetUpdate<T>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "set.filter", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
        }
    }
}

impl<T: Clone + Eq + Hash + 'static> ObservableSet<T> for FilteredSet<T> {
    fn value(&self) -> AHashSet<T> {
        self.inner
            .parent
            .value()
            .into_iter()
            .filter(|e| (self.inner.predicate)(e))
            .collect()
    }

    fn contains(&self, element: &T) -> bool {
        (self.inner.predicate)(element) && self.inner.parent.contains(element)
    }
}

impl<T: Eq + Hash> Clone for FilteredSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct Member {
    included: bool,
    // Held only to keep the predicate subscription alive.
    _connection: Connection,
}

struct ObservablyFilteredInner<T: Eq + Hash> {
    parent: AnyObservableSet<T>,
    predicate: Box<dyn Fn(&T) -> AnyObservableValue<bool>>,
    members: RefCell<AHashMap<T, Member>>,
    signal: TransactionalSignal<SetChange<T>>,
    pending: Coalescer<SetChange<T>>,
    upstream: Upstream,
}

impl<T: Clone + Eq + Hash + 'static> ObservablyFilteredInner<T> {
    fn receive(self: &Rc<Self>, update: &SetUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                let mut filtered = SetChange::new();
                let mut dropped = Vec::new();
                {
                    let mut members = self.members.borrow_mut();
                    for element in change.removed() {
                        if let Some(member) = members.remove(element) {
                            if member.included {
                                filtered.record_removal(element.clone());
                            }
                            dropped.push(member);
                        }
                    }
                }
                drop(dropped);
                for element in change.inserted() {
                    if self.admit(element) {
                        filtered.record_insertion(element.clone());
                    }
                }
                self.pending.push(filtered);
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }

    /// Subscribe to `element`'s predicate; returns whether it is included.
    fn admit(self: &Rc<Self>, element: &T) -> bool {
        let predicate = (self.predicate)(element);
        let included = predicate.value();
        let key = element.clone();
        let connection = subscribe_weak(&predicate, self, move |inner, update| {
            inner.predicate_changed(&key, update);
        });
        self.members.borrow_mut().insert(
            element.clone(),
            Member {
                included,
                _connection: connection,
            },
        );
        included
    }

    fn predicate_changed(&self, element: &T, update: &ValueUpdate<bool>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(ValueChange { new, .. }) => {
                let flipped = {
                    let mut members = self.members.borrow_mut();
                    match members.get_mut(element) {
                        Some(member) if member.included != *new => {
                            member.included = *new;
                            true
                        }
                        _ => false,
                    }
                };
                if flipped {
                    let change = if *new {
                        SetChange::from_parts([], [element.clone()])
                    } else {
                        SetChange::from_parts([element.clone()], [])
                    };
                    self.pending.push(change);
                }
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }

    fn activate(self: &Rc<Self>) {
        tracing::debug!(operator = "set.filter_observable", "activated");
        for element in self.parent.value() {
            self.admit(&element);
        }
        let connection = subscribe_weak(&self.parent, self, |inner, update| inner.receive(update));
        self.upstream.attach(connection);
    }

    fn deactivate(&self) {
        tracing::debug!(operator = "set.filter_observable", "deactivated");
        self.upstream.detach();
        let members = std::mem::take(&mut *self.members.borrow_mut());
        drop(members);
        self.pending.clear();
    }
}

/// The elements of a parent set whose observable predicate holds.
///
/// Each element's predicate is created once when the element joins the
/// parent (or when the filter becomes observed) and followed until it
/// leaves.
pub struct ObservablyFilteredSet<T: Eq + Hash> {
    inner: Rc<ObservablyFilteredInner<T>>,
}

impl<T: Clone + Eq + Hash + 'static> ObservablyFilteredSet<T> {
    pub fn new(
        parent: AnyObservableSet<T>,
        predicate: impl Fn(&T) -> AnyObservableValue<bool> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(ObservablyFilteredInner {
                parent,
                predicate: Box::new(predicate),
                members: RefCell::new(AHashMap::new()),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }
}

impl<T: Clone + Eq + Hash + 'static> Source<SetUpdate<T>> for ObservablyFilteredSet<T> {
    fn add_sink(&self, sink: AnySink<SetUpdate<T>>) {
        if self.inner.signal.add(sink) {
            self.inner.activate();
        }
    }

    fn remove_sink(&self, sink: &AnySink<SetUpdate<T>>) {
        if self.inner.signal.remove(sink) {
            self.inner.deactivate();
        }
    }
}

impl<T: Clone + Eq + Hash + 'static> ObservableSet<T> for ObservablyFilteredSet<T> {
    fn value(&self) -> AHashSet<T> {
        if self.inner.signal.is_connected() {
            return self
                .inner
                .members
                .borrow()
                .iter()
                .filter(|(_, member)| member.included)
                .map(|(element, _)| element.clone())
                .collect();
        }
        self.inner
            .parent
            .value()
            .into_iter()
            .filter(|e| (self.inner.predicate)(e).value())
            .collect()
    }
}

impl<T: Eq + Hash> Clone for ObservablyFilteredSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
