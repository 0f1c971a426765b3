//! Element-wise transforms of arrays.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use ripple_core::{ArrayChange, ArrayModification, Update, Violation, fatal};

use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};
use crate::value::Coalescer;

use super::{AnyObservableArray, ArrayUpdate, ObservableArray, check_range};

struct MappedInner<T, U> {
    parent: AnyObservableArray<T>,
    transform: Box<dyn Fn(&T) -> U>,
    signal: TransactionalSignal<ArrayChange<U>>,
    pending: Coalescer<ArrayChange<U>>,
    upstream: Upstream,
}

impl<T: Clone + 'static, U: Clone + 'static> MappedInner<T, U> {
    fn receive(&self, update: &ArrayUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => self.pending.push(change.map(|e| (self.transform)(e))),
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }
}

/// An array whose elements are computed from its parent's on access.
pub struct MappedArray<T, U> {
    inner: Rc<MappedInner<T, U>>,
}

impl<T: Clone + 'static, U: Clone + 'static> MappedArray<T, U> {
    pub fn new(parent: AnyObservableArray<T>, transform: impl Fn(&T) -> U + 'static) -> Self {
        Self {
            inner: Rc::new(MappedInner {
                parent,
                transform: Box::new(transform),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }
}

impl<T: Clone + 'static, U: Clone + 'static> Source<ArrayUpdate<U>> for MappedArray<T, U> {
    fn add_sink(&self, sink: AnySink<ArrayUpdate<U>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "array.map", "activated");
            let connection = subscribe_weak(&self.inner.parent, &self.inner, |inner, update| {
                inner.receive(update);
            });
            self.inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<ArrayUpdate<U>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "array.map", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
        }
    }
}

impl<T: Clone + 'static, U: Clone + 'static> ObservableArray<U> for MappedArray<T, U> {
    fn count(&self) -> usize {
        self.inner.parent.count()
    }

    fn value(&self) -> Vec<U> {
        self.inner
            .parent
            .value()
            .iter()
            .map(|e| (self.inner.transform)(e))
            .collect()
    }

    fn slice(&self, range: Range<usize>) -> Vec<U> {
        self.inner
            .parent
            .slice(range)
            .iter()
            .map(|e| (self.inner.transform)(e))
            .collect()
    }

    fn element(&self, index: usize) -> U {
        (self.inner.transform)(&self.inner.parent.element(index))
    }
}

impl<T, U> Clone for MappedArray<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct BufferedInner<T, U> {
    transform: Box<dyn Fn(&T) -> U>,
    value: RefCell<Vec<U>>,
    signal: TransactionalSignal<ArrayChange<U>>,
    pending: Coalescer<ArrayChange<U>>,
    upstream: Upstream,
}

impl<T: Clone + 'static, U: Clone + 'static> BufferedInner<T, U> {
    fn receive(&self, update: &ArrayUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                if let Some(mapped) = self.apply(change) {
                    self.pending.push(mapped);
                }
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }

    /// Update the cached copy; returns the forwarded change if anyone listens.
    fn apply(&self, change: &ArrayChange<T>) -> Option<ArrayChange<U>> {
        let mut value = self.value.borrow_mut();
        if value.len() != change.initial_count() {
            fatal(Violation::CountMismatch {
                expected: change.initial_count(),
                actual: value.len(),
            });
        }
        let mut forwarded = self
            .signal
            .is_connected()
            .then(|| ArrayChange::new(value.len()));

        for modification in change.modifications() {
            let at = modification.at();
            check_range(&(at..at + modification.old_len()), value.len());
            let mapped = match modification {
                ArrayModification::Insert { element, .. } => {
                    let element = (self.transform)(element);
                    value.insert(at, element.clone());
                    ArrayModification::Insert { element, at }
                }
                ArrayModification::Remove { .. } => ArrayModification::Remove {
                    element: value.remove(at),
                    at,
                },
                ArrayModification::Replace { new, .. } => {
                    let new = (self.transform)(new);
                    let old = std::mem::replace(&mut value[at], new.clone());
                    ArrayModification::Replace { old, at, new }
                }
                ArrayModification::ReplaceSlice { old, new, .. } => {
                    let new: Vec<U> = new.iter().map(|e| (self.transform)(e)).collect();
                    let old = value
                        .splice(at..at + old.len(), new.iter().cloned())
                        .collect();
                    ArrayModification::ReplaceSlice { old, at, new }
                }
            };
            if let Some(forwarded) = forwarded.as_mut() {
                forwarded.push(mapped);
            }
        }
        forwarded
    }
}

/// An array holding a transformed copy of its parent.
///
/// The copy is kept in lockstep with the parent for as long as any handle
/// exists, so `transform` runs exactly once per inserted element.
pub struct BufferedMappedArray<T, U> {
    inner: Rc<BufferedInner<T, U>>,
}

impl<T: Clone + 'static, U: Clone + 'static> BufferedMappedArray<T, U> {
    pub fn new(parent: AnyObservableArray<T>, transform: impl Fn(&T) -> U + 'static) -> Self {
        let value = parent.value().iter().map(&transform).collect();
        let inner = Rc::new(BufferedInner {
            transform: Box::new(transform),
            value: RefCell::new(value),
            signal: TransactionalSignal::new(),
            pending: Coalescer::new(),
            upstream: Upstream::new(),
        });
        let connection = subscribe_weak(&parent, &inner, |inner, update| inner.receive(update));
        inner.upstream.attach(connection);
        Self { inner }
    }
}

impl<T: Clone + 'static, U: Clone + 'static> Source<ArrayUpdate<U>> for BufferedMappedArray<T, U> {
    // Changes are only collected while connected, so a pending change from
    // an earlier listening period would leave a gap in the chain.
    fn add_sink(&self, sink: AnySink<ArrayUpdate<U>>) {
        if self.inner.signal.add(sink) {
            self.inner.pending.clear();
        }
    }

    fn remove_sink(&self, sink: &AnySink<ArrayUpdate<U>>) {
        if self.inner.signal.remove(sink) {
            self.inner.pending.clear();
        }
    }
}

impl<T: Clone + 'static, U: Clone + 'static> ObservableArray<U> for BufferedMappedArray<T, U> {
    fn count(&self) -> usize {
        self.inner.value.borrow().len()
    }

    fn value(&self) -> Vec<U> {
        self.inner.value.borrow().clone()
    }

    fn slice(&self, range: Range<usize>) -> Vec<U> {
        let value = self.inner.value.borrow();
        check_range(&range, value.len());
        value[range].to_vec()
    }
}

impl<T, U> Clone for BufferedMappedArray<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
