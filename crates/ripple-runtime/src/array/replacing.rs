//! Substitute content for empty arrays.

use std::cell::Cell;
use std::rc::Rc;

use ripple_core::{ArrayChange, Change, Update};

use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};
use crate::value::Coalescer;

use super::{AnyObservableArray, ArrayUpdate, ObservableArray};

struct ReplacingInner<T> {
    parent: AnyObservableArray<T>,
    substitute: Vec<T>,
    parent_count: Cell<usize>,
    signal: TransactionalSignal<ArrayChange<T>>,
    pending: Coalescer<ArrayChange<T>>,
    upstream: Upstream,
}

impl<T: Clone + 'static> ReplacingInner<T> {
    fn receive(&self, update: &ArrayUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                let change = self.translate(change);
                self.pending.push(change);
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }

    fn translate(&self, change: &ArrayChange<T>) -> ArrayChange<T> {
        let was_empty = self.parent_count.get() == 0;
        let is_empty = change.final_count() == 0;
        self.parent_count.set(change.final_count());
        match (was_empty, is_empty) {
            (false, false) => change.clone(),
            (true, true) => ArrayChange::new(self.substitute.len()),
            // Going from empty, the new content is the change applied to
            // nothing; going to empty, the old content is the reverse.
            (true, false) => {
                ArrayChange::from_replacement(self.substitute.clone(), change.applied(&[]))
            }
            (false, true) => ArrayChange::from_replacement(
                change.reversed().applied(&[]),
                self.substitute.clone(),
            ),
        }
    }
}

/// An array that shows a fixed substitute while its parent is empty.
///
/// Transitions to and from empty are delivered as one whole-range
/// replacement so subscribers never see an index-inconsistent jump.
pub struct ReplacingIfEmptyArray<T> {
    inner: Rc<ReplacingInner<T>>,
}

impl<T: Clone + 'static> ReplacingIfEmptyArray<T> {
    pub fn new(parent: AnyObservableArray<T>, substitute: Vec<T>) -> Self {
        Self {
            inner: Rc::new(ReplacingInner {
                parent,
                substitute,
                parent_count: Cell::new(0),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }
}

impl<T: Clone + 'static> Source<ArrayUpdate<T>> for ReplacingIfEmptyArray<T> {
    fn add_sink(&self, sink: AnySink<ArrayUpdate<T>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "array.replacing_if_empty", "activated");
            self.inner.parent_count.set(self.inner.parent.count());
            let connection = subscribe_weak(&self.inner.parent, &self.inner, |inner, update| {
                inner.receive(update);
            });
            self.inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<ArrayUpdate<T>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "array.replacing_if_empty", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
        }
    }
}

impl<T: Clone + 'static> ObservableArray<T> for ReplacingIfEmptyArray<T> {
    fn count(&self) -> usize {
        match self.inner.parent.count() {
            0 => self.inner.substitute.len(),
            count => count,
        }
    }

    fn value(&self) -> Vec<T> {
        let value = self.inner.parent.value();
        if value.is_empty() {
            self.inner.substitute.clone()
        } else {
            value
        }
    }
}

impl<T> Clone for ReplacingIfEmptyArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
