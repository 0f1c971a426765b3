//! Concatenation of two arrays.

use std::cell::Cell;
use std::rc::Rc;

use ripple_core::{ArrayChange, Update, Violation, fatal};

use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};
use crate::value::Coalescer;

use super::{AnyObservableArray, ArrayUpdate, ObservableArray};

#[derive(Clone, Copy)]
enum Side {
    First,
    Second,
}

struct ConcatInner<T> {
    first: AnyObservableArray<T>,
    second: AnyObservableArray<T>,
    // Element counts of each side as last seen through their changes.
    first_count: Cell<usize>,
    second_count: Cell<usize>,
    signal: TransactionalSignal<ArrayChange<T>>,
    pending: Coalescer<ArrayChange<T>>,
    upstream: Upstream,
}

impl<T: Clone + 'static> ConcatInner<T> {
    fn receive(&self, side: Side, update: &ArrayUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => self.pending.push(self.widen(side, change)),
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }

    fn widen(&self, side: Side, change: &ArrayChange<T>) -> ArrayChange<T> {
        let first = self.first_count.get();
        let second = self.second_count.get();
        let (tracked, start) = match side {
            Side::First => (&self.first_count, 0),
            Side::Second => (&self.second_count, first),
        };
        if tracked.get() != change.initial_count() {
            fatal(Violation::CountMismatch {
                expected: change.initial_count(),
                actual: tracked.get(),
            });
        }
        tracked.set(change.final_count());
        change.clone().widen(start, first + second)
    }
}

/// Two arrays, one after the other.
pub struct ConcatenatedArray<T> {
    inner: Rc<ConcatInner<T>>,
}

impl<T: Clone + 'static> ConcatenatedArray<T> {
    pub fn new(first: AnyObservableArray<T>, second: AnyObservableArray<T>) -> Self {
        Self {
            inner: Rc::new(ConcatInner {
                first,
                second,
                first_count: Cell::new(0),
                second_count: Cell::new(0),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }

    fn activate(&self) {
        tracing::debug!(operator = "array.concat", "activated");
        let inner = &self.inner;
        inner.first_count.set(inner.first.count());
        inner.second_count.set(inner.second.count());
        inner.upstream.attach(subscribe_weak(&inner.first, inner, |inner, update| {
            inner.receive(Side::First, update);
        }));
        inner.upstream.attach(subscribe_weak(&inner.second, inner, |inner, update| {
            inner.receive(Side::Second, update);
        }));
    }
}

impl<T: Clone + 'static> Source<ArrayUpdate<T>> for ConcatenatedArray<T> {
    fn add_sink(&self, sink: AnySink<ArrayUpdate<T>>) {
        if self.inner.signal.add(sink) {
            self.activate();
        }
    }

    fn remove_sink(&self, sink: &AnySink<ArrayUpdate<T>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "array.concat", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
        }
    }
}

impl<T: Clone + 'static> ObservableArray<T> for ConcatenatedArray<T> {
    fn count(&self) -> usize {
        self.inner.first.count() + self.inner.second.count()
    }

    fn value(&self) -> Vec<T> {
        let mut value = self.inner.first.value();
        value.extend(self.inner.second.value());
        value
    }

    fn element(&self, index: usize) -> T {
        let first = self.inner.first.count();
        if index < first {
            self.inner.first.element(index)
        } else {
            self.inner.second.element(index - first)
        }
    }
}

impl<T> Clone for ConcatenatedArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
