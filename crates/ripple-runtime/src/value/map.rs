//! Single-parent value operators.

use std::cell::RefCell;
use std::rc::Rc;

use ripple_core::{Update, ValueChange};

use crate::connection::Connection;
use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};

use super::{AnyObservableValue, Coalescer, ObservableValue, ValueUpdate};

struct MappedInner<T, U> {
    parent: AnyObservableValue<T>,
    transform: Box<dyn Fn(&T) -> U>,
    signal: TransactionalSignal<ValueChange<U>>,
    pending: Coalescer<ValueChange<U>>,
    upstream: Upstream,
}

impl<T: Clone + 'static, U: Clone + 'static> MappedInner<T, U> {
    fn receive(&self, update: &ValueUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => self.pending.push(change.map(|v| (self.transform)(v))),
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }
}

/// A value computed from its parent on demand.
pub struct MappedValue<T, U> {
    inner: Rc<MappedInner<T, U>>,
}

impl<T: Clone + 'static, U: Clone + 'static> MappedValue<T, U> {
    pub fn new(parent: AnyObservableValue<T>, transform: impl Fn(&T) -> U + 'static) -> Self {
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

impl<T: Clone + 'static, U: Clone + 'static> Source<ValueUpdate<U>> for MappedValue<T, U> {
    fn add_sink(&self, sink: AnySink<ValueUpdate<U>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "value.map", "activated");
            let connection = subscribe_weak(&self.inner.parent, &self.inner, |inner, update| {
                inner.receive(update);
            });
            self.inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<ValueUpdate<U>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "value.map", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
        }
    }
}

impl<T: Clone + 'static, U: Clone + 'static> ObservableValue<U> for MappedValue<T, U> {
    fn value(&self) -> U {
        (self.inner.transform)(&self.inner.parent.value())
    }
}

impl<T, U> Clone for MappedValue<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct BufferedInner<T> {
    value: RefCell<T>,
    signal: TransactionalSignal<ValueChange<T>>,
    pending: Coalescer<ValueChange<T>>,
    upstream: Upstream,
}

impl<T: Clone + 'static> BufferedInner<T> {
    fn receive(&self, update: &ValueUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                self.value.replace(change.new.clone());
                if self.signal.is_connected() {
                    self.pending.push(change.clone());
                }
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }
}

/// A value that keeps its own copy of its parent's value.
///
/// Unlike the other operators it stays subscribed to its parent for as long
/// as any handle to it exists.
pub struct BufferedValue<T> {
    inner: Rc<BufferedInner<T>>,
}

impl<T: Clone + 'static> BufferedValue<T> {
    pub fn new(parent: AnyObservableValue<T>) -> Self {
        let inner = Rc::new(BufferedInner {
            value: RefCell::new(parent.value()),
            signal: TransactionalSignal::new(),
            pending: Coalescer::new(),
            upstream: Upstream::new(),
        });
        let connection: Connection =
            subscribe_weak(&parent, &inner, |inner, update| inner.receive(update));
        inner.upstream.attach(connection);
        Self { inner }
    }
}

impl<T: Clone + 'static> Source<ValueUpdate<T>> for BufferedValue<T> {
    fn add_sink(&self, sink: AnySink<ValueUpdate<T>>) {
        if self.inner.signal.add(sink) {
            self.inner.pending.clear();
        }
    }

    fn remove_sink(&self, sink: &AnySink<ValueUpdate<T>>) {
        if self.inner.signal.remove(sink) {
            self.inner.pending.clear();
        }
    }
}

impl<T: Clone + 'static> ObservableValue<T> for BufferedValue<T> {
    fn value(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T> Clone for BufferedValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct DistinctInner<T> {
    parent: AnyObservableValue<T>,
    signal: TransactionalSignal<ValueChange<T>>,
    pending: Coalescer<ValueChange<T>>,
    upstream: Upstream,
}

impl<T: Clone + PartialEq + 'static> DistinctInner<T> {
    fn receive(&self, update: &ValueUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => self.pending.push(change.clone()),
            Update::EndTransaction => self
                .pending
                .end(&self.signal, |change| !change.is_identity()),
        }
    }
}

/// Forwards a transaction's change only if it alters the value.
pub struct DistinctValue<T> {
    inner: Rc<DistinctInner<T>>,
}

impl<T: Clone + PartialEq + 'static> DistinctValue<T> {
    pub fn new(parent: AnyObservableValue<T>) -> Self {
        Self {
            inner: Rc::new(DistinctInner {
                parent,
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Source<ValueUpdate<T>> for DistinctValue<T> {
    fn add_sink(&self, sink: AnySink<ValueUpdate<T>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "value.distinct", "activated");
            let connection = subscribe_weak(&self.inner.parent, &self.inner, |inner, update| {
                inner.receive(update);
            });
            self.inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<ValueUpdate<T>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "value.distinct", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
        }
    }
}

impl<T: Clone + PartialEq + 'static> ObservableValue<T> for DistinctValue<T> {
    fn value(&self) -> T {
        self.inner.parent.value()
    }
}

impl<T> Clone for DistinctValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
