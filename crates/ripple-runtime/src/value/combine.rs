//! Two-parent value combination.

use std::cell::RefCell;
use std::rc::Rc;

use ripple_core::{Update, ValueChange};

use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};

use super::{AnyObservableValue, Coalescer, ObservableValue, ValueUpdate};

struct CombinedInner<A, B, R> {
    left: AnyObservableValue<A>,
    right: AnyObservableValue<B>,
    combine: Box<dyn Fn(&A, &B) -> R>,
    // Parent values as last seen through their change streams.
    inputs: RefCell<Option<(A, B)>>,
    signal: TransactionalSignal<ValueChange<R>>,
    pending: Coalescer<ValueChange<R>>,
    upstream: Upstream,
}

impl<A, B, R> CombinedInner<A, B, R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    R: Clone + 'static,
{
    fn receive<X>(&self, update: &ValueUpdate<X>, store: impl FnOnce(&mut (A, B), &X)) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                let change = {
                    let mut inputs = self.inputs.borrow_mut();
                    let Some(inputs) = inputs.as_mut() else {
                        return;
                    };
                    let old = (self.combine)(&inputs.0, &inputs.1);
                    store(inputs, &change.new);
                    ValueChange::new(old, (self.combine)(&inputs.0, &inputs.1))
                };
                self.pending.push(change);
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }
}

/// A value computed from two parents.
pub struct CombinedValue<A, B, R> {
    inner: Rc<CombinedInner<A, B, R>>,
}

impl<A, B, R> CombinedValue<A, B, R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    R: Clone + 'static,
{
    pub fn new(
        left: AnyObservableValue<A>,
        right: AnyObservableValue<B>,
        combine: impl Fn(&A, &B) -> R + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(CombinedInner {
                left,
                right,
                combine: Box::new(combine),
                inputs: RefCell::new(None),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }

    fn activate(&self) {
        tracing::debug!(operator = "value.combine", "activated");
        let inner = &self.inner;
        inner
            .inputs
            .replace(Some((inner.left.value(), inner.right.value())));
        inner.upstream.attach(subscribe_weak(&inner.left, inner, |inner, update| {
            inner.receive(update, |inputs, a: &A| inputs.0 = a.clone());
        }));
        inner.upstream.attach(subscribe_weak(&inner.right, inner, |inner, update| {
            inner.receive(update, |inputs, b: &B| inputs.1 = b.clone());
        }));
    }
}

impl<A, B, R> Source<ValueUpdate<R>> for CombinedValue<A, B, R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    R: Clone + 'static,
{
    fn add_sink(&self, sink: AnySink<ValueUpdate<R>>) {
        if self.inner.signal.add(sink) {
            self.activate();
        }
    }

    fn remove_sink(&self, sink: &AnySink<ValueUpdate<R>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "value.combine", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
            self.inner.inputs.replace(None);
        }
    }
}

impl<A, B, R> ObservableValue<R> for CombinedValue<A, B, R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    R: Clone + 'static,
{
    fn value(&self) -> R {
        (self.inner.combine)(&self.inner.left.value(), &self.inner.right.value())
    }
}

impl<A, B, R> Clone for CombinedValue<A, B, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
