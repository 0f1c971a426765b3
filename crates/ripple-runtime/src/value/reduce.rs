//! Incremental folds over collections.
//!
//! # Design
//!
//! A fold is described by an initial accumulator and two functions: `add`
//! folds an element in, `remove` folds it back out. While observed, the
//! accumulator is updated from each change's removed and inserted elements
//! and never recomputed from scratch.
//!
//! # Failure Modes
//!
//! If `remove` does not exactly cancel `add` the accumulator drifts. With a
//! [`ReduceConfig::check_interval`] the fold is recomputed periodically and
//! compared; a mismatch is fatal or, under [`DriftPolicy::Warn`], logged and
//! corrected in place.
//!
//! The recomputation folds a shadow copy of the collection built from the
//! delivered changes, not the parent's storage. A reentrant mutation updates
//! storage before its frames arrive, so storage can run ahead of the fold
//! without anything being wrong.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::num::NonZeroUsize;
use std::rc::Rc;

use ripple_core::{Change, ElementChange, Update, ValueChange, Violation, fatal};

use crate::config::{DriftPolicy, ReduceConfig};
use crate::sink::AnySink;
use crate::source::{AnySource, Source};
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};

use super::{Coalescer, ObservableValue, ValueUpdate};

type Fold<A, E> = Box<dyn Fn(&A, &E) -> A>;

struct DriftCheck<A> {
    interval: NonZeroUsize,
    policy: DriftPolicy,
    compare: Box<dyn Fn(&A, &A) -> Option<String>>,
}

struct ReduceInner<C: ElementChange, A> {
    source: AnySource<Update<C>>,
    snapshot: Box<dyn Fn() -> C::Value>,
    initial: A,
    add: Fold<A, C::Element>,
    remove: Fold<A, C::Element>,
    check: Option<DriftCheck<A>>,
    accumulated: RefCell<Option<A>>,
    /// The collection as delivered so far; kept only when checking.
    shadow: RefCell<Option<C::Value>>,
    transactions: Cell<usize>,
    signal: TransactionalSignal<ValueChange<A>>,
    pending: Coalescer<ValueChange<A>>,
    upstream: Upstream,
}

impl<C: ElementChange, A: Clone + 'static> ReduceInner<C, A> {
    fn fold(&self, value: &C::Value) -> A {
        let mut acc = self.initial.clone();
        C::for_each_element(value, &mut |element: &C::Element| {
            acc = (self.add)(&acc, element);
        });
        acc
    }

    fn fold_all(&self) -> A {
        self.fold(&(self.snapshot)())
    }

    fn activate(&self) {
        let value = (self.snapshot)();
        self.accumulated.replace(Some(self.fold(&value)));
        if self.check.is_some() {
            self.shadow.replace(Some(value));
        }
        self.transactions.set(0);
    }

    fn receive(&self, update: &Update<C>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                if let Some(shadow) = self.shadow.borrow_mut().as_mut() {
                    change.apply(shadow);
                }
                let change = {
                    let mut accumulated = self.accumulated.borrow_mut();
                    let Some(current) = accumulated.as_mut() else {
                        return;
                    };
                    let old = current.clone();
                    let mut next = old.clone();
                    change.for_each_removed(&mut |element: &C::Element| {
                        next = (self.remove)(&next, element);
                    });
                    change.for_each_inserted(&mut |element: &C::Element| {
                        next = (self.add)(&next, element);
                    });
                    *current = next.clone();
                    ValueChange::new(old, next)
                };
                self.pending.push(change);
            }
            Update::EndTransaction => {
                if self.signal.depth() == 1 {
                    self.verify();
                }
                self.pending.end(&self.signal, |_| true);
            }
        }
    }

    fn verify(&self) {
        let Some(check) = &self.check else {
            return;
        };
        let transactions = self.transactions.get() + 1;
        self.transactions.set(transactions);
        if transactions % check.interval.get() != 0 {
            return;
        }
        let expected = {
            let shadow = self.shadow.borrow();
            let Some(shadow) = shadow.as_ref() else {
                return;
            };
            self.fold(shadow)
        };
        let drift = {
            let accumulated = self.accumulated.borrow();
            let Some(current) = accumulated.as_ref() else {
                return;
            };
            (check.compare)(current, &expected).map(|detail| (current.clone(), detail))
        };
        let Some((current, detail)) = drift else {
            return;
        };
        match check.policy {
            DriftPolicy::Fatal => fatal(Violation::FoldDrift { detail }),
            DriftPolicy::Warn => {
                tracing::warn!(%detail, "fold drifted, resynchronising");
                self.accumulated.replace(Some(expected.clone()));
                self.pending.push(ValueChange::new(current, expected));
            }
        }
    }
}

/// A fold over a collection maintained from its changes.
pub struct ReducedValue<C: ElementChange, A> {
    inner: Rc<ReduceInner<C, A>>,
}

impl<C: ElementChange, A: Clone + 'static> ReducedValue<C, A> {
    /// An unchecked fold.
    pub fn new(
        source: AnySource<Update<C>>,
        snapshot: impl Fn() -> C::Value + 'static,
        initial: A,
        add: impl Fn(&A, &C::Element) -> A + 'static,
        remove: impl Fn(&A, &C::Element) -> A + 'static,
    ) -> Self {
        Self::build(source, Box::new(snapshot), initial, Box::new(add), Box::new(remove), None)
    }

    /// A fold verified against a full recomputation as `config` dictates.
    pub fn with_config(
        source: AnySource<Update<C>>,
        snapshot: impl Fn() -> C::Value + 'static,
        initial: A,
        add: impl Fn(&A, &C::Element) -> A + 'static,
        remove: impl Fn(&A, &C::Element) -> A + 'static,
        config: ReduceConfig,
    ) -> Self
    where
        A: PartialEq + fmt::Debug,
    {
        let check = config.check_interval.map(|interval| DriftCheck {
            interval,
            policy: config.on_drift,
            compare: Box::new(|current: &A, expected: &A| {
                (current != expected)
                    .then(|| format!("maintained {current:?}, recomputed {expected:?}"))
            }),
        });
        Self::build(source, Box::new(snapshot), initial, Box::new(add), Box::new(remove), check)
    }

    fn build(
        source: AnySource<Update<C>>,
        snapshot: Box<dyn Fn() -> C::Value>,
        initial: A,
        add: Fold<A, C::Element>,
        remove: Fold<A, C::Element>,
        check: Option<DriftCheck<A>>,
    ) -> Self {
        Self {
            inner: Rc::new(ReduceInner {
                source,
                snapshot,
                initial,
                add,
                remove,
                check,
                accumulated: RefCell::new(None),
                shadow: RefCell::new(None),
                transactions: Cell::new(0),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }
}

impl<C: ElementChange, A: Clone + 'static> Source<ValueUpdate<A>> for ReducedValue<C, A> {
    fn add_sink(&self, sink: AnySink<ValueUpdate<A>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "reduce", "activated");
            let inner = &self.inner;
            inner.activate();
            let connection =
                subscribe_weak(&inner.source, inner, |inner, update| inner.receive(update));
            inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<ValueUpdate<A>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "reduce", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
            self.inner.accumulated.replace(None);
            self.inner.shadow.replace(None);
        }
    }
}

impl<C: ElementChange, A: Clone + 'static> ObservableValue<A> for ReducedValue<C, A> {
    fn value(&self) -> A {
        let accumulated = self.inner.accumulated.borrow().clone();
        accumulated.unwrap_or_else(|| self.inner.fold_all())
    }
}

impl<C: ElementChange, A> Clone for ReducedValue<C, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
