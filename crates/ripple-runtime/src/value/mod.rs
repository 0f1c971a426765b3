#![forbid(unsafe_code)]

//! Observable scalar values.
//!
//! An [`ObservableValue<T>`] exposes a synchronous [`value`](ObservableValue::value)
//! and a stream of [`ValueUpdate<T>`] frames. [`Variable`] is the storage
//! primitive; everything else in this module derives from one or more
//! parents.
//!
//! # Invariants
//!
//! 1. Derived values forward their parents' transaction brackets and emit
//!    at most one coalesced [`ValueChange`] per outermost transaction, built
//!    from the first `old` and the last `new` seen inside it.
//! 2. Unbuffered operators hold no copy of the value; `value()` recomputes
//!    from the parent on every call.
//! 3. Derived values subscribe to their parents only while they have sinks
//!    of their own, except [`BufferedValue`], which tracks its parent for its
//!    whole lifetime.

mod combine;
mod count;
mod map;
mod reduce;
mod variable;

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ripple_core::{Change, Update, ValueChange};

use crate::connection::Connection;
use crate::sink::AnySink;
use crate::source::{Source, SourceExt};
use crate::transaction::TransactionalSignal;

pub use combine::CombinedValue;
pub use count::CountValue;
pub use map::{BufferedValue, DistinctValue, MappedValue};
pub use reduce::ReducedValue;
pub use variable::{Constant, Variable};

/// Update frame of an observable value.
pub type ValueUpdate<T> = Update<ValueChange<T>>;

/// A value that can be read synchronously and observed for changes.
pub trait ObservableValue<T: Clone + 'static>: Source<ValueUpdate<T>> {
    /// The current value.
    fn value(&self) -> T;

    /// Erase the concrete type.
    fn into_any(self) -> AnyObservableValue<T>
    where
        Self: Sized,
    {
        AnyObservableValue::new(self)
    }
}

/// Operators available on every cloneable observable value.
pub trait ObservableValueExt<T: Clone + 'static>: ObservableValue<T> + Clone + Sized {
    /// Derive a value by applying `transform` to this one. Unbuffered.
    fn map<U: Clone + 'static>(&self, transform: impl Fn(&T) -> U + 'static) -> MappedValue<T, U> {
        MappedValue::new(self.clone().into_any(), transform)
    }

    /// Keep a cached copy of the value, updated from the change stream.
    fn buffered(&self) -> BufferedValue<T> {
        BufferedValue::new(self.clone().into_any())
    }

    /// Suppress transactions whose net change leaves the value equal.
    fn distinct(&self) -> DistinctValue<T>
    where
        T: PartialEq,
    {
        DistinctValue::new(self.clone().into_any())
    }

    /// Combine with another value.
    fn combine<U, R>(
        &self,
        other: &(impl ObservableValue<U> + Clone),
        combine: impl Fn(&T, &U) -> R + 'static,
    ) -> CombinedValue<T, U, R>
    where
        U: Clone + 'static,
        R: Clone + 'static,
    {
        CombinedValue::new(self.clone().into_any(), other.clone().into_any(), combine)
    }

    /// Call `f` with the new value after every change.
    fn subscribe_values(&self, f: impl Fn(&T) + 'static) -> Connection {
        self.subscribe(move |update: &ValueUpdate<T>| {
            if let Update::Change(change) = update {
                f(&change.new);
            }
        })
    }
}

impl<T: Clone + 'static, O: ObservableValue<T> + Clone> ObservableValueExt<T> for O {}

/// Type-erased observable value with pointer identity.
pub struct AnyObservableValue<T> {
    inner: Rc<dyn ObservableValue<T>>,
}

impl<T: Clone + 'static> AnyObservableValue<T> {
    pub fn new(observable: impl ObservableValue<T>) -> Self {
        Self {
            inner: Rc::new(observable),
        }
    }
}

impl<T: Clone + 'static> Source<ValueUpdate<T>> for AnyObservableValue<T> {
    fn add_sink(&self, sink: AnySink<ValueUpdate<T>>) {
        self.inner.add_sink(sink);
    }

    fn remove_sink(&self, sink: &AnySink<ValueUpdate<T>>) {
        self.inner.remove_sink(sink);
    }
}

impl<T: Clone + 'static> ObservableValue<T> for AnyObservableValue<T> {
    fn value(&self) -> T {
        self.inner.value()
    }

    fn into_any(self) -> AnyObservableValue<T> {
        self
    }
}

impl<T> Clone for AnyObservableValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for AnyObservableValue<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for AnyObservableValue<T> {}

impl<T> Hash for AnyObservableValue<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.inner).cast::<()>().hash(state);
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for AnyObservableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyObservableValue")
            .field("value", &self.value())
            .finish()
    }
}

/// Merges the changes of one outermost transaction into a single change.
pub(crate) struct Coalescer<C> {
    pending: RefCell<Option<C>>,
}

impl<C: Change> Coalescer<C> {
    pub(crate) fn new() -> Self {
        Self {
            pending: RefCell::new(None),
        }
    }

    pub(crate) fn push(&self, change: C) {
        let mut pending = self.pending.borrow_mut();
        let merged = match pending.take() {
            Some(previous) => previous.merged(change),
            None => change,
        };
        *pending = Some(merged);
    }

    /// Close one level of `signal`'s transaction, first emitting the merged
    /// change if this closes the outermost level and `keep` accepts it.
    pub(crate) fn end(&self, signal: &TransactionalSignal<C>, keep: impl FnOnce(&C) -> bool) {
        if signal.depth() == 1 {
            let pending = self.pending.borrow_mut().take();
            if let Some(change) = pending {
                if !change.is_empty() && keep(&change) {
                    signal.send_change(change);
                }
            }
        }
        signal.end();
    }

    pub(crate) fn clear(&self) {
        self.pending.borrow_mut().take();
    }
}
