//! Storage-backed values.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ripple_core::ValueChange;

use crate::signal::Signal;
use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;

use super::{ObservableValue, ValueUpdate};

struct VariableInner<T> {
    value: RefCell<T>,
    signal: TransactionalSignal<ValueChange<T>>,
}

/// A mutable observable value.
///
/// Cloning a `Variable` creates a new handle to the **same** storage.
/// Changes are emitted only while at least one sink is attached.
pub struct Variable<T> {
    inner: Rc<VariableInner<T>>,
}

impl<T: Clone + 'static> Variable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(VariableInner {
                value: RefCell::new(value),
                signal: TransactionalSignal::new(),
            }),
        }
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        let old = self.inner.value.replace(value.clone());
        if self.inner.signal.is_connected() {
            self.inner
                .signal
                .send_transaction(ValueChange::new(old, value));
        }
    }

    /// Apply a change whose `new` end becomes the value.
    pub fn apply(&self, change: ValueChange<T>) {
        self.set(change.new);
    }

    /// Modify the value in place through `f`.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut value = self.inner.value.borrow().clone();
        f(&mut value);
        self.set(value);
    }

    /// Group every mutation made by `f` into one transaction.
    pub fn transaction<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.inner.signal.begin();
        let result = f(self);
        self.inner.signal.end();
        result
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }
}

impl<T: Clone + 'static> Source<ValueUpdate<T>> for Variable<T> {
    fn add_sink(&self, sink: AnySink<ValueUpdate<T>>) {
        self.inner.signal.add(sink);
    }

    fn remove_sink(&self, sink: &AnySink<ValueUpdate<T>>) {
        self.inner.signal.remove(sink);
    }
}

impl<T: Clone + 'static> ObservableValue<T> for Variable<T> {
    fn value(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Variable<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for Variable<T> {}

impl<T> Hash for Variable<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.inner).hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Variable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("value", &*self.inner.value.borrow())
            .field("signal", &self.inner.signal)
            .finish()
    }
}

/// A value that never changes.
pub struct Constant<T> {
    inner: Rc<(T, Signal<ValueUpdate<T>>)>,
}

impl<T: Clone + 'static> Constant<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new((value, Signal::new())),
        }
    }
}

impl<T: Clone + 'static> Source<ValueUpdate<T>> for Constant<T> {
    fn add_sink(&self, sink: AnySink<ValueUpdate<T>>) {
        self.inner.1.add(sink);
    }

    fn remove_sink(&self, sink: &AnySink<ValueUpdate<T>>) {
        self.inner.1.remove(sink);
    }
}

impl<T: Clone + 'static> ObservableValue<T> for Constant<T> {
    fn value(&self) -> T {
        self.inner.0.clone()
    }
}

impl<T> Clone for Constant<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Constant<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Constant").field(&self.inner.0).finish()
    }
}
