//! Storage-backed arrays.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::rc::Rc;

use ripple_core::{ArrayChange, ArrayModification, Violation, fatal};

use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;

use super::{ArrayUpdate, ObservableArray, check_range};

struct ArrayVariableInner<T> {
    value: RefCell<Vec<T>>,
    signal: TransactionalSignal<ArrayChange<T>>,
}

/// A mutable observable array.
///
/// Every mutation is applied to storage first and then, if any sink is
/// attached, sent as a single-change transaction. Cloning shares storage.
pub struct ArrayVariable<T> {
    inner: Rc<ArrayVariableInner<T>>,
}

impl<T: Clone + 'static> ArrayVariable<T> {
    pub fn new(value: Vec<T>) -> Self {
        Self {
            inner: Rc::new(ArrayVariableInner {
                value: RefCell::new(value),
                signal: TransactionalSignal::new(),
            }),
        }
    }

    /// Apply `change`, which must start from the current count.
    #[track_caller]
    pub fn apply(&self, change: ArrayChange<T>) {
        let applied = change.try_apply(&mut self.inner.value.borrow_mut());
        if let Err(violation) = applied {
            fatal(violation);
        }
        if !change.is_empty() && self.inner.signal.is_connected() {
            self.inner.signal.send_transaction(change);
        }
    }

    /// Replace every element.
    pub fn set_value(&self, value: Vec<T>) {
        let old = self.inner.value.replace(value.clone());
        if self.inner.signal.is_connected() {
            let change = ArrayChange::from_replacement(old, value);
            if !change.is_empty() {
                self.inner.signal.send_transaction(change);
            }
        }
    }

    #[track_caller]
    pub fn insert(&self, at: usize, element: T) {
        let count = self.count();
        if at > count {
            fatal(Violation::IndexOutOfBounds { index: at, len: count });
        }
        self.apply_modification(count, ArrayModification::Insert { element, at });
    }

    pub fn push(&self, element: T) {
        self.insert(self.count(), element);
    }

    /// Remove and return the element at `at`.
    #[track_caller]
    pub fn remove(&self, at: usize) -> T {
        let element = self.element(at);
        self.apply_modification(
            self.count(),
            ArrayModification::Remove {
                element: element.clone(),
                at,
            },
        );
        element
    }

    /// Replace the element at `at`, returning the old one.
    #[track_caller]
    pub fn replace(&self, at: usize, element: T) -> T {
        let old = self.element(at);
        self.apply_modification(
            self.count(),
            ArrayModification::Replace {
                old: old.clone(),
                at,
                new: element,
            },
        );
        old
    }

    /// Replace the elements in `range` with `elements`, returning the old ones.
    #[track_caller]
    pub fn replace_range(&self, range: Range<usize>, elements: Vec<T>) -> Vec<T> {
        let count = self.count();
        check_range(&range, count);
        let at = range.start;
        let old = self.slice(range);
        if let Some(modification) = ArrayModification::from_parts(at, old.clone(), elements) {
            self.apply_modification(count, modification);
        }
        old
    }

    /// Group every mutation made by `f` into one transaction.
    pub fn transaction<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.inner.signal.begin();
        let result = f(self);
        self.inner.signal.end();
        result
    }

    /// Access the elements by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    fn apply_modification(&self, count: usize, modification: ArrayModification<T>) {
        self.apply(ArrayChange::with_modification(count, modification));
    }
}

impl<T: Clone + 'static> Source<ArrayUpdate<T>> for ArrayVariable<T> {
    fn add_sink(&self, sink: AnySink<ArrayUpdate<T>>) {
        self.inner.signal.add(sink);
    }

    fn remove_sink(&self, sink: &AnySink<ArrayUpdate<T>>) {
        self.inner.signal.remove(sink);
    }
}

impl<T: Clone + 'static> ObservableArray<T> for ArrayVariable<T> {
    fn count(&self) -> usize {
        self.inner.value.borrow().len()
    }

    fn value(&self) -> Vec<T> {
        self.inner.value.borrow().clone()
    }

    fn slice(&self, range: Range<usize>) -> Vec<T> {
        let value = self.inner.value.borrow();
        check_range(&range, value.len());
        value[range].to_vec()
    }
}

impl<T> Clone for ArrayVariable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for ArrayVariable<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for ArrayVariable<T> {}

impl<T> Hash for ArrayVariable<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.inner).hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for ArrayVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayVariable")
            .field("value", &*self.inner.value.borrow())
            .field("signal", &self.inner.signal)
            .finish()
    }
}
