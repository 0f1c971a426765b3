#![forbid(unsafe_code)]

//! Observable unordered sets.
//!
//! An [`ObservableSet<T>`] exposes its elements as an [`AHashSet`] and
//! streams [`SetUpdate<T>`] frames carrying removed/inserted deltas.
//!
//! # Invariants
//!
//! 1. Operators that can collapse several source elements into one output
//!    element ([`MappedSet`]) keep a per-output contributor count. An output
//!    element is reported inserted when its first contributor appears and
//!    removed when its last one leaves.
//! 2. [`InjectiveMappedSet`] keeps no counts and treats a collision as
//!    fatal.
//! 3. Derived sets emit at most one change per outermost transaction.

mod filter;
mod map;
mod sorted;
mod variable;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ahash::AHashSet;
use ripple_core::{SetChange, Update};

use crate::config::ReduceConfig;
use crate::sink::AnySink;
use crate::source::{Source, SourceExt};
use crate::value::{AnyObservableValue, CountValue, ReducedValue};

pub use filter::{FilteredSet, ObservablyFilteredSet};
pub use map::{InjectiveMappedSet, MappedSet};
pub use sorted::SortedArray;
pub use variable::SetVariable;

/// Update frame of an observable set.
pub type SetUpdate<T> = Update<SetChange<T>>;

/// An unordered set that can be read synchronously and observed.
pub trait ObservableSet<T: Clone + Eq + Hash + 'static>: Source<SetUpdate<T>> {
    /// A snapshot of every element.
    fn value(&self) -> AHashSet<T>;

    fn count(&self) -> usize {
        self.value().len()
    }

    fn contains(&self, element: &T) -> bool {
        self.value().contains(element)
    }

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    fn into_any(self) -> AnyObservableSet<T>
    where
        Self: Sized,
    {
        AnyObservableSet::new(self)
    }
}

/// Operators available on every cloneable observable set.
pub trait ObservableSetExt<T: Clone + Eq + Hash + 'static>: ObservableSet<T> + Clone + Sized {
    /// Transform every element; colliding outputs are reference counted.
    fn map<U>(&self, transform: impl Fn(&T) -> U + 'static) -> MappedSet<T, U>
    where
        U: Clone + Eq + Hash + 'static,
    {
        MappedSet::new(self.clone().into_any(), transform)
    }

    /// Transform every element into any number of outputs.
    fn flat_map<U, I>(&self, transform: impl Fn(&T) -> I + 'static) -> MappedSet<T, U>
    where
        U: Clone + Eq + Hash + 'static,
        I: IntoIterator<Item = U> + 'static,
    {
        MappedSet::flat(self.clone().into_any(), transform)
    }

    /// Transform every element with a function that never maps two
    /// elements to the same output. A collision is fatal.
    fn injective_map<U>(&self, transform: impl Fn(&T) -> U + 'static) -> InjectiveMappedSet<T, U>
    where
        U: Clone + Eq + Hash + 'static,
    {
        InjectiveMappedSet::new(self.clone().into_any(), transform)
    }

    fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> FilteredSet<T> {
        FilteredSet::new(self.clone().into_any(), predicate)
    }

    /// Keep the elements whose own observable predicate currently holds.
    fn filter_observable(
        &self,
        predicate: impl Fn(&T) -> AnyObservableValue<bool> + 'static,
    ) -> ObservablyFilteredSet<T> {
        ObservablyFilteredSet::new(self.clone().into_any(), predicate)
    }

    /// The distinct keys of the elements, in ascending order.
    fn sort_by_key<K>(&self, key: impl Fn(&T) -> K + 'static) -> SortedArray<T, K>
    where
        K: Clone + Ord + 'static,
    {
        SortedArray::new(self.clone().into_any(), key)
    }

    /// The elements in ascending order.
    fn sorted(&self) -> SortedArray<T, T>
    where
        T: Ord,
    {
        self.sort_by_key(T::clone)
    }

    fn observable_count(&self) -> CountValue<SetChange<T>> {
        let set = self.clone();
        CountValue::new(self.clone().into_source(), move || set.count())
    }

    /// Fold the elements; `remove` must exactly cancel `add`.
    fn reduce<A: Clone + 'static>(
        &self,
        initial: A,
        add: impl Fn(&A, &T) -> A + 'static,
        remove: impl Fn(&A, &T) -> A + 'static,
    ) -> ReducedValue<SetChange<T>, A> {
        let set = self.clone();
        ReducedValue::new(
            self.clone().into_source(),
            move || set.value(),
            initial,
            add,
            remove,
        )
    }

    fn reduce_with<A: Clone + PartialEq + fmt::Debug + 'static>(
        &self,
        initial: A,
        add: impl Fn(&A, &T) -> A + 'static,
        remove: impl Fn(&A, &T) -> A + 'static,
        config: ReduceConfig,
    ) -> ReducedValue<SetChange<T>, A> {
        let set = self.clone();
        ReducedValue::with_config(
            self.clone().into_source(),
            move || set.value(),
            initial,
            add,
            remove,
            config,
        )
    }
}

impl<T: Clone + Eq + Hash + 'static, S: ObservableSet<T> + Clone> ObservableSetExt<T> for S {}

/// Type-erased observable set with pointer identity.
pub struct AnyObservableSet<T> {
    inner: Rc<dyn ObservableSet<T>>,
}

impl<T: Clone + Eq + Hash + 'static> AnyObservableSet<T> {
    pub fn new(set: impl ObservableSet<T>) -> Self {
        Self {
            inner: Rc::new(set),
        }
    }
}

impl<T: Clone + Eq + Hash + 'static> Source<SetUpdate<T>> for AnyObservableSet<T> {
    fn add_sink(&self, sink: AnySink<SetUpdate<T>>) {
        self.inner.add_sink(sink);
    }

    fn remove_sink(&self, sink: &AnySink<SetUpdate<T>>) {
        self.inner.remove_sink(sink);
    }
}

impl<T: Clone + Eq + Hash + 'static> ObservableSet<T> for AnyObservableSet<T> {
    fn value(&self) -> AHashSet<T> {
        self.inner.value()
    }

    fn count(&self) -> usize {
        self.inner.count()
    }

    fn contains(&self, element: &T) -> bool {
        self.inner.contains(element)
    }

    fn into_any(self) -> AnyObservableSet<T> {
        self
    }
}

impl<T> Clone for AnyObservableSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for AnyObservableSet<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for AnyObservableSet<T> {}

impl<T> Hash for AnyObservableSet<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.inner).cast::<()>().hash(state);
    }
}

impl<T: Clone + Eq + Hash + fmt::Debug + 'static> fmt::Debug for AnyObservableSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.value()).finish()
    }
}
