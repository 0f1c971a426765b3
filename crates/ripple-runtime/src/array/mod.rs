#![forbid(unsafe_code)]

//! Observable ordered sequences.
//!
//! An [`ObservableArray<T>`] exposes its elements synchronously and streams
//! [`ArrayUpdate<T>`] frames whose changes are expressed as index-addressed
//! [`ArrayChange`]s.
//!
//! # Invariants
//!
//! 1. Every change an array delivers has `initial_count` equal to the count
//!    it last reported, and applying it yields `final_count` elements. A
//!    derived array that observes a parent change violating this against
//!    its own tracked count calls [`fatal`].
//! 2. Unbuffered operators ([`MappedArray`], [`FilteredArray`] while
//!    unobserved) compute elements on access and only for the requested
//!    indices.
//! 3. Derived arrays emit at most one change per outermost transaction.

mod batched;
mod concat;
mod filter;
mod map;
mod replacing;
mod variable;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::rc::Rc;

use ripple_core::{ArrayChange, BatchedArrayChange, Update, Violation, fatal};

use crate::config::ReduceConfig;
use crate::connection::Connection;
use crate::sink::AnySink;
use crate::source::{Source, SourceExt};
use crate::value::{CountValue, ReducedValue};

pub use concat::ConcatenatedArray;
pub use filter::FilteredArray;
pub use map::{BufferedMappedArray, MappedArray};
pub use replacing::ReplacingIfEmptyArray;
pub use variable::ArrayVariable;

/// Update frame of an observable array.
pub type ArrayUpdate<T> = Update<ArrayChange<T>>;

/// Fatal unless `range` lies within `0..len`.
#[track_caller]
pub(crate) fn check_range(range: &Range<usize>, len: usize) {
    if range.start > range.end || range.end > len {
        fatal(Violation::IndexOutOfBounds {
            index: range.end.max(range.start),
            len,
        });
    }
}

/// An ordered sequence that can be read synchronously and observed.
pub trait ObservableArray<T: Clone + 'static>: Source<ArrayUpdate<T>> {
    fn count(&self) -> usize;

    /// A snapshot of every element.
    fn value(&self) -> Vec<T>;

    /// The elements in `range`. Out-of-range access is fatal.
    #[track_caller]
    fn slice(&self, range: Range<usize>) -> Vec<T> {
        let value = self.value();
        check_range(&range, value.len());
        value[range].to_vec()
    }

    /// The element at `index`. Out-of-range access is fatal.
    #[track_caller]
    fn element(&self, index: usize) -> T {
        let count = self.count();
        if index >= count {
            fatal(Violation::IndexOutOfBounds { index, len: count });
        }
        match self.slice(index..index + 1).pop() {
            Some(element) => element,
            None => fatal(Violation::IndexOutOfBounds { index, len: count }),
        }
    }

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    fn into_any(self) -> AnyObservableArray<T>
    where
        Self: Sized,
    {
        AnyObservableArray::new(self)
    }
}

/// Operators available on every cloneable observable array.
pub trait ObservableArrayExt<T: Clone + 'static>: ObservableArray<T> + Clone + Sized {
    /// Transform elements on access. Nothing is cached.
    fn map<U: Clone + 'static>(&self, transform: impl Fn(&T) -> U + 'static) -> MappedArray<T, U> {
        MappedArray::new(self.clone().into_any(), transform)
    }

    /// Keep a transformed copy of the whole sequence.
    fn buffered_map<U: Clone + 'static>(
        &self,
        transform: impl Fn(&T) -> U + 'static,
    ) -> BufferedMappedArray<T, U> {
        BufferedMappedArray::new(self.clone().into_any(), transform)
    }

    /// Keep the elements matching `predicate`, in order.
    fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> FilteredArray<T> {
        FilteredArray::new(self.clone().into_any(), predicate)
    }

    /// This array followed by `other`.
    fn concat(&self, other: &(impl ObservableArray<T> + Clone)) -> ConcatenatedArray<T> {
        ConcatenatedArray::new(self.clone().into_any(), other.clone().into_any())
    }

    /// Show `substitute` while this array is empty.
    fn replacing_if_empty(&self, substitute: Vec<T>) -> ReplacingIfEmptyArray<T> {
        ReplacingIfEmptyArray::new(self.clone().into_any(), substitute)
    }

    /// The element count as an observable value.
    fn observable_count(&self) -> CountValue<ArrayChange<T>> {
        let array = self.clone();
        CountValue::new(self.clone().into_source(), move || array.count())
    }

    /// Fold the elements into an accumulator maintained incrementally.
    ///
    /// `remove` must exactly cancel `add`; see [`reduce_with`](Self::reduce_with)
    /// for a checked variant.
    fn reduce<A: Clone + 'static>(
        &self,
        initial: A,
        add: impl Fn(&A, &T) -> A + 'static,
        remove: impl Fn(&A, &T) -> A + 'static,
    ) -> ReducedValue<ArrayChange<T>, A> {
        let array = self.clone();
        ReducedValue::new(
            self.clone().into_source(),
            move || array.value(),
            initial,
            add,
            remove,
        )
    }

    /// [`reduce`](Self::reduce) with a consistency check configured by `config`.
    fn reduce_with<A: Clone + PartialEq + fmt::Debug + 'static>(
        &self,
        initial: A,
        add: impl Fn(&A, &T) -> A + 'static,
        remove: impl Fn(&A, &T) -> A + 'static,
        config: ReduceConfig,
    ) -> ReducedValue<ArrayChange<T>, A> {
        let array = self.clone();
        ReducedValue::with_config(
            self.clone().into_source(),
            move || array.value(),
            initial,
            add,
            remove,
            config,
        )
    }

    /// Call `f` once per transaction with its deletions, insertions and moves.
    ///
    /// Fatal if a moved value occurs more than once in the transaction.
    fn subscribe_batched(&self, f: impl Fn(&BatchedArrayChange) + 'static) -> Connection
    where
        T: Eq + Hash,
    {
        self.connect(batched::BatchingSink::new(f))
    }
}

impl<T: Clone + 'static, A: ObservableArray<T> + Clone> ObservableArrayExt<T> for A {}

/// Type-erased observable array with pointer identity.
pub struct AnyObservableArray<T> {
    inner: Rc<dyn ObservableArray<T>>,
}

impl<T: Clone + 'static> AnyObservableArray<T> {
    pub fn new(array: impl ObservableArray<T>) -> Self {
        Self {
            inner: Rc::new(array),
        }
    }
}

impl<T: Clone + 'static> Source<ArrayUpdate<T>> for AnyObservableArray<T> {
    fn add_sink(&self, sink: AnySink<ArrayUpdate<T>>) {
        self.inner.add_sink(sink);
    }

    fn remove_sink(&self, sink: &AnySink<ArrayUpdate<T>>) {
        self.inner.remove_sink(sink);
    }
}

impl<T: Clone + 'static> ObservableArray<T> for AnyObservableArray<T> {
    fn count(&self) -> usize {
        self.inner.count()
    }

    fn value(&self) -> Vec<T> {
        self.inner.value()
    }

    fn slice(&self, range: Range<usize>) -> Vec<T> {
        self.inner.slice(range)
    }

    fn element(&self, index: usize) -> T {
        self.inner.element(index)
    }

    fn into_any(self) -> AnyObservableArray<T> {
        self
    }
}

impl<T> Clone for AnyObservableArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for AnyObservableArray<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for AnyObservableArray<T> {}

impl<T> Hash for AnyObservableArray<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.inner).cast::<()>().hash(state);
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for AnyObservableArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.value()).finish()
    }
}
