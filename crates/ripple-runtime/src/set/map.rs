//! Element transforms of sets.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use ripple_core::{SetChange, Update, Violation, fatal};

use crate::config::SELF_CHECKS;
use crate::sink::AnySink;
use crate::source::Source;
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};
use crate::value::Coalescer;

use super::{AnyObservableSet, ObservableSet, SetUpdate};

type Expand<T, U> = Box<dyn Fn(&T, &mut dyn FnMut(U))>;

struct MappedInner<T: Eq + Hash, U: Eq + Hash> {
    parent: AnyObservableSet<T>,
    expand: Expand<T, U>,
    // Output element to the number of source elements producing it.
    counts: RefCell<Option<AHashMap<U, usize>>>,
    signal: TransactionalSignal<SetChange<U>>,
    pending: Coalescer<SetChange<U>>,
    upstream: Upstream,
}

impl<T, U> MappedInner<T, U>
where
    T: Clone + Eq + Hash + 'static,
    U: Clone + Eq + Hash + 'static,
{
    fn receive(&self, update: &SetUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                if let Some(mapped) = self.apply(change) {
                    self.pending.push(mapped);
                }
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }

    fn apply(&self, change: &SetChange<T>) -> Option<SetChange<U>> {
        let mut counts = self.counts.borrow_mut();
        let counts = counts.as_mut()?;
        let mut mapped = SetChange::new();
        for element in change.removed() {
            (self.expand)(element, &mut |output: U| {
                let Some(count) = counts.get_mut(&output) else {
                    fatal(Violation::MissingElement);
                };
                *count -= 1;
                if *count == 0 {
                    counts.remove(&output);
                    mapped.record_removal(output);
                }
            });
        }
        for element in change.inserted() {
            (self.expand)(element, &mut |output: U| {
                let count = counts.entry(output.clone()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    mapped.record_insertion(output);
                }
            });
        }
        Some(mapped)
    }

    fn tally(&self) -> AHashMap<U, usize> {
        let mut counts = AHashMap::new();
        for element in self.parent.value() {
            (self.expand)(&element, &mut |output: U| {
                *counts.entry(output).or_insert(0) += 1;
            });
        }
        counts
    }
}

/// A set of transformed elements with per-output contributor counts.
///
/// Built by both `map` (one output per element) and `flat_map` (any number
/// of outputs per element).
pub struct MappedSet<T: Eq + Hash, U: Eq + Hash> {
    inner: Rc<MappedInner<T, U>>,
}

impl<T, U> MappedSet<T, U>
where
    T: Clone + Eq + Hash + 'static,
    U: Clone + Eq + Hash + 'static,
{
    pub fn new(parent: AnyObservableSet<T>, transform: impl Fn(&T) -> U + 'static) -> Self {
        Self::build(
            parent,
            Box::new(move |element: &T, emit: &mut dyn FnMut(U)| emit(transform(element))),
        )
    }

    pub fn flat<I>(parent: AnyObservableSet<T>, transform: impl Fn(&T) -> I + 'static) -> Self
    where
        I: IntoIterator<Item = U> + 'static,
    {
        Self::build(
            parent,
            Box::new(move |element: &T, emit: &mut dyn FnMut(U)| {
                transform(element).into_iter().for_each(emit);
            }),
        )
    }

    fn build(parent: AnyObservableSet<T>, expand: Expand<T, U>) -> Self {
        Self {
            inner: Rc::new(MappedInner {
                parent,
                expand,
                counts: RefCell::new(None),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }
}

impl<T, U> Source<SetUpdate<U>> for MappedSet<T, U>
where
    T: Clone + Eq + Hash + 'static,
    U: Clone + Eq + Hash + 'static,
{
    fn add_sink(&self, sink: AnySink<SetUpdate<U>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "set.map", "activated");
            self.inner.counts.replace(Some(self.inner.tally()));
            let connection = subscribe_weak(&self.inner.parent, &self.inner, |inner, update| {
                inner.receive(update);
            });
            self.inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<SetUpdate<U>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "set.map", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
            self.inner.counts.replace(None);
        }
    }
}

impl<T, U> ObservableSet<U> for MappedSet<T, U>
where
    T: Clone + Eq + Hash + 'static,
    U: Clone + Eq + Hash + 'static,
{
    fn value(&self) -> AHashSet<U> {
        if let Some(counts) = self.inner.counts.borrow().as_ref() {
            return counts.keys().cloned().collect();
        }
        self.inner.tally().into_keys().collect()
    }

    fn contains(&self, element: &U) -> bool {
        if let Some(counts) = self.inner.counts.borrow().as_ref() {
            return counts.contains_key(element);
        }
        self.value().contains(element)
    }
}

impl<T: Eq + Hash, U: Eq + Hash> Clone for MappedSet<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct InjectiveInner<T: Eq + Hash, U: Eq + Hash> {
    parent: AnyObservableSet<T>,
    transform: Box<dyn Fn(&T) -> U>,
    signal: TransactionalSignal<SetChange<U>>,
    pending: Coalescer<SetChange<U>>,
    upstream: Upstream,
}

impl<T, U> InjectiveInner<T, U>
where
    T: Clone + Eq + Hash + 'static,
    U: Clone + Eq + Hash + 'static,
{
    fn receive(&self, update: &SetUpdate<T>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                let mapped = change.map(|e| (self.transform)(e));
                if mapped.removed().len() != change.removed().len()
                    || mapped.inserted().len() != change.inserted().len()
                {
                    fatal(Violation::NonInjectiveMap);
                }
                self.pending.push(mapped);
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }

    fn mapped_value(&self) -> AHashSet<U> {
        let value = self.parent.value();
        let mapped: AHashSet<U> = value.iter().map(|e| (self.transform)(e)).collect();
        if mapped.len() != value.len() {
            fatal(Violation::NonInjectiveMap);
        }
        mapped
    }
}

/// A set transformed through a function promised to be injective.
///
/// No contributor counts are kept. Collisions inside a single change are
/// always detected; with self-checks enabled the whole set is re-verified
/// at the end of every transaction.
pub struct InjectiveMappedSet<T: Eq + Hash, U: Eq + Hash> {
    inner: Rc<InjectiveInner<T, U>>,
}

impl<T, U> InjectiveMappedSet<T, U>
where
    T: Clone + Eq + Hash + 'static,
    U: Clone + Eq + Hash + 'static,
{
    pub fn new(parent: AnyObservableSet<T>, transform: impl Fn(&T) -> U + 'static) -> Self {
        Self {
            inner: Rc::new(InjectiveInner {
                parent,
                transform: Box::new(transform),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }
}

impl<T, U> Source<SetUpdate<U>> for InjectiveMappedSet<T, U>
where
    T: Clone + Eq + Hash + 'static,
    U: Clone + Eq + Hash + 'static,
{
    fn add_sink(&self, sink: AnySink<SetUpdate<U>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "set.injective_map", "activated");
            let connection = subscribe_weak(&self.inner.parent, &self.inner, |inner, update| {
                inner.receive(update);
                if SELF_CHECKS && matches!(update, Update::EndTransaction) {
                    inner.mapped_value();
                }
            });
            self.inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<SetUpdate<U>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "set.injective_map", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
        }
    }
}

impl<T, U> ObservableSet<U> for InjectiveMappedSet<T, U>
where
    T: Clone + Eq + Hash + 'static,
    U: Clone + Eq + Hash + 'static,
{
    fn value(&self) -> AHashSet<U> {
        self.inner.mapped_value()
    }

    fn count(&self) -> usize {
        self.inner.parent.count()
    }
}

impl<T: Eq + Hash, U: Eq + Hash> Clone for InjectiveMappedSet<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::{ObservableSetExt, SetVariable};
    use crate::source::SourceExt;

    fn shadowed<U: Clone + Eq + Hash + 'static>(
        set: &(impl ObservableSet<U> + Clone),
    ) -> (Rc<RefCell<AHashSet<U>>>, crate::Connection) {
        let shadow = Rc::new(RefCell::new(set.value()));
        let target = Rc::clone(&shadow);
        let c = set.subscribe(move |u: &SetUpdate<U>| {
            if let Update::Change(change) = u {
                ripple_core::Change::apply(change, &mut target.borrow_mut());
            }
        });
        (shadow, c)
    }

    fn set_of(items: &[i32]) -> AHashSet<i32> {
        items.iter().copied().collect()
    }

    #[test]
    fn shared_output_survives_until_last_contributor() {
        let source = SetVariable::new([1, 2, 3, 4]);
        let parity = source.map(|x| x % 2);
        let (shadow, _c) = shadowed(&parity);
        assert_eq!(*shadow.borrow(), set_of(&[0, 1]));
        source.remove(&1);
        assert_eq!(*shadow.borrow(), set_of(&[0, 1]));
        source.remove(&3);
        assert_eq!(*shadow.borrow(), set_of(&[0]));
        source.insert(5);
        assert_eq!(*shadow.borrow(), set_of(&[0, 1]));
        assert_eq!(parity.value(), set_of(&[0, 1]));
    }

    #[test]
    fn flat_map_counts_every_output() {
        let source = SetVariable::new([10, 20]);
        let digits = source.flat_map(|x| vec![x / 10, x % 10]);
        let (shadow, _c) = shadowed(&digits);
        assert_eq!(*shadow.borrow(), set_of(&[0, 1, 2]));
        source.remove(&10);
        assert_eq!(*shadow.borrow(), set_of(&[0, 2]));
    }

    #[test]
    fn injective_map_forwards_changes() {
        let source = SetVariable::new([1, 2]);
        let negated = source.injective_map(|x| -x);
        let (shadow, _c) = shadowed(&negated);
        source.insert(3);
        source.remove(&1);
        assert_eq!(*shadow.borrow(), set_of(&[-2, -3]));
        assert_eq!(negated.count(), 2);
    }

    #[test]
    #[should_panic(expected = "injective")]
    fn injective_collision_is_fatal() {
        let source = SetVariable::new([1, 2]);
        source.injective_map(|x| x / 10).value();
    }
}
