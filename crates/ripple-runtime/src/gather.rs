//! Flattening collections of sources into one source.
//!
//! A gathered source forwards every value emitted by any source currently
//! contained in its parent collection. Membership is tracked with counts,
//! so a source that appears several times in an array is attached once and
//! detached when its last occurrence leaves.
//!
//! # Invariants
//!
//! 1. While observed, the forwarding sink is registered with exactly the
//!    sources present in the parent.
//! 2. A source removed from the parent stops propagating immediately; a
//!    source added is attached before the parent's change returns.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use ripple_core::{ArrayChange, ElementChange, SetChange, Update};

use crate::array::ObservableArray;
use crate::set::ObservableSet;
use crate::signal::Signal;
use crate::sink::AnySink;
use crate::source::{AnySource, Source, SourceExt};
use crate::upstream::{Upstream, subscribe_weak};

struct GatheredInner<V, C: ElementChange> {
    parent: AnySource<Update<C>>,
    snapshot: Box<dyn Fn() -> Vec<C::Element>>,
    members: RefCell<AHashMap<C::Element, usize>>,
    forwarder: AnySink<V>,
    signal: Signal<V>,
    upstream: Upstream,
}

impl<V, C> GatheredInner<V, C>
where
    V: Clone + 'static,
    C: ElementChange,
    C::Element: Source<V> + Eq + Hash,
{
    fn receive(&self, update: &Update<C>) {
        let Update::Change(change) = update else {
            return;
        };
        let mut detached = Vec::new();
        let mut attached = Vec::new();
        {
            let mut members = self.members.borrow_mut();
            change.for_each_removed(&mut |source: &C::Element| {
                if let Some(count) = members.get_mut(source) {
                    *count -= 1;
                    if *count == 0 {
                        members.remove(source);
                        detached.push(source.clone());
                    }
                }
            });
            change.for_each_inserted(&mut |source: &C::Element| {
                let count = members.entry(source.clone()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    attached.push(source.clone());
                }
            });
        }
        if !detached.is_empty() || !attached.is_empty() {
            tracing::debug!(
                detached = detached.len(),
                attached = attached.len(),
                "gather membership changed"
            );
        }
        for source in &detached {
            source.remove_sink(&self.forwarder);
        }
        for source in &attached {
            source.add_sink(self.forwarder.clone());
        }
    }

    fn activate(self: &Rc<Self>) {
        tracing::debug!(operator = "gather", "activated");
        let mut members: AHashMap<C::Element, usize> = AHashMap::new();
        for source in (self.snapshot)() {
            *members.entry(source).or_insert(0) += 1;
        }
        let sources: Vec<C::Element> = members.keys().cloned().collect();
        self.members.replace(members);
        for source in &sources {
            source.add_sink(self.forwarder.clone());
        }
        let connection = subscribe_weak(&self.parent, self, |inner, update| inner.receive(update));
        self.upstream.attach(connection);
    }

    fn deactivate(&self) {
        tracing::debug!(operator = "gather", "deactivated");
        self.upstream.detach();
        let members = std::mem::take(&mut *self.members.borrow_mut());
        for source in members.keys() {
            source.remove_sink(&self.forwarder);
        }
    }
}

/// Every value of every source in a collection, as one source.
pub struct Gathered<V, C: ElementChange> {
    inner: Rc<GatheredInner<V, C>>,
}

impl<V, C> Gathered<V, C>
where
    V: Clone + 'static,
    C: ElementChange,
    C::Element: Source<V> + Eq + Hash,
{
    pub fn new(
        parent: AnySource<Update<C>>,
        snapshot: impl Fn() -> Vec<C::Element> + 'static,
    ) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<GatheredInner<V, C>>| {
            let weak = weak.clone();
            GatheredInner {
                parent,
                snapshot: Box::new(snapshot),
                members: RefCell::new(AHashMap::new()),
                forwarder: AnySink::new(move |value: &V| {
                    if let Some(inner) = weak.upgrade() {
                        inner.signal.send(value.clone());
                    }
                }),
                signal: Signal::new(),
                upstream: Upstream::new(),
            }
        });
        Self { inner }
    }
}

impl<V, C> Source<V> for Gathered<V, C>
where
    V: Clone + 'static,
    C: ElementChange,
    C::Element: Source<V> + Eq + Hash,
{
    fn add_sink(&self, sink: AnySink<V>) {
        if self.inner.signal.add(sink) {
            self.inner.activate();
        }
    }

    fn remove_sink(&self, sink: &AnySink<V>) {
        if self.inner.signal.remove(sink).1 {
            self.inner.deactivate();
        }
    }
}

impl<V, C: ElementChange> Clone for Gathered<V, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// `gather` for sets of sources.
pub trait GatherSetExt<S>: ObservableSet<S> + Clone + Sized
where
    S: Clone + Eq + Hash + 'static,
{
    fn gather<V>(&self) -> Gathered<V, SetChange<S>>
    where
        V: Clone + 'static,
        S: Source<V>,
    {
        let set = self.clone();
        Gathered::new(self.clone().into_source(), move || {
            set.value().into_iter().collect()
        })
    }
}

impl<S: Clone + Eq + Hash + 'static, O: ObservableSet<S> + Clone> GatherSetExt<S> for O {}

/// `gather` for arrays of sources.
pub trait GatherArrayExt<S>: ObservableArray<S> + Clone + Sized
where
    S: Clone + Eq + Hash + 'static,
{
    fn gather<V>(&self) -> Gathered<V, ArrayChange<S>>
    where
        V: Clone + 'static,
        S: Source<V>,
    {
        let array = self.clone();
        Gathered::new(self.clone().into_source(), move || array.value())
    }
}

impl<S: Clone + Eq + Hash + 'static, O: ObservableArray<S> + Clone> GatherArrayExt<S> for O {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayVariable;
    use crate::set::SetVariable;
    use crate::value::{ValueUpdate, Variable};

    fn changes(log: &Rc<RefCell<Vec<i32>>>) -> impl Fn(&ValueUpdate<i32>) + 'static {
        let log = Rc::clone(log);
        move |u: &ValueUpdate<i32>| {
            if let Update::Change(c) = u {
                log.borrow_mut().push(c.new);
            }
        }
    }

    #[test]
    fn set_gather_follows_membership() {
        let a = Variable::new(0);
        let b = Variable::new(0);
        let sources = SetVariable::new([a.clone()]);
        let gathered = GatherSetExt::gather::<ValueUpdate<i32>>(&sources);
        let log = Rc::new(RefCell::new(Vec::new()));
        let _c = gathered.subscribe(changes(&log));

        a.set(1);
        b.set(2);
        sources.insert(b.clone());
        b.set(3);
        sources.remove(&a);
        a.set(4);
        assert_eq!(*log.borrow(), vec![1, 3]);
    }

    #[test]
    fn array_gather_counts_duplicates() {
        let a = Variable::new(0);
        let sources = ArrayVariable::new(vec![a.clone(), a.clone()]);
        let gathered = GatherArrayExt::gather::<ValueUpdate<i32>>(&sources);
        let log = Rc::new(RefCell::new(Vec::new()));
        let _c = gathered.subscribe(changes(&log));

        a.set(1);
        sources.remove(0);
        a.set(2);
        sources.remove(0);
        a.set(3);
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn dropping_subscription_detaches_inner_sources() {
        let a = Variable::new(0);
        let sources = SetVariable::new([a.clone()]);
        let gathered = GatherSetExt::gather::<ValueUpdate<i32>>(&sources);
        let log = Rc::new(RefCell::new(Vec::new()));
        drop(gathered.subscribe(changes(&log)));
        a.set(1);
        assert!(log.borrow().is_empty());
    }
}
