//! Element counts of collections as observable values.

use std::cell::Cell;
use std::rc::Rc;

use ripple_core::{ElementChange, Update, ValueChange, Violation, fatal};

use crate::sink::AnySink;
use crate::source::{AnySource, Source};
use crate::transaction::TransactionalSignal;
use crate::upstream::{Upstream, subscribe_weak};

use super::{Coalescer, ObservableValue, ValueUpdate};

struct CountInner<C> {
    source: AnySource<Update<C>>,
    count: Box<dyn Fn() -> usize>,
    tracked: Cell<usize>,
    signal: TransactionalSignal<ValueChange<usize>>,
    pending: Coalescer<ValueChange<usize>>,
    upstream: Upstream,
}

impl<C: ElementChange> CountInner<C> {
    fn receive(&self, update: &Update<C>) {
        match update {
            Update::BeginTransaction => self.signal.begin(),
            Update::Change(change) => {
                let delta = change.count_delta();
                if delta == 0 {
                    return;
                }
                let old = self.tracked.get();
                let Some(new) = old.checked_add_signed(delta) else {
                    fatal(Violation::CountMismatch {
                        expected: delta.unsigned_abs(),
                        actual: old,
                    })
                };
                self.tracked.set(new);
                self.pending.push(ValueChange::new(old, new));
            }
            Update::EndTransaction => self.pending.end(&self.signal, |_| true),
        }
    }
}

/// The number of elements of a collection.
///
/// While observed, the count is maintained from each change's net size
/// delta instead of being re-read from the collection.
pub struct CountValue<C> {
    inner: Rc<CountInner<C>>,
}

impl<C: ElementChange> CountValue<C> {
    pub fn new(source: AnySource<Update<C>>, count: impl Fn() -> usize + 'static) -> Self {
        Self {
            inner: Rc::new(CountInner {
                source,
                count: Box::new(count),
                tracked: Cell::new(0),
                signal: TransactionalSignal::new(),
                pending: Coalescer::new(),
                upstream: Upstream::new(),
            }),
        }
    }
}

impl<C: ElementChange> Source<ValueUpdate<usize>> for CountValue<C> {
    fn add_sink(&self, sink: AnySink<ValueUpdate<usize>>) {
        if self.inner.signal.add(sink) {
            tracing::debug!(operator = "count", "activated");
            self.inner.tracked.set((self.inner.count)());
            let connection = subscribe_weak(&self.inner.source, &self.inner, |inner, update| {
                inner.receive(update);
            });
            self.inner.upstream.attach(connection);
        }
    }

    fn remove_sink(&self, sink: &AnySink<ValueUpdate<usize>>) {
        if self.inner.signal.remove(sink) {
            tracing::debug!(operator = "count", "deactivated");
            self.inner.upstream.detach();
            self.inner.pending.clear();
        }
    }
}

impl<C: ElementChange> ObservableValue<usize> for CountValue<C> {
    fn value(&self) -> usize {
        if self.inner.signal.is_connected() {
            self.inner.tracked.get()
        } else {
            (self.inner.count)()
        }
    }
}

impl<C> Clone for CountValue<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}
