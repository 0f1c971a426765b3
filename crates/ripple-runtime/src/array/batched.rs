//! Per-transaction deletions/insertions/moves delivery.

use std::cell::{Cell, RefCell};
use std::hash::Hash;

use ripple_core::{ArrayChange, BatchedArrayChange, Change, Update};

use crate::sink::Sink;

use super::ArrayUpdate;

/// Collects one transaction's changes and reports them triangulated.
pub(crate) struct BatchingSink<T, F> {
    depth: Cell<usize>,
    pending: RefCell<Option<ArrayChange<T>>>,
    report: F,
}

impl<T, F> BatchingSink<T, F> {
    pub(crate) fn new(report: F) -> Self {
        Self {
            depth: Cell::new(0),
            pending: RefCell::new(None),
            report,
        }
    }
}

impl<T, F> Sink<ArrayUpdate<T>> for BatchingSink<T, F>
where
    T: Clone + Eq + Hash + 'static,
    F: Fn(&BatchedArrayChange) + 'static,
{
    fn receive(&self, update: &ArrayUpdate<T>) {
        match update {
            Update::BeginTransaction => self.depth.set(self.depth.get() + 1),
            Update::Change(change) => {
                let mut pending = self.pending.borrow_mut();
                *pending = Some(match pending.take() {
                    Some(previous) => previous.merged(change.clone()),
                    None => change.clone(),
                });
            }
            Update::EndTransaction => {
                let depth = self.depth.get().saturating_sub(1);
                self.depth.set(depth);
                if depth > 0 {
                    return;
                }
                let pending = self.pending.borrow_mut().take();
                if let Some(change) = pending.filter(|c| !c.is_empty()) {
                    (self.report)(&change.batched());
                }
            }
        }
    }
}
