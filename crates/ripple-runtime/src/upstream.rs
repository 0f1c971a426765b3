//! Shared plumbing for derived observables.
//!
//! A derived observable owns its subscriptions to its parents while it is
//! active. [`Upstream`] holds those connections and drops them outside of
//! any borrow, because disconnecting can deliver a goodbye
//! `EndTransaction` straight back into the derived observable.

use std::cell::RefCell;
use std::rc::Rc;

use crate::connection::Connection;
use crate::source::{Source, SourceExt};

#[derive(Default)]
pub(crate) struct Upstream {
    connections: RefCell<Vec<Connection>>,
}

impl Upstream {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, connection: Connection) {
        self.connections.borrow_mut().push(connection);
    }

    pub(crate) fn detach(&self) {
        let connections = std::mem::take(&mut *self.connections.borrow_mut());
        drop(connections);
    }
}

/// Subscribe `inner` to `source` without keeping `inner` alive.
pub(crate) fn subscribe_weak<V, S, I>(
    source: &S,
    inner: &Rc<I>,
    handler: impl Fn(&Rc<I>, &V) + 'static,
) -> Connection
where
    V: 'static,
    S: Source<V> + Clone,
    I: 'static,
{
    let weak = Rc::downgrade(inner);
    source.subscribe(move |value| {
        if let Some(inner) = weak.upgrade() {
            handler(&inner, value);
        }
    })
}
