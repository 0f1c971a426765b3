//! Opt-in re-posting of values onto another execution context.
//!
//! The engine itself always delivers synchronously. [`Dispatched`] wraps a
//! source so each received value is handed to an [`ExecutionQueue`] and
//! delivered to the wrapper's own sinks when that queue runs the job. No
//! ordering or bracketing guarantees beyond the queue's FIFO order apply.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::signal::Signal;
use crate::sink::AnySink;
use crate::source::Source;
use crate::upstream::{Upstream, subscribe_weak};

/// A place to run deferred jobs.
pub trait ExecutionQueue: 'static {
    fn enqueue(&self, job: Box<dyn FnOnce()>);
}

/// A single-threaded FIFO job queue drained by the owner.
#[derive(Clone, Default)]
pub struct LocalQueue {
    jobs: Rc<RefCell<VecDeque<Box<dyn FnOnce()>>>>,
}

impl LocalQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.jobs.borrow().len()
    }

    /// Run queued jobs, including ones queued while running, until empty.
    /// Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.jobs.borrow_mut().pop_front();
            let Some(job) = job else {
                return ran;
            };
            job();
            ran += 1;
        }
    }
}

impl ExecutionQueue for LocalQueue {
    fn enqueue(&self, job: Box<dyn FnOnce()>) {
        self.jobs.borrow_mut().push_back(job);
    }
}

impl fmt::Debug for LocalQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

struct DispatchedInner<V, S, Q> {
    source: S,
    queue: Q,
    signal: Signal<V>,
    upstream: Upstream,
}

/// A source whose values are re-posted through an [`ExecutionQueue`].
pub struct Dispatched<V, S, Q> {
    inner: Rc<DispatchedInner<V, S, Q>>,
}

impl<V, S, Q> Clone for Dispatched<V, S, Q> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V, S, Q> Dispatched<V, S, Q>
where
    V: Clone + 'static,
    S: Source<V> + Clone,
    Q: ExecutionQueue + Clone,
{
    pub fn new(source: S, queue: Q) -> Self {
        Self {
            inner: Rc::new(DispatchedInner {
                source,
                queue,
                signal: Signal::new(),
                upstream: Upstream::new(),
            }),
        }
    }

    fn activate(&self) {
        let inner = &self.inner;
        let connection = subscribe_weak(&inner.source, inner, |inner, value: &V| {
            let weak = Rc::downgrade(inner);
            let value = value.clone();
            inner.queue.enqueue(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.signal.send(value);
                }
            }));
        });
        inner.upstream.attach(connection);
    }
}

impl<V, S, Q> Source<V> for Dispatched<V, S, Q>
where
    V: Clone + 'static,
    S: Source<V> + Clone,
    Q: ExecutionQueue + Clone,
{
    fn add_sink(&self, sink: AnySink<V>) {
        if self.inner.signal.add(sink) {
            self.activate();
        }
    }

    fn remove_sink(&self, sink: &AnySink<V>) {
        if self.inner.signal.remove(sink).1 {
            self.inner.upstream.detach();
        }
    }
}

/// Adds [`dispatched`](DispatchExt::dispatched) to every cloneable source.
pub trait DispatchExt<V: Clone + 'static>: Source<V> + Clone + Sized {
    /// Re-post every value through `queue`.
    fn dispatched<Q: ExecutionQueue + Clone>(&self, queue: Q) -> Dispatched<V, Self, Q> {
        Dispatched::new(self.clone(), queue)
    }
}

impl<V: Clone + 'static, S: Source<V> + Clone> DispatchExt<V> for S {}
