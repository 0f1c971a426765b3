//! Sinks: the receiving end of a source.
//!
//! A sink's identity is the address of its shared allocation, so the same
//! logical subscriber can be registered and unregistered without a separate
//! token, and sinks whose payload has no structural equality can still be
//! compared.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Anything that can receive values of type `V`.
pub trait Sink<V>: 'static {
    fn receive(&self, value: &V);
}

impl<V, F> Sink<V> for F
where
    F: Fn(&V) + 'static,
{
    fn receive(&self, value: &V) {
        self(value)
    }
}

/// Identity key of an [`AnySink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(usize);

/// A shared, type-erased sink compared by identity.
///
/// Cloning yields a handle to the **same** sink.
pub struct AnySink<V> {
    inner: Rc<dyn Sink<V>>,
}

impl<V: 'static> AnySink<V> {
    pub fn new(sink: impl Sink<V>) -> Self {
        Self {
            inner: Rc::new(sink),
        }
    }

    /// Deliver `value` to the wrapped sink.
    pub fn receive(&self, value: &V) {
        self.inner.receive(value);
    }
}

impl<V> AnySink<V> {
    #[must_use]
    pub fn id(&self) -> SinkId {
        SinkId(Rc::as_ptr(&self.inner).cast::<()>() as usize)
    }
}

impl<V> Clone for AnySink<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V> PartialEq for AnySink<V> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<V> Eq for AnySink<V> {}

impl<V> Hash for AnySink<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl<V> fmt::Debug for AnySink<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnySink").field(&self.id()).finish()
    }
}
