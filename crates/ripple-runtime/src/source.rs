//! The [`Source`] contract: something sinks can be attached to.

use std::fmt;
use std::rc::Rc;

use crate::connection::Connection;
use crate::sink::{AnySink, Sink};

/// A producer of values of type `V`.
///
/// Every observable in the engine is a `Source` of its update frames.
/// Registration follows [`Signal`](crate::Signal) semantics: adding a sink
/// twice or removing an unknown sink is fatal.
pub trait Source<V: 'static>: 'static {
    fn add_sink(&self, sink: AnySink<V>);

    fn remove_sink(&self, sink: &AnySink<V>);
}

/// Closure-based subscription helpers for cloneable source handles.
pub trait SourceExt<V: 'static>: Source<V> + Clone + Sized {
    /// Register `sink` and return the connection that unregisters it.
    fn connect(&self, sink: impl Sink<V>) -> Connection {
        let sink = AnySink::new(sink);
        self.add_sink(sink.clone());
        let source = self.clone();
        Connection::new(move || source.remove_sink(&sink))
    }

    /// Call `f` with every value until the returned connection is dropped.
    fn subscribe(&self, f: impl Fn(&V) + 'static) -> Connection {
        self.connect(f)
    }

    /// Erase the concrete source type.
    fn into_source(self) -> AnySource<V> {
        AnySource::new(self)
    }
}

impl<V: 'static, S: Source<V> + Clone> SourceExt<V> for S {}

/// Type-erased source handle with pointer identity.
pub struct AnySource<V> {
    inner: Rc<dyn Source<V>>,
}

impl<V: 'static> AnySource<V> {
    pub fn new(source: impl Source<V>) -> Self {
        Self {
            inner: Rc::new(source),
        }
    }
}

impl<V: 'static> Source<V> for AnySource<V> {
    fn add_sink(&self, sink: AnySink<V>) {
        self.inner.add_sink(sink);
    }

    fn remove_sink(&self, sink: &AnySink<V>) {
        self.inner.remove_sink(sink);
    }
}

impl<V> Clone for AnySource<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V> PartialEq for AnySource<V> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<V> Eq for AnySource<V> {}

impl<V> std::hash::Hash for AnySource<V> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.inner).cast::<()>().hash(state);
    }
}

impl<V> fmt::Debug for AnySource<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnySource")
            .field(&Rc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}
