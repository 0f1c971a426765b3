#![forbid(unsafe_code)]

//! Runtime: the Ripple change-propagation engine.
//!
//! This crate turns the change algebra of `ripple-core` into live,
//! composable observables:
//!
//! - [`Signal`]: fan-out of values to registered [`Sink`]s in registration
//!   order, with first/last registration reported to the owner.
//! - [`TransactionalSignal`]: nesting-aware begin/change/end bracketing.
//! - [`Connection`] / [`Connector`]: RAII subscription handles.
//! - [`value`], [`array`], [`set`]: storage observables and the derived
//!   operators over them.
//! - [`gather`]: flattening collections of sources.
//! - [`dispatch`]: opt-in re-posting onto an execution queue.
//!
//! # Architecture
//!
//! Every handle is a cheap clone of an `Rc`, so nothing here is `Send` or
//! `Sync`; one observable graph lives on one thread. Delivery is synchronous
//! and re-entrant sends are serialised by each signal.
//!
//! Derived observables are lazy: they subscribe to their parents when they
//! gain their first sink and drop that subscription with their last one.
//! Operators documented as buffered are the exception and follow their
//! parent for as long as they exist.
//!
//! # Invariants
//!
//! 1. Every sink sees balanced `BeginTransaction`/`EndTransaction` pairs,
//!    including sinks that join or leave mid-transaction.
//! 2. Derived observables emit at most one change per outermost
//!    transaction.
//! 3. A broken invariant is never repaired silently; it ends in
//!    [`ripple_core::fatal`].

pub mod array;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod gather;
pub mod set;
pub mod signal;
pub mod sink;
pub mod source;
pub mod transaction;
mod upstream;
pub mod value;

pub use array::{
    AnyObservableArray, ArrayUpdate, ArrayVariable, ObservableArray, ObservableArrayExt,
};
pub use config::{DriftPolicy, ReduceConfig};
pub use connection::{Connection, Connector};
pub use dispatch::{DispatchExt, Dispatched, ExecutionQueue, LocalQueue};
pub use gather::{GatherArrayExt, GatherSetExt, Gathered};
pub use set::{AnyObservableSet, ObservableSet, ObservableSetExt, SetUpdate, SetVariable};
pub use signal::Signal;
pub use sink::{AnySink, Sink, SinkId};
pub use source::{AnySource, Source, SourceExt};
pub use transaction::TransactionalSignal;
pub use value::{
    AnyObservableValue, Constant, ObservableValue, ObservableValueExt, ValueUpdate, Variable,
};
