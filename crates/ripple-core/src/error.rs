//! Invariant violations and the fatal hook.
//!
//! The engine has no recoverable error channel: a violated invariant means a
//! change stream is already corrupt and every downstream cache would drift if
//! delivery continued. [`Violation`] names each failure so adapters calling
//! the fallible `try_*` entry points can inspect it, and [`fatal`] is the
//! single place where the engine gives up.

use thiserror::Error;

/// Every way the change-propagation contract can be broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("change expects {expected} elements but the target holds {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("transaction ended without a matching begin")]
    UnbalancedTransaction,

    #[error("change sent outside of a transaction")]
    ChangeOutsideTransaction,

    #[error("sink is already registered with this signal")]
    DuplicateSink,

    #[error("sink was never registered with this signal")]
    UnknownSink,

    #[error("injective map produced the same output for two inputs")]
    NonInjectiveMap,

    #[error("move detection is ambiguous: a moved element value occurs {count} times")]
    AmbiguousMove { count: usize },

    #[error("fold drifted from its recomputed value: {detail}")]
    FoldDrift { detail: String },

    #[error("element is not present in the multiset")]
    MissingElement,

    #[error("filter index map is not strictly increasing at position {position}")]
    UnorderedIndexMap { position: usize },
}

/// Abort on an invariant violation.
///
/// Logs at `ERROR` and panics with the violation's message.
#[cold]
#[track_caller]
pub fn fatal(violation: Violation) -> ! {
    tracing::error!(%violation, "ripple invariant violated");
    panic!("{violation}");
}
