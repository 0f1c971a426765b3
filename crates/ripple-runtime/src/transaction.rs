#![forbid(unsafe_code)]

//! Transaction-aware delivery on top of [`Signal`].
//!
//! [`TransactionalSignal<C>`] counts nested `begin`/`end` calls and only
//! lets the outermost pair through, so every sink sees well-bracketed
//! `BeginTransaction, Change*, EndTransaction` sequences no matter how many
//! triggers (or reentrant mutations) contributed to one transaction.
//!
//! # Invariants
//!
//! 1. Only the `0 → 1` depth transition emits `BeginTransaction`; only the
//!    `1 → 0` transition emits `EndTransaction`.
//! 2. A sink registered while a transaction is open receives a synthetic
//!    `BeginTransaction` before any further change.
//! 3. A sink removed while a transaction is open receives a synthetic
//!    `EndTransaction` (its goodbye), so its own nesting count closes.
//! 4. Changes are only sent while the depth is positive.
//!
//! # Failure Modes
//!
//! - **Unbalanced end** and **change outside a transaction** call [`fatal`].

use std::cell::Cell;
use std::fmt;

use ripple_core::{Update, Violation, fatal};

use crate::signal::Signal;
use crate::sink::AnySink;

/// A [`Signal`] of [`Update`] frames with nesting-aware bracketing.
pub struct TransactionalSignal<C> {
    signal: Signal<Update<C>>,
    depth: Cell<usize>,
}

impl<C: 'static> Default for TransactionalSignal<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> TransactionalSignal<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: Signal::new(),
            depth: Cell::new(0),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.signal.is_connected()
    }

    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.depth.get() > 0
    }

    /// Current nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Register `sink`, opening a transaction for it if one is in progress.
    /// Returns `true` if it is the first sink.
    #[track_caller]
    pub fn add(&self, sink: AnySink<Update<C>>) -> bool {
        let first = self.signal.add(sink.clone());
        if self.is_in_transaction() {
            self.signal.send_to(&sink, Update::BeginTransaction);
        }
        first
    }

    /// Unregister `sink`, closing the open transaction for it if any.
    /// Returns `true` if it was the last sink.
    #[track_caller]
    pub fn remove(&self, sink: &AnySink<Update<C>>) -> bool {
        let (removed, last) = self.signal.remove(sink);
        if self.is_in_transaction() {
            self.signal.send_to(&removed, Update::EndTransaction);
        }
        last
    }

    pub fn begin(&self) {
        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        if depth == 1 {
            tracing::trace!("transaction: begin");
            self.signal.send(Update::BeginTransaction);
        }
    }

    #[track_caller]
    pub fn end(&self) {
        let depth = self.depth.get();
        if depth == 0 {
            fatal(Violation::UnbalancedTransaction);
        }
        self.depth.set(depth - 1);
        if depth == 1 {
            tracing::trace!("transaction: end");
            self.signal.send(Update::EndTransaction);
        }
    }

    #[track_caller]
    pub fn send_change(&self, change: C) {
        if !self.is_in_transaction() {
            fatal(Violation::ChangeOutsideTransaction);
        }
        self.signal.send(Update::Change(change));
    }

    /// Send `change` in a transaction of its own (nested if one is open).
    pub fn send_transaction(&self, change: C) {
        self.begin();
        self.send_change(change);
        self.end();
    }

    /// Route an upstream frame through this signal's bracketing.
    pub fn forward(&self, update: Update<C>) {
        match update {
            Update::BeginTransaction => self.begin(),
            Update::Change(change) => self.send_change(change),
            Update::EndTransaction => self.end(),
        }
    }
}

impl<C> fmt::Debug for TransactionalSignal<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalSignal")
            .field("signal", &self.signal)
            .field("depth", &self.depth.get())
            .finish()
    }
}
