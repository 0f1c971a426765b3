//! Tunables for the derived operators.

use std::num::NonZeroUsize;

/// Whether operators run their internal self-verification.
///
/// Always on in debug builds; the `strict` feature keeps it on in release.
pub(crate) const SELF_CHECKS: bool = cfg!(any(debug_assertions, feature = "strict"));

/// What a fold does when its consistency check finds a drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriftPolicy {
    /// Treat the drift as an invariant violation.
    #[default]
    Fatal,
    /// Log a warning and resynchronise to the recomputed value.
    Warn,
}

/// Configuration for `reduce` folds.
///
/// A fold relies on `remove` exactly cancelling `add`. That contract is not
/// checked by default; setting `check_interval` recomputes the fold from
/// scratch after every that-many source transactions and compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReduceConfig {
    pub check_interval: Option<NonZeroUsize>,
    pub on_drift: DriftPolicy,
}

impl ReduceConfig {
    /// Check after every `interval` transactions.
    #[must_use]
    pub fn checked_every(interval: NonZeroUsize) -> Self {
        Self {
            check_interval: Some(interval),
            on_drift: DriftPolicy::Fatal,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, on_drift: DriftPolicy) -> Self {
        self.on_drift = on_drift;
        self
    }
}
