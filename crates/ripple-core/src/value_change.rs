//! Old/new delta for scalar values.

use crate::change::Change;

/// The change of a scalar value from `old` to `new`.
///
/// Merging keeps the outermost `old` and the newest `new`; intermediate
/// values are discarded. No equality is assumed on `T`, so a value change is
/// never considered empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChange<T> {
    pub old: T,
    pub new: T,
}

impl<T> ValueChange<T> {
    #[must_use]
    pub const fn new(old: T, new: T) -> Self {
        Self { old, new }
    }

    /// Transform both ends of the change.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> ValueChange<U> {
        ValueChange {
            old: f(&self.old),
            new: f(&self.new),
        }
    }
}

impl<T: PartialEq> ValueChange<T> {
    /// Whether both ends compare equal.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.old == self.new
    }
}

impl<T: Clone + 'static> Change for ValueChange<T> {
    type Value = T;

    fn is_empty(&self) -> bool {
        false
    }

    fn apply(&self, value: &mut T) {
        *value = self.new.clone();
    }

    fn merge(&mut self, next: Self) {
        self.new = next.new;
    }

    fn reversed(&self) -> Self {
        Self {
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}
