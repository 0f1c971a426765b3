//! The [`Change`] contract and the [`Update`] transaction frame.

/// A typed delta from an old state of `Value` to a new one.
///
/// # Laws
///
/// - `a.merged(b).apply(v)` equals `a.apply(v)` followed by `b.apply(v)`.
/// - `c.reversed()` applied after `c` restores the original value.
/// - An empty change leaves every value untouched. `is_empty` may return
///   `false` conservatively when emptiness cannot be decided.
pub trait Change: Clone + 'static {
    /// The value this change transforms.
    type Value;

    /// Whether applying this change is known to be a no-op.
    fn is_empty(&self) -> bool;

    /// Apply the change to `value` in place.
    fn apply(&self, value: &mut Self::Value);

    /// Fold `next`, which must start where `self` ends, into `self`.
    fn merge(&mut self, next: Self);

    /// The change that undoes `self`.
    #[must_use]
    fn reversed(&self) -> Self;

    /// By-value form of [`merge`](Change::merge).
    #[must_use]
    fn merged(mut self, next: Self) -> Self {
        self.merge(next);
        self
    }
}

/// A collection change viewed as elements leaving and joining.
///
/// Folds and counters only need this view; they do not care about indices.
pub trait ElementChange: Change {
    type Element: Clone + 'static;

    /// Visit every element the change removes.
    fn for_each_removed(&self, f: &mut dyn FnMut(&Self::Element));

    /// Visit every element the change inserts.
    fn for_each_inserted(&self, f: &mut dyn FnMut(&Self::Element));

    /// Net change in element count.
    fn count_delta(&self) -> isize;

    /// Visit every element of a whole collection value.
    fn for_each_element(value: &Self::Value, f: &mut dyn FnMut(&Self::Element));
}

/// One frame of a transactional change stream.
///
/// Every mutation is sent as `BeginTransaction`, zero or more `Change`
/// frames, then `EndTransaction`. Empty transactions are legal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<C> {
    BeginTransaction,
    Change(C),
    EndTransaction,
}

impl<C> Update<C> {
    /// Transform the carried change, keeping the framing.
    pub fn map<D>(self, f: impl FnOnce(C) -> D) -> Update<D> {
        match self {
            Self::BeginTransaction => Update::BeginTransaction,
            Self::Change(change) => Update::Change(f(change)),
            Self::EndTransaction => Update::EndTransaction,
        }
    }

    /// The carried change, if this is a `Change` frame.
    #[must_use]
    pub fn change(&self) -> Option<&C> {
        match self {
            Self::Change(change) => Some(change),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Change(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keeps_framing() {
        let begin: Update<i32> = Update::BeginTransaction;
        assert_eq!(begin.map(|c| c * 2), Update::BeginTransaction);
        assert_eq!(Update::Change(4).map(|c| c * 2), Update::Change(8));
        let end: Update<i32> = Update::EndTransaction;
        assert_eq!(end.map(|c| c.to_string()), Update::EndTransaction);
    }

    #[test]
    fn change_accessor() {
        assert_eq!(Update::Change(3).change(), Some(&3));
        assert!(Update::<i32>::EndTransaction.change().is_none());
        assert!(Update::Change(()).is_change());
    }
}
