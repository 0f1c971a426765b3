//! Index-addressed changes of ordered sequences.
//!
//! An [`ArrayChange`] is an initial element count plus an ordered list of
//! [`ArrayModification`]s. Modifications are expressed against the
//! *progressively updated* index space: each one already accounts for the
//! index shifts caused by the modifications before it, so they must be
//! applied strictly left to right.
//!
//! # Invariants
//!
//! 1. Applying every modification in order to a sequence of
//!    `initial_count` elements yields exactly `final_count` elements.
//! 2. Every modification's range lies inside the sequence as it stands when
//!    that modification is applied.
//! 3. [`ArrayChange::push`] coalesces a modification with the previous one
//!    when their ranges touch or overlap, so a change never carries two
//!    adjacent edits that could be expressed as one.
//!
//! # Failure Modes
//!
//! - **Out-of-range modification**: `try_push`/`try_new` return
//!   [`Violation::IndexOutOfBounds`]; the infallible forms call [`fatal`].
//! - **Count mismatch**: merging or applying against a sequence of the wrong
//!   length returns [`Violation::CountMismatch`].

use std::slice;

use crate::change::{Change, ElementChange};
use crate::error::{Violation, fatal};

/// One edit of a sequence at a given index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayModification<T> {
    Insert { element: T, at: usize },
    Remove { element: T, at: usize },
    Replace { old: T, at: usize, new: T },
    ReplaceSlice { old: Vec<T>, at: usize, new: Vec<T> },
}

impl<T> ArrayModification<T> {
    /// Build the most specific modification that replaces `old` with `new`
    /// starting at `at`. Returns `None` when both are empty.
    pub fn from_parts(at: usize, mut old: Vec<T>, mut new: Vec<T>) -> Option<Self> {
        match (old.len(), new.len()) {
            (0, 0) => None,
            (0, 1) => new.pop().map(|element| Self::Insert { element, at }),
            (1, 0) => old.pop().map(|element| Self::Remove { element, at }),
            (1, 1) => match (old.pop(), new.pop()) {
                (Some(old), Some(new)) => Some(Self::Replace { old, at, new }),
                _ => None,
            },
            _ => Some(Self::ReplaceSlice { old, at, new }),
        }
    }

    /// Decompose into `(at, old elements, new elements)`.
    pub fn into_parts(self) -> (usize, Vec<T>, Vec<T>) {
        match self {
            Self::Insert { element, at } => (at, Vec::new(), vec![element]),
            Self::Remove { element, at } => (at, vec![element], Vec::new()),
            Self::Replace { old, at, new } => (at, vec![old], vec![new]),
            Self::ReplaceSlice { old, at, new } => (at, old, new),
        }
    }

    /// Index of the first affected element.
    #[must_use]
    pub fn at(&self) -> usize {
        match self {
            Self::Insert { at, .. }
            | Self::Remove { at, .. }
            | Self::Replace { at, .. }
            | Self::ReplaceSlice { at, .. } => *at,
        }
    }

    /// Elements present before the modification, in order.
    #[must_use]
    pub fn old_elements(&self) -> &[T] {
        match self {
            Self::Insert { .. } => &[],
            Self::Remove { element, .. } => slice::from_ref(element),
            Self::Replace { old, .. } => slice::from_ref(old),
            Self::ReplaceSlice { old, .. } => old,
        }
    }

    /// Elements present after the modification, in order.
    #[must_use]
    pub fn new_elements(&self) -> &[T] {
        match self {
            Self::Insert { element, .. } => slice::from_ref(element),
            Self::Remove { .. } => &[],
            Self::Replace { new, .. } => slice::from_ref(new),
            Self::ReplaceSlice { new, .. } => new,
        }
    }

    #[must_use]
    pub fn old_len(&self) -> usize {
        self.old_elements().len()
    }

    #[must_use]
    pub fn new_len(&self) -> usize {
        self.new_elements().len()
    }

    /// Move the modification `by` positions to the right.
    #[must_use]
    pub fn shifted(mut self, by: usize) -> Self {
        match &mut self {
            Self::Insert { at, .. }
            | Self::Remove { at, .. }
            | Self::Replace { at, .. }
            | Self::ReplaceSlice { at, .. } => *at += by,
        }
        self
    }

    /// Transform every element payload, old and new.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> ArrayModification<U> {
        match self {
            Self::Insert { element, at } => ArrayModification::Insert {
                element: f(element),
                at: *at,
            },
            Self::Remove { element, at } => ArrayModification::Remove {
                element: f(element),
                at: *at,
            },
            Self::Replace { old, at, new } => ArrayModification::Replace {
                old: f(old),
                at: *at,
                new: f(new),
            },
            Self::ReplaceSlice { old, at, new } => ArrayModification::ReplaceSlice {
                old: old.iter().map(&mut f).collect(),
                at: *at,
                new: new.iter().map(&mut f).collect(),
            },
        }
    }
}

impl<T: Clone> ArrayModification<T> {
    /// The modification that undoes `self`, in the same index space.
    #[must_use]
    pub fn reversed(&self) -> Self {
        match self {
            Self::Insert { element, at } => Self::Remove {
                element: element.clone(),
                at: *at,
            },
            Self::Remove { element, at } => Self::Insert {
                element: element.clone(),
                at: *at,
            },
            Self::Replace { old, at, new } => Self::Replace {
                old: new.clone(),
                at: *at,
                new: old.clone(),
            },
            Self::ReplaceSlice { old, at, new } => Self::ReplaceSlice {
                old: new.clone(),
                at: *at,
                new: old.clone(),
            },
        }
    }

    /// Apply to `target`, checking the affected range.
    pub fn try_apply(&self, target: &mut Vec<T>) -> Result<(), Violation> {
        let at = self.at();
        let end = at + self.old_len();
        if end > target.len() {
            return Err(Violation::IndexOutOfBounds {
                index: end,
                len: target.len(),
            });
        }
        target.splice(at..end, self.new_elements().iter().cloned());
        Ok(())
    }
}

/// Combine `second` (expressed after `first` was applied) into a single
/// modification. Callers guarantee the two ranges touch or overlap.
fn coalesce<T: Clone>(
    first: ArrayModification<T>,
    second: ArrayModification<T>,
) -> Option<ArrayModification<T>> {
    let (a, a_old, a_new) = first.into_parts();
    let (b, mut b_old, b_new) = second.into_parts();
    let start = a.min(b);
    let a_end = a + a_new.len();
    let b_end = b + b_old.len();
    let end = a_end.max(b_end);

    // Parts of `second`'s old range that lie outside `first`'s new range are
    // untouched original elements.
    let lead = a - start;
    let trail = end - a_end;
    let tail = b_old.split_off(b_old.len() - trail);
    let head: Vec<T> = b_old[..lead].to_vec();

    let mut old = Vec::with_capacity(lead + a_old.len() + trail);
    old.extend(head.iter().cloned());
    old.extend(a_old);
    old.extend(tail.iter().cloned());

    let mut between = head;
    between.extend(a_new);
    between.extend(tail);

    let mut new = Vec::with_capacity(between.len() + b_new.len());
    new.extend(between[..b - start].iter().cloned());
    new.extend(b_new);
    new.extend(between[b_end - start..].iter().cloned());

    ArrayModification::from_parts(start, old, new)
}

/// An ordered batch of modifications taking a sequence of `initial_count`
/// elements to one of `final_count` elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayChange<T> {
    initial_count: usize,
    final_count: usize,
    modifications: Vec<ArrayModification<T>>,
}

impl<T> ArrayChange<T> {
    /// An empty change over a sequence of `initial_count` elements.
    #[must_use]
    pub const fn new(initial_count: usize) -> Self {
        Self {
            initial_count,
            final_count: initial_count,
            modifications: Vec::new(),
        }
    }

    #[must_use]
    pub const fn initial_count(&self) -> usize {
        self.initial_count
    }

    #[must_use]
    pub const fn final_count(&self) -> usize {
        self.final_count
    }

    #[must_use]
    pub fn modifications(&self) -> &[ArrayModification<T>] {
        &self.modifications
    }

    pub fn into_modifications(self) -> Vec<ArrayModification<T>> {
        self.modifications
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// Every element removed by the change, in modification order.
    pub fn removed_elements(&self) -> impl Iterator<Item = &T> {
        self.modifications.iter().flat_map(|m| m.old_elements())
    }

    /// Every element inserted by the change, in modification order.
    pub fn inserted_elements(&self) -> impl Iterator<Item = &T> {
        self.modifications.iter().flat_map(|m| m.new_elements())
    }

    /// Transform every element payload. Counts and indices are unchanged.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> ArrayChange<U> {
        ArrayChange {
            initial_count: self.initial_count,
            final_count: self.final_count,
            modifications: self.modifications.iter().map(|m| m.map(&mut f)).collect(),
        }
    }

    /// Re-express the change inside a larger sequence of `initial_count`
    /// elements where this change's sequence starts at `start`.
    #[must_use]
    pub fn widen(self, start: usize, initial_count: usize) -> Self {
        if start + self.initial_count > initial_count {
            fatal(Violation::IndexOutOfBounds {
                index: start + self.initial_count,
                len: initial_count,
            });
        }
        let final_count = initial_count - self.initial_count + self.final_count;
        Self {
            initial_count,
            final_count,
            modifications: self
                .modifications
                .into_iter()
                .map(|m| m.shifted(start))
                .collect(),
        }
    }
}

impl<T: Clone> ArrayChange<T> {
    /// A change holding a single modification.
    #[must_use]
    pub fn with_modification(initial_count: usize, modification: ArrayModification<T>) -> Self {
        let mut change = Self::new(initial_count);
        change.push(modification);
        change
    }

    /// A change that replaces the whole of `old` with `new`.
    #[must_use]
    pub fn from_replacement(old: Vec<T>, new: Vec<T>) -> Self {
        let mut change = Self::new(old.len());
        if let Some(modification) = ArrayModification::from_parts(0, old, new) {
            change.push(modification);
        }
        change
    }

    /// Build a change from a modification list, validating every range.
    pub fn try_new(
        initial_count: usize,
        modifications: impl IntoIterator<Item = ArrayModification<T>>,
    ) -> Result<Self, Violation> {
        let mut change = Self::new(initial_count);
        for modification in modifications {
            change.try_push(modification)?;
        }
        Ok(change)
    }

    /// Append a modification expressed against the current final state.
    pub fn try_push(&mut self, modification: ArrayModification<T>) -> Result<(), Violation> {
        let end = modification.at() + modification.old_len();
        if end > self.final_count {
            return Err(Violation::IndexOutOfBounds {
                index: end,
                len: self.final_count,
            });
        }
        self.final_count = self.final_count - modification.old_len() + modification.new_len();
        self.append(modification);
        Ok(())
    }

    /// Infallible form of [`try_push`](Self::try_push).
    #[track_caller]
    pub fn push(&mut self, modification: ArrayModification<T>) {
        if let Err(violation) = self.try_push(modification) {
            fatal(violation);
        }
    }

    fn append(&mut self, modification: ArrayModification<T>) {
        let Some(last) = self.modifications.pop() else {
            self.modifications.push(modification);
            return;
        };
        let last_end = last.at() + last.new_len();
        let next_end = modification.at() + modification.old_len();
        if modification.at() > last_end || next_end < last.at() {
            self.modifications.push(last);
            self.modifications.push(modification);
            return;
        }
        if let Some(merged) = coalesce(last, modification) {
            // The merged range may now touch the modification before it.
            self.append(merged);
        }
    }

    /// Append `next`, which must start from this change's final count.
    pub fn try_merge(&mut self, next: Self) -> Result<(), Violation> {
        if next.initial_count != self.final_count {
            return Err(Violation::CountMismatch {
                expected: next.initial_count,
                actual: self.final_count,
            });
        }
        for modification in next.modifications {
            self.try_push(modification)?;
        }
        Ok(())
    }

    /// Apply to `target`, which must hold exactly `initial_count` elements.
    pub fn try_apply(&self, target: &mut Vec<T>) -> Result<(), Violation> {
        if target.len() != self.initial_count {
            return Err(Violation::CountMismatch {
                expected: self.initial_count,
                actual: target.len(),
            });
        }
        for modification in &self.modifications {
            modification.try_apply(target)?;
        }
        debug_assert_eq!(target.len(), self.final_count);
        Ok(())
    }

    /// Apply to a copy of `source` and return the result.
    #[track_caller]
    #[must_use]
    pub fn applied(&self, source: &[T]) -> Vec<T> {
        let mut target = source.to_vec();
        if let Err(violation) = self.try_apply(&mut target) {
            fatal(violation);
        }
        target
    }
}

impl<T: Clone + 'static> Change for ArrayChange<T> {
    type Value = Vec<T>;

    fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    #[track_caller]
    fn apply(&self, value: &mut Vec<T>) {
        if let Err(violation) = self.try_apply(value) {
            fatal(violation);
        }
    }

    #[track_caller]
    fn merge(&mut self, next: Self) {
        if let Err(violation) = self.try_merge(next) {
            fatal(violation);
        }
    }

    fn reversed(&self) -> Self {
        Self {
            initial_count: self.final_count,
            final_count: self.initial_count,
            modifications: self
                .modifications
                .iter()
                .rev()
                .map(ArrayModification::reversed)
                .collect(),
        }
    }
}

impl<T: Clone + 'static> ElementChange for ArrayChange<T> {
    type Element = T;

    fn for_each_removed(&self, f: &mut dyn FnMut(&T)) {
        self.removed_elements().for_each(f);
    }

    fn for_each_inserted(&self, f: &mut dyn FnMut(&T)) {
        self.inserted_elements().for_each(f);
    }

    fn count_delta(&self) -> isize {
        self.final_count as isize - self.initial_count as isize
    }

    fn for_each_element(value: &Vec<T>, f: &mut dyn FnMut(&T)) {
        value.iter().for_each(f);
    }
}
