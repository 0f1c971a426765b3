//! Move detection: the deletions/insertions/moves view of an array change.
//!
//! List and grid diff appliers consume changes as three index sets: rows
//! deleted (old index space), rows inserted (new index space) and rows moved
//! (old index to new index). [`ArrayChange::batched`] triangulates that view
//! by tracking where every original element ends up, then pairing a deleted
//! element with an inserted element of the same value as a move.
//!
//! A value that leaves and comes back at the same index is not reported at
//! all, so replacing an element with an equal one batches to nothing.
//!
//! Pairing is only defined when the moved value is unique on both sides.
//! Duplicate values make the pairing ambiguous and are rejected with
//! [`Violation::AmbiguousMove`] rather than guessed.

use std::hash::Hash;

use ahash::AHashMap;

use crate::array_change::ArrayChange;
use crate::error::{Violation, fatal};

/// Triangulated form of an [`ArrayChange`].
///
/// All index lists are sorted ascending; `moved` is sorted by source index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchedArrayChange {
    /// Indices removed, in the old index space.
    pub deleted: Vec<usize>,
    /// Indices inserted, in the new index space.
    pub inserted: Vec<usize>,
    /// `(from, to)` pairs: old index to new index.
    pub moved: Vec<(usize, usize)>,
}

impl BatchedArrayChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.inserted.is_empty() && self.moved.is_empty()
    }
}

enum Slot<'a, T> {
    Original(usize),
    Inserted(&'a T),
}

impl<T: Clone + Eq + Hash> ArrayChange<T> {
    /// Reclassify the change as deletions, insertions and moves.
    pub fn try_batched(&self) -> Result<BatchedArrayChange, Violation> {
        let mut slots: Vec<Slot<'_, T>> = (0..self.initial_count()).map(Slot::Original).collect();
        let mut deleted: Vec<(usize, &T)> = Vec::new();

        for modification in self.modifications() {
            let at = modification.at();
            let removed = slots.splice(
                at..at + modification.old_len(),
                modification.new_elements().iter().map(Slot::Inserted),
            );
            for (slot, element) in removed.zip(modification.old_elements()) {
                if let Slot::Original(index) = slot {
                    deleted.push((index, element));
                }
            }
        }

        let inserted: Vec<(usize, &T)> = slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Inserted(element) => Some((index, *element)),
                Slot::Original(_) => None,
            })
            .collect();

        let mut deleted_by_value: AHashMap<&T, Vec<usize>> = AHashMap::new();
        for &(index, element) in &deleted {
            deleted_by_value.entry(element).or_default().push(index);
        }
        let mut inserted_by_value: AHashMap<&T, Vec<usize>> = AHashMap::new();
        for &(index, element) in &inserted {
            inserted_by_value.entry(element).or_default().push(index);
        }

        let mut batched = BatchedArrayChange::default();
        for (element, from) in &deleted_by_value {
            let Some(to) = inserted_by_value.get(element) else {
                batched.deleted.extend(from);
                continue;
            };
            if from.len() > 1 || to.len() > 1 {
                return Err(Violation::AmbiguousMove {
                    count: from.len().max(to.len()),
                });
            }
            if from[0] != to[0] {
                batched.moved.push((from[0], to[0]));
            }
        }
        for (element, to) in &inserted_by_value {
            if !deleted_by_value.contains_key(element) {
                batched.inserted.extend(to);
            }
        }

        batched.deleted.sort_unstable();
        batched.inserted.sort_unstable();
        batched.moved.sort_unstable();
        Ok(batched)
    }

    /// Infallible form of [`try_batched`](Self::try_batched).
    #[track_caller]
    #[must_use]
    pub fn batched(&self) -> BatchedArrayChange {
        self.try_batched().unwrap_or_else(|violation| fatal(violation))
    }
}
