#![forbid(unsafe_code)]

//! Core: the change algebra every Ripple observable speaks.
//!
//! A [`Change`] describes how a value moved from one state to the next and
//! obeys three laws: it can be applied, merged with the change that follows
//! it, and reversed. Three concrete shapes cover the whole engine:
//!
//! - [`ValueChange`]: old/new pair for scalar values.
//! - [`ArrayChange`]: ordered, index-addressed edits of a sequence.
//! - [`SetChange`]: disjoint removed/inserted element sets.
//!
//! Changes travel wrapped in [`Update`] frames that bracket them into
//! transactions.
//!
//! Invariant violations are never reported as soft errors. They describe a
//! corrupted change stream, so every fatal path goes through [`fatal`].

pub mod array_change;
pub mod batched;
pub mod change;
pub mod error;
pub mod set_change;
pub mod value_change;

pub use array_change::{ArrayChange, ArrayModification};
pub use batched::BatchedArrayChange;
pub use change::{Change, ElementChange, Update};
pub use error::{Violation, fatal};
pub use set_change::SetChange;
pub use value_change::ValueChange;
