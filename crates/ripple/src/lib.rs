#![forbid(unsafe_code)]

//! Ripple public facade crate.
//!
//! Observable values, arrays and sets that push minimal changes to their
//! subscribers inside transaction brackets.
//!
//! ```
//! use ripple::prelude::*;
//!
//! let scores = ArrayVariable::new(vec![3, 8, 5]);
//! let high = scores.filter(|s| *s > 4).map(|s| s * 10);
//! let total = high.reduce(0, |acc, s| acc + s, |acc, s| acc - s);
//! let _connection = total.subscribe(|_| {});
//!
//! scores.push(9);
//! assert_eq!(total.value(), 220);
//! ```

pub use ripple_core as core;
pub use ripple_runtime as runtime;

pub mod prelude {
    pub use ripple_core::{
        ArrayChange, ArrayModification, BatchedArrayChange, Change, ElementChange, SetChange,
        Update, ValueChange,
    };
    pub use ripple_runtime::{
        AnyObservableArray, AnyObservableSet, AnyObservableValue, ArrayUpdate, ArrayVariable,
        Connection, Constant, DispatchExt, DriftPolicy, GatherArrayExt, GatherSetExt,
        ObservableArray, ObservableArrayExt, ObservableSet, ObservableSetExt, ObservableValue,
        ObservableValueExt, ReduceConfig, SetUpdate, SetVariable, Source, SourceExt, ValueUpdate,
        Variable,
    };
}
