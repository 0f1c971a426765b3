#![forbid(unsafe_code)]

//! Property-based invariant tests for derived observables.
//!
//! For arbitrary transaction scripts against a storage array or set:
//!
//! 1. Applying every change a filtered array emits to the previously
//!    observed value yields the filter recomputed from scratch.
//! 2. The same holds for buffered maps and concatenations.
//! 3. Each derived array emits at most one change per transaction, and its
//!    `initial_count` matches the previously observed length.
//! 4. A sorted set projection equals the sorted distinct keys.
//! 5. A maintained fold equals the fold recomputed from scratch.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashSet;
use proptest::prelude::*;
use ripple_core::Update;
use ripple_runtime::{
    ArrayUpdate, ArrayVariable, Connection, ObservableArray, ObservableArrayExt, ObservableSetExt,
    ObservableSet, ObservableValue, SetVariable, SourceExt,
};

// ── Strategies ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Edit {
    Insert(usize, u8),
    Remove(usize),
    Replace(usize, u8),
    Splice(usize, usize, Vec<u8>),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (any::<usize>(), any::<u8>()).prop_map(|(i, v)| Edit::Insert(i, v)),
        any::<usize>().prop_map(Edit::Remove),
        (any::<usize>(), any::<u8>()).prop_map(|(i, v)| Edit::Replace(i, v)),
        (
            any::<usize>(),
            0usize..4,
            proptest::collection::vec(any::<u8>(), 0..4)
        )
            .prop_map(|(i, n, v)| Edit::Splice(i, n, v)),
    ]
}

fn transactions() -> impl Strategy<Value = (Vec<u8>, Vec<Vec<Edit>>)> {
    (
        proptest::collection::vec(any::<u8>(), 0..12),
        proptest::collection::vec(proptest::collection::vec(edit(), 0..5), 0..8),
    )
}

#[derive(Debug, Clone)]
enum SetEdit {
    Insert(u8),
    Remove(u8),
}

fn set_transactions() -> impl Strategy<Value = (Vec<u8>, Vec<Vec<SetEdit>>)> {
    let set_edit = prop_oneof![
        any::<u8>().prop_map(SetEdit::Insert),
        any::<u8>().prop_map(SetEdit::Remove),
    ];
    (
        proptest::collection::vec(any::<u8>(), 0..16),
        proptest::collection::vec(proptest::collection::vec(set_edit, 0..6), 0..8),
    )
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn run_edit(array: &ArrayVariable<u8>, edit: &Edit) {
    let len = array.count();
    match edit {
        Edit::Insert(i, v) => array.insert(i % (len + 1), *v),
        Edit::Remove(i) if len > 0 => {
            array.remove(i % len);
        }
        Edit::Replace(i, v) if len > 0 => {
            array.replace(i % len, *v);
        }
        Edit::Splice(i, n, v) => {
            let start = i % (len + 1);
            let end = (start + n).min(len);
            array.replace_range(start..end, v.clone());
        }
        _ => {}
    }
}

fn run(array: &ArrayVariable<u8>, script: &[Vec<Edit>]) {
    for transaction in script {
        array.transaction(|a| transaction.iter().for_each(|e| run_edit(a, e)));
    }
}

/// Shadow copy of an array maintained purely from its changes, plus the
/// number of changes seen per transaction.
struct Shadow<T> {
    value: Rc<RefCell<Vec<T>>>,
    max_changes_per_transaction: Rc<RefCell<usize>>,
    _connection: Connection,
}

fn shadow<T: Clone + 'static>(array: &(impl ObservableArray<T> + Clone)) -> Shadow<T> {
    let value = Rc::new(RefCell::new(array.value()));
    let max = Rc::new(RefCell::new(0));
    let current = Rc::new(RefCell::new(0));
    let (target, most) = (Rc::clone(&value), Rc::clone(&max));
    let connection = array.subscribe(move |u: &ArrayUpdate<T>| match u {
        Update::BeginTransaction => *current.borrow_mut() = 0,
        Update::Change(change) => {
            assert_eq!(change.initial_count(), target.borrow().len());
            let next = change.applied(&target.borrow());
            *target.borrow_mut() = next;
            *current.borrow_mut() += 1;
        }
        Update::EndTransaction => {
            let seen = *current.borrow();
            let mut most = most.borrow_mut();
            *most = (*most).max(seen);
        }
    });
    Shadow {
        value,
        max_changes_per_transaction: max,
        _connection: connection,
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Arrays
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn filter_shadow_matches_recomputation((initial, script) in transactions()) {
        let source = ArrayVariable::new(initial);
        let evens = source.filter(|x| x % 2 == 0);
        let observed = shadow(&evens);
        run(&source, &script);

        let expected: Vec<u8> = source.value().into_iter().filter(|x| x % 2 == 0).collect();
        prop_assert_eq!(&*observed.value.borrow(), &expected);
        prop_assert_eq!(evens.value(), expected);
        prop_assert!(*observed.max_changes_per_transaction.borrow() <= 1);
    }

    #[test]
    fn buffered_map_shadow_matches_recomputation((initial, script) in transactions()) {
        let source = ArrayVariable::new(initial);
        let widened = source.buffered_map(|x| u16::from(*x) * 3);
        let observed = shadow(&widened);
        run(&source, &script);

        let expected: Vec<u16> = source.value().iter().map(|x| u16::from(*x) * 3).collect();
        prop_assert_eq!(&*observed.value.borrow(), &expected);
        prop_assert_eq!(widened.value(), expected);
    }

    #[test]
    fn concat_shadow_matches_recomputation(
        (first, first_script) in transactions(),
        (second, second_script) in transactions(),
    ) {
        let a = ArrayVariable::new(first);
        let b = ArrayVariable::new(second);
        let both = a.concat(&b);
        let observed = shadow(&both);
        let rounds = first_script.len().max(second_script.len());
        for round in 0..rounds {
            if let Some(t) = first_script.get(round) {
                run(&a, std::slice::from_ref(t));
            }
            if let Some(t) = second_script.get(round) {
                run(&b, std::slice::from_ref(t));
            }
        }

        let mut expected = a.value();
        expected.extend(b.value());
        prop_assert_eq!(&*observed.value.borrow(), &expected);
    }

    #[test]
    fn array_fold_matches_recomputation((initial, script) in transactions()) {
        let source = ArrayVariable::new(initial);
        let sum = source.reduce(0u64, |acc, x| acc + u64::from(*x), |acc, x| acc - u64::from(*x));
        let _c = sum.subscribe(|_| {});
        run(&source, &script);
        prop_assert_eq!(sum.value(), source.value().iter().map(|x| u64::from(*x)).sum::<u64>());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Sets
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn sorted_projection_matches_sorted_keys((initial, script) in set_transactions()) {
        let source = SetVariable::new(initial);
        let tens = source.sort_by_key(|x| x / 10);
        let observed = shadow(&tens);
        for transaction in &script {
            source.transaction(|s| {
                for edit in transaction {
                    match edit {
                        SetEdit::Insert(v) => {
                            s.insert(*v);
                        }
                        SetEdit::Remove(v) => {
                            s.remove(v);
                        }
                    }
                }
            });
        }

        let keys: AHashSet<u8> = source.value().iter().map(|x| x / 10).collect();
        let mut expected: Vec<u8> = keys.into_iter().collect();
        expected.sort_unstable();
        prop_assert_eq!(&*observed.value.borrow(), &expected);
        prop_assert!(*observed.max_changes_per_transaction.borrow() <= 1);
    }

    #[test]
    fn set_map_and_fold_match_recomputation((initial, script) in set_transactions()) {
        let source = SetVariable::new(initial);
        let buckets = source.map(|x| x % 7);
        let total = source.reduce(0u32, |acc, x| acc + u32::from(*x), |acc, x| acc - u32::from(*x));
        let _m = buckets.subscribe(|_| {});
        let _t = total.subscribe(|_| {});
        for transaction in &script {
            source.transaction(|s| {
                for edit in transaction {
                    match edit {
                        SetEdit::Insert(v) => {
                            s.insert(*v);
                        }
                        SetEdit::Remove(v) => {
                            s.remove(v);
                        }
                    }
                }
            });
        }

        let expected: AHashSet<u8> = source.value().iter().map(|x| x % 7).collect();
        prop_assert_eq!(buckets.value(), expected);
        prop_assert_eq!(total.value(), source.value().iter().map(|x| u32::from(*x)).sum::<u32>());
    }
}
