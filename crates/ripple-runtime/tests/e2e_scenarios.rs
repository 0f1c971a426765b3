#![forbid(unsafe_code)]

//! End-to-end propagation scenarios.
//!
//! Validates that:
//! 1. A filter + map chain emits one minimal change for an append.
//! 2. A set fold emits one coalesced value change per mutation.
//! 3. A rotation inside one transaction is reported as a single move.
//! 4. A reentrant mutation is delivered inside the running transaction and
//!    leaves the nesting counter balanced.
//! 5. Sinks joining or leaving mid-transaction see balanced brackets.
//! 6. Dispatched delivery waits for the queue to run.
//! 7. A mutation made while `EndTransaction` is being delivered arrives as a
//!    separate transaction, and derived reads stay consistent in between.
//! 8. Sinks turning over on lazy and buffered operators mid-transaction each
//!    receive a change that applies to the value read when they joined.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ripple_core::{ArrayChange, ArrayModification, BatchedArrayChange, Update, ValueChange};
use ripple_runtime::{
    ArrayUpdate, ArrayVariable, Connection, DispatchExt, LocalQueue, ObservableArray,
    ObservableArrayExt, ObservableSetExt, ObservableValue, ObservableValueExt, ReduceConfig,
    SetUpdate, SetVariable, SourceExt, ValueUpdate, Variable,
};

// ============================================================================
// Helpers
// ============================================================================

type Log<V> = Rc<RefCell<Vec<V>>>;

/// Record every frame `source` emits.
fn record<V: Clone + 'static>(source: &impl SourceExt<V>) -> (Log<V>, Connection) {
    let log: Log<V> = Rc::new(RefCell::new(Vec::new()));
    let sink_log = Rc::clone(&log);
    let connection = source.subscribe(move |v: &V| sink_log.borrow_mut().push(v.clone()));
    (log, connection)
}

fn changes<C: Clone>(frames: &[Update<C>]) -> Vec<C> {
    frames.iter().filter_map(|u| u.change().cloned()).collect()
}

/// Whether every `EndTransaction` closes an earlier `BeginTransaction` and
/// nothing is left open.
fn balanced<C>(frames: &[Update<C>]) -> bool {
    let mut depth = 0usize;
    for frame in frames {
        match frame {
            Update::BeginTransaction => depth += 1,
            Update::EndTransaction => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Update::Change(_) => {
                if depth == 0 {
                    return false;
                }
            }
        }
    }
    depth == 0
}

/// Run `mutate` once, the first time `source` delivers `EndTransaction`.
fn on_first_end<V: 'static, S: SourceExt<V> + 'static>(
    source: &S,
    is_end: impl Fn(&V) -> bool + 'static,
    mutate: impl Fn(&S) + 'static,
) -> Connection {
    let fired = Cell::new(false);
    let target = source.clone();
    source.subscribe(move |v: &V| {
        if is_end(v) && !fired.replace(true) {
            mutate(&target);
        }
    })
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn filter_map_chain_appends_one_element() {
    let source = ArrayVariable::new(vec![1, 2, 3, 4, 5]);
    let derived = source.filter(|x| x % 2 == 0).map(|x| x * 10);
    assert_eq!(derived.value(), vec![20, 40]);

    let (log, _c) = record(&derived);
    source.insert(5, 6);

    let frames = log.borrow();
    assert_eq!(
        *frames,
        vec![
            Update::BeginTransaction,
            Update::Change(ArrayChange::with_modification(
                2,
                ArrayModification::Insert { element: 60, at: 2 }
            )),
            Update::EndTransaction,
        ]
    );
    assert_eq!(derived.value(), vec![20, 40, 60]);
}

#[test]
fn set_sum_fold_tracks_membership() {
    let numbers = SetVariable::new([1, 2, 3]);
    let sum = numbers.reduce(0, |acc, x| acc + x, |acc, x| acc - x);
    assert_eq!(sum.value(), 6);

    let (log, _c) = record(&sum);
    numbers.insert(4);
    assert_eq!(sum.value(), 10);
    assert_eq!(changes(&log.borrow()), vec![ValueChange::new(6, 10)]);

    numbers.remove(&1);
    assert_eq!(sum.value(), 9);
    assert_eq!(
        changes(&log.borrow()),
        vec![ValueChange::new(6, 10), ValueChange::new(10, 9)]
    );
}

#[test]
fn rotation_is_reported_as_move() {
    let letters = ArrayVariable::new(vec!['a', 'b', 'c']);
    let batches: Log<BatchedArrayChange> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&batches);
    let _c = letters.subscribe_batched(move |b| sink.borrow_mut().push(b.clone()));

    letters.transaction(|l| {
        let a = l.remove(0);
        l.insert(2, a);
    });

    assert_eq!(letters.value(), vec!['b', 'c', 'a']);
    let batches = batches.borrow();
    assert_eq!(batches.len(), 1);
    assert!(batches[0].deleted.is_empty());
    assert!(batches[0].inserted.is_empty());
    assert_eq!(batches[0].moved, vec![(0, 2)]);
}

#[test]
fn reentrant_update_stays_in_transaction() {
    let counter = Variable::new(0);
    let (log, _c) = record(&counter);

    let feedback = counter.clone();
    let _bump = counter.subscribe(move |u: &ValueUpdate<i32>| {
        if let Update::Change(change) = u {
            if change.new == 1 {
                feedback.set(2);
            }
        }
    });

    counter.set(1);
    assert_eq!(counter.value(), 2);
    {
        let frames = log.borrow();
        assert!(balanced(&frames));
        assert_eq!(
            changes(&frames),
            vec![ValueChange::new(0, 1), ValueChange::new(1, 2)]
        );
        assert_eq!(
            frames
                .iter()
                .filter(|u| matches!(u, Update::BeginTransaction))
                .count(),
            1
        );
    }

    // An unrelated follow-up mutation is bracketed exactly once.
    log.borrow_mut().clear();
    counter.set(5);
    assert_eq!(
        *log.borrow(),
        vec![
            Update::BeginTransaction,
            Update::Change(ValueChange::new(2, 5)),
            Update::EndTransaction,
        ]
    );
}

#[test]
fn late_and_leaving_sinks_see_balanced_brackets() {
    let items = ArrayVariable::new(vec![1]);
    let (early, early_connection) = record(&items);
    let late: Rc<RefCell<Option<(Log<ArrayUpdate<i32>>, Connection)>>> =
        Rc::new(RefCell::new(None));

    let late_slot = Rc::clone(&late);
    let mut early_connection = Some(early_connection);
    items.transaction(|items| {
        items.push(2);
        *late_slot.borrow_mut() = Some(record(items));
        drop(early_connection.take());
        items.push(3);
    });

    let early = early.borrow();
    assert!(balanced(&early));
    assert_eq!(changes(&early).len(), 1);

    let late = late.borrow();
    let (late_log, _late_connection) = late.as_ref().expect("late sink registered");
    let late_frames = late_log.borrow();
    assert!(balanced(&late_frames));
    assert_eq!(changes(&late_frames).len(), 1);
    assert_eq!(late_frames.first(), Some(&Update::BeginTransaction));
}

#[test]
fn derived_count_and_sorted_projection_agree() {
    let names = SetVariable::new(["delta", "alpha"]);
    let sorted = names.sorted();
    let count = names.observable_count();
    let (sorted_log, _s) = record(&sorted);
    let (count_log, _c) = record(&count);

    names.transaction(|n| {
        n.insert("charlie");
        n.insert("bravo");
        n.remove(&"delta");
    });

    let mut shadow = vec!["alpha", "delta"];
    for change in changes(&sorted_log.borrow()) {
        shadow = change.applied(&shadow);
    }
    assert_eq!(shadow, vec!["alpha", "bravo", "charlie"]);
    assert_eq!(sorted.count(), 3);
    assert_eq!(changes(&count_log.borrow()), vec![ValueChange::new(2, 3)]);
}

#[test]
fn dispatched_delivery_runs_with_queue() {
    let queue = LocalQueue::new();
    let items = ArrayVariable::new(Vec::<u8>::new());
    let (log, _c) = record(&items.observable_count().dispatched(queue.clone()));

    items.push(1);
    items.push(2);
    assert!(log.borrow().is_empty());
    queue.run_pending();
    assert_eq!(
        changes(&log.borrow()),
        vec![ValueChange::new(0, 1), ValueChange::new(1, 2)]
    );
}

#[test]
fn end_of_transaction_write_follows_as_own_transaction() {
    let level = Variable::new(1);
    let _m = on_first_end(
        &level,
        |u: &ValueUpdate<i32>| matches!(u, Update::EndTransaction),
        |level| level.set(10),
    );
    let doubled = level.map(|x| x * 2);
    let (log, _c) = record(&doubled);

    level.set(2);
    assert_eq!(
        *log.borrow(),
        vec![
            Update::BeginTransaction,
            Update::Change(ValueChange::new(2, 4)),
            Update::EndTransaction,
            Update::BeginTransaction,
            Update::Change(ValueChange::new(4, 20)),
            Update::EndTransaction,
        ]
    );
    assert_eq!(doubled.value(), 20);
}

#[test]
fn end_of_transaction_clear_keeps_filtered_reads_consistent() {
    let source = ArrayVariable::new(vec![1, 2, 3, 4]);
    let _m = on_first_end(
        &source,
        |u: &ArrayUpdate<i32>| matches!(u, Update::EndTransaction),
        |source| source.set_value(Vec::new()),
    );
    let scaled = source.filter(|x| x % 2 == 0).map(|x| x * 10);

    let shadow = Rc::new(RefCell::new(scaled.value()));
    let reads: Log<(Vec<i32>, usize)> = Rc::new(RefCell::new(Vec::new()));
    let _c = {
        let (reader, shadow, reads) = (scaled.clone(), Rc::clone(&shadow), Rc::clone(&reads));
        scaled.subscribe(move |u: &ArrayUpdate<i32>| match u {
            Update::Change(change) => {
                let next = change.applied(&shadow.borrow());
                *shadow.borrow_mut() = next;
            }
            Update::EndTransaction => {
                reads.borrow_mut().push((reader.value(), reader.count()));
            }
            Update::BeginTransaction => {}
        })
    };

    source.push(6);
    assert_eq!(
        *reads.borrow(),
        vec![(vec![20, 40, 60], 3), (Vec::new(), 0)]
    );
    assert!(shadow.borrow().is_empty());
    assert!(source.value().is_empty());
}

#[test]
fn end_of_transaction_insert_keeps_checked_fold_exact() {
    let numbers = SetVariable::new([1, 2, 3]);
    let _m = on_first_end(
        &numbers,
        |u: &SetUpdate<i32>| matches!(u, Update::EndTransaction),
        |numbers| {
            numbers.insert(100);
        },
    );
    let sum = numbers.reduce_with(
        0,
        |acc, x| acc + x,
        |acc, x| acc - x,
        ReduceConfig::checked_every(std::num::NonZeroUsize::MIN),
    );
    let (log, _c) = record(&sum);

    numbers.insert(4);
    let frames = log.borrow();
    assert!(balanced(&frames));
    assert_eq!(
        changes(&frames),
        vec![ValueChange::new(6, 10), ValueChange::new(10, 110)]
    );
    assert_eq!(sum.value(), 110);
}

#[test]
fn sinks_turn_over_on_lazy_filter_mid_transaction() {
    let source = ArrayVariable::new(vec![1, 2, 3, 4]);
    let evens = source.filter(|x| x % 2 == 0);
    let (first, first_connection) = record(&evens);

    let mut joined_at = Vec::new();
    let mut late = None;
    source.transaction(|source| {
        source.push(6);
        drop(first_connection);
        source.push(8);
        joined_at = evens.value();
        late = Some(record(&evens));
        source.push(10);
    });

    let first = first.borrow();
    assert_eq!(
        *first,
        vec![Update::BeginTransaction, Update::EndTransaction]
    );

    let (late_log, _late_connection) = late.expect("late sink registered");
    let late_frames = late_log.borrow();
    assert!(balanced(&late_frames));
    let late_changes = changes(&late_frames);
    assert_eq!(late_changes.len(), 1);
    assert_eq!(late_changes[0].applied(&joined_at), vec![2, 4, 6, 8, 10]);
    assert_eq!(evens.value(), vec![2, 4, 6, 8, 10]);
}

#[test]
fn sinks_turn_over_on_buffered_operators_mid_transaction() {
    let source = ArrayVariable::new(vec![1, 2]);
    let scaled = source.buffered_map(|x| x * 10);
    let total = Variable::new(0);
    let latest = total.buffered();
    let (first_array, first_array_connection) = record(&scaled);
    let (first_value, first_value_connection) = record(&latest);

    let mut joined_at = Vec::new();
    let mut late = None;
    source.transaction(|source| {
        total.transaction(|total| {
            source.push(3);
            total.set(3);
            drop(first_array_connection);
            drop(first_value_connection);
            source.push(4);
            total.set(4);
            joined_at = scaled.value();
            late = Some((record(&scaled), record(&latest)));
            source.push(5);
            total.set(5);
        });
    });

    assert!(changes(&first_array.borrow()).is_empty());
    assert!(changes(&first_value.borrow()).is_empty());

    let ((array_log, _a), (value_log, _v)) = late.expect("late sinks registered");
    let array_frames = array_log.borrow();
    assert!(balanced(&array_frames));
    let array_changes = changes(&array_frames);
    assert_eq!(array_changes.len(), 1);
    assert_eq!(array_changes[0].applied(&joined_at), vec![10, 20, 30, 40, 50]);

    let value_frames = value_log.borrow();
    assert!(balanced(&value_frames));
    assert_eq!(changes(&value_frames), vec![ValueChange::new(4, 5)]);
    assert_eq!(latest.value(), 5);
}
