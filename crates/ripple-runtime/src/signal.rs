#![forbid(unsafe_code)]

//! Fan-out of values to registered sinks.
//!
//! # Design
//!
//! [`Signal<V>`] keeps the registered sinks in registration order and
//! delivers every sent value to each of them synchronously, on the calling
//! stack. The return values of [`add`](Signal::add) and
//! [`remove`](Signal::remove) tell the owner when the first sink arrived and
//! the last one left, which is where derived observables connect to and
//! disconnect from their own parents.
//!
//! # Invariants
//!
//! 1. Sinks receive a given value in registration order.
//! 2. The set of recipients is snapshotted when a value is sent: sinks added
//!    or removed while a delivery pass runs only affect later sends.
//! 3. Reentrant sends are serialised. A value sent from inside a sink is
//!    queued (with its own recipient snapshot) and delivered by the
//!    outermost pass before it returns, so every sink observes one global
//!    order of values.
//!
//! # Failure Modes
//!
//! - **Duplicate registration** and **removal of an unknown sink** are usage
//!   violations and call [`fatal`].
//! - **Sink panics**: the pending queue is dropped and the signal becomes
//!   idle again, so a later send starts a fresh pass.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

use ripple_core::{Violation, fatal};

use crate::sink::AnySink;

struct Delivery<V> {
    targets: Vec<AnySink<V>>,
    value: V,
}

/// A registered set of sinks and the machinery to deliver values to them.
pub struct Signal<V> {
    sinks: RefCell<Vec<AnySink<V>>>,
    queue: RefCell<VecDeque<Delivery<V>>>,
    delivering: Cell<bool>,
}

impl<V: 'static> Default for Signal<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: 'static> Signal<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sinks: RefCell::new(Vec::new()),
            queue: RefCell::new(VecDeque::new()),
            delivering: Cell::new(false),
        }
    }

    /// Whether at least one sink is registered.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.sinks.borrow().is_empty()
    }

    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.borrow().len()
    }

    /// Register `sink`. Returns `true` if it is the first one.
    #[track_caller]
    pub fn add(&self, sink: AnySink<V>) -> bool {
        let first = {
            let mut sinks = self.sinks.borrow_mut();
            if sinks.contains(&sink) {
                None
            } else {
                sinks.push(sink);
                Some(sinks.len() == 1)
            }
        };
        match first {
            Some(first) => {
                if first {
                    tracing::trace!("signal: first sink added");
                }
                first
            }
            None => fatal(Violation::DuplicateSink),
        }
    }

    /// Unregister `sink`. Returns the stored handle and whether it was the
    /// last one.
    #[track_caller]
    pub fn remove(&self, sink: &AnySink<V>) -> (AnySink<V>, bool) {
        let removed = {
            let mut sinks = self.sinks.borrow_mut();
            sinks
                .iter()
                .position(|s| s == sink)
                .map(|index| (sinks.remove(index), sinks.is_empty()))
        };
        match removed {
            Some((removed, last)) => {
                if last {
                    tracing::trace!("signal: last sink removed");
                }
                (removed, last)
            }
            None => fatal(Violation::UnknownSink),
        }
    }

    /// Deliver `value` to every sink registered right now.
    pub fn send(&self, value: V) {
        let targets = self.sinks.borrow().clone();
        self.deliver(Delivery { targets, value });
    }

    /// Deliver `value` to `sink` alone, in order with queued broadcasts.
    pub fn send_to(&self, sink: &AnySink<V>, value: V) {
        self.deliver(Delivery {
            targets: vec![sink.clone()],
            value,
        });
    }

    fn deliver(&self, delivery: Delivery<V>) {
        if delivery.targets.is_empty() {
            return;
        }
        self.queue.borrow_mut().push_back(delivery);
        if self.delivering.replace(true) {
            return;
        }
        let _guard = DeliveryGuard { signal: self };
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(delivery) = next else {
                break;
            };
            for target in &delivery.targets {
                target.receive(&delivery.value);
            }
        }
    }
}

struct DeliveryGuard<'a, V> {
    signal: &'a Signal<V>,
}

impl<V> Drop for DeliveryGuard<'_, V> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.signal.queue.borrow_mut().clear();
        }
        self.signal.delivering.set(false);
    }
}

impl<V> fmt::Debug for Signal<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("sinks", &self.sinks.borrow().len())
            .field("queued", &self.queue.borrow().len())
            .field("delivering", &self.delivering.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn recorder<V: Clone + 'static>(
        tag: &'static str,
        log: &Rc<RefCell<Vec<(&'static str, V)>>>,
    ) -> AnySink<V> {
        let log = Rc::clone(log);
        AnySink::new(move |v: &V| log.borrow_mut().push((tag, v.clone())))
    }

    #[test]
    fn first_and_last_are_reported() {
        let signal = Signal::<i32>::new();
        let a = AnySink::new(|_: &i32| {});
        let b = AnySink::new(|_: &i32| {});
        assert!(signal.add(a.clone()));
        assert!(!signal.add(b.clone()));
        assert!(!signal.remove(&a).1);
        assert!(signal.remove(&b).1);
        assert!(!signal.is_connected());
    }

    #[test]
    fn delivery_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let signal = Signal::new();
        signal.add(recorder("a", &log));
        signal.add(recorder("b", &log));
        signal.send(1);
        assert_eq!(*log.borrow(), vec![("a", 1), ("b", 1)]);
    }

    #[test]
    fn send_without_sinks_is_noop() {
        let signal = Signal::new();
        signal.send(5);
        assert_eq!(signal.sink_count(), 0);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_add_is_fatal() {
        let signal = Signal::<()>::new();
        let sink = AnySink::new(|_: &()| {});
        signal.add(sink.clone());
        signal.add(sink);
    }

    #[test]
    #[should_panic(expected = "never registered")]
    fn unknown_remove_is_fatal() {
        let signal = Signal::<()>::new();
        signal.remove(&AnySink::new(|_: &()| {}));
    }

    #[test]
    fn sink_added_during_delivery_waits_for_next_send() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let signal = Rc::new(Signal::new());
        let late = recorder("late", &log);
        let weak = Rc::downgrade(&signal);
        let added = Rc::new(Cell::new(false));
        let flag = Rc::clone(&added);
        signal.add(AnySink::new(move |_: &i32| {
            if !flag.replace(true) {
                if let Some(signal) = weak.upgrade() {
                    signal.add(late.clone());
                }
            }
        }));
        signal.send(1);
        assert!(log.borrow().is_empty());
        signal.send(2);
        assert_eq!(*log.borrow(), vec![("late", 2)]);
    }

    #[test]
    fn reentrant_sends_are_serialised() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let signal = Rc::new(Signal::new());
        let weak = Rc::downgrade(&signal);
        let first_log = Rc::clone(&log);
        signal.add(AnySink::new(move |v: &i32| {
            first_log.borrow_mut().push(("a", *v));
            if *v == 1 {
                if let Some(signal) = weak.upgrade() {
                    signal.send(2);
                }
            }
        }));
        signal.add(recorder("b", &log));
        signal.send(1);
        assert_eq!(
            *log.borrow(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }

    #[test]
    fn targeted_send_reaches_one_sink() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let signal = Signal::new();
        let a = recorder("a", &log);
        signal.add(a.clone());
        signal.add(recorder("b", &log));
        signal.send_to(&a, 9);
        assert_eq!(*log.borrow(), vec![("a", 9)]);
    }
}
