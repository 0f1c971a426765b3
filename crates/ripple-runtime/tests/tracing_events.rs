#![forbid(unsafe_code)]

//! Structured logging emitted by the propagation engine.
//!
//! Validates that:
//! 1. Derived operators log activation and deactivation with their
//!    `operator` field.
//! 2. A fold configured with `DriftPolicy::Warn` logs the drift and
//!    resynchronises instead of aborting.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use ripple_runtime::{
    ArrayVariable, DriftPolicy, ObservableArrayExt, ObservableValue, ReduceConfig, SourceExt,
};
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

// ============================================================================
// Capture layer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Captured {
    level: tracing::Level,
    operator: Option<String>,
    message: String,
}

struct Capture {
    events: Arc<Mutex<Vec<Captured>>>,
}

#[derive(Default)]
struct Fields {
    operator: Option<String>,
    message: String,
}

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "operator" => self.operator = Some(value.to_string()),
            "message" => self.message = value.to_string(),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}").trim_matches('"').to_string();
        }
    }
}

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        self.events.lock().expect("capture lock").push(Captured {
            level: *event.metadata().level(),
            operator: fields.operator,
            message: fields.message,
        });
    }
}

fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<Captured>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        events: Arc::clone(&events),
    });
    let result = tracing::subscriber::with_default(subscriber, f);
    let events = events.lock().expect("capture lock").clone();
    (result, events)
}

fn operator_events(events: &[Captured], operator: &str) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.operator.as_deref() == Some(operator))
        .map(|e| e.message.clone())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn filter_logs_activation_lifecycle() {
    let ((), events) = capture(|| {
        let source = ArrayVariable::new(vec![1, 2, 3]);
        let odd = source.filter(|x| x % 2 == 1);
        let connection = odd.subscribe(|_| {});
        source.push(5);
        drop(connection);
    });

    assert_eq!(
        operator_events(&events, "array.filter"),
        vec!["activated".to_string(), "deactivated".to_string()]
    );
}

#[test]
fn unobserved_operators_stay_quiet() {
    let ((), events) = capture(|| {
        let source = ArrayVariable::new(vec![1, 2, 3]);
        let doubled = source.map(|x| x * 2);
        source.push(4);
        assert_eq!(ripple_runtime::ObservableArray::value(&doubled), vec![2, 4, 6, 8]);
    });

    assert!(operator_events(&events, "array.map").is_empty());
}

#[test]
fn drifting_fold_warns_and_resynchronises() {
    let config = ReduceConfig::checked_every(NonZeroUsize::MIN).with_policy(DriftPolicy::Warn);
    let (total, events) = capture(|| {
        let source = ArrayVariable::new(vec![1, 2, 3]);
        // Removal forgets to subtract, so the fold drifts on the first removal.
        let sum = source.reduce_with(0, |acc, x| acc + x, |acc, _| *acc, config);
        let _connection = sum.subscribe(|_| {});
        source.remove(0);
        sum.value()
    });

    assert_eq!(total, 5);
    let warnings: Vec<&Captured> = events
        .iter()
        .filter(|e| e.level == tracing::Level::WARN)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("fold drifted"));
}
