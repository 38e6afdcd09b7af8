//! Structured logging emitted while refreshing bindings.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use pathbind::prelude::*;
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

// =============================================================================
// Capture layer
// =============================================================================

#[derive(Default, Clone)]
struct Captured {
    spans: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl Captured {
    fn spans(&self) -> Vec<String> {
        self.spans.lock().unwrap().clone()
    }

    fn events_at(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, target)| target.clone())
            .collect()
    }
}

impl<S> Layer<S> for Captured
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        self.spans
            .lock()
            .unwrap()
            .push(attrs.metadata().name().to_string());
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        self.events
            .lock()
            .unwrap()
            .push((*meta.level(), meta.target().to_string()));
    }
}

fn capture<R>(f: impl FnOnce() -> R) -> (Captured, R) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry().with(captured.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (captured, result)
}

// =============================================================================
// Fixtures
// =============================================================================

/// Host that fires names it does not expose.
struct SparseHost {
    subject: ObservableSubject,
}

impl Bindable for SparseHost {
    fn shape(&self) -> TypeShape {
        TypeShape::builder::<Self>()
            .getter("getPresent", ValueType::Int, |_| Value::Int(1))
            .build()
    }

    fn subject(&self) -> Option<&ObservableSubject> {
        Some(&self.subject)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn refresh_runs_inside_binding_span() {
    let model = ObservableMap::new();
    let inventory = BindingInventory::new();
    inventory.set_context_object(Value::Map(model.clone()));
    inventory
        .track_element(CallbackElement::new("Title", |_| {}))
        .unwrap();

    let (captured, ()) = capture(|| {
        model.insert("Title", Value::from("x"));
    });

    assert!(captured.spans().iter().any(|name| name == "binding_refresh"));
    assert!(captured.events_at(Level::ERROR).is_empty());
}

#[test]
fn missing_member_logs_error_and_skips_element() {
    let host = Arc::new(SparseHost {
        subject: ObservableSubject::new(),
    });
    let inventory = BindingInventory::new();
    inventory.set_context_object(Value::Object(host.clone()));
    let hits = Arc::new(Mutex::new(0_usize));
    let h = Arc::clone(&hits);
    inventory
        .track_element(CallbackElement::new("Missing", move |_| {
            *h.lock().unwrap() += 1;
        }))
        .unwrap();

    let (captured, ()) = capture(|| host.subject.notify("Missing"));

    assert_eq!(*hits.lock().unwrap(), 0);
    assert_eq!(captured.events_at(Level::ERROR), vec!["pathbind::inventory"]);
}

#[test]
fn dropped_writes_log_at_debug() {
    let host = Arc::new(SparseHost {
        subject: ObservableSubject::new(),
    });
    let inventory = BindingInventory::new();
    inventory.set_context_object(Value::Object(host));

    let (captured, written) = capture(|| inventory.send_update("Present", Value::Int(5)));

    assert_eq!(written, Ok(false));
    assert!(
        captured
            .events_at(Level::DEBUG)
            .iter()
            .any(|target| target == "pathbind::inventory")
    );
}

#[test]
fn malformed_path_is_rejected_at_track_time() {
    let inventory = BindingInventory::new();
    let (captured, result) = capture(|| {
        inventory.track_element(CallbackElement::new("Items@[", |_| {}))
    });
    assert!(matches!(result, Err(BindError::InvalidPath { .. })));
    assert!(inventory.is_empty());
    assert!(captured.events_at(Level::ERROR).is_empty());
}
