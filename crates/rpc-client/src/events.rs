//! Event decoding and fan-out to observers.
//!
//! An event entry is a JSON sequence `[name]` or `[name, payload]`. Inline
//! events arrive as *serialized* sequences (strings inside `myEvents`);
//! message stream events arrive as sequences directly. Both shapes are
//! accepted. Malformed entries are logged and skipped so one bad entry
//! never costs the rest of its batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mage_domain::error::{Error, Result};
use mage_domain::trace::{EventOrigin, TraceEvent};
use parking_lot::RwLock;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A decoded server event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub payload: Option<Value>,
}

impl Event {
    /// Decode one raw entry.
    ///
    /// Strings are parsed as JSON first. The resulting sequence must hold
    /// exactly one or two elements.
    pub fn decode(raw: &Value) -> Result<Self> {
        let parsed;
        let seq = match raw {
            Value::String(s) => {
                parsed = serde_json::from_str::<Value>(s)
                    .map_err(|e| Error::Decode(format!("unreadable event {s:?}: {e}")))?;
                &parsed
            }
            other => other,
        };

        let items = seq
            .as_array()
            .ok_or_else(|| Error::Decode(format!("event is not a sequence: {seq}")))?;

        match items.as_slice() {
            [name] => Ok(Self {
                name: event_name(name),
                payload: None,
            }),
            [name, payload] => Ok(Self {
                name: event_name(name),
                payload: Some(payload.clone()),
            }),
            _ => Err(Error::Decode(format!(
                "incorrect event arity {}: {seq}",
                items.len()
            ))),
        }
    }
}

fn event_name(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Receives every dispatched event.
///
/// Called synchronously on the dispatching task, so implementations should
/// hand heavy work off (e.g. through a channel) rather than block.
///
/// Closures `Fn(&str, Option<&Value>)` implement this trait.
pub trait EventObserver: Send + Sync {
    fn receive_event(&self, name: &str, payload: Option<&Value>);
}

impl<F> EventObserver for F
where
    F: Fn(&str, Option<&Value>) + Send + Sync,
{
    fn receive_event(&self, name: &str, payload: Option<&Value>) {
        self(name, payload)
    }
}

/// Stable handle for a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered observer registry.
///
/// Registration order is delivery order; the same observer may be added
/// more than once and is then notified once per registration.
#[derive(Default)]
pub struct EventDispatcher {
    observers: RwLock<Vec<(ObserverId, Arc<dyn EventObserver>)>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&self, observer: Arc<dyn EventObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Returns `false` when `id` was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Notify every observer, in registration order.
    pub fn dispatch(&self, name: &str, payload: Option<&Value>) {
        self.dispatch_from(EventOrigin::Local, name, payload);
    }

    /// Decode each entry and dispatch the well-formed ones.
    ///
    /// Returns the number of events dispatched.
    pub fn extract_and_dispatch(&self, entries: &[Value], origin: EventOrigin) -> usize {
        let mut dispatched = 0;
        for raw in entries {
            match Event::decode(raw) {
                Ok(event) => {
                    self.dispatch_from(origin, &event.name, event.payload.as_ref());
                    dispatched += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, ?origin, "skipping malformed event");
                }
            }
        }
        dispatched
    }

    pub(crate) fn dispatch_from(&self, origin: EventOrigin, name: &str, payload: Option<&Value>) {
        // Snapshot so observers may (un)register while being notified.
        let snapshot: Vec<Arc<dyn EventObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();

        for observer in &snapshot {
            observer.receive_event(name, payload);
        }

        TraceEvent::EventDispatched {
            name: name.to_owned(),
            origin,
            observers: snapshot.len(),
        }
        .emit();
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records `(tag, name, payload)` into a shared log.
    fn recorder(
        tag: &'static str,
        log: &Arc<Mutex<Vec<(String, String, Option<Value>)>>>,
    ) -> Arc<dyn EventObserver> {
        let log = Arc::clone(log);
        Arc::new(move |name: &str, payload: Option<&Value>| {
            log.lock()
                .push((tag.to_string(), name.to_string(), payload.cloned()));
        })
    }

    #[test]
    fn decode_serialized_single() {
        let ev = Event::decode(&json!("[\"greet\"]")).unwrap();
        assert_eq!(ev.name, "greet");
        assert!(ev.payload.is_none());
    }

    #[test]
    fn decode_structured_pair() {
        let ev = Event::decode(&json!(["chat", { "text": "hey" }])).unwrap();
        assert_eq!(ev.name, "chat");
        assert_eq!(ev.payload, Some(json!({ "text": "hey" })));
    }

    #[test]
    fn decode_rejects_bad_arity() {
        assert!(Event::decode(&json!([])).is_err());
        assert!(Event::decode(&json!(["a", 1, 2])).is_err());
        assert!(Event::decode(&json!("[\"a\",1,2]")).is_err());
    }

    #[test]
    fn decode_rejects_unreadable_and_non_sequences() {
        assert!(matches!(
            Event::decode(&json!("[\"unterminated")),
            Err(Error::Decode(_))
        ));
        assert!(Event::decode(&json!({ "name": "x" })).is_err());
        assert!(Event::decode(&json!(42)).is_err());
    }

    #[test]
    fn dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let d = EventDispatcher::new();
        d.add_observer(recorder("first", &log));
        d.add_observer(recorder("second", &log));

        d.dispatch("tick", None);

        let log = log.lock();
        let tags: Vec<&str> = log.iter().map(|(t, _, _)| t.as_str()).collect();
        assert_eq!(tags, vec!["first", "second"]);
    }

    #[test]
    fn same_observer_twice_is_notified_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let d = EventDispatcher::new();
        let obs = recorder("dup", &log);
        d.add_observer(Arc::clone(&obs));
        d.add_observer(obs);

        d.dispatch("tick", None);
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn malformed_entries_do_not_stop_the_batch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let d = EventDispatcher::new();
        d.add_observer(recorder("o", &log));

        let entries = vec![
            json!("[\"one\"]"),
            json!("[]"),
            json!("not json"),
            json!("[\"two\",{\"n\":2}]"),
            json!("[\"x\",1,2]"),
            json!(["three"]),
        ];
        let dispatched = d.extract_and_dispatch(&entries, EventOrigin::Inline);

        assert_eq!(dispatched, 3);
        let log = log.lock();
        let names: Vec<&str> = log.iter().map(|(_, n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
        assert_eq!(log[1].2, Some(json!({ "n": 2 })));
    }

    #[test]
    fn inline_entries_accept_arrays_and_skip_other_non_strings() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let d = EventDispatcher::new();
        d.add_observer(recorder("o", &log));

        let entries = vec![
            json!(["structured", { "k": 1 }]),
            json!(7),
            json!({ "name": "obj" }),
            Value::Null,
            json!(true),
            json!("[\"serialized\"]"),
        ];
        let dispatched = d.extract_and_dispatch(&entries, EventOrigin::Inline);

        assert_eq!(dispatched, 2);
        let log = log.lock();
        let names: Vec<&str> = log.iter().map(|(_, n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["structured", "serialized"]);
        assert_eq!(log[0].2, Some(json!({ "k": 1 })));
    }

    #[test]
    fn removed_observer_is_not_notified() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let d = EventDispatcher::new();
        let a = d.add_observer(recorder("a", &log));
        d.add_observer(recorder("b", &log));

        assert!(d.remove_observer(a));
        assert!(!d.remove_observer(a));
        d.dispatch("tick", None);

        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "b");
    }

    #[test]
    fn observer_may_register_during_dispatch() {
        let d = Arc::new(EventDispatcher::new());
        let inner = Arc::clone(&d);
        d.add_observer(Arc::new(move |_: &str, _: Option<&Value>| {
            inner.add_observer(Arc::new(|_: &str, _: Option<&Value>| {}));
        }));

        d.dispatch("grow", None);
        assert_eq!(d.observer_count(), 2);
    }
}
