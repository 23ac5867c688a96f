//! Deferred sends issued from inside actions.

use crate::core::Event;
use serde_json::Value;
use tracing::warn;

/// Events sent by actions while an event is being resolved.
///
/// Actions never dispatch directly: whatever they send here is appended to
/// the machine's queue once the current event commits, in the order sent.
/// Names starting with `@` belong to the engine and are dropped.
///
/// # Example
///
/// ```rust
/// use statecraft::effects::Outbox;
/// use serde_json::json;
///
/// let mut outbox = Outbox::default();
/// outbox.send("SAVED", json!({ "id": 7 }));
/// outbox.signal("DONE");
/// assert_eq!(outbox.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<Event>,
}

impl Outbox {
    pub fn send(&mut self, name: impl Into<String>, payload: Value) {
        let event = Event::new(name, payload);
        if event.is_internal() {
            warn!(event = %event.name, "dropping send of reserved event name");
            return;
        }
        self.events.push(event);
    }

    /// Send an event with a `null` payload.
    pub fn signal(&mut self, name: impl Into<String>) {
        self.send(name, Value::Null);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }
}
