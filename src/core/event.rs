//! Event records delivered to conditions and actions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the event used while entering the initial states of a new machine.
pub const INIT_EVENT: &str = "@init";

/// Prefix reserved for events the engine synthesizes (timers, task outcomes).
pub(crate) const INTERNAL_PREFIX: char = '@';

/// An event record: a name plus an arbitrary payload.
///
/// Events are delivered to conditions and actions as the second argument
/// alongside the data payload.
///
/// # Example
///
/// ```rust
/// use statecraft::core::Event;
/// use serde_json::json;
///
/// let event = Event::new("HIGHLIT_EVENT", json!({ "eventName": "CLICKED" }));
/// assert_eq!(event.name, "HIGHLIT_EVENT");
/// assert_eq!(event.payload["eventName"], "CLICKED");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// An event with a `null` payload.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }

    /// Whether the engine synthesized this event rather than a caller.
    pub fn is_internal(&self) -> bool {
        is_internal_name(&self.name)
    }
}

pub(crate) fn is_internal_name(name: &str) -> bool {
    name.starts_with(INTERNAL_PREFIX)
}
