//! Statecraft: hierarchical, reactive state machines
//!
//! Statecraft builds on Stillwater's "pure core, imperative shell" split.
//! A machine is declared as data: a tree of named states, the events each
//! state handles, and tables of named functions the handlers refer to. The
//! engine resolves events against the active states, runs the chosen
//! handler's actions and transitions, and publishes an immutable snapshot
//! after every accepted event.
//!
//! # Core Concepts
//!
//! - **States** form a tree. Paths are dotted, such as `.root.editor.bold.on`,
//!   and any dotted suffix of a path may be used to refer to a state.
//! - **Events** bubble from the deepest active state up to the root. The
//!   first state that declares the event owns it.
//! - **Handlers** carry guards (`when`, `when_any`, `unless`), actions that
//!   mutate the data payload, and an optional transition target.
//! - **Snapshots** are immutable views delivered to subscribers. A snapshot
//!   is produced only when an event is accepted.
//! - **Timers and async tasks** re-enter the machine as ordinary events.
//!
//! # Example
//!
//! ```rust
//! use statecraft::{create_machine, Config, Handler, StateConfig};
//! use serde_json::{json, Value};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Clone, Default)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! let config = Config::new(Counter::default())
//!     .action("increment", |data: &mut Counter, event| {
//!         data.count += event.payload.as_i64().unwrap_or(1);
//!     })
//!     .condition("belowLimit", |data: &Counter, _| data.count < 10)
//!     .value("doubled", |data: &Counter| json!(data.count * 2))
//!     .initial("active")
//!     .state(
//!         "active",
//!         StateConfig::new()
//!             .on("ADD", Handler::new().act("increment").when("belowLimit"))
//!             .on("PAUSE", Handler::goto("paused")),
//!     )
//!     .state("paused", StateConfig::new().on("RESUME", Handler::goto("active")));
//!
//! let mut machine = create_machine(config).unwrap();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let _subscription = machine.on_update(move |snapshot| {
//!     sink.lock().unwrap().push(snapshot.data().count);
//! });
//!
//! machine.send("ADD", json!(4)).unwrap();
//! machine.send("PAUSE", Value::Null).unwrap();
//! machine.send("ADD", json!(4)).unwrap(); // not handled while paused
//!
//! assert_eq!(*seen.lock().unwrap(), vec![4, 4]);
//! assert!(machine.is_in("paused"));
//! assert_eq!(machine.value("doubled"), Some(json!(8)));
//! ```

pub mod binding;
pub mod builder;
pub mod core;
pub mod effects;
pub mod engine;

// Re-export commonly used types
pub use binding::{Binding, MachineSource};
pub use builder::{Config, ConfigError, Handler, MachineOptions, StateConfig};
pub use core::{Event, HandlerView, StateNode};
pub use effects::{ActionError, Outbox, TaskError};
pub use engine::{create_machine, Machine, MachineError, Snapshot, Subscription};
