//! Core data model of the state machine.
//!
//! This module contains the pieces that carry no behavior of their own:
//! - Event records delivered to conditions and actions
//! - The immutable `StateNode` view of the state tree
//! - Suffix path resolution over that tree
//! - Bounded history of accepted events
//!
//! Everything here is pure; the engine builds on top of it.

mod event;
mod history;
mod node;
pub mod path;

pub use event::{Event, INIT_EVENT};
pub(crate) use event::is_internal_name;
pub use history::{TransitionHistory, TransitionRecord};
pub use node::{HandlerView, StateNode};
pub use path::{find_matches, last_match};
