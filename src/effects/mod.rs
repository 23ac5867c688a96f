//! User-supplied behavior: actions, conditions, values, async tasks and delays.
//!
//! This module is the "imperative shell" around the engine. Everything the
//! engine calls into lives behind the function types defined here.
//!
//! # Key Concepts
//!
//! - **Actions** mutate the data payload in place and may queue follow-up
//!   events through an [`Outbox`]
//! - **Conditions** are pure guards over the payload and the event
//! - **Values** are derived projections, recomputed on every read
//! - **Async tasks** are Stillwater effects; their outcome re-enters the
//!   machine as an ordinary event
//! - **Delays** compute how long a timed handler waits

mod error;
mod functions;
mod outbox;

pub use error::{ActionError, TaskError};
pub(crate) use functions::Resolved;
pub use functions::{
    action_fn, action_with, async_fn, condition_fn, time_fn, value_fn, ActionFn, AsyncFn,
    ConditionFn, FnKind, FnRef, Functions, TimeFn, ValueFn,
};
pub use outbox::Outbox;
