//! The reactive engine: compiled blueprints, transitions and snapshots.
//!
//! A [`Machine`] is created from a [`Config`](crate::builder::Config) by
//! [`create_machine`]. From then on it is driven only by events:
//!
//! - [`Machine::send`] queues an event and drains the queue
//! - [`Machine::advance`] moves the timer clock and fires due timers
//! - [`Machine::settle`] runs started async tasks and feeds their outcomes back
//!
//! Every accepted event commits an immutable [`Snapshot`] and delivers it to
//! the callbacks registered with [`Machine::on_update`].

mod blueprint;
mod error;
mod machine;
mod snapshot;
mod subscription;
mod transition;

pub use blueprint::ROOT_NAME;
pub use error::MachineError;
pub use machine::{create_machine, Machine};
pub use snapshot::{MachineId, Snapshot};
pub use subscription::Subscription;
