//! Builder API for declaring machines.
//!
//! A machine is described by a [`Config`]: the initial data payload, a tree
//! of [`StateConfig`]s with their [`Handler`]s, and the named function tables
//! handlers refer to. Nothing is validated here; [`create_machine`] checks
//! the whole description at once and reports every problem it finds.
//!
//! [`create_machine`]: crate::engine::create_machine

pub mod config;
pub mod error;
pub mod handler;
pub mod state;

pub use config::{Config, MachineOptions};
pub use error::{ConfigError, ConfigErrors};
pub use handler::Handler;
pub use state::{Delay, StateConfig};
