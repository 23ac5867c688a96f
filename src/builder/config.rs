//! Root configuration of a machine.

use crate::builder::handler::Handler;
use crate::builder::state::StateConfig;
use crate::core::Event;
use crate::effects::{
    action_fn, action_with, async_fn, condition_fn, time_fn, value_fn, ActionError, Functions,
    Outbox, TaskError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use stillwater::effect::BoxedEffect;

/// Runtime limits of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineOptions {
    /// Maximum number of accepted events kept in the machine's history.
    pub history_limit: usize,
    /// Maximum number of `on_enter` redirects followed while resolving one event.
    pub max_redirects: usize,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            history_limit: 64,
            max_redirects: 32,
        }
    }
}

/// Declarative description of a machine.
///
/// Holds the initial data payload, the root of the state tree and the named
/// function tables that handlers refer to.
///
/// # Example
///
/// ```rust
/// use statecraft::builder::{Config, Handler, StateConfig};
///
/// #[derive(Clone, Default)]
/// struct Counter { count: u32 }
///
/// let config = Config::new(Counter::default())
///     .initial("idle")
///     .state("idle", StateConfig::new().on("GO", Handler::goto("running")))
///     .state(
///         "running",
///         StateConfig::new()
///             .on("TICK", "increment")
///             .on("STOP", Handler::goto("idle")),
///     )
///     .action("increment", |data: &mut Counter, _| data.count += 1);
/// assert_eq!(config.root().child_names(), vec!["idle", "running"]);
/// ```
pub struct Config<D> {
    pub(crate) data: D,
    pub(crate) root: StateConfig<D>,
    pub(crate) functions: Functions<D>,
    pub(crate) options: MachineOptions,
}

impl<D: Clone> Clone for Config<D> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            root: self.root.clone(),
            functions: self.functions.clone(),
            options: self.options,
        }
    }
}

impl<D> Config<D> {
    pub fn new(data: D) -> Self {
        Self {
            data,
            root: StateConfig::new(),
            functions: Functions::default(),
            options: MachineOptions::default(),
        }
    }

    /// Replace the whole root state.
    pub fn with_root(mut self, root: StateConfig<D>) -> Self {
        self.root = root;
        self
    }

    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.root = self.root.initial(name);
        self
    }

    pub fn parallel(mut self) -> Self {
        self.root = self.root.parallel();
        self
    }

    pub fn state(mut self, name: impl Into<String>, state: StateConfig<D>) -> Self {
        self.root = self.root.state(name, state);
        self
    }

    /// Root-level handler, checked after every active state.
    pub fn on(mut self, event: impl Into<String>, handler: impl Into<Handler<D>>) -> Self {
        self.root = self.root.on(event, handler);
        self
    }

    pub fn on_enter(mut self, handler: impl Into<Handler<D>>) -> Self {
        self.root = self.root.on_enter(handler);
        self
    }

    pub fn action<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut D, &Event) + Send + Sync + 'static,
    {
        self.functions.actions.insert(name.into(), action_fn(f));
        self
    }

    /// Register an action that may fail or send follow-up events.
    pub fn action_with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut D, &Event, &mut Outbox) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.functions.actions.insert(name.into(), action_with(f));
        self
    }

    pub fn condition<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&D, &Event) -> bool + Send + Sync + 'static,
    {
        self.functions.conditions.insert(name.into(), condition_fn(f));
        self
    }

    /// Register a derived value, readable from every snapshot.
    pub fn value<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&D) -> Value + Send + Sync + 'static,
    {
        self.functions.values.insert(name.into(), value_fn(f));
        self
    }

    pub fn async_task<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&D, &Event) -> BoxedEffect<Value, TaskError, ()> + Send + Sync + 'static,
    {
        self.functions.tasks.insert(name.into(), async_fn(f));
        self
    }

    pub fn time<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&D) -> Duration + Send + Sync + 'static,
    {
        self.functions.delays.insert(name.into(), time_fn(f));
        self
    }

    pub fn options(mut self, options: MachineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn root(&self) -> &StateConfig<D> {
        &self.root
    }

    pub fn functions(&self) -> &Functions<D> {
        &self.functions
    }

    pub fn machine_options(&self) -> MachineOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_level_calls_build_root_state() {
        let config: Config<()> = Config::new(())
            .initial("b")
            .state("a", StateConfig::new())
            .state("b", StateConfig::new())
            .on("PING", "pong")
            .action("pong", |_, _| {});

        assert_eq!(config.root().initial.as_deref(), Some("b"));
        assert_eq!(config.root().event_names(), vec!["PING"]);
        assert_eq!(config.functions().action_names().collect::<Vec<_>>(), vec!["pong"]);
    }

    #[test]
    fn default_options() {
        let options = MachineOptions::default();
        assert_eq!(options.history_limit, 64);
        assert_eq!(options.max_redirects, 32);
    }

    #[test]
    fn config_clone_shares_functions() {
        let config = Config::new(1u8).value("double", |n: &u8| Value::from(*n * 2));
        let cloned = config.clone();
        assert_eq!(cloned.functions().value_names().collect::<Vec<_>>(), vec!["double"]);
        assert_eq!(*cloned.data(), 1);
    }
}
