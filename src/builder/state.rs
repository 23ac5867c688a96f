//! Builder for state nodes.

use crate::builder::handler::Handler;
use crate::core::Event;
use crate::effects::{async_fn, time_fn, AsyncFn, FnRef, TaskError, TimeFn};
use indexmap::IndexMap;
use serde_json::Value;
use std::time::Duration;
use stillwater::effect::BoxedEffect;

/// How long a timed handler waits.
pub enum Delay<D> {
    Fixed(Duration),
    Computed(FnRef<TimeFn<D>>),
}

impl<D> Clone for Delay<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(duration) => Self::Fixed(*duration),
            Self::Computed(reference) => Self::Computed(reference.clone()),
        }
    }
}

impl<D> Delay<D> {
    /// A delay computed from the data payload when the state is entered.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&D) -> Duration + Send + Sync + 'static,
    {
        Self::Computed(FnRef::Inline(time_fn(f)))
    }
}

impl<D> From<Duration> for Delay<D> {
    fn from(duration: Duration) -> Self {
        Self::Fixed(duration)
    }
}

/// A name refers to the config's `time` table.
impl<D> From<&str> for Delay<D> {
    fn from(name: &str) -> Self {
        Self::Computed(FnRef::from(name))
    }
}

pub(crate) struct TimerConfig<D> {
    pub delay: Delay<D>,
    pub repeat: bool,
    pub handler: Handler<D>,
}

impl<D> Clone for TimerConfig<D> {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay.clone(),
            repeat: self.repeat,
            handler: self.handler.clone(),
        }
    }
}

/// Declarative description of one state and its subtree.
///
/// # Example
///
/// ```rust
/// use statecraft::builder::{Handler, StateConfig};
/// use std::time::Duration;
///
/// let running: StateConfig<()> = StateConfig::new()
///     .initial("fast")
///     .state("fast", StateConfig::new().on("SLOW_DOWN", Handler::goto("slow")))
///     .state("slow", StateConfig::new())
///     .on("STOP", Handler::goto("idle"))
///     .after(Duration::from_secs(5), Handler::goto("idle"));
/// assert_eq!(running.child_names(), vec!["fast", "slow"]);
/// ```
pub struct StateConfig<D> {
    pub(crate) initial: Option<String>,
    pub(crate) parallel: bool,
    pub(crate) states: Vec<(String, StateConfig<D>)>,
    pub(crate) on: IndexMap<String, Vec<Handler<D>>>,
    pub(crate) on_enter: Vec<Handler<D>>,
    pub(crate) on_exit: Vec<Handler<D>>,
    pub(crate) timers: Vec<TimerConfig<D>>,
    pub(crate) task: Option<FnRef<AsyncFn<D>>>,
    pub(crate) on_resolve: Vec<Handler<D>>,
    pub(crate) on_reject: Vec<Handler<D>>,
}

impl<D> Clone for StateConfig<D> {
    fn clone(&self) -> Self {
        Self {
            initial: self.initial.clone(),
            parallel: self.parallel,
            states: self.states.clone(),
            on: self.on.clone(),
            on_enter: self.on_enter.clone(),
            on_exit: self.on_exit.clone(),
            timers: self.timers.clone(),
            task: self.task.clone(),
            on_resolve: self.on_resolve.clone(),
            on_reject: self.on_reject.clone(),
        }
    }
}

impl<D> Default for StateConfig<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> StateConfig<D> {
    pub fn new() -> Self {
        Self {
            initial: None,
            parallel: false,
            states: Vec::new(),
            on: IndexMap::new(),
            on_enter: Vec::new(),
            on_exit: Vec::new(),
            timers: Vec::new(),
            task: None,
            on_resolve: Vec::new(),
            on_reject: Vec::new(),
        }
    }

    /// Name of the child entered by default.
    ///
    /// Without it, the first declared child is the default.
    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Make all children active together instead of one at a time.
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Declare a child state. Declaration order is preserved.
    pub fn state(mut self, name: impl Into<String>, state: StateConfig<D>) -> Self {
        self.states.push((name.into(), state));
        self
    }

    /// Append a handler for `event`. Handlers are tried in the order added.
    pub fn on(mut self, event: impl Into<String>, handler: impl Into<Handler<D>>) -> Self {
        self.on
            .entry(event.into())
            .or_default()
            .push(handler.into());
        self
    }

    /// Append a handler run when this state is entered.
    pub fn on_enter(mut self, handler: impl Into<Handler<D>>) -> Self {
        self.on_enter.push(handler.into());
        self
    }

    /// Append a handler run when this state is exited. Exit handlers cannot transition.
    pub fn on_exit(mut self, handler: impl Into<Handler<D>>) -> Self {
        self.on_exit.push(handler.into());
        self
    }

    /// Apply `handler` once, `delay` after this state is entered.
    pub fn after(mut self, delay: impl Into<Delay<D>>, handler: impl Into<Handler<D>>) -> Self {
        self.timers.push(TimerConfig {
            delay: delay.into(),
            repeat: false,
            handler: handler.into(),
        });
        self
    }

    /// Apply `handler` every `interval` while this state stays active.
    pub fn every(
        mut self,
        interval: impl Into<Delay<D>>,
        handler: impl Into<Handler<D>>,
    ) -> Self {
        self.timers.push(TimerConfig {
            delay: interval.into(),
            repeat: true,
            handler: handler.into(),
        });
        self
    }

    /// Start a named task from the `async` table whenever this state is entered.
    pub fn await_task(mut self, name: impl Into<String>) -> Self {
        self.task = Some(FnRef::Named(name.into()));
        self
    }

    /// Start an inline task whenever this state is entered.
    pub fn await_task_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&D, &Event) -> BoxedEffect<Value, TaskError, ()> + Send + Sync + 'static,
    {
        self.task = Some(FnRef::Inline(async_fn(f)));
        self
    }

    /// Append a handler for the task's successful outcome.
    ///
    /// The resolved value arrives as the event payload.
    pub fn on_resolve(mut self, handler: impl Into<Handler<D>>) -> Self {
        self.on_resolve.push(handler.into());
        self
    }

    /// Append a handler for the task's failure.
    ///
    /// The error message arrives as a string payload.
    pub fn on_reject(mut self, handler: impl Into<Handler<D>>) -> Self {
        self.on_reject.push(handler.into());
        self
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.states.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.on.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_for_same_event_accumulate_in_order() {
        let state: StateConfig<()> = StateConfig::new()
            .on("HIGHLIT_EVENT", Handler::new().when("a").act("first"))
            .on("HIGHLIT_EVENT", Handler::new().act("second"))
            .on("CLEARED", "clear");

        assert_eq!(state.event_names(), vec!["HIGHLIT_EVENT", "CLEARED"]);
        let handlers = &state.on["HIGHLIT_EVENT"];
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[1].action_labels(), vec!["second"]);
    }

    #[test]
    fn timers_record_repeat_flag() {
        let state: StateConfig<()> = StateConfig::new()
            .after(Duration::from_millis(10), "timeout")
            .every("pollInterval", "poll");

        assert!(!state.timers[0].repeat);
        assert!(state.timers[1].repeat);
        assert!(matches!(state.timers[1].delay, Delay::Computed(FnRef::Named(_))));
    }
}
