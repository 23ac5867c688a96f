//! Builder for event handlers.

use crate::core::Event;
use crate::effects::{
    action_fn, action_with, condition_fn, ActionError, ActionFn, ConditionFn, FnRef, Outbox,
};

/// An event-triggered rule: guards, actions and an optional target.
///
/// A handler applies when every `when` guard passes, at least one `when_any`
/// guard passes (if any are given) and every `unless` guard fails. Its
/// actions then run in the order they were added, followed by the
/// transition to `to`, if set.
///
/// # Example
///
/// ```rust
/// use statecraft::builder::Handler;
///
/// #[derive(Clone, Default)]
/// struct Data { count: u32 }
///
/// let handler: Handler<Data> = Handler::new()
///     .when("isReady")
///     .unless("isLocked")
///     .act("increment")
///     .act_fn(|data: &mut Data, _| data.count += 1)
///     .to("running");
/// assert_eq!(handler.target(), Some("running"));
/// ```
pub struct Handler<D> {
    pub(crate) actions: Vec<FnRef<ActionFn<D>>>,
    pub(crate) target: Option<String>,
    pub(crate) when: Vec<FnRef<ConditionFn<D>>>,
    pub(crate) when_any: Vec<FnRef<ConditionFn<D>>>,
    pub(crate) unless: Vec<FnRef<ConditionFn<D>>>,
}

impl<D> Clone for Handler<D> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
            target: self.target.clone(),
            when: self.when.clone(),
            when_any: self.when_any.clone(),
            unless: self.unless.clone(),
        }
    }
}

impl<D> Default for Handler<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Handler<D> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            target: None,
            when: Vec::new(),
            when_any: Vec::new(),
            unless: Vec::new(),
        }
    }

    /// A handler that only transitions.
    pub fn goto(target: impl Into<String>) -> Self {
        Self::new().to(target)
    }

    /// Run a named action from the config's `actions` table.
    pub fn act(mut self, name: impl Into<String>) -> Self {
        self.actions.push(FnRef::Named(name.into()));
        self
    }

    /// Run an inline action.
    pub fn act_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut D, &Event) + Send + Sync + 'static,
    {
        self.actions.push(FnRef::Inline(action_fn(f)));
        self
    }

    /// Run an inline action that may fail or send follow-up events.
    pub fn act_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut D, &Event, &mut Outbox) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.actions.push(FnRef::Inline(action_with(f)));
        self
    }

    /// Transition to the state matching `target` (a full or partial dotted path).
    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Require a named condition to pass.
    pub fn when(mut self, name: impl Into<String>) -> Self {
        self.when.push(FnRef::Named(name.into()));
        self
    }

    pub fn when_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&D, &Event) -> bool + Send + Sync + 'static,
    {
        self.when.push(FnRef::Inline(condition_fn(f)));
        self
    }

    /// Require at least one of the `when_any` conditions to pass.
    pub fn when_any(mut self, name: impl Into<String>) -> Self {
        self.when_any.push(FnRef::Named(name.into()));
        self
    }

    pub fn when_any_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&D, &Event) -> bool + Send + Sync + 'static,
    {
        self.when_any.push(FnRef::Inline(condition_fn(f)));
        self
    }

    /// Require a named condition to fail.
    pub fn unless(mut self, name: impl Into<String>) -> Self {
        self.unless.push(FnRef::Named(name.into()));
        self
    }

    pub fn unless_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&D, &Event) -> bool + Send + Sync + 'static,
    {
        self.unless.push(FnRef::Inline(condition_fn(f)));
        self
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Labels of the handler's actions, in execution order.
    pub fn action_labels(&self) -> Vec<&str> {
        self.actions.iter().map(FnRef::label).collect()
    }
}

/// A bare name is shorthand for a handler running that action.
impl<D> From<&str> for Handler<D> {
    fn from(action: &str) -> Self {
        Self::new().act(action)
    }
}

impl<D> From<String> for Handler<D> {
    fn from(action: String) -> Self {
        Self::new().act(action)
    }
}
