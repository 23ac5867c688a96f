//! Named function tables and function references.
//!
//! Handlers refer to behavior either by name, looked up in one of the
//! config's tables, or inline. Names keep configs printable while the
//! functions themselves stay out of band. All references are resolved once,
//! when a machine is built.

use crate::builder::ConfigError;
use crate::core::Event;
use crate::effects::error::{ActionError, TaskError};
use crate::effects::outbox::Outbox;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use stillwater::effect::BoxedEffect;

/// Mutates the data payload in response to an event.
pub type ActionFn<D> =
    Arc<dyn Fn(&mut D, &Event, &mut Outbox) -> Result<(), ActionError> + Send + Sync>;

/// Pure guard over the data payload and event.
pub type ConditionFn<D> = Arc<dyn Fn(&D, &Event) -> bool + Send + Sync>;

/// Derived, read-only projection of the data payload.
pub type ValueFn<D> = Arc<dyn Fn(&D) -> Value + Send + Sync>;

/// Starts a long-running task. The effect is run by `Machine::settle`.
pub type AsyncFn<D> =
    Arc<dyn Fn(&D, &Event) -> BoxedEffect<Value, TaskError, ()> + Send + Sync>;

/// Computes a delay for a timed handler from the data payload.
pub type TimeFn<D> = Arc<dyn Fn(&D) -> Duration + Send + Sync>;

/// Wrap an infallible action closure.
pub fn action_fn<D, F>(f: F) -> ActionFn<D>
where
    F: Fn(&mut D, &Event) + Send + Sync + 'static,
{
    Arc::new(move |data, event, _outbox| {
        f(data, event);
        Ok(())
    })
}

/// Wrap an action that may fail or send follow-up events.
pub fn action_with<D, F>(f: F) -> ActionFn<D>
where
    F: Fn(&mut D, &Event, &mut Outbox) -> Result<(), ActionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn condition_fn<D, F>(f: F) -> ConditionFn<D>
where
    F: Fn(&D, &Event) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn value_fn<D, F>(f: F) -> ValueFn<D>
where
    F: Fn(&D) -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn async_fn<D, F>(f: F) -> AsyncFn<D>
where
    F: Fn(&D, &Event) -> BoxedEffect<Value, TaskError, ()> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn time_fn<D, F>(f: F) -> TimeFn<D>
where
    F: Fn(&D) -> Duration + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Which table a name is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    Action,
    Condition,
    Value,
    Async,
    Time,
}

impl fmt::Display for FnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Action => "action",
            Self::Condition => "condition",
            Self::Value => "value",
            Self::Async => "async",
            Self::Time => "time",
        };
        f.write_str(name)
    }
}

/// A reference to a function: by table name, or inline.
#[derive(Clone)]
pub enum FnRef<F> {
    Named(String),
    Inline(F),
}

impl<F> FnRef<F> {
    /// Human-readable label used in logs and errors.
    pub fn label(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Inline(_) => "<inline>",
        }
    }
}

impl<F> fmt::Debug for FnRef<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Inline(_) => f.write_str("Inline(..)"),
        }
    }
}

impl<F> From<&str> for FnRef<F> {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl<F> From<String> for FnRef<F> {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

/// A function resolved for use by the engine, keeping its label.
pub(crate) struct Resolved<F> {
    pub label: String,
    pub func: F,
}

impl<F: Clone> Clone for Resolved<F> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            func: self.func.clone(),
        }
    }
}

/// The `actions`, `conditions`, `values`, `async` and `time` tables of a config.
pub struct Functions<D> {
    pub(crate) actions: IndexMap<String, ActionFn<D>>,
    pub(crate) conditions: IndexMap<String, ConditionFn<D>>,
    pub(crate) values: IndexMap<String, ValueFn<D>>,
    pub(crate) tasks: IndexMap<String, AsyncFn<D>>,
    pub(crate) delays: IndexMap<String, TimeFn<D>>,
}

impl<D> Default for Functions<D> {
    fn default() -> Self {
        Self {
            actions: IndexMap::new(),
            conditions: IndexMap::new(),
            values: IndexMap::new(),
            tasks: IndexMap::new(),
            delays: IndexMap::new(),
        }
    }
}

impl<D> Clone for Functions<D> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
            conditions: self.conditions.clone(),
            values: self.values.clone(),
            tasks: self.tasks.clone(),
            delays: self.delays.clone(),
        }
    }
}

impl<D> Functions<D> {
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn value_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub(crate) fn resolve_action(
        &self,
        reference: &FnRef<ActionFn<D>>,
        state: &str,
    ) -> Result<Resolved<ActionFn<D>>, ConfigError> {
        resolve(&self.actions, reference, FnKind::Action, state)
    }

    pub(crate) fn resolve_condition(
        &self,
        reference: &FnRef<ConditionFn<D>>,
        state: &str,
    ) -> Result<Resolved<ConditionFn<D>>, ConfigError> {
        resolve(&self.conditions, reference, FnKind::Condition, state)
    }

    pub(crate) fn resolve_task(
        &self,
        reference: &FnRef<AsyncFn<D>>,
        state: &str,
    ) -> Result<Resolved<AsyncFn<D>>, ConfigError> {
        resolve(&self.tasks, reference, FnKind::Async, state)
    }

    pub(crate) fn resolve_delay(
        &self,
        reference: &FnRef<TimeFn<D>>,
        state: &str,
    ) -> Result<Resolved<TimeFn<D>>, ConfigError> {
        resolve(&self.delays, reference, FnKind::Time, state)
    }
}

fn resolve<F: Clone>(
    table: &IndexMap<String, F>,
    reference: &FnRef<F>,
    kind: FnKind,
    state: &str,
) -> Result<Resolved<F>, ConfigError> {
    match reference {
        FnRef::Inline(func) => Ok(Resolved {
            label: reference.label().to_string(),
            func: func.clone(),
        }),
        FnRef::Named(name) => table
            .get(name)
            .map(|func| Resolved {
                label: name.clone(),
                func: func.clone(),
            })
            .ok_or_else(|| ConfigError::UnknownFunction {
                kind,
                name: name.clone(),
                state: state.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_reference_resolves_from_table() {
        let mut functions: Functions<u32> = Functions::default();
        functions
            .actions
            .insert("bump".to_string(), action_fn(|n: &mut u32, _| *n += 1));

        let resolved = functions
            .resolve_action(&FnRef::from("bump"), ".root")
            .unwrap();
        let mut data = 1;
        (resolved.func)(&mut data, &Event::named("X"), &mut Outbox::default()).unwrap();

        assert_eq!(resolved.label, "bump");
        assert_eq!(data, 2);
    }

    #[test]
    fn unknown_name_is_configuration_error() {
        let functions: Functions<()> = Functions::default();
        let err = functions
            .resolve_condition(&FnRef::from("isReady"), ".root.idle")
            .err()
            .unwrap();

        assert_eq!(
            err,
            ConfigError::UnknownFunction {
                kind: FnKind::Condition,
                name: "isReady".to_string(),
                state: ".root.idle".to_string(),
            }
        );
    }

    #[test]
    fn inline_reference_bypasses_tables() {
        let functions: Functions<()> = Functions::default();
        let inline = FnRef::Inline(condition_fn(|_: &(), _| true));

        let resolved = functions.resolve_condition(&inline, ".root").unwrap();
        assert_eq!(resolved.label, "<inline>");
        assert!((resolved.func)(&(), &Event::named("X")));
    }
}
