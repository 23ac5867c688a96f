//! Binding a machine to a host component.
//!
//! UI frameworks typically re-run their render function many times. A
//! [`Binding`] keeps one machine alive across those runs and only builds a
//! new one when the caller's dependency key changes. While bound, it is
//! subscribed to the machine and holds the latest snapshot for the host to
//! read.
//!
//! # Example
//!
//! ```rust
//! use statecraft::binding::{Binding, MachineSource};
//! use statecraft::builder::{Config, Handler, StateConfig};
//! use serde_json::Value;
//!
//! fn counter(start: u32) -> Config<u32> {
//!     Config::new(start).state(
//!         "counting",
//!         StateConfig::new().on("INC", Handler::new().act_fn(|n: &mut u32, _| *n += 1)),
//!     )
//! }
//!
//! let mut binding: Binding<u32, u32> = Binding::new();
//!
//! let machine = binding.bind(1, || MachineSource::Config(counter(1))).unwrap();
//! machine.send("INC", Value::Null).unwrap();
//! assert_eq!(**binding.current().unwrap().data(), 2);
//!
//! // Same key: the machine and its data survive.
//! binding.bind(1, || MachineSource::Config(counter(1))).unwrap();
//! assert_eq!(**binding.current().unwrap().data(), 2);
//!
//! // New key: a fresh machine replaces the old one.
//! binding.bind(10, || MachineSource::Config(counter(10))).unwrap();
//! assert_eq!(**binding.current().unwrap().data(), 10);
//! ```

use crate::builder::Config;
use crate::engine::{create_machine, Machine, MachineError, Snapshot, Subscription};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Where a bound machine comes from.
pub enum MachineSource<D> {
    /// Build a new machine from this configuration.
    Config(Config<D>),
    /// Adopt an existing machine.
    Machine(Machine<D>),
}

impl<D> From<Config<D>> for MachineSource<D> {
    fn from(config: Config<D>) -> Self {
        Self::Config(config)
    }
}

impl<D> From<Machine<D>> for MachineSource<D> {
    fn from(machine: Machine<D>) -> Self {
        Self::Machine(machine)
    }
}

struct Bound<D, K> {
    deps: K,
    machine: Machine<D>,
    _subscription: Subscription,
}

/// A machine kept alive across re-renders, rebuilt when its key changes.
pub struct Binding<D, K> {
    bound: Option<Bound<D, K>>,
    latest: Arc<Mutex<Option<Snapshot<D>>>>,
}

impl<D, K> Default for Binding<D, K> {
    fn default() -> Self {
        Self {
            bound: None,
            latest: Arc::new(Mutex::new(None)),
        }
    }
}

impl<D, K> Binding<D, K>
where
    D: Clone + Send + Sync + 'static,
    K: PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the bound machine, building a new one if `deps` changed.
    ///
    /// `source` is only called when a new machine is needed. The previous
    /// machine's subscription is cancelled before the new one is created.
    pub fn bind<F>(&mut self, deps: K, source: F) -> Result<&mut Machine<D>, MachineError>
    where
        F: FnOnce() -> MachineSource<D>,
    {
        let bound = match self.bound.take() {
            Some(bound) if bound.deps == deps => bound,
            previous => {
                drop(previous);
                self.store(None);
                let machine = match source() {
                    MachineSource::Config(config) => create_machine(config)?,
                    MachineSource::Machine(machine) => machine,
                };
                debug!(machine = %machine.id(), "binding machine");

                self.store(Some(machine.snapshot().clone()));
                let latest = Arc::clone(&self.latest);
                let subscription = machine.on_update(move |snapshot: &Snapshot<D>| {
                    *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
                });
                Bound {
                    deps,
                    machine,
                    _subscription: subscription,
                }
            }
        };
        Ok(&mut self.bound.insert(bound).machine)
    }

    /// The latest snapshot of the bound machine.
    pub fn current(&self) -> Option<Snapshot<D>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn machine_mut(&mut self) -> Option<&mut Machine<D>> {
        self.bound.as_mut().map(|bound| &mut bound.machine)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Unsubscribe from and release the bound machine, returning it.
    pub fn unbind(&mut self) -> Option<Machine<D>> {
        let bound = self.bound.take()?;
        self.store(None);
        Some(bound.machine)
    }

    fn store(&self, snapshot: Option<Snapshot<D>>) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Handler, StateConfig};
    use serde_json::Value;

    fn toggle(label: &'static str) -> Config<&'static str> {
        Config::new(label)
            .state("off", StateConfig::new().on("TOGGLE", Handler::goto("on")))
            .state("on", StateConfig::new().on("TOGGLE", Handler::goto("off")))
    }

    #[test]
    fn same_deps_reuse_machine() {
        let mut binding: Binding<&str, &str> = Binding::new();
        let first = binding.bind("a", || toggle("first").into()).unwrap().id();
        let mut built = false;
        let second = binding
            .bind("a", || {
                built = true;
                toggle("second").into()
            })
            .unwrap()
            .id();

        assert_eq!(first, second);
        assert!(!built);
    }

    #[test]
    fn changed_deps_rebuild_and_resubscribe() {
        let mut binding: Binding<&str, u32> = Binding::new();
        let old_id = binding.bind(1, || toggle("first").into()).unwrap().id();
        binding.bind(2, || toggle("second").into()).unwrap();

        let machine = binding.machine_mut().unwrap();
        assert_ne!(machine.id(), old_id);
        assert_eq!(machine.subscriber_count(), 1);

        machine.send("TOGGLE", Value::Null).unwrap();
        let current = binding.current().unwrap();
        assert_eq!(**current.data(), "second");
        assert!(current.is_in("on"));
    }

    #[test]
    fn unbind_cancels_subscription() {
        let mut binding: Binding<&str, ()> = Binding::new();
        binding.bind((), || toggle("only").into()).unwrap();

        let mut machine = binding.unbind().unwrap();
        assert_eq!(machine.subscriber_count(), 0);
        assert!(binding.current().is_none());

        machine.send("TOGGLE", Value::Null).unwrap();
        assert!(binding.current().is_none());
        assert!(!binding.is_bound());
    }

    #[test]
    fn adopted_machine_is_used_as_is() {
        let mut machine = create_machine(toggle("adopted")).unwrap();
        machine.send("TOGGLE", Value::Null).unwrap();
        let id = machine.id();

        let mut binding: Binding<&str, u8> = Binding::new();
        let bound = binding.bind(0, || MachineSource::Machine(machine)).unwrap();
        assert_eq!(bound.id(), id);
        assert!(binding.current().unwrap().is_in("on"));
    }

    #[test]
    fn invalid_config_leaves_binding_empty() {
        let mut binding: Binding<(), u8> = Binding::new();
        let result = binding.bind(0, || {
            Config::new(())
                .state("a", StateConfig::new().on("GO", Handler::goto("missing")))
                .into()
        });
        assert!(matches!(result, Err(MachineError::Config(_))));
        assert!(!binding.is_bound());
    }
}
