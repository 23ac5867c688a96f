//! Configuration errors detected while building a machine.

use crate::effects::FnKind;
use std::fmt;
use thiserror::Error;

/// A single problem found in a machine's configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Unknown {kind} '{name}' referenced in state '{state}'")]
    UnknownFunction {
        kind: FnKind,
        name: String,
        state: String,
    },

    #[error("Transition target '{target}' in state '{state}' matches no state")]
    UnknownTarget { target: String, state: String },

    #[error("Initial state '{initial}' is not a child of '{state}'")]
    UnknownInitial { initial: String, state: String },

    #[error("State '{state}' declares an initial child but has no children")]
    InitialWithoutChildren { state: String },

    #[error("Parallel state '{state}' cannot declare an initial child")]
    InitialOnParallel { state: String },

    #[error("Invalid state name '{name}' under '{parent}': names must be non-empty and contain no '.'")]
    InvalidStateName { name: String, parent: String },

    #[error("State '{name}' is declared twice under '{parent}'")]
    DuplicateState { name: String, parent: String },

    #[error("Repeating timer in state '{state}' has a zero interval")]
    ZeroInterval { state: String },

    #[error("Exit handler in state '{state}' cannot transition")]
    ExitTransition { state: String },

    #[error("State '{state}' handles task outcomes but starts no task")]
    OutcomeWithoutTask { state: String },

    #[error("State '{state}' handles '{event}', a name reserved for the engine")]
    ReservedEventName { event: String, state: String },
}

/// Every configuration error found in one validation pass.
#[derive(Debug, Clone, Error, PartialEq)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl ConfigErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ConfigError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} configuration error(s)", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}
