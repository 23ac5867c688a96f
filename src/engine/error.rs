//! Errors surfaced by a running machine.

use crate::builder::ConfigErrors;
use crate::effects::ActionError;
use thiserror::Error;

/// Errors that can occur while creating or driving a machine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MachineError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),

    #[error("Action '{action}' failed while handling '{event}': {source}")]
    ActionFailed {
        action: String,
        event: String,
        #[source]
        source: ActionError,
    },

    #[error("More than {limit} enter redirects while handling '{event}'")]
    RedirectLimit { limit: usize, event: String },

    #[error("Event name '{event}' is reserved for the engine")]
    ReservedEvent { event: String },
}
