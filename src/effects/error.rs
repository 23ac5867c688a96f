//! Errors raised by user-supplied actions and async tasks.

use thiserror::Error;

/// Failure reported by an action.
///
/// Returning an error from an action aborts the remaining actions of the
/// handler and its pending transition.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Failure of an async task.
///
/// Never crosses the suspension boundary as an error: the machine turns it
/// into a reject event for the state that started the task.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_errors_convert_to_invalid_payload() {
        let err: ActionError = serde_json::from_str::<u32>("\"x\"").unwrap_err().into();
        assert!(matches!(err, ActionError::InvalidPayload(_)));
    }

    #[test]
    fn task_error_message_becomes_reject_payload_text() {
        assert_eq!(TaskError::failed("offline").to_string(), "Task failed: offline");
    }
}
