// taskpool-common/src/error.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error values surfaced through a `TaskHandle`.
///
/// Every variant here crosses the pool/worker process boundary at least once
/// (as the `Err` arm of a `Results` message), so the type has to stay
/// `Serialize`/`Deserialize` rather than wrapping a foreign error type whose
/// own representation can't make that trip.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskError {
    #[error("task timed out")]
    Timeout,

    #[error("task was cancelled")]
    Cancelled,

    #[error("worker process exited abnormally with code {exit_code}")]
    ProcessExpired { exit_code: i32 },

    #[error("task function raised an error: {message}")]
    UserError { message: String },

    #[error("failed to transport payload or result across the process boundary: {message}")]
    SerializationError { message: String },

    #[error("no task function is registered under id '{0}'")]
    UnknownTaskFn(String),
}

impl TaskError {
    pub fn serialization<E: std::fmt::Display>(err: E) -> Self {
        TaskError::SerializationError {
            message: err.to_string(),
        }
    }

    pub fn user<E: std::fmt::Display>(err: E) -> Self {
        TaskError::UserError {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
