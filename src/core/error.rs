//! Error types for pool operations and task outcomes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::serde::TaskId;

/// Errors returned by [`WorkerPool`](crate::core::WorkerPool) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool has been terminated and accepts no more work.
    #[error("pool has been terminated")]
    Terminated,
    /// `abort` was called with an identity that is neither queued nor running.
    #[error("task {0} was not found")]
    TaskNotFound(TaskId),
    /// No handler is registered under the requested name.
    #[error("no handler registered under `{0}`")]
    UnknownHandler(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Workers could not be brought online.
    #[error("worker {worker} failed: {message}")]
    WorkerFatal {
        /// Slot index of the failing worker.
        worker: usize,
        /// Reason reported by the execution unit.
        message: String,
    },
    /// Internal failure (thread spawn, runtime construction, closed channel).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure reported by a task handler. This is the error shape carried by the
/// execution-unit protocol: `{ "message": ..., "stack": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Human readable message.
    pub message: String,
    /// Optional backtrace or cause chain.
    #[serde(default)]
    pub stack: Option<String>,
}

impl HandlerError {
    /// Create an error with a message and no stack.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack/cause description.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Error a handler returns after observing its abort signal.
    #[must_use]
    pub fn aborted() -> Self {
        Self::new("task was aborted")
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            stack: Some(format!("{err:?}")),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("payload serialization failed: {err}"))
    }
}

/// Outcome failures delivered to a task's completion sink.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    /// The task did not finish before its deadline.
    #[error("task {id} (`{handler}`) timed out after {timeout_ms}ms")]
    Timeout {
        /// Task identity.
        id: TaskId,
        /// Handler the task was dispatched to.
        handler: String,
        /// Deadline that elapsed.
        timeout_ms: u64,
        /// Payload the task was submitted with.
        payload: serde_json::Value,
    },
    /// The task was aborted by the caller or by pool termination.
    #[error("task {id} aborted: {reason}")]
    Aborted {
        /// Task identity.
        id: TaskId,
        /// Why the task was aborted.
        reason: String,
    },
    /// The handler itself failed.
    #[error("task {id} failed: {error}")]
    Handler {
        /// Task identity.
        id: TaskId,
        /// Error reported by the execution unit.
        error: HandlerError,
    },
    /// The worker running the task crashed.
    #[error("worker {worker} failed: {message}")]
    WorkerFatal {
        /// Slot index of the crashed worker.
        worker: usize,
        /// Reason reported for the crash.
        message: String,
    },
    /// The pool was terminated before the task could be queued.
    #[error("pool has been terminated")]
    PoolTerminated,
    /// The result could not be decoded into the requested type.
    #[error("failed to decode task result: {0}")]
    Decode(String),
}

impl TaskError {
    /// Message of the underlying failure, without the task prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Handler { error, .. } => error.message.clone(),
            Self::Aborted { reason, .. } => reason.clone(),
            Self::WorkerFatal { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Internal dispatch outcomes. Never surfaced to callers: the dispatch loop
/// retries on the next lifecycle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum DispatchError {
    /// Every live worker is busy or still spawning.
    #[error("no free worker")]
    NoFreeWorker,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_from_anyhow_keeps_chain() {
        let err = anyhow::anyhow!("disk full").context("writing checkpoint");
        let handler_err = HandlerError::from(err);
        assert_eq!(handler_err.message, "writing checkpoint");
        assert!(handler_err.stack.unwrap().contains("disk full"));
    }

    #[test]
    fn test_task_error_message_strips_prefix() {
        let err = TaskError::Handler {
            id: TaskId::new(),
            error: HandlerError::new("boom"),
        };
        assert_eq!(err.message(), "boom");
        assert!(err.to_string().ends_with("failed: boom"));
    }

    #[test]
    fn test_dispatch_error_display() {
        assert_eq!(DispatchError::NoFreeWorker.to_string(), "no free worker");
    }
}
