//! Task descriptors, completion sinks and the queue contract.

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::core::error::TaskError;
use crate::util::serde::{Priority, TaskId};

/// Result delivered to a completion sink.
pub type TaskOutcome = Result<serde_json::Value, TaskError>;

/// What to run: a registered handler name plus its input payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Name the handler was registered under.
    pub handler: String,
    /// Input payload passed to the handler.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TaskDescriptor {
    /// Build a descriptor from any serializable payload.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `payload` cannot be represented as JSON.
    pub fn new<P: Serialize>(
        handler: impl Into<String>,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            handler: handler.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Build a descriptor from an already-encoded payload.
    pub fn from_value(handler: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            handler: handler.into(),
            payload,
        }
    }
}

/// Where a task's single outcome goes.
pub enum CompletionSink {
    /// Invoked once with the outcome, on the orchestrator thread.
    Callback(Box<dyn FnOnce(TaskOutcome) + Send + 'static>),
    /// Resolves the receiving half held by a [`TaskHandle`].
    Promise(oneshot::Sender<TaskOutcome>),
}

impl CompletionSink {
    /// Wrap a callback.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(TaskOutcome) + Send + 'static,
    {
        Self::Callback(Box::new(f))
    }

    /// Consume the sink and hand it the outcome. A panicking callback is
    /// logged and contained.
    pub(crate) fn deliver(self, id: TaskId, outcome: TaskOutcome) {
        match self {
            Self::Callback(f) => {
                if catch_unwind(AssertUnwindSafe(|| f(outcome))).is_err() {
                    tracing::error!(task_id = %id, "completion callback panicked");
                }
            }
            Self::Promise(tx) => {
                if tx.send(outcome).is_err() {
                    tracing::debug!(task_id = %id, "task handle dropped before completion");
                }
            }
        }
    }
}

impl fmt::Debug for CompletionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("CompletionSink::Callback"),
            Self::Promise(_) => f.write_str("CompletionSink::Promise"),
        }
    }
}

/// Caller side of a promise-style submission. Await it (or call
/// [`TaskHandle::blocking_wait`] outside async code) to get the outcome.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub(crate) fn pair(id: TaskId) -> (Self, CompletionSink) {
        let (tx, rx) = oneshot::channel();
        (Self { id, rx }, CompletionSink::Promise(tx))
    }

    /// Identity of the submitted task, usable with `abort`.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Block the current thread until the outcome arrives.
    ///
    /// # Errors
    ///
    /// Returns the task's failure, or [`TaskError::PoolTerminated`] if the
    /// pool went away without resolving the task.
    pub fn blocking_wait(self) -> TaskOutcome {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(TaskError::PoolTerminated))
    }

    /// Await the outcome and decode the success value.
    ///
    /// # Errors
    ///
    /// Returns the task's failure, or [`TaskError::Decode`] if the value does
    /// not deserialize into `T`.
    pub async fn join<T: DeserializeOwned>(self) -> Result<T, TaskError> {
        let value = self.await?;
        serde_json::from_value(value).map_err(|e| TaskError::Decode(e.to_string()))
    }
}

impl Future for TaskHandle {
    type Output = TaskOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::PoolTerminated)))
    }
}

/// A submitted task waiting in the queue.
#[derive(Debug)]
pub struct QueuedTask {
    /// Task identity.
    pub id: TaskId,
    /// Handler and payload.
    pub descriptor: TaskDescriptor,
    /// Priority used for queue ordering.
    pub priority: Priority,
    /// Where the outcome goes.
    pub sink: CompletionSink,
    /// When `submit` accepted the task.
    pub submitted_at: Instant,
}

impl QueuedTask {
    /// Resolve the task, consuming it.
    pub(crate) fn complete(self, outcome: TaskOutcome) {
        self.sink.deliver(self.id, outcome);
    }
}

/// Anything a [`TaskQueue`] can store: it must expose a stable identity so
/// that `remove` can find it.
pub trait QueueItem {
    /// Identity used by [`TaskQueue::remove`].
    fn task_id(&self) -> TaskId;
}

impl QueueItem for QueuedTask {
    fn task_id(&self) -> TaskId {
        self.id
    }
}

/// Abstraction for pending-task containers. The orchestrator depends only on
/// this contract, so custom disciplines can be plugged in through the
/// builder.
pub trait TaskQueue<T: QueueItem>: Send {
    /// Insert an item with the given priority.
    fn add(&mut self, item: T, priority: Priority);
    /// Remove and return the next item to dispatch.
    fn poll(&mut self) -> Option<T>;
    /// Next item to dispatch, without removing it.
    fn peek(&self) -> Option<&T>;
    /// Remove a specific item by identity.
    fn remove(&mut self, id: &TaskId) -> Option<T>;
    /// Current depth.
    fn len(&self) -> usize;
    /// Whether the queue holds no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Remove every item, returning them in no particular order.
    fn clear(&mut self) -> Vec<T>;
}
