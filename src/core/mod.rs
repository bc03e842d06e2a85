//! Core scheduling abstractions: tasks, handlers, the unit protocol and the
//! worker pool.

pub mod error;
pub mod executor;
pub mod protocol;
pub mod task;
pub mod worker_pool;

pub use error::{AppResult, HandlerError, PoolError, TaskError};
pub use executor::{HandlerRegistry, TaskContext, TaskHandler, WorkerContext};
pub use protocol::{ReplyBody, TaskReply, UnitEvent, WorkerCommand};
pub use task::{
    CompletionSink, QueueItem, QueuedTask, TaskDescriptor, TaskHandle, TaskOutcome, TaskQueue,
};
pub use worker_pool::{PoolEvent, PoolStats, WorkerPool};
