//! # Prometheus Task Pool
//!
//! A worker-thread task pool for CPU-bound and blocking work.
//!
//! Work is offloaded from the controlling process onto a bounded set of
//! execution units, each a dedicated OS thread with its own single-threaded
//! tokio runtime. A single orchestrator actor owns the queue and the worker
//! slots and decides what runs where.
//!
//! ## Key Features
//!
//! - **Bounded concurrency**: at most `max_workers × max_jobs_per_worker` tasks run at once
//! - **Priority or FIFO queueing**: pluggable through the [`core::TaskQueue`] trait
//! - **Deadlines**: tasks that overrun `task_timeout_ms` fail with a timeout and get their abort signal
//! - **Cooperative cancellation**: handlers observe a cancellation token through [`core::TaskContext`]
//! - **Crash recovery**: a panicking handler takes down only its own unit, which is respawned in place
//! - **Draining termination**: running work gets a grace period before units are torn down
//!
//! ## Handlers
//!
//! Task bodies are registered by name up front; a submission carries only the
//! handler name and a JSON payload.
//!
//! ```rust,ignore
//! use prometheus_task_pool::config::WorkerPoolConfig;
//! use prometheus_task_pool::core::{HandlerError, HandlerRegistry, TaskContext, TaskDescriptor, WorkerPool};
//! use prometheus_task_pool::util::serde::Priority;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("double", |x: i64, _ctx: &TaskContext| Ok(x * 2));
//! registry.register_async("slow_echo", |msg: String, ctx: TaskContext| async move {
//!     tokio::select! {
//!         () = tokio::time::sleep(std::time::Duration::from_millis(50)) => Ok(msg),
//!         () = ctx.aborted() => Err(HandlerError::aborted()),
//!     }
//! });
//!
//! let pool = WorkerPool::init(WorkerPoolConfig::from_env()?, registry).await?;
//!
//! let doubled: i64 = pool
//!     .submit(TaskDescriptor::new("double", &21)?, Priority::High)?
//!     .join()
//!     .await?;
//! assert_eq!(doubled, 42);
//!
//! pool.terminate().await?;
//! ```
//!
//! For complete examples, see `tests/worker_pool_test.rs`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct worker pools from configuration.
pub mod builders;
/// Configuration models for the pool and its workers.
pub mod config;
/// Core scheduling abstractions and the worker pool.
pub mod core;
/// Queue implementations.
pub mod infra;
/// Shared utilities.
pub mod util;
