//! Worker pool with dedicated execution-unit threads and a single orchestrator
//! actor.
//!
//! # Key Features
//!
//! - **Priority or FIFO dispatch**: queued tasks leave in queue order, up to
//!   `max_workers × max_jobs_per_worker` at a time
//! - **Deadlines**: every dispatched task gets `task_timeout_ms`; on expiry the
//!   caller gets [`TaskError::Timeout`](crate::core::TaskError) and the handler
//!   gets its abort signal
//! - **Cooperative abort**: queued tasks are dropped, running ones are signalled
//! - **Crash recovery**: a unit that panics or fails init is replaced in place
//! - **Draining termination**: running work gets `terminate_timeout_ms` to finish
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_task_pool::config::WorkerPoolConfig;
//! use prometheus_task_pool::core::{HandlerRegistry, TaskContext, TaskDescriptor, WorkerPool};
//! use prometheus_task_pool::util::serde::Priority;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("double", |x: i64, _ctx: &TaskContext| Ok(x * 2));
//!
//! let pool = WorkerPool::init(WorkerPoolConfig::new().with_max_workers(4), registry).await?;
//! let handle = pool.submit(TaskDescriptor::new("double", &21)?, Priority::Normal)?;
//! let answer: i64 = handle.join().await?;
//! pool.terminate().await?;
//! ```

mod node;
mod orchestrator;
mod unit;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::builders::build_queue;
use crate::config::WorkerPoolConfig;
use crate::core::error::PoolError;
use crate::core::executor::HandlerRegistry;
use crate::core::task::{
    CompletionSink, QueuedTask, TaskDescriptor, TaskHandle, TaskOutcome, TaskQueue,
};
use crate::util::serde::{Priority, TaskId};

use self::orchestrator::{Orchestrator, Signal};

/// Capacity of the lifecycle event channel. Slow subscribers see
/// `RecvError::Lagged` rather than blocking the orchestrator.
const EVENT_CAPACITY: usize = 256;

/// Lifecycle notifications, see [`WorkerPool::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// Every live worker reached `Online` for the first time.
    Ready,
    /// A worker finished its init hook.
    WorkerOnline {
        /// Slot index.
        worker: usize,
    },
    /// A worker crashed or could not be started.
    WorkerError {
        /// Slot index.
        worker: usize,
        /// Crash description.
        message: String,
    },
    /// A crashed worker was replaced.
    WorkerRespawned {
        /// Slot index.
        worker: usize,
        /// Number of units that have occupied the slot, this one included.
        generation: u64,
    },
    /// Termination finished; no worker remains.
    Terminated,
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker slots that are not retired.
    pub worker_count: u64,
    /// Workers currently `Online` or `Busy`.
    pub online_workers: u64,
    /// Tasks waiting in the queue.
    pub queued_tasks: u64,
    /// Tasks dispatched and not yet resolved.
    pub active_tasks: u64,
    /// Total tasks accepted by `submit`.
    pub submitted_tasks: u64,
    /// Tasks that resolved successfully.
    pub completed_tasks: u64,
    /// Tasks that failed (handler error or worker crash).
    pub failed_tasks: u64,
    /// Tasks that hit their deadline.
    pub timed_out_tasks: u64,
    /// Tasks aborted by the caller or by termination.
    pub aborted_tasks: u64,
    /// Execution units lost to crashes.
    pub worker_crashes: u64,
    /// Execution units started to replace crashed ones.
    pub worker_respawns: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub workers: AtomicU64,
    pub online_workers: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub active_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub timed_out_tasks: AtomicU64,
    pub aborted_tasks: AtomicU64,
    pub worker_crashes: AtomicU64,
    pub worker_respawns: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            worker_count: self.workers.load(Ordering::Relaxed),
            online_workers: self.online_workers.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            timed_out_tasks: self.timed_out_tasks.load(Ordering::Relaxed),
            aborted_tasks: self.aborted_tasks.load(Ordering::Relaxed),
            worker_crashes: self.worker_crashes.load(Ordering::Relaxed),
            worker_respawns: self.worker_respawns.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the pool handle and the orchestrator.
#[derive(Debug, Default)]
pub(crate) struct PoolShared {
    pub terminated: AtomicBool,
    pub counters: PoolCounters,
}

/// Handle to a running pool.
///
/// All methods take `&self`; share the pool across tasks with an `Arc`.
/// Completion callbacks run on the orchestrator thread and must not block.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    signals: mpsc::UnboundedSender<Signal>,
    shared: Arc<PoolShared>,
    registry: Arc<HandlerRegistry>,
    events: broadcast::Sender<PoolEvent>,
    orchestrator: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start a pool and wait until every worker is online.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::WorkerFatal` if no worker could be started
    /// - `PoolError::Internal` if the orchestrator thread cannot be spawned
    pub async fn init(config: WorkerPoolConfig, registry: HandlerRegistry) -> Result<Self, PoolError> {
        let pool = Self::new(config, registry)?;
        pool.ready().await?;
        Ok(pool)
    }

    /// Start a pool without waiting for its workers. Tasks submitted before
    /// the workers are online stay queued until one is.
    ///
    /// # Errors
    ///
    /// Same as [`init`](Self::init), minus the readiness failure.
    pub fn new(config: WorkerPoolConfig, registry: HandlerRegistry) -> Result<Self, PoolError> {
        let queue = build_queue(&config);
        Self::start(config, registry, queue)
    }

    pub(crate) fn start(
        config: WorkerPoolConfig,
        registry: HandlerRegistry,
        queue: Box<dyn TaskQueue<QueuedTask>>,
    ) -> Result<Self, PoolError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::launch(config, Arc::new(registry), queue, events)
    }

    /// Spawn an orchestrator thread for `config`. Events go to `events`, so
    /// a restarted pool keeps its subscribers.
    fn launch(
        config: WorkerPoolConfig,
        registry: Arc<HandlerRegistry>,
        queue: Box<dyn TaskQueue<QueuedTask>>,
        events: broadcast::Sender<PoolEvent>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(PoolShared::default());

        let orchestrator = Orchestrator::new(
            config.clone(),
            Arc::clone(&registry),
            queue,
            tx.clone(),
            Arc::clone(&shared),
            events.clone(),
        );
        let handle = thread::Builder::new()
            .name("pool-orchestrator".into())
            .spawn(move || orchestrator::run_thread(orchestrator, rx))
            .map_err(|e| PoolError::Internal(format!("failed to spawn orchestrator thread: {e}")))?;

        info!(
            max_workers = config.max_workers,
            max_jobs_per_worker = config.max_jobs_per_worker,
            task_timeout_ms = config.task_timeout_ms,
            queue = ?config.queue,
            "worker pool started"
        );

        Ok(Self {
            config,
            signals: tx,
            shared,
            registry,
            events,
            orchestrator: Mutex::new(Some(handle)),
        })
    }

    /// Wait until every live worker has come online once.
    ///
    /// # Errors
    ///
    /// - `PoolError::Terminated` if the pool terminates first
    /// - `PoolError::WorkerFatal` if every worker slot failed to start
    pub async fn ready(&self) -> Result<(), PoolError> {
        let (reply, rx) = oneshot::channel();
        self.send(Signal::AwaitReady { reply })?;
        rx.await.unwrap_or(Err(PoolError::Terminated))
    }

    /// Submit a task and get a handle that resolves with its outcome.
    ///
    /// # Errors
    ///
    /// - `PoolError::Terminated` if the pool has been terminated
    /// - `PoolError::UnknownHandler` if no handler is registered under the
    ///   descriptor's name
    pub fn submit(&self, descriptor: TaskDescriptor, priority: Priority) -> Result<TaskHandle, PoolError> {
        let id = TaskId::new();
        let (handle, sink) = TaskHandle::pair(id);
        self.enqueue(id, descriptor, priority, sink)?;
        Ok(handle)
    }

    /// Submit a task whose outcome is passed to `callback`, on the
    /// orchestrator thread.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_with_callback<F>(
        &self,
        descriptor: TaskDescriptor,
        priority: Priority,
        callback: F,
    ) -> Result<TaskId, PoolError>
    where
        F: FnOnce(TaskOutcome) + Send + 'static,
    {
        self.submit_with_sink(descriptor, priority, CompletionSink::callback(callback))
    }

    /// Submit a task with an explicit completion sink.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_with_sink(
        &self,
        descriptor: TaskDescriptor,
        priority: Priority,
        sink: CompletionSink,
    ) -> Result<TaskId, PoolError> {
        let id = TaskId::new();
        self.enqueue(id, descriptor, priority, sink)?;
        Ok(id)
    }

    fn enqueue(
        &self,
        id: TaskId,
        descriptor: TaskDescriptor,
        priority: Priority,
        sink: CompletionSink,
    ) -> Result<(), PoolError> {
        if self.shared.terminated.load(Ordering::Acquire) {
            return Err(PoolError::Terminated);
        }
        if !self.registry.contains(&descriptor.handler) {
            return Err(PoolError::UnknownHandler(descriptor.handler));
        }

        debug!(task_id = %id, handler = %descriptor.handler, ?priority, "task submitted");
        let task = QueuedTask {
            id,
            descriptor,
            priority,
            sink,
            submitted_at: Instant::now(),
        };
        self.send(Signal::Submit(task))?;
        self.shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Abort a queued or running task.
    ///
    /// A queued task is removed and resolves with
    /// [`TaskError::Aborted`]; its handler never runs. A running task gets
    /// its abort signal fired and resolves through the normal completion
    /// path: a handler error after the abort request becomes `Aborted`, a
    /// success stays a success.
    ///
    /// # Errors
    ///
    /// - `PoolError::TaskNotFound` if the task is neither queued nor running
    /// - `PoolError::Terminated` if the pool has shut down
    pub async fn abort(&self, id: TaskId) -> Result<(), PoolError> {
        let (reply, rx) = oneshot::channel();
        self.send(Signal::Abort { id, reply })?;
        rx.await.unwrap_or(Err(PoolError::Terminated))
    }

    /// Terminate the pool: queued tasks resolve as aborted, running tasks get
    /// up to `terminate_timeout_ms` to finish, then every unit is torn down.
    ///
    /// Calling it again, or after the pool has already stopped, returns
    /// `Ok(())`.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for teardown failures.
    pub async fn terminate(&self) -> Result<(), PoolError> {
        self.shared.terminated.store(true, Ordering::Release);

        let (reply, rx) = oneshot::channel();
        if self.signals.send(Signal::Terminate { reply }).is_ok() {
            // A dropped reply means the orchestrator already stopped.
            let _ = rx.await;
        }

        let orchestrator = self.orchestrator.lock().take();
        if let Some(handle) = orchestrator {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => debug!("orchestrator thread joined"),
                Ok(Err(_)) => warn!("orchestrator thread panicked"),
                Err(e) => warn!(error = %e, "failed to join orchestrator thread"),
            }
        }
        Ok(())
    }

    /// Restart the pool in place with a new configuration.
    ///
    /// The running instance is terminated first (see
    /// [`terminate`](Self::terminate)), then fresh workers are started with
    /// the same handler registry and the call waits until they are online.
    /// Event subscribers stay attached; statistics start again from zero. A
    /// custom queue installed through the builder is replaced by the one
    /// `config.queue` selects.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if `config` is invalid; the current pool
    ///   is left untouched
    /// - `PoolError::WorkerFatal` if no worker of the new pool could start
    /// - `PoolError::Internal` if the orchestrator thread cannot be spawned
    pub async fn refresh(&mut self, config: WorkerPoolConfig) -> Result<(), PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        self.terminate().await?;

        let queue = build_queue(&config);
        let fresh = Self::launch(config, Arc::clone(&self.registry), queue, self.events.clone())?;
        // The old handle is already terminated, so its Drop is a no-op.
        *self = fresh;
        info!(max_workers = self.config.max_workers, "worker pool refreshed");
        self.ready().await
    }

    /// Subscribe to lifecycle events. Only events emitted after this call are
    /// received.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot()
    }

    /// Configuration the pool was started with.
    #[must_use]
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Whether `terminate` has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::Acquire)
    }

    fn send(&self, signal: Signal) -> Result<(), PoolError> {
        self.signals.send(signal).map_err(|_| PoolError::Terminated)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Start termination but don't wait for it; `terminate()` is the
        // graceful path.
        if !self.shared.terminated.swap(true, Ordering::AcqRel) {
            let (reply, _) = oneshot::channel();
            let _ = self.signals.send(Signal::Terminate { reply });
            debug!("WorkerPool dropped without explicit terminate - units will be drained in the background");
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
