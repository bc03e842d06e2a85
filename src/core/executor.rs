//! Task handlers and the registry execution units resolve them from.
//!
//! Task bodies never cross the orchestrator/unit boundary. Callers register
//! named handlers up front; a dispatch only carries the name and a JSON
//! payload, and the unit looks the handler up in the shared registry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::error::HandlerError;
use crate::util::serde::TaskId;

/// Per-worker state, built once by the init hook when a unit starts and
/// shared immutably with every task that unit runs.
pub struct WorkerContext {
    worker_id: usize,
    data: Arc<serde_json::Value>,
    state: Option<Box<dyn Any + Send + Sync>>,
}

impl WorkerContext {
    pub(crate) fn new(
        worker_id: usize,
        data: Arc<serde_json::Value>,
        state: Option<Box<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            worker_id,
            data,
            state,
        }
    }

    /// Slot index of the worker.
    #[must_use]
    pub const fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// The pool's `persistent_context` configuration value.
    #[must_use]
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// State produced by the init hook, if it has type `S`.
    #[must_use]
    pub fn state<S: Any>(&self) -> Option<&S> {
        self.state.as_ref()?.downcast_ref::<S>()
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("worker_id", &self.worker_id)
            .field("data", &self.data)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

/// What a handler sees besides its payload.
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: TaskId,
    worker: Arc<WorkerContext>,
    abort: CancellationToken,
}

impl TaskContext {
    pub(crate) const fn new(id: TaskId, worker: Arc<WorkerContext>, abort: CancellationToken) -> Self {
        Self { id, worker, abort }
    }

    /// Identity of the running task.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// The worker this task runs on.
    #[must_use]
    pub fn worker(&self) -> &WorkerContext {
        &self.worker
    }

    /// Whether the task has been asked to stop (abort, timeout or pool
    /// termination).
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Resolves once the task has been asked to stop.
    pub async fn aborted(&self) {
        self.abort.cancelled().await;
    }

    /// Raw abort signal, for handlers that hand it to other libraries.
    #[must_use]
    pub const fn abort_signal(&self) -> &CancellationToken {
        &self.abort
    }
}

/// A unit of work runnable inside an execution unit.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_task_pool::core::{HandlerError, TaskContext, TaskHandler};
///
/// struct Resize;
///
/// #[async_trait]
/// impl TaskHandler for Resize {
///     async fn handle(
///         &self,
///         payload: serde_json::Value,
///         ctx: TaskContext,
///     ) -> Result<serde_json::Value, HandlerError> {
///         if ctx.is_aborted() {
///             return Err(HandlerError::aborted());
///         }
///         Ok(payload)
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Run the task and produce its result.
    async fn handle(
        &self,
        payload: serde_json::Value,
        ctx: TaskContext,
    ) -> Result<serde_json::Value, HandlerError>;
}

/// Adapter for synchronous closures. The body runs on the unit runtime's
/// blocking pool so the unit keeps serving commands (abort, terminate and
/// further dispatches) while it computes.
struct SyncFn<F, P, R> {
    f: Arc<F>,
    _types: PhantomData<fn(P) -> R>,
}

#[async_trait]
impl<F, P, R> TaskHandler for SyncFn<F, P, R>
where
    F: Fn(P, &TaskContext) -> Result<R, HandlerError> + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    async fn handle(
        &self,
        payload: serde_json::Value,
        ctx: TaskContext,
    ) -> Result<serde_json::Value, HandlerError> {
        let f = Arc::clone(&self.f);
        let joined = tokio::task::spawn_blocking(move || -> Result<serde_json::Value, HandlerError> {
            let input: P = serde_json::from_value(payload)?;
            let output = f(input, &ctx)?;
            Ok(serde_json::to_value(output)?)
        })
        .await;

        match joined {
            Ok(result) => result,
            // Re-raise so the unit sees a handler panic.
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(HandlerError::new(format!("blocking handler cancelled: {e}"))),
        }
    }
}

/// Adapter for async closures.
struct AsyncFn<F, P, R, Fut> {
    f: F,
    _types: PhantomData<fn(P) -> (R, Fut)>,
}

#[async_trait]
impl<F, P, R, Fut> TaskHandler for AsyncFn<F, P, R, Fut>
where
    F: Fn(P, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    async fn handle(
        &self,
        payload: serde_json::Value,
        ctx: TaskContext,
    ) -> Result<serde_json::Value, HandlerError> {
        let input: P = serde_json::from_value(payload)?;
        let output = (self.f)(input, ctx).await?;
        Ok(serde_json::to_value(output)?)
    }
}

type InitHook = dyn Fn(usize, &serde_json::Value) -> Result<Option<Box<dyn Any + Send + Sync>>, HandlerError>
    + Send
    + Sync;
type TeardownHook = dyn Fn(&WorkerContext) + Send + Sync;

/// Named handlers plus the per-worker lifecycle hooks.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    init: Option<Arc<InitHook>>,
    teardown: Option<Arc<TeardownHook>>,
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler implementation. Replaces any handler already
    /// registered under `name`.
    pub fn register<H: TaskHandler>(&mut self, name: impl Into<String>, handler: H) -> &mut Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Register a synchronous closure. Input and output are converted with
    /// serde at the boundary. The closure runs on a blocking thread owned by
    /// the unit; long computations should poll [`TaskContext::is_aborted`].
    pub fn register_fn<F, P, R>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(P, &TaskContext) -> Result<R, HandlerError> + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.register(
            name,
            SyncFn {
                f: Arc::new(f),
                _types: PhantomData,
            },
        )
    }

    /// Register an async closure.
    pub fn register_async<F, P, R, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(P, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.register(
            name,
            AsyncFn {
                f,
                _types: PhantomData,
            },
        )
    }

    /// Hook run once when each unit starts, before it reports online. It
    /// receives the slot index and the configured `persistent_context`; its
    /// return value becomes the worker's state (see [`WorkerContext::state`]).
    /// An error marks the unit as crashed.
    pub fn on_worker_init<F, S>(&mut self, f: F) -> &mut Self
    where
        F: Fn(usize, &serde_json::Value) -> Result<S, HandlerError> + Send + Sync + 'static,
        S: Any + Send + Sync,
    {
        self.init = Some(Arc::new(move |worker_id: usize, data: &serde_json::Value| {
            f(worker_id, data).map(|state| Some(Box::new(state) as Box<dyn Any + Send + Sync>))
        }));
        self
    }

    /// Hook run once per unit when the pool terminates, after every running
    /// task's abort signal has fired.
    pub fn on_worker_teardown<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&WorkerContext) + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(f));
        self
    }

    /// Whether a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered handler names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Build the worker context for a starting unit.
    pub(crate) fn init_worker(
        &self,
        worker_id: usize,
        data: Arc<serde_json::Value>,
    ) -> Result<WorkerContext, HandlerError> {
        let state = match &self.init {
            Some(init) => init(worker_id, &data)?,
            None => None,
        };
        Ok(WorkerContext::new(worker_id, data, state))
    }

    pub(crate) fn teardown_worker(&self, worker: &WorkerContext) {
        if let Some(teardown) = &self.teardown {
            teardown(worker);
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .field("init", &self.init.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}
