//! Execution units: one dedicated OS thread per worker slot.
//!
//! Each unit owns a single-threaded tokio runtime, so CPU-bound handlers never
//! block the caller's runtime and a stuck handler only stalls its own slot.
//! The unit runs its init hook, reports `online`, then serves commands until
//! the orchestrator closes its channel. Replies and lifecycle events go back
//! over the orchestrator's signal channel, tagged with slot and generation.

use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::error::HandlerError;
use crate::core::executor::{HandlerRegistry, TaskContext, WorkerContext};
use crate::core::protocol::{TaskReply, UnitEvent, WorkerCommand};
use crate::util::serde::TaskId;

use super::orchestrator::Signal;

/// How long a stopping unit waits for blocking handlers before abandoning
/// them. Shorter than the orchestrator's join grace.
const BLOCKING_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Orchestrator-side handle to a running unit.
pub(crate) struct UnitHandle {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl UnitHandle {
    pub(crate) const fn new(
        commands: mpsc::UnboundedSender<WorkerCommand>,
        thread: Option<JoinHandle<()>>,
    ) -> Self {
        Self { commands, thread }
    }

    pub(crate) fn send(&self, command: WorkerCommand) -> Result<(), WorkerCommand> {
        self.commands.send(command).map_err(|err| err.0)
    }

    /// Close the command channel. The unit drops its runtime once the channel
    /// is closed; the returned thread handle can be joined to wait for that.
    pub(crate) fn close(mut self) -> Option<JoinHandle<()>> {
        self.thread.take()
    }
}

/// Everything a unit thread needs to start.
pub(crate) struct UnitSpec {
    pub slot: usize,
    pub generation: u64,
    pub stack_size: usize,
    pub registry: Arc<HandlerRegistry>,
    pub data: Arc<serde_json::Value>,
    pub signals: mpsc::UnboundedSender<Signal>,
}

/// Sends unit events to the orchestrator, tagged with the unit's identity.
#[derive(Clone)]
struct Reporter {
    slot: usize,
    generation: u64,
    signals: mpsc::UnboundedSender<Signal>,
}

impl Reporter {
    fn send(&self, event: UnitEvent) {
        let signal = Signal::Unit {
            slot: self.slot,
            generation: self.generation,
            event,
        };
        if self.signals.send(signal).is_err() {
            debug!(worker_id = self.slot, "orchestrator gone; dropping unit event");
        }
    }

    fn fatal(&self, message: String) {
        error!(worker_id = self.slot, generation = self.generation, %message, "execution unit failed");
        self.send(UnitEvent::Fatal { message });
    }
}

/// Spawn the unit thread for `spec.slot`.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be created.
pub(crate) fn spawn_unit(spec: UnitSpec) -> io::Result<UnitHandle> {
    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = Reporter {
        slot: spec.slot,
        generation: spec.generation,
        signals: spec.signals,
    };
    let registry = spec.registry;
    let data = spec.data;
    let stack_size = spec.stack_size;

    let thread = thread::Builder::new()
        .name(format!("pool-worker-{}", spec.slot))
        .stack_size(spec.stack_size)
        .spawn(move || {
            debug!(worker_id = reporter.slot, generation = reporter.generation, "unit thread started");
            let guard = reporter.clone();
            let outcome = catch_unwind(AssertUnwindSafe(|| run(&reporter, &registry, data, stack_size, rx)));
            if let Err(panic) = outcome {
                guard.fatal(format!("execution unit panicked: {}", panic_message(panic.as_ref())));
            }
            debug!(worker_id = guard.slot, "unit thread exiting");
        })?;

    Ok(UnitHandle::new(tx, Some(thread)))
}

fn run(
    reporter: &Reporter,
    registry: &HandlerRegistry,
    data: Arc<serde_json::Value>,
    stack_size: usize,
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
) {
    // Sync handlers run on this runtime's blocking threads.
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name(format!("pool-worker-{}-blocking", reporter.slot))
        .thread_stack_size(stack_size)
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            reporter.fatal(format!("failed to create unit runtime: {e}"));
            return;
        }
    };

    let worker = match registry.init_worker(reporter.slot, data) {
        Ok(worker) => Arc::new(worker),
        Err(e) => {
            reporter.fatal(format!("worker init failed: {e}"));
            return;
        }
    };

    reporter.send(UnitEvent::Online);
    rt.block_on(serve(reporter, registry, &worker, commands));
    rt.shutdown_timeout(BLOCKING_SHUTDOWN_GRACE);
}

/// Command loop. Returns when the command channel closes or a handler
/// panics.
async fn serve(
    reporter: &Reporter,
    registry: &HandlerRegistry,
    worker: &Arc<WorkerContext>,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
) {
    let mut running: JoinSet<(TaskId, Result<serde_json::Value, HandlerError>)> = JoinSet::new();
    let mut signals: HashMap<TaskId, CancellationToken> = HashMap::new();
    let mut terminating = false;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!(worker_id = reporter.slot, running = running.len(), "command channel closed");
                    break;
                };
                match command {
                    WorkerCommand::Dispatch { id, handler, payload } => {
                        let Some(task_handler) = registry.get(&handler) else {
                            let error = HandlerError::new(format!("no handler registered under `{handler}`"));
                            reporter.send(UnitEvent::Reply(TaskReply::new(id, Err(error))));
                            continue;
                        };
                        let token = CancellationToken::new();
                        if terminating {
                            token.cancel();
                        }
                        signals.insert(id, token.clone());
                        let ctx = TaskContext::new(id, Arc::clone(worker), token);
                        debug!(worker_id = reporter.slot, task_id = %id, handler = %handler, "running task");
                        running.spawn(async move { (id, task_handler.handle(payload, ctx).await) });
                    }
                    WorkerCommand::Abort { id } => {
                        if let Some(token) = signals.get(&id) {
                            debug!(worker_id = reporter.slot, task_id = %id, "abort signal fired");
                            token.cancel();
                        }
                    }
                    WorkerCommand::Terminate => {
                        if terminating {
                            continue;
                        }
                        terminating = true;
                        for token in signals.values() {
                            token.cancel();
                        }
                        teardown(reporter.slot, registry, worker);
                    }
                }
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                match joined {
                    Ok((id, result)) => {
                        signals.remove(&id);
                        reporter.send(UnitEvent::Reply(TaskReply::new(id, result)));
                    }
                    Err(e) if e.is_panic() => {
                        let message = format!("handler panicked: {}", panic_message(e.into_panic().as_ref()));
                        reporter.fatal(message);
                        return;
                    }
                    Err(e) => {
                        warn!(worker_id = reporter.slot, error = %e, "handler task cancelled");
                    }
                }
            }
        }
    }
}

fn teardown(slot: usize, registry: &HandlerRegistry, worker: &WorkerContext) {
    if catch_unwind(AssertUnwindSafe(|| registry.teardown_worker(worker))).is_err() {
        error!(worker_id = slot, "teardown hook panicked");
    } else {
        debug!(worker_id = slot, "teardown hook finished");
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Join released unit threads, giving all of them `grace` in total. Threads
/// still running after that are detached.
pub(crate) fn join_units(threads: Vec<(usize, JoinHandle<()>)>, grace: Duration) {
    let deadline = Instant::now() + grace;
    let count = threads.len();

    for (worker_id, handle) in threads {
        // Join on a helper thread so a stuck unit cannot hang termination.
        let (tx, rx) = crossbeam_channel::bounded(1);
        let joiner = thread::spawn(move || {
            let _ = tx.send(handle.join().is_ok());
        });

        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(true) => {
                debug!(worker_id, "unit joined");
                let _ = joiner.join();
            }
            Ok(false) => {
                warn!(worker_id, "unit thread panicked");
                let _ = joiner.join();
            }
            Err(_) => {
                warn!(worker_id, "unit did not exit within grace period; detaching");
            }
        }
    }

    info!(units = count, "execution units released");
}
