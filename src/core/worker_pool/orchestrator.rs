//! The pool orchestrator: a single actor that owns the queue, the worker
//! slots and the processing table.
//!
//! Every state change arrives as a [`Signal`] on one unbounded channel: API
//! calls, unit events and timer expiries. Signals are handled one at a time
//! on the dedicated orchestrator thread, so dispatch ticks never overlap and
//! no state here needs a lock.

use std::collections::HashMap;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::WorkerPoolConfig;
use crate::core::error::{DispatchError, PoolError, TaskError};
use crate::core::executor::HandlerRegistry;
use crate::core::protocol::{ReplyBody, TaskReply, UnitEvent, WorkerCommand};
use crate::core::task::{QueuedTask, TaskOutcome, TaskQueue};
use crate::util::serde::TaskId;

use super::node::{WorkerNode, WorkerStatus};
use super::unit::{self, UnitSpec};
use super::{PoolEvent, PoolShared};

/// Upper bound on waiting for unit threads to exit once their channels are
/// closed.
const UNIT_JOIN_GRACE: Duration = Duration::from_secs(2);

type Reply = oneshot::Sender<Result<(), PoolError>>;

/// Messages consumed by the orchestrator loop.
pub(crate) enum Signal {
    Submit(QueuedTask),
    Abort { id: TaskId, reply: Reply },
    Terminate { reply: Reply },
    AwaitReady { reply: Reply },
    Unit {
        slot: usize,
        generation: u64,
        event: UnitEvent,
    },
    Deadline { id: TaskId },
    DrainElapsed,
    /// Re-run the dispatch loop after a failed send or spawn.
    Tick,
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submit(task) => f.debug_tuple("Submit").field(&task.id).finish(),
            Self::Abort { id, .. } => f.debug_struct("Abort").field("id", id).finish(),
            Self::Terminate { .. } => f.write_str("Terminate"),
            Self::AwaitReady { .. } => f.write_str("AwaitReady"),
            Self::Unit {
                slot,
                generation,
                event,
            } => f
                .debug_struct("Unit")
                .field("slot", slot)
                .field("generation", generation)
                .field("event", event)
                .finish(),
            Self::Deadline { id } => f.debug_struct("Deadline").field("id", id).finish(),
            Self::DrainElapsed => f.write_str("DrainElapsed"),
            Self::Tick => f.write_str("Tick"),
        }
    }
}

/// A dispatched task awaiting its outcome.
struct InFlight {
    task: QueuedTask,
    slot: usize,
    timer: AbortHandle,
    abort_requested: bool,
}

pub(crate) struct Orchestrator {
    config: WorkerPoolConfig,
    registry: Arc<HandlerRegistry>,
    context: Arc<serde_json::Value>,
    queue: Box<dyn TaskQueue<QueuedTask>>,
    nodes: Vec<WorkerNode>,
    processing: HashMap<TaskId, InFlight>,
    signals: mpsc::UnboundedSender<Signal>,
    shared: Arc<PoolShared>,
    events: broadcast::Sender<PoolEvent>,
    ready: bool,
    ready_waiters: Vec<Reply>,
    terminating: bool,
    terminate_waiters: Vec<Reply>,
    drain_timer: Option<AbortHandle>,
}

impl Orchestrator {
    pub(crate) fn new(
        config: WorkerPoolConfig,
        registry: Arc<HandlerRegistry>,
        queue: Box<dyn TaskQueue<QueuedTask>>,
        signals: mpsc::UnboundedSender<Signal>,
        shared: Arc<PoolShared>,
        events: broadcast::Sender<PoolEvent>,
    ) -> Self {
        let nodes = (0..config.max_workers).map(WorkerNode::new).collect();
        let context = Arc::new(config.persistent_context.clone());
        Self {
            config,
            registry,
            context,
            queue,
            nodes,
            processing: HashMap::new(),
            signals,
            shared,
            events,
            ready: false,
            ready_waiters: Vec::new(),
            terminating: false,
            terminate_waiters: Vec::new(),
            drain_timer: None,
        }
    }

    /// Spawn the initial units, then handle signals until termination
    /// completes.
    pub(crate) async fn run(mut self, mut signals: mpsc::UnboundedReceiver<Signal>) {
        self.tick();
        self.sync_gauges();

        while let Some(signal) = signals.recv().await {
            trace!(?signal, "orchestrator signal");
            let flow = self.handle(signal);
            self.sync_gauges();
            if flow.is_break() {
                break;
            }
        }

        // Refuse new signals, then answer the ones that raced termination.
        signals.close();
        let mut late = 0_usize;
        while let Ok(signal) = signals.try_recv() {
            late += 1;
            self.reject(signal);
        }
        debug!(late_signals = late, "orchestrator loop finished");
    }

    /// Answer a signal that arrived after the loop stopped.
    fn reject(&self, signal: Signal) {
        match signal {
            Signal::Submit(task) => self.resolve(task, Err(TaskError::PoolTerminated)),
            Signal::Abort { reply, .. } | Signal::AwaitReady { reply } => {
                let _ = reply.send(Err(PoolError::Terminated));
            }
            Signal::Terminate { reply } => {
                let _ = reply.send(Ok(()));
            }
            Signal::Unit { .. } | Signal::Deadline { .. } | Signal::DrainElapsed | Signal::Tick => {}
        }
    }

    fn handle(&mut self, signal: Signal) -> ControlFlow<()> {
        match signal {
            Signal::Submit(task) => self.on_submit(task),
            Signal::Abort { id, reply } => {
                let _ = reply.send(self.on_abort(id));
            }
            Signal::Terminate { reply } => {
                self.terminate_waiters.push(reply);
                self.begin_terminate();
            }
            Signal::AwaitReady { reply } => self.on_await_ready(reply),
            Signal::Unit {
                slot,
                generation,
                event,
            } => self.on_unit_event(slot, generation, event),
            Signal::Deadline { id } => self.on_deadline(id),
            Signal::DrainElapsed => {
                warn!(
                    in_flight = self.processing.len(),
                    "termination drain timed out; killing execution units"
                );
                return self.finish();
            }
            Signal::Tick => self.tick(),
        }

        if self.terminating && self.drained() {
            return self.finish();
        }
        ControlFlow::Continue(())
    }

    // ---- API signals ----

    fn on_submit(&mut self, task: QueuedTask) {
        if self.terminating {
            self.resolve(task, Err(TaskError::PoolTerminated));
            return;
        }
        if self.all_retired() {
            let outcome = Err(self.retired_error());
            self.resolve(task, outcome);
            return;
        }
        debug!(task_id = %task.id, priority = ?task.priority, "task queued");
        let priority = task.priority;
        self.queue.add(task, priority);
        self.shared.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    fn on_abort(&mut self, id: TaskId) -> Result<(), PoolError> {
        if let Some(task) = self.queue.remove(&id) {
            self.shared.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
            info!(task_id = %id, "queued task aborted");
            self.resolve(
                task,
                Err(TaskError::Aborted {
                    id,
                    reason: "task aborted before dispatch".into(),
                }),
            );
            return Ok(());
        }

        let Some(entry) = self.processing.get_mut(&id) else {
            return Err(PoolError::TaskNotFound(id));
        };
        entry.abort_requested = true;
        info!(task_id = %id, worker_id = entry.slot, "abort requested for running task");
        for node in &self.nodes {
            let _ = node.send(WorkerCommand::Abort { id });
        }
        Ok(())
    }

    fn on_await_ready(&mut self, reply: Reply) {
        if self.terminating {
            let _ = reply.send(Err(PoolError::Terminated));
        } else if self.ready {
            let _ = reply.send(Ok(()));
        } else if self.all_retired() {
            let _ = reply.send(Err(self.retired_pool_error()));
        } else {
            self.ready_waiters.push(reply);
        }
    }

    // ---- unit events ----

    fn on_unit_event(&mut self, slot: usize, generation: u64, event: UnitEvent) {
        let accepted = self.nodes.get(slot).is_some_and(|n| n.accepts(generation));
        if !accepted {
            debug!(worker_id = slot, generation, ?event, "discarding event from stale unit");
            return;
        }

        match event {
            UnitEvent::Online => self.on_online(slot),
            UnitEvent::Reply(reply) => self.on_reply(slot, reply),
            UnitEvent::Fatal { message } => {
                self.fail_node(slot, &message);
                self.tick();
            }
        }
    }

    fn on_online(&mut self, slot: usize) {
        if !self.nodes[slot].mark_online() {
            return;
        }
        info!(worker_id = slot, generation = self.nodes[slot].generation(), "worker online");
        self.emit(PoolEvent::WorkerOnline { worker: slot });

        if self.terminating {
            let _ = self.nodes[slot].send(WorkerCommand::Terminate);
            return;
        }
        self.check_ready();
        self.tick();
    }

    fn on_reply(&mut self, slot: usize, reply: TaskReply) {
        let max_jobs = self.config.max_jobs_per_worker;
        let TaskReply { id, body } = reply;

        if self.nodes[slot].take_orphan(&id) {
            self.nodes[slot].release_job(max_jobs);
            debug!(worker_id = slot, task_id = %id, "late reply for timed-out task discarded");
            self.tick();
            return;
        }

        let Some(entry) = self.take_in_flight(&id) else {
            debug!(worker_id = slot, task_id = %id, "reply for unknown task ignored");
            return;
        };
        self.nodes[entry.slot].release_job(max_jobs);

        let outcome = match body {
            ReplyBody::Data(value) => Ok(value),
            ReplyBody::Error(error) if entry.abort_requested => Err(TaskError::Aborted {
                id,
                reason: error.message,
            }),
            ReplyBody::Error(error) => Err(TaskError::Handler { id, error }),
        };
        debug!(worker_id = slot, task_id = %id, ok = outcome.is_ok(), "task finished");
        self.resolve(entry.task, outcome);
        self.tick();
    }

    fn on_deadline(&mut self, id: TaskId) {
        let Some(entry) = self.take_in_flight(&id) else {
            return;
        };

        let node = &mut self.nodes[entry.slot];
        node.orphan(id);
        if node.send(WorkerCommand::Abort { id }).is_err() {
            debug!(worker_id = entry.slot, task_id = %id, "could not signal abort to unit");
        }

        let timeout_ms = self.config.task_timeout_ms;
        warn!(
            worker_id = entry.slot,
            task_id = %id,
            handler = %entry.task.descriptor.handler,
            timeout_ms,
            "task timed out"
        );
        let error = TaskError::Timeout {
            id,
            handler: entry.task.descriptor.handler.clone(),
            timeout_ms,
            payload: entry.task.descriptor.payload.clone(),
        };
        self.resolve(entry.task, Err(error));
    }

    // ---- dispatch ----

    /// One evaluation of the dispatch loop.
    fn tick(&mut self) {
        if self.terminating {
            return;
        }
        self.respawn_lost();

        while !self.queue.is_empty() {
            if let Err(DispatchError::NoFreeWorker) = self.dispatch_next() {
                trace!(queued = self.queue.len(), "no free worker; waiting for next signal");
                return;
            }
        }
    }

    fn dispatch_next(&mut self) -> Result<(), DispatchError> {
        let slot = self
            .nodes
            .iter()
            .position(WorkerNode::is_available)
            .ok_or(DispatchError::NoFreeWorker)?;
        let Some(task) = self.queue.poll() else {
            return Ok(());
        };
        self.shared.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
        self.shared.counters.active_tasks.fetch_add(1, Ordering::Relaxed);

        let id = task.id;
        let command = WorkerCommand::Dispatch {
            id,
            handler: task.descriptor.handler.clone(),
            payload: task.descriptor.payload.clone(),
        };
        self.nodes[slot].acquire_job(self.config.max_jobs_per_worker);
        let timer = self.arm_deadline(id);
        debug!(
            worker_id = slot,
            task_id = %id,
            handler = %task.descriptor.handler,
            queued_ms = u64::try_from(task.submitted_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            "dispatching task"
        );
        self.processing.insert(
            id,
            InFlight {
                task,
                slot,
                timer,
                abort_requested: false,
            },
        );

        if self.nodes[slot].send(command).is_err() {
            self.fail_node(slot, "execution unit channel closed");
            let _ = self.signals.send(Signal::Tick);
        }
        Ok(())
    }

    fn arm_deadline(&self, id: TaskId) -> AbortHandle {
        let signals = self.signals.clone();
        let timeout = self.config.task_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = signals.send(Signal::Deadline { id });
        })
        .abort_handle()
    }

    // ---- worker lifecycle ----

    fn respawn_lost(&mut self) {
        for slot in 0..self.nodes.len() {
            if self.nodes[slot].needs_spawn() {
                self.spawn_slot(slot);
            }
        }
    }

    fn spawn_slot(&mut self, slot: usize) {
        let generation = self.nodes[slot].next_generation();
        let spec = UnitSpec {
            slot,
            generation,
            stack_size: self.config.resources.stack_size,
            registry: Arc::clone(&self.registry),
            data: Arc::clone(&self.context),
            signals: self.signals.clone(),
        };

        match unit::spawn_unit(spec) {
            Ok(handle) => {
                self.nodes[slot].attach(handle);
                if generation > 1 {
                    info!(worker_id = slot, generation, "worker respawned");
                    self.shared.counters.worker_respawns.fetch_add(1, Ordering::Relaxed);
                    self.emit(PoolEvent::WorkerRespawned {
                        worker: slot,
                        generation,
                    });
                } else {
                    debug!(worker_id = slot, "worker spawning");
                }
            }
            Err(e) => {
                error!(worker_id = slot, error = %e, "failed to spawn execution unit thread");
                let message = format!("failed to spawn execution unit: {e}");
                self.emit(PoolEvent::WorkerError {
                    worker: slot,
                    message,
                });
                if self.nodes[slot].record_spawn_failure(self.config.max_spawn_failures) {
                    self.on_retired(slot);
                } else {
                    let _ = self.signals.send(Signal::Tick);
                }
            }
        }
    }

    /// Take a slot down: its in-flight tasks fail with `WorkerFatal` and the
    /// slot goes `Off` until the next tick respawns it.
    fn fail_node(&mut self, slot: usize, message: &str) {
        let node = &mut self.nodes[slot];
        let never_online = node.status() == WorkerStatus::Spawning;
        // The unit thread has exited or will once its channel closes.
        drop(node.go_off().and_then(unit::UnitHandle::close));

        let lost: Vec<TaskId> = self
            .processing
            .iter()
            .filter(|(_, entry)| entry.slot == slot)
            .map(|(id, _)| *id)
            .collect();
        for id in lost {
            if let Some(entry) = self.take_in_flight(&id) {
                self.resolve(
                    entry.task,
                    Err(TaskError::WorkerFatal {
                        worker: slot,
                        message: message.to_string(),
                    }),
                );
            }
        }

        self.shared.counters.worker_crashes.fetch_add(1, Ordering::Relaxed);
        error!(worker_id = slot, %message, "worker lost");
        self.emit(PoolEvent::WorkerError {
            worker: slot,
            message: message.to_string(),
        });

        if never_online
            && !self.terminating
            && self.nodes[slot].record_spawn_failure(self.config.max_spawn_failures)
        {
            self.on_retired(slot);
        }
    }

    fn on_retired(&mut self, slot: usize) {
        error!(
            worker_id = slot,
            failures = self.config.max_spawn_failures,
            "worker slot retired after repeated start failures"
        );
        if !self.all_retired() {
            self.check_ready();
            return;
        }

        error!("every worker slot is retired; failing pending work");
        for task in self.queue.clear() {
            self.shared.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
            let outcome = Err(self.retired_error());
            self.resolve(task, outcome);
        }
        for waiter in std::mem::take(&mut self.ready_waiters) {
            let _ = waiter.send(Err(self.retired_pool_error()));
        }
    }

    fn check_ready(&mut self) {
        if self.ready {
            return;
        }
        let mut live = self.nodes.iter().filter(|n| !n.is_retired()).peekable();
        if live.peek().is_none() || !live.all(WorkerNode::is_ready) {
            return;
        }
        self.ready = true;
        info!(workers = self.nodes.len(), "worker pool ready");
        self.emit(PoolEvent::Ready);
        for waiter in std::mem::take(&mut self.ready_waiters) {
            let _ = waiter.send(Ok(()));
        }
    }

    fn all_retired(&self) -> bool {
        self.nodes.iter().all(WorkerNode::is_retired)
    }

    fn retired_error(&self) -> TaskError {
        TaskError::WorkerFatal {
            worker: self.nodes.len().saturating_sub(1),
            message: "no worker could be started".into(),
        }
    }

    fn retired_pool_error(&self) -> PoolError {
        PoolError::WorkerFatal {
            worker: self.nodes.len().saturating_sub(1),
            message: "no worker could be started".into(),
        }
    }

    // ---- termination ----

    fn begin_terminate(&mut self) {
        if self.terminating {
            return;
        }
        self.terminating = true;
        self.shared.terminated.store(true, Ordering::Release);
        info!(
            queued = self.queue.len(),
            in_flight = self.processing.len(),
            "terminating worker pool"
        );

        for task in self.queue.clear() {
            self.shared.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
            let id = task.id;
            self.resolve(
                task,
                Err(TaskError::Aborted {
                    id,
                    reason: "pool terminated".into(),
                }),
            );
        }
        for waiter in std::mem::take(&mut self.ready_waiters) {
            let _ = waiter.send(Err(PoolError::Terminated));
        }
        // Handlers that stop on the terminate signal report as aborted.
        for entry in self.processing.values_mut() {
            entry.abort_requested = true;
        }
        for node in &self.nodes {
            let _ = node.send(WorkerCommand::Terminate);
        }

        let signals = self.signals.clone();
        let grace = self.config.terminate_timeout();
        self.drain_timer = Some(
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let _ = signals.send(Signal::DrainElapsed);
            })
            .abort_handle(),
        );
    }

    fn drained(&self) -> bool {
        self.nodes.iter().all(|n| n.jobs() == 0)
    }

    /// Kill what is left and stop the loop.
    fn finish(&mut self) -> ControlFlow<()> {
        if let Some(timer) = self.drain_timer.take() {
            timer.abort();
        }

        let ids: Vec<TaskId> = self.processing.keys().copied().collect();
        for id in ids {
            if let Some(entry) = self.take_in_flight(&id) {
                self.resolve(
                    entry.task,
                    Err(TaskError::Aborted {
                        id,
                        reason: "pool terminated before task completed".into(),
                    }),
                );
            }
        }

        let threads: Vec<(usize, std::thread::JoinHandle<()>)> = self
            .nodes
            .iter_mut()
            .filter_map(|node| {
                let slot = node.slot();
                node.go_off()
                    .and_then(unit::UnitHandle::close)
                    .map(|thread| (slot, thread))
            })
            .collect();
        unit::join_units(threads, UNIT_JOIN_GRACE);
        self.nodes.clear();

        info!("worker pool terminated");
        self.emit(PoolEvent::Terminated);
        for waiter in std::mem::take(&mut self.terminate_waiters) {
            let _ = waiter.send(Ok(()));
        }
        ControlFlow::Break(())
    }

    // ---- bookkeeping ----

    fn take_in_flight(&mut self, id: &TaskId) -> Option<InFlight> {
        let entry = self.processing.remove(id)?;
        entry.timer.abort();
        self.shared.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
        Some(entry)
    }

    /// Count the outcome and deliver it.
    fn resolve(&self, task: QueuedTask, outcome: TaskOutcome) {
        let counters = &self.shared.counters;
        let counter = match &outcome {
            Ok(_) => &counters.completed_tasks,
            Err(TaskError::Timeout { .. }) => &counters.timed_out_tasks,
            Err(TaskError::Aborted { .. }) => &counters.aborted_tasks,
            Err(_) => &counters.failed_tasks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        task.complete(outcome);
    }

    fn emit(&self, event: PoolEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn sync_gauges(&self) {
        let counters = &self.shared.counters;
        let live = self.nodes.iter().filter(|n| !n.is_retired()).count();
        let online = self.nodes.iter().filter(|n| n.is_ready()).count();
        counters.workers.store(live as u64, Ordering::Relaxed);
        counters.online_workers.store(online as u64, Ordering::Relaxed);

        debug_assert_eq!(
            self.nodes.iter().map(WorkerNode::jobs).sum::<usize>(),
            self.processing.len() + self.nodes.iter().map(WorkerNode::orphan_count).sum::<usize>(),
            "job accounting drifted"
        );
    }
}

/// Orchestrator thread body.
pub(crate) fn run_thread(orchestrator: Orchestrator, signals: mpsc::UnboundedReceiver<Signal>) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to create orchestrator runtime");
            return;
        }
    };
    rt.block_on(orchestrator.run(signals));
    rt.shutdown_timeout(Duration::from_millis(100));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::build_queue;
    use crate::core::task::{CompletionSink, TaskDescriptor, TaskHandle};
    use crate::util::serde::Priority;
    use serde_json::json;
    use std::time::Instant;

    fn orchestrator(workers: usize) -> (Orchestrator, mpsc::UnboundedReceiver<Signal>) {
        let config = WorkerPoolConfig::new().with_max_workers(workers);
        let queue = build_queue(&config);
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(16);
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(HandlerRegistry::new()),
            queue,
            tx,
            Arc::new(PoolShared::default()),
            events,
        );
        (orchestrator, rx)
    }

    fn queued(id: TaskId, sink: CompletionSink) -> QueuedTask {
        QueuedTask {
            id,
            descriptor: TaskDescriptor::from_value("noop", json!(null)),
            priority: Priority::Normal,
            sink,
            submitted_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_closed_unit_fails_task() {
        let (mut orchestrator, mut rx) = orchestrator(1);
        let (commands, unit_side) = mpsc::unbounded_channel();
        drop(unit_side);
        orchestrator.nodes[0].next_generation();
        orchestrator.nodes[0].attach(unit::UnitHandle::new(commands, None));
        assert!(orchestrator.nodes[0].mark_online());

        let id = TaskId::new();
        let (handle, sink) = TaskHandle::pair(id);
        orchestrator.on_submit(queued(id, sink));
        orchestrator.sync_gauges();

        match handle.await {
            Err(TaskError::WorkerFatal { worker, message }) => {
                assert_eq!(worker, 0);
                assert!(message.contains("channel closed"), "{message}");
            }
            other => panic!("expected worker fatal, got {other:?}"),
        }
        assert_eq!(orchestrator.nodes[0].status(), WorkerStatus::Off);
        assert!(orchestrator.processing.is_empty());
        assert!(matches!(rx.try_recv(), Ok(Signal::Tick)));

        let stats = orchestrator.shared.counters.snapshot();
        assert_eq!(stats.failed_tasks, 1);
        assert_eq!(stats.worker_crashes, 1);
        assert_eq!(stats.active_tasks, 0);
        assert_eq!(stats.queued_tasks, 0);
    }

    #[tokio::test]
    async fn test_late_signals_are_answered() {
        let (orchestrator, _rx) = orchestrator(1);

        let id = TaskId::new();
        let (handle, sink) = TaskHandle::pair(id);
        orchestrator.reject(Signal::Submit(queued(id, sink)));
        assert_eq!(handle.await, Err(TaskError::PoolTerminated));

        let (reply, answer) = oneshot::channel();
        orchestrator.reject(Signal::Abort { id, reply });
        assert_eq!(answer.await.unwrap(), Err(PoolError::Terminated));

        let (reply, answer) = oneshot::channel();
        orchestrator.reject(Signal::Terminate { reply });
        assert_eq!(answer.await.unwrap(), Ok(()));
    }
}
