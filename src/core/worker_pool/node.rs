//! Per-slot worker bookkeeping: lifecycle status, in-flight job count and the
//! handle of the execution unit currently occupying the slot.

use std::collections::HashSet;

use crate::core::protocol::WorkerCommand;
use crate::util::serde::TaskId;

use super::unit::UnitHandle;

/// Lifecycle status of a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerStatus {
    /// Unit started, init hook not finished yet.
    Spawning,
    /// Accepting dispatches.
    Online,
    /// At `max_jobs_per_worker`.
    Busy,
    /// No live unit. Respawned on the next tick unless retired.
    Off,
}

pub(crate) struct WorkerNode {
    slot: usize,
    status: WorkerStatus,
    jobs: usize,
    /// Timed-out tasks still running inside the unit. Each one keeps its job
    /// slot until the unit replies.
    orphans: HashSet<TaskId>,
    generation: u64,
    spawn_failures: u32,
    retired: bool,
    unit: Option<UnitHandle>,
}

impl WorkerNode {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            slot,
            status: WorkerStatus::Off,
            jobs: 0,
            orphans: HashSet::new(),
            generation: 0,
            spawn_failures: 0,
            retired: false,
            unit: None,
        }
    }

    pub(crate) const fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) const fn status(&self) -> WorkerStatus {
        self.status
    }

    pub(crate) const fn jobs(&self) -> usize {
        self.jobs
    }

    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) const fn is_retired(&self) -> bool {
        self.retired
    }

    pub(crate) fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Online with spare job capacity.
    pub(crate) fn is_available(&self) -> bool {
        self.status == WorkerStatus::Online
    }

    pub(crate) fn is_ready(&self) -> bool {
        matches!(self.status, WorkerStatus::Online | WorkerStatus::Busy)
    }

    pub(crate) fn needs_spawn(&self) -> bool {
        self.status == WorkerStatus::Off && !self.retired
    }

    /// Whether an event tagged with `generation` comes from the unit that
    /// currently occupies this slot.
    pub(crate) fn accepts(&self, generation: u64) -> bool {
        self.generation == generation && self.status != WorkerStatus::Off
    }

    /// Reserve the next generation number for a unit about to be spawned.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub(crate) fn attach(&mut self, unit: UnitHandle) {
        debug_assert_eq!(self.status, WorkerStatus::Off);
        self.unit = Some(unit);
        self.status = WorkerStatus::Spawning;
        self.jobs = 0;
        self.orphans.clear();
    }

    /// `Spawning → Online`. Returns `false` if the node was not spawning.
    pub(crate) fn mark_online(&mut self) -> bool {
        if self.status != WorkerStatus::Spawning {
            return false;
        }
        self.status = WorkerStatus::Online;
        self.spawn_failures = 0;
        true
    }

    pub(crate) fn acquire_job(&mut self, max_jobs: usize) {
        debug_assert!(self.jobs < max_jobs, "slot {} over capacity", self.slot);
        self.jobs += 1;
        if self.jobs >= max_jobs {
            self.status = WorkerStatus::Busy;
        }
    }

    pub(crate) fn release_job(&mut self, max_jobs: usize) {
        self.jobs = self.jobs.saturating_sub(1);
        if self.status == WorkerStatus::Busy && self.jobs < max_jobs {
            self.status = WorkerStatus::Online;
        }
    }

    pub(crate) fn orphan(&mut self, id: TaskId) {
        self.orphans.insert(id);
    }

    pub(crate) fn take_orphan(&mut self, id: &TaskId) -> bool {
        self.orphans.remove(id)
    }

    /// Count a unit that died before reaching `Online`. Returns `true` once
    /// the slot has been retired.
    pub(crate) fn record_spawn_failure(&mut self, max_failures: u32) -> bool {
        self.spawn_failures += 1;
        if self.spawn_failures >= max_failures {
            self.retired = true;
        }
        self.retired
    }

    /// Mark the slot lost and hand back its unit handle, if any.
    pub(crate) fn go_off(&mut self) -> Option<UnitHandle> {
        self.status = WorkerStatus::Off;
        self.jobs = 0;
        self.orphans.clear();
        self.unit.take()
    }

    /// Send a command to the live unit. The command is returned if the slot
    /// has no unit or the unit's channel is closed.
    pub(crate) fn send(&self, command: WorkerCommand) -> Result<(), WorkerCommand> {
        match &self.unit {
            Some(unit) if self.status != WorkerStatus::Off => unit.send(command),
            _ => Err(command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn spawned(slot: usize) -> (WorkerNode, mpsc::UnboundedReceiver<WorkerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut node = WorkerNode::new(slot);
        node.next_generation();
        node.attach(UnitHandle::new(tx, None));
        (node, rx)
    }

    #[test]
    fn test_new_node_needs_spawn() {
        let node = WorkerNode::new(0);
        assert_eq!(node.status(), WorkerStatus::Off);
        assert!(node.needs_spawn());
        assert!(!node.is_available());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let (mut node, _rx) = spawned(0);
        assert_eq!(node.status(), WorkerStatus::Spawning);
        assert!(!node.is_available());

        assert!(node.mark_online());
        assert!(!node.mark_online());
        assert!(node.is_available());

        node.acquire_job(2);
        assert_eq!(node.status(), WorkerStatus::Online);
        node.acquire_job(2);
        assert_eq!(node.status(), WorkerStatus::Busy);
        assert_eq!(node.jobs(), 2);

        node.release_job(2);
        assert_eq!(node.status(), WorkerStatus::Online);
        assert_eq!(node.jobs(), 1);
    }

    #[test]
    fn test_orphan_keeps_job_until_reply() {
        let (mut node, _rx) = spawned(0);
        node.mark_online();
        node.acquire_job(1);
        let id = TaskId::new();
        node.orphan(id);
        assert_eq!(node.status(), WorkerStatus::Busy);
        assert_eq!(node.orphan_count(), 1);

        assert!(node.take_orphan(&id));
        node.release_job(1);
        assert!(!node.take_orphan(&id));
        assert!(node.is_available());
    }

    #[test]
    fn test_go_off_resets_and_rejects_stale_generation() {
        let (mut node, _rx) = spawned(3);
        node.mark_online();
        node.acquire_job(1);
        let generation = node.generation();
        assert!(node.accepts(generation));

        assert!(node.go_off().is_some());
        assert_eq!(node.jobs(), 0);
        assert!(!node.accepts(generation));
        assert!(node.needs_spawn());
        assert!(node.send(WorkerCommand::Terminate).is_err());

        let next = node.next_generation();
        assert_eq!(next, generation + 1);
    }

    #[test]
    fn test_spawn_failures_retire_slot() {
        let mut node = WorkerNode::new(0);
        assert!(!node.record_spawn_failure(3));
        assert!(!node.record_spawn_failure(3));
        assert!(node.record_spawn_failure(3));
        assert!(node.is_retired());
        assert!(!node.needs_spawn());
    }

    #[test]
    fn test_send_reaches_unit() {
        let (node, mut rx) = spawned(0);
        node.send(WorkerCommand::Terminate).unwrap();
        assert_eq!(rx.try_recv().unwrap(), WorkerCommand::Terminate);
    }
}
