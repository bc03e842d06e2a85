//! Builders to construct worker pools from configuration.

use crate::config::{QueueKind, WorkerPoolConfig};
use crate::core::{HandlerRegistry, PoolError, QueuedTask, TaskQueue, WorkerPool};
use crate::infra::queue::{FifoQueue, PriorityQueue};

/// Build the queue selected by `config.queue`.
#[must_use]
pub fn build_queue(config: &WorkerPoolConfig) -> Box<dyn TaskQueue<QueuedTask>> {
    match config.queue {
        QueueKind::Priority => Box::new(PriorityQueue::with_order(config.priority_order)),
        QueueKind::Fifo => Box::new(FifoQueue::new()),
    }
}

/// Step-by-step pool construction, for callers that want a custom queue
/// discipline or to assemble the registry separately.
///
/// ```rust,ignore
/// let pool = WorkerPoolBuilder::new(WorkerPoolConfig::from_env()?)
///     .registry(registry)
///     .queue(Box::new(MyFairQueue::default()))
///     .init()
///     .await?;
/// ```
#[derive(Default)]
pub struct WorkerPoolBuilder {
    config: WorkerPoolConfig,
    registry: HandlerRegistry,
    queue: Option<Box<dyn TaskQueue<QueuedTask>>>,
}

impl WorkerPoolBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            queue: None,
        }
    }

    /// Use `registry` for handler lookup and worker hooks.
    #[must_use]
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Mutable access to the registry, for registering handlers in place.
    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// Replace the queue chosen by `config.queue`.
    #[must_use]
    pub fn queue(mut self, queue: Box<dyn TaskQueue<QueuedTask>>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Start the pool without waiting for workers.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::new`].
    pub fn build(self) -> Result<WorkerPool, PoolError> {
        let queue = self.queue.unwrap_or_else(|| build_queue(&self.config));
        WorkerPool::start(self.config, self.registry, queue)
    }

    /// Start the pool and wait until every worker is online.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::init`].
    pub async fn init(self) -> Result<WorkerPool, PoolError> {
        let pool = self.build()?;
        pool.ready().await?;
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CompletionSink, TaskDescriptor};
    use crate::infra::queue::PriorityOrder;
    use crate::util::serde::{Priority, TaskId};
    use std::time::Instant;

    fn task(priority: Priority) -> QueuedTask {
        QueuedTask {
            id: TaskId::new(),
            descriptor: TaskDescriptor::from_value("noop", serde_json::Value::Null),
            priority,
            sink: CompletionSink::callback(|_| {}),
            submitted_at: Instant::now(),
        }
    }

    #[test]
    fn test_build_queue_respects_kind_and_order() {
        let mut fifo = build_queue(&WorkerPoolConfig::new().with_queue(QueueKind::Fifo));
        let low = task(Priority::Low);
        let low_id = low.id;
        fifo.add(low, Priority::Low);
        fifo.add(task(Priority::Urgent), Priority::Urgent);
        assert_eq!(fifo.poll().map(|t| t.id), Some(low_id));

        let mut lowest_first = build_queue(
            &WorkerPoolConfig::new().with_priority_order(PriorityOrder::LowestFirst),
        );
        lowest_first.add(task(Priority::Urgent), Priority::Urgent);
        lowest_first.add(task(Priority::Low), Priority::Low);
        assert_eq!(lowest_first.poll().map(|t| t.priority), Some(Priority::Low));
    }
}
