//! Tests for builder modules

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prometheus_task_pool::builders::WorkerPoolBuilder;
use prometheus_task_pool::config::WorkerPoolConfig;
use prometheus_task_pool::core::{
    HandlerRegistry, PoolError, QueuedTask, TaskContext, TaskDescriptor, TaskQueue,
};
use prometheus_task_pool::infra::FifoQueue;
use prometheus_task_pool::util::{Priority, TaskId};

/// FIFO queue that counts how many tasks passed through it.
struct CountingQueue {
    inner: FifoQueue<QueuedTask>,
    added: Arc<AtomicUsize>,
}

impl TaskQueue<QueuedTask> for CountingQueue {
    fn add(&mut self, item: QueuedTask, priority: Priority) {
        self.added.fetch_add(1, Ordering::SeqCst);
        self.inner.add(item, priority);
    }

    fn poll(&mut self) -> Option<QueuedTask> {
        self.inner.poll()
    }

    fn peek(&self) -> Option<&QueuedTask> {
        self.inner.peek()
    }

    fn remove(&mut self, id: &TaskId) -> Option<QueuedTask> {
        self.inner.remove(id)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn clear(&mut self) -> Vec<QueuedTask> {
        self.inner.clear()
    }
}

#[test]
fn test_builder_rejects_invalid_config() {
    let err = WorkerPoolBuilder::new(WorkerPoolConfig::new().with_max_jobs_per_worker(0))
        .build()
        .unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_builder_uses_custom_queue() {
    let added = Arc::new(AtomicUsize::new(0));
    let mut builder = WorkerPoolBuilder::new(WorkerPoolConfig::new().with_max_workers(1))
        .queue(Box::new(CountingQueue {
            inner: FifoQueue::new(),
            added: Arc::clone(&added),
        }));
    builder
        .registry_mut()
        .register_fn("double", |x: i64, _: &TaskContext| Ok(x * 2));
    let pool = builder.init().await.unwrap();

    let value: i64 = pool
        .submit(TaskDescriptor::new("double", &8).unwrap(), Priority::Normal)
        .unwrap()
        .join()
        .await
        .unwrap();
    assert_eq!(value, 16);
    assert_eq!(added.load(Ordering::SeqCst), 1);

    pool.terminate().await.unwrap();
}

#[tokio::test]
async fn test_builder_with_registry() {
    let mut registry = HandlerRegistry::new();
    registry.register_fn("echo", |s: String, _: &TaskContext| Ok(s));

    let pool = WorkerPoolBuilder::new(WorkerPoolConfig::new().with_max_workers(1))
        .registry(registry)
        .init()
        .await
        .unwrap();
    let echoed: String = pool
        .submit(TaskDescriptor::new("echo", &"hi").unwrap(), Priority::Low)
        .unwrap()
        .join()
        .await
        .unwrap();
    assert_eq!(echoed, "hi");
    pool.terminate().await.unwrap();
}
