//! Tests for queue backends through the `TaskQueue` contract

use std::time::Instant;

use prometheus_task_pool::core::{CompletionSink, QueuedTask, TaskDescriptor, TaskQueue};
use prometheus_task_pool::infra::queue::{FifoQueue, PriorityOrder, PriorityQueue};
use prometheus_task_pool::util::{Priority, TaskId};

fn task(label: &str, priority: Priority) -> QueuedTask {
    QueuedTask {
        id: TaskId::new(),
        descriptor: TaskDescriptor::from_value("record", serde_json::json!(label)),
        priority,
        sink: CompletionSink::callback(|_| {}),
        submitted_at: Instant::now(),
    }
}

fn drain(queue: &mut dyn TaskQueue<QueuedTask>) -> Vec<String> {
    std::iter::from_fn(|| queue.poll())
        .map(|t| t.descriptor.payload.as_str().unwrap_or_default().to_string())
        .collect()
}

fn fill(queue: &mut dyn TaskQueue<QueuedTask>) -> TaskId {
    let mut removable = None;
    for (label, priority) in [
        ("a-low", Priority::Low),
        ("b-urgent", Priority::Urgent),
        ("c-normal", Priority::Normal),
        ("d-urgent", Priority::Urgent),
        ("e-low", Priority::Low),
    ] {
        let t = task(label, priority);
        if label == "c-normal" {
            removable = Some(t.id);
        }
        queue.add(t, priority);
    }
    removable.unwrap()
}

#[test]
fn test_priority_queue_highest_first() {
    let mut queue: PriorityQueue<QueuedTask> = PriorityQueue::new();
    fill(&mut queue);
    assert_eq!(
        drain(&mut queue),
        vec!["b-urgent", "d-urgent", "c-normal", "a-low", "e-low"]
    );
}

#[test]
fn test_priority_queue_lowest_first() {
    let mut queue: PriorityQueue<QueuedTask> = PriorityQueue::with_order(PriorityOrder::LowestFirst);
    fill(&mut queue);
    assert_eq!(
        drain(&mut queue),
        vec!["a-low", "e-low", "c-normal", "b-urgent", "d-urgent"]
    );
}

#[test]
fn test_remove_keeps_remaining_order() {
    let mut queue: PriorityQueue<QueuedTask> = PriorityQueue::new();
    let id = fill(&mut queue);
    assert!(queue.remove(&id).is_some());
    assert!(queue.remove(&id).is_none());
    assert_eq!(queue.len(), 4);
    assert_eq!(drain(&mut queue), vec!["b-urgent", "d-urgent", "a-low", "e-low"]);
}

#[test]
fn test_fifo_queue_ignores_priority() {
    let mut queue: FifoQueue<QueuedTask> = FifoQueue::new();
    let id = fill(&mut queue);
    assert_eq!(queue.peek().map(|t| t.priority), Some(Priority::Low));
    queue.remove(&id);
    assert_eq!(drain(&mut queue), vec!["a-low", "b-urgent", "d-urgent", "e-low"]);
    assert!(queue.is_empty());
}

#[test]
fn test_clear_returns_everything() {
    let mut queue: PriorityQueue<QueuedTask> = PriorityQueue::new();
    fill(&mut queue);
    assert_eq!(queue.clear().len(), 5);
    assert!(queue.is_empty());
    assert!(queue.poll().is_none());
}
