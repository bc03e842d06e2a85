//! Strict insertion-order queue.

use std::collections::VecDeque;

use crate::core::{QueueItem, TaskQueue};
use crate::util::serde::{Priority, TaskId};

/// First-in first-out queue. The priority passed to `add` is ignored.
pub struct FifoQueue<T> {
    items: VecDeque<T>,
}

impl<T> FifoQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: QueueItem + Send> TaskQueue<T> for FifoQueue<T> {
    fn add(&mut self, item: T, _priority: Priority) {
        self.items.push_back(item);
    }

    fn poll(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    fn remove(&mut self, id: &TaskId) -> Option<T> {
        let index = self.items.iter().position(|item| item.task_id() == *id)?;
        // VecDeque::remove shifts the shorter side, keeping relative order.
        self.items.remove(index)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn clear(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }
}
