//! Priority queue backed by an index-arena binary heap.
//!
//! Entries live in a `Vec` laid out as an implicit binary tree. A side index
//! maps each task identity to its slot so `remove` can cut an entry out of
//! the middle of the heap in O(log n). Which priority leaves first is decided
//! by an injected [`EntryOrder`]; entries of equal priority always leave in
//! insertion order.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{QueueItem, TaskQueue};
use crate::util::serde::{Priority, TaskId};

/// Strategy deciding which of two priorities is dispatched first.
pub trait EntryOrder: Send {
    /// `Ordering::Less` if a task with priority `a` should be dispatched
    /// before one with priority `b`.
    fn compare(&self, a: Priority, b: Priority) -> Ordering;
}

/// Built-in priority polarities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityOrder {
    /// `Urgent` before `Critical` before ... before `Low`.
    #[default]
    HighestFirst,
    /// `Low` before `Normal` before ... before `Urgent` (min-heap on rank).
    LowestFirst,
}

impl EntryOrder for PriorityOrder {
    fn compare(&self, a: Priority, b: Priority) -> Ordering {
        match self {
            Self::HighestFirst => b.cmp(&a),
            Self::LowestFirst => a.cmp(&b),
        }
    }
}

struct Entry<T> {
    priority: Priority,
    seq: u64,
    item: T,
}

/// Binary heap of tasks ordered by priority, FIFO among equal priorities.
pub struct PriorityQueue<T, O = PriorityOrder> {
    entries: Vec<Entry<T>>,
    positions: HashMap<TaskId, usize>,
    order: O,
    next_seq: u64,
}

impl<T> PriorityQueue<T, PriorityOrder> {
    /// Create an empty queue dispatching the highest priority first.
    #[must_use]
    pub fn new() -> Self {
        Self::with_order(PriorityOrder::default())
    }
}

impl<T> Default for PriorityQueue<T, PriorityOrder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, O> PriorityQueue<T, O> {
    /// Create an empty queue with a custom ordering strategy.
    pub fn with_order(order: O) -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            order,
            next_seq: 0,
        }
    }
}

impl<T: QueueItem, O: EntryOrder> PriorityQueue<T, O> {
    /// Whether the entry at `i` must leave before the entry at `j`.
    fn before(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.entries[i], &self.entries[j]);
        match self.order.compare(a.priority, b.priority) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => a.seq < b.seq,
        }
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        self.positions.insert(self.entries[i].item.task_id(), i);
        self.positions.insert(self.entries[j].item.task_id(), j);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.before(i, parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.before(right, left) {
                right
            } else {
                left
            };
            if !self.before(child, i) {
                break;
            }
            self.swap(child, i);
            i = child;
        }
    }

    fn remove_at(&mut self, i: usize) -> Option<T> {
        let last = self.entries.len().checked_sub(1)?;
        self.swap(i, last);
        let entry = self.entries.pop()?;
        self.positions.remove(&entry.item.task_id());
        if i < self.entries.len() {
            self.sift_down(i);
            self.sift_up(i);
        }
        Some(entry.item)
    }
}

impl<T, O> TaskQueue<T> for PriorityQueue<T, O>
where
    T: QueueItem + Send,
    O: EntryOrder,
{
    fn add(&mut self, item: T, priority: Priority) {
        let id = item.task_id();
        debug_assert!(!self.positions.contains_key(&id), "task {id} queued twice");
        let seq = self.next_seq;
        self.next_seq += 1;
        let index = self.entries.len();
        self.entries.push(Entry {
            priority,
            seq,
            item,
        });
        self.positions.insert(id, index);
        self.sift_up(index);
    }

    fn poll(&mut self) -> Option<T> {
        if self.entries.is_empty() {
            return None;
        }
        self.remove_at(0)
    }

    fn peek(&self) -> Option<&T> {
        self.entries.first().map(|entry| &entry.item)
    }

    fn remove(&mut self, id: &TaskId) -> Option<T> {
        let index = *self.positions.get(id)?;
        self.remove_at(index)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) -> Vec<T> {
        self.positions.clear();
        self.entries.drain(..).map(|entry| entry.item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Item(TaskId, &'static str);

    impl QueueItem for Item {
        fn task_id(&self) -> TaskId {
            self.0
        }
    }

    fn item(name: &'static str) -> Item {
        Item(TaskId::new(), name)
    }

    fn drain<Q: TaskQueue<Item>>(q: &mut Q) -> Vec<&'static str> {
        std::iter::from_fn(|| q.poll()).map(|i| i.1).collect()
    }

    #[test]
    fn test_highest_first() {
        let mut q = PriorityQueue::new();
        q.add(item("low"), Priority::Low);
        q.add(item("urgent"), Priority::Urgent);
        q.add(item("normal"), Priority::Normal);
        q.add(item("critical"), Priority::Critical);
        q.add(item("high"), Priority::High);

        assert_eq!(q.peek().map(|i| i.1), Some("urgent"));
        assert_eq!(
            drain(&mut q),
            vec!["urgent", "critical", "high", "normal", "low"]
        );
    }

    #[test]
    fn test_lowest_first() {
        let mut q = PriorityQueue::with_order(PriorityOrder::LowestFirst);
        q.add(item("urgent"), Priority::Urgent);
        q.add(item("low"), Priority::Low);
        q.add(item("high"), Priority::High);

        assert_eq!(drain(&mut q), vec!["low", "high", "urgent"]);
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut q = PriorityQueue::new();
        for name in ["a", "b", "c", "d", "e", "f"] {
            q.add(item(name), Priority::Normal);
        }
        q.add(item("first"), Priority::High);

        assert_eq!(drain(&mut q), vec!["first", "a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn test_remove_rebalances_and_keeps_order() {
        let mut q = PriorityQueue::new();
        let mut ids = Vec::new();
        let plan = [
            ("n1", Priority::Normal),
            ("h1", Priority::High),
            ("l1", Priority::Low),
            ("h2", Priority::High),
            ("n2", Priority::Normal),
            ("u1", Priority::Urgent),
            ("l2", Priority::Low),
        ];
        for (name, priority) in plan {
            let it = item(name);
            ids.push(it.0);
            q.add(it, priority);
        }

        assert_eq!(q.remove(&ids[3]).map(|i| i.1), Some("h2"));
        assert_eq!(q.remove(&ids[5]).map(|i| i.1), Some("u1"));
        assert!(q.remove(&ids[5]).is_none());
        assert_eq!(q.len(), 5);

        assert_eq!(drain(&mut q), vec!["h1", "n1", "n2", "l1", "l2"]);
    }

    #[test]
    fn test_remove_last_entry() {
        let mut q = PriorityQueue::new();
        let only = item("only");
        let id = only.0;
        q.add(only, Priority::Low);
        assert_eq!(q.remove(&id).map(|i| i.1), Some("only"));
        assert!(q.is_empty());
        assert!(q.poll().is_none());
    }

    #[test]
    fn test_custom_order_strategy() {
        struct Flat;
        impl EntryOrder for Flat {
            fn compare(&self, _a: Priority, _b: Priority) -> Ordering {
                Ordering::Equal
            }
        }

        let mut q = PriorityQueue::with_order(Flat);
        q.add(item("a"), Priority::Low);
        q.add(item("b"), Priority::Urgent);
        q.add(item("c"), Priority::Normal);
        assert_eq!(drain(&mut q), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_clear() {
        let mut q = PriorityQueue::new();
        let first = item("x");
        let id = first.0;
        q.add(first, Priority::High);
        q.add(item("y"), Priority::Low);
        assert_eq!(q.clear().len(), 2);
        assert!(q.remove(&id).is_none());
        assert!(q.is_empty());
    }
}
