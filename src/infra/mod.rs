//! Infrastructure adapters: pluggable task queue backends.

pub mod queue;

pub use queue::{FifoQueue, PriorityQueue};
