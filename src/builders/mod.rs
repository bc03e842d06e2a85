//! Builders to construct worker pools from configuration.

pub mod pool_builder;

pub use pool_builder::{build_queue, WorkerPoolBuilder};
