//! Worker pool configuration.

use std::env;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;
use crate::infra::queue::PriorityOrder;

/// Prefix of the environment variables read by [`WorkerPoolConfig::from_env`].
pub const ENV_PREFIX: &str = "TASK_POOL_";

/// Queue discipline selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Binary heap ordered by priority, FIFO among equal priorities.
    #[default]
    Priority,
    /// Strict insertion order.
    Fifo,
}

/// Resource limits handed to each execution unit when it is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerResources {
    /// Stack size of each worker thread in bytes.
    pub stack_size: usize,
}

impl Default for WorkerResources {
    fn default() -> Self {
        Self {
            stack_size: 2 * 1024 * 1024,
        }
    }
}

/// Configuration for a [`WorkerPool`](crate::core::WorkerPool).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of execution units. Defaults to the host's logical CPU count.
    pub max_workers: usize,
    /// Concurrent jobs one unit may run.
    pub max_jobs_per_worker: usize,
    /// Deadline for a dispatched task, in milliseconds.
    pub task_timeout_ms: u64,
    /// How long `terminate` waits for in-flight work before killing units.
    pub terminate_timeout_ms: u64,
    /// Queue discipline.
    pub queue: QueueKind,
    /// Which end of the priority order is dispatched first.
    pub priority_order: PriorityOrder,
    /// Per-unit resource limits.
    pub resources: WorkerResources,
    /// Data passed once to every unit's init hook.
    pub persistent_context: serde_json::Value,
    /// Consecutive start-up failures after which a slot is retired.
    pub max_spawn_failures: u32,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get(),
            max_jobs_per_worker: 1,
            task_timeout_ms: 15_000,
            terminate_timeout_ms: 5_000,
            queue: QueueKind::default(),
            priority_order: PriorityOrder::default(),
            resources: WorkerResources::default(),
            persistent_context: serde_json::Value::Null,
            max_spawn_failures: 3,
        }
    }
}

impl WorkerPoolConfig {
    /// Configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of execution units.
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the concurrent job limit per unit.
    #[must_use]
    pub fn with_max_jobs_per_worker(mut self, jobs: usize) -> Self {
        self.max_jobs_per_worker = jobs;
        self
    }

    /// Set the per-task deadline.
    #[must_use]
    pub fn with_task_timeout_ms(mut self, ms: u64) -> Self {
        self.task_timeout_ms = ms;
        self
    }

    /// Set the termination drain budget.
    #[must_use]
    pub fn with_terminate_timeout_ms(mut self, ms: u64) -> Self {
        self.terminate_timeout_ms = ms;
        self
    }

    /// Select the queue discipline.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueKind) -> Self {
        self.queue = queue;
        self
    }

    /// Select the priority polarity.
    #[must_use]
    pub fn with_priority_order(mut self, order: PriorityOrder) -> Self {
        self.priority_order = order;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.resources.stack_size = bytes;
        self
    }

    /// Set the data handed to every unit's init hook.
    #[must_use]
    pub fn with_persistent_context(mut self, context: serde_json::Value) -> Self {
        self.persistent_context = context;
        self
    }

    /// Set the consecutive start-up failure budget per slot.
    #[must_use]
    pub fn with_max_spawn_failures(mut self, failures: u32) -> Self {
        self.max_spawn_failures = failures;
        self
    }

    /// Per-task deadline as a `Duration`.
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Termination drain budget as a `Duration`.
    #[must_use]
    pub const fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    /// Upper bound on tasks in flight at once.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_workers * self.max_jobs_per_worker
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".into());
        }
        if self.max_jobs_per_worker == 0 {
            return Err("max_jobs_per_worker must be greater than 0".into());
        }
        if self.task_timeout_ms == 0 {
            return Err("task_timeout_ms must be greater than 0".into());
        }
        if self.terminate_timeout_ms == 0 {
            return Err("terminate_timeout_ms must be greater than 0".into());
        }
        if self.resources.stack_size < 64 * 1024 {
            return Err("resources.stack_size must be at least 64 KiB".into());
        }
        if self.max_spawn_failures == 0 {
            return Err("max_spawn_failures must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `TASK_POOL_*` environment variables, loading
    /// a `.env` file first if one exists. Unset variables keep defaults.
    ///
    /// Recognised: `TASK_POOL_MAX_WORKERS`, `TASK_POOL_MAX_JOBS_PER_WORKER`,
    /// `TASK_POOL_TASK_TIMEOUT_MS`, `TASK_POOL_TERMINATE_TIMEOUT_MS`,
    /// `TASK_POOL_QUEUE` (`priority`|`fifo`), `TASK_POOL_PRIORITY_ORDER`
    /// (`highest_first`|`lowest_first`), `TASK_POOL_STACK_SIZE`,
    /// `TASK_POOL_MAX_SPAWN_FAILURES`.
    ///
    /// # Errors
    ///
    /// Fails if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub(crate) fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut cfg = Self::default();

        if let Some(v) = read("MAX_WORKERS") {
            cfg.max_workers = v.parse().context("TASK_POOL_MAX_WORKERS")?;
        }
        if let Some(v) = read("MAX_JOBS_PER_WORKER") {
            cfg.max_jobs_per_worker = v.parse().context("TASK_POOL_MAX_JOBS_PER_WORKER")?;
        }
        if let Some(v) = read("TASK_TIMEOUT_MS") {
            cfg.task_timeout_ms = v.parse().context("TASK_POOL_TASK_TIMEOUT_MS")?;
        }
        if let Some(v) = read("TERMINATE_TIMEOUT_MS") {
            cfg.terminate_timeout_ms = v.parse().context("TASK_POOL_TERMINATE_TIMEOUT_MS")?;
        }
        if let Some(v) = read("QUEUE") {
            cfg.queue = serde_json::from_value(serde_json::Value::String(v))
                .context("TASK_POOL_QUEUE")?;
        }
        if let Some(v) = read("PRIORITY_ORDER") {
            cfg.priority_order = serde_json::from_value(serde_json::Value::String(v))
                .context("TASK_POOL_PRIORITY_ORDER")?;
        }
        if let Some(v) = read("STACK_SIZE") {
            cfg.resources.stack_size = v.parse().context("TASK_POOL_STACK_SIZE")?;
        }
        if let Some(v) = read("MAX_SPAWN_FAILURES") {
            cfg.max_spawn_failures = v.parse().context("TASK_POOL_MAX_SPAWN_FAILURES")?;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = WorkerPoolConfig::new();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_jobs_per_worker, 1);
        assert_eq!(cfg.max_workers, num_cpus::get());
        assert_eq!(cfg.queue, QueueKind::Priority);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TASK_POOL_MAX_WORKERS", "3"),
            ("TASK_POOL_MAX_JOBS_PER_WORKER", "2"),
            ("TASK_POOL_QUEUE", "fifo"),
            ("TASK_POOL_PRIORITY_ORDER", "lowest_first"),
        ]
        .into_iter()
        .collect();

        let cfg = WorkerPoolConfig::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(cfg.max_workers, 3);
        assert_eq!(cfg.max_jobs_per_worker, 2);
        assert_eq!(cfg.capacity(), 6);
        assert_eq!(cfg.queue, QueueKind::Fifo);
        assert_eq!(cfg.priority_order, PriorityOrder::LowestFirst);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = WorkerPoolConfig::from_lookup(|k| {
            (k == "TASK_POOL_TASK_TIMEOUT_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("TASK_POOL_TASK_TIMEOUT_MS"));
    }

    #[test]
    fn test_from_lookup_validates() {
        let err = WorkerPoolConfig::from_lookup(|k| {
            (k == "TASK_POOL_MAX_WORKERS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("max_workers"));
    }
}
