//! Tests for configuration validation

use prometheus_task_pool::config::{QueueKind, WorkerPoolConfig};
use prometheus_task_pool::infra::queue::PriorityOrder;

#[test]
fn test_worker_pool_config_validation() {
    assert!(WorkerPoolConfig::new().validate().is_ok());
    assert!(WorkerPoolConfig::new().with_max_workers(0).validate().is_err());
    assert!(WorkerPoolConfig::new().with_task_timeout_ms(0).validate().is_err());
    assert!(WorkerPoolConfig::new().with_stack_size(1024).validate().is_err());
}

#[test]
fn test_worker_pool_config_defaults() {
    let cfg = WorkerPoolConfig::default();
    assert_eq!(cfg.max_jobs_per_worker, 1);
    assert_eq!(cfg.task_timeout_ms, 15_000);
    assert_eq!(cfg.terminate_timeout_ms, 5_000);
    assert_eq!(cfg.queue, QueueKind::Priority);
    assert_eq!(cfg.priority_order, PriorityOrder::HighestFirst);
    assert_eq!(cfg.max_spawn_failures, 3);
    assert!(cfg.max_workers >= 1);
}

#[test]
fn test_worker_pool_config_from_json() {
    let cfg = WorkerPoolConfig::from_json_str(
        r#"{
            "max_workers": 3,
            "max_jobs_per_worker": 2,
            "queue": "fifo",
            "priority_order": "lowest_first",
            "persistent_context": {"model": "tiny"}
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.max_workers, 3);
    assert_eq!(cfg.capacity(), 6);
    assert_eq!(cfg.queue, QueueKind::Fifo);
    assert_eq!(cfg.priority_order, PriorityOrder::LowestFirst);
    assert_eq!(cfg.persistent_context["model"], "tiny");
    assert_eq!(cfg.task_timeout_ms, 15_000);
}

#[test]
fn test_worker_pool_config_from_json_rejects_invalid() {
    assert!(WorkerPoolConfig::from_json_str(r#"{"max_workers": 0}"#).is_err());
    assert!(WorkerPoolConfig::from_json_str(r#"{"queue": "lifo"}"#).is_err());
    assert!(WorkerPoolConfig::from_json_str("not json").is_err());
}
