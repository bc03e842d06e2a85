//! Tests for error types

use prometheus_task_pool::core::{HandlerError, PoolError, TaskError};
use prometheus_task_pool::util::TaskId;

#[test]
fn test_terminated_error() {
    assert_eq!(format!("{}", PoolError::Terminated), "pool has been terminated");
}

#[test]
fn test_task_not_found_error() {
    let id = TaskId::new();
    assert_eq!(
        format!("{}", PoolError::TaskNotFound(id)),
        format!("task {id} was not found")
    );
}

#[test]
fn test_unknown_handler_error() {
    let err = PoolError::UnknownHandler("resize".to_string());
    assert_eq!(format!("{}", err), "no handler registered under `resize`");
}

#[test]
fn test_timeout_error_names_handler() {
    let id = TaskId::new();
    let err = TaskError::Timeout {
        id,
        handler: "resize".to_string(),
        timeout_ms: 100,
        payload: serde_json::json!({"w": 10}),
    };
    assert_eq!(
        format!("{}", err),
        format!("task {id} (`resize`) timed out after 100ms")
    );
}

#[test]
fn test_handler_error_wire_shape() {
    let err = HandlerError::new("boom").with_stack("at resize()");
    let encoded = serde_json::to_value(&err).unwrap();
    assert_eq!(
        encoded,
        serde_json::json!({"message": "boom", "stack": "at resize()"})
    );

    let decoded: HandlerError = serde_json::from_str(r#"{"message": "boom"}"#).unwrap();
    assert_eq!(decoded, HandlerError::new("boom"));
}

#[test]
fn test_worker_fatal_message() {
    let err = TaskError::WorkerFatal {
        worker: 2,
        message: "handler panicked: oops".to_string(),
    };
    assert_eq!(err.message(), "handler panicked: oops");
    assert_eq!(format!("{}", err), "worker 2 failed: handler panicked: oops");
}
