//! Tests for utility functions

use prometheus_task_pool::util::{Priority, TaskId};

#[test]
fn test_priority_ordering() {
    assert!(Priority::Urgent > Priority::Critical);
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Normal);
    assert!(Priority::Normal > Priority::Low);
    assert_eq!(Priority::default(), Priority::Low);
}

#[test]
fn test_priority_serde_names() {
    assert_eq!(serde_json::to_value(Priority::High).unwrap(), "high");
    let parsed: Priority = serde_json::from_str("\"urgent\"").unwrap();
    assert_eq!(parsed, Priority::Urgent);
}

#[test]
fn test_task_ids_are_unique() {
    let ids: std::collections::HashSet<TaskId> = (0..1000).map(|_| TaskId::new()).collect();
    assert_eq!(ids.len(), 1000);
}

#[test]
fn test_task_id_round_trips_through_string() {
    let id = TaskId::new();
    let parsed: TaskId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
}
