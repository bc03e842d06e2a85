//! Messages exchanged between the orchestrator and execution units.
//!
//! The orchestrator sends one [`WorkerCommand`] per control action; a unit
//! answers each dispatched task with exactly one [`TaskReply`] and reports
//! its own lifecycle out-of-band through [`UnitEvent`]. Only data crosses
//! this boundary: handlers are resolved by name inside the unit.

use serde::{Deserialize, Serialize};

use crate::core::error::HandlerError;
use crate::util::serde::TaskId;

/// Orchestrator → unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Run a task.
    Dispatch {
        /// Task identity, echoed back in the reply.
        id: TaskId,
        /// Registered handler name.
        handler: String,
        /// Handler input.
        payload: serde_json::Value,
    },
    /// Fire the abort signal of a running task.
    Abort {
        /// Task to abort.
        id: TaskId,
    },
    /// Abort everything and run the teardown hook.
    Terminate,
}

/// Result half of a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyBody {
    /// Handler returned a value.
    Data(serde_json::Value),
    /// Handler failed.
    Error(HandlerError),
}

/// Unit → orchestrator answer to a dispatch: `{id, data}` or
/// `{id, error: {message, stack}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReply {
    /// Task identity from the dispatch.
    pub id: TaskId,
    /// Outcome.
    #[serde(flatten)]
    pub body: ReplyBody,
}

impl TaskReply {
    /// Build a reply from a handler result.
    #[must_use]
    pub fn new(id: TaskId, result: Result<serde_json::Value, HandlerError>) -> Self {
        let body = match result {
            Ok(data) => ReplyBody::Data(data),
            Err(error) => ReplyBody::Error(error),
        };
        Self { id, body }
    }
}

/// Everything a unit reports to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UnitEvent {
    /// Init hook succeeded; the unit accepts dispatches.
    Online,
    /// A dispatched task finished.
    Reply(TaskReply),
    /// The unit died outside the context of a task result.
    Fatal {
        /// Crash description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_wire_shape() {
        let id = TaskId::new();
        let cmd = WorkerCommand::Dispatch {
            id,
            handler: "double".into(),
            payload: json!(21),
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"kind": "dispatch", "id": id.to_string(), "handler": "double", "payload": 21})
        );
        assert_eq!(
            serde_json::to_value(WorkerCommand::Terminate).unwrap(),
            json!({"kind": "terminate"})
        );
    }

    #[test]
    fn test_reply_wire_shape() {
        let id = TaskId::new();
        let ok = TaskReply::new(id, Ok(json!(42)));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"id": id.to_string(), "data": 42})
        );

        let failed = TaskReply::new(id, Err(HandlerError::new("boom")));
        let encoded = serde_json::to_value(&failed).unwrap();
        assert_eq!(
            encoded,
            json!({"id": id.to_string(), "error": {"message": "boom", "stack": null}})
        );
        let decoded: TaskReply = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, failed);
    }
}
