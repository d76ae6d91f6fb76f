//! Append-only audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ts;

/// Every store-visible fact the fabric records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.transitioned")]
    TaskTransitioned,
    #[serde(rename = "task.lease.acquired")]
    LeaseAcquired,
    #[serde(rename = "task.lease.renewed")]
    LeaseRenewed,
    #[serde(rename = "task.lease.released")]
    LeaseReleased,
    #[serde(rename = "task.lease.expired")]
    LeaseExpired,
    #[serde(rename = "task.gate.transitioned")]
    GateTransitioned,
    #[serde(rename = "dependency.cascaded")]
    DependencyCascaded,
    #[serde(rename = "scheduler.poll")]
    SchedulerPoll,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::TaskCreated => "task.created",
            EventKind::TaskTransitioned => "task.transitioned",
            EventKind::LeaseAcquired => "task.lease.acquired",
            EventKind::LeaseRenewed => "task.lease.renewed",
            EventKind::LeaseReleased => "task.lease.released",
            EventKind::LeaseExpired => "task.lease.expired",
            EventKind::GateTransitioned => "task.gate.transitioned",
            EventKind::DependencyCascaded => "dependency.cascaded",
            EventKind::SchedulerPoll => "scheduler.poll",
        };
        f.write_str(s)
    }
}

/// One audit record, persisted as a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(with = "ts")]
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
    pub actor: String,
    /// Absent for system events like scheduler polls
    #[serde(rename = "taskId", default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(kind: EventKind, actor: impl Into<String>) -> Self {
        Self {
            ts: ts::now(),
            kind,
            actor: actor.into(),
            task_id: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event = Event::new(EventKind::TaskTransitioned, "worker-1")
            .with_task("TASK-2026-01-15-001")
            .with_payload(serde_json::json!({ "from": "ready", "to": "in-progress" }));

        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains(r#""kind":"task.transitioned""#));
        assert!(line.contains(r#""taskId":"TASK-2026-01-15-001""#));

        let back: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_system_event_omits_task_id() {
        let event = Event::new(EventKind::SchedulerPoll, "fabric");
        let line = serde_json::to_string(&event).unwrap();
        assert!(!line.contains("taskId"));
    }
}
