//! Builder pattern implementations for easy test data construction.
//!
//! Provides fluent builders for:
//! - Task construction with sensible defaults
//! - TaskDraft construction for store create() tests

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};

use aof_core::{
    models::ts, GateState, Lease, Priority, Task, TaskDraft, TaskStatus,
};

/// Builder for constructing [`Task`] instances in tests.
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        let now = ts::now();
        Self {
            task: Task {
                schema_version: 1,
                id: "TASK-2026-01-15-001".to_string(),
                project: "fabric".to_string(),
                title: "Test task".to_string(),
                description: None,
                status: TaskStatus::Backlog,
                priority: Priority::Normal,
                routing: Default::default(),
                created_at: now,
                updated_at: now,
                last_transition_at: now,
                created_by: "tester".to_string(),
                depends_on: BTreeSet::new(),
                parent_id: None,
                lease: None,
                gate: None,
                required_runbook: None,
                metadata: BTreeMap::new(),
                content_hash: None,
                extra: BTreeMap::new(),
                body: String::new(),
            },
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.task.id = id.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.task.title = title.into();
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.task.project = project.into();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.task.routing.agent = Some(agent.into());
        self
    }

    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.task.routing.workflow = Some(workflow.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.task.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.task.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Lease held by `agent`, expiring `ttl_ms` from `acquired`.
    pub fn with_lease(mut self, agent: impl Into<String>, acquired: DateTime<Utc>, ttl_ms: i64) -> Self {
        self.task.lease = Some(Lease {
            agent: agent.into(),
            acquired_at: acquired,
            expires_at: acquired + Duration::milliseconds(ttl_ms),
            renew_count: 0,
        });
        self
    }

    /// Gate state sitting at `current` since `entered`, empty history.
    pub fn with_gate(mut self, current: impl Into<String>, entered: DateTime<Utc>) -> Self {
        self.task.gate = Some(GateState {
            current: current.into(),
            entered,
            history: Vec::new(),
        });
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.task
            .metadata
            .insert(key.into(), serde_yaml::Value::String(value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.task.body = body.into();
        self
    }

    /// Build the final Task.
    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for constructing [`TaskDraft`] instances in tests.
pub struct DraftBuilder {
    draft: TaskDraft,
}

impl Default for DraftBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DraftBuilder {
    pub fn new() -> Self {
        Self {
            draft: TaskDraft {
                project: "fabric".to_string(),
                title: "Test task".to_string(),
                created_by: "tester".to_string(),
                ..TaskDraft::default()
            },
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.draft.title = title.into();
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.draft.project = project.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.draft.priority = priority;
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.draft.routing.agent = Some(agent.into());
        self
    }

    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.draft.routing.workflow = Some(workflow.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.draft.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.draft.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.draft.body = body.into();
        self
    }

    pub fn build(self) -> TaskDraft {
        self.draft
    }
}
