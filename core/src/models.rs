use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed-precision UTC timestamps.
///
/// Every timestamp in a task header is serialized as RFC-3339 with exactly
/// millisecond precision so the canonical serialization (and therefore the
/// content hash) is stable across round trips.
pub mod ts {
    use chrono::{DateTime, Duration, DurationRound, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Current time, truncated to millisecond precision.
    pub fn now() -> DateTime<Utc> {
        let now = Utc::now();
        now.duration_trunc(Duration::milliseconds(1)).unwrap_or(now)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    /// `Option<DateTime<Utc>>` variant for optional header fields.
    pub mod opt {
        use super::*;

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => super::serialize(dt, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            match raw {
                None => Ok(None),
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| Some(dt.with_timezone(&Utc)))
                    .map_err(serde::de::Error::custom),
            }
        }
    }
}

/// Primary lifecycle state of a task.
///
/// The status doubles as the name of the directory holding the task file,
/// so the kebab-case serde representation and [`TaskStatus::dir_name`] must
/// stay in lockstep.
///
/// # State Transitions
///
/// - `backlog` → `ready`, `cancelled`, `blocked`
/// - `ready` → `in-progress`, `blocked`, `deadletter`, `cancelled`
/// - `in-progress` → `review`, `blocked`, `done`, `cancelled`
/// - `blocked` → `ready`, `cancelled`
/// - `review` → `done`, `in-progress`, `blocked`, `cancelled`
/// - `deadletter` → `ready` (recovery only)
/// - `done`, `cancelled` → terminal
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Captured but not yet actionable
    Backlog,
    /// All prerequisites satisfied, waiting for a worker
    Ready,
    /// Exclusively leased by a worker agent
    InProgress,
    /// Cannot proceed until unblocked
    Blocked,
    /// Work finished, passing through review gates
    Review,
    /// Completed successfully
    Done,
    /// Abandoned deliberately
    Cancelled,
    /// Repeatedly failed; requires manual recovery
    Deadletter,
}

impl TaskStatus {
    /// Every status, in lifecycle order. Drives directory creation and scans.
    pub const ALL: [TaskStatus; 8] = [
        TaskStatus::Backlog,
        TaskStatus::Ready,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Review,
        TaskStatus::Done,
        TaskStatus::Cancelled,
        TaskStatus::Deadletter,
    ];

    /// Directory name under `tasks/` for this status.
    pub fn dir_name(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Deadletter => "deadletter",
        }
    }

    /// Reverse of [`TaskStatus::dir_name`]; `None` for non-standard directories.
    pub fn from_dir_name(name: &str) -> Option<TaskStatus> {
        TaskStatus::ALL.iter().copied().find(|s| s.dir_name() == name)
    }

    /// Terminal statuses admit no further transitions and reject edits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }

    /// Check whether the lifecycle table permits `self → new_status`.
    ///
    /// Same-status "transitions" return `false` here; the store treats them
    /// as a no-op success before consulting this table.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        use TaskStatus::*;

        match (*self, new_status) {
            (current, new) if current == new => false,

            (Backlog, Ready | Cancelled | Blocked) => true,
            (Ready, InProgress | Blocked | Deadletter | Cancelled) => true,
            (InProgress, Review | Blocked | Done | Cancelled) => true,
            (Blocked, Ready | Cancelled) => true,
            (Review, Done | InProgress | Blocked | Cancelled) => true,

            // Recovery is the only way out of the dead letter queue
            (Deadletter, Ready) => true,

            (Done | Cancelled, _) => false,

            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Task priority, from least to most urgent.
#[derive(
    Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Where a task should go: target agent, team, role, workflow, plus tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Routing {
    /// Assigned worker agent, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Owning team from the org chart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// Role expected to pick this up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Workflow (gate sequence) governing the review phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    /// Free-form labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Exclusive, time-bounded claim on an in-progress task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    /// Holding agent
    pub agent: String,
    #[serde(with = "ts")]
    pub acquired_at: DateTime<Utc>,
    #[serde(with = "ts")]
    pub expires_at: DateTime<Utc>,
    /// Times the holder has renewed
    pub renew_count: u32,
}

impl Lease {
    /// A lease is expired strictly after its expiry instant; at
    /// `expires_at == now` it is still held.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// One recorded gate transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateRecord {
    /// Gate the task was sitting at
    pub gate: String,
    /// Outcome string as submitted (e.g. `complete`, `needs_review`)
    pub outcome: String,
    #[serde(with = "ts")]
    pub at: DateTime<Utc>,
    pub actor: String,
}

/// Position of a task inside its workflow, plus the full audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateState {
    /// Current gate id, or [`GateState::COMPLETE`] once past the last gate
    pub current: String,
    /// When the current gate was entered
    #[serde(with = "ts")]
    pub entered: DateTime<Utc>,
    /// Every transition, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<GateRecord>,
}

impl GateState {
    /// Sentinel `current` value once the final gate has passed.
    pub const COMPLETE: &'static str = "complete";

    pub fn is_complete(&self) -> bool {
        self.current == Self::COMPLETE
    }
}

/// A persistent unit of work.
///
/// The struct doubles as the schema of the task file header: serde emits the
/// fields in declaration order, which is the canonical key order the content
/// hash is computed over. Unknown header keys are captured in [`Task::extra`]
/// and re-emitted on serialization, so foreign annotations survive a round
/// trip untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Header schema version; currently always 1
    pub schema_version: u32,
    /// Identifier matching `TASK-YYYY-MM-DD-NNN` with an optional `-NN`
    /// subtask suffix
    pub id: String,
    /// Opaque project key grouping tasks
    pub project: String,
    /// Brief task title
    pub title: String,
    /// Longer free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Current lifecycle state; must match the directory holding the file
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub routing: Routing,
    #[serde(with = "ts")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts")]
    pub updated_at: DateTime<Utc>,
    /// When the status last changed; never ahead of `updated_at`
    #[serde(with = "ts")]
    pub last_transition_at: DateTime<Utc>,
    /// Actor identity that created the task
    pub created_by: String,
    /// Upstream tasks that must reach `done` first. Kept sorted so the
    /// canonical serialization ignores insertion order.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
    /// Parent task for subtasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Present iff the task is leased (in-progress)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<Lease>,
    /// Workflow position, once the task has entered review
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateState>,
    /// Runbook the body must comply with (checked externally)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_runbook: Option<String>,
    /// Free-form typed map
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
    /// SHA-256 of the canonical serialization with this field omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Unknown header fields, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
    /// Markdown body below the header block; not part of the header itself
    #[serde(skip)]
    pub body: String,
}

impl Task {
    /// Check if the task can transition to the given status.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// File name of the canonical task file.
    pub fn file_name(&self) -> String {
        format!("{}.md", self.id)
    }

    /// Phase swimlane value: `metadata.phase` as a string, if set.
    pub fn phase(&self) -> Option<&str> {
        self.metadata.get("phase").and_then(|v| v.as_str())
    }
}

/// Input for creating a task. The store assigns id, status and timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    pub project: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub routing: Routing,
    pub created_by: String,
    pub depends_on: BTreeSet<String>,
    pub parent_id: Option<String>,
    pub required_runbook: Option<String>,
    pub metadata: BTreeMap<String, serde_yaml::Value>,
    pub body: String,
}

/// Merge patch over the mutable task fields.
///
/// `None` leaves a field untouched; the double-`Option` fields distinguish
/// "leave alone" from "clear".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub routing: Option<RoutingPatch>,
    pub depends_on: Option<BTreeSet<String>>,
}

/// Per-field merge patch for [`Routing`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingPatch {
    pub agent: Option<Option<String>>,
    pub team: Option<Option<String>>,
    pub role: Option<Option<String>>,
    pub workflow: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl RoutingPatch {
    /// Apply this patch on top of an existing routing block.
    pub fn apply(&self, routing: &mut Routing) {
        if let Some(agent) = &self.agent {
            routing.agent = agent.clone();
        }
        if let Some(team) = &self.team {
            routing.team = team.clone();
        }
        if let Some(role) = &self.role {
            routing.role = role.clone();
        }
        if let Some(workflow) = &self.workflow {
            routing.workflow = workflow.clone();
        }
        if let Some(tags) = &self.tags {
            routing.tags = tags.clone();
        }
    }
}

/// Filter criteria for listing tasks. Fields combine with AND logic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// Only tasks routed to this agent
    pub agent: Option<String>,
    /// Only tasks in this status
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(agent) = &self.agent {
            if task.routing.agent.as_deref() != Some(agent.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        true
    }
}
