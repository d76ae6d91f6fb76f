use thiserror::Error;

use crate::models::TaskStatus;

/// Result type alias for fabric operations
pub type Result<T> = std::result::Result<T, AofError>;

/// Error taxonomy of the fabric core.
///
/// State-machine violations (`InvalidTransition`, `TerminalState`, lease and
/// gate errors) are surfaced to the caller, who decides how to react.
/// Per-file problems (`Parse`, `Schema`) become lint issues when encountered
/// during scans and are only returned directly from single-file operations.
/// `Fatal` is reserved for conditions the daemon cannot start under.
#[derive(Error, Debug)]
pub enum AofError {
    /// Lifecycle table forbids this status change
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// Terminal tasks reject edits
    #[error("Task {0} is in terminal status {1} and cannot be modified")]
    TerminalState(String, TaskStatus),

    /// Unknown task id or prefix
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Prefix lookup matched more than one task
    #[error("Ambiguous prefix '{prefix}' matches {count} tasks")]
    Ambiguous { prefix: String, count: usize },

    /// An unexpired lease by another agent is present
    #[error("Task {task} is already leased by {holder}")]
    AlreadyLeased { task: String, holder: String },

    /// Caller is not the lease holder
    #[error("Agent {agent} does not hold the lease on task {task}")]
    NotLeaseHolder { task: String, agent: String },

    /// Lease expired before the operation
    #[error("Lease on task {0} has expired")]
    LeaseExpired(String),

    /// Write would introduce a dependency cycle
    #[error("Dependency cycle detected involving task {0}")]
    CycleDetected(String),

    /// Malformed task file
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// Structurally valid file violating the schema
    #[error("Schema violation in {path}: {message}")]
    Schema { path: String, message: String },

    /// Invalid workflow declaration
    #[error("Invalid workflow '{workflow}': {message}")]
    Workflow { workflow: String, message: String },

    /// Gate engine rejected the requested outcome
    #[error("Invalid gate transition on task {task}: {message}")]
    InvalidGateTransition { task: String, message: String },

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecoverable condition; the daemon aborts with this message
    #[error("{0}")]
    Fatal(String),
}

impl AofError {
    /// Create a not found error for a task id
    pub fn not_found(id: &str) -> Self {
        Self::NotFound(id.to_string())
    }

    /// Create a transition error for the given pair
    pub fn invalid_transition(from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Create a parse error tied to a file path
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a schema violation tied to a file path
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error indicates a missing task
    pub fn is_not_found(&self) -> bool {
        matches!(self, AofError::NotFound(_))
    }

    /// Check if this error is a lifecycle or terminal-state violation
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            AofError::InvalidTransition { .. } | AofError::TerminalState(_, _)
        )
    }

    /// Check if this error is a lease violation
    pub fn is_lease_error(&self) -> bool {
        matches!(
            self,
            AofError::AlreadyLeased { .. }
                | AofError::NotLeaseHolder { .. }
                | AofError::LeaseExpired(_)
        )
    }

    /// Check if this error is per-file (lint material) rather than operational
    pub fn is_file_error(&self) -> bool {
        matches!(self, AofError::Parse { .. } | AofError::Schema { .. })
    }
}
