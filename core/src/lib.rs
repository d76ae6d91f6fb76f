//! Fabric Core Library
//!
//! Foundational domain models and pure logic for the Agentic Operations
//! Fabric. Everything here is side-effect free: the lifecycle state machine,
//! the task file serializer and content hash, workflow declarations, event
//! records, and the read-only collaborator config loaders. The filesystem
//! store, projections, and daemon build on these types.
//!
//! # Architecture
//!
//! - [`models`] - Task record, lifecycle statuses, leases, gate state
//! - [`error`] - Error taxonomy and result handling
//! - [`serializer`] - Task file parsing and canonical emission
//! - [`workflow`] - Gate sequences and their validation
//! - [`event`] - Audit event records
//! - [`config`] - `project.yaml` and org chart loaders
//! - [`validation`] - Identifier validation utilities

pub mod config;
pub mod error;
pub mod event;
pub mod models;
pub mod serializer;
pub mod validation;
pub mod workflow;

// Re-export commonly used types at the crate root for convenience
pub use config::{OrgChart, ProjectConfig};
pub use error::{AofError, Result};
pub use event::{Event, EventKind};
pub use models::{
    GateRecord, GateState, Lease, Priority, Routing, RoutingPatch, Task, TaskDraft, TaskFilter,
    TaskPatch, TaskStatus,
};
pub use workflow::{Gate, GateAction, RejectionStrategy, Workflow};

/// Current version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_re_exports() {
        let status = TaskStatus::InProgress;
        assert_eq!(format!("{status}"), "in-progress");

        let err = AofError::not_found("TASK-2026-01-15-001");
        assert!(err.is_not_found());
    }
}
