//! Post-transition hooks.

use async_trait::async_trait;

use aof_core::{Task, TaskStatus};

/// Capability invoked after every authoritative status change (and after
/// task creation, which lands a task in `backlog`).
///
/// Hooks are best-effort: the store iterates the registered list once per
/// transition, logs failures, and never lets a hook abort or re-enter the
/// transition that triggered it.
#[async_trait]
pub trait TransitionHook: Send + Sync {
    /// Name used in log lines when the hook fails.
    fn name(&self) -> &str;

    /// Called with the task as written and the status it came from.
    async fn after_transition(&self, task: &Task, from: TaskStatus) -> anyhow::Result<()>;
}
