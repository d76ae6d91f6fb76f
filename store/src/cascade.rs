//! Dependency cascades: propagate completion and blocking to direct
//! dependents. Single hop only; indirect propagation rides on the
//! transitions a cascade itself induces.

use tracing::warn;

use aof_core::{Event, EventKind, Result, TaskFilter, TaskStatus};

use crate::store::{TaskStore, TransitionCtx};

impl TaskStore {
    /// Promote dependents of a completed task.
    ///
    /// Every task that lists `completed_id` in `dependsOn` and sits in
    /// `backlog` or `blocked` is promoted to `ready` once all of its
    /// dependencies are done; the rest are recorded as skipped. The summary
    /// event is emitted only when something was actually promoted, after all
    /// induced transitions have landed, so re-running the cascade is silent.
    pub(crate) async fn cascade_on_completion(&self, completed_id: &str, actor: &str) -> Result<()> {
        let all = self.list(TaskFilter::default()).await?;
        let done: std::collections::BTreeSet<&str> = all
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| t.id.as_str())
            .collect();

        let mut promoted = Vec::new();
        let mut skipped = Vec::new();

        for task in &all {
            if !task.depends_on.contains(completed_id) {
                continue;
            }
            if !matches!(task.status, TaskStatus::Backlog | TaskStatus::Blocked) {
                continue;
            }

            if task.depends_on.iter().all(|dep| done.contains(dep.as_str())) {
                let ctx = TransitionCtx::new(actor).with_reason("dependency_satisfied");
                match self.commit_transition(task.clone(), TaskStatus::Ready, &ctx).await {
                    Ok(_) => promoted.push(task.id.clone()),
                    Err(e) => {
                        warn!(task = %task.id, error = %e, "cascade promotion failed");
                        skipped.push(task.id.clone());
                    }
                }
            } else {
                skipped.push(task.id.clone());
            }
        }

        if !promoted.is_empty() {
            self.append_event(
                &Event::new(EventKind::DependencyCascaded, actor)
                    .with_task(completed_id)
                    .with_payload(serde_json::json!({
                        "trigger": "completion",
                        "promoted": promoted,
                        "skipped": skipped,
                    })),
            )
            .await?;
        }

        Ok(())
    }

    /// Block dependents of a blocked task (opt-in, config-gated).
    ///
    /// Direct dependents in `backlog` or `ready` move to `blocked` with a
    /// reason naming the upstream task. One hop, no recursion.
    pub(crate) async fn cascade_on_block(&self, blocked_id: &str, actor: &str) -> Result<()> {
        let all = self.list(TaskFilter::default()).await?;

        let mut blocked = Vec::new();
        for task in &all {
            if !task.depends_on.contains(blocked_id) {
                continue;
            }
            if !matches!(task.status, TaskStatus::Backlog | TaskStatus::Ready) {
                continue;
            }

            let ctx = TransitionCtx::new(actor)
                .with_reason(format!("upstream blocked: {blocked_id}"));
            match self.commit_transition(task.clone(), TaskStatus::Blocked, &ctx).await {
                Ok(_) => blocked.push(task.id.clone()),
                Err(e) => warn!(task = %task.id, error = %e, "cascade block failed"),
            }
        }

        if !blocked.is_empty() {
            self.append_event(
                &Event::new(EventKind::DependencyCascaded, actor)
                    .with_task(blocked_id)
                    .with_payload(serde_json::json!({
                        "trigger": "block",
                        "blocked": blocked,
                    })),
            )
            .await?;
        }

        Ok(())
    }
}
