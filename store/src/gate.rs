//! Gate engine: the secondary state machine layered over task status.
//!
//! The workflow declarations live in `aof-core`; this module walks a task
//! through them, keeping gate history, driving `status → done` on
//! completion and the loop-back to `in-progress` on rejection.

use aof_core::{
    models::ts, AofError, Event, EventKind, GateAction, GateRecord, GateState, Result, Task,
    TaskStatus,
};

use crate::store::{TaskStore, TransitionCtx};

/// Metrics sink for gate activity. The daemon attaches its Prometheus
/// registry through this; the store itself stays metrics-agnostic.
pub trait GateObserver: Send + Sync {
    /// Time spent at `gate` before this outcome, in seconds.
    fn gate_duration(&self, workflow: &str, gate: &str, outcome: &str, seconds: f64);
    /// Cursor movement between gates (`complete` counts as a target).
    fn gate_transition(&self, from_gate: &str, to_gate: &str);
    fn gate_rejection(&self, workflow: &str, gate: &str);
}

/// Caller-supplied context for a gate transition.
#[derive(Debug, Clone, Default)]
pub struct GateContext {
    pub actor: String,
    pub summary: Option<String>,
    pub rejection_notes: Option<String>,
}

impl GateContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ..Self::default()
        }
    }
}

impl TaskStore {
    /// Apply an outcome at the task's current gate.
    ///
    /// The outcome string resolves through the workflow's outcome table
    /// (defaults: `complete → advance`, `needs_review → reject`). Advancing
    /// past the last gate completes the workflow and transitions the task to
    /// `done`; a rejection rewinds the cursor to the origin gate and reverts
    /// the status to `in-progress` if it is not there already.
    pub async fn transition_gate(
        &self,
        id: &str,
        outcome: &str,
        ctx: GateContext,
    ) -> Result<Task> {
        let task = self.require(id).await?;

        let workflow = self
            .project
            .as_ref()
            .and_then(|p| p.resolve_workflow(task.routing.workflow.as_deref()))
            .ok_or_else(|| AofError::InvalidGateTransition {
                task: task.id.clone(),
                message: "no workflow configured for this task".to_string(),
            })?
            .clone();

        let gate = task.gate.clone().ok_or_else(|| AofError::InvalidGateTransition {
            task: task.id.clone(),
            message: "task has not entered a workflow".to_string(),
        })?;
        if gate.is_complete() {
            return Err(AofError::InvalidGateTransition {
                task: task.id.clone(),
                message: "workflow is already complete".to_string(),
            });
        }

        let current = workflow
            .gate(&gate.current)
            .ok_or_else(|| AofError::InvalidGateTransition {
                task: task.id.clone(),
                message: format!("gate '{}' is not declared in workflow '{}'", gate.current, workflow.name),
            })?
            .clone();

        let action = workflow
            .action_for(outcome)
            .ok_or_else(|| AofError::InvalidGateTransition {
                task: task.id.clone(),
                message: format!("unknown outcome '{outcome}' for workflow '{}'", workflow.name),
            })?;

        let now = ts::now();
        let elapsed = (now - gate.entered).num_milliseconds().max(0);
        for observer in &self.gate_observers {
            observer.gate_duration(&workflow.name, &current.id, outcome, elapsed as f64 / 1000.0);
        }

        match action {
            GateAction::Advance => {
                self.advance_gate(task, &workflow, gate, &current.id, outcome, now, elapsed, &ctx)
                    .await
            }
            GateAction::Reject => {
                self.reject_gate(task, &workflow, gate, &current, outcome, now, elapsed, &ctx)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn advance_gate(
        &self,
        mut task: Task,
        workflow: &aof_core::Workflow,
        mut gate: GateState,
        current: &str,
        outcome: &str,
        now: chrono::DateTime<chrono::Utc>,
        elapsed_ms: i64,
        ctx: &GateContext,
    ) -> Result<Task> {
        gate.history.push(GateRecord {
            gate: current.to_string(),
            outcome: outcome.to_string(),
            at: now,
            actor: ctx.actor.clone(),
        });

        let next_id = workflow
            .next_after(current)
            .map(|g| g.id.clone())
            .unwrap_or_else(|| GateState::COMPLETE.to_string());

        for observer in &self.gate_observers {
            observer.gate_transition(current, &next_id);
        }

        gate.current = next_id.clone();
        gate.entered = now;
        task.gate = Some(gate);

        let task = if next_id == GateState::COMPLETE {
            if !task.status.can_transition_to(TaskStatus::Done) {
                return Err(AofError::invalid_transition(task.status, TaskStatus::Done));
            }
            let tctx = TransitionCtx::new(ctx.actor.as_str()).with_reason("workflow_complete");
            let task = self.commit_transition(task, TaskStatus::Done, &tctx).await?;
            self.emit_gate_event(&task, workflow, current, &next_id, outcome, elapsed_ms, ctx)
                .await?;
            self.cascade_on_completion(&task.id, &ctx.actor).await?;
            task
        } else {
            self.rewrite_in_place(&mut task).await?;
            self.emit_gate_event(&task, workflow, current, &next_id, outcome, elapsed_ms, ctx)
                .await?;
            task
        };

        Ok(task)
    }

    #[allow(clippy::too_many_arguments)]
    async fn reject_gate(
        &self,
        mut task: Task,
        workflow: &aof_core::Workflow,
        mut gate: GateState,
        current: &aof_core::Gate,
        outcome: &str,
        now: chrono::DateTime<chrono::Utc>,
        elapsed_ms: i64,
        ctx: &GateContext,
    ) -> Result<Task> {
        let index = workflow.gate_index(&current.id).unwrap_or(0);
        if !current.can_reject || index == 0 {
            return Err(AofError::InvalidGateTransition {
                task: task.id.clone(),
                message: format!("gate '{}' cannot reject", current.id),
            });
        }

        // Origin strategy: every rejection returns to the first gate
        let origin = match workflow.first_gate() {
            Some(first) => first.id.clone(),
            None => {
                return Err(AofError::InvalidGateTransition {
                    task: task.id.clone(),
                    message: format!("workflow '{}' has no gates", workflow.name),
                })
            }
        };

        for observer in &self.gate_observers {
            observer.gate_rejection(&workflow.name, &current.id);
        }

        gate.history.push(GateRecord {
            gate: current.id.clone(),
            outcome: outcome.to_string(),
            at: now,
            actor: ctx.actor.clone(),
        });
        gate.current = origin.clone();
        gate.entered = now;
        task.gate = Some(gate);

        let task = if task.status != TaskStatus::InProgress {
            if !task.status.can_transition_to(TaskStatus::InProgress) {
                return Err(AofError::invalid_transition(task.status, TaskStatus::InProgress));
            }
            let tctx = TransitionCtx::new(ctx.actor.as_str()).with_reason("gate_rejected");
            self.commit_transition(task, TaskStatus::InProgress, &tctx).await?
        } else {
            self.rewrite_in_place(&mut task).await?;
            task
        };

        self.emit_gate_event(&task, workflow, &current.id, &origin, outcome, elapsed_ms, ctx)
            .await?;
        Ok(task)
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_gate_event(
        &self,
        task: &Task,
        workflow: &aof_core::Workflow,
        from_gate: &str,
        to_gate: &str,
        outcome: &str,
        elapsed_ms: i64,
        ctx: &GateContext,
    ) -> Result<()> {
        self.append_event(
            &Event::new(EventKind::GateTransitioned, ctx.actor.as_str())
                .with_task(task.id.as_str())
                .with_payload(serde_json::json!({
                    "workflow": workflow.name,
                    "fromGate": from_gate,
                    "toGate": to_gate,
                    "outcome": outcome,
                    "durationMs": elapsed_ms,
                    "summary": ctx.summary,
                    "rejectionNotes": ctx.rejection_notes,
                })),
        )
        .await
    }
}
