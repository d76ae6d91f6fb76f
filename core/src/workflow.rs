//! Workflow and gate declarations.
//!
//! A workflow is an ordered list of gates plus a rejection strategy,
//! declared per project in `project.yaml`. The declarations here are pure
//! data; the runtime that walks a task through them lives in the store.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AofError, Result};

/// One checkpoint inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Gate {
    /// Unique gate id within the workflow
    pub id: String,
    /// Role expected to sign off at this gate
    pub role: String,
    /// Whether this gate may send the task back to the origin gate
    #[serde(default)]
    pub can_reject: bool,
    /// Optional review timeout, e.g. `30m` or `4h`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Role to escalate to when the timeout lapses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
}

/// What an outcome string does to the gate cursor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    /// Move to the next gate; past the last gate this completes the workflow
    Advance,
    /// Return to the origin gate
    Reject,
}

/// How rejections rewind the cursor. Only `origin` exists today: a rejection
/// returns the task to the first gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RejectionStrategy {
    #[default]
    Origin,
}

/// Ordered gate sequence with its outcome table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Workflow name; filled from the `project.yaml` map key when omitted
    #[serde(default)]
    pub name: String,
    pub gates: Vec<Gate>,
    #[serde(default)]
    pub rejection: RejectionStrategy,
    /// Outcome string → action overrides. `complete → advance` and
    /// `needs_review → reject` are built in.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outcomes: BTreeMap<String, GateAction>,
}

fn timeout_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+[mh]$").expect("timeout regex"))
}

impl Workflow {
    /// Resolve an outcome string through the outcome table and defaults.
    pub fn action_for(&self, outcome: &str) -> Option<GateAction> {
        if let Some(action) = self.outcomes.get(outcome) {
            return Some(*action);
        }
        match outcome {
            "complete" => Some(GateAction::Advance),
            "needs_review" => Some(GateAction::Reject),
            _ => None,
        }
    }

    pub fn gate(&self, id: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.id == id)
    }

    pub fn gate_index(&self, id: &str) -> Option<usize> {
        self.gates.iter().position(|g| g.id == id)
    }

    pub fn first_gate(&self) -> Option<&Gate> {
        self.gates.first()
    }

    /// Gate after `id`, or `None` when `id` is the last gate.
    pub fn next_after(&self, id: &str) -> Option<&Gate> {
        let idx = self.gate_index(id)?;
        self.gates.get(idx + 1)
    }

    /// Validate the declaration. Called once at load time; an invalid
    /// workflow never reaches the gate engine.
    pub fn validate(&self) -> Result<()> {
        if self.gates.is_empty() {
            return Err(self.invalid("workflow has no gates"));
        }

        if self.gates[0].can_reject {
            return Err(self.invalid(format!(
                "first gate '{}' cannot declare canReject",
                self.gates[0].id
            )));
        }

        let mut seen = std::collections::BTreeSet::new();
        for gate in &self.gates {
            if !seen.insert(gate.id.as_str()) {
                return Err(self.invalid(format!("duplicate gate id '{}'", gate.id)));
            }
            if let Some(timeout) = &gate.timeout {
                if !timeout_re().is_match(timeout) {
                    return Err(self.invalid(format!(
                        "gate '{}' timeout '{timeout}' must match <number>[mh]",
                        gate.id
                    )));
                }
            }
            if let Some(escalate_to) = &gate.escalate_to {
                if escalate_to.is_empty() {
                    return Err(
                        self.invalid(format!("gate '{}' has an empty escalateTo", gate.id))
                    );
                }
            }
        }

        Ok(())
    }

    fn invalid(&self, message: impl Into<String>) -> AofError {
        AofError::Workflow {
            workflow: self.name.clone(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(id: &str, can_reject: bool) -> Gate {
        Gate {
            id: id.to_string(),
            role: "reviewer".to_string(),
            can_reject,
            timeout: None,
            escalate_to: None,
        }
    }

    fn three_gates() -> Workflow {
        Workflow {
            name: "standard".to_string(),
            gates: vec![gate("implement", false), gate("review", true), gate("verify", true)],
            rejection: RejectionStrategy::Origin,
            outcomes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_valid_workflow() {
        assert!(three_gates().validate().is_ok());
    }

    #[test]
    fn test_first_gate_cannot_reject() {
        let mut wf = three_gates();
        wf.gates[0].can_reject = true;
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_duplicate_gate_ids_rejected() {
        let mut wf = three_gates();
        wf.gates[2].id = "review".to_string();
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_timeout_format() {
        let mut wf = three_gates();
        wf.gates[1].timeout = Some("30m".to_string());
        assert!(wf.validate().is_ok());

        wf.gates[1].timeout = Some("2h".to_string());
        assert!(wf.validate().is_ok());

        wf.gates[1].timeout = Some("90s".to_string());
        assert!(wf.validate().is_err());

        wf.gates[1].timeout = Some("h".to_string());
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_empty_escalate_to_rejected() {
        let mut wf = three_gates();
        wf.gates[1].escalate_to = Some(String::new());
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_default_outcome_table() {
        let wf = three_gates();
        assert_eq!(wf.action_for("complete"), Some(GateAction::Advance));
        assert_eq!(wf.action_for("needs_review"), Some(GateAction::Reject));
        assert_eq!(wf.action_for("looks_fine"), None);
    }

    #[test]
    fn test_outcome_overrides() {
        let mut wf = three_gates();
        wf.outcomes.insert("ship_it".to_string(), GateAction::Advance);
        assert_eq!(wf.action_for("ship_it"), Some(GateAction::Advance));
    }

    #[test]
    fn test_gate_ordering() {
        let wf = three_gates();
        assert_eq!(wf.first_gate().map(|g| g.id.as_str()), Some("implement"));
        assert_eq!(wf.next_after("implement").map(|g| g.id.as_str()), Some("review"));
        assert_eq!(wf.next_after("verify").map(|g| g.id.as_str()), None);
        assert_eq!(wf.next_after("missing").map(|g| g.id.as_str()), None);
    }
}
