//! Canned configuration shared across test suites.

use std::collections::BTreeMap;

use aof_core::{Gate, ProjectConfig, RejectionStrategy, Workflow};

/// `implement → review → verify`, rejectable from the second gate on.
pub fn three_gate_workflow() -> Workflow {
    Workflow {
        name: "standard".to_string(),
        gates: vec![
            Gate {
                id: "implement".to_string(),
                role: "engineer".to_string(),
                can_reject: false,
                timeout: None,
                escalate_to: None,
            },
            Gate {
                id: "review".to_string(),
                role: "reviewer".to_string(),
                can_reject: true,
                timeout: Some("4h".to_string()),
                escalate_to: Some("lead".to_string()),
            },
            Gate {
                id: "verify".to_string(),
                role: "verifier".to_string(),
                can_reject: true,
                timeout: None,
                escalate_to: None,
            },
        ],
        rejection: RejectionStrategy::Origin,
        outcomes: BTreeMap::new(),
    }
}

/// Project config declaring [`three_gate_workflow`] as the default.
pub fn project_config() -> ProjectConfig {
    let mut workflows = BTreeMap::new();
    workflows.insert("standard".to_string(), three_gate_workflow());
    ProjectConfig {
        project: "fabric".to_string(),
        default_workflow: Some("standard".to_string()),
        workflows,
    }
}
