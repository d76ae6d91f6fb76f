//! Read-only collaborator configuration: `project.yaml` and the org chart.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{AofError, Result},
    workflow::Workflow,
};

/// Per-project configuration: workflow declarations plus the default pick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: String,
    /// Workflow used when a task's routing does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_workflow: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub workflows: BTreeMap<String, Workflow>,
}

impl ProjectConfig {
    /// Load and validate `project.yaml`. Every declared workflow is
    /// validated here so the gate engine never sees a bad one.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: ProjectConfig = serde_yaml::from_str(&raw)
            .map_err(|e| AofError::parse(path.display().to_string(), e.to_string()))?;

        for (name, workflow) in config.workflows.iter_mut() {
            if workflow.name.is_empty() {
                workflow.name = name.clone();
            }
            workflow.validate()?;
        }

        if let Some(default) = &config.default_workflow {
            if !config.workflows.contains_key(default) {
                return Err(AofError::Workflow {
                    workflow: default.clone(),
                    message: "defaultWorkflow names an undeclared workflow".to_string(),
                });
            }
        }

        Ok(config)
    }

    /// Resolve the workflow for a task: its routing choice first, then the
    /// project default.
    pub fn resolve_workflow(&self, requested: Option<&str>) -> Option<&Workflow> {
        let name = requested.or(self.default_workflow.as_deref())?;
        self.workflows.get(name)
    }
}

/// Roles and teams from `org/org-chart.yaml`. Read-only; the fabric only
/// logs against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OrgChart {
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OrgChart {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw)
            .map_err(|e| AofError::parse(path.display().to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT_YAML: &str = r#"
project: fabric
defaultWorkflow: standard
workflows:
  standard:
    gates:
      - id: implement
        role: engineer
      - id: review
        role: reviewer
        canReject: true
        timeout: 4h
        escalateTo: lead
      - id: verify
        role: verifier
        canReject: true
    rejection: origin
"#;

    #[test]
    fn test_load_project_config() {
        let dir = std::env::temp_dir().join("aof-core-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("project.yaml");
        std::fs::write(&path, PROJECT_YAML).unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.project, "fabric");

        let wf = config.resolve_workflow(None).unwrap();
        assert_eq!(wf.name, "standard");
        assert_eq!(wf.gates.len(), 3);
        assert!(wf.gates[1].can_reject);

        assert!(config.resolve_workflow(Some("missing")).is_none());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_bad_default_workflow_rejected() {
        let dir = std::env::temp_dir().join("aof-core-config-test2");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("project.yaml");
        std::fs::write(
            &path,
            "project: fabric\ndefaultWorkflow: nope\nworkflows: {}\n",
        )
        .unwrap();

        assert!(ProjectConfig::load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
