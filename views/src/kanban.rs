//! Kanban projection: pointer files bucketed by `(swimlane, status)`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use aof_core::Task;

use crate::sync::{relative_link, sanitize_lane};

/// How tasks are grouped into swimlanes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KanbanMode {
    #[default]
    Priority,
    Project,
    Phase,
}

impl KanbanMode {
    pub fn dir_name(&self) -> &'static str {
        match self {
            KanbanMode::Priority => "priority",
            KanbanMode::Project => "project",
            KanbanMode::Phase => "phase",
        }
    }
}

impl std::fmt::Display for KanbanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl std::str::FromStr for KanbanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "priority" => Ok(KanbanMode::Priority),
            "project" => Ok(KanbanMode::Project),
            "phase" => Ok(KanbanMode::Phase),
            other => Err(format!("unknown kanban mode '{other}'")),
        }
    }
}

fn lane_for(mode: KanbanMode, task: &Task) -> String {
    match mode {
        KanbanMode::Priority => task.priority.to_string(),
        KanbanMode::Project => sanitize_lane(&task.project),
        KanbanMode::Phase => sanitize_lane(task.phase().unwrap_or("unassigned")),
    }
}

/// Desired pointer map: `views/kanban/{mode}/{lane}/{status}/{id}.md`.
pub fn desired(root: &Path, mode: KanbanMode, tasks: &[Task]) -> BTreeMap<PathBuf, String> {
    let mut map = BTreeMap::new();
    for task in tasks {
        let dir = root
            .join("views")
            .join("kanban")
            .join(mode.dir_name())
            .join(lane_for(mode, task))
            .join(task.status.dir_name());
        map.insert(dir.join(task.file_name()), pointer(root, &dir, task));
    }
    map
}

fn pointer(root: &Path, dir: &Path, task: &Task) -> String {
    let canonical = root
        .join("tasks")
        .join(task.status.dir_name())
        .join(task.file_name());
    let link = relative_link(root, dir, &canonical);

    let mut out = format!("# {}: {}\n\n", task.id, task.title);
    out.push_str(&format!("- status: `{}`\n", task.status));
    out.push_str(&format!("- priority: `{}`\n", task.priority));
    out.push_str(&format!("- project: `{}`\n", task.project));
    if let Some(agent) = &task.routing.agent {
        out.push_str(&format!("- agent: `{agent}`\n"));
    }
    out.push_str(&format!("\n[Canonical task]({link})\n"));
    out
}
