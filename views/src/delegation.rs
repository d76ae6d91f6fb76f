//! Delegation artifacts: subtask pointers inside the parent's directory and
//! handoff files next to the child.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aof_core::Task;

use crate::sync::relative_link;

/// Desired artifact map for every parent → child relation:
///
/// - `tasks/{parent-status}/{parent-id}/subtasks/{child-id}.md`
/// - `tasks/{child-status}/{child-id}.handoff.md`
///
/// Children whose parent is missing get no artifacts; lint reports them.
pub fn desired(root: &Path, tasks: &[Task]) -> BTreeMap<PathBuf, String> {
    let by_id: BTreeMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut map = BTreeMap::new();
    for child in tasks {
        let Some(parent_id) = &child.parent_id else { continue };
        let Some(parent) = by_id.get(parent_id.as_str()) else { continue };

        let subtasks_dir = root
            .join("tasks")
            .join(parent.status.dir_name())
            .join(&parent.id)
            .join("subtasks");
        map.insert(
            subtasks_dir.join(child.file_name()),
            subtask_pointer(root, &subtasks_dir, parent, child),
        );

        let child_dir = root.join("tasks").join(child.status.dir_name());
        map.insert(
            child_dir.join(format!("{}.handoff.md", child.id)),
            handoff(root, &child_dir, parent, child),
        );
    }
    map
}

/// Whether a path under `tasks/` belongs to this projection (and may be
/// pruned by it). Canonical task files never match.
pub fn is_delegation_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.ends_with(".handoff.md") {
        return true;
    }
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n == "subtasks")
        .unwrap_or(false)
}

fn subtask_pointer(root: &Path, dir: &Path, parent: &Task, child: &Task) -> String {
    let canonical = root
        .join("tasks")
        .join(child.status.dir_name())
        .join(child.file_name());
    let link = relative_link(root, dir, &canonical);

    format!(
        "# Subtask {}: {}\n\n- status: `{}`\n- delegated from: `{}`\n\n[Subtask]({link})\n",
        child.id, child.title, child.status, parent.id
    )
}

fn handoff(root: &Path, dir: &Path, parent: &Task, child: &Task) -> String {
    let parent_canonical = root
        .join("tasks")
        .join(parent.status.dir_name())
        .join(parent.file_name());
    let child_canonical = root
        .join("tasks")
        .join(child.status.dir_name())
        .join(child.file_name());

    format!(
        "# Handoff for {}\n\nDelegated under {}.\n\n- [Parent task]({})\n- [This subtask]({})\n",
        child.id,
        parent.id,
        relative_link(root, dir, &parent_canonical),
        relative_link(root, dir, &child_canonical),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use aof_core::TaskStatus;
    use aof_testkit::TaskBuilder;

    #[test]
    fn test_parent_child_artifacts() {
        let root = Path::new("/data");
        let parent = TaskBuilder::new()
            .with_id("TASK-2026-01-15-001")
            .with_status(TaskStatus::InProgress)
            .build();
        let child = TaskBuilder::new()
            .with_id("TASK-2026-01-15-001-01")
            .with_parent("TASK-2026-01-15-001")
            .with_status(TaskStatus::Backlog)
            .build();

        let map = desired(root, &[parent, child]);
        assert_eq!(map.len(), 2);
        assert!(map.contains_key(
            &root.join("tasks/in-progress/TASK-2026-01-15-001/subtasks/TASK-2026-01-15-001-01.md")
        ));
        assert!(map.contains_key(&root.join("tasks/backlog/TASK-2026-01-15-001-01.handoff.md")));
    }

    #[test]
    fn test_orphan_child_gets_no_artifacts() {
        let root = Path::new("/data");
        let child = TaskBuilder::new()
            .with_id("TASK-2026-01-15-001-01")
            .with_parent("TASK-2026-01-15-001")
            .build();
        assert!(desired(root, &[child]).is_empty());
    }

    #[test]
    fn test_delegation_file_predicate() {
        assert!(is_delegation_file(Path::new(
            "/d/tasks/backlog/TASK-2026-01-15-001-01.handoff.md"
        )));
        assert!(is_delegation_file(Path::new(
            "/d/tasks/ready/TASK-2026-01-15-001/subtasks/TASK-2026-01-15-001-01.md"
        )));
        assert!(!is_delegation_file(Path::new(
            "/d/tasks/ready/TASK-2026-01-15-001.md"
        )));
    }
}
