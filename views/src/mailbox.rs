//! Mailbox projection: per-agent folders mirroring where their tasks sit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aof_core::{Task, TaskStatus};

use crate::sync::{relative_link, sanitize_lane};

/// Mailbox folder for a status, if the status is mailbox-visible.
fn folder_for(status: TaskStatus) -> Option<&'static str> {
    match status {
        TaskStatus::Ready => Some("inbox"),
        TaskStatus::InProgress | TaskStatus::Blocked => Some("processing"),
        TaskStatus::Review => Some("outbox"),
        _ => None,
    }
}

/// Desired pointer map: `views/mailbox/{agent}/{folder}/{id}.md` for every
/// task with an assigned agent in a mailbox-visible status.
pub fn desired(root: &Path, tasks: &[Task]) -> BTreeMap<PathBuf, String> {
    let mut map = BTreeMap::new();
    for task in tasks {
        let Some(agent) = &task.routing.agent else { continue };
        let Some(folder) = folder_for(task.status) else { continue };

        let dir = root
            .join("views")
            .join("mailbox")
            .join(sanitize_lane(agent))
            .join(folder);
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

    format!(
        "# {}: {}\n\n- status: `{}`\n- priority: `{}`\n\n[Canonical task]({link})\n",
        task.id, task.title, task.status, task.priority
    )
}
