//! Store-wide consistency checks.
//!
//! Lint scans every directory under `tasks/` (standard or not) and reports
//! problems as issues instead of failing: a corrupt file yields an issue,
//! never an error.

use std::collections::BTreeSet;
use std::path::PathBuf;

use aof_core::{serializer, AofError, Result, Task, TaskStatus};

use crate::store::TaskStore;

/// What kind of problem a lint issue describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintKind {
    /// File could not be parsed as a task
    ParseError,
    /// Parsed but violates the schema
    SchemaViolation,
    /// Task's `status` field disagrees with its directory
    DirectoryMismatch,
    /// Task file sits in a directory that is not a known status
    UnknownDirectory,
    /// Lease present on a task that is not in-progress
    LeaseWithoutInProgress,
    /// Stored content hash does not match the contents
    HashMismatch,
    /// `parentId` names a task that does not exist
    OrphanedSubtask,
}

impl std::fmt::Display for LintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LintKind::ParseError => "Parse error",
            LintKind::SchemaViolation => "Schema violation",
            LintKind::DirectoryMismatch => "Directory mismatch",
            LintKind::UnknownDirectory => "Unknown directory",
            LintKind::LeaseWithoutInProgress => "Lease without in-progress",
            LintKind::HashMismatch => "Content hash mismatch",
            LintKind::OrphanedSubtask => "Orphaned subtask",
        };
        f.write_str(s)
    }
}

/// One finding from [`TaskStore::lint`].
#[derive(Debug, Clone)]
pub struct LintIssue {
    pub kind: LintKind,
    pub path: PathBuf,
    pub task_id: Option<String>,
    pub message: String,
}

impl std::fmt::Display for LintIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.kind, self.message, self.path.display())
    }
}

impl TaskStore {
    /// Scan the whole task tree and report every inconsistency.
    pub async fn lint(&self) -> Result<Vec<LintIssue>> {
        let mut issues = Vec::new();
        let mut parsed: Vec<(PathBuf, Option<TaskStatus>, Task)> = Vec::new();

        let tasks_dir = self.tasks_dir();
        let mut dirs = match tokio::fs::read_dir(&tasks_dir).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(issues),
            Err(e) => return Err(e.into()),
        };

        while let Some(dir_entry) = dirs.next_entry().await? {
            if !dir_entry.path().is_dir() {
                continue;
            }
            let dir_name = dir_entry.file_name().to_string_lossy().into_owned();
            let status = TaskStatus::from_dir_name(&dir_name);

            let mut entries = tokio::fs::read_dir(dir_entry.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !Self::is_task_file(&name) || entry.path().is_dir() {
                    continue;
                }

                let raw = match tokio::fs::read_to_string(entry.path()).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        issues.push(LintIssue {
                            kind: LintKind::ParseError,
                            path: entry.path(),
                            task_id: None,
                            message: format!("unreadable file: {e}"),
                        });
                        continue;
                    }
                };

                match serializer::parse_task_file(&entry.path().display().to_string(), &raw) {
                    Ok(task) => parsed.push((entry.path(), status, task)),
                    Err(AofError::Schema { message, .. }) => issues.push(LintIssue {
                        kind: LintKind::SchemaViolation,
                        path: entry.path(),
                        task_id: None,
                        message,
                    }),
                    Err(e) => issues.push(LintIssue {
                        kind: LintKind::ParseError,
                        path: entry.path(),
                        task_id: None,
                        message: format!("{e}"),
                    }),
                }
            }
        }

        let known_ids: BTreeSet<&str> = parsed.iter().map(|(_, _, t)| t.id.as_str()).collect();

        for (path, dir_status, task) in &parsed {
            match dir_status {
                None => issues.push(LintIssue {
                    kind: LintKind::UnknownDirectory,
                    path: path.clone(),
                    task_id: Some(task.id.clone()),
                    message: "task file lives outside the standard status directories".to_string(),
                }),
                Some(status) if *status != task.status => issues.push(LintIssue {
                    kind: LintKind::DirectoryMismatch,
                    path: path.clone(),
                    task_id: Some(task.id.clone()),
                    message: format!(
                        "status field says '{}' but the file is under '{}'",
                        task.status, status
                    ),
                }),
                Some(_) => {}
            }

            if task.lease.is_some() && task.status != TaskStatus::InProgress {
                issues.push(LintIssue {
                    kind: LintKind::LeaseWithoutInProgress,
                    path: path.clone(),
                    task_id: Some(task.id.clone()),
                    message: format!("lease present while status is '{}'", task.status),
                });
            }

            match serializer::hash_matches(task) {
                Ok(true) => {}
                Ok(false) => issues.push(LintIssue {
                    kind: LintKind::HashMismatch,
                    path: path.clone(),
                    task_id: Some(task.id.clone()),
                    message: "stored contentHash does not match the file contents".to_string(),
                }),
                Err(e) => issues.push(LintIssue {
                    kind: LintKind::SchemaViolation,
                    path: path.clone(),
                    task_id: Some(task.id.clone()),
                    message: format!("could not compute content hash: {e}"),
                }),
            }

            if let Some(parent_id) = &task.parent_id {
                if !known_ids.contains(parent_id.as_str()) {
                    issues.push(LintIssue {
                        kind: LintKind::OrphanedSubtask,
                        path: path.clone(),
                        task_id: Some(task.id.clone()),
                        message: format!("parent {parent_id} does not exist"),
                    });
                }
            }
        }

        Ok(issues)
    }
}
