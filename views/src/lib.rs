//! Fabric Projection Engine
//!
//! Materialized, eventually-consistent read views over the authoritative
//! task store: a kanban board, per-agent mailboxes, and delegation
//! artifacts. Each projection computes its full desired set of pointer
//! files and reconciles it against disk: idempotent, atomic, pruning.
//!
//! Projections are wired into the store as a post-transition hook and can
//! be force-rebuilt at any time; a missed sync is repaired by the next one.

pub mod delegation;
pub mod kanban;
pub mod mailbox;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use aof_core::{serializer, Result, Task, TaskStatus};
use aof_store::TransitionHook;

pub use kanban::KanbanMode;
pub use sync::SyncStats;

/// Materializes every projection under the data directory.
pub struct ProjectionEngine {
    root: PathBuf,
    kanban_mode: KanbanMode,
}

impl ProjectionEngine {
    pub fn new(root: impl Into<PathBuf>, kanban_mode: KanbanMode) -> Self {
        Self {
            root: root.into(),
            kanban_mode,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the canonical task tree directly from disk. The engine never
    /// calls back into the store, so a sync can safely run inside a
    /// transition hook. Unreadable files are skipped.
    pub async fn scan_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for status in TaskStatus::ALL {
            let dir = self.root.join("tasks").join(status.dir_name());
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.ends_with(".md") || name.ends_with(".handoff.md") || entry.path().is_dir()
                {
                    continue;
                }
                let raw = match tokio::fs::read_to_string(entry.path()).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "skipping unreadable task");
                        continue;
                    }
                };
                match serializer::parse_task_file(&entry.path().display().to_string(), &raw) {
                    Ok(task) => tasks.push(task),
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "skipping unparseable task")
                    }
                }
            }
        }
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    /// Synchronize every projection against the given task snapshot.
    pub async fn sync_all(&self, tasks: &[Task]) -> Result<SyncStats> {
        let mut stats = SyncStats::default();
        stats.merge(self.sync_kanban(tasks).await?);
        stats.merge(self.sync_mailbox(tasks).await?);
        stats.merge(self.sync_delegation(tasks).await?);
        debug!(
            written = stats.written,
            removed = stats.removed,
            unchanged = stats.unchanged,
            "projection sync complete"
        );
        Ok(stats)
    }

    /// Scan the store and synchronize everything.
    pub async fn rebuild(&self) -> Result<SyncStats> {
        let tasks = self.scan_tasks().await?;
        self.sync_all(&tasks).await
    }

    /// Kanban pointers under `views/kanban/`. Pruning covers the whole
    /// kanban root, so switching swimlane mode clears the old layout.
    pub async fn sync_kanban(&self, tasks: &[Task]) -> Result<SyncStats> {
        let desired = kanban::desired(&self.root, self.kanban_mode, tasks);
        sync::reconcile(&self.root.join("views").join("kanban"), &desired, |_| true).await
    }

    /// Mailbox pointers under `views/mailbox/`.
    pub async fn sync_mailbox(&self, tasks: &[Task]) -> Result<SyncStats> {
        let desired = mailbox::desired(&self.root, tasks);
        sync::reconcile(&self.root.join("views").join("mailbox"), &desired, |_| true).await
    }

    /// Delegation artifacts inside `tasks/`. Only files this projection
    /// owns (handoffs and `subtasks/` pointers) are ever pruned.
    pub async fn sync_delegation(&self, tasks: &[Task]) -> Result<SyncStats> {
        let desired = delegation::desired(&self.root, tasks);
        sync::reconcile(
            &self.root.join("tasks"),
            &desired,
            delegation::is_delegation_file,
        )
        .await
    }
}

/// Store hook keeping projections in sync after every transition.
pub struct ProjectionHook {
    engine: Arc<ProjectionEngine>,
}

impl ProjectionHook {
    pub fn new(engine: Arc<ProjectionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TransitionHook for ProjectionHook {
    fn name(&self) -> &str {
        "projection-sync"
    }

    async fn after_transition(&self, _task: &Task, _from: TaskStatus) -> anyhow::Result<()> {
        self.engine.rebuild().await?;
        Ok(())
    }
}
