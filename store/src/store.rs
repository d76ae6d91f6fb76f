//! The authoritative, file-system-backed task store.
//!
//! Each task lives as a single markdown file inside the directory named by
//! its status. All mutations are atomic renames; the store is the only
//! writer (enforced process-wide by the daemon's PID lock).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use aof_core::{
    models::ts, serializer, validation, AofError, Event, EventKind, ProjectConfig, Result, Task,
    TaskDraft, TaskFilter, TaskPatch, TaskStatus,
};

use crate::{events::EventLog, fsio, gate::GateObserver, hooks::TransitionHook};

/// Actor identity the fabric uses for its own mutations (cascades, sweeps).
pub const FABRIC_ACTOR: &str = "fabric";

/// Bounded retries when a freshly chosen task id collides on disk.
const CREATE_RETRIES: u32 = 5;

/// Who is asking for a transition, and why.
#[derive(Debug, Clone)]
pub struct TransitionCtx {
    pub actor: String,
    pub reason: Option<String>,
}

impl TransitionCtx {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// File-backed task repository with the lifecycle state machine enforced on
/// every write.
pub struct TaskStore {
    root: PathBuf,
    events: EventLog,
    hooks: Vec<Arc<dyn TransitionHook>>,
    pub(crate) gate_observers: Vec<Arc<dyn GateObserver>>,
    pub(crate) project: Option<ProjectConfig>,
    cascade_on_block: bool,
}

impl TaskStore {
    /// Create a store rooted at the data directory. Call [`TaskStore::init`]
    /// before first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let events = EventLog::new(root.join("events"));
        Self {
            root,
            events,
            hooks: Vec::new(),
            gate_observers: Vec::new(),
            project: None,
            cascade_on_block: false,
        }
    }

    /// Attach the project configuration (workflow declarations).
    pub fn with_project_config(mut self, project: ProjectConfig) -> Self {
        self.project = Some(project);
        self
    }

    /// Enable the opt-in blocking cascade.
    pub fn with_cascade_on_block(mut self, enabled: bool) -> Self {
        self.cascade_on_block = enabled;
        self
    }

    /// Register a post-transition hook.
    pub fn add_hook(&mut self, hook: Arc<dyn TransitionHook>) {
        self.hooks.push(hook);
    }

    /// Register a gate observer (metrics sink).
    pub fn add_gate_observer(&mut self, observer: Arc<dyn GateObserver>) {
        self.gate_observers.push(observer);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }

    pub fn status_dir(&self, status: TaskStatus) -> PathBuf {
        self.tasks_dir().join(status.dir_name())
    }

    pub fn task_path(&self, status: TaskStatus, id: &str) -> PathBuf {
        self.status_dir(status).join(format!("{id}.md"))
    }

    /// Create the status directories and the event log directory.
    pub async fn init(&self) -> Result<()> {
        for status in TaskStatus::ALL {
            tokio::fs::create_dir_all(self.status_dir(status)).await?;
        }
        self.events.init().await?;
        Ok(())
    }

    /// Canonical task files end in `.md`; delegation handoff pointers end in
    /// `.handoff.md` and are skipped everywhere the store scans.
    pub(crate) fn is_task_file(name: &str) -> bool {
        name.ends_with(".md") && !name.ends_with(".handoff.md")
    }

    pub(crate) async fn load_task(&self, path: &Path) -> Result<Task> {
        let raw = tokio::fs::read_to_string(path).await?;
        serializer::parse_task_file(&path.display().to_string(), &raw)
    }

    async fn write_task(&self, task: &Task) -> Result<()> {
        let contents = serializer::serialize_task(task)?;
        fsio::write_atomic(&self.task_path(task.status, &task.id), &contents).await?;
        Ok(())
    }

    /// Locate a task file by exact id across all status directories.
    async fn find(&self, id: &str) -> Result<Option<(TaskStatus, PathBuf)>> {
        for status in TaskStatus::ALL {
            let path = self.task_path(status, id);
            if tokio::fs::try_exists(&path).await? {
                return Ok(Some((status, path)));
            }
        }
        Ok(None)
    }

    /// Exact lookup. Parse errors on the found file are surfaced.
    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        match self.find(id).await? {
            None => Ok(None),
            Some((_, path)) => Ok(Some(self.load_task(&path).await?)),
        }
    }

    /// Exact lookup that fails with [`AofError::NotFound`].
    pub async fn require(&self, id: &str) -> Result<Task> {
        self.get(id).await?.ok_or_else(|| AofError::not_found(id))
    }

    /// Unique-prefix lookup. An exact id wins even when subtask ids extend
    /// it; otherwise the prefix must match exactly one task.
    pub async fn get_by_prefix(&self, prefix: &str) -> Result<Option<Task>> {
        if let Some(task) = self.get(prefix).await? {
            return Ok(Some(task));
        }

        let mut matches: Vec<PathBuf> = Vec::new();
        for status in TaskStatus::ALL {
            let dir = self.status_dir(status);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if Self::is_task_file(&name) && name.starts_with(prefix) {
                    matches.push(entry.path());
                }
            }
        }

        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(self.load_task(&matches[0]).await?)),
            count => Err(AofError::Ambiguous {
                prefix: prefix.to_string(),
                count,
            }),
        }
    }

    /// Scan tasks matching the filter. Unreadable files are skipped with a
    /// warning; they surface through [`TaskStore::lint`] instead.
    pub async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let statuses: Vec<TaskStatus> = match filter.status {
            Some(status) => vec![status],
            None => TaskStatus::ALL.to_vec(),
        };

        let mut tasks = Vec::new();
        for status in statuses {
            let dir = self.status_dir(status);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !Self::is_task_file(&name) || entry.path().is_dir() {
                    continue;
                }
                match self.load_task(&entry.path()).await {
                    Ok(task) => {
                        if filter.matches(&task) {
                            tasks.push(task);
                        }
                    }
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "skipping unreadable task file");
                    }
                }
            }
        }

        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    /// O(1)-per-directory status counts via `readdir`.
    pub async fn count_by_status(&self) -> Result<BTreeMap<TaskStatus, usize>> {
        let mut counts = BTreeMap::new();
        for status in TaskStatus::ALL {
            let dir = self.status_dir(status);
            let mut count = 0usize;
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    counts.insert(status, 0);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if Self::is_task_file(&name) && !entry.path().is_dir() {
                    count += 1;
                }
            }
            counts.insert(status, count);
        }
        Ok(counts)
    }

    /// Create a task in `backlog`, assigning the next id for today (or the
    /// next subtask suffix under the draft's parent).
    pub async fn create(&self, draft: TaskDraft) -> Result<Task> {
        if draft.title.trim().is_empty() {
            return Err(AofError::schema("<draft>", "title cannot be empty"));
        }
        if draft.project.trim().is_empty() {
            return Err(AofError::schema("<draft>", "project cannot be empty"));
        }
        if let Some(agent) = &draft.routing.agent {
            validation::validate_agent_name(agent)?;
        }

        if let Some(parent_id) = &draft.parent_id {
            if validation::is_subtask_id(parent_id) {
                return Err(AofError::schema(
                    "<draft>",
                    format!("parent {parent_id} is itself a subtask; only one level of nesting is allowed"),
                ));
            }
            self.require(parent_id).await?;
        }

        for dep in &draft.depends_on {
            self.require(dep).await?;
        }

        let now = ts::now();
        let mut seq = self.next_sequence(&draft, now).await?;

        for _ in 0..CREATE_RETRIES {
            let id = match &draft.parent_id {
                Some(parent) => format!("{parent}-{seq:02}"),
                None => format!("TASK-{}-{seq:03}", now.format("%Y-%m-%d")),
            };
            let path = self.task_path(TaskStatus::Backlog, &id);
            if tokio::fs::try_exists(&path).await? {
                seq += 1;
                continue;
            }

            let mut task = Task {
                schema_version: 1,
                id,
                project: draft.project.clone(),
                title: draft.title.clone(),
                description: draft.description.clone(),
                status: TaskStatus::Backlog,
                priority: draft.priority,
                routing: draft.routing.clone(),
                created_at: now,
                updated_at: now,
                last_transition_at: now,
                created_by: draft.created_by.clone(),
                depends_on: draft.depends_on.clone(),
                parent_id: draft.parent_id.clone(),
                lease: None,
                gate: None,
                required_runbook: draft.required_runbook.clone(),
                metadata: draft.metadata.clone(),
                content_hash: None,
                extra: BTreeMap::new(),
                body: serializer::normalize_body(&draft.body),
            };
            task.content_hash = Some(serializer::content_hash(&task)?);
            self.write_task(&task).await?;

            self.events
                .append(
                    &Event::new(EventKind::TaskCreated, draft.created_by.as_str())
                        .with_task(task.id.as_str())
                        .with_payload(serde_json::json!({
                            "project": task.project,
                            "title": task.title,
                            "parentId": task.parent_id,
                        })),
                )
                .await?;

            self.run_hooks(&task, TaskStatus::Backlog).await;
            return Ok(task);
        }

        Err(AofError::Fatal(format!(
            "could not allocate a task id after {CREATE_RETRIES} attempts"
        )))
    }

    /// Highest used sequence + 1 for today's date (or the parent's subtasks),
    /// scanning every status directory so terminal tasks still reserve ids.
    async fn next_sequence(
        &self,
        draft: &TaskDraft,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<u32> {
        let prefix = match &draft.parent_id {
            Some(parent) => format!("{parent}-"),
            None => format!("TASK-{}-", now.format("%Y-%m-%d")),
        };

        let mut max_seq = 0u32;
        for status in TaskStatus::ALL {
            let dir = self.status_dir(status);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !Self::is_task_file(&name) {
                    continue;
                }
                let stem = name.trim_end_matches(".md");
                if let Some(suffix) = stem.strip_prefix(&prefix) {
                    // Top-level scans must not count subtask suffixes
                    if !suffix.contains('-') {
                        if let Ok(seq) = suffix.parse::<u32>() {
                            max_seq = max_seq.max(seq);
                        }
                    }
                }
            }
        }
        Ok(max_seq + 1)
    }

    /// Merge-patch the mutable fields. Rejected on terminal tasks.
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let mut task = self.require(id).await?;
        if task.status.is_terminal() {
            return Err(AofError::TerminalState(task.id, task.status));
        }

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(routing) = &patch.routing {
            routing.apply(&mut task.routing);
        }
        if let Some(depends_on) = patch.depends_on {
            if depends_on.contains(&task.id) {
                return Err(AofError::CycleDetected(task.id));
            }
            for dep in &depends_on {
                self.require(dep).await?;
            }
            if self.would_create_cycle(&task.id, &depends_on).await? {
                return Err(AofError::CycleDetected(task.id));
            }
            task.depends_on = depends_on;
        }

        task.updated_at = ts::now();
        task.content_hash = Some(serializer::content_hash(&task)?);
        self.write_task(&task).await?;
        Ok(task)
    }

    /// Whether pointing `id` at `deps` would make `id` reachable from itself.
    async fn would_create_cycle(&self, id: &str, deps: &BTreeSet<String>) -> Result<bool> {
        let all = self.list(TaskFilter::default()).await?;
        let graph: BTreeMap<&str, &BTreeSet<String>> =
            all.iter().map(|t| (t.id.as_str(), &t.depends_on)).collect();

        let mut stack: Vec<&str> = deps.iter().map(String::as_str).collect();
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        while let Some(node) = stack.pop() {
            if node == id {
                return Ok(true);
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(upstream) = graph.get(node) {
                stack.extend(upstream.iter().map(String::as_str));
            }
        }
        Ok(false)
    }

    /// Transition a task through the lifecycle table.
    ///
    /// A same-status transition is a no-op success: no write, no event, no
    /// hooks. Completion and (when enabled) blocking trigger the dependency
    /// cascade after the move has landed.
    pub async fn transition(&self, id: &str, to: TaskStatus, ctx: TransitionCtx) -> Result<Task> {
        let task = self.require(id).await?;
        if task.status == to {
            return Ok(task);
        }
        if !task.status.can_transition_to(to) {
            return Err(AofError::invalid_transition(task.status, to));
        }

        let task = self.commit_transition(task, to, &ctx).await?;

        if to == TaskStatus::Done {
            self.cascade_on_completion(&task.id, &ctx.actor).await?;
        } else if to == TaskStatus::Blocked && self.cascade_on_block {
            self.cascade_on_block(&task.id, &ctx.actor).await?;
        }

        Ok(task)
    }

    /// Convenience: transition into `blocked` with a recorded reason.
    pub async fn block(&self, id: &str, reason: &str, actor: &str) -> Result<Task> {
        self.transition(
            id,
            TaskStatus::Blocked,
            TransitionCtx::new(actor).with_reason(reason),
        )
        .await
    }

    /// The single place a status change lands on disk: adjust the record,
    /// move the file atomically, log the event, run hooks. Callers have
    /// already validated the transition. Does not cascade.
    pub(crate) async fn commit_transition(
        &self,
        mut task: Task,
        to: TaskStatus,
        ctx: &TransitionCtx,
    ) -> Result<Task> {
        let from = task.status;
        let now = ts::now();

        if from == TaskStatus::InProgress {
            task.lease = None;
        }
        if to == TaskStatus::Review && task.gate.is_none() {
            self.enter_first_gate(&mut task, now);
        }

        task.status = to;
        task.updated_at = now;
        task.last_transition_at = now;
        task.content_hash = Some(serializer::content_hash(&task)?);

        let old_path = self.task_path(from, &task.id);
        let new_path = self.task_path(to, &task.id);
        let contents = serializer::serialize_task(&task)?;
        fsio::move_atomic(&old_path, &new_path, &contents).await?;

        self.events
            .append(
                &Event::new(EventKind::TaskTransitioned, ctx.actor.as_str())
                    .with_task(task.id.as_str())
                    .with_payload(serde_json::json!({
                        "from": from.dir_name(),
                        "to": to.dir_name(),
                        "reason": ctx.reason,
                    })),
            )
            .await?;

        self.run_hooks(&task, from).await;
        Ok(task)
    }

    fn enter_first_gate(&self, task: &mut Task, now: chrono::DateTime<chrono::Utc>) {
        let Some(project) = &self.project else { return };
        let Some(workflow) = project.resolve_workflow(task.routing.workflow.as_deref()) else {
            return;
        };
        if let Some(first) = workflow.first_gate() {
            task.gate = Some(aof_core::GateState {
                current: first.id.clone(),
                entered: now,
                history: Vec::new(),
            });
        }
    }

    /// Rewrite a task file in its current directory (no status change).
    pub(crate) async fn rewrite_in_place(&self, task: &mut Task) -> Result<()> {
        task.updated_at = ts::now();
        task.content_hash = Some(serializer::content_hash(task)?);
        self.write_task(task).await
    }

    pub(crate) async fn run_hooks(&self, task: &Task, from: TaskStatus) {
        for hook in &self.hooks {
            if let Err(e) = hook.after_transition(task, from).await {
                warn!(hook = hook.name(), task = %task.id, error = %e, "transition hook failed");
            }
        }
    }

    pub(crate) async fn append_event(&self, event: &Event) -> Result<()> {
        self.events.append(event).await
    }
}
