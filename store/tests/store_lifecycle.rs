//! End-to-end store behavior over a real temp directory: creation,
//! transitions, cascades, lint, and the on-disk invariants.

use std::collections::BTreeSet;

use aof_core::{serializer, AofError, EventKind, TaskFilter, TaskPatch, TaskStatus};
use aof_store::{TaskStore, TransitionCtx};
use aof_testkit::{project_config, DraftBuilder};

async fn new_store(dir: &std::path::Path) -> TaskStore {
    let store = TaskStore::new(dir).with_project_config(project_config());
    store.init().await.unwrap();
    store
}

async fn events_of_kind(store: &TaskStore, kind: EventKind) -> usize {
    let today = aof_core::models::ts::now().date_naive();
    store
        .events()
        .read_day(today)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == kind)
        .count()
}

#[tokio::test]
async fn test_create_assigns_sequential_ids_and_lands_in_backlog() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let t1 = store.create(DraftBuilder::new().with_title("First").build()).await.unwrap();
    let t2 = store.create(DraftBuilder::new().with_title("Second").build()).await.unwrap();

    assert!(t1.id.ends_with("-001"), "unexpected id {}", t1.id);
    assert!(t2.id.ends_with("-002"), "unexpected id {}", t2.id);
    assert_eq!(t1.status, TaskStatus::Backlog);

    // Invariant: the file lives in the directory named by its status
    assert!(store.task_path(TaskStatus::Backlog, &t1.id).is_file());

    // Invariant: the stored content hash matches the file
    let on_disk = store.get(&t1.id).await.unwrap().unwrap();
    assert!(serializer::hash_matches(&on_disk).unwrap());

    assert_eq!(events_of_kind(&store, EventKind::TaskCreated).await, 2);
}

#[tokio::test]
async fn test_subtask_ids_nest_under_parent() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let parent = store.create(DraftBuilder::new().with_title("Parent").build()).await.unwrap();
    let child = store
        .create(DraftBuilder::new().with_title("Child").with_parent(parent.id.as_str()).build())
        .await
        .unwrap();

    assert_eq!(child.id, format!("{}-01", parent.id));
    assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));

    // A subtask cannot itself have children
    let err = store
        .create(DraftBuilder::new().with_title("Grandchild").with_parent(child.id.as_str()).build())
        .await
        .unwrap_err();
    assert!(matches!(err, AofError::Schema { .. }));
}

#[tokio::test]
async fn test_invalid_transition_leaves_file_untouched_and_logs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let task = store.create(DraftBuilder::new().build()).await.unwrap();
    let before = tokio::fs::read_to_string(store.task_path(TaskStatus::Backlog, &task.id))
        .await
        .unwrap();

    let err = store
        .transition(&task.id, TaskStatus::Done, TransitionCtx::new("tester"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AofError::InvalidTransition {
            from: TaskStatus::Backlog,
            to: TaskStatus::Done
        }
    ));

    let after = tokio::fs::read_to_string(store.task_path(TaskStatus::Backlog, &task.id))
        .await
        .unwrap();
    assert_eq!(before, after);
    assert_eq!(events_of_kind(&store, EventKind::TaskTransitioned).await, 0);
}

#[tokio::test]
async fn test_same_status_transition_is_noop_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let task = store.create(DraftBuilder::new().build()).await.unwrap();
    let unchanged = store
        .transition(&task.id, TaskStatus::Backlog, TransitionCtx::new("tester"))
        .await
        .unwrap();

    assert_eq!(unchanged.status, TaskStatus::Backlog);
    assert_eq!(events_of_kind(&store, EventKind::TaskTransitioned).await, 0);
}

#[tokio::test]
async fn test_every_transition_logs_exactly_one_event() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let task = store.create(DraftBuilder::new().build()).await.unwrap();
    let ctx = || TransitionCtx::new("tester");
    store.transition(&task.id, TaskStatus::Ready, ctx()).await.unwrap();
    store.transition(&task.id, TaskStatus::Blocked, ctx()).await.unwrap();
    store.transition(&task.id, TaskStatus::Ready, ctx()).await.unwrap();

    assert_eq!(events_of_kind(&store, EventKind::TaskTransitioned).await, 3);
    assert!(store.task_path(TaskStatus::Ready, &task.id).is_file());
    assert!(!store.task_path(TaskStatus::Backlog, &task.id).is_file());
}

#[tokio::test]
async fn test_completion_cascade_promotes_dependent() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let t1 = store.create(DraftBuilder::new().with_title("Upstream").build()).await.unwrap();
    let t2 = store
        .create(DraftBuilder::new().with_title("Downstream").with_depends_on([t1.id.as_str()]).build())
        .await
        .unwrap();

    // Drive T1 through its whole lifecycle
    let ctx = || TransitionCtx::new("worker-1");
    store.transition(&t1.id, TaskStatus::Ready, ctx()).await.unwrap();
    store.acquire_lease(&t1.id, "worker-1", 60_000).await.unwrap();
    store.transition(&t1.id, TaskStatus::Review, ctx()).await.unwrap();
    store.transition(&t1.id, TaskStatus::Done, ctx()).await.unwrap();

    let t2 = store.get(&t2.id).await.unwrap().unwrap();
    assert_eq!(t2.status, TaskStatus::Ready);

    let today = aof_core::models::ts::now().date_naive();
    let cascades: Vec<_> = store
        .events()
        .read_day(today)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == EventKind::DependencyCascaded)
        .collect();
    assert_eq!(cascades.len(), 1);
    assert_eq!(
        cascades[0].payload["promoted"],
        serde_json::json!([t2.id.clone()])
    );
}

#[tokio::test]
async fn test_cascade_skips_until_all_dependencies_done() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let a = store.create(DraftBuilder::new().with_title("A").build()).await.unwrap();
    let b = store.create(DraftBuilder::new().with_title("B").build()).await.unwrap();
    let c = store
        .create(DraftBuilder::new().with_title("C").with_depends_on([a.id.as_str(), b.id.as_str()]).build())
        .await
        .unwrap();

    let finish = |id: String| {
        let store = &store;
        async move {
            let ctx = || TransitionCtx::new("worker-1");
            store.transition(&id, TaskStatus::Ready, ctx()).await.unwrap();
            store.acquire_lease(&id, "worker-1", 60_000).await.unwrap();
            store.transition(&id, TaskStatus::Done, ctx()).await.unwrap();
        }
    };

    finish(a.id.clone()).await;
    let c_now = store.get(&c.id).await.unwrap().unwrap();
    assert_eq!(c_now.status, TaskStatus::Backlog, "one dep missing, no promotion");

    finish(b.id.clone()).await;
    let c_now = store.get(&c.id).await.unwrap().unwrap();
    assert_eq!(c_now.status, TaskStatus::Ready);
}

#[tokio::test]
async fn test_block_cascade_is_config_gated() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path())
        .with_project_config(project_config())
        .with_cascade_on_block(true);
    store.init().await.unwrap();

    let up = store.create(DraftBuilder::new().with_title("Upstream").build()).await.unwrap();
    let down = store
        .create(DraftBuilder::new().with_title("Downstream").with_depends_on([up.id.as_str()]).build())
        .await
        .unwrap();
    store
        .transition(&down.id, TaskStatus::Ready, TransitionCtx::new("tester"))
        .await
        .unwrap();

    store.block(&up.id, "waiting on vendor", "tester").await.unwrap();

    let down = store.get(&down.id).await.unwrap().unwrap();
    assert_eq!(down.status, TaskStatus::Blocked);
}

#[tokio::test]
async fn test_update_rejected_on_terminal_task() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let task = store.create(DraftBuilder::new().build()).await.unwrap();
    store
        .transition(&task.id, TaskStatus::Cancelled, TransitionCtx::new("tester"))
        .await
        .unwrap();

    let err = store
        .update(
            &task.id,
            TaskPatch {
                title: Some("New title".to_string()),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AofError::TerminalState(_, TaskStatus::Cancelled)));
}

#[tokio::test]
async fn test_dependency_cycle_rejected_on_update() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let a = store.create(DraftBuilder::new().with_title("A").build()).await.unwrap();
    let b = store
        .create(DraftBuilder::new().with_title("B").with_depends_on([a.id.as_str()]).build())
        .await
        .unwrap();

    // a -> b would close the loop b -> a
    let err = store
        .update(
            &a.id,
            TaskPatch {
                depends_on: Some(BTreeSet::from([b.id.clone()])),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AofError::CycleDetected(_)));

    // Self-reference is the degenerate cycle
    let err = store
        .update(
            &a.id,
            TaskPatch {
                depends_on: Some(BTreeSet::from([a.id.clone()])),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AofError::CycleDetected(_)));
}

#[tokio::test]
async fn test_prefix_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let t1 = store.create(DraftBuilder::new().with_title("One").build()).await.unwrap();
    let _t2 = store.create(DraftBuilder::new().with_title("Two").build()).await.unwrap();

    // Unique full id works even though a shared prefix exists
    let hit = store.get_by_prefix(&t1.id).await.unwrap().unwrap();
    assert_eq!(hit.id, t1.id);

    // The shared day prefix is ambiguous
    let prefix = &t1.id[..t1.id.len() - 1];
    let err = store.get_by_prefix(prefix).await.unwrap_err();
    assert!(matches!(err, AofError::Ambiguous { .. }));

    assert!(store.get_by_prefix("TASK-1999-01-01").await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupt_file_is_skipped_by_list_and_reported_by_lint() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let good = store.create(DraftBuilder::new().with_title("Good").build()).await.unwrap();

    let bad_path = store.status_dir(TaskStatus::Ready).join("TASK-2026-01-15-999.md");
    tokio::fs::write(&bad_path, "status: ready\nnot a task header\n")
        .await
        .unwrap();

    let listed = store.list(TaskFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, good.id);

    let issues = store.lint().await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, aof_store::LintKind::ParseError);
    assert_eq!(issues[0].path, bad_path);
}

#[tokio::test]
async fn test_lint_flags_tampering() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let task = store.create(DraftBuilder::new().with_title("Victim").build()).await.unwrap();
    let path = store.task_path(TaskStatus::Backlog, &task.id);

    // Edit the title without refreshing the hash
    let raw = tokio::fs::read_to_string(&path).await.unwrap();
    tokio::fs::write(&path, raw.replacen("Victim", "Tampered", 1))
        .await
        .unwrap();

    let issues = store.lint().await.unwrap();
    assert!(issues
        .iter()
        .any(|i| i.kind == aof_store::LintKind::HashMismatch && i.task_id.as_deref() == Some(task.id.as_str())));
}

#[tokio::test]
async fn test_count_by_status() {
    let dir = tempfile::tempdir().unwrap();
    let store = new_store(dir.path()).await;

    let t1 = store.create(DraftBuilder::new().build()).await.unwrap();
    let _t2 = store.create(DraftBuilder::new().build()).await.unwrap();
    store
        .transition(&t1.id, TaskStatus::Ready, TransitionCtx::new("tester"))
        .await
        .unwrap();

    let counts = store.count_by_status().await.unwrap();
    assert_eq!(counts[&TaskStatus::Backlog], 1);
    assert_eq!(counts[&TaskStatus::Ready], 1);
    assert_eq!(counts[&TaskStatus::Done], 0);
}
