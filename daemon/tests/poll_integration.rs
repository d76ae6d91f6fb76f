//! Scheduler polls against a real store: lease sweep, poll events, dry-run.

use std::sync::Arc;
use std::time::Duration;

use aof_core::{models::ts, EventKind, TaskStatus};
use aof_daemon::{FabricMetrics, Scheduler, SchedulerStatus};
use aof_store::{TaskStore, TransitionCtx};
use aof_testkit::DraftBuilder;

async fn leased_task(store: &TaskStore, ttl_ms: u64) -> String {
    let task = store.create(DraftBuilder::new().with_agent("worker-1").build()).await.unwrap();
    store
        .transition(&task.id, TaskStatus::Ready, TransitionCtx::new("tester"))
        .await
        .unwrap();
    store.acquire_lease(&task.id, "worker-1", ttl_ms).await.unwrap();
    task.id
}

fn scheduler(store: Arc<TaskStore>, dry_run: bool) -> (Scheduler, Arc<FabricMetrics>) {
    let metrics = Arc::new(FabricMetrics::new().unwrap());
    let status = Arc::new(SchedulerStatus::default());
    (
        Scheduler::new(
            store,
            metrics.clone(),
            status,
            Duration::from_secs(30),
            dry_run,
        ),
        metrics,
    )
}

#[tokio::test]
async fn test_poll_expires_stale_lease_and_records_event() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::new(dir.path()));
    store.init().await.unwrap();

    let id = leased_task(&store, 10).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (scheduler, metrics) = scheduler(store.clone(), false);
    let summary = scheduler.poll().await;

    assert_eq!(summary.expired_leases, vec![id.clone()]);
    assert!(summary.errors.is_empty());

    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Ready);
    assert!(task.lease.is_none());

    let events = store.events().read_day(ts::now().date_naive()).await.unwrap();
    assert!(events.iter().any(|e| e.kind == EventKind::LeaseExpired));
    let polls: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::SchedulerPoll)
        .collect();
    assert_eq!(polls.len(), 1);
    assert_eq!(polls[0].payload["dryRun"], serde_json::json!(false));
    assert_eq!(
        polls[0].payload["actions"]["expiredLeases"],
        serde_json::json!([id])
    );

    // Gauges reflect the post-sweep state
    let text = metrics.render().unwrap();
    assert!(text.contains(r#"aof_tasks_total{status="ready"} 1"#));
}

#[tokio::test]
async fn test_dry_run_poll_observes_without_mutating() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::new(dir.path()));
    store.init().await.unwrap();

    let id = leased_task(&store, 10).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (scheduler, _metrics) = scheduler(store.clone(), true);
    let summary = scheduler.poll().await;

    assert!(summary.expired_leases.is_empty());

    // The stale lease is still there untouched
    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert!(task.lease.is_some());

    let events = store.events().read_day(ts::now().date_naive()).await.unwrap();
    assert!(!events.iter().any(|e| e.kind == EventKind::LeaseExpired));
    let poll = events
        .iter()
        .find(|e| e.kind == EventKind::SchedulerPoll)
        .expect("poll event recorded");
    assert_eq!(poll.payload["dryRun"], serde_json::json!(true));
}

#[tokio::test]
async fn test_poll_records_status_stats() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::new(dir.path()));
    store.init().await.unwrap();

    store.create(DraftBuilder::new().build()).await.unwrap();
    store.create(DraftBuilder::new().build()).await.unwrap();

    let (scheduler, _metrics) = scheduler(store.clone(), false);
    let summary = scheduler.poll().await;

    assert_eq!(summary.by_status.get("backlog"), Some(&2));
    assert!(summary.scanned_at.is_some());
}

#[tokio::test]
async fn test_poll_updates_shared_status() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::new(dir.path()));
    store.init().await.unwrap();

    let metrics = Arc::new(FabricMetrics::new().unwrap());
    let status = Arc::new(SchedulerStatus::default());
    let scheduler = Scheduler::new(
        store,
        metrics,
        status.clone(),
        Duration::from_secs(30),
        false,
    );

    assert!(status.last_poll_at().is_none());
    scheduler.poll().await;
    assert!(status.last_poll_at().is_some());
}
