//! The periodic poll loop.
//!
//! Single cooperative task: each poll snapshots the store, ages leases,
//! refreshes metrics, and records a `scheduler.poll` event, in that order.
//! Polls run strictly sequentially; an overrun simply stretches the
//! effective interval. A failed step never kills the loop; errors are
//! logged, carried in the poll event, and the next tick proceeds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use aof_core::{models::ts, Event, EventKind, TaskFilter, TaskStatus};
use aof_store::{TaskStore, FABRIC_ACTOR};

use crate::metrics::FabricMetrics;

/// Shared view of scheduler liveness, read by the health endpoint.
#[derive(Default)]
pub struct SchedulerStatus {
    last_poll_at: Mutex<Option<DateTime<Utc>>>,
}

impl SchedulerStatus {
    pub fn last_poll_at(&self) -> Option<DateTime<Utc>> {
        *self.last_poll_at.lock()
    }

    pub fn record_poll(&self, at: DateTime<Utc>) {
        *self.last_poll_at.lock() = Some(at);
    }
}

/// What one poll did.
#[derive(Debug, Clone, Default)]
pub struct PollSummary {
    pub scanned_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub expired_leases: Vec<String>,
    pub by_status: BTreeMap<String, usize>,
    pub errors: Vec<String>,
}

pub struct Scheduler {
    store: Arc<TaskStore>,
    metrics: Arc<FabricMetrics>,
    status: Arc<SchedulerStatus>,
    poll_interval: Duration,
    dry_run: bool,
}

impl Scheduler {
    pub fn new(
        store: Arc<TaskStore>,
        metrics: Arc<FabricMetrics>,
        status: Arc<SchedulerStatus>,
        poll_interval: Duration,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            metrics,
            status,
            poll_interval,
            dry_run,
        }
    }

    /// Drive the loop until the shutdown flag flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            dry_run = self.dry_run,
            "scheduler started"
        );

        loop {
            self.poll().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }

        info!("scheduler stopped");
    }

    /// One poll: snapshot → expire leases → stats/metrics → poll event.
    /// Dry-run skips the mutating step but still observes and reports.
    pub async fn poll(&self) -> PollSummary {
        let started = Instant::now();
        let scanned_at = ts::now();
        let mut summary = PollSummary {
            scanned_at: Some(scanned_at),
            ..PollSummary::default()
        };

        // 1. Snapshot
        let tasks = match self.store.list(TaskFilter::default()).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "poll: store snapshot failed");
                summary.errors.push(format!("snapshot: {e}"));
                Vec::new()
            }
        };

        // 2. Expire leases
        if !self.dry_run {
            match self.store.expire_leases(scanned_at).await {
                Ok(expired) => summary.expired_leases = expired,
                Err(e) => {
                    warn!(error = %e, "poll: lease expiry failed");
                    summary.errors.push(format!("expire_leases: {e}"));
                }
            }
        }

        // 3. Aggregate stats and metrics. Status counts are re-read from the
        // directories so the gauges reflect the sweep that just ran; agent
        // and lease stats come from the snapshot.
        let by_status: BTreeMap<TaskStatus, usize> = match self.store.count_by_status().await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "poll: status counts failed");
                summary.errors.push(format!("counts: {e}"));
                let mut counts = BTreeMap::new();
                for task in &tasks {
                    *counts.entry(task.status).or_default() += 1;
                }
                counts
            }
        };
        let mut by_agent: BTreeMap<String, usize> = BTreeMap::new();
        let mut oldest_lease_age_secs: Option<i64> = None;
        for task in &tasks {
            if let Some(agent) = &task.routing.agent {
                *by_agent.entry(agent.clone()).or_default() += 1;
            }
            if let Some(lease) = &task.lease {
                let age = (scanned_at - lease.acquired_at).num_seconds();
                oldest_lease_age_secs = Some(oldest_lease_age_secs.map_or(age, |o| o.max(age)));
            }
        }
        self.metrics.set_task_counts(&by_status);
        summary.by_status = by_status
            .iter()
            .map(|(s, n)| (s.dir_name().to_string(), *n))
            .collect();

        summary.duration_ms = started.elapsed().as_millis() as u64;

        // 4. Record the poll
        let event = Event::new(EventKind::SchedulerPoll, FABRIC_ACTOR).with_payload(
            serde_json::json!({
                "scannedAt": scanned_at.to_rfc3339(),
                "durationMs": summary.duration_ms,
                "actions": { "expiredLeases": summary.expired_leases },
                "stats": {
                    "byStatus": summary.by_status,
                    "byAgent": by_agent,
                    "oldestLeaseAgeSecs": oldest_lease_age_secs,
                },
                "dryRun": self.dry_run,
                "errors": summary.errors,
            }),
        );
        if let Err(e) = self.store.events().append(&event).await {
            warn!(error = %e, "poll: event append failed");
            summary.errors.push(format!("event: {e}"));
        }

        self.status.record_poll(scanned_at);
        summary
    }
}
