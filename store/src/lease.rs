//! Exclusive, time-bounded task ownership.
//!
//! Leases are plain fields on the task record; no external lock service is
//! involved. Cross-process exclusion rests on the daemon's PID lock, so an
//! external writer that ignores the single-writer rule can corrupt leases.

use chrono::{DateTime, Duration, Utc};

use aof_core::{models::ts, AofError, Event, EventKind, Lease, Result, Task, TaskFilter, TaskStatus};

use crate::store::{TaskStore, TransitionCtx, FABRIC_ACTOR};

impl TaskStore {
    /// Claim a task for `agent`.
    ///
    /// On a `ready` task this performs the `ready → in-progress` transition
    /// and places the lease in the same atomic move. On an `in-progress`
    /// task it succeeds only when the current lease is held by the same
    /// agent or has expired (takeover); an unexpired foreign lease is
    /// [`AofError::AlreadyLeased`]. Any other status cannot be claimed.
    pub async fn acquire_lease(&self, id: &str, agent: &str, ttl_ms: u64) -> Result<Task> {
        let now = ts::now();
        let lease = new_lease(agent, now, ttl_ms);
        let mut task = self.require(id).await?;

        match task.status {
            TaskStatus::Ready => {
                task.lease = Some(lease.clone());
                let ctx = TransitionCtx::new(agent).with_reason("lease_acquired");
                let task = self.commit_transition(task, TaskStatus::InProgress, &ctx).await?;
                self.emit_lease_event(EventKind::LeaseAcquired, &task, &lease).await?;
                Ok(task)
            }
            TaskStatus::InProgress => {
                match &task.lease {
                    Some(existing) if existing.agent != agent && !existing.is_expired(now) => {
                        return Err(AofError::AlreadyLeased {
                            task: task.id,
                            holder: existing.agent.clone(),
                        });
                    }
                    _ => {}
                }
                task.lease = Some(lease.clone());
                self.rewrite_in_place(&mut task).await?;
                self.emit_lease_event(EventKind::LeaseAcquired, &task, &lease).await?;
                Ok(task)
            }
            status => Err(AofError::invalid_transition(status, TaskStatus::InProgress)),
        }
    }

    /// Extend the holder's lease by `ttl_ms` from now.
    pub async fn renew_lease(&self, id: &str, agent: &str, ttl_ms: u64) -> Result<Task> {
        let now = ts::now();
        let mut task = self.require(id).await?;

        let lease = match &task.lease {
            None => {
                return Err(AofError::NotLeaseHolder {
                    task: task.id,
                    agent: agent.to_string(),
                })
            }
            Some(lease) if lease.agent != agent => {
                return Err(AofError::NotLeaseHolder {
                    task: task.id,
                    agent: agent.to_string(),
                })
            }
            Some(lease) if lease.is_expired(now) => {
                return Err(AofError::LeaseExpired(task.id));
            }
            Some(lease) => Lease {
                expires_at: now + Duration::milliseconds(ttl_ms as i64),
                renew_count: lease.renew_count + 1,
                ..lease.clone()
            },
        };

        task.lease = Some(lease.clone());
        self.rewrite_in_place(&mut task).await?;
        self.emit_lease_event(EventKind::LeaseRenewed, &task, &lease).await?;
        Ok(task)
    }

    /// Clear the holder's lease. The status is left untouched; the worker
    /// transitions separately.
    pub async fn release_lease(&self, id: &str, agent: &str) -> Result<Task> {
        let mut task = self.require(id).await?;

        let lease = match task.lease.take() {
            Some(lease) if lease.agent == agent => lease,
            _ => {
                return Err(AofError::NotLeaseHolder {
                    task: task.id,
                    agent: agent.to_string(),
                })
            }
        };

        self.rewrite_in_place(&mut task).await?;
        self.emit_lease_event(EventKind::LeaseReleased, &task, &lease).await?;
        Ok(task)
    }

    /// Sweep every in-progress task whose lease lapsed before `now`: clear
    /// the lease and send the task back to `ready`. Returns the ids swept.
    pub async fn expire_leases(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let in_progress = self
            .list(TaskFilter {
                status: Some(TaskStatus::InProgress),
                ..TaskFilter::default()
            })
            .await?;

        let mut expired = Vec::new();
        for task in in_progress {
            let Some(lease) = task.lease.clone() else { continue };
            if !lease.is_expired(now) {
                continue;
            }

            let ctx = TransitionCtx::new(FABRIC_ACTOR).with_reason("lease_expired");
            let task = self.commit_transition(task, TaskStatus::Ready, &ctx).await?;
            self.emit_lease_event(EventKind::LeaseExpired, &task, &lease).await?;
            expired.push(task.id);
        }
        Ok(expired)
    }

    async fn emit_lease_event(&self, kind: EventKind, task: &Task, lease: &Lease) -> Result<()> {
        self.append_event(
            &Event::new(kind, lease.agent.as_str())
                .with_task(task.id.as_str())
                .with_payload(serde_json::json!({
                    "agent": lease.agent,
                    "expiresAt": lease.expires_at.to_rfc3339(),
                    "renewCount": lease.renew_count,
                })),
        )
        .await
    }
}

fn new_lease(agent: &str, now: DateTime<Utc>, ttl_ms: u64) -> Lease {
    Lease {
        agent: agent.to_string(),
        acquired_at: now,
        expires_at: now + Duration::milliseconds(ttl_ms as i64),
        renew_count: 0,
    }
}
