//! Health HTTP endpoint.
//!
//! `GET /health` is the daemon's only network surface: a JSON liveness
//! report, 200 when healthy, 503 when the scheduler has gone quiet (last
//! poll older than five minutes) or the store cannot be counted. Every
//! other route is 404. No auth, read-only.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use aof_core::models::ts;
use aof_store::TaskStore;

use crate::scheduler::SchedulerStatus;

/// A poll older than this marks the daemon unhealthy.
const STALE_POLL_MINUTES: i64 = 5;

pub struct HealthState {
    pub started_at: DateTime<Utc>,
    pub store: Arc<TaskStore>,
    pub scheduler: Arc<SchedulerStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBody {
    pub status: String,
    /// Seconds since daemon start
    pub uptime: i64,
    pub last_poll_at: Option<String>,
    pub last_event_at: Option<String>,
    pub task_counts: BTreeMap<String, usize>,
}

/// Compute the health report. Separated from the handler so tests can call
/// it without binding a socket.
pub async fn snapshot(state: &HealthState) -> (StatusCode, HealthBody) {
    let now = ts::now();
    let last_poll = state.scheduler.last_poll_at();
    let poll_fresh = poll_is_fresh(last_poll, now);

    let (counts_ok, task_counts) = match state.store.count_by_status().await {
        Ok(counts) => (
            true,
            counts
                .into_iter()
                .map(|(status, count)| (status.dir_name().to_string(), count))
                .collect(),
        ),
        Err(_) => (false, BTreeMap::new()),
    };

    let healthy = poll_fresh && counts_ok;
    let body = HealthBody {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        uptime: (now - state.started_at).num_seconds(),
        last_poll_at: last_poll.map(|at| at.to_rfc3339()),
        last_event_at: state.store.events().last_append_at().map(|at| at.to_rfc3339()),
        task_counts,
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, body)
}

/// A poll is fresh up to and including exactly five minutes of age; one
/// tick past that the endpoint flips to unhealthy.
fn poll_is_fresh(last_poll: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(last_poll, Some(at) if now - at <= Duration::minutes(STALE_POLL_MINUTES))
}

async fn health_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<HealthBody>) {
    let (code, body) = snapshot(&state).await;
    (code, Json(body))
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(state)
}

/// Bind and serve until the shutdown receiver fires.
pub async fn serve(
    addr: &str,
    state: Arc<HealthState>,
    shutdown: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "health endpoint listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = shutdown.await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aof_store::TaskStore;

    fn state_over(dir: &std::path::Path) -> HealthState {
        HealthState {
            started_at: ts::now(),
            store: Arc::new(TaskStore::new(dir)),
            scheduler: Arc::new(SchedulerStatus::default()),
        }
    }

    #[test]
    fn test_freshness_boundary() {
        let now = ts::now();
        assert!(!poll_is_fresh(None, now));
        assert!(poll_is_fresh(Some(now), now));
        assert!(poll_is_fresh(Some(now - Duration::minutes(5)), now));
        assert!(!poll_is_fresh(
            Some(now - Duration::minutes(5) - Duration::milliseconds(1)),
            now
        ));
    }

    #[tokio::test]
    async fn test_healthy_with_recent_poll() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_over(dir.path());
        state.store.init().await.unwrap();
        state.scheduler.record_poll(ts::now());

        let (code, body) = snapshot(&state).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        assert_eq!(body.task_counts.get("backlog"), Some(&0));
    }

    #[tokio::test]
    async fn test_unhealthy_when_poll_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_over(dir.path());
        state.store.init().await.unwrap();
        state.scheduler.record_poll(ts::now() - Duration::minutes(6));

        let (code, body) = snapshot(&state).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "unhealthy");
    }

    #[tokio::test]
    async fn test_unhealthy_before_first_poll() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_over(dir.path());
        state.store.init().await.unwrap();

        let (code, _) = snapshot(&state).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    }
}
