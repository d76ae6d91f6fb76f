//! Daemon lifecycle: PID lock, startup wiring, signal handling, ordered
//! shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use aof_core::{models::ts, OrgChart, ProjectConfig};
use aof_store::TaskStore;
use aof_views::{ProjectionEngine, ProjectionHook};

use crate::{
    config::Config,
    health::{self, HealthState},
    metrics::FabricMetrics,
    scheduler::{Scheduler, SchedulerStatus},
};

/// Exclusive ownership of the data directory, expressed as a PID file.
///
/// Acquiring checks any existing file: a live PID aborts startup, a stale
/// one is cleaned up. The file is removed on drop, so every exit path
/// (signals included, which unwind through the supervisor) releases it.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Ok(raw) = std::fs::read_to_string(path) {
            if let Ok(pid) = raw.trim().parse::<u32>() {
                if pid_alive(pid) {
                    anyhow::bail!("AOF daemon already running (PID: {pid})");
                }
                info!(pid, "removing stale PID file");
            }
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove stale PID file {}", path.display()))?;
        }

        std::fs::write(path, format!("{}\n", std::process::id()))
            .with_context(|| format!("failed to write PID file {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove PID file");
            }
        }
    }
}

/// Signal 0 probes existence without touching the process. EPERM still
/// means someone is there.
fn pid_alive(pid: u32) -> bool {
    // 0 and out-of-range values would probe process groups, not processes
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Run the daemon to completion: acquire the lock, wire everything up,
/// serve until a signal arrives, then tear down in order (health server →
/// scheduler → PID file).
pub async fn run(config: Config) -> Result<()> {
    let data_dir = config.data_dir();
    if !data_dir.is_dir() {
        anyhow::bail!("data directory does not exist: {}", data_dir.display());
    }

    let pid_lock = PidLock::acquire(&config.pid_file())?;
    info!(pid_file = %pid_lock.path().display(), "PID lock acquired");

    // Collaborator config: workflows are validated at load, an invalid
    // declaration is fatal before any task is touched.
    let project = match config.project_config_path() {
        path if path.is_file() => {
            let project = ProjectConfig::load(&path)
                .with_context(|| format!("invalid project config {}", path.display()))?;
            info!(
                project = %project.project,
                workflows = project.workflows.len(),
                "project configuration loaded"
            );
            Some(project)
        }
        _ => None,
    };

    match config.org_chart_path() {
        path if path.is_file() => match OrgChart::load(&path) {
            Ok(org) => info!(teams = org.teams.len(), roles = org.roles.len(), "org chart loaded"),
            Err(e) => warn!(error = %e, "org chart unreadable; continuing without it"),
        },
        _ => {}
    }

    let metrics = Arc::new(FabricMetrics::new()?);
    let engine = Arc::new(ProjectionEngine::new(&data_dir, config.views.kanban_mode));

    let mut store = TaskStore::new(&data_dir).with_cascade_on_block(config.cascade.on_block);
    if let Some(project) = project {
        store = store.with_project_config(project);
    }
    store.add_gate_observer(metrics.clone());
    store.add_hook(Arc::new(ProjectionHook::new(engine.clone())));
    let store = Arc::new(store);
    store.init().await.context("store initialization failed")?;

    // Bring read views up to date before anything is served
    let stats = engine.rebuild().await.context("initial projection rebuild failed")?;
    info!(
        written = stats.written,
        removed = stats.removed,
        "projections rebuilt"
    );

    let scheduler_status = Arc::new(SchedulerStatus::default());
    let health_state = Arc::new(HealthState {
        started_at: ts::now(),
        store: store.clone(),
        scheduler: scheduler_status.clone(),
    });

    let (health_stop_tx, health_stop_rx) = tokio::sync::oneshot::channel();
    let health_addr = config.server_address();
    let health_task = tokio::spawn(async move {
        if let Err(e) = health::serve(&health_addr, health_state, health_stop_rx).await {
            error!(error = %e, "health server failed");
        }
    });

    metrics.set_scheduler_up(true);
    let scheduler = Scheduler::new(
        store.clone(),
        metrics.clone(),
        scheduler_status,
        Duration::from_millis(config.scheduler.poll_interval_ms),
        config.scheduler.dry_run,
    );
    let (sched_stop_tx, sched_stop_rx) = tokio::sync::watch::channel(false);
    let scheduler_task = tokio::spawn(async move { scheduler.run(sched_stop_rx).await });

    wait_for_shutdown_signal().await;

    // Stop sequence: health server first, then the scheduler, then the PID
    // file (released when pid_lock drops at the end of this function).
    let _ = health_stop_tx.send(());
    let _ = health_task.await;

    let _ = sched_stop_tx.send(true);
    let _ = scheduler_task.await;
    metrics.set_scheduler_up(false);

    info!("AOF daemon stopped");
    drop(pid_lock);
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to register SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to register SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl+c");
        } else {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
    }
}
