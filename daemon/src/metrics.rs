//! Prometheus metrics registry.
//!
//! The daemon owns the registry and renders the text exposition on demand
//! for the host gateway; the store feeds gate activity in through the
//! [`GateObserver`] capability so it never depends on Prometheus itself.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use aof_core::TaskStatus;
use aof_store::GateObserver;

pub struct FabricMetrics {
    registry: Registry,
    tasks_total: IntGaugeVec,
    scheduler_up: IntGauge,
    gate_duration: HistogramVec,
    gate_transitions: IntCounterVec,
    gate_rejections: IntCounterVec,
}

impl FabricMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let tasks_total = IntGaugeVec::new(
            Opts::new("aof_tasks_total", "Tasks currently in each status"),
            &["status"],
        )?;
        let scheduler_up = IntGauge::new("aof_scheduler_up", "1 while the scheduler loop runs")?;
        let gate_duration = HistogramVec::new(
            HistogramOpts::new(
                "aof_gate_duration_seconds",
                "Time spent at a gate before an outcome",
            ),
            &["workflow", "gate", "outcome"],
        )?;
        let gate_transitions = IntCounterVec::new(
            Opts::new("aof_gate_transitions_total", "Gate cursor movements"),
            &["from_gate", "to_gate"],
        )?;
        let gate_rejections = IntCounterVec::new(
            Opts::new("aof_gate_rejections_total", "Gate rejections"),
            &["gate", "workflow"],
        )?;

        registry.register(Box::new(tasks_total.clone()))?;
        registry.register(Box::new(scheduler_up.clone()))?;
        registry.register(Box::new(gate_duration.clone()))?;
        registry.register(Box::new(gate_transitions.clone()))?;
        registry.register(Box::new(gate_rejections.clone()))?;

        Ok(Self {
            registry,
            tasks_total,
            scheduler_up,
            gate_duration,
            gate_transitions,
            gate_rejections,
        })
    }

    /// Refresh the per-status gauge from a poll snapshot. Statuses missing
    /// from the map are reset to zero so stale values never linger.
    pub fn set_task_counts(&self, counts: &BTreeMap<TaskStatus, usize>) {
        for status in TaskStatus::ALL {
            let count = counts.get(&status).copied().unwrap_or(0);
            self.tasks_total
                .with_label_values(&[status.dir_name()])
                .set(count as i64);
        }
    }

    pub fn set_scheduler_up(&self, up: bool) {
        self.scheduler_up.set(if up { 1 } else { 0 });
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .context("failed to encode metrics")?;
        String::from_utf8(buf).context("metrics exposition was not UTF-8")
    }
}

impl GateObserver for FabricMetrics {
    fn gate_duration(&self, workflow: &str, gate: &str, outcome: &str, seconds: f64) {
        self.gate_duration
            .with_label_values(&[workflow, gate, outcome])
            .observe(seconds);
    }

    fn gate_transition(&self, from_gate: &str, to_gate: &str) {
        self.gate_transitions
            .with_label_values(&[from_gate, to_gate])
            .inc();
    }

    fn gate_rejection(&self, workflow: &str, gate: &str) {
        self.gate_rejections
            .with_label_values(&[gate, workflow])
            .inc();
    }
}
