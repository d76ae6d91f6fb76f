//! Fabric Daemon
//!
//! The single-writer process that owns a data directory: PID lock,
//! scheduler poll loop, health HTTP endpoint, and the Prometheus metrics
//! registry. Exposed as a library so integration tests can drive the
//! pieces without spawning the binary.

pub mod config;
pub mod health;
pub mod metrics;
pub mod scheduler;
pub mod supervisor;
pub mod telemetry;

pub use config::Config;
pub use metrics::FabricMetrics;
pub use scheduler::{PollSummary, Scheduler, SchedulerStatus};
pub use supervisor::PidLock;
