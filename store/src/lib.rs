//! Fabric Task Store
//!
//! The authoritative persistence layer of the Agentic Operations Fabric:
//! a crash-safe, file-system-backed task repository with atomic status
//! transitions, lease management, the gate engine runtime, dependency
//! cascades, and the append-only event log.
//!
//! Layout on disk, rooted at the data directory:
//!
//! ```text
//! tasks/{status}/{task-id}.md     canonical task files
//! events/{YYYY-MM-DD}.jsonl       append-only event stream
//! ```
//!
//! One writer at a time: the daemon's PID lock provides cross-process
//! exclusion, atomic rename provides per-file exclusion within it.

pub mod cascade;
pub mod events;
pub mod fsio;
pub mod gate;
pub mod hooks;
pub mod lease;
pub mod lint;
pub mod store;

pub use events::EventLog;
pub use gate::{GateContext, GateObserver};
pub use hooks::TransitionHook;
pub use lint::{LintIssue, LintKind};
pub use store::{TaskStore, TransitionCtx, FABRIC_ACTOR};
