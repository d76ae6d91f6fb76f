//! Test support for the fabric workspace: fluent builders and canned
//! fixtures. Test-only; never ship this crate in a runtime dependency.

pub mod builders;
pub mod fixtures;

pub use builders::{DraftBuilder, TaskBuilder};
pub use fixtures::{project_config, three_gate_workflow};
