//! Identifier and input validation.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AofError, Result};

/// `TASK-YYYY-MM-DD-NNN` with an optional `-NN` subtask suffix.
fn task_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^TASK-\d{4}-\d{2}-\d{2}-\d{3}(-\d{2})?$").expect("task id regex")
    })
}

/// Validate a task id against the canonical format.
pub fn validate_task_id(id: &str) -> Result<()> {
    if task_id_re().is_match(id) {
        Ok(())
    } else {
        Err(AofError::Fatal(format!("invalid task id: '{id}'")))
    }
}

/// Whether the id carries a subtask suffix.
pub fn is_subtask_id(id: &str) -> bool {
    task_id_re().is_match(id) && id.len() > "TASK-YYYY-MM-DD-NNN".len()
}

/// Parent id of a subtask id, if it has one.
pub fn parent_of(id: &str) -> Option<&str> {
    if is_subtask_id(id) {
        id.rsplit_once('-').map(|(parent, _)| parent)
    } else {
        None
    }
}

/// Validate an agent identity string.
///
/// Agent names must be 1-64 characters of letters, numbers, hyphens, and
/// underscores, starting and ending alphanumeric.
pub fn validate_agent_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AofError::Fatal("agent name cannot be empty".to_string()));
    }
    if name.len() > 64 {
        return Err(AofError::Fatal(format!(
            "agent name too long ({} > 64 chars)",
            name.len()
        )));
    }

    let first = name.chars().next().unwrap_or(' ');
    let last = name.chars().last().unwrap_or(' ');
    if !first.is_alphanumeric() || !last.is_alphanumeric() {
        return Err(AofError::Fatal(format!(
            "agent name must start and end alphanumeric: '{name}'"
        )));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return Err(AofError::Fatal(format!(
            "agent name can only contain letters, numbers, hyphens, and underscores: '{name}'"
        )));
    }

    Ok(())
}
