//! Task file parsing and canonical emission.
//!
//! A task file is a YAML header between two `---` lines, a blank separator
//! line, then a markdown body. Emission is canonical: keys come out in the
//! fixed declaration order of [`Task`], timestamps carry millisecond
//! precision, sets and maps are sorted, and the body is newline-normalized.
//! `contentHash` is the SHA-256 of the rendered file with the hash field
//! itself omitted, so any two equal tasks hash identically.

use sha2::{Digest, Sha256};

use crate::{
    error::{AofError, Result},
    models::Task,
    validation,
};

const DELIMITER: &str = "---";

/// Parse a task file into a [`Task`].
///
/// Tolerant of unknown header fields (preserved in `task.extra`) but strict
/// about structure and schema: a malformed header is a [`AofError::Parse`],
/// a wrong `schemaVersion` or invalid id is a [`AofError::Schema`]. Nothing
/// is silently discarded.
pub fn parse_task_file(path: &str, raw: &str) -> Result<Task> {
    let raw = raw.replace("\r\n", "\n");

    let rest = raw
        .strip_prefix(&format!("{DELIMITER}\n"))
        .ok_or_else(|| AofError::parse(path, "missing opening '---' delimiter"))?;

    let (header, after) = rest
        .split_once(&format!("\n{DELIMITER}\n"))
        .map(|(h, b)| (h, Some(b)))
        .or_else(|| rest.strip_suffix(&format!("\n{DELIMITER}")).map(|h| (h, None)))
        .ok_or_else(|| AofError::parse(path, "missing closing '---' delimiter"))?;

    let mut task: Task = serde_yaml::from_str(header)
        .map_err(|e| AofError::parse(path, format!("invalid header: {e}")))?;

    if task.schema_version != 1 {
        return Err(AofError::schema(
            path,
            format!("unsupported schemaVersion {}", task.schema_version),
        ));
    }
    validation::validate_task_id(&task.id)
        .map_err(|e| AofError::schema(path, format!("{e}")))?;
    if task.last_transition_at > task.updated_at {
        return Err(AofError::schema(
            path,
            "lastTransitionAt is ahead of updatedAt",
        ));
    }

    let body = after.map(|b| b.strip_prefix('\n').unwrap_or(b)).unwrap_or("");
    task.body = normalize_body(body);

    Ok(task)
}

/// Render a task to its canonical file contents, embedding the given hash.
fn render(task: &Task) -> Result<String> {
    let header = serde_yaml::to_string(task)
        .map_err(|e| AofError::Fatal(format!("task serialization failed: {e}")))?;

    let mut out = String::with_capacity(header.len() + task.body.len() + 16);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&header);
    if !header.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    if !task.body.is_empty() {
        out.push('\n');
        out.push_str(&task.body);
    }
    Ok(out)
}

/// Canonical serialization with a freshly computed `contentHash`.
///
/// The returned string is exactly what belongs on disk; the task passed in
/// is left untouched, so callers that want the hash reflected in memory use
/// [`content_hash`] and set the field themselves.
pub fn serialize_task(task: &Task) -> Result<String> {
    let mut stamped = task.clone();
    stamped.content_hash = Some(content_hash(task)?);
    render(&stamped)
}

/// SHA-256 over the canonical serialization with `contentHash` omitted.
pub fn content_hash(task: &Task) -> Result<String> {
    let mut unstamped = task.clone();
    unstamped.content_hash = None;
    let rendered = render(&unstamped)?;

    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Whether the stored hash (if any) matches the task contents.
///
/// A task without a stored hash vacuously matches; only a present,
/// different hash is a mismatch.
pub fn hash_matches(task: &Task) -> Result<bool> {
    match &task.content_hash {
        None => Ok(true),
        Some(stored) => Ok(*stored == content_hash(task)?),
    }
}

/// Normalize a markdown body: empty stays empty, anything else ends with
/// exactly one newline.
pub fn normalize_body(body: &str) -> String {
    let trimmed = body.trim_end_matches('\n');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}
