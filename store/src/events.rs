//! Append-only event log: one JSONL file per day under `events/`.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use aof_core::{AofError, Event, Result};

/// Daily-rotated audit stream.
///
/// Each append is a single `write` of one JSON object plus a newline on an
/// append-mode handle, flushed before returning. Readers tolerate a torn
/// trailing line.
pub struct EventLog {
    dir: PathBuf,
    last_append: Mutex<Option<DateTime<Utc>>>,
}

impl EventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_append: Mutex::new(None),
        }
    }

    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Append one event to the day file for its timestamp.
    pub async fn append(&self, event: &Event) -> Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| AofError::Fatal(format!("event serialization failed: {e}")))?;

        let path = self.file_for(event.ts.date_naive());
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;

        *self.last_append.lock() = Some(event.ts);
        Ok(())
    }

    /// Timestamp of the most recent append in this process.
    pub fn last_append_at(&self) -> Option<DateTime<Utc>> {
        *self.last_append.lock()
    }

    /// Read one day's events. Lines that fail to parse (a torn tail after a
    /// crash) are skipped with a warning; a missing file is an empty day.
    pub async fn read_day(&self, date: NaiveDate) -> Result<Vec<Event>> {
        let path = self.file_for(date);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unparseable event line"),
            }
        }
        Ok(events)
    }
}
