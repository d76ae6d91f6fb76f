//! Atomic filesystem primitives.
//!
//! Every single-file write goes through write-temp-then-rename in the target
//! directory; cross-directory moves are a bare rename. A temp file never
//! outlives the call that created it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temp path in the same directory as `target`, unique within the process.
fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
}

/// Write `contents` to `target` atomically.
pub async fn write_atomic(target: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = temp_path(target);
    tokio::fs::write(&tmp, contents).await?;
    match tokio::fs::rename(&tmp, target).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(e)
        }
    }
}

/// Write `contents` at `target` and remove `old` afterwards, as one logical
/// move: the new file lands atomically before the old one disappears, so a
/// failure anywhere leaves the old file authoritative.
pub async fn move_atomic(old: &Path, target: &Path, contents: &str) -> std::io::Result<()> {
    write_atomic(target, contents).await?;
    if old != target {
        tokio::fs::remove_file(old).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.md");

        write_atomic(&path, "one").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "one");

        write_atomic(&path, "two").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "two");

        // No temp files left behind
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["file.md"]);
    }

    #[tokio::test]
    async fn test_move_atomic_removes_old() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a").join("task.md");
        let b = dir.path().join("b").join("task.md");
        tokio::fs::create_dir_all(a.parent().unwrap()).await.unwrap();
        tokio::fs::create_dir_all(b.parent().unwrap()).await.unwrap();

        write_atomic(&a, "payload").await.unwrap();
        move_atomic(&a, &b, "payload-v2").await.unwrap();

        assert!(!a.exists());
        assert_eq!(tokio::fs::read_to_string(&b).await.unwrap(), "payload-v2");
    }
}
