//! Desired-set reconciliation.
//!
//! Every projection computes the full map of pointer files it wants on
//! disk; this module diffs that map against what exists, writes only files
//! whose content differs, and prunes managed files that are no longer
//! desired. Running a sync twice in a row performs zero writes the second
//! time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aof_store::fsio;
use aof_core::Result;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub written: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl SyncStats {
    pub fn merge(&mut self, other: SyncStats) {
        self.written += other.written;
        self.removed += other.removed;
        self.unchanged += other.unchanged;
    }
}

/// Reconcile the files under `root` that `managed` claims against the
/// desired map (absolute path → content). Unmanaged files are never
/// touched; managed files absent from the map are pruned, and empty
/// directories left behind are removed.
pub async fn reconcile(
    root: &Path,
    desired: &BTreeMap<PathBuf, String>,
    managed: impl Fn(&Path) -> bool,
) -> Result<SyncStats> {
    let mut stats = SyncStats::default();

    let mut existing: Vec<PathBuf> = Vec::new();
    collect_files(root, &mut existing).await?;

    for path in existing {
        if managed(&path) && !desired.contains_key(&path) {
            tokio::fs::remove_file(&path).await?;
            stats.removed += 1;
            prune_empty_dirs(path.parent(), root).await;
        }
    }

    for (path, content) in desired {
        match tokio::fs::read_to_string(path).await {
            Ok(current) if current == *content => {
                stats.unchanged += 1;
                continue;
            }
            Ok(_) | Err(_) => {}
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        fsio::write_atomic(path, content).await?;
        stats.written += 1;
    }

    Ok(stats)
}

/// Recursively collect regular files under `dir`. A missing root is an
/// empty projection, not an error.
async fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                out.push(path);
            }
        }
    }
    Ok(())
}

/// Remove now-empty directories up to (but not including) `root`.
async fn prune_empty_dirs(mut dir: Option<&Path>, root: &Path) {
    while let Some(d) = dir {
        if d == root {
            break;
        }
        if tokio::fs::remove_dir(d).await.is_err() {
            break;
        }
        dir = d.parent();
    }
}

/// Relative path from `from_dir` to `target`, both inside `root`.
pub fn relative_link(root: &Path, from_dir: &Path, target: &Path) -> String {
    let from_rel = from_dir.strip_prefix(root).unwrap_or(from_dir);
    let target_rel = target.strip_prefix(root).unwrap_or(target);

    let ups = from_rel.components().count();
    let mut link = String::new();
    for _ in 0..ups {
        link.push_str("../");
    }
    link.push_str(&target_rel.to_string_lossy().replace('\\', "/"));
    link
}

/// Collapse a swimlane value to a safe directory name: alphanumerics,
/// dashes and underscores pass through, any run of anything else becomes a
/// single dash.
pub fn sanitize_lane(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
            last_dash = c == '-';
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "unassigned".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_lane() {
        assert_eq!(sanitize_lane("backend"), "backend");
        assert_eq!(sanitize_lane("data plane / ingest"), "data-plane-ingest");
        assert_eq!(sanitize_lane("a//b\\c"), "a-b-c");
        assert_eq!(sanitize_lane("  "), "unassigned");
        assert_eq!(sanitize_lane("lane_2"), "lane_2");
    }

    #[test]
    fn test_relative_link() {
        let root = Path::new("/data");
        let from = Path::new("/data/views/kanban/priority/high/ready");
        let target = Path::new("/data/tasks/ready/TASK-2026-01-15-001.md");
        assert_eq!(
            relative_link(root, from, target),
            "../../../../../tasks/ready/TASK-2026-01-15-001.md"
        );
    }

    #[tokio::test]
    async fn test_reconcile_writes_prunes_and_settles() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let mut desired = BTreeMap::new();
        desired.insert(root.join("a/one.md"), "one\n".to_string());
        desired.insert(root.join("b/two.md"), "two\n".to_string());

        let stats = reconcile(&root, &desired, |_| true).await.unwrap();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.removed, 0);

        // Second pass is byte-identical: nothing written
        let stats = reconcile(&root, &desired, |_| true).await.unwrap();
        assert_eq!(stats.written, 0);
        assert_eq!(stats.unchanged, 2);

        // Dropping a file from the desired set prunes it and its directory
        desired.remove(&root.join("b/two.md"));
        let stats = reconcile(&root, &desired, |_| true).await.unwrap();
        assert_eq!(stats.removed, 1);
        assert!(!root.join("b").exists());
    }
}
