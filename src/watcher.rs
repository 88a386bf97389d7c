//! Filesystem watching with debounced batching.
//!
//! Events for the same path within the debounce window (default 100 ms)
//! coalesce, so a rapid save/save/save triggers one re-index. Batches are
//! handed to the incremental engine, which commits them under a single
//! lock acquisition.

use anyhow::{Context, Result};
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Keeps the underlying watcher alive.
pub struct WatchHandle {
    _debouncer: Debouncer<RecommendedWatcher>,
}

/// Watch `root` recursively; coalesced path batches arrive on the returned
/// channel.
pub fn watch(
    root: &Path,
    debounce_ms: u64,
) -> Result<(WatchHandle, mpsc::UnboundedReceiver<Vec<PathBuf>>)> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut debouncer = new_debouncer(
        Duration::from_millis(debounce_ms.max(1)),
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                // Dedup paths inside the window, deterministic order
                let paths: BTreeSet<PathBuf> = events.into_iter().map(|e| e.path).collect();
                if !paths.is_empty() {
                    let _ = tx.send(paths.into_iter().collect());
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "filesystem watch error");
            }
        },
    )
    .context("failed to create filesystem watcher")?;

    debouncer
        .watcher()
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", root.display()))?;

    Ok((WatchHandle { _debouncer: debouncer }, rx))
}

/// Filter watcher batches down to indexable paths: inside the root, not in
/// an ignored directory.
pub fn indexable(root: &Path, path: &Path) -> bool {
    if !path.starts_with(root) {
        return false;
    }
    !path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some(".git") | Some("node_modules") | Some("target") | Some("__pycache__")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexable_filters_ignored_dirs() {
        let root = Path::new("/repo");
        assert!(indexable(root, Path::new("/repo/src/a.go")));
        assert!(!indexable(root, Path::new("/repo/.git/config")));
        assert!(!indexable(root, Path::new("/repo/node_modules/x/y.js")));
        assert!(!indexable(root, Path::new("/elsewhere/a.go")));
    }

    #[tokio::test]
    async fn watch_reports_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (_handle, mut rx) = watch(dir.path(), 20).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(dir.path().join("x.go"), "package x\n").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher timed out")
            .expect("watcher channel closed");
        assert!(batch.iter().any(|p| p.ends_with("x.go")));
    }
}
