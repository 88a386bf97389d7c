//! File store: canonical path ↔ FileId mapping plus per-file metadata.
//!
//! FileIds are dense indexes into a record vector, stable for the process
//! lifetime and recycled only on full rebuild. Removal tombstones the
//! record so stale ids held by in-flight readers degrade to `None` instead
//! of crashing.

use crate::types::{FileId, Language};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// One file's record.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub language: Language,
    pub content: Arc<str>,
    pub mtime: SystemTime,
    pub size: u64,
    pub deleted: bool,
    /// Last extraction error recorded against this file, if any.
    pub error: Option<String>,
}

/// Metadata view handed to callers.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub id: FileId,
    pub path: PathBuf,
    pub language: Language,
    pub mtime: SystemTime,
    pub size: u64,
    pub error: Option<String>,
}

/// Path ↔ FileId store with tombstoning.
#[derive(Default)]
pub struct FileStore {
    records: RwLock<Vec<FileRecord>>,
    by_path: DashMap<PathBuf, FileId>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, or revive/refresh it when the path is already known.
    /// Content is replaced either way.
    pub fn add(&self, path: PathBuf, content: Arc<str>, mtime: SystemTime) -> FileId {
        debug_assert!(path.is_absolute(), "store paths must be normalized");
        if let Some(id) = self.by_path.get(&path).map(|r| *r) {
            self.update(id, content, mtime);
            return id;
        }
        let mut records = self.records.write();
        let id = FileId(records.len() as u32);
        let size = content.len() as u64;
        records.push(FileRecord {
            language: Language::from_path(&path),
            path: path.clone(),
            content,
            mtime,
            size,
            deleted: false,
            error: None,
        });
        drop(records);
        self.by_path.insert(path, id);
        id
    }

    /// Replace content and metadata for an existing id. Clears any tombstone
    /// and prior extraction error.
    pub fn update(&self, id: FileId, content: Arc<str>, mtime: SystemTime) {
        let mut records = self.records.write();
        if let Some(rec) = records.get_mut(id.as_usize()) {
            rec.size = content.len() as u64;
            rec.content = content;
            rec.mtime = mtime;
            rec.deleted = false;
            rec.error = None;
        }
    }

    /// Tombstone a file. The record (and its FileId) survives until the next
    /// full rebuild; lookups and reads return `None` meanwhile.
    pub fn remove(&self, id: FileId) {
        let mut records = self.records.write();
        if let Some(rec) = records.get_mut(id.as_usize()) {
            rec.deleted = true;
            rec.content = Arc::from("");
            rec.size = 0;
            self.by_path.remove(&rec.path);
        }
    }

    pub fn lookup(&self, path: &Path) -> Option<FileId> {
        self.by_path.get(path).map(|r| *r)
    }

    /// Metadata for a live file. Tombstoned ids yield `None`.
    pub fn info(&self, id: FileId) -> Option<FileInfo> {
        let records = self.records.read();
        let rec = records.get(id.as_usize())?;
        if rec.deleted {
            return None;
        }
        Some(FileInfo {
            id,
            path: rec.path.clone(),
            language: rec.language,
            mtime: rec.mtime,
            size: rec.size,
            error: rec.error.clone(),
        })
    }

    /// Content of a live file. Tombstoned ids yield `None`.
    pub fn content(&self, id: FileId) -> Option<Arc<str>> {
        let records = self.records.read();
        let rec = records.get(id.as_usize())?;
        if rec.deleted {
            return None;
        }
        Some(rec.content.clone())
    }

    pub fn path_of(&self, id: FileId) -> Option<PathBuf> {
        let records = self.records.read();
        let rec = records.get(id.as_usize())?;
        if rec.deleted {
            return None;
        }
        Some(rec.path.clone())
    }

    /// Record an extraction error against a file.
    pub fn set_error(&self, id: FileId, error: Option<String>) {
        let mut records = self.records.write();
        if let Some(rec) = records.get_mut(id.as_usize()) {
            rec.error = error;
        }
    }

    pub fn is_deleted(&self, id: FileId) -> bool {
        let records = self.records.read();
        records.get(id.as_usize()).is_none_or(|r| r.deleted)
    }

    /// All live FileIds, ascending.
    pub fn enumerate(&self) -> Vec<FileId> {
        let records = self.records.read();
        records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.deleted)
            .map(|(i, _)| FileId(i as u32))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().iter().filter(|r| !r.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_size(&self) -> u64 {
        self.records
            .read()
            .iter()
            .filter(|r| !r.deleted)
            .map(|r| r.size)
            .sum()
    }

    /// Drop everything, including tombstones. FileIds restart at 0; this is
    /// the only point ids are recycled.
    pub fn reset(&self) {
        self.records.write().clear();
        self.by_path.clear();
    }
}

/// Normalize a path to absolute and lexically cleaned (no `.`/`..`
/// components), without touching the filesystem. Case is preserved.
pub fn normalize_path(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(store: &FileStore, path: &str, content: &str) -> FileId {
        store.add(
            PathBuf::from(path),
            Arc::from(content),
            SystemTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn add_lookup_info() {
        let store = FileStore::new();
        let id = add(&store, "/repo/src/mux.go", "package mux\n");
        assert_eq!(store.lookup(Path::new("/repo/src/mux.go")), Some(id));
        let info = store.info(id).unwrap();
        assert_eq!(info.language, Language::Go);
        assert_eq!(info.size, 12);
        assert_eq!(store.content(id).unwrap().as_ref(), "package mux\n");
    }

    #[test]
    fn ids_are_dense_and_stable() {
        let store = FileStore::new();
        let a = add(&store, "/r/a.go", "a");
        let b = add(&store, "/r/b.go", "b");
        assert_eq!(a, FileId(0));
        assert_eq!(b, FileId(1));
        // Re-adding a known path refreshes in place
        let a2 = add(&store, "/r/a.go", "aa");
        assert_eq!(a2, a);
        assert_eq!(store.content(a).unwrap().as_ref(), "aa");
    }

    #[test]
    fn tombstone_reads_degrade_to_none() {
        let store = FileStore::new();
        let id = add(&store, "/r/gone.py", "x = 1\n");
        store.remove(id);
        assert!(store.info(id).is_none());
        assert!(store.content(id).is_none());
        assert!(store.lookup(Path::new("/r/gone.py")).is_none());
        assert!(store.is_deleted(id));
        assert!(store.enumerate().is_empty());
    }

    #[test]
    fn revive_after_tombstone_keeps_id() {
        let store = FileStore::new();
        let id = add(&store, "/r/x.ts", "let a = 1\n");
        store.remove(id);
        let revived = add(&store, "/r/x.ts", "let a = 2\n");
        // The path map entry is gone, so this allocates a fresh id; the old
        // one stays tombstoned until reset.
        assert_ne!(revived, id);
        store.reset();
        let fresh = add(&store, "/r/x.ts", "let a = 3\n");
        assert_eq!(fresh, FileId(0));
    }

    #[test]
    fn normalize_cleans_lexically() {
        let root = Path::new("/repo");
        assert_eq!(
            normalize_path(root, Path::new("src/./a/../b.go")),
            PathBuf::from("/repo/src/b.go")
        );
        assert_eq!(
            normalize_path(root, Path::new("/abs/x.py")),
            PathBuf::from("/abs/x.py")
        );
        // Case preserved
        assert_eq!(
            normalize_path(root, Path::new("Src/App.TSX")),
            PathBuf::from("/repo/Src/App.TSX")
        );
    }
}
