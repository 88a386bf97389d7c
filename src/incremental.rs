//! Incremental indexing engine.
//!
//! One write path for everything: extraction runs outside the locks (it is
//! a pure function of content), then a single commit takes the writer
//! locks in fixed order (trigram, symbols, deps), purges prior entries
//! and installs the new ones. A failed extraction therefore never purges:
//! the file keeps its prior index data and is marked with the error.
//! After a commit, dependents are re-linked up to the cascade depth.

use crate::coordinator::{CancelToken, IndexKind, IndexState};
use crate::deps::DEFAULT_CASCADE_DEPTH;
use crate::discovery::FileDiscovery;
use crate::error::{IndexError, Result};
use crate::parsing::extractor_for;
use crate::state::Engine;
use crate::store::normalize_path;
use crate::types::{ExtractionResult, FileId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Outcome of a scan or batch.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub total_files: usize,
    pub indexed: usize,
    pub deleted: usize,
    pub failed: usize,
    pub oversized: usize,
    pub evicted: usize,
}

/// A file prepared for commit: content read and extraction done, nothing
/// installed yet.
struct Prepared {
    file: FileId,
    path: PathBuf,
    content: Arc<str>,
    mtime: SystemTime,
    extraction: ExtractionResult,
    /// Extraction produced nothing at all; keep prior index data.
    failed: bool,
}

pub struct IncrementalIndexer;

impl IncrementalIndexer {
    pub fn new() -> Self {
        Self
    }

    /// Full scan: discover the corpus, extract on the indexing worker pool,
    /// commit, link, and flip the engine to ready.
    pub fn full_index(&self, engine: &Engine, cancel: &CancelToken) -> Result<ScanReport> {
        tracing::info!(root = %engine.config.root.display(), "starting full index");
        engine.store.reset();
        *engine.trigram.write() = Default::default();
        *engine.symbols.write() = Default::default();
        *engine.deps.write() = Default::default();

        let corpus = FileDiscovery::new(&engine.config)
            .discover()
            .map_err(|e| IndexError::Internal(format!("discovery: {e}")))?;

        let mut report = ScanReport {
            total_files: corpus.files.len(),
            oversized: corpus.oversized.len(),
            evicted: corpus.evicted,
            ..Default::default()
        };

        let paths: Vec<PathBuf> = corpus.files.into_iter().map(|f| f.path).collect();
        let prepared = self.prepare_parallel(engine, &paths, cancel)?;
        report.indexed = prepared.len();
        report.failed = prepared.iter().filter(|p| p.failed).count();

        self.commit(engine, prepared, cancel)?;

        engine
            .coordinator
            .set_all(IndexState::Ready, "initial scan complete");
        engine.set_ready(true);

        let stats = engine.stats();
        tracing::info!(
            files = stats.files,
            symbols = stats.symbols,
            references = stats.references,
            trigrams = stats.trigrams,
            "full index complete"
        );
        Ok(report)
    }

    /// Index one file (create or modify). When extraction produces nothing
    /// at all, the prior index data stays in place and the failure is
    /// reported.
    pub fn index_file(&self, engine: &Engine, path: &Path) -> Result<FileId> {
        let prepared = self.prepare(engine, path)?;
        let file = prepared.file;
        let failure = prepared
            .failed
            .then(|| prepared.extraction.error.clone().unwrap_or_default());
        self.commit(engine, vec![prepared], &CancelToken::new())?;
        match failure {
            Some(error) => Err(IndexError::ExtractionFailed(error)),
            None => Ok(file),
        }
    }

    /// Delete a file: purge postings, symbols and edges, tombstone the id,
    /// and re-link dependents whose references just went stale.
    pub fn delete_file(&self, engine: &Engine, path: &Path) -> Result<()> {
        let path = normalize_path(&engine.config.root, path);
        let Some(file) = engine.store.lookup(&path) else {
            return Ok(());
        };

        engine
            .coordinator
            .set_all(IndexState::Indexing, "deleting file");
        let dependents;
        {
            // Fixed lock order: trigram, symbols, deps
            let mut trigram = engine.trigram.write();
            let mut symbols = engine.symbols.write();
            let mut deps = engine.deps.write();
            engine.coordinator.begin_write(IndexKind::Trigram);
            engine.coordinator.begin_write(IndexKind::Symbols);
            engine.coordinator.begin_write(IndexKind::Deps);

            dependents = deps.dependents_of(file, DEFAULT_CASCADE_DEPTH);
            trigram.remove_file(file);
            symbols.remove_file(file);
            deps.remove_file(file);
            engine.store.remove(file);

            engine.coordinator.end_write(IndexKind::Deps);
            engine.coordinator.end_write(IndexKind::Symbols);
            engine.coordinator.end_write(IndexKind::Trigram);
        }
        engine
            .coordinator
            .set_all(IndexState::Ready, "delete committed");

        self.relink(engine, &dependents);
        Ok(())
    }

    /// Batch entry point used by the watcher: coalesced paths, one lock
    /// acquisition. Missing paths are treated as deletions. Per-file
    /// failures do not abort the batch.
    pub fn index_batch(&self, engine: &Engine, paths: &[PathBuf]) -> ScanReport {
        let mut report = ScanReport {
            total_files: paths.len(),
            ..Default::default()
        };
        let mut prepared = Vec::new();
        for path in paths {
            let normalized = normalize_path(&engine.config.root, path);
            if !normalized.exists() {
                if self.delete_file(engine, &normalized).is_ok() {
                    report.deleted += 1;
                }
                continue;
            }
            match self.prepare(engine, &normalized) {
                Ok(p) => {
                    if p.failed {
                        report.failed += 1;
                    }
                    report.indexed += 1;
                    prepared.push(p);
                }
                Err(e) => {
                    tracing::warn!(path = %normalized.display(), error = %e, "failed to index");
                    report.failed += 1;
                }
            }
        }
        if let Err(e) = self.commit(engine, prepared, &CancelToken::new()) {
            tracing::warn!(error = %e, "batch commit failed");
        }
        report
    }

    // ========================================================================
    // Preparation (outside any lock)
    // ========================================================================

    fn prepare(&self, engine: &Engine, path: &Path) -> Result<Prepared> {
        let path = normalize_path(&engine.config.root, path);
        let metadata = std::fs::metadata(&path)?;
        if metadata.len() > engine.config.max_file_size {
            return Err(IndexError::FileTooLarge {
                path,
                size: metadata.len(),
                limit: engine.config.max_file_size,
            });
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| IndexError::Internal(format!("{}: {e}", path.display())))?;
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        self.prepare_content(engine, &path, Arc::from(content), mtime)
    }

    fn prepare_content(
        &self,
        engine: &Engine,
        path: &Path,
        content: Arc<str>,
        mtime: SystemTime,
    ) -> Result<Prepared> {
        let path = normalize_path(&engine.config.root, path);
        // Existing ids are reused so readers' handles stay valid; the store
        // content is replaced at commit time, not here.
        let file = engine
            .store
            .lookup(&path)
            .unwrap_or_else(|| engine.store.add(path.clone(), content.clone(), mtime));

        let language = crate::types::Language::from_path(&path);
        let extraction = extractor_for(language).extract(file, &content);
        let failed = extraction.error.is_some()
            && extraction.symbols.is_empty()
            && extraction.references.is_empty()
            && extraction.ranges.is_empty()
            && language.is_first_class();

        Ok(Prepared {
            file,
            path,
            content,
            mtime,
            extraction,
            failed,
        })
    }

    fn prepare_parallel(
        &self,
        engine: &Engine,
        paths: &[PathBuf],
        cancel: &CancelToken,
    ) -> Result<Vec<Prepared>> {
        let workers = engine.config.indexing_worker_count().max(1);
        let chunk_size = paths.len().div_ceil(workers).max(1);

        let mut prepared: Vec<Prepared> = std::thread::scope(|scope| {
            let handles: Vec<_> = paths
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        let mut out = Vec::with_capacity(chunk.len());
                        for path in chunk {
                            if cancel.is_cancelled() {
                                return Err(IndexError::Cancelled);
                            }
                            match self.prepare(engine, path) {
                                Ok(p) => out.push(p),
                                Err(e) => {
                                    tracing::warn!(path = %path.display(), error = %e, "skipping file");
                                }
                            }
                        }
                        Ok(out)
                    })
                })
                .collect();
            let mut all = Vec::new();
            for handle in handles {
                match handle.join() {
                    Ok(Ok(chunk)) => all.extend(chunk),
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(IndexError::Internal("indexing worker panicked".into())),
                }
            }
            Ok(all)
        })?;

        // Deterministic install order regardless of worker interleaving
        prepared.sort_by_key(|p| p.file);
        Ok(prepared)
    }

    // ========================================================================
    // Commit (all three writer locks, fixed order)
    // ========================================================================

    fn commit(&self, engine: &Engine, prepared: Vec<Prepared>, cancel: &CancelToken) -> Result<()> {
        if prepared.is_empty() {
            return Ok(());
        }
        for kind in IndexKind::ALL {
            engine.coordinator.enqueue(kind);
        }
        engine
            .coordinator
            .set_all(IndexState::Blocked, "commit queued, waiting for writers");

        let committed: Vec<FileId>;
        {
            // Fixed lock order: trigram, symbols, deps. Held for the whole
            // batch so readers see pre- or post-commit state, never a mix.
            let mut trigram = engine.trigram.write();
            let mut symbols = engine.symbols.write();
            let mut deps = engine.deps.write();
            engine.coordinator.begin_write(IndexKind::Trigram);
            engine.coordinator.begin_write(IndexKind::Symbols);
            engine.coordinator.begin_write(IndexKind::Deps);
            engine
                .coordinator
                .set_all(IndexState::Indexing, "commit in progress");

            let mut done = Vec::with_capacity(prepared.len());
            for p in prepared {
                if cancel.is_cancelled() {
                    break; // committed files stay committed
                }
                if p.failed {
                    engine.store.set_error(p.file, p.extraction.error.clone());
                    tracing::warn!(path = %p.path.display(), "extraction failed, keeping prior index data");
                    continue;
                }
                engine.store.update(p.file, p.content.clone(), p.mtime);
                engine.store.set_error(p.file, p.extraction.error.clone());

                trigram.remove_file(p.file);
                trigram.add_file(p.file, &p.content, p.extraction.ranges.clone());

                // Carries incoming references across renames, so dependents
                // keep pointing at a renamed definition
                symbols.replace_file(p.file, p.extraction.symbols, p.extraction.references);

                let imports: Vec<FileId> = p
                    .extraction
                    .imports
                    .iter()
                    .filter_map(|imp| resolve_import(engine, &p.path, &imp.target))
                    .collect();
                deps.set_imports(p.file, imports);

                done.push(p.file);
            }
            committed = done;

            engine.coordinator.end_write(IndexKind::Deps);
            engine.coordinator.end_write(IndexKind::Symbols);
            engine.coordinator.end_write(IndexKind::Trigram);
        }
        for kind in IndexKind::ALL {
            engine.coordinator.dequeue(kind);
        }
        engine
            .coordinator
            .set_all(IndexState::Ready, "commit complete");

        // Re-resolution: the committed files plus their reverse closure
        let mut to_link = committed.clone();
        {
            let deps = engine.deps.read();
            for &file in &committed {
                for dep in deps.dependents_of(file, DEFAULT_CASCADE_DEPTH) {
                    if !to_link.contains(&dep) {
                        to_link.push(dep);
                    }
                }
            }
        }
        to_link.sort_unstable();
        self.relink(engine, &to_link);

        // Committed state stays committed; cancellation only stops the rest.
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        Ok(())
    }

    /// Link (or re-link) references for a set of files.
    fn relink(&self, engine: &Engine, files: &[FileId]) {
        if files.is_empty() {
            return;
        }
        // Lock order: symbols before deps
        let mut symbols = engine.symbols.write();
        let deps = engine.deps.read();
        engine.coordinator.begin_write(IndexKind::Symbols);
        for &file in files {
            if engine.store.is_deleted(file) {
                continue;
            }
            let imported: Vec<FileId> = deps.imports_of(file).to_vec();
            symbols.link_file(file, &imported);
        }
        engine.coordinator.end_write(IndexKind::Symbols);
    }
}

impl Default for IncrementalIndexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a textual import target to a live file.
///
/// Relative specifiers resolve against the importing file's directory with
/// the JS extension/index probes; dotted module paths resolve against the
/// root the Python way; everything else falls back to a directory-suffix
/// probe, which covers Go package paths.
fn resolve_import(engine: &Engine, importer: &Path, target: &str) -> Option<FileId> {
    let store = &engine.store;
    let root = &engine.config.root;

    // Relative: ./x, ../x
    if let Some(parent) = importer.parent().filter(|_| target.starts_with('.')) {
        let base = normalize_path(parent, Path::new(target));
        let probes = [
            base.clone(),
            base.with_extension("ts"),
            base.with_extension("tsx"),
            base.with_extension("js"),
            base.with_extension("jsx"),
            base.join("index.ts"),
            base.join("index.tsx"),
            base.join("index.js"),
            base.join("index.jsx"),
            base.with_extension("py"),
        ];
        return probes.iter().find_map(|p| store.lookup(p));
    }

    // Dotted module path: pkg.mod
    if target.contains('.') && !target.contains('/') {
        let rel: PathBuf = target.split('.').collect();
        let probes = [
            root.join(&rel).with_extension("py"),
            root.join(&rel).join("__init__.py"),
        ];
        if let Some(id) = probes.iter().find_map(|p| store.lookup(p)) {
            return Some(id);
        }
    }

    // Bare module: root-level file probes, then a directory-suffix scan
    // (Go import paths name the package directory)
    let probes = [
        root.join(target).with_extension("py"),
        root.join(target).with_extension("go"),
        root.join(target).with_extension("ts"),
        root.join(target).with_extension("js"),
    ];
    if let Some(id) = probes.iter().find_map(|p| store.lookup(p)) {
        return Some(id);
    }

    let suffix = Path::new(target);
    store
        .enumerate()
        .into_iter()
        .find(|id| {
            store.path_of(*id).is_some_and(|p| {
                p.parent()
                    .is_some_and(|dir| dir.ends_with(suffix) && p != importer)
            })
        })
        .filter(|_| !target.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;

    fn engine_for(dir: &Path) -> Engine {
        Engine::new(Config::for_root(dir.to_path_buf()))
    }

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn index_and_delete_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.go", "package a\n\nfunc Foo() {}\n");
        let engine = engine_for(dir.path());
        let indexer = IncrementalIndexer::new();

        indexer.index_file(&engine, &path).unwrap();
        assert_eq!(engine.symbols.read().definition("Foo").len(), 1);
        assert!(engine.trigram.read().contains_file(FileId(0)));

        indexer.delete_file(&engine, &path).unwrap();
        assert!(engine.symbols.read().definition("Foo").is_empty());
        assert!(!engine.trigram.read().contains_file(FileId(0)));
        assert!(engine.store.is_deleted(FileId(0)));
    }

    #[test]
    fn reindex_replaces_not_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.go", "package a\n\nfunc Foo() {}\n");
        let engine = engine_for(dir.path());
        let indexer = IncrementalIndexer::new();

        let id1 = indexer.index_file(&engine, &path).unwrap();
        write(dir.path(), "a.go", "package a\n\nfunc Renamed() {}\n");
        let id2 = indexer.index_file(&engine, &path).unwrap();

        assert_eq!(id1, id2);
        assert!(engine.symbols.read().definition("Foo").is_empty());
        assert_eq!(engine.symbols.read().definition("Renamed").len(), 1);
    }

    #[test]
    fn reindexing_unchanged_content_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.py", "def handler():\n    pass\n");
        let engine = engine_for(dir.path());
        let indexer = IncrementalIndexer::new();

        indexer.index_file(&engine, &path).unwrap();
        let before = {
            let symbols = engine.symbols.read();
            let trigram = engine.trigram.read();
            (
                symbols.symbol_count(),
                symbols.definition("handler").len(),
                trigram.trigrams_of(FileId(0)),
            )
        };
        indexer.index_file(&engine, &path).unwrap();
        let after = {
            let symbols = engine.symbols.read();
            let trigram = engine.trigram.read();
            (
                symbols.symbol_count(),
                symbols.definition("handler").len(),
                trigram.trigrams_of(FileId(0)),
            )
        };
        assert_eq!(before, after);
    }

    #[test]
    fn full_index_flips_readiness() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m.py", "def main():\n    run()\n");
        write(dir.path(), "util.py", "def run():\n    pass\n");
        let engine = engine_for(dir.path());
        let indexer = IncrementalIndexer::new();

        assert!(!engine.is_ready());
        let report = indexer
            .full_index(&engine, &CancelToken::new())
            .unwrap();
        assert!(engine.is_ready());
        assert_eq!(report.indexed, 2);
        assert!(engine.coordinator.all_ready());
    }

    #[test]
    fn dependent_relinks_after_target_rename() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.py", "def Bar():\n    pass\n");
        write(dir.path(), "a.py", "import b\n\ndef use():\n    Bar()\n");
        let engine = engine_for(dir.path());
        let indexer = IncrementalIndexer::new();
        indexer.full_index(&engine, &CancelToken::new()).unwrap();

        let a = engine.store.lookup(&dir.path().join("a.py")).unwrap();
        let b = engine.store.lookup(&dir.path().join("b.py")).unwrap();
        assert_eq!(engine.deps.read().imports_of(a), &[b]);

        // The call in a.py resolves into b.py
        {
            let symbols = engine.symbols.read();
            let bar = symbols.definition("Bar");
            assert_eq!(bar.len(), 1);
            assert_eq!(symbols.references(bar[0].id), vec![(a, 4, 5)]);
        }

        // Rename Bar -> Baz in b.py; the call site in a.py must follow the
        // rename once the commit lands
        write(dir.path(), "b.py", "def Baz():\n    pass\n");
        indexer.index_file(&engine, &dir.path().join("b.py")).unwrap();

        let symbols = engine.symbols.read();
        assert!(symbols.definition("Bar").is_empty());
        let baz = symbols.definition("Baz");
        assert_eq!(baz.len(), 1);
        // The carried binding survives the dependent re-link
        assert_eq!(symbols.references(baz[0].id), vec![(a, 4, 5)]);
        let a_refs = symbols.refs_of_file(a);
        assert!(
            a_refs
                .iter()
                .any(|r| r.rec.name == "Bar" && r.target == Some(baz[0].id))
        );
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "big.go", &"x".repeat(64));
        let mut config = Config::for_root(dir.path().to_path_buf());
        config.max_file_size = 16;
        let engine = Engine::new(config);
        let err = IncrementalIndexer::new()
            .index_file(&engine, &path)
            .unwrap_err();
        assert!(matches!(err, IndexError::FileTooLarge { .. }));
    }
}
