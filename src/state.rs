//! Engine state: every index behind its own reader-writer lock, owned by
//! one struct that the server holds for its lifetime.
//!
//! No process-global singletons; configuration is injected at
//! construction. Writers take the locks in fixed order (trigram → symbols
//! → deps); readers see a consistent snapshot of each index they hold a
//! read lock on.

use crate::config::Config;
use crate::coordinator::IndexCoordinator;
use crate::deps::DependencyTracker;
use crate::phrase::PhraseMatcher;
use crate::store::FileStore;
use crate::symbols::SymbolGraph;
use crate::trigram::TrigramIndex;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The resident index state.
pub struct Engine {
    pub config: Config,
    /// File store (internally synchronized).
    pub store: FileStore,
    /// Trigram posting index. Lock order: first.
    pub trigram: RwLock<TrigramIndex>,
    /// Symbol & reference graph. Lock order: second.
    pub symbols: RwLock<SymbolGraph>,
    /// Dependency tracker. Lock order: third.
    pub deps: RwLock<DependencyTracker>,
    pub coordinator: IndexCoordinator,
    pub phrase: PhraseMatcher,
    ready: AtomicBool,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let phrase = PhraseMatcher::new(config.enable_fuzzy);
        Self {
            config,
            store: FileStore::new(),
            trigram: RwLock::new(TrigramIndex::new()),
            symbols: RwLock::new(SymbolGraph::new()),
            deps: RwLock::new(DependencyTracker::new()),
            coordinator: IndexCoordinator::new(),
            phrase,
            ready: AtomicBool::new(false),
        }
    }

    /// Whether the initial scan has completed. Queries before readiness
    /// fail with `NotReady`.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Index-wide statistics.
    pub fn stats(&self) -> EngineStats {
        let trigram = self.trigram.read();
        let symbols = self.symbols.read();
        let deps = self.deps.read();

        let mut by_language: HashMap<String, usize> = HashMap::new();
        let mut errors = 0usize;
        for id in self.store.enumerate() {
            if let Some(info) = self.store.info(id) {
                *by_language
                    .entry(info.language.as_str().to_string())
                    .or_default() += 1;
                if info.error.is_some() {
                    errors += 1;
                }
            }
        }

        EngineStats {
            files: self.store.len(),
            total_bytes: self.store.total_size(),
            symbols: symbols.symbol_count(),
            references: symbols.reference_count(),
            unresolved_references: symbols.unresolved_count(),
            trigrams: trigram.trigram_count(),
            postings: trigram.posting_count(),
            dependency_edges: deps.edge_count(),
            files_with_errors: errors,
            by_language,
        }
    }

}

/// Index-wide statistics, served by the `Stats` RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub files: usize,
    pub total_bytes: u64,
    pub symbols: usize,
    pub references: usize,
    pub unresolved_references: usize,
    pub trigrams: usize,
    pub postings: usize,
    pub dependency_edges: usize,
    pub files_with_errors: usize,
    pub by_language: HashMap<String, usize>,
}

/// Shared engine handle.
pub type SharedEngine = Arc<Engine>;

/// Construct a shared engine for a root, loading `lci.json` when present.
pub fn create_engine(config: Config) -> SharedEngine {
    Arc::new(Engine::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_engine_is_not_ready() {
        let engine = Engine::new(Config::default());
        assert!(!engine.is_ready());
        engine.set_ready(true);
        assert!(engine.is_ready());
    }

    #[test]
    fn stats_on_empty_engine() {
        let engine = Engine::new(Config::default());
        let stats = engine.stats();
        assert_eq!(stats.files, 0);
        assert_eq!(stats.symbols, 0);
        assert_eq!(stats.trigrams, 0);
    }
}
