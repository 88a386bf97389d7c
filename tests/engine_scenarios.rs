//! End-to-end engine scenarios: phrase ranking, incremental deletion, and
//! dependent invalidation across files.

use lci::config::Config;
use lci::coordinator::CancelToken;
use pretty_assertions::assert_eq;
use lci::incremental::IncrementalIndexer;
use lci::search::{QueryMode, SearchOrchestrator};
use lci::state::Engine;
use lci::types::SearchOptions;
use std::fs;
use std::path::{Path, PathBuf};

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn scan(engine: &Engine) {
    IncrementalIndexer::new()
        .full_index(engine, &CancelToken::new())
        .unwrap();
}

#[test]
fn phrase_query_ranks_serve_http_first() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "mux.go",
        "package mux\n\ntype Mux struct{}\n\nfunc (mux *Mux) ServeHTTP(w http.ResponseWriter, r *http.Request) {\n}\n\nfunc serveStatic() {}\n\nfunc httpClient() {}\n",
    );
    let engine = Engine::new(Config::for_root(dir.path().to_path_buf()));
    scan(&engine);

    let response = SearchOrchestrator::new()
        .query(
            &engine,
            "serve http",
            &SearchOptions::default(),
            QueryMode::Auto,
            &CancelToken::new(),
        )
        .unwrap();

    assert!(!response.symbols.is_empty());
    let top = &response.symbols[0];
    assert_eq!(top.name, "ServeHTTP");
    assert!(top.score > 100.0, "score {}", top.score);
    for other in &response.symbols[1..] {
        assert!(top.score >= other.score);
    }
}

#[test]
fn delete_removes_definitions_and_search_hits() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "a.go", "package a\n\nfunc Foo() {}\n");
    let engine = Engine::new(Config::for_root(dir.path().to_path_buf()));
    let indexer = IncrementalIndexer::new();
    scan(&engine);

    assert_eq!(engine.symbols.read().definition("Foo").len(), 1);
    let hits = SearchOrchestrator::new()
        .query(
            &engine,
            "Foo",
            &SearchOptions::default(),
            QueryMode::Literal,
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(hits.matches.len(), 1);

    fs::remove_file(&path).unwrap();
    indexer.delete_file(&engine, &path).unwrap();

    assert!(engine.symbols.read().definition("Foo").is_empty());
    let hits = SearchOrchestrator::new()
        .query(
            &engine,
            "Foo",
            &SearchOptions::default(),
            QueryMode::Literal,
            &CancelToken::new(),
        )
        .unwrap();
    assert!(hits.matches.is_empty());
    assert!(hits.symbols.is_empty());
}

#[test]
fn dependent_call_sites_follow_a_rename() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "b.go", "package b\n\nfunc Bar() {}\n");
    write(
        dir.path(),
        "a.go",
        "package a\n\nimport \"b\"\n\nfunc use() {\n\tBar()\n}\n",
    );
    let engine = Engine::new(Config::for_root(dir.path().to_path_buf()));
    let indexer = IncrementalIndexer::new();
    scan(&engine);

    let a = engine.store.lookup(&dir.path().join("a.go")).unwrap();
    let b = engine.store.lookup(&dir.path().join("b.go")).unwrap();
    assert_eq!(engine.deps.read().imports_of(a), &[b]);
    assert_eq!(engine.deps.read().importers_of(b), &[a]);

    {
        let symbols = engine.symbols.read();
        let bar = symbols.definition("Bar");
        assert_eq!(bar.len(), 1);
        let refs = symbols.references(bar[0].id);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].0, a);
    }

    // Rename Bar -> Baz in b.go only; after the batch commits the call
    // site in a.go must follow the rename
    write(dir.path(), "b.go", "package b\n\nfunc Baz() {}\n");
    indexer.index_batch(&engine, &[dir.path().join("b.go")]);

    let symbols = engine.symbols.read();
    assert!(symbols.definition("Bar").is_empty());
    let baz = symbols.definition("Baz");
    assert_eq!(baz.len(), 1);
    assert_eq!(
        symbols.references(baz[0].id),
        vec![(a, 6, 2)],
        "call site in a.go must rebind to Baz"
    );
}

#[test]
fn breadcrumbs_follow_scope_chain() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "worker.py",
        "class Pool:\n    def spawn(self, task):\n        pass\n",
    );
    let engine = Engine::new(Config::for_root(dir.path().to_path_buf()));
    scan(&engine);

    let symbols = engine.symbols.read();
    let spawn = symbols.definition("spawn");
    assert_eq!(spawn.len(), 1);
    let crumbs = symbols.breadcrumbs(spawn[0].id).unwrap();
    assert_eq!(crumbs, vec!["Pool".to_string()]);
}

#[test]
fn code_comment_string_filters() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "c.go",
        "package c\n\n// keyword in a comment\nvar s = \"keyword in a string\"\n\nfunc keyword() {}\n",
    );
    let engine = Engine::new(Config::for_root(dir.path().to_path_buf()));
    scan(&engine);
    let orchestrator = SearchOrchestrator::new();

    let all = orchestrator
        .query(
            &engine,
            "keyword",
            &SearchOptions::default(),
            QueryMode::Literal,
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(all.matches.len(), 3);

    let comments = orchestrator
        .query(
            &engine,
            "keyword",
            &SearchOptions {
                comments_only: true,
                ..Default::default()
            },
            QueryMode::Literal,
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(comments.matches.len(), 1);
    assert_eq!(comments.matches[0].line, 3);

    let strings = orchestrator
        .query(
            &engine,
            "keyword",
            &SearchOptions {
                strings_only: true,
                ..Default::default()
            },
            QueryMode::Literal,
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(strings.matches.len(), 1);
    assert_eq!(strings.matches[0].line, 4);

    let code = orchestrator
        .query(
            &engine,
            "keyword",
            &SearchOptions {
                code_only: true,
                ..Default::default()
            },
            QueryMode::Literal,
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(code.matches.len(), 1);
    assert_eq!(code.matches[0].line, 6);
}

#[test]
fn call_tree_spans_files() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "util.py",
        "def leaf():\n    pass\n",
    );
    write(
        dir.path(),
        "main.py",
        "import util\n\ndef top():\n    middle()\n\ndef middle():\n    leaf()\n",
    );
    let engine = Engine::new(Config::for_root(dir.path().to_path_buf()));
    scan(&engine);

    let symbols = engine.symbols.read();
    let tree = symbols.call_tree("top", 8).unwrap();
    assert_eq!(tree.name, "top");
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].name, "middle");
    assert_eq!(tree.children[0].children.len(), 1);
    assert_eq!(tree.children[0].children[0].name, "leaf");
}
