//! Grep-compatibility contract: literal search must return exactly the
//! `(file, line, column)` tuples a line-by-line reference scan produces,
//! 1-based, in both case modes.

use lci::config::Config;
use lci::coordinator::CancelToken;
use lci::incremental::IncrementalIndexer;
use lci::search::{QueryMode, SearchOrchestrator};
use lci::state::Engine;
use lci::types::SearchOptions;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Reference implementation: the set of (file, line, column) tuples
/// `grep -n` would report, with the column of the first match per line.
fn reference_grep(
    files: &[(&str, &str)],
    pattern: &str,
    case_insensitive: bool,
) -> BTreeSet<(String, u32, u32)> {
    let mut out = BTreeSet::new();
    for (name, content) in files {
        for (line_idx, line) in content.lines().enumerate() {
            let found = if case_insensitive {
                line.to_lowercase().find(&pattern.to_lowercase())
            } else {
                line.find(pattern)
            };
            if let Some(byte) = found {
                out.insert((name.to_string(), line_idx as u32 + 1, byte as u32 + 1));
            }
        }
    }
    out
}

fn build_engine(dir: &Path, files: &[(&str, &str)]) -> Engine {
    let engine = Engine::new(Config::for_root(dir.to_path_buf()));
    let indexer = IncrementalIndexer::new();
    for (rel, content) in files {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        indexer.index_file(&engine, &path).unwrap();
    }
    engine
}

fn run_search(
    engine: &Engine,
    pattern: &str,
    case_insensitive: bool,
) -> BTreeSet<(String, u32, u32)> {
    let options = SearchOptions {
        case_insensitive,
        ..Default::default()
    };
    SearchOrchestrator::new()
        .query(
            engine,
            pattern,
            &options,
            QueryMode::Literal,
            &CancelToken::new(),
        )
        .unwrap()
        .matches
        .into_iter()
        .map(|m| (m.file, m.line, m.column))
        .collect()
}

const CORPUS: &[(&str, &str)] = &[
    (
        "src/auth.go",
        "package auth\n\nfunc Check(token string) error {\n\tif token == \"\" {\n\t\treturn errors.New(\"invalid credentials\")\n\t}\n\treturn nil\n}\n",
    ),
    (
        "src/handler.py",
        "def handle(request):\n    # Invalid requests are rejected early\n    if not request.valid:\n        raise ValueError('invalid credentials')\n    return dispatch(request)\n",
    ),
    (
        "notes.txt",
        "credentials rotate monthly\nInvalid Credentials should never be logged\nmixed CrEdEnTiAlS case here\n",
    ),
];

#[test]
fn literal_parity_on_common_patterns() {
    let dir = tempfile::tempdir().unwrap();
    let engine = build_engine(dir.path(), CORPUS);

    for pattern in [
        "invalid credentials",
        "credentials",
        "request",
        "return",
        "token",
        "e", // single byte, linear-scan path
        "ed", // two bytes
        "never appears anywhere at all",
    ] {
        let expected = reference_grep(CORPUS, pattern, false);
        let actual = run_search(&engine, pattern, false);
        assert_eq!(actual, expected, "pattern {pattern:?}");
    }
}

#[test]
fn literal_parity_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    let engine = build_engine(dir.path(), CORPUS);

    for pattern in ["invalid credentials", "CREDENTIALS", "CrEdEnTiAlS", "Valid"] {
        let expected = reference_grep(CORPUS, pattern, true);
        let actual = run_search(&engine, pattern, true);
        assert_eq!(actual, expected, "pattern {pattern:?} (-i)");
    }
}

/// The pinned scenario: a match on line 24 column 24 reports exactly that,
/// not line 23.
#[test]
fn line_24_column_24_exactly() {
    let mut content = String::new();
    for i in 1..=23 {
        content.push_str(&format!("// filler line {i}\n"));
    }
    // 11 spaces + `return Err("` puts the match's first byte at 1-based
    // column 24
    content.push_str("           return Err(\"invalid credentials\".into());\n");
    let files = [("src/auth.rs", content.as_str())];

    let dir = tempfile::tempdir().unwrap();
    let engine = build_engine(dir.path(), &files);

    let hits = run_search(&engine, "invalid credentials", false);
    assert_eq!(hits.len(), 1);
    let (file, line, column) = hits.into_iter().next().unwrap();
    assert_eq!(file, "src/auth.rs");
    assert_eq!(line, 24);
    assert_eq!(column, 24);

    // And parity with the reference scan
    assert_eq!(
        run_search(&engine, "invalid credentials", false),
        reference_grep(&files, "invalid credentials", false)
    );
}

#[test]
fn multiple_matches_on_one_line_collapse_to_first_column() {
    let files = [("x.txt", "abc abc abc\nplain\n")];
    let dir = tempfile::tempdir().unwrap();
    let engine = build_engine(dir.path(), &files);

    let hits = run_search(&engine, "abc", false);
    assert_eq!(
        hits,
        BTreeSet::from([("x.txt".to_string(), 1, 1)]),
        "grep -n prints a matching line once, first column wins"
    );
}

#[test]
fn regex_line_numbers_match_literal_for_plain_patterns() {
    let dir = tempfile::tempdir().unwrap();
    let engine = build_engine(dir.path(), CORPUS);

    let literal = run_search(&engine, "credentials", false);
    let regex: BTreeSet<(String, u32, u32)> = SearchOrchestrator::new()
        .query(
            &engine,
            "credentials",
            &SearchOptions::default(),
            QueryMode::Regex,
            &CancelToken::new(),
        )
        .unwrap()
        .matches
        .into_iter()
        .map(|m| (m.file, m.line, m.column))
        .collect();
    assert_eq!(regex, literal);
}
