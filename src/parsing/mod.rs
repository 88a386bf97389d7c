//! Language extractors.
//!
//! Each extractor turns file content into symbols, references, import
//! edges and classified byte ranges. Extractors are pure functions of
//! content: no I/O, deterministic ordering by source position. Instances
//! are shared and reused across files; the tree-sitter `Parser` itself is
//! created per call since it is not `Sync`.

pub mod go;
pub mod javascript;
pub mod python;
pub mod text;

use crate::types::{ClassifiedRange, ExtractionResult, FileId, Language, RangeKind};
use std::sync::LazyLock;
use tree_sitter::Node;

/// Explicit capability table; trigram emission is implicit for every file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub symbols: bool,
    pub references: bool,
    pub scopes: bool,
}

/// A language extractor.
pub trait Extractor: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Extract everything this language supports from `content`.
    ///
    /// A broken parse still returns whatever was produced, with
    /// `ExtractionResult::error` set.
    fn extract(&self, file_id: FileId, content: &str) -> ExtractionResult;
}

static GO: LazyLock<go::GoExtractor> = LazyLock::new(go::GoExtractor::new);
static JAVASCRIPT: LazyLock<javascript::JsExtractor> =
    LazyLock::new(javascript::JsExtractor::javascript);
static TYPESCRIPT: LazyLock<javascript::JsExtractor> =
    LazyLock::new(javascript::JsExtractor::typescript);
static TSX: LazyLock<javascript::JsExtractor> = LazyLock::new(javascript::JsExtractor::tsx);
static PYTHON: LazyLock<python::PythonExtractor> = LazyLock::new(python::PythonExtractor::new);
static TEXT: LazyLock<text::TextExtractor> = LazyLock::new(text::TextExtractor::new);

/// Shared extractor instance for a language.
pub fn extractor_for(language: Language) -> &'static dyn Extractor {
    match language {
        Language::Go => &*GO,
        Language::JavaScript | Language::Jsx => &*JAVASCRIPT,
        Language::TypeScript => &*TYPESCRIPT,
        Language::Tsx => &*TSX,
        Language::Python => &*PYTHON,
        Language::Text => &*TEXT,
    }
}

// ============================================================================
// Shared walker helpers
// ============================================================================

pub(crate) fn node_text<'a>(source: &'a str, node: Node) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// 1-based line of a node's start.
pub(crate) fn line_of(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

/// 1-based column of a node's start.
pub(crate) fn column_of(node: Node) -> u32 {
    node.start_position().column as u32 + 1
}

/// 1-based last line of a node.
pub(crate) fn end_line_of(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}

/// Declaration head: source from the node start up to its body, or the
/// whole first line when there is no body field.
pub(crate) fn signature_of(source: &str, node: Node) -> String {
    let end = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or(node.end_byte());
    let head = source.get(node.start_byte()..end).unwrap_or("");
    let head = head.lines().collect::<Vec<_>>().join(" ");
    head.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collect comment and string ranges for the whole tree. Anything not
/// covered is code.
pub(crate) fn classify_ranges(
    root: Node,
    comment_kinds: &[&str],
    string_kinds: &[&str],
) -> Vec<ClassifiedRange> {
    let mut ranges = Vec::new();
    collect_ranges(root, comment_kinds, string_kinds, &mut ranges);
    ranges.sort_by_key(|r| r.start);
    ranges
}

fn collect_ranges(
    node: Node,
    comment_kinds: &[&str],
    string_kinds: &[&str],
    out: &mut Vec<ClassifiedRange>,
) {
    let kind = node.kind();
    if comment_kinds.contains(&kind) {
        out.push(ClassifiedRange {
            start: node.start_byte() as u32,
            end: node.end_byte() as u32,
            kind: RangeKind::Comment,
        });
        return;
    }
    if string_kinds.contains(&kind) {
        out.push(ClassifiedRange {
            start: node.start_byte() as u32,
            end: node.end_byte() as u32,
            kind: RangeKind::Str,
        });
        return;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_ranges(child, comment_kinds, string_kinds, out);
        }
    }
}

/// Count branch points under a node for the complexity metric.
pub(crate) fn count_branches(node: Node, branch_kinds: &[&str]) -> u32 {
    let mut count = u32::from(branch_kinds.contains(&node.kind()));
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            count += count_branches(child, branch_kinds);
        }
    }
    count
}

/// Last `identifier`-ish segment of an expression's text, e.g. the method
/// name of a selector/member expression.
pub(crate) fn last_ident_of(source: &str, node: Node) -> Option<String> {
    let text = node_text(source, node);
    let mut best = None;
    for part in text.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
        if !part.is_empty() {
            best = Some(part);
        }
    }
    best.map(|s| s.to_string())
}

/// Parse with a fresh parser, reporting failures through the result.
pub(crate) fn parse_with(
    language: &tree_sitter::Language,
    content: &str,
) -> Result<tree_sitter::Tree, String> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(language)
        .map_err(|e| format!("grammar load: {e}"))?;
    parser
        .parse(content, None)
        .ok_or_else(|| "parse returned no tree".to_string())
}
