//! Core types for the code-intelligence index.
//!
//! This module defines the data structures shared across the layers:
//! the file store, the trigram posting index, the symbol/reference graph,
//! and the search path.

use crate::ids;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Unique identifier for files in the index.
///
/// Dense index into the file store, stable for the process lifetime.
/// Recycled only after a full rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Unique identifier for symbols: a packed `(FileId, local index)` pair
/// with the FileId in the low 32 bits.
///
/// Crossing the RPC boundary this is rendered as a base-63 string; every
/// internal API uses the raw integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u64);

impl SymbolId {
    pub fn new(file: FileId, local: u32) -> Self {
        Self(ids::pack_composite(file.0, local))
    }

    pub fn file(self) -> FileId {
        FileId(ids::unpack_composite(self.0).0)
    }

    pub fn local(self) -> u32 {
        ids::unpack_composite(self.0).1
    }

    /// Wire form of the id (base-63).
    pub fn encoded(self) -> String {
        ids::encode(self.0)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded())
    }
}

// ============================================================================
// Languages
// ============================================================================

/// Language tag attached to every file record.
///
/// First-class languages get full extraction; everything else is text-only
/// (trigrams, no symbols).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Go,
    JavaScript,
    Jsx,
    TypeScript,
    Tsx,
    Python,
    Text,
}

impl Language {
    /// Determine language from a file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("go") => Self::Go,
            Some("js") | Some("mjs") | Some("cjs") => Self::JavaScript,
            Some("jsx") => Self::Jsx,
            Some("ts") | Some("mts") | Some("cts") => Self::TypeScript,
            Some("tsx") => Self::Tsx,
            Some("py") => Self::Python,
            _ => Self::Text,
        }
    }

    /// Whether this language has a symbol extractor.
    pub fn is_first_class(self) -> bool {
        !matches!(self, Self::Text)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::JavaScript => "javascript",
            Self::Jsx => "jsx",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Python => "python",
            Self::Text => "text",
        }
    }
}

// ============================================================================
// Symbols and references
// ============================================================================

/// Kind of symbol in the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Type,
    Class,
    Interface,
    Variable,
    Constant,
    Field,
    Parameter,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Type => "type",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Field => "field",
            Self::Parameter => "parameter",
        }
    }
}

/// Visibility of a symbol, inferred from language rules (capitalization in
/// Go, `export` in JS/TS, underscore prefix in Python).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

/// Placeholder metrics attached to each symbol.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SymbolMetrics {
    /// Cyclomatic-complexity estimate.
    pub complexity: u32,
    /// Lines of code spanned by the definition.
    pub loc: u32,
    /// Purity, when an extractor can infer it.
    pub pure: Option<bool>,
}

/// A symbol definition produced by an extractor.
///
/// Owned exclusively by its file: deleting the file deletes the symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRec {
    /// Simple name (e.g. `ServeHTTP`).
    pub name: String,
    pub kind: SymbolKind,
    /// 1-based definition line.
    pub line: u32,
    /// 1-based definition column.
    pub column: u32,
    /// 1-based last line of the definition.
    pub end_line: u32,
    /// Raw source span of the declaration head.
    pub signature: String,
    pub visibility: Visibility,
    /// Enclosing scope chain, outermost first.
    pub scope: Vec<String>,
    /// Attributes / decorators, verbatim.
    pub attributes: Vec<String>,
    pub metrics: SymbolMetrics,
}

/// Kind of reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Call,
    Read,
    Write,
    Import,
    Inherit,
}

/// A reference produced by an extractor: a textual target name at a source
/// position. Resolution to a `SymbolId` happens at link time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceRec {
    /// Textual target name as written at the reference site.
    pub name: String,
    pub kind: RefKind,
    /// 1-based line of the reference.
    pub line: u32,
    /// 1-based column of the reference.
    pub column: u32,
    /// Enclosing scope chain at the reference site, outermost first.
    pub scope: Vec<String>,
}

/// An import edge produced by an extractor. The textual target is resolved
/// to a FileId later, against the file store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRec {
    /// Import target as written (module path, relative path, package).
    pub target: String,
    pub line: u32,
}

// ============================================================================
// Classified ranges
// ============================================================================

/// Classification of a byte range within file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    Code,
    Comment,
    Str,
}

/// A classified byte range. Offsets are byte positions, end exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassifiedRange {
    pub start: u32,
    pub end: u32,
    pub kind: RangeKind,
}

// ============================================================================
// Extraction result
// ============================================================================

/// Everything an extractor produces for one file.
///
/// Extractors are pure functions of content: deterministic, ordered by
/// source position, no I/O. A failed parse still yields whatever was
/// produced, with `error` set (partial extraction is accepted and recorded
/// against the FileId).
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub symbols: Vec<SymbolRec>,
    pub references: Vec<ReferenceRec>,
    pub imports: Vec<ImportRec>,
    pub ranges: Vec<ClassifiedRange>,
    /// Set when extraction was partial.
    pub error: Option<String>,
}

// ============================================================================
// Search
// ============================================================================

/// Options recognized by the search path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub case_insensitive: bool,
    /// Maximum results across all files; 0 = unlimited.
    pub max_results: u32,
    /// Maximum results per file; 0 = unlimited.
    pub max_count_per_file: u32,
    /// Skip files whose path matches this regex.
    pub exclude_regex: Option<String>,
    /// Only files whose path matches this regex.
    pub include_regex: Option<String>,
    pub exclude_tests: bool,
    pub exclude_comments: bool,
    pub code_only: bool,
    pub strings_only: bool,
    pub comments_only: bool,
    pub word_boundary: bool,
    pub invert_match: bool,
    pub context_lines: u32,
    /// Merge multiple hits in one file into a single result with
    /// `match_count`.
    pub merge_file_results: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            max_results: 0,
            max_count_per_file: 0,
            exclude_regex: None,
            include_regex: None,
            exclude_tests: false,
            exclude_comments: false,
            code_only: false,
            strings_only: false,
            comments_only: false,
            word_boundary: false,
            invert_match: false,
            context_lines: 0,
            merge_file_results: false,
        }
    }
}

/// A single search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    pub file: String,
    /// 1-based line of the first byte of the match.
    pub line: u32,
    /// 1-based column of the first byte of the match.
    pub column: u32,
    /// Full text of the matched line, without the trailing newline.
    pub line_text: String,
    /// Number of hits merged into this result (1 unless merging).
    pub match_count: u32,
    /// Context lines as `(line_number, text)`, when requested.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub context: Vec<(u32, String)>,
}

/// A symbol hit on the semantic or phrase path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMatch {
    /// Wire-encoded symbol id (base-63).
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub file: String,
    pub line: u32,
    pub signature: String,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_extension() {
        assert_eq!(Language::from_path(Path::new("a/b/mux.go")), Language::Go);
        assert_eq!(Language::from_path(Path::new("x.tsx")), Language::Tsx);
        assert_eq!(Language::from_path(Path::new("x.TS")), Language::TypeScript);
        assert_eq!(Language::from_path(Path::new("x.py")), Language::Python);
        assert_eq!(Language::from_path(Path::new("Makefile")), Language::Text);
        assert_eq!(Language::from_path(Path::new("x.rs")), Language::Text);
        assert!(!Language::Text.is_first_class());
    }

    #[test]
    fn symbol_id_packs_file_in_low_bits() {
        let id = SymbolId::new(FileId(7), 3);
        assert_eq!(id.0, (3u64 << 32) | 7);
        assert_eq!(id.file(), FileId(7));
        assert_eq!(id.local(), 3);
    }
}
