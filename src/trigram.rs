//! Trigram posting index.
//!
//! Maps every 3-byte substring of file content to `(FileId, byte offset)`
//! postings, with sidecar tables for offset → line/column conversion and
//! code/comment/string classification. Literal search intersects posting
//! lists and verifies candidates against live content, so stale postings
//! during an update are discarded rather than misreported; grep parity is
//! the contract (1-based line and column, no off-by-one).

use crate::coordinator::CancelToken;
use crate::error::{IndexError, Result};
use crate::store::FileStore;
use crate::types::{ClassifiedRange, FileId, RangeKind, SearchOptions};
use regex::RegexBuilder;
use std::collections::{HashMap, HashSet};

type Trigram = [u8; 3];

/// A verified hit, pre-filtering.
#[derive(Debug, Clone)]
pub struct RawMatch {
    pub file: FileId,
    /// 1-based line of the first byte of the match.
    pub line: u32,
    /// 1-based column of the first byte of the match.
    pub column: u32,
    /// Byte offset of the match start.
    pub offset: u32,
    pub line_text: String,
}

/// Per-file line-start offsets for O(log n) offset → line conversion.
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    starts: Vec<u32>,
}

impl LineTable {
    pub fn build(content: &str) -> Self {
        let newlines = bytecount::count(content.as_bytes(), b'\n');
        let mut starts = Vec::with_capacity(newlines + 1);
        starts.push(0);
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i as u32 + 1);
            }
        }
        Self { starts }
    }

    /// 1-based (line, column) of a byte offset.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line = self.starts.partition_point(|&s| s <= offset) as u32;
        let start = self.starts[line as usize - 1];
        (line, offset - start + 1)
    }

    /// Byte span of a 1-based line, excluding the newline.
    pub fn line_span(&self, line: u32, content_len: usize) -> Option<(usize, usize)> {
        let idx = line.checked_sub(1)? as usize;
        let start = *self.starts.get(idx)? as usize;
        let end = self
            .starts
            .get(idx + 1)
            .map(|&s| s as usize - 1)
            .unwrap_or(content_len);
        Some((start, end.min(content_len)))
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}

/// The trigram posting index with its sidecar tables.
#[derive(Default)]
pub struct TrigramIndex {
    postings: HashMap<Trigram, Vec<(FileId, u32)>>,
    /// Unique trigram keys per file, for cheap purge.
    file_trigrams: Vec<HashSet<Trigram>>,
    /// Line-start tables per file.
    line_tables: Vec<LineTable>,
    /// Comment/string ranges per file, sorted by start; gaps are code.
    ranges: Vec<Vec<ClassifiedRange>>,
    indexed_files: HashSet<FileId>,
}

impl TrigramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot<T: Default>(vec: &mut Vec<T>, file: FileId) -> &mut T {
        let idx = file.as_usize();
        if vec.len() <= idx {
            vec.resize_with(idx + 1, T::default);
        }
        &mut vec[idx]
    }

    /// Install postings for a file. Any prior postings for the id must have
    /// been purged first.
    pub fn add_file(&mut self, file: FileId, content: &str, ranges: Vec<ClassifiedRange>) {
        let bytes = content.as_bytes();
        let mut seen = HashSet::new();
        for i in 0..bytes.len().saturating_sub(2) {
            let tri: Trigram = [bytes[i], bytes[i + 1], bytes[i + 2]];
            self.postings.entry(tri).or_default().push((file, i as u32));
            seen.insert(tri);
        }
        *Self::slot(&mut self.file_trigrams, file) = seen;
        *Self::slot(&mut self.line_tables, file) = LineTable::build(content);
        *Self::slot(&mut self.ranges, file) = ranges;
        self.indexed_files.insert(file);
    }

    /// Purge every posting and sidecar entry for a file.
    pub fn remove_file(&mut self, file: FileId) {
        if let Some(keys) = self.file_trigrams.get_mut(file.as_usize()) {
            for tri in keys.drain() {
                if let Some(list) = self.postings.get_mut(&tri) {
                    list.retain(|(f, _)| *f != file);
                    if list.is_empty() {
                        self.postings.remove(&tri);
                    }
                }
            }
        }
        if let Some(table) = self.line_tables.get_mut(file.as_usize()) {
            *table = LineTable::default();
        }
        if let Some(ranges) = self.ranges.get_mut(file.as_usize()) {
            ranges.clear();
        }
        self.indexed_files.remove(&file);
    }

    pub fn contains_file(&self, file: FileId) -> bool {
        self.indexed_files.contains(&file)
    }

    pub fn line_table(&self, file: FileId) -> Option<&LineTable> {
        if !self.indexed_files.contains(&file) {
            return None;
        }
        self.line_tables.get(file.as_usize())
    }

    /// Classification of a byte offset: inside a recorded range, its kind;
    /// otherwise code.
    pub fn kind_at(&self, file: FileId, offset: u32) -> RangeKind {
        let Some(ranges) = self.ranges.get(file.as_usize()) else {
            return RangeKind::Code;
        };
        let idx = ranges.partition_point(|r| r.start <= offset);
        if idx > 0 {
            let r = &ranges[idx - 1];
            if offset < r.end {
                return r.kind;
            }
        }
        RangeKind::Code
    }

    /// Unique trigrams recorded for a file (the P-invariant surface).
    pub fn trigrams_of(&self, file: FileId) -> HashSet<Trigram> {
        self.file_trigrams
            .get(file.as_usize())
            .cloned()
            .unwrap_or_default()
    }

    pub fn trigram_count(&self) -> usize {
        self.postings.len()
    }

    pub fn posting_count(&self) -> usize {
        self.postings.values().map(Vec::len).sum()
    }

    // ========================================================================
    // Literal search
    // ========================================================================

    /// Grep-exact literal search.
    ///
    /// Patterns of length ≥ 3 go through posting intersection; shorter ones
    /// linearly scan the candidate files. Results are ordered by
    /// (FileId, offset).
    pub fn literal_search(
        &self,
        pattern: &str,
        options: &SearchOptions,
        store: &FileStore,
        allow: Option<&HashSet<FileId>>,
        cancel: &CancelToken,
    ) -> Result<Vec<RawMatch>> {
        if pattern.is_empty() {
            return Err(IndexError::EmptyPattern);
        }
        if options.invert_match {
            return self.invert_literal(pattern, options, store, allow, cancel);
        }

        let candidates = if pattern.len() >= 3 {
            self.candidate_offsets(pattern, options.case_insensitive)
        } else {
            self.scan_candidates(pattern, options, store, allow, cancel)?
        };

        let mut out = Vec::new();
        let mut per_file: HashMap<FileId, u32> = HashMap::new();
        let mut current_file: Option<(FileId, std::sync::Arc<str>)> = None;

        for (file, start) in candidates {
            if let Some(allow) = allow {
                if !allow.contains(&file) {
                    continue;
                }
            }
            // Cancellation is checked at file boundaries.
            if current_file.as_ref().map(|(f, _)| *f) != Some(file) {
                if cancel.is_cancelled() {
                    return Err(IndexError::Cancelled);
                }
                let Some(content) = store.content(file) else {
                    continue; // tombstoned mid-flight
                };
                current_file = Some((file, content));
            }
            let (_, content) = current_file.as_ref().unwrap();

            if !verify_at(content, start as usize, pattern, options.case_insensitive) {
                continue; // stale posting
            }
            if options.word_boundary && !word_bounded(content.as_bytes(), start as usize, pattern.len())
            {
                continue;
            }
            if !self.kind_allowed(file, start, options) {
                continue;
            }
            if options.max_count_per_file > 0 {
                let n = per_file.entry(file).or_insert(0);
                if *n >= options.max_count_per_file {
                    continue;
                }
                *n += 1;
            }

            let Some(table) = self.line_table(file) else {
                continue;
            };
            let (line, column) = table.line_col(start);
            let (ls, le) = table
                .line_span(line, content.len())
                .unwrap_or((0, content.len()));
            out.push(RawMatch {
                file,
                line,
                column,
                offset: start,
                line_text: content[ls..le].trim_end_matches('\r').to_string(),
            });
        }

        out.sort_by_key(|m| (m.file, m.offset));
        Ok(out)
    }

    /// Candidate match starts for a pattern of length ≥ 3: postings of the
    /// rarest pattern trigram, re-based to the match start.
    fn candidate_offsets(&self, pattern: &str, case_insensitive: bool) -> Vec<(FileId, u32)> {
        let bytes = pattern.as_bytes();
        let mut best: Option<(usize, usize)> = None; // (position, posting total)
        for pos in 0..bytes.len() - 2 {
            let tri: Trigram = [bytes[pos], bytes[pos + 1], bytes[pos + 2]];
            let total: usize = if case_insensitive {
                case_variants(tri)
                    .iter()
                    .map(|t| self.postings.get(t).map_or(0, Vec::len))
                    .sum()
            } else {
                self.postings.get(&tri).map_or(0, Vec::len)
            };
            if best.is_none_or(|(_, n)| total < n) {
                best = Some((pos, total));
            }
            if total == 0 {
                break; // no postings anywhere, no matches
            }
        }
        let Some((pos, _)) = best else {
            return Vec::new();
        };
        let tri: Trigram = [bytes[pos], bytes[pos + 1], bytes[pos + 2]];
        let mut candidates = Vec::new();
        let lists: Vec<&Vec<(FileId, u32)>> = if case_insensitive {
            case_variants(tri)
                .iter()
                .filter_map(|t| self.postings.get(t))
                .collect()
        } else {
            self.postings.get(&tri).into_iter().collect()
        };
        for list in lists {
            for &(file, off) in list {
                if let Some(start) = off.checked_sub(pos as u32) {
                    candidates.push((file, start));
                }
            }
        }
        candidates.sort_unstable_by_key(|&(f, o)| (f, o));
        candidates.dedup();
        candidates
    }

    /// Linear scan for sub-trigram patterns, restricted to the allowlist.
    fn scan_candidates(
        &self,
        pattern: &str,
        options: &SearchOptions,
        store: &FileStore,
        allow: Option<&HashSet<FileId>>,
        cancel: &CancelToken,
    ) -> Result<Vec<(FileId, u32)>> {
        let mut out = Vec::new();
        for file in store.enumerate() {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            if let Some(allow) = allow {
                if !allow.contains(&file) {
                    continue;
                }
            }
            let Some(content) = store.content(file) else {
                continue;
            };
            for start in find_all(content.as_bytes(), pattern.as_bytes(), options.case_insensitive)
            {
                out.push((file, start as u32));
            }
        }
        Ok(out)
    }

    /// `invert_match`: lines with no occurrence of the pattern.
    fn invert_literal(
        &self,
        pattern: &str,
        options: &SearchOptions,
        store: &FileStore,
        allow: Option<&HashSet<FileId>>,
        cancel: &CancelToken,
    ) -> Result<Vec<RawMatch>> {
        let mut out = Vec::new();
        for file in store.enumerate() {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            if let Some(allow) = allow {
                if !allow.contains(&file) {
                    continue;
                }
            }
            let (Some(content), Some(table)) = (store.content(file), self.line_table(file)) else {
                continue;
            };
            let mut per_file = 0u32;
            for line in 1..=table.line_count() as u32 {
                let Some((ls, le)) = table.line_span(line, content.len()) else {
                    continue;
                };
                if ls >= content.len() && line == table.line_count() as u32 {
                    break; // phantom line after a trailing newline
                }
                let text = &content[ls..le];
                let hit = if options.case_insensitive {
                    !find_all(text.as_bytes(), pattern.as_bytes(), true).is_empty()
                } else {
                    text.contains(pattern)
                };
                if !hit {
                    if options.max_count_per_file > 0 && per_file >= options.max_count_per_file {
                        break;
                    }
                    per_file += 1;
                    out.push(RawMatch {
                        file,
                        line,
                        column: 1,
                        offset: ls as u32,
                        line_text: text.trim_end_matches('\r').to_string(),
                    });
                }
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Regex search
    // ========================================================================

    /// Regex search: required literals narrow candidates to files, then the
    /// pattern is evaluated line by line. A pattern with no extractable
    /// literal forces a full scan.
    pub fn regex_search(
        &self,
        pattern: &str,
        options: &SearchOptions,
        store: &FileStore,
        allow: Option<&HashSet<FileId>>,
        cancel: &CancelToken,
    ) -> Result<Vec<RawMatch>> {
        if pattern.is_empty() {
            return Err(IndexError::EmptyPattern);
        }
        let source = if options.word_boundary {
            format!(r"\b(?:{pattern})\b")
        } else {
            pattern.to_string()
        };
        let re = RegexBuilder::new(&source)
            .case_insensitive(options.case_insensitive)
            .build()
            .map_err(|e| IndexError::InvalidPattern(e.to_string()))?;

        let literals = required_literals(pattern);
        let candidate_files: Vec<FileId> = if literals.is_empty() {
            store.enumerate()
        } else {
            let mut files: Option<HashSet<FileId>> = None;
            for lit in &literals {
                let set = self.files_containing(lit, options.case_insensitive);
                files = Some(match files {
                    None => set,
                    Some(prev) => prev.intersection(&set).copied().collect(),
                });
            }
            let mut files: Vec<FileId> = files.unwrap_or_default().into_iter().collect();
            files.sort_unstable();
            files
        };

        let mut out = Vec::new();
        for file in candidate_files {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            if let Some(allow) = allow {
                if !allow.contains(&file) {
                    continue;
                }
            }
            let (Some(content), Some(table)) = (store.content(file), self.line_table(file)) else {
                continue;
            };
            let mut per_file = 0u32;
            'lines: for line in 1..=table.line_count() as u32 {
                let Some((ls, le)) = table.line_span(line, content.len()) else {
                    continue;
                };
                if ls >= content.len() && line == table.line_count() as u32 {
                    break; // phantom line after a trailing newline
                }
                let text = content[ls..le].trim_end_matches('\r');
                if options.invert_match {
                    if re.find(text).is_none() {
                        if options.max_count_per_file > 0 && per_file >= options.max_count_per_file
                        {
                            break 'lines;
                        }
                        per_file += 1;
                        out.push(RawMatch {
                            file,
                            line,
                            column: 1,
                            offset: ls as u32,
                            line_text: text.to_string(),
                        });
                    }
                    continue;
                }
                for m in re.find_iter(text) {
                    let offset = ls as u32 + m.start() as u32;
                    if !self.kind_allowed(file, offset, options) {
                        continue;
                    }
                    if options.max_count_per_file > 0 && per_file >= options.max_count_per_file {
                        break 'lines;
                    }
                    per_file += 1;
                    out.push(RawMatch {
                        file,
                        line,
                        column: m.start() as u32 + 1,
                        offset,
                        line_text: text.to_string(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Files whose trigram sets cover every trigram of a literal.
    fn files_containing(&self, literal: &str, case_insensitive: bool) -> HashSet<FileId> {
        let bytes = literal.as_bytes();
        let mut files: Option<HashSet<FileId>> = None;
        for i in 0..bytes.len().saturating_sub(2) {
            let tri: Trigram = [bytes[i], bytes[i + 1], bytes[i + 2]];
            let mut here = HashSet::new();
            let variants = if case_insensitive {
                case_variants(tri)
            } else {
                vec![tri]
            };
            for v in variants {
                if let Some(list) = self.postings.get(&v) {
                    here.extend(list.iter().map(|(f, _)| *f));
                }
            }
            files = Some(match files {
                None => here,
                Some(prev) => prev.intersection(&here).copied().collect(),
            });
            if files.as_ref().is_some_and(HashSet::is_empty) {
                break;
            }
        }
        files.unwrap_or_default()
    }

    fn kind_allowed(&self, file: FileId, offset: u32, options: &SearchOptions) -> bool {
        if !(options.code_only
            || options.comments_only
            || options.strings_only
            || options.exclude_comments)
        {
            return true;
        }
        let kind = self.kind_at(file, offset);
        if options.exclude_comments && kind == RangeKind::Comment {
            return false;
        }
        if options.code_only {
            return kind == RangeKind::Code;
        }
        if options.comments_only {
            return kind == RangeKind::Comment;
        }
        if options.strings_only {
            return kind == RangeKind::Str;
        }
        true
    }
}

// ============================================================================
// Byte helpers
// ============================================================================

fn verify_at(content: &str, start: usize, pattern: &str, case_insensitive: bool) -> bool {
    let bytes = content.as_bytes();
    let pat = pattern.as_bytes();
    let Some(window) = bytes.get(start..start + pat.len()) else {
        return false;
    };
    if case_insensitive {
        window.eq_ignore_ascii_case(pat)
    } else {
        window == pat
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn word_bounded(bytes: &[u8], start: usize, len: usize) -> bool {
    let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
    let after_ok = start + len >= bytes.len() || !is_word_byte(bytes[start + len]);
    before_ok && after_ok
}

/// All occurrences of `needle` in `haystack`, naive scan. Used for
/// sub-trigram patterns where posting lists cannot help.
fn find_all(haystack: &[u8], needle: &[u8], case_insensitive: bool) -> Vec<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for start in 0..=haystack.len() - needle.len() {
        let window = &haystack[start..start + needle.len()];
        let hit = if case_insensitive {
            window.eq_ignore_ascii_case(needle)
        } else {
            window == needle
        };
        if hit {
            out.push(start);
        }
    }
    out
}

/// ASCII case permutations of a trigram (≤ 8). Case-insensitive queries
/// union postings across these; verification settles the rest.
fn case_variants(tri: Trigram) -> Vec<Trigram> {
    let mut out: Vec<Trigram> = vec![tri.map(|b| b.to_ascii_lowercase())];
    for i in 0..3 {
        if tri[i].is_ascii_alphabetic() {
            let mut next = Vec::with_capacity(out.len() * 2);
            for v in &out {
                let mut upper = *v;
                upper[i] = upper[i].to_ascii_uppercase();
                next.push(*v);
                next.push(upper);
            }
            out = next;
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Required literal runs (length ≥ 3) extractable from a regex pattern.
///
/// Conservative: a run ends at any metacharacter; a quantifier drops the
/// run's final character (it may match zero times); escapes and character
/// classes contribute nothing. Alternation at the top level makes every
/// literal optional, so the whole extraction is abandoned.
fn required_literals(pattern: &str) -> Vec<String> {
    let bytes = pattern.as_bytes();
    let mut out = Vec::new();
    let mut run = String::new();
    let mut i = 0;
    let mut depth = 0usize;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '\\' => {
                flush(&mut run, &mut out);
                i += 2;
                continue;
            }
            '[' => {
                flush(&mut run, &mut out);
                // Skip the class
                i += 1;
                if i < bytes.len() && bytes[i] == b'^' {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == b']' {
                    i += 1;
                }
                while i < bytes.len() && bytes[i] != b']' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
                continue;
            }
            '|' => {
                if depth == 0 {
                    return Vec::new(); // every branch optional
                }
                flush(&mut run, &mut out);
            }
            '(' => {
                depth += 1;
                flush(&mut run, &mut out);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                flush(&mut run, &mut out);
            }
            '*' | '?' => {
                run.pop();
                flush(&mut run, &mut out);
            }
            '+' => {
                // The preceding char is required at least once
                flush(&mut run, &mut out);
            }
            '{' => {
                run.pop();
                flush(&mut run, &mut out);
                while i < bytes.len() && bytes[i] != b'}' {
                    i += 1;
                }
            }
            '.' | '^' | '$' => {
                flush(&mut run, &mut out);
            }
            _ => run.push(c),
        }
        i += 1;
    }
    flush(&mut run, &mut out);
    out
}

fn flush(run: &mut String, out: &mut Vec<String>) {
    if run.len() >= 3 {
        out.push(std::mem::take(run));
    } else {
        run.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn fixture() -> (FileStore, TrigramIndex) {
        let store = FileStore::new();
        let mut index = TrigramIndex::new();
        let files = [
            (
                "/repo/src/auth.rs",
                "fn check(user: &User) -> Result<(), Error> {\n    if user.token.is_empty() {\n        return Err(\"invalid credentials\".into());\n    }\n    Ok(())\n}\n",
            ),
            (
                "/repo/src/mux.go",
                "package mux\n\n// ServeHTTP dispatches requests.\nfunc (m *Mux) ServeHTTP() {\n\tm.dispatch()\n}\n",
            ),
        ];
        for (path, content) in files {
            let id = store.add(
                PathBuf::from(path),
                Arc::from(content),
                SystemTime::UNIX_EPOCH,
            );
            index.add_file(id, content, Vec::new());
        }
        (store, index)
    }

    fn search(
        index: &TrigramIndex,
        store: &FileStore,
        pattern: &str,
        options: &SearchOptions,
    ) -> Vec<RawMatch> {
        index
            .literal_search(pattern, options, store, None, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn literal_search_line_and_column_match_grep() {
        let (store, index) = fixture();
        let hits = search(&index, &store, "invalid credentials", &SearchOptions::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 3);
        // grep -n: `        return Err("invalid credentials".into());`
        // column of the first byte of the match, 1-based
        assert_eq!(hits[0].column, 21);
        assert!(hits[0].line_text.contains("invalid credentials"));
    }

    #[test]
    fn short_pattern_falls_back_to_scan() {
        let (store, index) = fixture();
        let hits = search(&index, &store, "m.", &SearchOptions::default());
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|m| m.line_text.contains("m.")));
    }

    #[test]
    fn case_insensitive_matches_mixed_case() {
        let (store, index) = fixture();
        let options = SearchOptions {
            case_insensitive: true,
            ..Default::default()
        };
        let hits = search(&index, &store, "servehttp", &options);
        assert_eq!(hits.len(), 2); // comment + declaration
        let none = search(&index, &store, "servehttp", &SearchOptions::default());
        assert!(none.is_empty());
    }

    #[test]
    fn word_boundary_filters_substrings() {
        let (store, index) = fixture();
        let options = SearchOptions {
            word_boundary: true,
            ..Default::default()
        };
        assert!(search(&index, &store, "dispatch", &options).iter().any(|m| m.line == 5));
        assert!(search(&index, &store, "dispatc", &options).is_empty());
    }

    #[test]
    fn empty_pattern_is_an_error() {
        let (store, index) = fixture();
        let err = index
            .literal_search("", &SearchOptions::default(), &store, None, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, IndexError::EmptyPattern));
    }

    #[test]
    fn removal_purges_postings() {
        let (store, index) = fixture();
        let mut index = index;
        let id = store.lookup(std::path::Path::new("/repo/src/auth.rs")).unwrap();
        index.remove_file(id);
        store.remove(id);
        let hits = search(&index, &store, "invalid credentials", &SearchOptions::default());
        assert!(hits.is_empty());
        assert!(index.trigrams_of(id).is_empty());
    }

    #[test]
    fn stale_postings_are_discarded_not_misreported() {
        let (store, index) = fixture();
        let id = store.lookup(std::path::Path::new("/repo/src/auth.rs")).unwrap();
        // Content replaced, postings not yet updated
        store.update(id, Arc::from("totally new\n"), SystemTime::UNIX_EPOCH);
        let hits = search(&index, &store, "invalid credentials", &SearchOptions::default());
        assert!(hits.is_empty());
    }

    #[test]
    fn regex_search_basics() {
        let (store, index) = fixture();
        let hits = index
            .regex_search(
                r"Serve\w+",
                &SearchOptions::default(),
                &store,
                None,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|m| m.line_text.contains("ServeHTTP")));

        let err = index
            .regex_search(
                "(unclosed",
                &SearchOptions::default(),
                &store,
                None,
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidPattern(_)));
    }

    #[test]
    fn invert_match_lists_nonmatching_lines() {
        let (store, index) = fixture();
        let options = SearchOptions {
            invert_match: true,
            ..Default::default()
        };
        let hits = search(&index, &store, "dispatch", &options);
        assert!(hits.iter().all(|m| !m.line_text.contains("dispatch")));
        assert!(!hits.is_empty());
    }

    #[test]
    fn required_literal_extraction() {
        assert_eq!(required_literals("ServeHTTP"), vec!["ServeHTTP"]);
        assert_eq!(required_literals(r"Serve\w+"), vec!["Serve"]);
        assert_eq!(
            required_literals("handle(r|R)equest"),
            vec!["handle", "equest"]
        );
        // `?` makes its char optional, killing the short run
        assert_eq!(required_literals(r"ab?cd"), Vec::<String>::new());
        // Top-level alternation: nothing is required
        assert_eq!(required_literals("foo|bar"), Vec::<String>::new());
        assert_eq!(required_literals(r"\d+"), Vec::<String>::new());
    }

    #[test]
    fn line_table_conversion() {
        let table = LineTable::build("ab\ncde\n\nf");
        assert_eq!(table.line_col(0), (1, 1));
        assert_eq!(table.line_col(3), (2, 1));
        assert_eq!(table.line_col(5), (2, 3));
        assert_eq!(table.line_col(7), (3, 1));
        assert_eq!(table.line_col(8), (4, 1));
        assert_eq!(table.line_span(2, 9), Some((3, 6)));
    }

    #[test]
    fn trigram_set_matches_content() {
        let (_, index) = fixture();
        let content = "fn check(user: &User) -> Result<(), Error> {\n    if user.token.is_empty() {\n        return Err(\"invalid credentials\".into());\n    }\n    Ok(())\n}\n";
        let mut expected = HashSet::new();
        let bytes = content.as_bytes();
        for i in 0..bytes.len() - 2 {
            expected.insert([bytes[i], bytes[i + 1], bytes[i + 2]]);
        }
        assert_eq!(index.trigrams_of(FileId(0)), expected);
    }
}
