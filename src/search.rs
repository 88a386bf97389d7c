//! Search orchestration.
//!
//! Decides per query whether the trigram index alone suffices, whether the
//! symbol graph should be consulted, and whether phrase matching should
//! augment; applies path filters and code/comment/string classification;
//! merges and ranks the final result list.

use crate::config::is_test_path;
use crate::coordinator::CancelToken;
use crate::error::{IndexError, Result};
use crate::phrase::{SCORE_FLOOR, tokenize_query};
use crate::state::Engine;
use crate::trigram::RawMatch;
use crate::types::{FileId, SearchMatch, SearchOptions, SymbolMatch};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// How the caller wants the pattern interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Decide from the query shape.
    #[default]
    Auto,
    Literal,
    Regex,
}

/// Final, ranked response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub matches: Vec<SearchMatch>,
    pub symbols: Vec<SymbolMatch>,
    pub total_matches: usize,
    pub truncated: bool,
    /// The query looked like a concatenated string; fragments were searched
    /// independently and merged per file.
    pub assembled: bool,
}

pub struct SearchOrchestrator;

impl SearchOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Top-level entry: auto-detected query handling.
    pub fn query(
        &self,
        engine: &Engine,
        query: &str,
        options: &SearchOptions,
        mode: QueryMode,
        cancel: &CancelToken,
    ) -> Result<SearchResponse> {
        if query.is_empty() {
            return Err(IndexError::EmptyPattern);
        }
        match mode {
            QueryMode::Literal => self.literal(engine, query, options, cancel),
            QueryMode::Regex => self.regex(engine, query, options, cancel),
            QueryMode::Auto => {
                if assembly_eligible(query) {
                    return self.assembly(engine, query, options, cancel);
                }
                let mut response = self.literal(engine, query, options, cancel)?;
                // Phrase matching augments whenever the query splits into
                // tokens; identifier-shaped queries also hit the graph.
                response.symbols = self.phrase_symbols(engine, query, options);
                Ok(response)
            }
        }
    }

    /// Literal (grep-exact) search.
    pub fn literal(
        &self,
        engine: &Engine,
        pattern: &str,
        options: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<SearchResponse> {
        let allow = file_filter(engine, options)?;
        let raw = {
            // Per-file caps are line-based; apply after line collapsing
            let mut inner = options.clone();
            inner.max_count_per_file = 0;
            engine.coordinator.begin_read(crate::coordinator::IndexKind::Trigram);
            let result = engine.trigram.read().literal_search(
                pattern,
                &inner,
                &engine.store,
                allow.as_ref(),
                cancel,
            );
            engine.coordinator.end_read(crate::coordinator::IndexKind::Trigram);
            result?
        };
        Ok(self.finish(engine, raw, options, false))
    }

    /// Regex search.
    pub fn regex(
        &self,
        engine: &Engine,
        pattern: &str,
        options: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<SearchResponse> {
        let allow = file_filter(engine, options)?;
        let raw = {
            engine.coordinator.begin_read(crate::coordinator::IndexKind::Trigram);
            let result = engine.trigram.read().regex_search(
                pattern,
                options,
                &engine.store,
                allow.as_ref(),
                cancel,
            );
            engine.coordinator.end_read(crate::coordinator::IndexKind::Trigram);
            result?
        };
        Ok(self.finish(engine, raw, options, false))
    }

    /// Assembly-eligible queries: fragments searched independently, hits
    /// merged per file and ranked by distinct fragments found.
    fn assembly(
        &self,
        engine: &Engine,
        query: &str,
        options: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<SearchResponse> {
        let fragments: Vec<&str> = query
            .split_whitespace()
            .filter(|t| t.len() >= 3)
            .collect();
        let allow = file_filter(engine, options)?;

        let mut per_file: HashMap<FileId, (usize, Vec<RawMatch>)> = HashMap::new();
        let trigram = engine.trigram.read();
        for fragment in &fragments {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            let mut inner = options.clone();
            inner.max_count_per_file = 0;
            let raw =
                trigram.literal_search(fragment, &inner, &engine.store, allow.as_ref(), cancel)?;
            let mut seen_files = HashSet::new();
            for m in raw {
                let entry = per_file.entry(m.file).or_insert_with(|| (0, Vec::new()));
                if seen_files.insert(m.file) {
                    entry.0 += 1; // distinct fragment hit in this file
                }
                entry.1.push(m);
            }
        }
        drop(trigram);

        // Rank files by fragments matched, then FileId
        let mut files: Vec<(FileId, usize)> =
            per_file.iter().map(|(f, (n, _))| (*f, *n)).collect();
        files.sort_by_key(|&(f, n)| (std::cmp::Reverse(n), f));

        let mut raw = Vec::new();
        for (file, _) in files {
            let (_, mut hits) = per_file.remove(&file).unwrap();
            hits.sort_by_key(|m| m.offset);
            raw.extend(hits);
        }

        let mut merged_options = options.clone();
        merged_options.merge_file_results = true;
        let mut response = self.finish(engine, raw, &merged_options, true);
        response.assembled = true;
        Ok(response)
    }

    /// Phrase scores over symbol names.
    fn phrase_symbols(
        &self,
        engine: &Engine,
        query: &str,
        options: &SearchOptions,
    ) -> Vec<SymbolMatch> {
        let stems = tokenize_query(query);
        if stems.is_empty() {
            return Vec::new();
        }
        let symbols = engine.symbols.read();
        let mut out: Vec<SymbolMatch> = symbols
            .all_symbols()
            .filter_map(|sym| {
                let score = engine.phrase.score(&stems, &sym.rec.name);
                if score < SCORE_FLOOR {
                    return None;
                }
                let path = engine.store.path_of(sym.id.file())?;
                Some(SymbolMatch {
                    id: sym.id.encoded(),
                    name: sym.rec.name.clone(),
                    kind: sym.rec.kind,
                    file: display_path(engine, &path),
                    line: sym.rec.line,
                    signature: sym.rec.signature.clone(),
                    score,
                })
            })
            .collect();
        out.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.line.cmp(&b.line))
        });
        let cap = effective_max(options, engine);
        if cap > 0 && out.len() > cap {
            out.truncate(cap);
        }
        out
    }

    /// Collapse raw hits to one result per line (grep parity), attach
    /// context, optionally merge per file, enforce caps.
    fn finish(
        &self,
        engine: &Engine,
        raw: Vec<RawMatch>,
        options: &SearchOptions,
        keep_order: bool,
    ) -> SearchResponse {
        // One result per (file, line); first column wins, extra hits count
        let mut per_line: Vec<(FileId, RawMatch, u32)> = Vec::new();
        let mut index: HashMap<(FileId, u32), usize> = HashMap::new();
        for m in raw {
            match index.get(&(m.file, m.line)) {
                Some(&i) => per_line[i].2 += 1,
                None => {
                    index.insert((m.file, m.line), per_line.len());
                    per_line.push((m.file, m.clone(), 1));
                }
            }
        }
        if !keep_order {
            per_line.sort_by_key(|(f, m, _)| (*f, m.line));
        }

        // Line-based per-file cap
        if options.max_count_per_file > 0 {
            let mut counts: HashMap<FileId, u32> = HashMap::new();
            per_line.retain(|(file, _, _)| {
                let n = counts.entry(*file).or_insert(0);
                *n += 1;
                *n <= options.max_count_per_file
            });
        }

        let total = per_line.len();
        let context_lines = options
            .context_lines
            .min(engine.config.max_context_lines);

        let mut matches: Vec<SearchMatch> = Vec::with_capacity(per_line.len());
        for (file, m, count) in per_line {
            let Some(path) = engine.store.path_of(file) else {
                continue;
            };
            let mut entry = SearchMatch {
                file: display_path(engine, &path),
                line: m.line,
                column: m.column,
                line_text: m.line_text,
                match_count: count,
                context: Vec::new(),
            };
            if context_lines > 0 {
                entry.context = context_for(engine, file, m.line, context_lines);
            }
            matches.push(entry);
        }

        if options.merge_file_results {
            matches = merge_by_file(matches, keep_order);
        }

        let cap = effective_max(options, engine);
        let truncated = cap > 0 && matches.len() > cap;
        if truncated {
            matches.truncate(cap);
        }

        SearchResponse {
            total_matches: total,
            truncated,
            matches,
            symbols: Vec::new(),
            assembled: false,
        }
    }
}

impl Default for SearchOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn effective_max(options: &SearchOptions, engine: &Engine) -> usize {
    let cap = if options.max_results > 0 {
        options.max_results
    } else {
        engine.config.max_results
    };
    cap as usize
}

fn display_path(engine: &Engine, path: &Path) -> String {
    path.strip_prefix(&engine.config.root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

/// Build the candidate-file allowlist from the path-level options. `None`
/// means every file is eligible.
fn file_filter(engine: &Engine, options: &SearchOptions) -> Result<Option<HashSet<FileId>>> {
    if options.include_regex.is_none() && options.exclude_regex.is_none() && !options.exclude_tests
    {
        return Ok(None);
    }
    let include = options
        .include_regex
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| IndexError::InvalidPattern(format!("include_regex: {e}")))?;
    let exclude = options
        .exclude_regex
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| IndexError::InvalidPattern(format!("exclude_regex: {e}")))?;

    let mut allow = HashSet::new();
    for file in engine.store.enumerate() {
        let Some(path) = engine.store.path_of(file) else {
            continue;
        };
        let rel = display_path(engine, &path);
        if options.exclude_tests && is_test_path(Path::new(&rel)) {
            continue;
        }
        if let Some(re) = &include {
            if !re.is_match(&rel) {
                continue;
            }
        }
        if let Some(re) = &exclude {
            if re.is_match(&rel) {
                continue;
            }
        }
        allow.insert(file);
    }
    Ok(Some(allow))
}

/// Context lines around a match.
fn context_for(engine: &Engine, file: FileId, line: u32, n: u32) -> Vec<(u32, String)> {
    let trigram = engine.trigram.read();
    let (Some(table), Some(content)) = (trigram.line_table(file), engine.store.content(file))
    else {
        return Vec::new();
    };
    let first = line.saturating_sub(n).max(1);
    let last = (line + n).min(table.line_count() as u32);
    let mut out = Vec::new();
    for l in first..=last {
        if l == line {
            continue;
        }
        if let Some((s, e)) = table.line_span(l, content.len()) {
            if s >= content.len() && l == table.line_count() as u32 {
                continue; // phantom line after a trailing newline
            }
            out.push((l, content[s..e].trim_end_matches('\r').to_string()));
        }
    }
    out
}

/// Collapse matches to one entry per file with an aggregate count.
fn merge_by_file(matches: Vec<SearchMatch>, keep_order: bool) -> Vec<SearchMatch> {
    let mut order: Vec<String> = Vec::new();
    let mut by_file: HashMap<String, SearchMatch> = HashMap::new();
    for m in matches {
        match by_file.get_mut(&m.file) {
            Some(existing) => existing.match_count += m.match_count,
            None => {
                order.push(m.file.clone());
                by_file.insert(m.file.clone(), m);
            }
        }
    }
    if !keep_order {
        order.sort();
    }
    order
        .into_iter()
        .filter_map(|f| by_file.remove(&f))
        .collect()
}

/// Assembly heuristic: a long query that looks like a concatenated or
/// templated string whose pieces may live across files.
pub fn assembly_eligible(query: &str) -> bool {
    if query.len() < 8 {
        return false;
    }
    let tokens = query.split_whitespace().count();
    if tokens >= 4 {
        return true;
    }
    if query.matches('/').count() + query.matches('\\').count() >= 3 {
        return true;
    }
    const ERROR_PREFIXES: &[&str] = &["Error:", "Warning:", "Failed", "Invalid", "Missing"];
    if ERROR_PREFIXES.iter().any(|p| query.contains(p)) {
        return true;
    }
    // HTML-ish tag
    if let Some(open) = query.find('<') {
        let rest = &query[open + 1..];
        if rest
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && rest.contains('>')
        {
            return true;
        }
    }
    const SQL_KEYWORDS: &[&str] = &["SELECT ", "INSERT ", "UPDATE ", "DELETE ", " FROM ", " WHERE ", " JOIN "];
    let upper = query.to_uppercase();
    SQL_KEYWORDS.iter().any(|k| upper.contains(k))
}
