//! Phrase / natural-language matching over identifiers.
//!
//! Queries split on whitespace and identifiers split on underscores, case
//! boundaries and digit boundaries; both sides are lowercased and run
//! through a light stemmer. Scores are deterministic for identical inputs.

use strsim::levenshtein;

/// Suffixes the stemmer strips, longest first. Light Porter-style: one
/// pass, minimum stem length 3.
const SUFFIXES: &[&str] = &[
    "ation", "tion", "sion", "ment", "ness", "ing", "ed", "es", "ly", "er", "s",
];

/// Candidates scoring below this are dropped.
pub const SCORE_FLOOR: f32 = 30.0;

const FUZZY_BONUS: f32 = 15.0;

/// Split an identifier into lowercase tokens on `_`, case boundaries
/// (camelCase → camel, case) and digit boundaries.
pub fn split_identifier(ident: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = ident.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' {
            flush_token(&mut current, &mut tokens);
            continue;
        }
        let boundary = if current.is_empty() {
            false
        } else if c.is_ascii_digit() != chars[i - 1].is_ascii_digit() {
            // Digit boundary
            true
        } else if c.is_uppercase() && chars[i - 1].is_lowercase() {
            // camelCase
            true
        } else {
            // HTTPServer → HTTP, Server
            c.is_uppercase()
                && chars[i - 1].is_uppercase()
                && chars.get(i + 1).is_some_and(|n| n.is_lowercase())
        };
        if boundary {
            flush_token(&mut current, &mut tokens);
        }
        current.push(c.to_ascii_lowercase());
    }
    flush_token(&mut current, &mut tokens);
    tokens
}

fn flush_token(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

/// Light stemmer: strip the first matching suffix, keeping at least three
/// characters, then collapse a trailing doubled consonant (running → run).
pub fn stem(token: &str) -> String {
    let mut out = token.to_string();
    for suffix in SUFFIXES {
        if out.len() > suffix.len() + 2 && out.ends_with(suffix) {
            out.truncate(out.len() - suffix.len());
            break;
        }
    }
    let bytes = out.as_bytes();
    if bytes.len() >= 4 {
        let last = bytes[bytes.len() - 1];
        if last == bytes[bytes.len() - 2] && !matches!(last, b'a' | b'e' | b'i' | b'o' | b'u') {
            out.truncate(out.len() - 1);
        }
    }
    out
}

/// Tokenize a whitespace-separated query into stems.
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .flat_map(split_identifier)
        .map(|t| stem(&t))
        .collect()
}

/// Tokenize a candidate identifier into `(raw, stemmed)` pairs.
fn tokenize_candidate(name: &str) -> Vec<(String, String)> {
    split_identifier(name)
        .into_iter()
        .map(|t| {
            let stemmed = stem(&t);
            (t, stemmed)
        })
        .collect()
}

/// Multi-word scorer.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    pub enable_fuzzy: bool,
}

impl Default for PhraseMatcher {
    fn default() -> Self {
        Self { enable_fuzzy: true }
    }
}

impl PhraseMatcher {
    pub fn new(enable_fuzzy: bool) -> Self {
        Self { enable_fuzzy }
    }

    /// Score a candidate identifier against pre-tokenized query stems.
    ///
    ///   score = 100 · matched/query_tokens
    ///         + 50 · consecutive runs longer than one
    ///         + 20 · exact token prefix matches
    ///         + fuzzy bonus per Levenshtein-≤1 leftover token
    ///         − 10 · span between first and last matched candidate token
    pub fn score(&self, query_stems: &[String], candidate_name: &str) -> f32 {
        if query_stems.is_empty() {
            return 0.0;
        }
        let candidate = tokenize_candidate(candidate_name);
        if candidate.is_empty() {
            return 0.0;
        }

        // Position of the first candidate token matching each query stem
        let mut match_pos: Vec<Option<usize>> = Vec::with_capacity(query_stems.len());
        for stem in query_stems {
            let pos = candidate.iter().position(|(_, c)| c == stem);
            match_pos.push(pos);
        }
        let matched_unique: usize = {
            let mut seen = std::collections::HashSet::new();
            query_stems
                .iter()
                .zip(&match_pos)
                .filter(|(stem, pos)| pos.is_some() && seen.insert(stem.as_str()))
                .count()
        };
        if matched_unique == 0 {
            return 0.0;
        }

        let mut score = 100.0 * matched_unique as f32 / query_stems.len() as f32;

        // Runs: consecutive query stems matching consecutive candidate tokens
        let mut runs = 0u32;
        let mut run_len = 1u32;
        for pair in match_pos.windows(2) {
            match (pair[0], pair[1]) {
                (Some(a), Some(b)) if b == a + 1 => {
                    run_len += 1;
                    if run_len == 2 {
                        runs += 1;
                    }
                }
                _ => run_len = 1,
            }
        }
        score += 50.0 * runs as f32;

        // Exact prefixes on the raw tokens
        let prefixes = query_stems
            .iter()
            .filter(|stem| candidate.iter().any(|(raw, _)| raw.starts_with(stem.as_str())))
            .count();
        score += 20.0 * prefixes as f32;

        // Fuzzy bonus for leftover tokens
        if self.enable_fuzzy {
            for (stem, pos) in query_stems.iter().zip(&match_pos) {
                if pos.is_none()
                    && candidate
                        .iter()
                        .any(|(_, c)| levenshtein(stem, c) <= 1)
                {
                    score += FUZZY_BONUS;
                }
            }
        }

        // Spread penalty
        let positions: Vec<usize> = match_pos.iter().flatten().copied().collect();
        if let (Some(first), Some(last)) = (positions.iter().min(), positions.iter().max()) {
            score -= 10.0 * (last - first) as f32;
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_camel_snake_and_digits() {
        assert_eq!(split_identifier("ServeHTTP"), vec!["serve", "http"]);
        assert_eq!(
            split_identifier("parse_config_file"),
            vec!["parse", "config", "file"]
        );
        assert_eq!(split_identifier("HTTPServer"), vec!["http", "server"]);
        assert_eq!(split_identifier("base63Encode"), vec!["base", "63", "encode"]);
        assert_eq!(split_identifier("camelCase"), vec!["camel", "case"]);
    }

    #[test]
    fn stemming_is_light_and_bounded() {
        assert_eq!(stem("parsing"), "pars");
        assert_eq!(stem("parsed"), "pars");
        assert_eq!(stem("handlers"), "handler");
        assert_eq!(stem("creation"), "cre");
        assert_eq!(stem("running"), "run");
        // Too short to strip
        assert_eq!(stem("sing"), "sing");
        assert_eq!(stem("led"), "led");
    }

    #[test]
    fn serve_http_scores_high() {
        let matcher = PhraseMatcher::default();
        let query = tokenize_query("serve http");
        let score = matcher.score(&query, "ServeHTTP");
        assert!(score > 100.0, "got {score}");
        // Full match + adjacency should beat a partial match
        let partial = matcher.score(&query, "serveFile");
        assert!(score > partial);
    }

    #[test]
    fn unrelated_names_fall_below_floor() {
        let matcher = PhraseMatcher::default();
        let query = tokenize_query("serve http");
        let score = matcher.score(&query, "databaseMigration");
        assert!(score < SCORE_FLOOR, "got {score}");
    }

    #[test]
    fn score_is_deterministic() {
        let matcher = PhraseMatcher::default();
        let query = tokenize_query("read file contents");
        let a = matcher.score(&query, "readFileContents");
        let b = matcher.score(&query, "readFileContents");
        assert_eq!(a, b);
    }

    #[test]
    fn fuzzy_rescues_near_misses() {
        let strict = PhraseMatcher::new(false);
        let fuzzy = PhraseMatcher::new(true);
        let query = tokenize_query("dispach request"); // typo
        let without = strict.score(&query, "dispatchRequest");
        let with = fuzzy.score(&query, "dispatchRequest");
        assert!(with > without);
    }

    #[test]
    fn spread_penalty_prefers_tight_matches() {
        let matcher = PhraseMatcher::default();
        let query = tokenize_query("read file");
        let tight = matcher.score(&query, "readFile");
        let spread = matcher.score(&query, "readBufferedChunkedFile");
        assert!(tight > spread);
    }
}
