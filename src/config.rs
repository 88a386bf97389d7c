//! Configuration contract.
//!
//! The recognized fields, their defaults, and validation. Unknown fields are
//! rejected with `InvalidConfig`. Richer config front-ends (KDL/YAML) live
//! outside the core; the core reads plain JSON.

use crate::error::IndexError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Ranking applied when discovery yields more than `max_file_count` files.
///
/// All modes are deterministic; the final tie-break is the lexicographic
/// path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityMode {
    /// Newest mtime first.
    Recent,
    /// Smallest size first.
    Small,
    /// Non-test source above tests, shallower paths above deeper, then
    /// smaller size.
    Important,
    /// Weighted blend of recency, size and importance ranks.
    #[default]
    Balanced,
}

/// Project configuration.
///
/// Defaults are per-field; an empty `include` list means "everything not
/// excluded".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Project root. All indexed paths live under it.
    pub root: PathBuf,
    /// Include globs. Empty = everything not excluded.
    pub include: Vec<String>,
    /// Exclude globs, applied after the built-in excludes.
    pub exclude: Vec<String>,
    /// Per-file size cap in bytes.
    pub max_file_size: u64,
    /// Total corpus cap in megabytes; 0 = unlimited.
    pub max_total_size_mb: u64,
    /// Corpus file-count cap; 0 = unlimited.
    pub max_file_count: usize,
    pub follow_symlinks: bool,
    /// When over budget, drop files by `priority_mode` rather than failing.
    pub smart_size_control: bool,
    pub priority_mode: PriorityMode,
    /// Soft memory budget for the resident index; 0 = unlimited.
    pub max_memory_mb: u64,
    /// Worker-pool size; 0 = number of hardware threads.
    #[serde(alias = "max_goroutines")]
    pub max_workers: usize,
    /// Filesystem event coalescing window.
    pub debounce_ms: u64,
    /// Default result cap for queries; 0 = unlimited.
    pub max_results: u32,
    pub max_context_lines: u32,
    /// Levenshtein fuzzy bonus in phrase scoring.
    pub enable_fuzzy: bool,
    pub merge_file_results: bool,
    /// Extend snippet spans to complete statements.
    pub ensure_complete_stmt: bool,
    /// Pull leading comments into symbol signatures.
    pub include_leading_comments: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            include: Vec::new(),
            exclude: Vec::new(),
            max_file_size: 2 * 1024 * 1024,
            max_total_size_mb: 512,
            max_file_count: 50_000,
            follow_symlinks: false,
            smart_size_control: true,
            priority_mode: PriorityMode::default(),
            max_memory_mb: 0,
            max_workers: 0,
            debounce_ms: 100,
            max_results: 1000,
            max_context_lines: 8,
            enable_fuzzy: true,
            merge_file_results: false,
            ensure_complete_stmt: false,
            include_leading_comments: false,
        }
    }
}

impl Config {
    /// Default configuration rooted at `root`.
    pub fn for_root(root: PathBuf) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    /// Config file location for a project root.
    pub fn path_for(root: &Path) -> PathBuf {
        root.join("lci.json")
    }

    /// Load config from `<root>/lci.json`, falling back to defaults when no
    /// file exists. Unknown fields and malformed JSON are `InvalidConfig`.
    pub fn load(root: &Path) -> Result<Self, IndexError> {
        let path = Self::path_for(root);
        if !path.exists() {
            return Ok(Self::for_root(root.to_path_buf()));
        }
        let data = std::fs::read_to_string(&path)
            .map_err(|e| IndexError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let mut config: Config = serde_json::from_str(&data)
            .map_err(|e| IndexError::InvalidConfig(format!("{}: {e}", path.display())))?;
        if config.root.as_os_str().is_empty() || config.root == Path::new(".") {
            config.root = root.to_path_buf();
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate field values and glob syntax.
    pub fn validate(&self) -> Result<(), IndexError> {
        for pattern in self.include.iter().chain(self.exclude.iter()) {
            globset::Glob::new(pattern)
                .map_err(|e| IndexError::InvalidConfig(format!("glob {pattern:?}: {e}")))?;
        }
        if self.max_file_size == 0 {
            return Err(IndexError::InvalidConfig(
                "max_file_size must be positive".to_string(),
            ));
        }
        if self.debounce_ms > 60_000 {
            return Err(IndexError::InvalidConfig(
                "debounce_ms must be at most 60000".to_string(),
            ));
        }
        if self.max_context_lines > 1000 {
            return Err(IndexError::InvalidConfig(
                "max_context_lines must be at most 1000".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective worker-pool size, honoring `LCI_MAX_PROCS`.
    pub fn worker_count(&self) -> usize {
        if let Ok(v) = std::env::var("LCI_MAX_PROCS") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    return n;
                }
            }
        }
        if self.max_workers > 0 {
            return self.max_workers;
        }
        num_cpus::get()
    }

    /// Indexing runs on fewer workers than queries to limit lock contention.
    pub fn indexing_worker_count(&self) -> usize {
        self.worker_count().min(4)
    }
}

/// Metadata used by the priority rankers.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: SystemTime,
}

/// Whether a path looks like test code.
pub fn is_test_path(path: &Path) -> bool {
    let s = path.to_string_lossy();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    s.contains("/tests/")
        || s.contains("/test/")
        || s.contains("/__tests__/")
        || name.starts_with("test_")
        || name.ends_with("_test.go")
        || name.ends_with("_test.py")
        || name.contains(".test.")
        || name.contains(".spec.")
}

/// Rank files for `max_file_count` eviction; keeps the first
/// `max_file_count` entries of the returned order.
pub fn rank_by_priority(files: &mut [FileMeta], mode: PriorityMode) {
    match mode {
        PriorityMode::Recent => {
            files.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| a.path.cmp(&b.path)));
        }
        PriorityMode::Small => {
            files.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.path.cmp(&b.path)));
        }
        PriorityMode::Important => {
            files.sort_by(|a, b| {
                importance_key(a)
                    .cmp(&importance_key(b))
                    .then_with(|| a.path.cmp(&b.path))
            });
        }
        PriorityMode::Balanced => {
            let scores = balanced_scores(files);
            let mut order: Vec<usize> = (0..files.len()).collect();
            order.sort_by(|&a, &b| {
                scores[a]
                    .partial_cmp(&scores[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| files[a].path.cmp(&files[b].path))
            });
            let reordered: Vec<FileMeta> = order.iter().map(|&i| files[i].clone()).collect();
            files.clone_from_slice(&reordered);
        }
    }
}

fn importance_key(meta: &FileMeta) -> (u8, usize, u64) {
    let test = u8::from(is_test_path(&meta.path));
    let depth = meta.path.components().count();
    (test, depth, meta.size)
}

/// Normalized-rank blend: 0.4 recency + 0.3 size + 0.3 importance.
fn balanced_scores(files: &[FileMeta]) -> Vec<f64> {
    let n = files.len().max(1) as f64;
    let rank_of = |order: Vec<usize>| {
        let mut rank = vec![0f64; files.len()];
        for (r, idx) in order.into_iter().enumerate() {
            rank[idx] = r as f64 / n;
        }
        rank
    };

    let mut by_recency: Vec<usize> = (0..files.len()).collect();
    by_recency.sort_by(|&a, &b| {
        files[b]
            .mtime
            .cmp(&files[a].mtime)
            .then_with(|| files[a].path.cmp(&files[b].path))
    });
    let mut by_size: Vec<usize> = (0..files.len()).collect();
    by_size.sort_by(|&a, &b| {
        files[a]
            .size
            .cmp(&files[b].size)
            .then_with(|| files[a].path.cmp(&files[b].path))
    });
    let mut by_importance: Vec<usize> = (0..files.len()).collect();
    by_importance.sort_by(|&a, &b| {
        importance_key(&files[a])
            .cmp(&importance_key(&files[b]))
            .then_with(|| files[a].path.cmp(&files[b].path))
    });

    let recency = rank_of(by_recency);
    let size = rank_of(by_size);
    let importance = rank_of(by_importance);
    (0..files.len())
        .map(|i| 0.4 * recency[i] + 0.3 * size[i] + 0.3 * importance[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = serde_json::from_str::<Config>(r#"{"no_such_field": 1}"#);
        assert!(err.is_err());
    }

    #[test]
    fn max_goroutines_alias_accepted() {
        let config: Config = serde_json::from_str(r#"{"max_goroutines": 8}"#).unwrap();
        assert_eq!(config.max_workers, 8);
    }

    #[test]
    fn bad_glob_is_invalid_config() {
        let config = Config {
            exclude: vec!["[".to_string()],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(IndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_paths_detected() {
        assert!(is_test_path(Path::new("pkg/mux_test.go")));
        assert!(is_test_path(Path::new("src/__tests__/app.tsx")));
        assert!(is_test_path(Path::new("lib/test_util.py")));
        assert!(is_test_path(Path::new("a/b.spec.ts")));
        assert!(!is_test_path(Path::new("src/server.go")));
    }

    #[test]
    fn priority_modes_are_deterministic() {
        let base = SystemTime::UNIX_EPOCH;
        let mk = |p: &str, size, secs| FileMeta {
            path: PathBuf::from(p),
            size,
            mtime: base + Duration::from_secs(secs),
        };
        let files = vec![
            mk("src/new_big.go", 9000, 300),
            mk("src/old_small.go", 10, 100),
            mk("tests/old_big_test.go", 9000, 100),
        ];

        let mut recent = files.clone();
        rank_by_priority(&mut recent, PriorityMode::Recent);
        assert_eq!(recent[0].path, Path::new("src/new_big.go"));

        let mut small = files.clone();
        rank_by_priority(&mut small, PriorityMode::Small);
        assert_eq!(small[0].path, Path::new("src/old_small.go"));

        let mut important = files.clone();
        rank_by_priority(&mut important, PriorityMode::Important);
        assert_eq!(
            important[2].path,
            Path::new("tests/old_big_test.go"),
            "tests rank last"
        );

        // Same input, same output
        let mut again = files.clone();
        rank_by_priority(&mut again, PriorityMode::Balanced);
        let mut twice = files.clone();
        rank_by_priority(&mut twice, PriorityMode::Balanced);
        let a: Vec<_> = again.iter().map(|f| f.path.clone()).collect();
        let b: Vec<_> = twice.iter().map(|f| f.path.clone()).collect();
        assert_eq!(a, b);
    }
}
