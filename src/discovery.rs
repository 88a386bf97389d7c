//! Corpus discovery.
//!
//! Walks the project root respecting .gitignore rules, applies the
//! configured include/exclude globs, and enforces the size budget
//! (`max_file_size`, `max_total_size_mb`, `max_file_count` with
//! priority-mode eviction).

use crate::config::{Config, FileMeta, rank_by_priority};
use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Outcome of a discovery pass.
#[derive(Debug, Default)]
pub struct Corpus {
    /// Files to index, in walk order after budget enforcement.
    pub files: Vec<FileMeta>,
    /// Files skipped for exceeding `max_file_size`.
    pub oversized: Vec<PathBuf>,
    /// Files dropped by `max_file_count` / `max_total_size_mb` eviction.
    pub evicted: usize,
}

/// Discovers source files under a project root.
pub struct FileDiscovery<'a> {
    config: &'a Config,
}

impl<'a> FileDiscovery<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Walk the root and return the corpus to index.
    pub fn discover(&self) -> Result<Corpus> {
        let default_excludes = build_globset(default_exclude_patterns())?;
        let user_excludes = build_globset(self.config.exclude.iter().map(|s| s.as_str()))?;
        let user_includes = build_globset(self.config.include.iter().map(|s| s.as_str()))?;

        let walker = WalkBuilder::new(&self.config.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .follow_links(self.config.follow_symlinks)
            .build();

        let mut corpus = Corpus::default();

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            let rel = path.strip_prefix(&self.config.root).unwrap_or(path);
            if !self.selected(rel, &default_excludes, &user_excludes, &user_includes) {
                continue;
            }

            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.len() > self.config.max_file_size {
                corpus.oversized.push(path.to_path_buf());
                continue;
            }

            corpus.files.push(FileMeta {
                path: path.to_path_buf(),
                size: metadata.len(),
                mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        self.enforce_budget(&mut corpus);
        Ok(corpus)
    }

    /// Empty include list means "everything not excluded"; a non-empty
    /// include list additionally rescues files the exclude globs would drop.
    fn selected(&self, rel: &Path, default: &GlobSet, user: &GlobSet, include: &GlobSet) -> bool {
        let included = include.is_match(rel);
        let excluded = default.is_match(rel) || user.is_match(rel);
        if excluded && !included {
            return false;
        }
        if self.config.include.is_empty() {
            return true;
        }
        included
    }

    fn enforce_budget(&self, corpus: &mut Corpus) {
        if !self.config.smart_size_control {
            return;
        }
        let count_cap = self.config.max_file_count;
        let byte_cap = self.config.max_total_size_mb.saturating_mul(1024 * 1024);

        let over_count = count_cap > 0 && corpus.files.len() > count_cap;
        let total: u64 = corpus.files.iter().map(|f| f.size).sum();
        let over_bytes = byte_cap > 0 && total > byte_cap;
        if !over_count && !over_bytes {
            return;
        }

        rank_by_priority(&mut corpus.files, self.config.priority_mode);
        let before = corpus.files.len();

        if over_count {
            corpus.files.truncate(count_cap);
        }
        if byte_cap > 0 {
            let mut running = 0u64;
            let mut keep = 0usize;
            for f in &corpus.files {
                if running + f.size > byte_cap {
                    break;
                }
                running += f.size;
                keep += 1;
            }
            corpus.files.truncate(keep);
        }
        corpus.evicted = before - corpus.files.len();
        tracing::warn!(
            evicted = corpus.evicted,
            mode = ?self.config.priority_mode,
            "corpus over budget, dropped lowest-priority files"
        );
    }
}

fn default_exclude_patterns() -> Vec<&'static str> {
    vec![
        "**/.git/**",
        "**/node_modules/**",
        "**/dist/**",
        "**/build/**",
        "**/out/**",
        "**/coverage/**",
        "**/vendor/**",
        "**/.venv/**",
        "**/__pycache__/**",
        "**/.next/**",
        "**/package-lock.json",
        "**/yarn.lock",
        "**/pnpm-lock.yaml",
        "**/go.sum",
        "**/*.min.js",
        "**/*.min.css",
        "**/*.map",
        "**/*.png",
        "**/*.jpg",
        "**/*.jpeg",
        "**/*.gif",
        "**/*.webp",
        "**/*.pdf",
        "**/*.zip",
        "**/*.gz",
        "**/*.tar",
        "**/*.tgz",
        "**/*.jar",
        "**/*.wasm",
        "**/*.o",
        "**/*.a",
        "**/*.so",
        "**/*.dylib",
        "**/*.dll",
        "**/*.pyc",
    ]
}

fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn walks_and_respects_default_excludes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.go", "package a\n");
        write(dir.path(), "node_modules/x/index.js", "junk\n");
        write(dir.path(), "img.png", "binary\n");

        let config = Config::for_root(dir.path().to_path_buf());
        let corpus = FileDiscovery::new(&config).discover().unwrap();
        let names: Vec<_> = corpus
            .files
            .iter()
            .map(|f| f.path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("src/a.go")]);
    }

    #[test]
    fn empty_include_means_everything_not_excluded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "x = 1\n");
        write(dir.path(), "b.txt", "note\n");

        let config = Config::for_root(dir.path().to_path_buf());
        let corpus = FileDiscovery::new(&config).discover().unwrap();
        assert_eq!(corpus.files.len(), 2);

        let narrowed = Config {
            include: vec!["**/*.py".to_string()],
            ..Config::for_root(dir.path().to_path_buf())
        };
        let corpus = FileDiscovery::new(&narrowed).discover().unwrap();
        assert_eq!(corpus.files.len(), 1);
        assert!(corpus.files[0].path.ends_with("a.py"));
    }

    #[test]
    fn oversized_files_are_reported_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "big.js", &"x".repeat(128));
        write(dir.path(), "small.js", "ok\n");

        let config = Config {
            max_file_size: 64,
            ..Config::for_root(dir.path().to_path_buf())
        };
        let corpus = FileDiscovery::new(&config).discover().unwrap();
        assert_eq!(corpus.files.len(), 1);
        assert_eq!(corpus.oversized.len(), 1);
        assert!(corpus.oversized[0].ends_with("big.js"));
    }

    #[test]
    fn file_count_cap_evicts_by_priority() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("f{i}.go"), "package f\n");
        }
        let config = Config {
            max_file_count: 3,
            ..Config::for_root(dir.path().to_path_buf())
        };
        let corpus = FileDiscovery::new(&config).discover().unwrap();
        assert_eq!(corpus.files.len(), 3);
        assert_eq!(corpus.evicted, 2);
    }
}
