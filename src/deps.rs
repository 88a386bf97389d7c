//! Dependency tracker.
//!
//! Forward edges (file → files it imports, in import order) and reverse
//! edges (file → files importing it) for cascade invalidation. Cycles are
//! permitted; traversal terminates on a visited set and breaks ties by
//! ascending FileId.

use crate::types::FileId;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet, VecDeque};

/// Depth cap for reverse-closure cascades.
pub const DEFAULT_CASCADE_DEPTH: u32 = 64;

/// Aggregate shape of the dependency graph.
#[derive(Debug, Clone, Default)]
pub struct ComplexityReport {
    pub total_edges: usize,
    pub max_depth: usize,
    pub max_fan_in: usize,
    pub max_fan_out: usize,
    pub avg_fan_out: f64,
    /// Strongly-connected components with more than one member.
    pub cycles: Vec<Vec<FileId>>,
}

#[derive(Default)]
pub struct DependencyTracker {
    /// Import order preserved; this order feeds symbol resolution.
    forward: Vec<Vec<FileId>>,
    reverse: Vec<Vec<FileId>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(vec: &mut Vec<Vec<FileId>>, file: FileId) -> &mut Vec<FileId> {
        let idx = file.as_usize();
        if vec.len() <= idx {
            vec.resize_with(idx + 1, Vec::new);
        }
        &mut vec[idx]
    }

    /// Replace the import list of a file. Order is preserved, duplicates
    /// keep their first position.
    pub fn set_imports(&mut self, file: FileId, targets: Vec<FileId>) {
        self.clear_forward(file);
        let mut seen = HashSet::new();
        let deduped: Vec<FileId> = targets
            .into_iter()
            .filter(|t| *t != file && seen.insert(*t))
            .collect();
        for &target in &deduped {
            let rev = Self::slot(&mut self.reverse, target);
            if !rev.contains(&file) {
                rev.push(file);
                rev.sort_unstable();
            }
        }
        *Self::slot(&mut self.forward, file) = deduped;
    }

    fn clear_forward(&mut self, file: FileId) {
        let old = self
            .forward
            .get_mut(file.as_usize())
            .map(std::mem::take)
            .unwrap_or_default();
        for target in old {
            if let Some(rev) = self.reverse.get_mut(target.as_usize()) {
                rev.retain(|f| *f != file);
            }
        }
    }

    /// Drop every edge touching a file.
    pub fn remove_file(&mut self, file: FileId) {
        self.clear_forward(file);
        let importers = self
            .reverse
            .get_mut(file.as_usize())
            .map(std::mem::take)
            .unwrap_or_default();
        for importer in importers {
            if let Some(fwd) = self.forward.get_mut(importer.as_usize()) {
                fwd.retain(|f| *f != file);
            }
        }
    }

    /// Files a file imports, in import order.
    pub fn imports_of(&self, file: FileId) -> &[FileId] {
        self.forward
            .get(file.as_usize())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Files importing a file, ascending.
    pub fn importers_of(&self, file: FileId) -> &[FileId] {
        self.reverse
            .get(file.as_usize())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Transitive reverse closure of a file, bounded by `max_depth`, in
    /// breadth-first order with FileId-ascending tie-break. The file itself
    /// is not included.
    pub fn dependents_of(&self, file: FileId, max_depth: u32) -> Vec<FileId> {
        let mut out = Vec::new();
        let mut visited = HashSet::from([file]);
        let mut queue = VecDeque::from([(file, 0u32)]);
        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let mut next: Vec<FileId> = self
                .importers_of(current)
                .iter()
                .filter(|f| !visited.contains(f))
                .copied()
                .collect();
            next.sort_unstable();
            for f in next {
                visited.insert(f);
                out.push(f);
                queue.push_back((f, depth + 1));
            }
        }
        out
    }

    pub fn edge_count(&self) -> usize {
        self.forward.iter().map(Vec::len).sum()
    }

    /// Graph-shape analysis: edge totals, fan statistics, the longest
    /// acyclic chain, and strongly-connected components.
    pub fn analyze_complexity(&self) -> ComplexityReport {
        let mut graph = DiGraph::<FileId, ()>::new();
        let mut nodes = HashMap::new();
        for (idx, targets) in self.forward.iter().enumerate() {
            let from = FileId(idx as u32);
            if targets.is_empty() && self.importers_of(from).is_empty() {
                continue;
            }
            let a = *nodes.entry(from).or_insert_with(|| graph.add_node(from));
            for &to in targets {
                let b = *nodes.entry(to).or_insert_with(|| graph.add_node(to));
                graph.add_edge(a, b, ());
            }
        }

        let total_edges = graph.edge_count();
        let max_fan_out = self.forward.iter().map(Vec::len).max().unwrap_or(0);
        let max_fan_in = self.reverse.iter().map(Vec::len).max().unwrap_or(0);
        let files_with_imports = self.forward.iter().filter(|v| !v.is_empty()).count();
        let avg_fan_out = if files_with_imports == 0 {
            0.0
        } else {
            total_edges as f64 / files_with_imports as f64
        };

        let mut cycles: Vec<Vec<FileId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut ids: Vec<FileId> = scc.into_iter().map(|n| graph[n]).collect();
                ids.sort_unstable();
                ids
            })
            .collect();
        cycles.sort();

        let max_depth = (0..self.forward.len())
            .map(|idx| self.depth_from(FileId(idx as u32)))
            .max()
            .unwrap_or(0);

        ComplexityReport {
            total_edges,
            max_depth,
            max_fan_in,
            max_fan_out,
            avg_fan_out,
            cycles,
        }
    }

    /// Longest forward chain from a file, visited-set bounded.
    fn depth_from(&self, file: FileId) -> usize {
        fn go(
            tracker: &DependencyTracker,
            file: FileId,
            visited: &mut HashSet<FileId>,
        ) -> usize {
            let mut best = 0;
            for &next in tracker.imports_of(file) {
                if visited.insert(next) {
                    best = best.max(1 + go(tracker, next, visited));
                    visited.remove(&next);
                }
            }
            best
        }
        let mut visited = HashSet::from([file]);
        go(self, file, &mut visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_reverse_stay_in_sync() {
        let mut deps = DependencyTracker::new();
        deps.set_imports(FileId(0), vec![FileId(1), FileId(2)]);
        deps.set_imports(FileId(3), vec![FileId(1)]);

        assert_eq!(deps.imports_of(FileId(0)), &[FileId(1), FileId(2)]);
        assert_eq!(deps.importers_of(FileId(1)), &[FileId(0), FileId(3)]);

        deps.set_imports(FileId(0), vec![FileId(2)]);
        assert_eq!(deps.importers_of(FileId(1)), &[FileId(3)]);
    }

    #[test]
    fn import_order_is_preserved() {
        let mut deps = DependencyTracker::new();
        deps.set_imports(FileId(0), vec![FileId(5), FileId(2), FileId(5), FileId(9)]);
        assert_eq!(
            deps.imports_of(FileId(0)),
            &[FileId(5), FileId(2), FileId(9)]
        );
    }

    #[test]
    fn dependents_bounded_and_ordered() {
        let mut deps = DependencyTracker::new();
        // 1 -> 0, 2 -> 0, 3 -> 1 (a imports b written as set_imports(a, [b]))
        deps.set_imports(FileId(1), vec![FileId(0)]);
        deps.set_imports(FileId(2), vec![FileId(0)]);
        deps.set_imports(FileId(3), vec![FileId(1)]);

        assert_eq!(
            deps.dependents_of(FileId(0), DEFAULT_CASCADE_DEPTH),
            vec![FileId(1), FileId(2), FileId(3)]
        );
        assert_eq!(
            deps.dependents_of(FileId(0), 1),
            vec![FileId(1), FileId(2)]
        );
    }

    #[test]
    fn cycles_terminate() {
        let mut deps = DependencyTracker::new();
        deps.set_imports(FileId(0), vec![FileId(1)]);
        deps.set_imports(FileId(1), vec![FileId(0)]);
        let dependents = deps.dependents_of(FileId(0), DEFAULT_CASCADE_DEPTH);
        assert_eq!(dependents, vec![FileId(1)]);

        let report = deps.analyze_complexity();
        assert_eq!(report.cycles, vec![vec![FileId(0), FileId(1)]]);
    }

    #[test]
    fn complexity_stats() {
        let mut deps = DependencyTracker::new();
        deps.set_imports(FileId(0), vec![FileId(1), FileId(2)]);
        deps.set_imports(FileId(1), vec![FileId(2)]);
        let report = deps.analyze_complexity();
        assert_eq!(report.total_edges, 3);
        assert_eq!(report.max_fan_out, 2);
        assert_eq!(report.max_fan_in, 2);
        assert_eq!(report.max_depth, 2); // 0 -> 1 -> 2
        assert!(report.cycles.is_empty());
        assert!((report.avg_fan_out - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn remove_file_drops_both_directions() {
        let mut deps = DependencyTracker::new();
        deps.set_imports(FileId(0), vec![FileId(1)]);
        deps.set_imports(FileId(2), vec![FileId(0)]);
        deps.remove_file(FileId(0));
        assert!(deps.imports_of(FileId(0)).is_empty());
        assert!(deps.importers_of(FileId(1)).is_empty());
        assert!(deps.imports_of(FileId(2)).is_empty());
    }
}
