//! Symbol and reference graph.
//!
//! Two-stage resolution: extraction registers symbols with file-local
//! identity and references with textual target names; the link step then
//! resolves each reference through (a) the same-file scope chain, (b)
//! imported files in dependency order, (c) the project-wide name bucket.
//! Symbols live in dense per-file vectors (arena + index, no owning
//! pointers into cycles), so deletion is purging values.

use crate::store::FileStore;
use crate::types::{FileId, RefKind, ReferenceRec, SymbolId, SymbolRec, Visibility};
use lasso::{Spur, ThreadedRodeo};
use std::collections::{HashMap, HashSet};

/// A symbol installed in the graph.
#[derive(Debug, Clone)]
pub struct StoredSymbol {
    pub id: SymbolId,
    pub name: Spur,
    pub rec: SymbolRec,
}

/// A reference installed in the graph. `target` is a back-reference: when
/// the target file is deleted the reference survives unresolved.
#[derive(Debug, Clone)]
pub struct StoredRef {
    pub rec: ReferenceRec,
    pub target: Option<SymbolId>,
}

/// One node of a call tree.
#[derive(Debug, Clone)]
pub struct CallTreeNode {
    pub name: String,
    pub symbol: Option<SymbolId>,
    pub file: Option<FileId>,
    pub line: u32,
    /// The call closes a cycle back into the current path; it is annotated
    /// instead of expanded.
    pub recursive: bool,
    pub children: Vec<CallTreeNode>,
}

/// A definition hit.
#[derive(Debug, Clone)]
pub struct Definition {
    pub id: SymbolId,
    pub file: FileId,
    pub line: u32,
    pub signature: String,
}

#[derive(Default)]
pub struct SymbolGraph {
    interner: ThreadedRodeo,
    /// Symbols per file, local index order.
    by_file: Vec<Vec<StoredSymbol>>,
    /// References per file, source order.
    refs_by_file: Vec<Vec<StoredRef>>,
    /// Project-wide name buckets.
    buckets: HashMap<Spur, Vec<SymbolId>>,
    /// Incoming reference sites per symbol.
    incoming: HashMap<SymbolId, Vec<(FileId, u32, u32)>>,
}

impl SymbolGraph {
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

    /// Install extraction output for a file. Prior entries for the id must
    /// have been purged. References stay unresolved until `link_file`.
    pub fn add_file(&mut self, file: FileId, symbols: Vec<SymbolRec>, references: Vec<ReferenceRec>) {
        let stored: Vec<StoredSymbol> = symbols
            .into_iter()
            .enumerate()
            .map(|(local, rec)| StoredSymbol {
                id: SymbolId::new(file, local as u32),
                name: self.interner.get_or_intern(&rec.name),
                rec,
            })
            .collect();
        for sym in &stored {
            self.buckets.entry(sym.name).or_default().push(sym.id);
        }
        *Self::slot(&mut self.by_file, file) = stored;
        *Self::slot(&mut self.refs_by_file, file) = references
            .into_iter()
            .map(|rec| StoredRef { rec, target: None })
            .collect();
    }

    /// Purge a file: its symbols leave the buckets, its outgoing references
    /// disappear, and incoming references to its symbols go unresolved.
    pub fn remove_file(&mut self, file: FileId) {
        let symbols = match self.by_file.get_mut(file.as_usize()) {
            Some(s) => std::mem::take(s),
            None => return,
        };
        for sym in &symbols {
            if let Some(bucket) = self.buckets.get_mut(&sym.name) {
                bucket.retain(|id| *id != sym.id);
                if bucket.is_empty() {
                    self.buckets.remove(&sym.name);
                }
            }
            // Unresolve every reference that pointed here
            if let Some(sites) = self.incoming.remove(&sym.id) {
                for (src, line, column) in sites {
                    if src == file {
                        continue; // its own refs are being dropped anyway
                    }
                    if let Some(refs) = self.refs_by_file.get_mut(src.as_usize()) {
                        for r in refs.iter_mut() {
                            if r.rec.line == line
                                && r.rec.column == column
                                && r.target == Some(sym.id)
                            {
                                r.target = None;
                            }
                        }
                    }
                }
            }
        }
        // Drop outgoing references and their reverse entries
        let refs = self
            .refs_by_file
            .get_mut(file.as_usize())
            .map(std::mem::take)
            .unwrap_or_default();
        for r in refs {
            if let Some(target) = r.target {
                if let Some(sites) = self.incoming.get_mut(&target) {
                    sites.retain(|(src, line, col)| {
                        !(*src == file && *line == r.rec.line && *col == r.rec.column)
                    });
                    if sites.is_empty() {
                        self.incoming.remove(&target);
                    }
                }
            }
        }
    }

    /// Replace a file's symbols and references in one step, carrying
    /// incoming references across renames: when a definition with
    /// reference sites disappears and a new definition with the same kind
    /// and scope appears, the sites rebind to the new definition.
    pub fn replace_file(
        &mut self,
        file: FileId,
        symbols: Vec<SymbolRec>,
        references: Vec<ReferenceRec>,
    ) {
        let old_names: HashSet<String> = self
            .symbols_of_file(file)
            .iter()
            .map(|s| s.rec.name.clone())
            .collect();
        let referenced: Vec<(SymbolRec, Vec<(FileId, u32, u32)>)> = self
            .symbols_of_file(file)
            .iter()
            .filter_map(|s| {
                let sites = self.incoming.get(&s.id)?;
                Some((s.rec.clone(), sites.clone()))
            })
            .collect();

        self.remove_file(file);
        self.add_file(file, symbols, references);

        let mut taken: HashSet<SymbolId> = HashSet::new();
        for (old, sites) in referenced {
            let still_defined = self
                .symbols_of_file(file)
                .iter()
                .any(|s| s.rec.name == old.name);
            if still_defined {
                continue; // not a rename, the link step re-resolves it
            }
            let replacement = self
                .symbols_of_file(file)
                .iter()
                .find(|s| {
                    s.rec.kind == old.kind
                        && s.rec.scope == old.scope
                        && !old_names.contains(&s.rec.name)
                        && !taken.contains(&s.id)
                })
                .map(|s| s.id);
            let Some(new_id) = replacement else { continue };
            taken.insert(new_id);

            for (src, line, column) in sites {
                if src == file {
                    continue; // same-file refs were replaced wholesale
                }
                let Some(refs) = self.refs_by_file.get_mut(src.as_usize()) else {
                    continue;
                };
                let mut bound = false;
                for r in refs.iter_mut() {
                    if r.rec.line == line
                        && r.rec.column == column
                        && r.rec.name == old.name
                        && r.target.is_none()
                    {
                        r.target = Some(new_id);
                        bound = true;
                    }
                }
                if bound {
                    self.incoming
                        .entry(new_id)
                        .or_default()
                        .push((src, line, column));
                }
            }
        }
        for sites in self.incoming.values_mut() {
            sites.sort_unstable();
            sites.dedup();
        }
    }

    /// Link step for one file: resolve textual targets against the
    /// same-file scope chain, then `imported` (in import order), then the
    /// project-wide bucket. First definite hit wins; ties go to the lowest
    /// FileId, then the lowest definition line.
    pub fn link_file(&mut self, file: FileId, imported: &[FileId]) {
        let ref_count = self
            .refs_by_file
            .get(file.as_usize())
            .map_or(0, Vec::len);

        for i in 0..ref_count {
            let (name, kind, scope, line, column, old_target) = {
                let r = &self.refs_by_file[file.as_usize()][i];
                (
                    r.rec.name.clone(),
                    r.rec.kind,
                    r.rec.scope.clone(),
                    r.rec.line,
                    r.rec.column,
                    r.target,
                )
            };
            if kind == RefKind::Import {
                continue; // import targets are files, not symbols
            }
            // A live binding outlasts failed re-resolution: a rename carry
            // leaves the textual name stale while the target stays valid.
            let resolved = match self.resolve(file, &name, &scope, imported) {
                None => old_target.filter(|t| self.symbol(*t).is_some()),
                some => some,
            };
            if resolved == old_target {
                continue;
            }
            if let Some(old) = old_target {
                if let Some(sites) = self.incoming.get_mut(&old) {
                    sites.retain(|(src, l, c)| !(*src == file && *l == line && *c == column));
                }
            }
            self.refs_by_file[file.as_usize()][i].target = resolved;
            if let Some(new) = resolved {
                self.incoming
                    .entry(new)
                    .or_default()
                    .push((file, line, column));
            }
        }
        // Keep reference listings deterministic
        for sites in self.incoming.values_mut() {
            sites.sort_unstable();
            sites.dedup();
        }
    }

    fn resolve(
        &self,
        file: FileId,
        name: &str,
        ref_scope: &[String],
        imported: &[FileId],
    ) -> Option<SymbolId> {
        let key = self.interner.get(name)?;

        // (a) same file, innermost enclosing scope wins
        if let Some(symbols) = self.by_file.get(file.as_usize()) {
            let mut best: Option<&StoredSymbol> = None;
            for sym in symbols {
                if sym.name != key {
                    continue;
                }
                if !is_scope_prefix(&sym.rec.scope, ref_scope) {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some(b) => {
                        (sym.rec.scope.len(), std::cmp::Reverse(sym.rec.line))
                            > (b.rec.scope.len(), std::cmp::Reverse(b.rec.line))
                    }
                };
                if better {
                    best = Some(sym);
                }
            }
            if let Some(sym) = best {
                return Some(sym.id);
            }
        }

        // (b) imported files, in dependency order, public symbols only
        for &dep in imported {
            if let Some(symbols) = self.by_file.get(dep.as_usize()) {
                let mut best: Option<&StoredSymbol> = None;
                for sym in symbols {
                    if sym.name == key && sym.rec.visibility == Visibility::Public {
                        let better = best.is_none_or(|b| sym.rec.line < b.rec.line);
                        if better {
                            best = Some(sym);
                        }
                    }
                }
                if let Some(sym) = best {
                    return Some(sym.id);
                }
            }
        }

        // (c) project-wide bucket, lowest FileId then lowest line
        let bucket = self.buckets.get(&key)?;
        bucket
            .iter()
            .filter_map(|id| self.symbol(*id).map(|s| (s.rec.line, *id)))
            .min_by_key(|&(line, id)| (id.file(), line))
            .map(|(_, id)| id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn symbol(&self, id: SymbolId) -> Option<&StoredSymbol> {
        self.by_file
            .get(id.file().as_usize())?
            .get(id.local() as usize)
    }

    pub fn symbols_of_file(&self, file: FileId) -> &[StoredSymbol] {
        self.by_file
            .get(file.as_usize())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn refs_of_file(&self, file: FileId) -> &[StoredRef] {
        self.refs_by_file
            .get(file.as_usize())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All definitions of a simple name, ordered by (FileId, line).
    pub fn definition(&self, name: &str) -> Vec<Definition> {
        let Some(key) = self.interner.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<Definition> = self
            .buckets
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.symbol(*id))
            .map(|sym| Definition {
                id: sym.id,
                file: sym.id.file(),
                line: sym.rec.line,
                signature: sym.rec.signature.clone(),
            })
            .collect();
        out.sort_by_key(|d| (d.file, d.line));
        out
    }

    /// Reference sites pointing at a symbol, ordered by (FileId, line,
    /// column).
    pub fn references(&self, id: SymbolId) -> Vec<(FileId, u32, u32)> {
        let mut out = self.incoming.get(&id).cloned().unwrap_or_default();
        out.sort_unstable();
        out
    }

    /// Enclosing scope chain of a symbol, outermost first.
    pub fn breadcrumbs(&self, id: SymbolId) -> Option<Vec<String>> {
        self.symbol(id).map(|s| s.rec.scope.clone())
    }

    /// Callee tree rooted at the first definition of `name`.
    ///
    /// Each call is expanded at most once per path from the root; a call
    /// closing a cycle is annotated `recursive` rather than dropped.
    pub fn call_tree(&self, name: &str, max_depth: u32) -> Option<CallTreeNode> {
        let root = self.definition(name).into_iter().next()?;
        let mut path = Vec::new();
        Some(self.expand_calls(root.id, max_depth, &mut path))
    }

    fn expand_calls(&self, id: SymbolId, depth_left: u32, path: &mut Vec<SymbolId>) -> CallTreeNode {
        let sym = self.symbol(id);
        let (name, line) = sym
            .map(|s| (s.rec.name.clone(), s.rec.line))
            .unwrap_or_else(|| (String::new(), 0));
        let mut node = CallTreeNode {
            name,
            symbol: Some(id),
            file: Some(id.file()),
            line,
            recursive: false,
            children: Vec::new(),
        };
        let Some(sym) = sym else {
            return node;
        };
        if depth_left == 0 {
            return node;
        }

        path.push(id);
        for r in self.calls_within(id.file(), sym.rec.line, sym.rec.end_line) {
            match r.target {
                Some(target) if path.contains(&target) => {
                    let callee = self.symbol(target);
                    node.children.push(CallTreeNode {
                        name: callee
                            .map(|s| s.rec.name.clone())
                            .unwrap_or_else(|| r.rec.name.clone()),
                        symbol: Some(target),
                        file: Some(target.file()),
                        line: r.rec.line,
                        recursive: true,
                        children: Vec::new(),
                    });
                }
                Some(target) => {
                    let mut child = self.expand_calls(target, depth_left - 1, path);
                    child.line = r.rec.line;
                    node.children.push(child);
                }
                None => {
                    node.children.push(CallTreeNode {
                        name: r.rec.name.clone(),
                        symbol: None,
                        file: None,
                        line: r.rec.line,
                        recursive: false,
                        children: Vec::new(),
                    });
                }
            }
        }
        path.pop();
        node
    }

    fn calls_within(&self, file: FileId, start_line: u32, end_line: u32) -> Vec<&StoredRef> {
        self.refs_of_file(file)
            .iter()
            .filter(|r| {
                r.rec.kind == RefKind::Call && r.rec.line >= start_line && r.rec.line <= end_line
            })
            .collect()
    }

    /// Internal consistency check; each returned string describes one issue.
    pub fn validate_consistency(&self, store: &FileStore) -> Vec<String> {
        let mut issues = Vec::new();
        for (idx, symbols) in self.by_file.iter().enumerate() {
            let file = FileId(idx as u32);
            if !symbols.is_empty() && store.is_deleted(file) {
                issues.push(format!("file {idx} is tombstoned but still owns symbols"));
            }
            for (local, sym) in symbols.iter().enumerate() {
                if sym.id != SymbolId::new(file, local as u32) {
                    issues.push(format!("symbol {} has a foreign id", sym.rec.name));
                }
                let in_bucket = self
                    .buckets
                    .get(&sym.name)
                    .is_some_and(|b| b.contains(&sym.id));
                if !in_bucket {
                    issues.push(format!("symbol {} missing from name bucket", sym.rec.name));
                }
            }
        }
        for (idx, refs) in self.refs_by_file.iter().enumerate() {
            let file = FileId(idx as u32);
            if !refs.is_empty() && store.is_deleted(file) {
                issues.push(format!("file {idx} is tombstoned but still owns references"));
            }
            for r in refs {
                if let Some(target) = r.target {
                    if self.symbol(target).is_none() {
                        issues.push(format!(
                            "reference to {} at {}:{} resolves to a missing symbol",
                            r.rec.name, file.0, r.rec.line
                        ));
                    }
                }
            }
        }
        issues
    }

    pub fn symbol_count(&self) -> usize {
        self.by_file.iter().map(Vec::len).sum()
    }

    pub fn reference_count(&self) -> usize {
        self.refs_by_file.iter().map(Vec::len).sum()
    }

    pub fn unresolved_count(&self) -> usize {
        self.refs_by_file
            .iter()
            .flatten()
            .filter(|r| r.target.is_none() && r.rec.kind != RefKind::Import)
            .count()
    }

    /// Iterate all symbols (for phrase matching and reports).
    pub fn all_symbols(&self) -> impl Iterator<Item = &StoredSymbol> {
        self.by_file.iter().flatten()
    }
}

/// `outer` declares a name visible at `inner` when `outer` is a prefix of
/// `inner` (a symbol in an enclosing scope).
fn is_scope_prefix(outer: &[String], inner: &[String]) -> bool {
    outer.len() <= inner.len() && outer.iter().zip(inner).all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SymbolKind, SymbolMetrics};

    fn symbol(name: &str, line: u32, end_line: u32, scope: &[&str], vis: Visibility) -> SymbolRec {
        SymbolRec {
            name: name.to_string(),
            kind: SymbolKind::Function,
            line,
            column: 1,
            end_line,
            signature: format!("func {name}()"),
            visibility: vis,
            scope: scope.iter().map(|s| s.to_string()).collect(),
            attributes: Vec::new(),
            metrics: SymbolMetrics::default(),
        }
    }

    fn call(name: &str, line: u32, scope: &[&str]) -> ReferenceRec {
        ReferenceRec {
            name: name.to_string(),
            kind: RefKind::Call,
            line,
            column: 5,
            scope: scope.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn definition_and_references_roundtrip() {
        let mut graph = SymbolGraph::new();
        let a = FileId(0);
        let b = FileId(1);
        graph.add_file(
            a,
            vec![symbol("Bar", 3, 5, &["pkg"], Visibility::Public)],
            vec![],
        );
        graph.add_file(b, vec![], vec![call("Bar", 10, &["pkg2"])]);
        graph.link_file(b, &[a]);

        let defs = graph.definition("Bar");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].file, a);
        assert_eq!(defs[0].line, 3);

        let refs = graph.references(defs[0].id);
        assert_eq!(refs, vec![(b, 10, 5)]);
    }

    #[test]
    fn same_file_scope_beats_import_and_bucket() {
        let mut graph = SymbolGraph::new();
        let local = FileId(0);
        let dep = FileId(1);
        graph.add_file(
            dep,
            vec![symbol("helper", 1, 2, &[], Visibility::Public)],
            vec![],
        );
        graph.add_file(
            local,
            vec![
                symbol("helper", 2, 4, &["outer"], Visibility::Private),
                symbol("main", 6, 9, &["outer"], Visibility::Public),
            ],
            vec![call("helper", 7, &["outer", "main"])],
        );
        graph.link_file(local, &[dep]);

        let r = &graph.refs_of_file(local)[0];
        assert_eq!(r.target, Some(SymbolId::new(local, 0)));
    }

    #[test]
    fn import_order_beats_project_bucket() {
        let mut graph = SymbolGraph::new();
        let src = FileId(0);
        let first = FileId(1);
        let second = FileId(2);
        graph.add_file(
            first,
            vec![symbol("Encode", 9, 12, &[], Visibility::Public)],
            vec![],
        );
        graph.add_file(
            second,
            vec![symbol("Encode", 1, 3, &[], Visibility::Public)],
            vec![],
        );
        graph.add_file(src, vec![], vec![call("Encode", 2, &[])]);
        // `second` comes first in import order and wins despite the higher id
        graph.link_file(src, &[second, first]);
        assert_eq!(
            graph.refs_of_file(src)[0].target,
            Some(SymbolId::new(second, 0))
        );
    }

    #[test]
    fn bucket_tie_break_is_lowest_file_then_line() {
        let mut graph = SymbolGraph::new();
        graph.add_file(
            FileId(2),
            vec![symbol("dup", 1, 1, &[], Visibility::Public)],
            vec![],
        );
        graph.add_file(
            FileId(1),
            vec![symbol("dup", 5, 5, &[], Visibility::Public)],
            vec![],
        );
        graph.add_file(FileId(0), vec![], vec![call("dup", 1, &[])]);
        graph.link_file(FileId(0), &[]);
        assert_eq!(
            graph.refs_of_file(FileId(0))[0].target,
            Some(SymbolId::new(FileId(1), 0))
        );
    }

    #[test]
    fn rename_carries_incoming_references() {
        let mut graph = SymbolGraph::new();
        let target = FileId(0);
        let caller = FileId(1);
        graph.add_file(
            target,
            vec![symbol("Bar", 3, 5, &[], Visibility::Public)],
            vec![],
        );
        graph.add_file(caller, vec![], vec![call("Bar", 10, &[])]);
        graph.link_file(caller, &[target]);

        // Same kind and scope, new name: the call site follows the rename
        graph.replace_file(
            target,
            vec![symbol("Baz", 3, 5, &[], Visibility::Public)],
            vec![],
        );
        assert!(graph.definition("Bar").is_empty());
        let baz = graph.definition("Baz");
        assert_eq!(baz.len(), 1);
        assert_eq!(graph.references(baz[0].id), vec![(caller, 10, 5)]);

        // Re-linking the caller keeps the carried binding even though the
        // textual name no longer resolves
        graph.link_file(caller, &[target]);
        assert_eq!(graph.references(baz[0].id), vec![(caller, 10, 5)]);
        assert_eq!(
            graph.refs_of_file(caller)[0].target,
            Some(baz[0].id)
        );
    }

    #[test]
    fn remove_file_unresolves_incoming() {
        let mut graph = SymbolGraph::new();
        let target = FileId(0);
        let caller = FileId(1);
        graph.add_file(
            target,
            vec![symbol("Gone", 1, 2, &[], Visibility::Public)],
            vec![],
        );
        graph.add_file(caller, vec![], vec![call("Gone", 4, &[])]);
        graph.link_file(caller, &[target]);
        assert!(graph.refs_of_file(caller)[0].target.is_some());

        graph.remove_file(target);
        assert!(graph.definition("Gone").is_empty());
        // The reference survives, unresolved
        assert_eq!(graph.refs_of_file(caller).len(), 1);
        assert!(graph.refs_of_file(caller)[0].target.is_none());
    }

    #[test]
    fn call_tree_terminates_on_recursion() {
        let mut graph = SymbolGraph::new();
        let f = FileId(0);
        graph.add_file(
            f,
            vec![
                symbol("ping", 1, 5, &[], Visibility::Public),
                symbol("pong", 7, 11, &[], Visibility::Public),
            ],
            vec![call("pong", 2, &["ping"]), call("ping", 8, &["pong"])],
        );
        graph.link_file(f, &[]);

        let tree = graph.call_tree("ping", 10).unwrap();
        assert_eq!(tree.name, "ping");
        assert_eq!(tree.children.len(), 1);
        let pong = &tree.children[0];
        assert_eq!(pong.name, "pong");
        let back = &pong.children[0];
        assert!(back.recursive, "cycle edge must be annotated");
        assert!(back.children.is_empty());
    }

    #[test]
    fn consistency_is_clean_after_link() {
        let store = FileStore::new();
        let mut graph = SymbolGraph::new();
        use std::path::PathBuf;
        use std::sync::Arc;
        use std::time::SystemTime;
        let id = store.add(
            PathBuf::from("/r/a.go"),
            Arc::from("package a"),
            SystemTime::UNIX_EPOCH,
        );
        graph.add_file(
            id,
            vec![symbol("A", 1, 1, &[], Visibility::Public)],
            vec![call("A", 1, &[])],
        );
        graph.link_file(id, &[]);
        assert!(graph.validate_consistency(&store).is_empty());
    }
}
