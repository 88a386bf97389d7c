//! JavaScript / TypeScript extractor using tree-sitter.
//!
//! One walker serves JS, JSX, TS and TSX; the grammars share node kinds for
//! everything we touch, TS adding interfaces, type aliases and enums.

use super::{
    Capabilities, Extractor, classify_ranges, column_of, count_branches, end_line_of, last_ident_of,
    line_of, node_text, parse_with, signature_of,
};
use crate::types::{
    ExtractionResult, FileId, ImportRec, RefKind, ReferenceRec, SymbolKind, SymbolMetrics,
    SymbolRec, Visibility,
};
use tree_sitter::{Language, Node};

const COMMENT_KINDS: &[&str] = &["comment"];
const STRING_KINDS: &[&str] = &["string", "template_string"];
const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_case",
    "ternary_expression",
    "catch_clause",
];

pub struct JsExtractor {
    language: Language,
}

impl JsExtractor {
    pub fn javascript() -> Self {
        Self {
            language: tree_sitter_javascript::LANGUAGE.into(),
        }
    }

    pub fn typescript() -> Self {
        Self {
            language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        }
    }

    pub fn tsx() -> Self {
        Self {
            language: tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

impl Extractor for JsExtractor {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            symbols: true,
            references: true,
            scopes: true,
        }
    }

    fn extract(&self, _file_id: FileId, content: &str) -> ExtractionResult {
        let tree = match parse_with(&self.language, content) {
            Ok(tree) => tree,
            Err(e) => {
                return ExtractionResult {
                    error: Some(e),
                    ..Default::default()
                };
            }
        };
        let root = tree.root_node();

        let mut result = ExtractionResult {
            ranges: classify_ranges(root, COMMENT_KINDS, STRING_KINDS),
            ..Default::default()
        };
        let mut ctx = WalkCtx {
            scope: Vec::new(),
            exported: false,
        };
        walk(root, content, &mut ctx, &mut result);

        if root.has_error() {
            result.error = Some("syntax errors in file, extraction is partial".to_string());
        }
        result
    }
}

struct WalkCtx {
    scope: Vec<String>,
    exported: bool,
}

fn visibility(ctx: &WalkCtx) -> Visibility {
    if ctx.exported {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn metrics_of(node: Node) -> SymbolMetrics {
    SymbolMetrics {
        complexity: 1 + count_branches(node, BRANCH_KINDS),
        loc: end_line_of(node) - line_of(node) + 1,
        pure: None,
    }
}

/// Decorators preceding a class member or declaration, verbatim.
fn decorators_of(source: &str, node: Node) -> Vec<String> {
    let mut attrs = Vec::new();
    let mut cur = node.prev_sibling();
    while let Some(sib) = cur {
        if sib.kind() == "decorator" {
            attrs.push(node_text(source, sib).trim().to_string());
            cur = sib.prev_sibling();
        } else {
            break;
        }
    }
    attrs.reverse();
    attrs
}

fn push_symbol(
    result: &mut ExtractionResult,
    source: &str,
    decl: Node,
    name_node: Node,
    kind: SymbolKind,
    ctx: &WalkCtx,
) {
    let name = node_text(source, name_node).to_string();
    if name.is_empty() {
        return;
    }
    result.symbols.push(SymbolRec {
        name,
        kind,
        line: line_of(name_node),
        column: column_of(name_node),
        end_line: end_line_of(decl),
        signature: signature_of(source, decl),
        visibility: visibility(ctx),
        scope: ctx.scope.clone(),
        attributes: decorators_of(source, decl),
        metrics: metrics_of(decl),
    });
}

fn walk(node: Node, source: &str, ctx: &mut WalkCtx, result: &mut ExtractionResult) {
    let kind = node.kind();
    let mut pushed = 0usize;
    let was_exported = ctx.exported;

    if kind == "export_statement" {
        ctx.exported = true;
    }

    match kind {
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                push_symbol(result, source, node, name_node, SymbolKind::Function, ctx);
                ctx.scope.push(node_text(source, name_node).to_string());
                pushed += 1;
            }
        }
        "class_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                push_symbol(result, source, node, name_node, SymbolKind::Class, ctx);
                ctx.scope.push(node_text(source, name_node).to_string());
                pushed += 1;
            }
            // extends clause
            for i in 0..node.child_count() {
                if let Some(heritage) = node.child(i) {
                    if heritage.kind() == "class_heritage" {
                        if let Some(base) = last_ident_of(source, heritage) {
                            result.references.push(ReferenceRec {
                                name: base,
                                kind: RefKind::Inherit,
                                line: line_of(heritage),
                                column: column_of(heritage),
                                scope: ctx.scope.clone(),
                            });
                        }
                    }
                }
            }
        }
        "method_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                push_symbol(result, source, node, name_node, SymbolKind::Method, ctx);
                ctx.scope.push(node_text(source, name_node).to_string());
                pushed += 1;
            }
        }
        "public_field_definition" | "field_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                push_symbol(result, source, node, name_node, SymbolKind::Field, ctx);
            }
        }
        "interface_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                push_symbol(result, source, node, name_node, SymbolKind::Interface, ctx);
                ctx.scope.push(node_text(source, name_node).to_string());
                pushed += 1;
            }
        }
        "type_alias_declaration" | "enum_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                push_symbol(result, source, node, name_node, SymbolKind::Type, ctx);
            }
        }
        "variable_declarator" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                if name_node.kind() == "identifier" {
                    let value = node.child_by_field_name("value");
                    let is_fn = value.is_some_and(|v| {
                        matches!(v.kind(), "arrow_function" | "function_expression" | "function")
                    });
                    let declared_const = node
                        .parent()
                        .is_some_and(|p| node_text(source, p).starts_with("const"));
                    let sym_kind = if is_fn {
                        SymbolKind::Function
                    } else if declared_const {
                        SymbolKind::Constant
                    } else {
                        SymbolKind::Variable
                    };
                    push_symbol(result, source, node, name_node, sym_kind, ctx);
                    if is_fn {
                        ctx.scope.push(node_text(source, name_node).to_string());
                        pushed += 1;
                    }
                }
            }
        }
        "call_expression" | "new_expression" => {
            let callee = node
                .child_by_field_name("function")
                .or_else(|| node.child_by_field_name("constructor"));
            if let Some(fun) = callee {
                if let Some(name) = last_ident_of(source, fun) {
                    result.references.push(ReferenceRec {
                        name,
                        kind: RefKind::Call,
                        line: line_of(node),
                        column: column_of(node),
                        scope: ctx.scope.clone(),
                    });
                }
            }
        }
        "assignment_expression" => {
            if let Some(left) = node.child_by_field_name("left") {
                if left.kind() == "identifier" {
                    result.references.push(ReferenceRec {
                        name: node_text(source, left).to_string(),
                        kind: RefKind::Write,
                        line: line_of(left),
                        column: column_of(left),
                        scope: ctx.scope.clone(),
                    });
                }
            }
        }
        "import_statement" => {
            if let Some(src) = node.child_by_field_name("source") {
                let target = node_text(source, src)
                    .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                    .to_string();
                if !target.is_empty() {
                    result.imports.push(ImportRec {
                        target: target.clone(),
                        line: line_of(node),
                    });
                    result.references.push(ReferenceRec {
                        name: target,
                        kind: RefKind::Import,
                        line: line_of(node),
                        column: column_of(node),
                        scope: ctx.scope.clone(),
                    });
                }
            }
        }
        _ => {}
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            walk(child, source, ctx, result);
        }
    }

    for _ in 0..pushed {
        ctx.scope.pop();
    }
    ctx.exported = was_exported;
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS_SOURCE: &str = r#"
import { Router } from './router';

export interface RouteTable {
    lookup(path: string): Handler;
}

export const MAX_ROUTES = 128;

export class Dispatcher extends Router {
    private table: RouteTable;

    dispatch(path: string) {
        const handler = this.table.lookup(path);
        handler.run();
    }
}

const normalizePath = (path: string) => path.trim();
"#;

    fn extract_ts() -> ExtractionResult {
        JsExtractor::typescript().extract(FileId(0), TS_SOURCE)
    }

    #[test]
    fn typescript_symbols() {
        let result = extract_ts();
        let find = |name: &str| result.symbols.iter().find(|s| s.name == name);

        assert_eq!(find("RouteTable").unwrap().kind, SymbolKind::Interface);
        assert_eq!(find("MAX_ROUTES").unwrap().kind, SymbolKind::Constant);
        assert_eq!(find("Dispatcher").unwrap().kind, SymbolKind::Class);
        assert_eq!(find("dispatch").unwrap().kind, SymbolKind::Method);
        assert_eq!(find("normalizePath").unwrap().kind, SymbolKind::Function);
        assert_eq!(find("table").unwrap().kind, SymbolKind::Field);
    }

    #[test]
    fn export_drives_visibility() {
        let result = extract_ts();
        let dispatcher = result.symbols.iter().find(|s| s.name == "Dispatcher").unwrap();
        assert_eq!(dispatcher.visibility, Visibility::Public);
        let norm = result.symbols.iter().find(|s| s.name == "normalizePath").unwrap();
        assert_eq!(norm.visibility, Visibility::Private);
    }

    #[test]
    fn method_scope_includes_class() {
        let result = extract_ts();
        let dispatch = result.symbols.iter().find(|s| s.name == "dispatch").unwrap();
        assert_eq!(dispatch.scope, vec!["Dispatcher".to_string()]);
    }

    #[test]
    fn references_imports_and_inherit() {
        let result = extract_ts();
        assert!(
            result
                .references
                .iter()
                .any(|r| r.name == "lookup" && r.kind == RefKind::Call)
        );
        assert!(
            result
                .references
                .iter()
                .any(|r| r.name == "Router" && r.kind == RefKind::Inherit)
        );
        assert_eq!(result.imports.len(), 1);
        assert_eq!(result.imports[0].target, "./router");
    }

    #[test]
    fn javascript_arrow_and_class() {
        let source = r#"
const add = (a, b) => a + b;

class Queue {
    push(item) {
        this.items.push(item);
    }
}
"#;
        let result = JsExtractor::javascript().extract(FileId(0), source);
        let add = result.symbols.iter().find(|s| s.name == "add").unwrap();
        assert_eq!(add.kind, SymbolKind::Function);
        assert!(result.symbols.iter().any(|s| s.name == "Queue"));
        assert!(result.symbols.iter().any(|s| s.name == "push"));
    }
}
