//! Python extractor using tree-sitter.

use super::{
    Capabilities, Extractor, classify_ranges, column_of, count_branches, end_line_of, last_ident_of,
    line_of, node_text, parse_with, signature_of,
};
use crate::types::{
    ExtractionResult, FileId, ImportRec, RefKind, ReferenceRec, SymbolKind, SymbolMetrics,
    SymbolRec, Visibility,
};
use tree_sitter::Node;

const COMMENT_KINDS: &[&str] = &["comment"];
const STRING_KINDS: &[&str] = &["string", "concatenated_string"];
const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "try_statement",
    "except_clause",
    "conditional_expression",
    "match_statement",
    "case_clause",
];

pub struct PythonExtractor;

impl PythonExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for PythonExtractor {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            symbols: true,
            references: true,
            scopes: true,
        }
    }

    fn extract(&self, _file_id: FileId, content: &str) -> ExtractionResult {
        let tree = match parse_with(&tree_sitter_python::LANGUAGE.into(), content) {
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
            class_depth: 0,
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
    class_depth: usize,
}

/// Underscore prefix means private by convention.
fn visibility_of(name: &str) -> Visibility {
    if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

fn is_const_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn metrics_of(node: Node) -> SymbolMetrics {
    SymbolMetrics {
        complexity: 1 + count_branches(node, BRANCH_KINDS),
        loc: end_line_of(node) - line_of(node) + 1,
        pure: None,
    }
}

/// Decorators hanging off an enclosing `decorated_definition`.
fn decorators_of(source: &str, node: Node) -> Vec<String> {
    let Some(parent) = node.parent() else {
        return Vec::new();
    };
    if parent.kind() != "decorated_definition" {
        return Vec::new();
    }
    let mut attrs = Vec::new();
    for i in 0..parent.child_count() {
        if let Some(c) = parent.child(i) {
            if c.kind() == "decorator" {
                attrs.push(node_text(source, c).trim().to_string());
            }
        }
    }
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
        visibility: visibility_of(&name),
        name,
        kind,
        line: line_of(name_node),
        column: column_of(name_node),
        end_line: end_line_of(decl),
        signature: signature_of(source, decl),
        scope: ctx.scope.clone(),
        attributes: decorators_of(source, decl),
        metrics: metrics_of(decl),
    });
}

fn push_parameters(result: &mut ExtractionResult, source: &str, decl: Node, ctx: &WalkCtx) {
    let Some(params) = decl.child_by_field_name("parameters") else {
        return;
    };
    for i in 0..params.child_count() {
        let Some(param) = params.child(i) else {
            continue;
        };
        let name_node = match param.kind() {
            "identifier" => Some(param),
            "typed_parameter" | "default_parameter" | "typed_default_parameter" => param
                .child(0)
                .filter(|c| c.kind() == "identifier")
                .or_else(|| param.child_by_field_name("name")),
            _ => None,
        };
        let Some(name_node) = name_node else { continue };
        let name = node_text(source, name_node).to_string();
        if name == "self" || name == "cls" {
            continue;
        }
        result.symbols.push(SymbolRec {
            name,
            kind: SymbolKind::Parameter,
            line: line_of(name_node),
            column: column_of(name_node),
            end_line: line_of(name_node),
            signature: node_text(source, param).to_string(),
            visibility: Visibility::Private,
            scope: ctx.scope.clone(),
            attributes: Vec::new(),
            metrics: SymbolMetrics::default(),
        });
    }
}

fn walk(node: Node, source: &str, ctx: &mut WalkCtx, result: &mut ExtractionResult) {
    let kind = node.kind();
    let mut pushed = 0usize;
    let mut entered_class = false;

    match kind {
        "function_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let sym_kind = if ctx.class_depth > 0 {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                push_symbol(result, source, node, name_node, sym_kind, ctx);
                ctx.scope.push(node_text(source, name_node).to_string());
                pushed += 1;
                push_parameters(result, source, node, ctx);
            }
        }
        "class_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                push_symbol(result, source, node, name_node, SymbolKind::Class, ctx);
                ctx.scope.push(node_text(source, name_node).to_string());
                pushed += 1;
                entered_class = true;
                ctx.class_depth += 1;

                if let Some(supers) = node.child_by_field_name("superclasses") {
                    for i in 0..supers.child_count() {
                        if let Some(base) = supers.child(i) {
                            if matches!(base.kind(), "identifier" | "attribute") {
                                if let Some(name) = last_ident_of(source, base) {
                                    result.references.push(ReferenceRec {
                                        name,
                                        kind: RefKind::Inherit,
                                        line: line_of(base),
                                        column: column_of(base),
                                        scope: ctx.scope.clone(),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
        "assignment" => {
            if let Some(left) = node.child_by_field_name("left") {
                if left.kind() == "identifier" {
                    let name = node_text(source, left).to_string();
                    // Module-level and class-body assignments define symbols;
                    // assignments inside functions are writes.
                    let in_function = ctx
                        .scope
                        .len()
                        .checked_sub(ctx.class_depth)
                        .unwrap_or(0)
                        > 0;
                    if in_function {
                        result.references.push(ReferenceRec {
                            name,
                            kind: RefKind::Write,
                            line: line_of(left),
                            column: column_of(left),
                            scope: ctx.scope.clone(),
                        });
                    } else {
                        let sym_kind = if ctx.class_depth > 0 {
                            SymbolKind::Field
                        } else if is_const_name(&name) {
                            SymbolKind::Constant
                        } else {
                            SymbolKind::Variable
                        };
                        push_symbol(result, source, node, left, sym_kind, ctx);
                    }
                }
            }
        }
        "call" => {
            if let Some(fun) = node.child_by_field_name("function") {
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
        "import_statement" => {
            for i in 0..node.child_count() {
                if let Some(c) = node.child(i) {
                    let target = match c.kind() {
                        "dotted_name" => Some(node_text(source, c).to_string()),
                        "aliased_import" => c
                            .child(0)
                            .map(|n| node_text(source, n).to_string()),
                        _ => None,
                    };
                    if let Some(target) = target {
                        push_import(result, target, node, ctx);
                    }
                }
            }
        }
        "import_from_statement" => {
            if let Some(module) = node.child_by_field_name("module_name") {
                push_import(result, node_text(source, module).to_string(), node, ctx);
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
    if entered_class {
        ctx.class_depth -= 1;
    }
}

fn push_import(result: &mut ExtractionResult, target: String, node: Node, ctx: &WalkCtx) {
    if target.is_empty() {
        return;
    }
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
