//! Go extractor using tree-sitter.

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
const STRING_KINDS: &[&str] = &["interpreted_string_literal", "raw_string_literal"];
const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "expression_switch_statement",
    "type_switch_statement",
    "select_statement",
    "expression_case",
    "communication_case",
    "type_case",
];

pub struct GoExtractor;

impl GoExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GoExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for GoExtractor {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            symbols: true,
            references: true,
            scopes: true,
        }
    }

    fn extract(&self, _file_id: FileId, content: &str) -> ExtractionResult {
        let tree = match parse_with(&tree_sitter_go::LANGUAGE.into(), content) {
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
        let mut scope = Vec::new();
        if let Some(pkg) = package_name(root, content) {
            scope.push(pkg);
        }
        walk(root, content, &mut scope, &mut result);

        if root.has_error() {
            result.error = Some("syntax errors in file, extraction is partial".to_string());
        }
        result
    }
}

/// Visibility by Go capitalization rule.
fn visibility_of(name: &str) -> Visibility {
    if name.chars().next().is_some_and(|c| c.is_uppercase()) {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn package_name(root: Node, source: &str) -> Option<String> {
    for i in 0..root.child_count() {
        let child = root.child(i)?;
        if child.kind() == "package_clause" {
            for j in 0..child.child_count() {
                let c = child.child(j)?;
                if c.kind() == "package_identifier" {
                    return Some(node_text(source, c).to_string());
                }
            }
        }
    }
    None
}

fn metrics_of(node: Node) -> SymbolMetrics {
    SymbolMetrics {
        complexity: 1 + count_branches(node, BRANCH_KINDS),
        loc: end_line_of(node) - line_of(node) + 1,
        pure: None,
    }
}

fn push_symbol(
    result: &mut ExtractionResult,
    source: &str,
    decl: Node,
    name_node: Node,
    kind: SymbolKind,
    scope: &[String],
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
        scope: scope.to_vec(),
        attributes: Vec::new(),
        metrics: metrics_of(decl),
    });
}

/// Named parameters of a function/method as parameter symbols.
fn push_parameters(result: &mut ExtractionResult, source: &str, decl: Node, scope: &[String]) {
    let Some(params) = decl.child_by_field_name("parameters") else {
        return;
    };
    for i in 0..params.child_count() {
        let Some(param) = params.child(i) else {
            continue;
        };
        if param.kind() != "parameter_declaration" {
            continue;
        }
        for j in 0..param.child_count() {
            let Some(c) = param.child(j) else { continue };
            if c.kind() == "identifier" {
                result.symbols.push(SymbolRec {
                    name: node_text(source, c).to_string(),
                    kind: SymbolKind::Parameter,
                    line: line_of(c),
                    column: column_of(c),
                    end_line: line_of(c),
                    signature: node_text(source, param)
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" "),
                    visibility: Visibility::Private,
                    scope: scope.to_vec(),
                    attributes: Vec::new(),
                    metrics: SymbolMetrics::default(),
                });
            }
        }
    }
}

/// Receiver type name of a method, e.g. `Mux` from `(mux *Mux)`.
fn receiver_type(source: &str, decl: Node) -> Option<String> {
    let receiver = decl.child_by_field_name("receiver")?;
    last_ident_of(source, receiver)
}

fn walk(node: Node, source: &str, scope: &mut Vec<String>, result: &mut ExtractionResult) {
    let kind = node.kind();
    let mut pushed = 0usize;

    match kind {
        "function_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                push_symbol(result, source, node, name_node, SymbolKind::Function, scope);
                scope.push(node_text(source, name_node).to_string());
                pushed += 1;
                push_parameters(result, source, node, scope);
            }
        }
        "method_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                if let Some(recv) = receiver_type(source, node) {
                    scope.push(recv);
                    pushed += 1;
                }
                push_symbol(result, source, node, name_node, SymbolKind::Method, scope);
                scope.push(node_text(source, name_node).to_string());
                pushed += 1;
                push_parameters(result, source, node, scope);
            }
        }
        "type_spec" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let ty = node.child_by_field_name("type");
                let sym_kind = match ty.map(|t| t.kind()) {
                    Some("interface_type") => SymbolKind::Interface,
                    _ => SymbolKind::Type,
                };
                push_symbol(result, source, node, name_node, sym_kind, scope);
                scope.push(node_text(source, name_node).to_string());
                pushed += 1;

                if let Some(ty) = ty {
                    if ty.kind() == "struct_type" {
                        collect_struct_fields(ty, source, scope, result);
                    }
                }
            }
        }
        "const_spec" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                push_symbol(result, source, node, name_node, SymbolKind::Constant, scope);
            }
        }
        "var_spec" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                push_symbol(result, source, node, name_node, SymbolKind::Variable, scope);
            }
        }
        "call_expression" => {
            if let Some(fun) = node.child_by_field_name("function") {
                if let Some(callee) = last_ident_of(source, fun) {
                    result.references.push(ReferenceRec {
                        name: callee,
                        kind: RefKind::Call,
                        line: line_of(node),
                        column: column_of(node),
                        scope: scope.clone(),
                    });
                }
            }
        }
        "assignment_statement" => {
            if let Some(left) = node.child_by_field_name("left") {
                for i in 0..left.child_count() {
                    if let Some(target) = left.child(i) {
                        if target.kind() == "identifier" {
                            result.references.push(ReferenceRec {
                                name: node_text(source, target).to_string(),
                                kind: RefKind::Write,
                                line: line_of(target),
                                column: column_of(target),
                                scope: scope.clone(),
                            });
                        }
                    }
                }
            }
        }
        "import_spec" => {
            if let Some(path) = node.child_by_field_name("path") {
                let target = node_text(source, path).trim_matches('"').to_string();
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
                        scope: scope.clone(),
                    });
                }
            }
        }
        _ => {}
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            walk(child, source, scope, result);
        }
    }

    for _ in 0..pushed {
        scope.pop();
    }
}

/// Struct fields become field symbols; embedded types become inherit
/// references.
fn collect_struct_fields(
    struct_node: Node,
    source: &str,
    scope: &[String],
    result: &mut ExtractionResult,
) {
    for i in 0..struct_node.child_count() {
        let Some(list) = struct_node.child(i) else {
            continue;
        };
        if list.kind() != "field_declaration_list" {
            continue;
        }
        for j in 0..list.child_count() {
            let Some(field) = list.child(j) else { continue };
            if field.kind() != "field_declaration" {
                continue;
            }
            let mut named = false;
            for k in 0..field.child_count() {
                let Some(c) = field.child(k) else { continue };
                if c.kind() == "field_identifier" {
                    named = true;
                    let name = node_text(source, c).to_string();
                    result.symbols.push(SymbolRec {
                        visibility: visibility_of(&name),
                        name,
                        kind: SymbolKind::Field,
                        line: line_of(c),
                        column: column_of(c),
                        end_line: line_of(c),
                        signature: node_text(source, field)
                            .split_whitespace()
                            .collect::<Vec<_>>()
                            .join(" "),
                        scope: scope.to_vec(),
                        attributes: Vec::new(),
                        metrics: SymbolMetrics::default(),
                    });
                }
            }
            // Embedded type: a field with no name of its own
            if !named {
                if let Some(embedded) = last_ident_of(source, field) {
                    result.references.push(ReferenceRec {
                        name: embedded,
                        kind: RefKind::Inherit,
                        line: line_of(field),
                        column: column_of(field),
                        scope: scope.to_vec(),
                    });
                }
            }
        }
    }
}
