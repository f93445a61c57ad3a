//! Lowering of tree-sitter Python parses into the mutable stub AST.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::error::StubweldError;
use crate::syntax::ast::{ClassDef, Expr, FunctionDef, Module, Param, ParamKind, Stmt, Verbatim};

/// Parses stub-file text into a [`Module`].
///
/// `origin` is a display label (usually the file path) used in the error when
/// the text is not valid syntax. The tree-sitter parse itself never fails on
/// text input; a root containing error or missing nodes is what we treat as a
/// parse failure.
pub fn parse_module(source: &str, origin: &str) -> Result<Module, StubweldError> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_python::LANGUAGE.into())?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| StubweldError::ParseFailed {
            origin: origin.to_string(),
        })?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(StubweldError::ParseFailed {
            origin: origin.to_string(),
        });
    }

    Ok(Module {
        body: lower_block(root, source),
    })
}

/// Reads and parses a stub file.
pub fn parse_file(path: &Path) -> Result<Module, StubweldError> {
    let source = std::fs::read_to_string(path).map_err(|source| StubweldError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_module(&source, &path.display().to_string())
}

fn text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

fn verbatim_stmt(node: Node<'_>, source: &str) -> Stmt {
    Stmt::Verbatim(Verbatim {
        text: text(node, source).to_string(),
        column: node.start_position().column,
    })
}

/// Finds the first child node with the given kind.
fn find_child_by_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|child| child.kind() == kind)
}

fn lower_block(node: Node<'_>, source: &str) -> Vec<Stmt> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .map(|child| lower_stmt(child, source))
        .collect()
}

fn lower_stmt(node: Node<'_>, source: &str) -> Stmt {
    match node.kind() {
        "class_definition" => Stmt::Class(lower_class(node, source, Vec::new())),
        "function_definition" => Stmt::Function(lower_function(node, source, Vec::new())),
        "decorated_definition" => lower_decorated(node, source),
        "expression_statement" => lower_expression_statement(node, source),
        "pass_statement" => Stmt::Pass,
        _ => verbatim_stmt(node, source),
    }
}

fn lower_decorated(node: Node<'_>, source: &str) -> Stmt {
    let mut decorators = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "decorator" {
            let mut inner = child.walk();
            if let Some(expr) = child.named_children(&mut inner).next() {
                decorators.push(lower_expr(expr, source));
            }
        }
    }

    match node.child_by_field_name("definition") {
        Some(def) if def.kind() == "class_definition" => {
            Stmt::Class(lower_class(def, source, decorators))
        }
        Some(def) if def.kind() == "function_definition" => {
            Stmt::Function(lower_function(def, source, decorators))
        }
        _ => verbatim_stmt(node, source),
    }
}

fn lower_expression_statement(node: Node<'_>, source: &str) -> Stmt {
    let mut cursor = node.walk();
    let Some(inner) = node.named_children(&mut cursor).next() else {
        return verbatim_stmt(node, source);
    };

    match inner.kind() {
        "string" => Stmt::Expr(Expr::Str(string_value(inner, source))),
        "ellipsis" => Stmt::Expr(Expr::Ellipsis),
        "assignment" => lower_assignment(node, inner, source),
        _ => verbatim_stmt(node, source),
    }
}

fn lower_assignment(stmt_node: Node<'_>, node: Node<'_>, source: &str) -> Stmt {
    let Some(left) = node.child_by_field_name("left") else {
        return verbatim_stmt(stmt_node, source);
    };
    if left.kind() != "identifier" {
        return verbatim_stmt(stmt_node, source);
    }
    let target = text(left, source).to_string();

    let annotation = node
        .child_by_field_name("type")
        .map(|ty| lower_expr(ty, source));
    let value = node
        .child_by_field_name("right")
        .map(|right| lower_expr(right, source));

    match (annotation, value) {
        (Some(annotation), value) => Stmt::AnnAssign {
            target,
            annotation,
            value,
        },
        (None, Some(value)) => Stmt::Assign { target, value },
        (None, None) => verbatim_stmt(stmt_node, source),
    }
}

fn lower_class(node: Node<'_>, source: &str, decorators: Vec<Expr>) -> ClassDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| text(n, source).to_string())
        .unwrap_or_default();

    let mut type_params = Vec::new();
    if let Some(params) = node.child_by_field_name("type_parameters") {
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            if child.kind() != "comment" {
                type_params.push(text(child, source).to_string());
            }
        }
    }

    let mut bases = Vec::new();
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for child in superclasses.named_children(&mut cursor) {
            match child.kind() {
                "comment" => {}
                "keyword_argument" => bases.push(Expr::Verbatim(text(child, source).to_string())),
                _ => bases.push(lower_expr(child, source)),
            }
        }
    }

    let body = node
        .child_by_field_name("body")
        .map(|body| lower_block(body, source))
        .unwrap_or_default();

    ClassDef {
        name,
        type_params,
        bases,
        decorators,
        body,
    }
}

fn lower_function(node: Node<'_>, source: &str, decorators: Vec<Expr>) -> FunctionDef {
    let is_async = node
        .child(0)
        .map(|first| first.kind() == "async")
        .unwrap_or(false);

    let name = node
        .child_by_field_name("name")
        .map(|n| text(n, source).to_string())
        .unwrap_or_default();

    let params = node
        .child_by_field_name("parameters")
        .map(|p| lower_params(p, source))
        .unwrap_or_default();

    let returns = node
        .child_by_field_name("return_type")
        .map(|ty| lower_expr(ty, source));

    let body = node
        .child_by_field_name("body")
        .map(|body| lower_block(body, source))
        .unwrap_or_default();

    FunctionDef {
        name,
        is_async,
        decorators,
        params,
        returns,
        body,
    }
}

fn lower_params(node: Node<'_>, source: &str) -> Vec<Param> {
    let mut params = Vec::new();
    let mut cursor = node.walk();

    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "comment" => {}
            "identifier" => params.push(Param::plain(text(child, source))),
            "typed_parameter" => {
                let annotation = child
                    .child_by_field_name("type")
                    .map(|ty| lower_expr(ty, source));
                let (kind, name_node) =
                    if let Some(splat) = find_child_by_kind(child, "list_splat_pattern") {
                        (ParamKind::VarArg, find_child_by_kind(splat, "identifier"))
                    } else if let Some(splat) = find_child_by_kind(child, "dictionary_splat_pattern")
                    {
                        (ParamKind::KwArg, find_child_by_kind(splat, "identifier"))
                    } else {
                        (ParamKind::Plain, find_child_by_kind(child, "identifier"))
                    };
                params.push(Param {
                    name: name_node.map(|n| text(n, source).to_string()).unwrap_or_default(),
                    kind,
                    annotation,
                    default: None,
                });
            }
            "default_parameter" => params.push(Param {
                name: child
                    .child_by_field_name("name")
                    .map(|n| text(n, source).to_string())
                    .unwrap_or_default(),
                kind: ParamKind::Plain,
                annotation: None,
                default: child
                    .child_by_field_name("value")
                    .map(|v| lower_expr(v, source)),
            }),
            "typed_default_parameter" => params.push(Param {
                name: child
                    .child_by_field_name("name")
                    .map(|n| text(n, source).to_string())
                    .unwrap_or_default(),
                kind: ParamKind::Plain,
                annotation: child
                    .child_by_field_name("type")
                    .map(|ty| lower_expr(ty, source)),
                default: child
                    .child_by_field_name("value")
                    .map(|v| lower_expr(v, source)),
            }),
            "list_splat_pattern" => params.push(Param {
                name: find_child_by_kind(child, "identifier")
                    .map(|n| text(n, source).to_string())
                    .unwrap_or_default(),
                kind: ParamKind::VarArg,
                annotation: None,
                default: None,
            }),
            "dictionary_splat_pattern" => params.push(Param {
                name: find_child_by_kind(child, "identifier")
                    .map(|n| text(n, source).to_string())
                    .unwrap_or_default(),
                kind: ParamKind::KwArg,
                annotation: None,
                default: None,
            }),
            "keyword_separator" => params.push(Param {
                name: String::new(),
                kind: ParamKind::StarSep,
                annotation: None,
                default: None,
            }),
            "positional_separator" => params.push(Param {
                name: String::new(),
                kind: ParamKind::SlashSep,
                annotation: None,
                default: None,
            }),
            _ => params.push(Param {
                name: text(child, source).to_string(),
                kind: ParamKind::Plain,
                annotation: None,
                default: None,
            }),
        }
    }

    params
}

/// Lowers an expression or type-annotation node.
///
/// tree-sitter-python parses annotation positions through dedicated `type`
/// rules (`union_type`, `generic_type`, `member_type`), while the same
/// constructs in expression positions come out as `binary_operator`,
/// `subscript` and `attribute`. Both spellings lower to the same AST.
fn lower_expr(node: Node<'_>, source: &str) -> Expr {
    match node.kind() {
        "type" => node
            .named_child(0)
            .map(|inner| lower_expr(inner, source))
            .unwrap_or_else(|| Expr::Verbatim(text(node, source).to_string())),
        "identifier" => Expr::Name(text(node, source).to_string()),
        "none" => Expr::NoneLit,
        "ellipsis" => Expr::Ellipsis,
        "string" => Expr::Str(string_value(node, source)),
        "parenthesized_expression" => node
            .named_child(0)
            .map(|inner| lower_expr(inner, source))
            .unwrap_or_else(|| Expr::Verbatim(text(node, source).to_string())),
        "attribute" => {
            let value = node
                .child_by_field_name("object")
                .map(|obj| lower_expr(obj, source))
                .unwrap_or(Expr::Verbatim(String::new()));
            let attr = node
                .child_by_field_name("attribute")
                .map(|a| text(a, source).to_string())
                .unwrap_or_default();
            Expr::attribute(value, attr)
        }
        "member_type" => {
            let mut cursor = node.walk();
            let mut children: Vec<Node<'_>> = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() != "comment")
                .collect();
            let attr = children
                .pop()
                .map(|a| text(a, source).to_string())
                .unwrap_or_default();
            let value = children
                .pop()
                .map(|v| lower_expr(v, source))
                .unwrap_or(Expr::Verbatim(String::new()));
            Expr::attribute(value, attr)
        }
        "subscript" => {
            let value = node
                .child_by_field_name("value")
                .map(|v| lower_expr(v, source))
                .unwrap_or(Expr::Verbatim(String::new()));
            let mut cursor = node.walk();
            let slices: Vec<Expr> = node
                .children_by_field_name("subscript", &mut cursor)
                .map(|s| lower_expr(s, source))
                .collect();
            let slice = match slices.len() {
                0 => return Expr::Verbatim(text(node, source).to_string()),
                1 => slices.into_iter().next().unwrap_or(Expr::Ellipsis),
                _ => Expr::Tuple(slices),
            };
            Expr::Subscript {
                value: Box::new(value),
                slice: Box::new(slice),
            }
        }
        "generic_type" => {
            let mut cursor = node.walk();
            let mut children = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() != "comment");
            let value = children
                .next()
                .map(|v| lower_expr(v, source))
                .unwrap_or(Expr::Verbatim(String::new()));
            let slice = match children.next() {
                Some(args) => {
                    let mut inner = args.walk();
                    let elements: Vec<Expr> = args
                        .named_children(&mut inner)
                        .filter(|c| c.kind() != "comment")
                        .map(|c| lower_expr(c, source))
                        .collect();
                    match elements.len() {
                        0 => Expr::Verbatim(text(args, source).to_string()),
                        1 => elements.into_iter().next().unwrap_or(Expr::Ellipsis),
                        _ => Expr::Tuple(elements),
                    }
                }
                None => return Expr::Verbatim(text(node, source).to_string()),
            };
            Expr::Subscript {
                value: Box::new(value),
                slice: Box::new(slice),
            }
        }
        "binary_operator" => {
            let operator = node
                .child_by_field_name("operator")
                .map(|op| text(op, source))
                .unwrap_or_default();
            if operator != "|" {
                return Expr::Verbatim(text(node, source).to_string());
            }
            let left = node
                .child_by_field_name("left")
                .map(|l| lower_expr(l, source))
                .unwrap_or(Expr::Verbatim(String::new()));
            let right = node
                .child_by_field_name("right")
                .map(|r| lower_expr(r, source))
                .unwrap_or(Expr::Verbatim(String::new()));
            Expr::BinOr {
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        "union_type" => {
            let mut cursor = node.walk();
            let mut children = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() != "comment");
            let left = children
                .next()
                .map(|l| lower_expr(l, source))
                .unwrap_or(Expr::Verbatim(String::new()));
            let right = children
                .next()
                .map(|r| lower_expr(r, source))
                .unwrap_or(Expr::Verbatim(String::new()));
            Expr::BinOr {
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        "tuple" => {
            let mut cursor = node.walk();
            Expr::Tuple(
                node.named_children(&mut cursor)
                    .filter(|c| c.kind() != "comment")
                    .map(|c| lower_expr(c, source))
                    .collect(),
            )
        }
        _ => Expr::Verbatim(text(node, source).to_string()),
    }
}

/// Extracts a string node's inner text, without its quote delimiters and
/// without unescaping. Escapes never matter for the markers and docstrings
/// the rewrites look at.
fn string_value(node: Node<'_>, source: &str) -> String {
    let full = text(node, source);
    let prefix = find_child_by_kind(node, "string_start")
        .map(|n| text(n, source).len())
        .unwrap_or(0);
    let suffix = find_child_by_kind(node, "string_end")
        .map(|n| text(n, source).len())
        .unwrap_or(0);
    if prefix + suffix <= full.len() {
        full[prefix..full.len() - suffix].to_string()
    } else {
        full.to_string()
    }
}
