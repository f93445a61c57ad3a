//! Deterministic emitter for the stub AST.
//!
//! Output follows stubgen conventions: four-space indents, `...` bodies kept
//! on the definition line, one statement per line. Two structurally equal
//! modules always unparse to identical text, which is what lets the pipeline
//! compare before/after text to decide whether a file needs rewriting.

use std::fmt;

use crate::syntax::ast::{ClassDef, Expr, FunctionDef, Module, Param, ParamKind, Stmt, Verbatim};

const INDENT: &str = "    ";

/// Renders a module back to stub-file text, ending with a single newline.
pub fn unparse(module: &Module) -> String {
    let mut out = String::new();
    for stmt in &module.body {
        emit_stmt(&mut out, stmt, 0);
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn emit_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    let indent = INDENT.repeat(depth);
    match stmt {
        Stmt::Class(class) => emit_class(out, class, depth),
        Stmt::Function(func) => emit_function(out, func, depth),
        Stmt::Assign { target, value } => {
            out.push_str(&format!("{indent}{target} = {value}\n"));
        }
        Stmt::AnnAssign {
            target,
            annotation,
            value: Some(value),
        } => {
            out.push_str(&format!("{indent}{target}: {annotation} = {value}\n"));
        }
        Stmt::AnnAssign {
            target,
            annotation,
            value: None,
        } => {
            out.push_str(&format!("{indent}{target}: {annotation}\n"));
        }
        Stmt::Expr(Expr::Str(value)) => {
            out.push_str(&format!("{indent}\"\"\"{value}\"\"\"\n"));
        }
        Stmt::Expr(expr) => {
            out.push_str(&format!("{indent}{expr}\n"));
        }
        Stmt::Pass => {
            out.push_str(&format!("{indent}pass\n"));
        }
        Stmt::Verbatim(verbatim) => emit_verbatim(out, verbatim, &indent),
    }
}

fn emit_class(out: &mut String, class: &ClassDef, depth: usize) {
    let indent = INDENT.repeat(depth);
    for decorator in &class.decorators {
        out.push_str(&format!("{indent}@{decorator}\n"));
    }

    let mut header = format!("{indent}class {}", class.name);
    if !class.type_params.is_empty() {
        header.push('[');
        header.push_str(&class.type_params.join(", "));
        header.push(']');
    }
    if !class.bases.is_empty() {
        header.push('(');
        header.push_str(&join_exprs(&class.bases));
        header.push(')');
    }

    if is_elided_body(&class.body) {
        out.push_str(&format!("{header}: ...\n"));
        return;
    }
    out.push_str(&format!("{header}:\n"));
    for stmt in &class.body {
        emit_stmt(out, stmt, depth + 1);
    }
}

fn emit_function(out: &mut String, func: &FunctionDef, depth: usize) {
    let indent = INDENT.repeat(depth);
    for decorator in &func.decorators {
        out.push_str(&format!("{indent}@{decorator}\n"));
    }

    let keyword = if func.is_async { "async def" } else { "def" };
    let params: Vec<String> = func.params.iter().map(render_param).collect();
    let mut header = format!("{indent}{keyword} {}({})", func.name, params.join(", "));
    if let Some(returns) = &func.returns {
        header.push_str(&format!(" -> {returns}"));
    }

    if is_elided_body(&func.body) {
        out.push_str(&format!("{header}: ...\n"));
        return;
    }
    out.push_str(&format!("{header}:\n"));
    for stmt in &func.body {
        emit_stmt(out, stmt, depth + 1);
    }
}

/// Bodies that collapse onto the definition line: empty, or a lone `...`.
fn is_elided_body(body: &[Stmt]) -> bool {
    match body {
        [] => true,
        [Stmt::Expr(Expr::Ellipsis)] => true,
        _ => false,
    }
}

fn render_param(param: &Param) -> String {
    let mut rendered = match param.kind {
        ParamKind::Plain => param.name.clone(),
        ParamKind::VarArg => format!("*{}", param.name),
        ParamKind::KwArg => format!("**{}", param.name),
        ParamKind::StarSep => return "*".to_string(),
        ParamKind::SlashSep => return "/".to_string(),
    };
    if let Some(annotation) = &param.annotation {
        rendered.push_str(&format!(": {annotation}"));
        if let Some(default) = &param.default {
            rendered.push_str(&format!(" = {default}"));
        }
    } else if let Some(default) = &param.default {
        rendered.push_str(&format!("={default}"));
    }
    rendered
}

/// Re-emits a verbatim slice, shifting every line from the column it was
/// captured at to the current indentation.
fn emit_verbatim(out: &mut String, verbatim: &Verbatim, indent: &str) {
    for (index, line) in verbatim.text.lines().enumerate() {
        if index == 0 {
            out.push_str(&format!("{indent}{line}\n"));
            continue;
        }
        if line.trim().is_empty() {
            out.push('\n');
            continue;
        }
        let leading = line.len() - line.trim_start_matches(' ').len();
        let stripped = &line[leading.min(verbatim.column)..];
        out.push_str(&format!("{indent}{stripped}\n"));
    }
}

fn join_exprs(exprs: &[Expr]) -> String {
    exprs
        .iter()
        .map(|expr| expr.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(id) => write!(f, "{id}"),
            Self::Attribute { value, attr } => write!(f, "{value}.{attr}"),
            Self::Subscript { value, slice } => write!(f, "{value}[{slice}]"),
            Self::Tuple(elements) => write!(f, "{}", join_exprs(elements)),
            Self::BinOr { left, right } => write!(f, "{left} | {right}"),
            Self::Str(value) => {
                write!(f, "'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
            }
            Self::NoneLit => write!(f, "None"),
            Self::Ellipsis => write!(f, "..."),
            Self::Verbatim(text) => write!(f, "{text}"),
        }
    }
}
