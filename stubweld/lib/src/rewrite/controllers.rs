//! Controller stub rewriting: replaces each controller's nested `Operations`
//! class with a synthesized fluent builder class and resolves generic
//! placeholder annotations to the concrete models bound per controller.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::StubweldError;
use crate::profile::Profile;
use crate::registry::{self, ManagerRegistry};
use crate::syntax::{self, ClassDef, Expr, Module, Stmt};

const DEFAULT_ADDITIONAL_IMPORTS: [&str; 2] = ["from __future__ import annotations", "import typing"];

/// Concrete request/response model names bound for one controller class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericBinding {
    pub request_model: String,
    pub response_model: String,
}

/// One-run rewriting context. Bindings recorded while visiting one file stay
/// visible for the rest of the batch, mirroring how intermediate generic
/// classes in one stub parameterize controllers in another.
pub struct ControllerRewriter<'a> {
    profile: &'a Profile,
    registry: &'a ManagerRegistry,
    exclude_classes: HashSet<String>,
    generics: BTreeMap<String, GenericBinding>,
}

impl<'a> ControllerRewriter<'a> {
    pub fn new(
        profile: &'a Profile,
        registry: &'a ManagerRegistry,
        exclude_classes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            profile,
            registry,
            exclude_classes: exclude_classes.into_iter().collect(),
            generics: BTreeMap::new(),
        }
    }

    /// Rewrites one stub file in place. Returns whether the file was written.
    ///
    /// A missing file or a file that fails to parse is skipped with a
    /// warning; neither ends the batch.
    pub fn rewrite_file(&mut self, path: &Path) -> Result<bool, StubweldError> {
        if !path.exists() {
            return Ok(false);
        }
        let content = std::fs::read_to_string(path).map_err(|source| StubweldError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut module = match syntax::parse_module(&content, &path.display().to_string()) {
            Ok(module) => module,
            Err(error) => {
                tracing::warn!("skipping {}: {error}", path.display());
                return Ok(false);
            }
        };

        if !self.rewrite_module(&mut module) {
            return Ok(false);
        }

        let mut rewritten = String::new();
        for import in DEFAULT_ADDITIONAL_IMPORTS {
            if !content.contains(import) {
                rewritten.push_str(import);
                rewritten.push('\n');
            }
        }
        rewritten.push_str(&syntax::unparse(&module));

        std::fs::write(path, rewritten).map_err(|source| StubweldError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("rewrote controller stub {}", path.display());
        Ok(true)
    }

    /// Applies the rewrite to an already-parsed module. Returns whether any
    /// class was modified.
    pub fn rewrite_module(&mut self, module: &mut Module) -> bool {
        let mut modified = false;
        for stmt in &mut module.body {
            if let Stmt::Class(class) = stmt {
                modified |= self.visit_class(class);
            }
        }
        modified
    }

    fn visit_class(&mut self, class: &mut ClassDef) -> bool {
        self.record_type_params(class);

        if self.exclude_classes.contains(&class.name) {
            return false;
        }

        if self.is_controller_subclass(class) {
            self.record_model_assignments(class);
        }

        let mut modified = false;
        for stmt in &mut class.body {
            if let Stmt::Class(nested) = stmt {
                modified |= self.visit_class(nested);
            }
        }

        modified |= self.split_operations(class);

        if let Some(binding) = self.generics.get(&class.name).cloned() {
            resolve_placeholders_in_body(&mut class.body, self.profile, &binding);
        }

        modified
    }

    /// PEP 695 parameter lists bind the first two parameters as the
    /// request/response models of that class.
    fn record_type_params(&mut self, class: &ClassDef) {
        if class.name == self.profile.controller_class || class.type_params.len() < 2 {
            return;
        }
        let ident = |raw: &str| raw.split(':').next().unwrap_or_default().trim().to_string();
        self.generics.insert(
            class.name.clone(),
            GenericBinding {
                request_model: ident(&class.type_params[0]),
                response_model: ident(&class.type_params[1]),
            },
        );
    }

    fn is_controller_subclass(&self, class: &ClassDef) -> bool {
        class.bases.iter().any(|base| {
            let base = unwrap_subscript(base);
            match base {
                Expr::Name(id) => id == &self.profile.controller_class,
                Expr::Attribute { attr, .. } => attr == &self.profile.controller_class,
                _ => false,
            }
        })
    }

    /// Class-level `request_model = ...` / `response_model = ...` assignments
    /// bind the controller's models; a missing side keeps an earlier binding
    /// of the same class, then falls back to `typing.Any`.
    fn record_model_assignments(&mut self, class: &ClassDef) {
        let mut request_model = None;
        let mut response_model = None;
        for stmt in &class.body {
            if let Stmt::Assign { target, value } = stmt {
                let Some(name) = value.dotted_name() else {
                    continue;
                };
                if name.is_empty() {
                    continue;
                }
                match target.as_str() {
                    "request_model" => request_model = Some(name),
                    "response_model" => response_model = Some(name),
                    _ => {}
                }
            }
        }

        let existing = self.generics.get(&class.name);
        let fallback = |side: fn(&GenericBinding) -> &String| {
            existing
                .map(|binding| side(binding).clone())
                .unwrap_or_else(|| "typing.Any".to_string())
        };
        let binding = GenericBinding {
            request_model: request_model.unwrap_or_else(|| fallback(|b| &b.request_model)),
            response_model: response_model.unwrap_or_else(|| fallback(|b| &b.response_model)),
        };
        self.generics.insert(class.name.clone(), binding);
    }

    /// Splits out a non-empty nested `Operations` class and replaces it with
    /// the synthesized builder class plus the `request` accessor. Returns
    /// whether the class body changed.
    fn split_operations(&mut self, class: &mut ClassDef) -> bool {
        let operations_index = class.body.iter().position(|stmt| {
            matches!(
                stmt,
                Stmt::Class(nested)
                    if nested.name == self.profile.operations_class
                        && nested.body.iter().any(|s| matches!(s, Stmt::Function(_)))
            )
        });
        let Some(index) = operations_index else {
            return false;
        };
        let Stmt::Class(operations) = class.body.remove(index) else {
            return false;
        };

        let builder_name = self.profile.builder_class_name().to_string();
        let forced_return = format!("{}.{builder_name}", class.name);
        let mut builder_body: Vec<Stmt> = operations
            .body
            .into_iter()
            .map(|stmt| self.strip_request_parameter(stmt, &forced_return))
            .collect();

        let base_binding = class.bases.iter().find_map(|base| {
            match unwrap_subscript(base) {
                Expr::Name(id) => self.generics.get(id),
                _ => None,
            }
        });
        let response_model = base_binding.map(|binding| binding.response_model.clone());

        self.append_passthrough_methods(&mut builder_body, &class.name, response_model.as_deref());

        class.body.push(Stmt::Class(ClassDef {
            name: builder_name,
            type_params: Vec::new(),
            bases: vec![Expr::attribute(
                Expr::name(&class.name),
                self.registry.manager_class(),
            )],
            decorators: Vec::new(),
            body: builder_body,
        }));
        class.body.push(Stmt::AnnAssign {
            target: "request".to_string(),
            annotation: Expr::dotted(&forced_return),
            value: None,
        });
        true
    }

    /// Drops the `request` parameter from an operation method, removes its
    /// `:param request:` docstring line and forces the fluent return type.
    /// Methods without a `request` parameter pass through unchanged.
    fn strip_request_parameter(&self, stmt: Stmt, forced_return: &str) -> Stmt {
        let Stmt::Function(mut func) = stmt else {
            return stmt;
        };
        if !func.params.iter().any(|param| param.name == "request") {
            return Stmt::Function(func);
        }

        func.params.retain(|param| param.name != "request");
        if let Some(doc) = func.docstring() {
            let kept: Vec<&str> = doc
                .split('\n')
                .filter(|line| !line.contains(":param request:"))
                .collect();
            func.body[0] = Stmt::Expr(Expr::Str(registry::indent_docstring(&kept.join("\n"), 12)));
        }
        func.returns = Some(Expr::dotted(forced_return));
        Stmt::Function(func)
    }

    /// Appends the registry manager's public methods to the builder body,
    /// skipping names an explicit operation already declared.
    fn append_passthrough_methods(
        &self,
        builder_body: &mut Vec<Stmt>,
        controller_class_name: &str,
        response_model: Option<&str>,
    ) {
        let method_names = match self.registry.method_names() {
            Ok(names) => names,
            Err(error) => {
                tracing::warn!(
                    "registry for {} is unusable: {error}",
                    self.registry.manager_class()
                );
                return;
            }
        };

        let declared: HashSet<String> = builder_body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Function(func) => Some(func.name.clone()),
                _ => None,
            })
            .collect();

        for name in method_names {
            if declared.contains(&name) {
                continue;
            }
            match self.registry.passthrough_method(
                self.profile,
                &name,
                controller_class_name,
                response_model,
            ) {
                Ok(method) => builder_body.push(Stmt::Function(method)),
                Err(error) => {
                    tracing::warn!("skipping synthesized method {name}: {error}");
                }
            }
        }
    }
}

fn unwrap_subscript(expr: &Expr) -> &Expr {
    match expr {
        Expr::Subscript { value, .. } => value,
        other => other,
    }
}

/// Substitutes bound model names for generic placeholder identifiers in every
/// non-dunder function signature of a class body, recursing through nested
/// classes. Substitution reaches direct names, direct union operands, and
/// subscript value/slice; tuple slices are left alone, matching the shapes
/// the hint exporter emits.
fn resolve_placeholders_in_body(body: &mut [Stmt], profile: &Profile, binding: &GenericBinding) {
    for stmt in body {
        match stmt {
            Stmt::Function(func) if !func.name.starts_with("__") => {
                for param in &mut func.params {
                    if let Some(annotation) = &mut param.annotation {
                        resolve_placeholder(annotation, profile, binding);
                    }
                }
                if let Some(returns) = &mut func.returns {
                    resolve_placeholder(returns, profile, binding);
                }
            }
            Stmt::Class(nested) => {
                resolve_placeholders_in_body(&mut nested.body, profile, binding);
            }
            _ => {}
        }
    }
}

fn resolve_placeholder(expr: &mut Expr, profile: &Profile, binding: &GenericBinding) {
    let bound = |name: &str| {
        profile.placeholder_kind(name).map(|kind| match kind {
            crate::profile::PlaceholderKind::Request => binding.request_model.clone(),
            crate::profile::PlaceholderKind::Response => binding.response_model.clone(),
        })
    };

    match expr {
        Expr::Name(id) => {
            if let Some(model) = bound(id) {
                *expr = Expr::dotted(&model);
            }
        }
        Expr::BinOr { left, right } => {
            for side in [left, right] {
                if let Expr::Name(id) = &**side {
                    if let Some(model) = bound(id) {
                        **side = Expr::dotted(&model);
                    }
                }
            }
        }
        Expr::Subscript { value, slice } => {
            resolve_placeholder(value, profile, binding);
            if !matches!(&**slice, Expr::Tuple(_)) {
                resolve_placeholder(slice, profile, binding);
            }
        }
        _ => {}
    }
}
