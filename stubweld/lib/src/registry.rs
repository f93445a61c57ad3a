//! Schema registry describing the runtime request-manager class.
//!
//! The stub rewriter has no runtime to introspect, so the manager class the
//! SDK installs on every controller is described as data: its name, the
//! controller class it nests in, and its own public surface in stub form.
//! The built-in default mirrors the NEXOS SDK manager; `from_stub_file` loads
//! a replacement for a differently-shaped SDK.

use std::path::Path;

use crate::error::StubweldError;
use crate::profile::{PlaceholderKind, Profile};
use crate::syntax::{self, ClassDef, Expr, FunctionDef, Param, Stmt};

/// Stub-form source of the NEXOS `_RequestManager`, as nested in its
/// controller base class. Parameter annotations keep their
/// `Annotated[..., "model:..."]` markers so the binding rewriter can resolve
/// them after synthesis.
const DEFAULT_MANAGER_SOURCE: &str = r#"import typing

class NexosAIAPIEndpointController:
    class _RequestManager:
        @staticmethod
        def get_verb_from_endpoint(endpoint: str) -> str:
            """
            Extract the HTTP verb from the endpoint string.

            :param endpoint: The endpoint string in the format "verb: /path".
            :return: The HTTP verb (e.g., "GET", "POST").
            """
        @staticmethod
        def get_path_from_endpoint(endpoint: str) -> str:
            """
            Extract the path from the endpoint string.

            :param endpoint: The endpoint string in the format "verb: /path".
            :return: The path (e.g., "/path").
            """
        def prepare(self, data: typing.Annotated[dict[str, typing.Any], 'model:EndpointRequestType']) -> NexosAIAPIEndpointController._RequestManager:
            """
            Prepare the request data by initializing the pending request.

            :param data: The data to be included in the request.
            :return: The current instance of the RequestManager for method chaining.
            """
        def dump(self) -> typing.Annotated[dict[str, typing.Any], 'model:EndpointRequestType']:
            """
            Show the current pending request data.

            :return: The pending request data or None if not set.
            """
        async def send(self) -> typing.Annotated[dict[str, typing.Any], 'model:EndpointResponseType']:
            """
            Call the endpoint with the provided request data.

            :return: The response data from the endpoint.
            """
        def reload_last(self) -> NexosAIAPIEndpointController._RequestManager:
            """
            Reload the last request to reuse it for the next operation.

            :return: The current instance of the RequestManager for method chaining.
            """
"#;

/// A described request-manager class: where it lives and what it looks like.
#[derive(Debug, Clone)]
pub struct ManagerRegistry {
    controller_class: String,
    manager_class: String,
    source: String,
}

impl Default for ManagerRegistry {
    fn default() -> Self {
        Self {
            controller_class: "NexosAIAPIEndpointController".to_string(),
            manager_class: "_RequestManager".to_string(),
            source: DEFAULT_MANAGER_SOURCE.to_string(),
        }
    }
}

impl ManagerRegistry {
    pub fn new(
        controller_class: impl Into<String>,
        manager_class: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            controller_class: controller_class.into(),
            manager_class: manager_class.into(),
            source: source.into(),
        }
    }

    /// Loads a registry description from a stub file on disk.
    pub fn from_stub_file(
        path: &Path,
        controller_class: impl Into<String>,
        manager_class: impl Into<String>,
    ) -> Result<Self, StubweldError> {
        let source = std::fs::read_to_string(path).map_err(|source| StubweldError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(controller_class, manager_class, source))
    }

    pub fn controller_class(&self) -> &str {
        &self.controller_class
    }

    pub fn manager_class(&self) -> &str {
        &self.manager_class
    }

    /// Names of the manager's public methods, in declaration order.
    pub fn method_names(&self) -> Result<Vec<String>, StubweldError> {
        let body = self.manager_body()?;
        Ok(body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Function(func) if !func.name.starts_with("__") => Some(func.name.clone()),
                _ => None,
            })
            .collect())
    }

    /// Locates the named method's definition in the registry source.
    ///
    /// ## Errors
    ///
    /// `ParseFailed`, `ClassNotFound` or `MethodNotFound` — all of which the
    /// synthesis caller downgrades to a logged warning and a skipped method.
    pub fn method_node(&self, name: &str) -> Result<FunctionDef, StubweldError> {
        let body = self.manager_body()?;
        body.into_iter()
            .find_map(|stmt| match stmt {
                Stmt::Function(func) if func.name == name => Some(func),
                _ => None,
            })
            .ok_or_else(|| StubweldError::MethodNotFound {
                class: self.manager_class.clone(),
                method: name.to_string(),
            })
    }

    /// Synthesizes the passthrough declaration of a manager method for one
    /// controller's builder class.
    ///
    /// Parameter annotations and `Annotated[..., "model:..."]` return
    /// annotations are kept exactly as written in the registry source, so the
    /// markers survive into the emitted stub for the binding rewriter to
    /// resolve. Other return annotations are reduced one step (first union
    /// operand, first type argument of a subscript) before the placeholder
    /// and self-reference substitutions; this reduction is intentionally
    /// lossy.
    pub fn passthrough_method(
        &self,
        profile: &Profile,
        name: &str,
        controller_class_name: &str,
        response_model: Option<&str>,
    ) -> Result<FunctionDef, StubweldError> {
        let method = self.method_node(name)?;

        let is_static = method
            .decorators
            .iter()
            .any(|dec| dec.dotted_name().as_deref() == Some("staticmethod"));
        let mut params: Vec<Param> = if is_static {
            Vec::new()
        } else {
            vec![Param::plain("self")]
        };
        params.extend(
            method
                .params
                .iter()
                .filter(|param| param.name != "self")
                .cloned(),
        );

        let mut decorators = method.decorators.clone();
        let has_override = decorators
            .iter()
            .any(|dec| dec.dotted_name().as_deref() == Some("typing.override"));
        if !has_override {
            decorators.push(Expr::dotted("typing.override"));
        }

        let reduced = match &method.returns {
            None => Expr::dotted("typing.Any"),
            Some(Expr::BinOr { left, .. }) => (**left).clone(),
            // Annotated returns keep their model markers for the binding
            // rewriter, like parameter annotations do.
            Some(ret @ Expr::Subscript { value, .. })
                if value.trailing_name() == Some("Annotated") =>
            {
                ret.clone()
            }
            Some(Expr::Subscript { slice, .. }) => match &**slice {
                Expr::Tuple(elements) => elements
                    .first()
                    .cloned()
                    .unwrap_or_else(|| Expr::dotted("typing.Any")),
                other => other.clone(),
            },
            Some(other) => other.clone(),
        };

        let returns = match reduced.trailing_name() {
            Some(tail) if profile.placeholder_kind(tail) == Some(PlaceholderKind::Response) => {
                match response_model {
                    Some(model) => Expr::dotted(model),
                    None => Expr::dotted("typing.Any"),
                }
            }
            Some(tail) if tail == self.manager_class => Expr::dotted(&format!(
                "{controller_class_name}.{}",
                self.manager_class.trim_start_matches('_')
            )),
            _ => reduced,
        };

        let body = match method.docstring() {
            Some(doc) => vec![Stmt::Expr(Expr::Str(indent_docstring(doc, 12)))],
            None => vec![Stmt::Expr(Expr::Ellipsis)],
        };

        Ok(FunctionDef {
            name: method.name,
            is_async: method.is_async,
            decorators,
            params,
            returns: Some(returns),
            body,
        })
    }

    fn manager_body(&self) -> Result<Vec<Stmt>, StubweldError> {
        let module = syntax::parse_module(&self.source, &self.manager_class)?;
        find_class(&module.body, &self.manager_class)
            .map(|class| class.body.clone())
            .ok_or_else(|| StubweldError::ClassNotFound {
                class: self.manager_class.clone(),
            })
    }
}

fn find_class<'a>(body: &'a [Stmt], name: &str) -> Option<&'a ClassDef> {
    for stmt in body {
        if let Stmt::Class(class) = stmt {
            if class.name == name {
                return Some(class);
            }
            if let Some(found) = find_class(&class.body, name) {
                return Some(found);
            }
        }
    }
    None
}

/// Re-indents a docstring so continuation lines sit `indent` spaces deep,
/// keeping their relative indentation. The first line is left alone, matching
/// how the opening quotes carry the statement's own indentation.
pub(crate) fn indent_docstring(docstring: &str, indent: usize) -> String {
    let lines: Vec<&str> = docstring.split('\n').collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };
    let common = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);

    let pad = " ".repeat(indent);
    let mut out = (*first).to_string();
    for line in rest {
        out.push('\n');
        if line.trim().is_empty() {
            continue;
        }
        out.push_str(&pad);
        out.push_str(&line[common..]);
    }
    // Closing quotes sit right after the last text, like a cleaned docstring.
    out.trim_end().to_string()
}
