//! Marker-annotation binding: replaces `Annotated[..., "model:<Name>"]`
//! parameter and return annotations with the matching TypedDict record name
//! and injects the imports those records need.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::StubweldError;
use crate::profile::Profile;
use crate::syntax::{self, Expr, Stmt};

/// Model attributes of one enclosing class, as seen while walking inward.
#[derive(Debug, Default, Clone)]
struct ClassModels {
    request_model: Option<String>,
    response_model: Option<String>,
}

pub struct BindingRewriter<'a> {
    profile: &'a Profile,
    /// model name -> (record name, dotted import module; empty = no import).
    models_map: &'a BTreeMap<String, (String, String)>,
}

impl<'a> BindingRewriter<'a> {
    pub fn new(profile: &'a Profile, models_map: &'a BTreeMap<String, (String, String)>) -> Self {
        Self { profile, models_map }
    }

    /// Rewrites every stub in the tree, leaving controller-API stubs alone;
    /// their placeholders were already resolved by the controller pass.
    pub fn run(&self, stub_paths: &[PathBuf]) -> Result<(), StubweldError> {
        for path in stub_paths {
            if !path.is_file() {
                continue;
            }
            let posix = path.to_string_lossy().replace('\\', "/");
            if posix.contains(&self.profile.controller_path_marker) {
                continue;
            }
            if self.rewrite_file(path)? {
                tracing::info!("updated {}", path.display());
            }
        }
        Ok(())
    }

    /// Rewrites one stub file in place. Returns whether it was written.
    pub fn rewrite_file(&self, path: &Path) -> Result<bool, StubweldError> {
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

        let mut stack: Vec<ClassModels> = Vec::new();
        let modified = self.process_body(&mut module.body, &mut stack);
        if !modified {
            return Ok(false);
        }

        let rewritten = self.insert_imports(&syntax::unparse(&module));
        std::fs::write(path, rewritten).map_err(|source| StubweldError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(true)
    }

    fn process_body(&self, body: &mut Vec<Stmt>, stack: &mut Vec<ClassModels>) -> bool {
        let mut modified = false;
        for stmt in body {
            match stmt {
                Stmt::Function(func) => {
                    for param in &mut func.params {
                        if let Some(annotation) = &mut param.annotation {
                            modified |= self.bind_annotation(annotation, stack);
                        }
                    }
                    if let Some(returns) = &mut func.returns {
                        modified |= self.bind_annotation(returns, stack);
                    }
                }
                Stmt::Class(class) => {
                    stack.push(class_models(&class.body));
                    modified |= self.process_body(&mut class.body, stack);
                    stack.pop();
                }
                _ => {}
            }
        }
        modified
    }

    fn bind_annotation(&self, annotation: &mut Expr, stack: &[ClassModels]) -> bool {
        let Some(marker) = find_bind_marker(annotation) else {
            return false;
        };
        *annotation = Expr::Name(self.resolve_hint_name(&marker, stack));
        true
    }

    /// Maps a marker name to the record name to write. Placeholder names
    /// resolve through the nearest enclosing class that declares the matching
    /// model attribute; with no such class the placeholder stays as written.
    fn resolve_hint_name(&self, marker: &str, stack: &[ClassModels]) -> String {
        let record_for = |model: &str| {
            self.models_map
                .get(model)
                .map(|(record, _)| record.clone())
                .unwrap_or_else(|| format!("{model}Data"))
        };

        match self.profile.placeholder_kind(marker) {
            Some(kind) => {
                let bound = stack.iter().rev().find_map(|class| match kind {
                    crate::profile::PlaceholderKind::Request => class.request_model.clone(),
                    crate::profile::PlaceholderKind::Response => class.response_model.clone(),
                });
                match bound {
                    Some(model) => record_for(&model),
                    None => marker.to_string(),
                }
            }
            None => record_for(marker),
        }
    }

    /// Injects one `from <module> import <names>` line per module whose
    /// record names occur in the rewritten text, after the last import line.
    /// Already-present statements are not duplicated.
    fn insert_imports(&self, content: &str) -> String {
        let mut used: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (record, module) in self.models_map.values() {
            if !module.is_empty() && content.contains(record.as_str()) {
                used.entry(module).or_default().insert(record);
            }
        }

        let import_lines: Vec<String> = used
            .iter()
            .map(|(module, records)| {
                let names = records.iter().copied().collect::<Vec<_>>().join(", ");
                format!("from {module} import {names}")
            })
            .filter(|line| !content.lines().any(|existing| existing == line))
            .collect();
        if import_lines.is_empty() {
            return content.to_string();
        }

        let lines: Vec<&str> = content.lines().collect();
        let insert_pos = lines
            .iter()
            .rposition(|line| line.starts_with("import") || line.starts_with("from"))
            .map(|index| index + 1)
            .unwrap_or(0);

        let mut out: Vec<String> = lines[..insert_pos].iter().map(|s| s.to_string()).collect();
        out.extend(import_lines);
        out.push(String::new());
        out.extend(lines[insert_pos..].iter().map(|s| s.to_string()));
        let mut joined = out.join("\n");
        if !joined.ends_with('\n') {
            joined.push('\n');
        }
        joined
    }
}

/// Request/response model attributes declared directly in a class body.
fn class_models(body: &[Stmt]) -> ClassModels {
    let mut models = ClassModels::default();
    for stmt in body {
        match stmt {
            Stmt::AnnAssign {
                target, annotation, ..
            } => match target.as_str() {
                "request_model" => models.request_model = referenced_name(annotation),
                "response_model" => models.response_model = referenced_name(annotation),
                _ => {}
            },
            Stmt::Assign { target, value } => match target.as_str() {
                "request_model" => models.request_model = referenced_name(value),
                "response_model" => models.response_model = referenced_name(value),
                _ => {}
            },
            _ => {}
        }
    }
    models
}

fn referenced_name(expr: &Expr) -> Option<String> {
    expr.trailing_name().map(str::to_string)
}

/// Finds the first `Annotated[...]` wrapper in an annotation whose metadata
/// carries a `model:<Name>` string, returning `<Name>`.
fn find_bind_marker(expr: &Expr) -> Option<String> {
    if let Expr::Subscript { value, slice } = expr {
        if annotated_head(value) {
            if let Expr::Tuple(elements) = &**slice {
                for meta in elements.iter().skip(1) {
                    if let Expr::Str(text) = meta {
                        if let Some(name) = text.strip_prefix("model:") {
                            let name = name.trim();
                            if !name.is_empty() {
                                return Some(name.to_string());
                            }
                        }
                    }
                }
            }
        }
    }

    match expr {
        Expr::Subscript { value, slice } => {
            find_bind_marker(value).or_else(|| find_bind_marker(slice))
        }
        Expr::BinOr { left, right } => find_bind_marker(left).or_else(|| find_bind_marker(right)),
        Expr::Tuple(elements) => elements.iter().find_map(find_bind_marker),
        Expr::Attribute { value, .. } => find_bind_marker(value),
        _ => None,
    }
}

fn annotated_head(value: &Expr) -> bool {
    match value {
        Expr::Name(id) => id == "Annotated",
        Expr::Attribute { attr, .. } => attr == "Annotated",
        Expr::Subscript { value, .. } => matches!(&**value, Expr::Name(id) if id == "Annotated"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn map_of(entries: &[(&str, &str, &str)]) -> BTreeMap<String, (String, String)> {
        entries
            .iter()
            .map(|(model, record, module)| {
                (model.to_string(), (record.to_string(), module.to_string()))
            })
            .collect()
    }

    const ENDPOINT_STUB: &str = "\
from __future__ import annotations
import typing

class ChatCompletionsEndpointController:
    request_model = ChatCompletionsRequest
    response_model = ChatCompletionsResponse
    class RequestManager:
        def prepare(self, data: typing.Annotated[dict[str, typing.Any], 'model:EndpointRequestType']) -> ChatCompletionsEndpointController.RequestManager: ...
        async def send(self) -> typing.Annotated[dict[str, typing.Any], 'model:EndpointResponseType']: ...
";

    #[test]
    fn markers_resolve_through_the_nearest_model_declaring_class() {
        let profile = Profile::default();
        let map = map_of(&[
            ("ChatCompletionsRequest", "ChatCompletionsRequestData", "nexosapi.domain.requests"),
            ("ChatCompletionsResponse", "ChatCompletionsResponseData", ""),
        ]);
        let rewriter = BindingRewriter::new(&profile, &map);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("completions.pyi");
        fs::write(&path, ENDPOINT_STUB).unwrap();
        assert!(rewriter.rewrite_file(&path).unwrap());

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("def prepare(self, data: ChatCompletionsRequestData) -> ChatCompletionsEndpointController.RequestManager:"));
        assert!(written.contains("async def send(self) -> ChatCompletionsResponseData:"));
        // Only the requests module resolved to an importable path.
        assert!(written.contains("from nexosapi.domain.requests import ChatCompletionsRequestData\n"));
        assert!(!written.contains("import ChatCompletionsResponseData"));
    }

    #[test]
    fn inner_class_attributes_shadow_outer_ones() {
        let source = "\
class Outer:
    request_model = OuterRequest
    class Inner:
        request_model = InnerRequest
        def f(self, data: typing.Annotated[dict, 'model:EndpointRequestType']) -> None: ...
";
        let profile = Profile::default();
        let map = map_of(&[("InnerRequest", "InnerRequestData", "")]);
        let rewriter = BindingRewriter::new(&profile, &map);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested.pyi");
        fs::write(&path, source).unwrap();
        assert!(rewriter.rewrite_file(&path).unwrap());
        assert!(
            fs::read_to_string(&path)
                .unwrap()
                .contains("def f(self, data: InnerRequestData) -> None:")
        );
    }

    #[test]
    fn direct_marker_names_default_to_their_record_name() {
        let source = "def make(raw: typing.Annotated[dict, 'model:Usage']) -> None: ...\n";
        let profile = Profile::default();
        let map = map_of(&[]);
        let rewriter = BindingRewriter::new(&profile, &map);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loose.pyi");
        fs::write(&path, source).unwrap();
        assert!(rewriter.rewrite_file(&path).unwrap());
        assert!(
            fs::read_to_string(&path)
                .unwrap()
                .contains("def make(raw: UsageData) -> None:")
        );
    }

    #[test]
    fn unbound_placeholders_stay_as_written() {
        let source = "def f(data: typing.Annotated[dict, 'model:EndpointRequestType']) -> None: ...\n";
        let profile = Profile::default();
        let map = map_of(&[]);
        let rewriter = BindingRewriter::new(&profile, &map);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orphan.pyi");
        fs::write(&path, source).unwrap();
        assert!(rewriter.rewrite_file(&path).unwrap());
        assert!(
            fs::read_to_string(&path)
                .unwrap()
                .contains("def f(data: EndpointRequestType) -> None:")
        );
    }

    #[test]
    fn files_without_markers_are_left_byte_identical() {
        let source = "import typing\n\nclass Plain:\n    x: int\n";
        let profile = Profile::default();
        let map = map_of(&[("M", "MData", "nexosapi.domain.m")]);
        let rewriter = BindingRewriter::new(&profile, &map);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.pyi");
        fs::write(&path, source).unwrap();
        assert!(!rewriter.rewrite_file(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), source);
    }

    #[test]
    fn controller_api_stubs_are_skipped() {
        let profile = Profile::default();
        let map = map_of(&[("M", "MData", "")]);
        let rewriter = BindingRewriter::new(&profile, &map);

        let dir = tempfile::tempdir().unwrap();
        let controller_dir = dir.path().join("nexosapi/api/controller");
        fs::create_dir_all(&controller_dir).unwrap();
        let path = controller_dir.join("__init__.pyi");
        let source = "def f(data: typing.Annotated[dict, 'model:M']) -> None: ...\n";
        fs::write(&path, source).unwrap();

        rewriter.run(&[path.clone()]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), source);
    }

    #[test]
    fn imports_group_per_module_and_never_duplicate() {
        let profile = Profile::default();
        let map = map_of(&[
            ("A", "AData", "nexosapi.domain.data"),
            ("B", "BData", "nexosapi.domain.data"),
        ]);
        let rewriter = BindingRewriter::new(&profile, &map);

        let content = "import typing\nfrom nexosapi.domain.data import AData, BData\n\nx: AData\ny: BData\n";
        assert_eq!(rewriter.insert_imports(content), content);

        let bare = "import typing\n\nx: AData\ny: BData\n";
        let injected = rewriter.insert_imports(bare);
        assert!(injected.contains("import typing\nfrom nexosapi.domain.data import AData, BData\n"));
    }
}
