//! TypedDict record synthesis for domain-model stubs.
//!
//! Every class extending a recognized pydantic-style base gets a structural
//! `<Model>Data` record appended to its stub file, with optional fields
//! marked `typing.NotRequired`. The writer also builds the model-to-record
//! map the binding rewriter consumes.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::StubweldError;
use crate::profile::Profile;
use crate::syntax::{self, Expr, Stmt};

/// One field of a domain model: its name and whether the record may omit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    pub name: String,
    pub optional: bool,
}

/// A discovered domain model with its fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDef {
    pub name: String,
    pub fields: Vec<FieldRecord>,
}

pub struct ModelRecordWriter<'a> {
    profile: &'a Profile,
    exclude_classes: HashSet<String>,
    /// Domain stubs plus the explicitly-processed extras, scan order fixed.
    stubs: Vec<PathBuf>,
    domain_root: PathBuf,
    source_root: PathBuf,
}

impl<'a> ModelRecordWriter<'a> {
    /// Discovers the domain-model stubs under `domain_root` (excluding
    /// `__init__.pyi` and `base.pyi`) and appends the explicit extras.
    pub fn new(
        profile: &'a Profile,
        domain_root: &Path,
        source_root: &Path,
        extras: &[PathBuf],
        exclude_classes: impl IntoIterator<Item = String>,
    ) -> Result<Self, StubweldError> {
        let mut stubs = discover_domain_stubs(domain_root)?;
        stubs.extend(extras.iter().cloned());
        Ok(Self {
            profile,
            exclude_classes: exclude_classes.into_iter().collect(),
            stubs,
            domain_root: domain_root.to_path_buf(),
            source_root: source_root.to_path_buf(),
        })
    }

    /// Appends missing records to every discovered stub.
    pub fn run(&self) -> Result<(), StubweldError> {
        if self.stubs.is_empty() {
            tracing::warn!("no domain model stubs found under {}", self.domain_root.display());
            return Ok(());
        }
        for stub in &self.stubs {
            if self.process_stub(stub)? {
                tracing::info!("appended records to {}", stub.display());
            }
        }
        Ok(())
    }

    /// Appends the record classes missing from one stub file. Idempotent:
    /// record text already present is never re-appended, and the file is only
    /// written when at least one record was added.
    fn process_stub(&self, path: &Path) -> Result<bool, StubweldError> {
        if !path.is_file() {
            tracing::warn!("listed stub {} does not exist, skipping", path.display());
            return Ok(false);
        }
        let content = std::fs::read_to_string(path).map_err(|source| StubweldError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let models: Vec<ModelDef> = self
            .extract_base_models_definitions(&content, &path.display().to_string())
            .into_iter()
            .filter(|model| !self.exclude_classes.contains(&model.name))
            .collect();
        if models.is_empty() {
            return Ok(false);
        }

        let model_names: HashSet<String> = models.iter().map(|m| m.name.clone()).collect();
        let mut appended = false;
        let mut new_content = content.trim_end().to_string();
        for model in &models {
            let record = self.record_source(model, &model_names);
            if !content.contains(&record) {
                new_content.push_str("\n\n");
                new_content.push_str(&record);
                appended = true;
            }
        }

        if appended {
            new_content.push('\n');
            std::fs::write(path, new_content).map_err(|source| StubweldError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(appended)
    }

    /// Collects the top-level classes of `content` whose bases include a
    /// recognized base-model name, with their annotated fields in order.
    pub fn extract_base_models_definitions(&self, content: &str, origin: &str) -> Vec<ModelDef> {
        let module = match syntax::parse_module(content, origin) {
            Ok(module) => module,
            Err(error) => {
                tracing::warn!("skipping model extraction: {error}");
                return Vec::new();
            }
        };

        let mut models = Vec::new();
        for stmt in &module.body {
            let Stmt::Class(class) = stmt else { continue };
            let is_model = class.bases.iter().any(|base| match base {
                Expr::Name(id) => self.profile.is_model_base(id),
                _ => false,
            });
            if !is_model {
                continue;
            }

            let fields = class
                .body
                .iter()
                .filter_map(|stmt| match stmt {
                    Stmt::AnnAssign {
                        target,
                        annotation,
                        value,
                    } => Some(FieldRecord {
                        name: target.clone(),
                        optional: value.is_some() || annotation_contains_none(annotation),
                    }),
                    _ => None,
                })
                .collect();
            models.push(ModelDef {
                name: class.name.clone(),
                fields,
            });
        }
        models
    }

    /// Maps every discovered model to its record name and the dotted module
    /// to import it from. The module path is kept only when the matching
    /// runtime module resolves under the source root; otherwise it is empty,
    /// meaning the record name is usable without an import.
    pub fn build_basemodel_to_typeddict_map(&self) -> BTreeMap<String, (String, String)> {
        let mut mapping = BTreeMap::new();
        if self.stubs.is_empty() {
            tracing::warn!("domain model stub list is empty, cannot build mapping");
            return mapping;
        }

        for stub in &self.stubs {
            let Ok(content) = std::fs::read_to_string(stub) else {
                continue;
            };
            let models =
                self.extract_base_models_definitions(&content, &stub.display().to_string());
            let mut module_path = self.module_path_for_stub(stub);
            if !self.module_resolves(&module_path) {
                module_path = String::new();
            }

            for model in models {
                if !self.exclude_classes.contains(&model.name) {
                    mapping.insert(
                        model.name.clone(),
                        (format!("{}Data", model.name), module_path.clone()),
                    );
                }
            }
        }
        mapping
    }

    fn module_path_for_stub(&self, stub: &Path) -> String {
        let relative = stub.strip_prefix(&self.domain_root).unwrap_or(stub);
        let dotted = relative
            .with_extension("")
            .components()
            .map(|part| part.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(".");
        format!("{}.{dotted}", self.profile.domain_package)
    }

    fn module_resolves(&self, module_path: &str) -> bool {
        let relative: PathBuf = module_path.split('.').collect();
        self.source_root.join(relative).with_extension("py").is_file()
    }

    fn record_source(&self, model: &ModelDef, model_names: &HashSet<String>) -> String {
        let mut lines = vec![format!("class {}Data(typing.TypedDict):", model.name)];
        if model.fields.is_empty() {
            lines.push("    pass".to_string());
        } else {
            for field in &model.fields {
                let annotation = match self.field_annotation(&model.name, &field.name) {
                    Some(expr) => rewrite_annotation(expr, model_names).to_string(),
                    None => "typing.Any".to_string(),
                };
                let annotation = if field.optional {
                    format!("typing.NotRequired[{annotation}]")
                } else {
                    annotation
                };
                lines.push(format!("    {}: {annotation}", field.name));
            }
        }
        lines.join("\n")
    }

    /// Finds a field's declared annotation by scanning every known domain
    /// stub; a model annotated in a sibling file still resolves.
    fn field_annotation(&self, model_name: &str, field_name: &str) -> Option<Expr> {
        for stub in &self.stubs {
            let Ok(content) = std::fs::read_to_string(stub) else {
                continue;
            };
            let Ok(module) = syntax::parse_module(&content, &stub.display().to_string()) else {
                continue;
            };
            for stmt in &module.body {
                let Stmt::Class(class) = stmt else { continue };
                if class.name != model_name {
                    continue;
                }
                for stmt in &class.body {
                    if let Stmt::AnnAssign {
                        target, annotation, ..
                    } = stmt
                    {
                        if target == field_name {
                            return Some(annotation.clone());
                        }
                    }
                }
            }
        }
        None
    }
}

fn discover_domain_stubs(domain_root: &Path) -> Result<Vec<PathBuf>, StubweldError> {
    if !domain_root.is_dir() {
        tracing::warn!("domain models directory {} does not exist", domain_root.display());
        return Ok(Vec::new());
    }

    let mut stubs = Vec::new();
    for entry in std::fs::read_dir(domain_root).map_err(|source| StubweldError::Io {
        path: domain_root.to_path_buf(),
        source,
    })? {
        let entry = entry.map_err(|source| StubweldError::Io {
            path: domain_root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_file()
            && name.ends_with(".pyi")
            && name != "__init__.pyi"
            && name != "base.pyi"
        {
            stubs.push(path);
        }
    }
    stubs.sort();
    Ok(stubs)
}

/// Whether an annotation can structurally hold a "none" value: a plain
/// `None`/`NoneType` name, an attribute ending in `NoneType`, either operand
/// of a `|` union, any tuple element, or any of those nested under a
/// subscripted generic.
fn annotation_contains_none(expr: &Expr) -> bool {
    match expr {
        Expr::NoneLit => true,
        Expr::Name(id) => id == "None" || id == "NoneType",
        Expr::Attribute { attr, .. } => attr == "NoneType",
        Expr::BinOr { left, right } => {
            annotation_contains_none(left) || annotation_contains_none(right)
        }
        Expr::Subscript { slice, .. } => annotation_contains_none(slice),
        Expr::Tuple(elements) => elements.iter().any(annotation_contains_none),
        _ => false,
    }
}

/// Rewrites base-model names in an annotation to their `...Data` record
/// equivalents. `Annotated[...]` wrappers only rewrite the wrapped type, not
/// the metadata arguments.
fn rewrite_annotation(expr: Expr, model_names: &HashSet<String>) -> Expr {
    match expr {
        Expr::Name(id) if model_names.contains(&id) => Expr::Name(format!("{id}Data")),
        Expr::Subscript { value, slice } if is_annotated(&value) => {
            let slice = match *slice {
                Expr::Tuple(mut elements) => {
                    if let Some(first) = elements.first_mut() {
                        *first = rewrite_annotation(first.clone(), model_names);
                    }
                    Expr::Tuple(elements)
                }
                other => rewrite_annotation(other, model_names),
            };
            Expr::Subscript {
                value,
                slice: Box::new(slice),
            }
        }
        Expr::Subscript { value, slice } => {
            let value = rewrite_annotation(*value, model_names);
            let slice = match *slice {
                Expr::Tuple(elements) => Expr::Tuple(
                    elements
                        .into_iter()
                        .map(|e| rewrite_annotation(e, model_names))
                        .collect(),
                ),
                other => rewrite_annotation(other, model_names),
            };
            Expr::Subscript {
                value: Box::new(value),
                slice: Box::new(slice),
            }
        }
        Expr::Tuple(elements) => Expr::Tuple(
            elements
                .into_iter()
                .map(|e| rewrite_annotation(e, model_names))
                .collect(),
        ),
        Expr::BinOr { left, right } => Expr::BinOr {
            left: Box::new(rewrite_annotation(*left, model_names)),
            right: Box::new(rewrite_annotation(*right, model_names)),
        },
        Expr::Attribute { value, attr } if model_names.contains(&attr) => Expr::Attribute {
            value,
            attr: format!("{attr}Data"),
        },
        other => other,
    }
}

fn is_annotated(value: &Expr) -> bool {
    matches!(value.trailing_name(), Some("Annotated"))
}
