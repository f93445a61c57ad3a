//! The batch pipeline: stale-stub cleanup, optional stub generation, scratch
//! pruning, the three rewrite passes, and relocation of the finished stubs
//! into the source tree.

use std::path::{Path, PathBuf};
use std::process::Command;

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};

use crate::error::StubweldError;
use crate::profile::Profile;
use crate::registry::ManagerRegistry;
use crate::rewrite::bindings::BindingRewriter;
use crate::rewrite::controllers::ControllerRewriter;
use crate::rewrite::models::ModelRecordWriter;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tree the finished stubs are placed into, next to the runtime modules.
    pub source_dir: PathBuf,
    /// Tree that receives stubs generated for `tests/...` paths.
    pub test_dir: PathBuf,
    /// Scratch directory the stub generator populates; deleted on success.
    pub scratch_dir: PathBuf,
    /// Scratch-relative paths rewritten even when the pruning rules would
    /// drop them.
    pub process_files: Vec<String>,
    /// Class names the controller rewriter leaves untouched.
    pub exclude_classes: Vec<String>,
    /// External stub generator invocation (program plus arguments). `None`
    /// assumes the scratch directory is already populated.
    pub stubgen_command: Option<Vec<String>>,
    pub profile: Profile,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let profile = Profile::default();
        Self {
            source_dir: PathBuf::from("src"),
            test_dir: PathBuf::from("tests"),
            scratch_dir: PathBuf::from("stubs"),
            process_files: vec![
                "tests/mocks.pyi".to_string(),
                "nexosapi/api/endpoints/__init__.pyi".to_string(),
            ],
            exclude_classes: vec![profile.controller_class.clone()],
            stubgen_command: None,
            profile,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    registry: ManagerRegistry,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, registry: ManagerRegistry) -> Self {
        Self { config, registry }
    }

    /// Runs the whole batch.
    ///
    /// Stale-stub cleanup failures (missing source or test tree) are hard
    /// errors. Anything failing after that point is logged with its cause
    /// chain and the scratch directory is kept for inspection; the call still
    /// returns `Ok`. On success the scratch directory is deleted.
    pub fn run(&self) -> Result<(), StubweldError> {
        self.remove_stale_stubs()?;

        match self.run_batch() {
            Ok(()) => {
                std::fs::remove_dir_all(&self.config.scratch_dir).map_err(|source| {
                    StubweldError::io(&self.config.scratch_dir, source)
                })?;
                Ok(())
            }
            Err(error) => {
                tracing::error!(
                    "stub rewriting failed, scratch directory kept for inspection: {}",
                    error_chain(&error)
                );
                Ok(())
            }
        }
    }

    /// Deletes every `.pyi` file under the source and test trees so a failed
    /// run never leaves half-old stubs beside the runtime modules.
    fn remove_stale_stubs(&self) -> Result<(), StubweldError> {
        for root in [&self.config.source_dir, &self.config.test_dir] {
            for path in collect_files(root)? {
                if path.extension().is_some_and(|ext| ext == "pyi") {
                    std::fs::remove_file(&path).map_err(|source| StubweldError::io(&path, source))?;
                }
            }
        }
        Ok(())
    }

    fn run_batch(&self) -> Result<(), StubweldError> {
        if let Some(command) = &self.config.stubgen_command {
            self.run_stub_generator(command)?;
        }

        let scratch_tree = collect_files(&self.config.scratch_dir)?;
        self.process_controllers(&scratch_tree)?;

        let domain_root = self.config.scratch_dir.join(&self.config.profile.domain_stub_dir);
        let extras: Vec<PathBuf> = self
            .config
            .process_files
            .iter()
            .map(|file| self.config.scratch_dir.join(file))
            .collect();
        let writer = ModelRecordWriter::new(
            &self.config.profile,
            &domain_root,
            &self.config.source_dir,
            &extras,
            self.config.exclude_classes.iter().cloned(),
        )?;
        writer.run()?;
        let models_map = writer.build_basemodel_to_typeddict_map();

        BindingRewriter::new(&self.config.profile, &models_map).run(&scratch_tree)?;

        self.relocate_stubs()
    }

    fn run_stub_generator(&self, command: &[String]) -> Result<(), StubweldError> {
        let Some((program, args)) = command.split_first() else {
            return Ok(());
        };
        tracing::info!("running stub generator: {}", command.join(" "));
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| StubweldError::io(program, source))?;
        if !status.success() {
            return Err(StubweldError::StubgenFailed {
                command: command.join(" "),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    /// Prunes scratch stubs that are not rewrite targets, then applies the
    /// controller rewriter to everything that remains.
    fn process_controllers(&self, scratch_tree: &[PathBuf]) -> Result<(), StubweldError> {
        let mut rewriter = ControllerRewriter::new(
            &self.config.profile,
            &self.registry,
            self.config.exclude_classes.iter().cloned(),
        );
        for path in scratch_tree {
            if self.remove_stub_if_not_needed(path)? {
                continue;
            }
            rewriter.rewrite_file(path)?;
        }
        Ok(())
    }

    /// Drops generated stubs with no rewrite value: directory shadows,
    /// `__pycache__` leftovers, `__init__` stubs, files outside the API and
    /// domain trees, and the domain base stub. Explicitly-listed files are
    /// always kept. Returns whether the file was removed.
    fn remove_stub_if_not_needed(&self, path: &Path) -> Result<bool, StubweldError> {
        let posix = path.to_string_lossy().replace('\\', "/");
        if self
            .config
            .process_files
            .iter()
            .any(|file| posix.contains(file.as_str()))
        {
            return Ok(false);
        }

        let profile = &self.config.profile;
        let stem = posix.trim_end_matches(".pyi");
        let outside_rewrite_trees = !posix.contains(&profile.api_path_marker)
            && !posix.contains(&profile.domain_path_marker);
        let domain_base = format!("{}base.pyi", profile.domain_path_marker);

        let prune = Path::new(stem).is_dir()
            || posix.contains("__pycache__")
            || posix.contains("__init__.py")
            || outside_rewrite_trees
            || posix.contains(&domain_base);
        if prune {
            tracing::debug!("removing stub file {}", path.display());
            std::fs::remove_file(path).map_err(|source| StubweldError::io(path, source))?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Moves every remaining scratch stub into the source tree (or the test
    /// tree for `tests/...` paths), mirroring its relative path.
    fn relocate_stubs(&self) -> Result<(), StubweldError> {
        if !self.config.scratch_dir.is_dir() {
            tracing::warn!(
                "scratch directory {} does not exist, skipping move",
                self.config.scratch_dir.display()
            );
            return Ok(());
        }

        for path in collect_files(&self.config.scratch_dir)? {
            if !path.extension().is_some_and(|ext| ext == "pyi") {
                continue;
            }
            let relative = path
                .strip_prefix(&self.config.scratch_dir)
                .unwrap_or(&path)
                .to_path_buf();
            let target = match relative.strip_prefix("tests") {
                Ok(in_tests) => self.config.test_dir.join(in_tests),
                Err(_) => self.config.source_dir.join(&relative),
            };
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|source| StubweldError::io(parent, source))?;
            }
            std::fs::rename(&path, &target).map_err(|source| StubweldError::io(&path, source))?;
            tracing::debug!("placed {}", target.display());
        }
        Ok(())
    }
}

/// All files under `root`, sorted, with the walker's standard filters off so
/// scratch trees are fully enumerated.
fn collect_files(root: &Path) -> Result<Vec<PathBuf>, StubweldError> {
    if !root.is_dir() {
        return Err(StubweldError::NotADirectory {
            path: root.to_path_buf(),
        });
    }
    let mut files = Vec::new();
    for entry in WalkBuilder::new(root).standard_filters(false).build() {
        let entry = entry?;
        if entry.file_type().is_some_and(|kind| kind.is_file()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn error_chain(error: &StubweldError) -> String {
    let mut chain = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_the_sdk_layout() {
        let config = PipelineConfig::default();
        assert_eq!(config.scratch_dir, PathBuf::from("stubs"));
        assert_eq!(config.exclude_classes, vec!["NexosAIAPIEndpointController"]);
        assert!(config.stubgen_command.is_none());
        assert_eq!(
            config.process_files,
            vec!["tests/mocks.pyi", "nexosapi/api/endpoints/__init__.pyi"]
        );
    }

    #[test]
    fn config_deserializes_with_partial_overrides() {
        let config: PipelineConfig =
            serde_json::from_str("{\"scratch_dir\": \"out\", \"stubgen_command\": [\"stubgen\", \"src\"]}")
                .unwrap();
        assert_eq!(config.scratch_dir, PathBuf::from("out"));
        assert_eq!(
            config.stubgen_command,
            Some(vec!["stubgen".to_string(), "src".to_string()])
        );
        assert_eq!(config.source_dir, PathBuf::from("src"));
    }

    #[test]
    fn error_chains_render_every_cause() {
        let error = StubweldError::io(
            "stubs/x.pyi",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let chain = error_chain(&error);
        assert!(chain.contains("stubs/x.pyi"));
        assert!(chain.ends_with(": denied"));
    }
}
