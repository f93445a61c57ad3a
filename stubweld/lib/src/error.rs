use std::path::PathBuf;

use thiserror::Error;

/// Errors emitted by stubweld operations.
#[derive(Debug, Error)]
pub enum StubweldError {
    #[error("I/O failure at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse `{origin}`")]
    ParseFailed { origin: String },

    #[error("Grammar failed to load: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("Class `{class}` not found in registry source")]
    ClassNotFound { class: String },

    #[error("Method `{method}` not found on `{class}`")]
    MethodNotFound { class: String, method: String },

    #[error("Directory `{path}` does not exist or is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("Stub generator command `{command}` exited with {status}")]
    StubgenFailed { command: String, status: String },

    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),
}

impl StubweldError {
    /// Wraps an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
