//! Error types for the local LLM domain.
//!
//! Runtime failures carry their details as strings so they can be cloned
//! into retained outcomes and lifecycle states.

use super::model_registry::ModelId;

/// Failure reported by the inference runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("network error: {0}")]
    Network(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid model format: {0}")]
    Format(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("inference error: {0}")]
    Inference(String),
}

/// Failure of a `request_load` call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("loading {model} failed: {source}")]
    Runtime {
        model: ModelId,
        #[source]
        source: RuntimeError,
    },
    #[error("{0} failed to load earlier; call retry before loading again")]
    NeedsRetry(ModelId),
}

/// Failure of a `generate` call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("a generation is already running")]
    Busy,
    #[error("chat template failed: {0}")]
    Template(#[source] RuntimeError),
    #[error("generation failed: {0}")]
    Runtime(#[source] RuntimeError),
    #[error("generation task aborted: {0}")]
    Aborted(String),
}

/// Failure looking up a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
}

/// Failure managing model files on disk.
#[derive(Debug, thiserror::Error)]
pub enum ModelFileError {
    #[error("io error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("download failed: {0}")]
    Download(String),
    #[error("{model} has no published GGUF in {repo}; convert it and place {file} in the models directory")]
    NotPublished {
        model: ModelId,
        repo: &'static str,
        file: &'static str,
    },
}

impl ModelFileError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<ModelFileError> for RuntimeError {
    fn from(err: ModelFileError) -> Self {
        match err {
            ModelFileError::Io { .. } => RuntimeError::Storage(err.to_string()),
            ModelFileError::HashMismatch { .. } | ModelFileError::NotPublished { .. } => {
                RuntimeError::Format(err.to_string())
            }
            ModelFileError::Download(msg) => RuntimeError::Network(msg),
        }
    }
}
