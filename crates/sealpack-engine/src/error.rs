//! Pipeline error types

use std::time::Duration;

use sealpack_core::CoreError;
use sealpack_repo::RepoError;
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to decrypt {secret}: {source}")]
    Secret {
        secret: &'static str,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    Registry(#[from] RepoError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Loader failed: {message}")]
    Loader { message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Invalid event: {message}")]
    InvalidEvent { message: String },

    #[error("Pipeline timed out after {0:?}")]
    Timeout(Duration),

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Background task failed: {message}")]
    Task { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn loader(message: impl Into<String>) -> Self {
        Self::Loader {
            message: message.into(),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Stages of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    DecryptingSecrets,
    AcquiringLayers,
    Extracting,
    DecryptingContent,
    Repackaging,
    Loading,
    Done,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DecryptingSecrets => "decrypting secrets",
            Self::AcquiringLayers => "acquiring layers",
            Self::Extracting => "extracting",
            Self::DecryptingContent => "decrypting content",
            Self::Repackaging => "repackaging",
            Self::Loading => "loading",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// A fatal error together with the stage it ended the run in
#[derive(Error, Debug)]
#[error("Pipeline failed while {stage}: {error}")]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    #[source]
    pub error: EngineError,
}

impl PipelineFailure {
    pub fn new(stage: PipelineStage, error: impl Into<EngineError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, EngineError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.error, EngineError::Timeout(_))
    }
}
