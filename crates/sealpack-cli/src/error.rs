//! CLI error types with exit code handling
//!
//! Library errors are folded into [`CliError`], which knows the exit code
//! and an optional hint for each failure class.

use miette::Diagnostic;
use thiserror::Error;

use sealpack_core::CoreError;
use sealpack_engine::{EngineError, PipelineFailure};
use sealpack_repo::RepoError;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Malformed event, reference, tag or document
    #[error("Invalid input: {message}")]
    #[diagnostic(code(sealpack::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Key store miss or failed decryption
    #[error("Crypto error: {message}")]
    #[diagnostic(code(sealpack::cli::crypto))]
    Crypto {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Registry error: {message}")]
    #[diagnostic(code(sealpack::cli::registry))]
    Registry {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Load error: {message}")]
    #[diagnostic(code(sealpack::cli::load))]
    Load { message: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(sealpack::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(sealpack::cli::timeout), help("raise `timeout` in the configuration file"))]
    Timeout { message: String },

    #[error("{message}")]
    #[diagnostic(code(sealpack::cli::interrupted))]
    Interrupted { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(sealpack::cli::io))]
    Io { message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(sealpack::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::Crypto { .. } => exit_codes::CRYPTO_ERROR,
            CliError::Registry { .. } => exit_codes::REGISTRY_ERROR,
            CliError::Load { .. } => exit_codes::LOAD_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Timeout { .. } => exit_codes::TIMEOUT,
            CliError::Interrupted { .. } => exit_codes::INTERRUPTED,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach a hint to variants that carry one
    #[must_use]
    pub fn with_help(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            CliError::Input { help, .. }
            | CliError::Crypto { help, .. }
            | CliError::Registry { help, .. }
            | CliError::Config { help, .. } => *help = Some(text.into()),
            _ => {}
        }
        self
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::input(err.to_string())
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::KeyNotFound { .. } => CliError::Crypto {
                message,
                help: Some("run `sealpack keygen` or set `keyDir` in the configuration".into()),
            },
            CoreError::KeyStore { .. }
            | CoreError::InvalidKeyFormat { .. }
            | CoreError::UnsupportedKeyFormat { .. }
            | CoreError::InvalidEncoding { .. }
            | CoreError::DecryptionFailed { .. } => CliError::Crypto {
                message,
                help: None,
            },
            CoreError::Io(_) => CliError::Io { message },
            CoreError::Cancelled => CliError::Interrupted { message },
            CoreError::Archive { .. }
            | CoreError::YamlParse(_)
            | CoreError::JsonParse(_)
            | CoreError::InvalidVersion(_) => CliError::input(message),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let message = err.to_string();
        match err {
            RepoError::Core(core) => core.into(),
            RepoError::Io(_) => CliError::Io { message },
            RepoError::InvalidTag { .. } | RepoError::InvalidOciReference { .. } => {
                CliError::input(message)
            }
            RepoError::AuthFailed { .. } => CliError::Registry {
                message,
                help: Some("check the `registry.credentials` section of the configuration".into()),
            },
            _ => CliError::Registry {
                message,
                help: None,
            },
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::Secret { source, .. } => {
                CliError::from(source).with_message(message)
            }
            EngineError::Registry(repo) => repo.into(),
            EngineError::Core(core) => core.into(),
            EngineError::Loader { .. } => CliError::Load { message },
            EngineError::Config { .. } => CliError::Config {
                message,
                help: None,
            },
            EngineError::InvalidEvent { .. } | EngineError::Json(_) => CliError::input_with_help(
                message,
                "events carry `encryptedReference`, `encryptedKey` and `target`",
            ),
            EngineError::Yaml(_) => CliError::Config {
                message,
                help: None,
            },
            EngineError::Timeout(_) => CliError::Timeout { message },
            EngineError::Cancelled => CliError::Interrupted { message },
            EngineError::Io(_) => CliError::Io { message },
            EngineError::Task { .. } => CliError::internal(message),
        }
    }
}

impl From<PipelineFailure> for CliError {
    fn from(failure: PipelineFailure) -> Self {
        let message = failure.to_string();
        CliError::from(failure.error).with_message(message)
    }
}

impl CliError {
    /// Replace the message while keeping the class and hint
    fn with_message(mut self, text: String) -> Self {
        match &mut self {
            CliError::Input { message, .. }
            | CliError::Crypto { message, .. }
            | CliError::Registry { message, .. }
            | CliError::Load { message }
            | CliError::Config { message, .. }
            | CliError::Timeout { message }
            | CliError::Interrupted { message }
            | CliError::Io { message }
            | CliError::Internal { message } => *message = text,
        }
        self
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
