//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Key not found in key store: {service}/{user}")]
    KeyNotFound { service: String, user: String },

    #[error("Key store error: {message}")]
    KeyStore { message: String },

    #[error("Invalid key format: {message}")]
    InvalidKeyFormat { message: String },

    #[error("Unsupported key format: {message}")]
    UnsupportedKeyFormat { message: String },

    #[error("Invalid encoding: {message}")]
    InvalidEncoding { message: String },

    #[error("Decryption failed: {message}")]
    DecryptionFailed { message: String },

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
