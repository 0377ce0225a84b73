//! Error types for registry operations

use sealpack_core::CoreError;
use thiserror::Error;

/// Registry operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Resolution Errors ============
    #[error("Reference resolution failed: {message}")]
    ResolutionFailed { message: String },

    #[error("No version of {reference} satisfies {constraint}, available: {available}")]
    NoMatchingVersion {
        reference: String,
        constraint: String,
        available: String,
    },

    // ============ Registry Errors ============
    #[error("Failed to fetch {reference}: {message}")]
    FetchFailed { reference: String, message: String },

    #[error("Image not found: {reference}")]
    ImageNotFound { reference: String },

    #[error("Registry transport error: {message}")]
    Transport { message: String },

    #[error("Invalid OCI reference: {reference}")]
    InvalidOciReference { reference: String },

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    // ============ Image Errors ============
    #[error("Invalid image tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    #[error("Invalid image archive: {message}")]
    InvalidImage { message: String },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Whether the registry reported that the image does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::ImageNotFound { .. })
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<semver::Error> for RepoError {
    fn from(e: semver::Error) -> Self {
        RepoError::ResolutionFailed {
            message: format!("Invalid semver: {}", e),
        }
    }
}
