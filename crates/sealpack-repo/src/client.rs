//! Registry client abstraction
//!
//! The pipeline never talks to a registry directly. Everything goes through
//! [`RegistryClient`], implemented by [`crate::OciRegistry`] for real
//! registries and by [`crate::MockRegistry`] in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use sealpack_core::Layer;

/// The parts of an image configuration the pipeline reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ImageConfig {
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Parse the `config.Labels` object of an OCI/docker image config blob
    pub fn from_config_json(raw: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            config: Option<RawConfig>,
        }

        #[derive(Deserialize)]
        struct RawConfig {
            #[serde(rename = "Labels", default)]
            labels: Option<BTreeMap<String, String>>,
        }

        let parsed: Raw = serde_json::from_str(raw)?;
        let labels = parsed
            .config
            .and_then(|config| config.labels)
            .unwrap_or_default();
        Ok(Self { labels })
    }
}

/// Read access to an OCI registry
///
/// References are full image references (`registry/repository:tag` or
/// `registry/repository@digest`).
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the configuration of an image
    async fn get_image_config(&self, reference: &str) -> Result<ImageConfig>;

    /// Pull a single blob of the image's repository
    async fn pull_layer_by_digest(
        &self,
        reference: &str,
        media_type: &str,
        digest: &str,
    ) -> Result<Layer>;

    /// Pull every layer of an image, in manifest order
    async fn pull_image(&self, reference: &str) -> Result<Vec<Layer>>;

    /// List the tags of a repository
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>>;
}
