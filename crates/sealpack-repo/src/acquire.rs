//! Layer acquisition
//!
//! Packages are published in one of two layouts. The fast path looks for an
//! image config label whose *value* marks a base layer; the label *key* is
//! `<contentType>:<digest>` and names the single blob to pull. Without such
//! a label the whole image is pulled.

use crate::client::{ImageConfig, RegistryClient};
use crate::error::{RepoError, Result};
use crate::resolver::ReferenceResolver;
use sealpack_core::{Layer, ResolvedReference};

/// Default label value marking the base layer
pub const DEFAULT_BASE_LABEL_VALUE: &str = "base";

/// Layers obtained for a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    /// One base layer holding a raw document stream
    Base(Layer),
    /// Every image layer, in manifest order
    Full(Vec<Layer>),
}

impl Acquired {
    pub fn layer_count(&self) -> usize {
        match self {
            Acquired::Base(_) => 1,
            Acquired::Full(layers) => layers.len(),
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self, Acquired::Base(_))
    }
}

/// A base layer located through an image label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseLayerLabel {
    pub media_type: String,
    pub digest: String,
}

impl BaseLayerLabel {
    /// Parse a `<contentType>:<digest>` label key
    ///
    /// A digest without an algorithm prefix is taken as sha256.
    pub fn parse(key: &str) -> Option<Self> {
        let (media_type, digest) = key.split_once(':')?;
        if media_type.is_empty() || digest.is_empty() {
            return None;
        }
        let digest = if digest.contains(':') {
            digest.to_string()
        } else {
            format!("sha256:{}", digest)
        };
        Some(Self {
            media_type: media_type.to_string(),
            digest,
        })
    }

    /// Find the first label (in key order) carrying `value`
    pub fn find(config: &ImageConfig, value: &str) -> Option<Self> {
        config
            .labels
            .iter()
            .filter(|(_, v)| v.as_str() == value)
            .find_map(|(key, _)| Self::parse(key))
    }
}

/// Chooses between the base-layer fast path and a full pull
pub struct LayerAcquirer<'a> {
    registry: &'a dyn RegistryClient,
    base_label_value: String,
}

impl<'a> LayerAcquirer<'a> {
    pub fn new(registry: &'a dyn RegistryClient) -> Self {
        Self {
            registry,
            base_label_value: DEFAULT_BASE_LABEL_VALUE.to_string(),
        }
    }

    pub fn with_base_label_value(mut self, value: impl Into<String>) -> Self {
        self.base_label_value = value.into();
        self
    }

    /// Resolve `reference` and pull its layers
    pub async fn acquire(&self, reference: &str) -> Result<(ResolvedReference, Acquired)> {
        let resolved = ReferenceResolver::new(self.registry).resolve(reference).await?;
        let acquired = self.acquire_resolved(&resolved).await?;
        Ok((resolved, acquired))
    }

    /// Pull the layers of an already resolved reference
    pub async fn acquire_resolved(&self, reference: &ResolvedReference) -> Result<Acquired> {
        let label = match self.registry.get_image_config(reference.as_str()).await {
            Ok(config) => BaseLayerLabel::find(&config, &self.base_label_value),
            Err(e) => {
                tracing::debug!(
                    reference = %reference,
                    error = %e,
                    "Image config unavailable, falling back to full pull"
                );
                None
            }
        };

        if let Some(label) = label {
            tracing::debug!(
                reference = %reference,
                layer = %label.digest,
                "Pulling base layer"
            );
            let layer = self
                .registry
                .pull_layer_by_digest(reference.as_str(), &label.media_type, &label.digest)
                .await
                .map_err(|e| fetch_failed(reference, e))?;
            return Ok(Acquired::Base(layer));
        }

        let layers = self
            .registry
            .pull_image(reference.as_str())
            .await
            .map_err(|e| fetch_failed(reference, e))?;
        tracing::debug!(reference = %reference, layers = layers.len(), "Pulled full image");
        Ok(Acquired::Full(layers))
    }
}

fn fetch_failed(reference: &ResolvedReference, e: RepoError) -> RepoError {
    RepoError::FetchFailed {
        reference: reference.to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRegistry;

    const MEDIA: &str = "application/vnd.sealpack.base";

    fn base_layer() -> Layer {
        Layer::from_blob(MEDIA, b"header\nkind: A\n".to_vec())
    }

    fn image_layers() -> Vec<Layer> {
        vec![
            Layer::from_blob("application/vnd.oci.image.layer.v1.tar", b"one".to_vec()),
            Layer::from_blob("application/vnd.oci.image.layer.v1.tar", b"two".to_vec()),
        ]
    }

    #[test]
    fn test_parse_label_key() {
        assert_eq!(
            BaseLayerLabel::parse("application/yaml:sha256:abc"),
            Some(BaseLayerLabel {
                media_type: "application/yaml".to_string(),
                digest: "sha256:abc".to_string(),
            })
        );
        assert_eq!(
            BaseLayerLabel::parse("application/yaml:abc").unwrap().digest,
            "sha256:abc"
        );
        assert_eq!(BaseLayerLabel::parse("no-separator"), None);
        assert_eq!(BaseLayerLabel::parse(":sha256:abc"), None);
        assert_eq!(BaseLayerLabel::parse("application/yaml:"), None);
    }

    #[tokio::test]
    async fn test_base_label_fast_path() {
        let base = base_layer();
        let config = ImageConfig::default()
            .with_label("maintainer", "ops")
            .with_label(format!("{}:{}", MEDIA, base.digest), "base");
        let registry = MockRegistry::new()
            .with_image("pkg:1.0.0", config, image_layers())
            .with_blob(base.clone());

        let (resolved, acquired) = LayerAcquirer::new(&registry)
            .acquire("pkg:1.0.0")
            .await
            .unwrap();

        assert_eq!(resolved.as_str(), "pkg:1.0.0");
        assert_eq!(acquired, Acquired::Base(base));
        let counts = registry.operation_counts();
        assert_eq!(counts.blob_pulls, 1);
        assert_eq!(counts.image_pulls, 0);
    }

    #[tokio::test]
    async fn test_missing_label_falls_back_to_full_pull() {
        let config = ImageConfig::default().with_label("maintainer", "ops");
        let registry = MockRegistry::new().with_image("pkg:1.0.0", config, image_layers());

        let (_, acquired) = LayerAcquirer::new(&registry)
            .acquire("pkg:1.0.0")
            .await
            .unwrap();

        assert_eq!(acquired, Acquired::Full(image_layers()));
        assert_eq!(acquired.layer_count(), 2);
    }

    #[tokio::test]
    async fn test_config_failure_falls_back_to_full_pull() {
        let registry =
            MockRegistry::new().with_image("pkg:1.0.0", ImageConfig::default(), image_layers());
        registry.fail_config(true);

        let (_, acquired) = LayerAcquirer::new(&registry)
            .acquire("pkg:1.0.0")
            .await
            .unwrap();
        assert!(!acquired.is_base());
    }

    #[tokio::test]
    async fn test_custom_label_value() {
        let base = base_layer();
        let config = ImageConfig::default().with_label(format!("{}:{}", MEDIA, base.digest), "seed");
        let registry = MockRegistry::new()
            .with_image("pkg:1.0.0", config, image_layers())
            .with_blob(base);

        let acquirer = LayerAcquirer::new(&registry);
        let (_, acquired) = acquirer.acquire("pkg:1.0.0").await.unwrap();
        assert!(!acquired.is_base());

        let acquirer = LayerAcquirer::new(&registry).with_base_label_value("seed");
        let (_, acquired) = acquirer.acquire("pkg:1.0.0").await.unwrap();
        assert!(acquired.is_base());
    }

    #[tokio::test]
    async fn test_pull_failure_is_fatal() {
        let registry =
            MockRegistry::new().with_image("pkg:1.0.0", ImageConfig::default(), image_layers());
        registry.fail_pull(true);

        let err = LayerAcquirer::new(&registry)
            .acquire("pkg:1.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_image_is_fatal() {
        let registry = MockRegistry::new();
        let err = LayerAcquirer::new(&registry)
            .acquire("ghost:1.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::FetchFailed { .. }));
    }
}
