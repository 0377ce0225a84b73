//! OCI registry client
//!
//! Pull-only access to OCI-compliant registries through `oci-distribution`.

use async_trait::async_trait;
use oci_distribution::Reference;
use oci_distribution::client::{Client, ClientConfig};
use oci_distribution::errors::OciDistributionError;
use oci_distribution::manifest::{self, OciDescriptor};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::RegistryOperation;

use crate::client::{ImageConfig, RegistryClient};
use crate::config::RegistryConfig;
use crate::error::{RepoError, Result};
use sealpack_core::Layer;

/// Layer media types accepted on a full pull
const LAYER_MEDIA_TYPES: [&str; 4] = [
    manifest::IMAGE_LAYER_MEDIA_TYPE,
    manifest::IMAGE_LAYER_GZIP_MEDIA_TYPE,
    manifest::IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE,
    manifest::IMAGE_DOCKER_LAYER_TAR_MEDIA_TYPE,
];

/// OCI registry client
pub struct OciRegistry {
    /// OCI client
    client: Client,
    /// Authentication
    auth: RegistryAuth,
}

impl OciRegistry {
    /// Create a new OCI registry client
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client_config = ClientConfig {
            protocol: config.protocol.into(),
            ..Default::default()
        };
        Ok(Self {
            client: Client::new(client_config),
            auth: config.auth()?,
        })
    }

    /// Parse an OCI reference string
    ///
    /// Format: oci://registry/repo:tag or registry/repo:tag
    pub fn parse_reference(reference: &str) -> Result<Reference> {
        let clean = reference
            .trim_start_matches("oci://")
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        Reference::try_from(clean).map_err(|e| RepoError::InvalidOciReference {
            reference: format!("{}: {}", reference, e),
        })
    }
}

/// Map a client error, keeping "not found" distinguishable
fn map_oci_error(reference: &str, e: OciDistributionError) -> RepoError {
    let error_str = e.to_string().to_lowercase();
    if error_str.contains("not found")
        || error_str.contains("manifest unknown")
        || error_str.contains("404")
    {
        RepoError::ImageNotFound {
            reference: reference.to_string(),
        }
    } else {
        RepoError::Transport {
            message: format!("{}: {}", reference, e),
        }
    }
}

#[async_trait]
impl RegistryClient for OciRegistry {
    async fn get_image_config(&self, reference: &str) -> Result<ImageConfig> {
        let oci_ref = Self::parse_reference(reference)?;
        let (_manifest, _digest, config) = self
            .client
            .pull_manifest_and_config(&oci_ref, &self.auth)
            .await
            .map_err(|e| map_oci_error(reference, e))?;

        ImageConfig::from_config_json(&config)
    }

    async fn pull_layer_by_digest(
        &self,
        reference: &str,
        media_type: &str,
        digest: &str,
    ) -> Result<Layer> {
        let oci_ref = Self::parse_reference(reference)?;
        self.client
            .auth(&oci_ref, &self.auth, RegistryOperation::Pull)
            .await
            .map_err(|e| map_oci_error(reference, e))?;

        let descriptor = OciDescriptor {
            media_type: media_type.to_string(),
            digest: digest.to_string(),
            size: 0,
            urls: None,
            annotations: None,
        };
        let mut data = Vec::new();
        self.client
            .pull_blob(&oci_ref, &descriptor, &mut data)
            .await
            .map_err(|e| map_oci_error(reference, e))?;

        tracing::debug!(reference, digest, size = data.len(), "Pulled blob");
        Ok(Layer::new(digest, media_type, data))
    }

    async fn pull_image(&self, reference: &str) -> Result<Vec<Layer>> {
        let oci_ref = Self::parse_reference(reference)?;
        let image = self
            .client
            .pull(&oci_ref, &self.auth, LAYER_MEDIA_TYPES.to_vec())
            .await
            .map_err(|e| map_oci_error(reference, e))?;

        tracing::debug!(reference, layers = image.layers.len(), "Pulled image");
        Ok(image
            .layers
            .into_iter()
            .map(|layer| Layer::from_blob(layer.media_type, layer.data))
            .collect())
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let oci_ref = Self::parse_reference(&format!("{}:latest", repository))?;

        let tags = self
            .client
            .list_tags(&oci_ref, &self.auth, None, None)
            .await
            .map_err(|e| map_oci_error(repository, e))?;

        Ok(tags.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        let r = OciRegistry::parse_reference("oci://ghcr.io/acme/pkg:1.0.0").unwrap();
        assert_eq!(r.registry(), "ghcr.io");
        assert_eq!(r.repository(), "acme/pkg");
        assert_eq!(r.tag(), Some("1.0.0"));

        let r = OciRegistry::parse_reference("localhost:5000/pkg@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855").unwrap();
        assert_eq!(r.registry(), "localhost:5000");
        assert!(r.digest().is_some());
    }

    #[test]
    fn test_parse_reference_invalid() {
        assert!(matches!(
            OciRegistry::parse_reference("UPPER/Case:tag"),
            Err(RepoError::InvalidOciReference { .. })
        ));
    }

    #[test]
    fn test_new_with_anonymous_config() {
        assert!(OciRegistry::new(&RegistryConfig::default()).is_ok());
    }
}
