//! Mock registry for testing
//!
//! Serves images, blobs and tag lists from memory, useful for unit tests
//! without a running registry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::client::{ImageConfig, RegistryClient};
use crate::error::{RepoError, Result};
use sealpack_core::Layer;

#[derive(Debug, Clone, Default)]
struct MockImage {
    config: ImageConfig,
    layers: Vec<Layer>,
}

#[derive(Debug, Default)]
struct MockState {
    images: HashMap<String, MockImage>,
    blobs: HashMap<String, Layer>,
    tags: HashMap<String, Vec<String>>,
    fail_config: bool,
    fail_pull: bool,
    fail_list_tags: bool,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub configs: usize,
    pub blob_pulls: usize,
    pub image_pulls: usize,
    pub list_tags: usize,
}

/// In-memory registry for testing
#[derive(Clone, Default)]
pub struct MockRegistry {
    state: Arc<RwLock<MockState>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MockRegistry {
    /// Create an empty mock registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image under a reference; its layers are also served as blobs
    pub fn with_image(self, reference: &str, config: ImageConfig, layers: Vec<Layer>) -> Self {
        {
            let mut state = write(&self.state);
            for layer in &layers {
                state.blobs.insert(layer.digest.clone(), layer.clone());
            }
            state
                .images
                .insert(reference.to_string(), MockImage { config, layers });
        }
        self
    }

    /// Register a blob that is not part of any image's layer list
    pub fn with_blob(self, layer: Layer) -> Self {
        write(&self.state).blobs.insert(layer.digest.clone(), layer);
        self
    }

    /// Register the tags of a repository
    pub fn with_tags(self, repository: &str, tags: &[&str]) -> Self {
        write(&self.state).tags.insert(
            repository.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Make config fetches fail with a transport error
    pub fn fail_config(&self, fail: bool) {
        write(&self.state).fail_config = fail;
    }

    /// Make blob and image pulls fail with a transport error
    pub fn fail_pull(&self, fail: bool) {
        write(&self.state).fail_pull = fail;
    }

    /// Make tag listing fail with a transport error
    pub fn fail_list_tags(&self, fail: bool) {
        write(&self.state).fail_list_tags = fail;
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        read(&self.operations).clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *write(&self.operations) = OperationCounts::default();
    }

    fn transport_error(operation: &str, reference: &str) -> RepoError {
        RepoError::Transport {
            message: format!("injected {} failure for {}", operation, reference),
        }
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn get_image_config(&self, reference: &str) -> Result<ImageConfig> {
        write(&self.operations).configs += 1;

        let state = read(&self.state);
        if state.fail_config {
            return Err(Self::transport_error("config", reference));
        }
        state
            .images
            .get(reference)
            .map(|image| image.config.clone())
            .ok_or_else(|| RepoError::ImageNotFound {
                reference: reference.to_string(),
            })
    }

    async fn pull_layer_by_digest(
        &self,
        reference: &str,
        _media_type: &str,
        digest: &str,
    ) -> Result<Layer> {
        write(&self.operations).blob_pulls += 1;

        let state = read(&self.state);
        if state.fail_pull {
            return Err(Self::transport_error("blob", reference));
        }
        state
            .blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| RepoError::ImageNotFound {
                reference: format!("{}@{}", reference, digest),
            })
    }

    async fn pull_image(&self, reference: &str) -> Result<Vec<Layer>> {
        write(&self.operations).image_pulls += 1;

        let state = read(&self.state);
        if state.fail_pull {
            return Err(Self::transport_error("pull", reference));
        }
        state
            .images
            .get(reference)
            .map(|image| image.layers.clone())
            .ok_or_else(|| RepoError::ImageNotFound {
                reference: reference.to_string(),
            })
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        write(&self.operations).list_tags += 1;

        let state = read(&self.state);
        if state.fail_list_tags {
            return Err(Self::transport_error("tag list", repository));
        }
        Ok(state.tags.get(repository).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_images() {
        let layer = Layer::from_blob("application/yaml", b"kind: A\n".to_vec());
        let registry = MockRegistry::new().with_image(
            "pkg:1.0.0",
            ImageConfig::default().with_label("a", "b"),
            vec![layer.clone()],
        );

        let config = registry.get_image_config("pkg:1.0.0").await.unwrap();
        assert_eq!(config.labels["a"], "b");
        assert_eq!(registry.pull_image("pkg:1.0.0").await.unwrap(), vec![layer.clone()]);
        assert_eq!(
            registry
                .pull_layer_by_digest("pkg:1.0.0", "application/yaml", &layer.digest)
                .await
                .unwrap(),
            layer
        );

        assert_eq!(
            registry.operation_counts(),
            OperationCounts {
                configs: 1,
                blob_pulls: 1,
                image_pulls: 1,
                list_tags: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_mock_missing_image() {
        let registry = MockRegistry::new();
        let err = registry.pull_image("nope:1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let registry = MockRegistry::new().with_tags("pkg", &["1.0.0"]);
        registry.fail_list_tags(true);
        assert!(matches!(
            registry.list_tags("pkg").await,
            Err(RepoError::Transport { .. })
        ));

        registry.fail_list_tags(false);
        registry.reset_counts();
        assert_eq!(registry.list_tags("pkg").await.unwrap(), vec!["1.0.0"]);
        assert_eq!(registry.operation_counts().list_tags, 1);
    }
}
