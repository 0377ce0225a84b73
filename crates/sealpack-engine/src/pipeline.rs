//! Pipeline orchestration
//!
//! One [`Pipeline::run`] call processes one [`PackageEvent`]:
//!
//! ```text
//! DecryptingSecrets -> AcquiringLayers -> Extracting -> DecryptingContent
//!     -> Repackaging -> Loading -> Done
//! ```
//!
//! Secret decryption, acquisition, repackaging and loading failures end the
//! run. Extraction and per-document failures are collected and reported
//! beside the result; whatever parsed successfully is still repackaged.
//!
//! Every await point honours the run deadline and the caller's
//! cancellation token.

use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::{EngineError, PipelineFailure, PipelineStage};
use crate::event::PackageEvent;
use crate::loader::Loader;
use crate::locks::TagLocks;
use crate::repackager::{RepackagedArchive, repackage_tagged};
use sealpack_core::archive::{ExtractOptions, extract_base_layer, extract_layers_until};
use sealpack_core::crypto::{SecretsDecryptor, decode_content_key, decrypt_document};
use sealpack_core::document::{ExtractedDocument, parse_documents};
use sealpack_core::{Collected, ExtractionError, ExtractionErrorKind, KeyStore, ResolvedReference};
use sealpack_repo::{Acquired, ImageTag, LayerAcquirer, RegistryClient};

/// Which acquisition path a run took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionPath {
    BaseLayer,
    FullImage,
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub reference: ResolvedReference,
    pub target: ImageTag,
    pub acquisition: AcquisitionPath,
    pub layers: usize,
    /// Documents found in the layers
    pub documents: usize,
    /// Documents used as-is after a failed decryption
    pub fallbacks: usize,
    /// Schemas written to the repackaged archive
    pub schemas: usize,
    pub archive_digest: String,
    pub archive_size: usize,
    /// Recoverable problems met along the way
    pub errors: Vec<ExtractionError>,
}

impl PipelineReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Runs package events end to end
#[derive(Clone)]
pub struct Pipeline {
    key_store: Arc<dyn KeyStore>,
    registry: Arc<dyn RegistryClient>,
    loader: Arc<dyn Loader>,
    config: PipelineConfig,
    locks: Arc<TagLocks>,
}

impl Pipeline {
    pub fn new(
        key_store: Arc<dyn KeyStore>,
        registry: Arc<dyn RegistryClient>,
        loader: Arc<dyn Loader>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            key_store,
            registry,
            loader,
            config,
            locks: Arc::new(TagLocks::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one event
    pub async fn run(
        &self,
        event: &PackageEvent,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport, PipelineFailure> {
        let guard = Guard {
            deadline: Instant::now() + self.config.timeout,
            timeout: self.config.timeout,
            cancel,
        };

        // Decrypting secrets
        let stage = PipelineStage::DecryptingSecrets;
        guard.check(stage)?;
        let (reference, content_key) = self
            .decrypt_secrets(event)
            .map_err(|e| PipelineFailure::new(stage, e))?;
        tracing::info!(%stage, tag = %event.target, "Decrypted event secrets");

        // Acquiring layers
        let stage = PipelineStage::AcquiringLayers;
        let acquirer = LayerAcquirer::new(self.registry.as_ref())
            .with_base_label_value(&self.config.base_label_value);
        let (resolved, acquired) = guard
            .run(stage, async {
                acquirer.acquire(&reference).await.map_err(EngineError::from)
            })
            .await?;
        let acquisition = if acquired.is_base() {
            AcquisitionPath::BaseLayer
        } else {
            AcquisitionPath::FullImage
        };
        let layers = acquired.layer_count();
        tracing::info!(%stage, reference = %resolved, ?acquisition, layers, "Acquired layers");

        // Extracting; leaving the run early stops the blocking extraction
        let stage = PipelineStage::Extracting;
        let options = self.config.extract_options();
        let stop = cancel.child_token();
        let _stop_on_exit = stop.clone().drop_guard();
        let extracted = guard
            .run(stage, async move {
                tokio::task::spawn_blocking(move || extract(acquired, &options, &stop))
                    .await
                    .map_err(|e| EngineError::Task {
                        message: e.to_string(),
                    })
            })
            .await?;
        let (documents, mut errors) = extracted.into_parts();
        tracing::info!(%stage, documents = documents.len(), errors = errors.len(), "Extracted documents");

        // Decrypting content and parsing
        let stage = PipelineStage::DecryptingContent;
        guard.check(stage)?;
        let decrypted: Vec<_> = documents
            .iter()
            .map(|document| decrypt_document(document, &content_key))
            .collect();
        let fallbacks = decrypted.iter().filter(|d| d.is_fallback()).count();
        let (schemas, parse_errors) = parse_documents(&decrypted).into_parts();
        errors.extend(parse_errors);
        tracing::info!(
            %stage,
            schemas = schemas.len(),
            fallbacks,
            errors = errors.len(),
            "Parsed documents"
        );

        // Repackaging, serialized per target tag through loading
        let stage = PipelineStage::Repackaging;
        let target = ImageTag::parse(&event.target).map_err(|e| PipelineFailure::new(stage, e))?;
        let _tag_guard = guard
            .run(stage, async {
                Ok::<_, EngineError>(self.locks.lock(&target.to_string()).await)
            })
            .await?;
        let archive: RepackagedArchive = repackage_tagged(&schemas, target.clone())
            .map_err(|e| PipelineFailure::new(stage, e))?;

        // Loading
        let stage = PipelineStage::Loading;
        let name = archive.tag.to_string();
        guard
            .run(stage, async {
                self.loader.load_from_archive_stream(&name, &archive.data).await?;
                self.loader.apply(&name).await
            })
            .await?;

        let report = PipelineReport {
            reference: resolved,
            target,
            acquisition,
            layers,
            documents: documents.len(),
            fallbacks,
            schemas: schemas.len(),
            archive_digest: archive.layer_digest,
            archive_size: archive.data.len(),
            errors,
        };
        tracing::info!(
            stage = %PipelineStage::Done,
            tag = %report.target,
            schemas = report.schemas,
            soft_errors = report.errors.len(),
            "Pipeline finished"
        );
        Ok(report)
    }

    /// Unwrap the package reference and the content key
    fn decrypt_secrets(&self, event: &PackageEvent) -> Result<(String, Vec<u8>), EngineError> {
        let decryptor = SecretsDecryptor::new(self.key_store.clone(), self.config.identity());

        let reference = decryptor
            .decrypt(&event.encrypted_reference)
            .map_err(|source| EngineError::Secret {
                secret: "package reference",
                source,
            })?;
        let key = decryptor
            .decrypt(&event.encrypted_key)
            .and_then(|encoded| decode_content_key(&encoded))
            .map_err(|source| EngineError::Secret {
                secret: "content key",
                source,
            })?;

        Ok((reference.trim().to_string(), key))
    }
}

/// Extract documents from acquired layers
///
/// A sandbox that cannot be set up is reported as a single soft error so the
/// run still produces an (empty) archive.
fn extract(
    acquired: Acquired,
    options: &ExtractOptions,
    stop: &CancellationToken,
) -> Collected<ExtractedDocument> {
    match acquired {
        Acquired::Base(layer) => extract_base_layer(&layer, options),
        Acquired::Full(layers) => extract_layers_until(&layers, options, || stop.is_cancelled())
            .unwrap_or_else(|e| {
                let mut collected = Collected::new();
                collected.push_error(ExtractionError::new(
                    ExtractionErrorKind::CorruptLayer,
                    "sandbox",
                    e.to_string(),
                ));
                collected
            }),
    }
}

/// Deadline and cancellation applied to every stage
struct Guard<'a> {
    deadline: Instant,
    timeout: std::time::Duration,
    cancel: &'a CancellationToken,
}

impl Guard<'_> {
    /// Fail fast if the run is already cancelled or overdue
    fn check(&self, stage: PipelineStage) -> Result<(), PipelineFailure> {
        if self.cancel.is_cancelled() {
            return Err(PipelineFailure::new(stage, EngineError::Cancelled));
        }
        if Instant::now() >= self.deadline {
            return Err(PipelineFailure::new(stage, EngineError::Timeout(self.timeout)));
        }
        Ok(())
    }

    /// Drive `future` unless cancellation or the deadline comes first
    async fn run<T, F>(&self, stage: PipelineStage, future: F) -> Result<T, PipelineFailure>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        self.check(stage)?;
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            result = tokio::time::timeout_at(self.deadline, future) => match result {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout(self.timeout)),
            },
        };

        outcome.map_err(|error| {
            tracing::warn!(%stage, %error, "Pipeline stage failed");
            PipelineFailure::new(stage, error)
        })
    }
}
