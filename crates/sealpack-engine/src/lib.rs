//! Sealpack Engine - Sealed package pipeline
//!
//! This crate turns a [`PackageEvent`] into a loaded docker-archive image:
//! - Unwraps the package reference and content key with the operator's key
//! - Acquires the package layers (base-layer fast path or full pull)
//! - Extracts, decrypts and parses the package documents
//! - Repackages the parsed manifests under the target tag
//! - Hands the archive to a [`Loader`]
//!
//! Recoverable problems along the way are collected into the
//! [`PipelineReport`] instead of failing the run.

pub mod config;
pub mod error;
pub mod event;
pub mod loader;
pub mod locks;
pub mod pipeline;
pub mod repackager;

pub use config::PipelineConfig;
pub use error::{EngineError, PipelineFailure, PipelineStage, Result};
pub use event::PackageEvent;
pub use loader::{DirectoryLoader, LoadedArchive, Loader, RecordingLoader};
pub use locks::TagLocks;
pub use pipeline::{AcquisitionPath, Pipeline, PipelineReport};
pub use repackager::{RepackagedArchive, render_documents, repackage};
