//! Sealpack Registry Access
//!
//! This crate provides everything the pipeline needs from an OCI registry:
//!
//! - **Resolution**: semver constraints (`pkg:^1.2`) resolved against tag lists
//! - **Acquisition**: base-layer fast path with a full-image fallback
//! - **Images**: docker-archive tarballs for repackaged packages
//!
//! ## Example
//!
//! ```rust,no_run
//! use sealpack_repo::{LayerAcquirer, OciRegistry, RegistryConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = OciRegistry::new(&RegistryConfig::default())?;
//! let (resolved, acquired) = LayerAcquirer::new(&registry)
//!     .acquire("ghcr.io/acme/package:^1.2")
//!     .await?;
//! println!("{} -> {} layer(s)", resolved, acquired.layer_count());
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod client;
pub mod config;
pub mod error;
pub mod image;
pub mod mock;
pub mod oci;
pub mod resolver;

// Re-exports for convenience
pub use acquire::{Acquired, BaseLayerLabel, LayerAcquirer, DEFAULT_BASE_LABEL_VALUE};
pub use client::{ImageConfig, RegistryClient};
pub use config::{Credentials, Protocol, RegistryConfig};
pub use error::{RepoError, Result};
pub use image::{Image, ImageArchive, ImageTag, ManifestEntry, read_image_tarball, write_image_tarball};
pub use mock::{MockRegistry, OperationCounts};
pub use oci::OciRegistry;
pub use resolver::ReferenceResolver;
