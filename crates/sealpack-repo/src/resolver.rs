//! Reference resolution
//!
//! Turns a possibly constrained reference into one that can be pulled:
//!
//! - digest-pinned and exact-tag references are returned as received
//! - `name:<constraint>` lists the repository tags and picks the highest
//!   version satisfying the constraint
//!
//! Tags that are not semver versions (`latest`, `stable`) never match a
//! constraint.

use semver::Version;

use crate::client::RegistryClient;
use crate::error::{RepoError, Result};
use sealpack_core::reference::parse_tag_version;
use sealpack_core::{PackageReference, ReferenceKind, ResolvedReference};

/// Resolves references against a registry
pub struct ReferenceResolver<'a> {
    registry: &'a dyn RegistryClient,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(registry: &'a dyn RegistryClient) -> Self {
        Self { registry }
    }

    /// Resolve a raw reference string
    pub async fn resolve(&self, reference: &str) -> Result<ResolvedReference> {
        let parsed = PackageReference::parse(reference);
        if parsed.as_str().is_empty() {
            return Err(RepoError::ResolutionFailed {
                message: "empty reference".to_string(),
            });
        }
        self.resolve_parsed(&parsed).await
    }

    /// Resolve an already classified reference
    pub async fn resolve_parsed(&self, reference: &PackageReference) -> Result<ResolvedReference> {
        if let Some(pinned) = ResolvedReference::pinned(reference) {
            tracing::debug!(reference = %pinned, "Reference already pinned");
            return Ok(pinned);
        }

        let ReferenceKind::Constraint { name, requirement } = reference.kind() else {
            return Err(RepoError::ResolutionFailed {
                message: format!("cannot resolve {}", reference),
            });
        };

        let tags = self
            .registry
            .list_tags(name)
            .await
            .map_err(|e| RepoError::ResolutionFailed {
                message: format!("failed to list tags for {}: {}", name, e),
            })?;

        let mut candidates: Vec<(Version, String)> = tags
            .into_iter()
            .filter_map(|tag| parse_tag_version(&tag).map(|version| (version, tag)))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let chosen = candidates
            .iter()
            .find(|(version, _)| requirement.matches(version))
            .ok_or_else(|| RepoError::NoMatchingVersion {
                reference: name.clone(),
                constraint: requirement.to_string(),
                available: if candidates.is_empty() {
                    "none".to_string()
                } else {
                    candidates
                        .iter()
                        .map(|(_, tag)| tag.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            })?;

        let resolved = ResolvedReference::with_tag(name, &chosen.1);
        tracing::info!(
            reference = %reference,
            resolved = %resolved,
            "Resolved version constraint"
        );
        Ok(resolved)
    }
}
