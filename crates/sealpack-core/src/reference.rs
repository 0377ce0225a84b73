//! Package references
//!
//! A package is named by one of three forms:
//!
//! - **digest-pinned**: `registry/name@sha256:...`
//! - **exact tag**: `registry/name:v1.2.3` or `registry/name:latest`
//! - **constrained**: `registry/name:^1.2` (a semver requirement)
//!
//! Only the constrained form needs a registry round-trip to become pullable.

use semver::{Version, VersionReq};

/// The form a package reference takes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `name@digest`: authoritative, never re-resolved
    Digest { name: String, digest: String },
    /// `name:tag` where the tag is a literal
    Tag { name: String, tag: String },
    /// `name:<constraint>`
    Constraint { name: String, requirement: VersionReq },
    /// No tag or digest at all
    Bare { name: String },
}

/// A package reference as received, classified by form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReference {
    raw: String,
    kind: ReferenceKind,
}

impl PackageReference {
    /// Classify a reference string
    ///
    /// Digests win over everything after the `@`. Otherwise the tag is
    /// whatever follows the last `:`; a `:` inside a registry host (port)
    /// leaves a `/` in the candidate tag and is not treated as a tag.
    pub fn parse(reference: &str) -> Self {
        let raw = reference.trim().to_string();

        let kind = if let Some((name, digest)) = raw.split_once('@') {
            ReferenceKind::Digest {
                name: name.to_string(),
                digest: digest.to_string(),
            }
        } else if let Some((name, tag)) = raw.rsplit_once(':').filter(|(_, t)| !t.contains('/')) {
            match parse_constraint(tag) {
                Some(requirement) => ReferenceKind::Constraint {
                    name: name.to_string(),
                    requirement,
                },
                None => ReferenceKind::Tag {
                    name: name.to_string(),
                    tag: tag.to_string(),
                },
            }
        } else {
            ReferenceKind::Bare { name: raw.clone() }
        };

        Self { raw, kind }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> &ReferenceKind {
        &self.kind
    }

    /// Repository part (everything before the tag or digest)
    pub fn name(&self) -> &str {
        match &self.kind {
            ReferenceKind::Digest { name, .. }
            | ReferenceKind::Tag { name, .. }
            | ReferenceKind::Constraint { name, .. }
            | ReferenceKind::Bare { name } => name,
        }
    }

    /// Whether the reference can be pulled as-is
    pub fn is_pinned(&self) -> bool {
        !matches!(self.kind, ReferenceKind::Constraint { .. })
    }
}

impl std::fmt::Display for PackageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A reference that is safe to pull: digest-pinned, exact-tag or bare
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedReference(String);

impl ResolvedReference {
    /// Accept an already pinned reference
    ///
    /// Digest references keep their `@<digest>` suffix: the name alone would
    /// pull whatever the registry currently serves, losing the pin. Returns
    /// `None` for constrained references, which need resolution.
    pub fn pinned(reference: &PackageReference) -> Option<Self> {
        reference
            .is_pinned()
            .then(|| Self(reference.as_str().to_string()))
    }

    /// Combine a repository name with a concrete tag
    pub fn with_tag(name: &str, tag: &str) -> Self {
        Self(format!("{}:{}", name, tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResolvedReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResolvedReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parse a registry tag as a semver version, accepting a leading `v`
pub fn parse_tag_version(tag: &str) -> Option<Version> {
    let trimmed = tag.strip_prefix('v').unwrap_or(tag);
    Version::parse(trimmed).ok()
}

/// Parse a tag as a version constraint
///
/// A tag that is already a complete version is a literal tag, not a
/// constraint: `1.2.3` must pull exactly `1.2.3`.
fn parse_constraint(tag: &str) -> Option<VersionReq> {
    if tag.is_empty() || parse_tag_version(tag).is_some() {
        return None;
    }
    VersionReq::parse(tag).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_reference() {
        let r = PackageReference::parse("ghcr.io/acme/pkg@sha256:abc123");
        assert_eq!(
            r.kind(),
            &ReferenceKind::Digest {
                name: "ghcr.io/acme/pkg".to_string(),
                digest: "sha256:abc123".to_string(),
            }
        );
        assert!(r.is_pinned());
        assert_eq!(
            ResolvedReference::pinned(&r).unwrap().as_str(),
            "ghcr.io/acme/pkg@sha256:abc123"
        );
    }

    #[test]
    fn test_digest_wins_over_constraint() {
        let r = PackageReference::parse("pkg:^1.0@sha256:abc");
        assert!(matches!(r.kind(), ReferenceKind::Digest { .. }));
        assert_eq!(r.name(), "pkg:^1.0");
    }

    #[test]
    fn test_exact_tags() {
        for reference in ["pkg:v1.2.3", "pkg:1.2.3", "pkg:latest", "pkg:stable-2024"] {
            let r = PackageReference::parse(reference);
            assert!(
                matches!(r.kind(), ReferenceKind::Tag { .. }),
                "{} should be an exact tag",
                reference
            );
        }
    }

    #[test]
    fn test_constraints() {
        for reference in ["pkg:^1.2.0", "pkg:~1.2", "pkg:>=1.0, <2.0", "pkg:1.x"] {
            let r = PackageReference::parse(reference);
            assert!(
                matches!(r.kind(), ReferenceKind::Constraint { .. }),
                "{} should be a constraint",
                reference
            );
            assert_eq!(r.name(), "pkg");
            assert!(!r.is_pinned());
        }
    }

    #[test]
    fn test_registry_port_is_not_a_tag() {
        let r = PackageReference::parse("localhost:5000/acme/pkg");
        assert_eq!(
            r.kind(),
            &ReferenceKind::Bare {
                name: "localhost:5000/acme/pkg".to_string()
            }
        );

        let r = PackageReference::parse("localhost:5000/acme/pkg:^2");
        assert_eq!(r.name(), "localhost:5000/acme/pkg");
        assert!(matches!(r.kind(), ReferenceKind::Constraint { .. }));
    }

    #[test]
    fn test_parse_tag_version() {
        assert_eq!(parse_tag_version("v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_tag_version("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_tag_version("latest"), None);
        assert_eq!(parse_tag_version("1.2"), None);
    }

    #[test]
    fn test_resolved_reference() {
        let r = PackageReference::parse("pkg:1.0.0");
        assert_eq!(ResolvedReference::pinned(&r).unwrap().as_str(), "pkg:1.0.0");

        let c = PackageReference::parse("pkg:^1");
        assert!(ResolvedReference::pinned(&c).is_none());
        assert_eq!(ResolvedReference::with_tag("pkg", "1.4.0").to_string(), "pkg:1.4.0");
    }
}
