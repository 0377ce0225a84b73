//! Local images and docker-archive tarballs
//!
//! Repackaged packages are written as a `docker save` style archive so they
//! can be loaded into any container runtime:
//!
//! ```text
//! manifest.json          [{"Config": ..., "RepoTags": [...], "Layers": [...]}]
//! sha256:<hex>           image config blob
//! <hex>.tar.gz           one entry per layer
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tar::Builder;

use crate::error::{RepoError, Result};
use sealpack_core::archive::{add_bytes_to_archive, list_tar, read_tar_file};
use sealpack_core::layer::media_types;
use sealpack_core::{Layer, sha256_digest};

/// Default tag when none is given
pub const DEFAULT_TAG: &str = "latest";

/// Repository path: optional `host[:port]/` followed by lowercase components
static REPOSITORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*(?::[0-9]+)?/)?[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*$",
    )
    .expect("valid repository regex")
});

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid tag regex"));

/// A `repository:tag` image name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageTag {
    pub repository: String,
    pub tag: String,
}

impl ImageTag {
    /// Parse `repository[:tag]`, defaulting the tag to `latest`
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: &str| RepoError::InvalidTag {
            tag: value.to_string(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(invalid("empty name"));
        }
        if value.contains('@') {
            return Err(invalid("digest references cannot be used as a target"));
        }

        let (repository, tag) = match value.rsplit_once(':') {
            Some((repository, tag)) if !tag.contains('/') => (repository, tag),
            _ => (value, DEFAULT_TAG),
        };

        if !REPOSITORY_RE.is_match(repository) {
            return Err(invalid("malformed repository name"));
        }
        if !TAG_RE.is_match(tag) {
            return Err(invalid("malformed tag"));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl std::fmt::Display for ImageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

impl std::str::FromStr for ImageTag {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// An image built locally from layers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    layers: Vec<Layer>,
}

impl Image {
    /// An image with no layers
    pub fn empty() -> Self {
        Self::default()
    }

    /// Return a new image with `layer` on top
    pub fn append_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Image configuration blob
    fn config(&self) -> Result<ImageConfigFile> {
        let diff_ids = self
            .layers
            .iter()
            .map(|layer| layer.diff_id())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ImageConfigFile {
            architecture: "amd64".to_string(),
            os: "linux".to_string(),
            config: serde_json::Map::new(),
            rootfs: RootFs {
                kind: "layers".to_string(),
                diff_ids,
            },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageConfigFile {
    architecture: String,
    os: String,
    config: serde_json::Map<String, serde_json::Value>,
    rootfs: RootFs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RootFs {
    #[serde(rename = "type")]
    kind: String,
    diff_ids: Vec<String>,
}

/// One entry of a docker-archive `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestEntry {
    pub config: String,
    pub repo_tags: Vec<String>,
    pub layers: Vec<String>,
}

/// File name of a layer blob inside the archive
fn layer_file_name(layer: &Layer) -> String {
    let hex = layer.digest.strip_prefix("sha256:").unwrap_or(&layer.digest);
    format!("{}.tar.gz", hex)
}

/// Write `image` as a docker-archive tarball tagged `tag`
pub fn write_image_tarball(tag: &ImageTag, image: &Image) -> Result<Vec<u8>> {
    let config = serde_json::to_vec(&image.config()?)?;
    let config_name = sha256_digest(&config);

    let manifest = vec![ManifestEntry {
        config: config_name.clone(),
        repo_tags: vec![tag.to_string()],
        layers: image.layers.iter().map(layer_file_name).collect(),
    }];
    let manifest = serde_json::to_vec(&manifest)?;

    let mut builder = Builder::new(Vec::new());
    add_bytes_to_archive(&mut builder, &config_name, &config)?;
    for layer in &image.layers {
        add_bytes_to_archive(&mut builder, &layer_file_name(layer), layer.data())?;
    }
    add_bytes_to_archive(&mut builder, "manifest.json", &manifest)?;

    let data = builder.into_inner()?;
    tracing::debug!(
        tag = %tag,
        layers = image.layers.len(),
        size = data.len(),
        "Wrote image tarball"
    );
    Ok(data)
}

/// A docker-archive tarball read back into memory
#[derive(Debug, Clone)]
pub struct ImageArchive {
    pub manifest: ManifestEntry,
    pub image: Image,
}

/// Read the first image of a docker-archive tarball
pub fn read_image_tarball(data: &[u8]) -> Result<ImageArchive> {
    let manifest_bytes = read_tar_file(data, "manifest.json")?;
    let manifests: Vec<ManifestEntry> = serde_json::from_slice(&manifest_bytes)?;
    let manifest = manifests
        .into_iter()
        .next()
        .ok_or_else(|| RepoError::InvalidImage {
            message: "manifest.json lists no images".to_string(),
        })?;

    let entries = list_tar(data)?;
    if !entries.iter().any(|e| e.path == manifest.config) {
        return Err(RepoError::InvalidImage {
            message: format!("config blob {} missing", manifest.config),
        });
    }

    let mut image = Image::empty();
    for name in &manifest.layers {
        let blob = read_tar_file(data, name)?;
        image = image.append_layer(Layer::from_blob(media_types::DOCKER_LAYER_GZIP, blob));
    }

    Ok(ImageArchive { manifest, image })
}
