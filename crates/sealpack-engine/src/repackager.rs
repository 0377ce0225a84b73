//! Repackaging parsed manifests into a loadable image
//!
//! Every schema is rendered back to YAML and joined into one `package.yaml`,
//! which becomes the single file of the single layer of an otherwise empty
//! image. The image is written as a docker-archive tarball.

use crate::error::Result;
use sealpack_core::archive::{PACKAGE_FILE, single_file_tar};
use sealpack_core::{Layer, ParsedSchema};
use sealpack_repo::{Image, ImageTag, write_image_tarball};

/// A finished docker-archive tarball
#[derive(Debug, Clone)]
pub struct RepackagedArchive {
    pub tag: ImageTag,
    /// Digest of the compressed package layer
    pub layer_digest: String,
    /// Number of documents in `package.yaml`
    pub documents: usize,
    pub data: Vec<u8>,
}

/// Render schemas as one multi-document YAML stream
pub fn render_documents(schemas: &[ParsedSchema]) -> Result<String> {
    let rendered = schemas
        .iter()
        .map(serde_yaml::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rendered.join("---\n"))
}

/// Repackage schemas under `target`
pub fn repackage(schemas: &[ParsedSchema], target: &str) -> Result<RepackagedArchive> {
    let tag = ImageTag::parse(target)?;
    repackage_tagged(schemas, tag)
}

/// Repackage schemas under an already parsed tag
pub fn repackage_tagged(schemas: &[ParsedSchema], tag: ImageTag) -> Result<RepackagedArchive> {
    let package = render_documents(schemas)?;
    let tar = single_file_tar(PACKAGE_FILE, package.as_bytes())?;
    let layer = Layer::from_tar_bytes(&tar)?;
    let layer_digest = layer.digest.clone();

    let image = Image::empty().append_layer(layer);
    let data = write_image_tarball(&tag, &image)?;

    tracing::info!(
        tag = %tag,
        documents = schemas.len(),
        layer = %layer_digest,
        size = data.len(),
        "Repackaged"
    );

    Ok(RepackagedArchive {
        tag,
        layer_digest,
        documents: schemas.len(),
        data,
    })
}
