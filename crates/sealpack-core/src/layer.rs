//! Image layers
//!
//! A [`Layer`] is an opaque blob addressed by its digest. Layers pulled from a
//! registry are usually gzip-compressed tarballs, but base layers may carry a
//! raw document stream, so the compression is sniffed rather than trusted
//! from the media type.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read, Write};

use crate::error::Result;

/// Media types used for layers built locally
pub mod media_types {
    /// Docker v2 gzip layer (what `docker load` expects)
    pub const DOCKER_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compute the `sha256:<hex>` digest of a byte slice
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// One layer blob
#[derive(Clone, PartialEq, Eq)]
pub struct Layer {
    /// Content digest of the (possibly compressed) blob
    pub digest: String,
    pub media_type: String,
    data: Vec<u8>,
    diff_id: Option<String>,
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("digest", &self.digest)
            .field("media_type", &self.media_type)
            .field("size", &self.data.len())
            .finish()
    }
}

impl Layer {
    /// Wrap a blob received from a registry
    pub fn new(digest: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            digest: digest.into(),
            media_type: media_type.into(),
            data,
            diff_id: None,
        }
    }

    /// Wrap a blob, computing its digest
    pub fn from_blob(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        let digest = sha256_digest(&data);
        Self::new(digest, media_type, data)
    }

    /// Build a gzip-compressed layer from an uncompressed tar stream
    pub fn from_tar_bytes(tar: &[u8]) -> Result<Self> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(tar)?;
        let compressed = encoder.finish()?;

        let mut layer = Self::from_blob(media_types::DOCKER_LAYER_GZIP, compressed);
        layer.diff_id = Some(sha256_digest(tar));
        Ok(layer)
    }

    /// Raw blob bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_gzip(&self) -> bool {
        self.data.starts_with(&GZIP_MAGIC)
    }

    /// Reader over the decompressed content
    pub fn uncompressed(&self) -> Box<dyn Read + '_> {
        if self.is_gzip() {
            Box::new(GzDecoder::new(Cursor::new(self.data.as_slice())))
        } else {
            Box::new(Cursor::new(self.data.as_slice()))
        }
    }

    /// Digest of the decompressed content
    pub fn diff_id(&self) -> Result<String> {
        if let Some(diff_id) = &self.diff_id {
            return Ok(diff_id.clone());
        }
        let mut hasher = Sha256::new();
        std::io::copy(&mut self.uncompressed(), &mut hasher)?;
        Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_digest() {
        assert_eq!(
            sha256_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_from_tar_bytes_compresses() {
        let layer = Layer::from_tar_bytes(b"plain tar bytes").unwrap();
        assert!(layer.is_gzip());
        assert_eq!(layer.media_type, media_types::DOCKER_LAYER_GZIP);
        assert_eq!(layer.digest, sha256_digest(layer.data()));
        assert_eq!(layer.diff_id().unwrap(), sha256_digest(b"plain tar bytes"));

        let mut out = Vec::new();
        layer.uncompressed().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"plain tar bytes");
    }

    #[test]
    fn test_uncompressed_passthrough() {
        let layer = Layer::from_blob("application/yaml", b"kind: A\n".to_vec());
        assert!(!layer.is_gzip());
        let mut out = String::new();
        layer.uncompressed().read_to_string(&mut out).unwrap();
        assert_eq!(out, "kind: A\n");
        assert_eq!(layer.diff_id().unwrap(), sha256_digest(b"kind: A\n"));
    }
}
