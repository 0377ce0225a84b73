//! Sealpack Core - Shared types for the sealed package pipeline
//!
//! This crate holds everything that does not talk to a registry:
//! - `PackageReference`: digest, exact-tag and constrained references
//! - `Layer`: an image layer blob with digest bookkeeping
//! - `KeyStore`: per-user secret lookup
//! - `SecretsDecryptor`: RSA-OAEP unwrapping of event secrets
//! - `decrypt_document`: AES-GCM document decryption with plaintext fallback
//! - `extract_layers` / `extract_base_layer`: sandboxed layer extraction
//! - `parse_document`: fault-tolerant multi-document parsing

pub mod archive;
pub mod collect;
pub mod crypto;
pub mod document;
pub mod error;
pub mod keystore;
pub mod layer;
pub mod reference;

pub use archive::{
    ExtractOptions, extract_base_layer, extract_layers, extract_layers_until, single_file_tar,
};
pub use collect::{Collected, ExtractionError, ExtractionErrorKind};
pub use crypto::{SecretIdentity, SecretsDecryptor, decode_content_key, decrypt_document};
pub use document::{
    DecryptOutcome, DecryptedDocument, ExtractedDocument, ParsedSchema, parse_document,
    parse_documents,
};
pub use error::{CoreError, Result};
pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use layer::{Layer, sha256_digest};
pub use reference::{PackageReference, ReferenceKind, ResolvedReference, parse_tag_version};
