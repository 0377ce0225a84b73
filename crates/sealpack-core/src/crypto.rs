//! Layered package cryptography
//!
//! Two layers protect a package:
//!
//! - **Control secrets** (the package reference and the content key) are
//!   RSA-OAEP (SHA-256) encrypted to a key held in the local [`KeyStore`].
//!   Any failure here is fatal.
//! - **Document content** is AES-256-GCM encrypted with the content key, the
//!   12-byte nonce prepended to the ciphertext, all base64 encoded. Failure
//!   here is *not* fatal: the document falls back to its sanitized bytes.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use openssl::md::Md;
use openssl::pkey::{Id, PKey, Private};
use openssl::pkey_ctx::PkeyCtx;
use openssl::rsa::{Padding, Rsa};
use std::sync::Arc;

use crate::document::{DecryptOutcome, DecryptedDocument, ExtractedDocument};
use crate::error::{CoreError, Result};
use crate::keystore::KeyStore;

/// AES-GCM standard nonce size
pub const NONCE_SIZE: usize = 12;

/// AES-256 key size
pub const KEY_SIZE: usize = 32;

/// Identity of the private key in the key store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretIdentity {
    pub service: String,
    pub user: String,
}

impl SecretIdentity {
    pub fn new(service: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            user: user.into(),
        }
    }
}

impl std::fmt::Display for SecretIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service, self.user)
    }
}

/// Decrypts short RSA-OAEP protected strings
pub struct SecretsDecryptor {
    store: Arc<dyn KeyStore>,
    identity: SecretIdentity,
}

impl SecretsDecryptor {
    pub fn new(store: Arc<dyn KeyStore>, identity: SecretIdentity) -> Self {
        Self { store, identity }
    }

    pub fn identity(&self) -> &SecretIdentity {
        &self.identity
    }

    /// Decrypt a base64 ciphertext to a UTF-8 string
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let plaintext = self.decrypt_bytes(ciphertext)?;
        String::from_utf8(plaintext).map_err(|e| CoreError::InvalidEncoding {
            message: format!("decrypted secret is not UTF-8: {}", e),
        })
    }

    /// Decrypt a base64 ciphertext to raw bytes
    pub fn decrypt_bytes(&self, ciphertext: &str) -> Result<Vec<u8>> {
        let pem = self
            .store
            .get_secret(&self.identity.service, &self.identity.user)?;
        let key = parse_private_key(&pem)?;

        let encrypted = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CoreError::InvalidEncoding {
                message: format!("ciphertext is not valid base64: {}", e),
            })?;

        rsa_oaep_decrypt(&key, &encrypted)
    }
}

/// Decode the base64 content key carried in a decrypted control secret
pub fn decode_content_key(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| CoreError::InvalidEncoding {
            message: format!("content key is not valid base64: {}", e),
        })
}

/// Parse a PEM private key (PKCS#8 or PKCS#1), which must hold an RSA key
pub fn parse_private_key(pem: &str) -> Result<PKey<Private>> {
    if !pem.contains("-----BEGIN ") {
        return Err(CoreError::InvalidKeyFormat {
            message: "no PEM block found".to_string(),
        });
    }

    let key = PKey::private_key_from_pem(pem.as_bytes()).map_err(|e| {
        CoreError::UnsupportedKeyFormat {
            message: format!("key is neither PKCS#8 nor PKCS#1: {}", e),
        }
    })?;

    if key.id() != Id::RSA {
        return Err(CoreError::UnsupportedKeyFormat {
            message: format!("private key is not an RSA key ({:?})", key.id()),
        });
    }
    Ok(key)
}

fn rsa_oaep_decrypt(key: &PKey<Private>, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let failed = |e: openssl::error::ErrorStack| CoreError::DecryptionFailed {
        message: e.to_string(),
    };

    let mut ctx = PkeyCtx::new(key).map_err(failed)?;
    ctx.decrypt_init().map_err(failed)?;
    ctx.set_rsa_padding(Padding::PKCS1_OAEP).map_err(failed)?;
    ctx.set_rsa_oaep_md(Md::sha256()).map_err(failed)?;
    ctx.set_rsa_mgf1_md(Md::sha256()).map_err(failed)?;

    let mut plaintext = Vec::new();
    ctx.decrypt_to_vec(ciphertext, &mut plaintext)
        .map_err(failed)?;
    Ok(plaintext)
}

/// RSA-OAEP (SHA-256) encrypt `plaintext` to a PEM public key, base64 encoded
///
/// The counterpart of [`SecretsDecryptor::decrypt`], used to seal events.
pub fn encrypt_secret(public_key_pem: &str, plaintext: &[u8]) -> Result<String> {
    let failed = |e: openssl::error::ErrorStack| CoreError::InvalidKeyFormat {
        message: e.to_string(),
    };

    let key = PKey::public_key_from_pem(public_key_pem.as_bytes()).map_err(failed)?;
    let mut ctx = PkeyCtx::new(&key).map_err(failed)?;
    ctx.encrypt_init().map_err(failed)?;
    ctx.set_rsa_padding(Padding::PKCS1_OAEP).map_err(failed)?;
    ctx.set_rsa_oaep_md(Md::sha256()).map_err(failed)?;
    ctx.set_rsa_mgf1_md(Md::sha256()).map_err(failed)?;

    let mut ciphertext = Vec::new();
    ctx.encrypt_to_vec(plaintext, &mut ciphertext)
        .map_err(failed)?;
    Ok(STANDARD.encode(ciphertext))
}

/// A freshly generated RSA key pair in PEM form
#[derive(Debug, Clone)]
pub struct GeneratedKeyPair {
    /// PKCS#8 private key
    pub private_pem: String,
    /// SubjectPublicKeyInfo public key
    pub public_pem: String,
}

/// Generate an RSA key pair for the key store
pub fn generate_key_pair(bits: u32) -> Result<GeneratedKeyPair> {
    let failed = |e: openssl::error::ErrorStack| CoreError::KeyStore {
        message: format!("key generation failed: {}", e),
    };

    let rsa = Rsa::generate(bits).map_err(failed)?;
    let key = PKey::from_rsa(rsa).map_err(failed)?;
    let private_pem = key.private_key_to_pem_pkcs8().map_err(failed)?;
    let public_pem = key.public_key_to_pem().map_err(failed)?;

    Ok(GeneratedKeyPair {
        private_pem: String::from_utf8_lossy(&private_pem).into_owned(),
        public_pem: String::from_utf8_lossy(&public_pem).into_owned(),
    })
}

/// Generate a random AES-256 content key
pub fn generate_content_key() -> Vec<u8> {
    Aes256Gcm::generate_key(&mut OsRng).to_vec()
}

/// Remove control bytes left behind by the packaging format
///
/// Line breaks and tabs are kept: the sanitized form doubles as the
/// plaintext fallback and must stay parseable as YAML.
pub fn strip_control_characters(content: &[u8]) -> Vec<u8> {
    content
        .iter()
        .copied()
        .filter(|&b| matches!(b, b'\n' | b'\r' | b'\t') || !b.is_ascii_control())
        .collect()
}

/// Decrypt one extracted document with the content key
///
/// Never fails: when decryption is impossible the sanitized input is
/// returned with a [`DecryptOutcome::Fallback`] and a warning is logged.
pub fn decrypt_document(document: &ExtractedDocument, key: &[u8]) -> DecryptedDocument {
    let sanitized = strip_control_characters(&document.content);

    match aes_gcm_decrypt(&sanitized, key) {
        Ok(plaintext) => DecryptedDocument {
            source: document.source.clone(),
            content: plaintext,
            outcome: DecryptOutcome::Decrypted,
        },
        Err(reason) => {
            tracing::warn!(
                source = %document.source,
                reason = %reason,
                "Content decryption failed, using sanitized document as-is"
            );
            DecryptedDocument {
                source: document.source.clone(),
                content: sanitized,
                outcome: DecryptOutcome::Fallback { reason },
            }
        }
    }
}

fn aes_gcm_decrypt(encoded: &[u8], key: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let raw = STANDARD
        .decode(encoded.trim_ascii())
        .map_err(|e| format!("content is not base64: {}", e))?;

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| format!("content key must be {} bytes, got {}", KEY_SIZE, key.len()))?;

    if raw.len() < NONCE_SIZE {
        return Err(format!(
            "ciphertext shorter than the {}-byte nonce",
            NONCE_SIZE
        ));
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| "authentication failed (wrong key or tampered content)".to_string())
}

/// AES-256-GCM encrypt `plaintext`, returning base64 `nonce || ciphertext`
pub fn encrypt_content(key: &[u8], plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CoreError::InvalidKeyFormat {
        message: format!("content key must be {} bytes, got {}", KEY_SIZE, key.len()),
    })?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CoreError::DecryptionFailed {
            message: "AES-GCM encryption failed".to_string(),
        })?;

    let mut payload = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(payload))
}
