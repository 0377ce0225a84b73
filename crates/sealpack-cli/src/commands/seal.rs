//! Seal command - produce an encrypted package file and its event
//!
//! The sealed `package.yaml` is what gets baked into a package image; the
//! event is what the pipeline later consumes to fetch and unseal it.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use console::style;
use std::path::{Path, PathBuf};

use sealpack_core::archive::PACKAGE_FILE;
use sealpack_core::crypto::{encrypt_content, encrypt_secret, generate_content_key};
use sealpack_engine::PackageEvent;

use crate::error::{CliError, Result};

/// Files written by a seal run
#[derive(Debug)]
pub struct SealedOutput {
    pub package: PathBuf,
    pub event: PathBuf,
}

pub fn run(
    public_key: &Path,
    reference: &str,
    target: &str,
    documents: &[PathBuf],
    output_dir: &Path,
) -> Result<()> {
    let output = seal(public_key, reference, target, documents, output_dir)?;

    println!(
        "{} Sealed {} document file(s) for {}",
        style("✓").green().bold(),
        documents.len(),
        style(target).bold()
    );
    println!("  {}: {}", style("Package").dim(), output.package.display());
    println!("  {}: {}", style("Event").dim(), output.event.display());
    Ok(())
}

pub fn seal(
    public_key: &Path,
    reference: &str,
    target: &str,
    documents: &[PathBuf],
    output_dir: &Path,
) -> Result<SealedOutput> {
    if reference.trim().is_empty() {
        return Err(CliError::input("reference must not be empty"));
    }
    if documents.is_empty() {
        return Err(CliError::input_with_help(
            "no documents to seal",
            "pass one or more YAML files",
        ));
    }

    let public_pem = std::fs::read_to_string(public_key)?;

    let mut package = String::new();
    for path in documents {
        let content = std::fs::read_to_string(path)?;
        if !package.is_empty() {
            if !package.ends_with('\n') {
                package.push('\n');
            }
            package.push_str("---\n");
        }
        package.push_str(&content);
    }

    let content_key = generate_content_key();
    let sealed = encrypt_content(&content_key, package.as_bytes())?;
    let event = PackageEvent {
        encrypted_reference: encrypt_secret(&public_pem, reference.trim().as_bytes())?,
        encrypted_key: encrypt_secret(&public_pem, STANDARD.encode(&content_key).as_bytes())?,
        target: target.to_string(),
    };

    std::fs::create_dir_all(output_dir)?;
    let output = SealedOutput {
        package: output_dir.join(PACKAGE_FILE),
        event: output_dir.join("event.json"),
    };
    std::fs::write(&output.package, sealed)?;
    std::fs::write(&output.event, serde_json::to_string_pretty(&event)?)?;

    tracing::info!(
        target_tag = target,
        documents = documents.len(),
        "Sealed package"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealpack_core::crypto::{
        SecretIdentity, SecretsDecryptor, decode_content_key, decrypt_document, generate_key_pair,
    };
    use sealpack_core::{DecryptOutcome, ExtractedDocument, MemoryKeyStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_seal_round_trip() {
        let temp = TempDir::new().unwrap();
        let pair = generate_key_pair(2048).unwrap();
        let public_key = temp.path().join("key.pub");
        std::fs::write(&public_key, &pair.public_pem).unwrap();

        let a = temp.path().join("a.yaml");
        let b = temp.path().join("b.yaml");
        std::fs::write(&a, "kind: A").unwrap();
        std::fs::write(&b, "kind: B\n").unwrap();

        let output = seal(
            &public_key,
            " ghcr.io/acme/pkg:^1 ",
            "local/acme:1",
            &[a, b],
            &temp.path().join("out"),
        )
        .unwrap();

        let event = PackageEvent::from_file(&output.event).unwrap();
        assert_eq!(event.target, "local/acme:1");

        let store = Arc::new(MemoryKeyStore::with_secret("svc", "me", pair.private_pem));
        let decryptor = SecretsDecryptor::new(store, SecretIdentity::new("svc", "me"));
        assert_eq!(
            decryptor.decrypt(&event.encrypted_reference).unwrap(),
            "ghcr.io/acme/pkg:^1"
        );
        let key = decode_content_key(&decryptor.decrypt(&event.encrypted_key).unwrap()).unwrap();

        let sealed = std::fs::read(&output.package).unwrap();
        let opened = decrypt_document(&ExtractedDocument::new(PACKAGE_FILE, sealed), &key);
        assert_eq!(opened.outcome, DecryptOutcome::Decrypted);
        assert_eq!(opened.content, b"kind: A\n---\nkind: B\n");
    }

    #[test]
    fn test_seal_requires_documents() {
        let temp = TempDir::new().unwrap();
        let err = seal(
            &temp.path().join("missing.pub"),
            "pkg:1.0.0",
            "local/x",
            &[],
            temp.path(),
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Input { .. }));
    }
}
