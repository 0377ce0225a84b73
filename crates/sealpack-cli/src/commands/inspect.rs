//! Inspect command - view a repackaged archive without loading it

use console::style;
use std::path::Path;

use sealpack_core::archive::{ExtractOptions, extract_layers};
use sealpack_core::document::{DecryptOutcome, DecryptedDocument, parse_documents};
use sealpack_core::ParsedSchema;
use sealpack_repo::read_image_tarball;

use crate::error::Result;
use crate::util::{format_size, short_digest};

pub fn run(archive_path: &Path, raw: bool) -> Result<()> {
    let data = std::fs::read(archive_path)?;
    let archive = read_image_tarball(&data)?;
    let extracted = extract_layers(archive.image.layers(), &ExtractOptions::default())?;

    if raw {
        for document in &extracted.items {
            print!("{}", String::from_utf8_lossy(&document.content));
        }
        return Ok(());
    }

    println!(
        "{} {}",
        style("Archive").cyan().bold(),
        archive.manifest.repo_tags.join(", ")
    );
    println!();
    println!("  {}: {}", style("Size").dim(), format_size(data.len() as u64));
    println!(
        "  {}: {}",
        style("Config").dim(),
        short_digest(&archive.manifest.config, 12)
    );

    println!();
    println!("{}", style("Layers:").bold());
    for layer in archive.image.layers() {
        println!(
            "  {} ({})",
            short_digest(&layer.digest, 12),
            format_size(layer.size())
        );
    }

    // Repackaged archives only ever hold plaintext
    let documents: Vec<DecryptedDocument> = extracted
        .items
        .iter()
        .map(|doc| DecryptedDocument {
            source: doc.source.clone(),
            content: doc.content.clone(),
            outcome: DecryptOutcome::Decrypted,
        })
        .collect();
    let parsed = parse_documents(&documents);

    println!();
    println!("{} ({})", style("Documents:").bold(), parsed.items.len());
    for schema in &parsed.items {
        println!("  {}", describe(schema));
    }

    let errors = extracted.errors.iter().chain(parsed.errors.iter());
    for error in errors {
        println!(
            "  {} {} [{}]: {}",
            style("!").yellow(),
            error.source,
            error.kind,
            error.message
        );
    }

    Ok(())
}

/// `Kind/name` summary of one manifest
fn describe(schema: &ParsedSchema) -> String {
    let field = |key: &str| schema.get(key).and_then(|v| v.as_str());
    let kind = field("kind").unwrap_or("<no kind>");
    let name = schema
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(|n| n.as_str());
    let mut line = match name {
        Some(name) => format!("{}/{}", kind, name),
        None => kind.to_string(),
    };
    if let Some(api_version) = field("apiVersion") {
        line.push_str(&format!(" ({})", api_version));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(yaml: &str) -> ParsedSchema {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            describe(&schema("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: app\n")),
            "ConfigMap/app (v1)"
        );
        assert_eq!(describe(&schema("kind: Secret\n")), "Secret");
        assert_eq!(describe(&schema("data: {}\n")), "<no kind>");
    }
}
