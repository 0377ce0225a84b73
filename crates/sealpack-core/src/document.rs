//! Package documents and fault-tolerant parsing
//!
//! Documents move through three shapes:
//!
//! 1. [`ExtractedDocument`]: raw bytes pulled out of a layer
//! 2. [`DecryptedDocument`]: sanitized and, when possible, decrypted bytes
//! 3. [`ParsedSchema`]: one generic mapping per YAML/JSON sub-document
//!
//! Parsing is stream-oriented: a bundle with several `---` separated
//! documents yields several schemas, and a malformed sub-document stops only
//! its own bundle.

use serde::Deserialize;
use serde_yaml::Value;

use crate::collect::{Collected, ExtractionError, ExtractionErrorKind};

/// One generic key-ordered manifest
pub type ParsedSchema = serde_yaml::Mapping;

/// Raw document bytes found in a layer, before decryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Where the document came from (file path or layer digest)
    pub source: String,
    pub content: Vec<u8>,
}

impl ExtractedDocument {
    pub fn new(source: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}

/// How a document's decryption attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// AES-GCM decryption succeeded
    Decrypted,
    /// Decryption failed; the sanitized input is used as-is
    Fallback { reason: String },
}

/// A document ready for parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedDocument {
    pub source: String,
    pub content: Vec<u8>,
    pub outcome: DecryptOutcome,
}

impl DecryptedDocument {
    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, DecryptOutcome::Fallback { .. })
    }
}

/// Decode every sub-document of one decrypted document
///
/// `null` documents (empty or `---`-only sections) are skipped. The first
/// decode failure ends this document and is recorded as a single error;
/// schemas decoded before it are kept.
pub fn parse_document(document: &DecryptedDocument) -> Collected<ParsedSchema> {
    let mut collected = Collected::new();

    for (index, de) in serde_yaml::Deserializer::from_slice(&document.content).enumerate() {
        let value = match Value::deserialize(de) {
            Ok(value) => value,
            Err(e) => {
                collected.push_error(ExtractionError::new(
                    ExtractionErrorKind::Parse,
                    &document.source,
                    format!(
                        "skipping content from sub-document {}: {}",
                        index + 1,
                        e
                    ),
                ));
                break;
            }
        };

        match value {
            Value::Null => continue,
            Value::Mapping(mapping) => collected.push(mapping),
            Value::Tagged(tagged) => match tagged.value {
                Value::Mapping(mapping) => collected.push(mapping),
                other => {
                    collected.push_error(not_a_mapping(&document.source, index, &other));
                    break;
                }
            },
            other => {
                collected.push_error(not_a_mapping(&document.source, index, &other));
                break;
            }
        }
    }

    tracing::debug!(
        source = %document.source,
        schemas = collected.items.len(),
        errors = collected.errors.len(),
        "Parsed document"
    );

    collected
}

/// Parse a batch of documents, concatenating schemas and errors in order
pub fn parse_documents<'a, I>(documents: I) -> Collected<ParsedSchema>
where
    I: IntoIterator<Item = &'a DecryptedDocument>,
{
    documents.into_iter().map(parse_document).collect()
}

fn not_a_mapping(source: &str, index: usize, value: &Value) -> ExtractionError {
    let found = match value {
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        _ => "value",
    };
    ExtractionError::new(
        ExtractionErrorKind::InvalidDocument,
        source,
        format!(
            "skipping content from sub-document {}: expected a mapping, found a {}",
            index + 1,
            found
        ),
    )
}
