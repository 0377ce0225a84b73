//! Tar archive building and sandboxed extraction
//!
//! Layers arrive in one of two shapes, matching how they were acquired:
//!
//! - a **base layer** holding a raw multi-document stream, split in memory
//!   by [`extract_base_layer`]
//! - a set of **image layers** holding tarballs, unpacked by
//!   [`extract_layers`] into a scoped temporary directory
//!
//! Extraction into the sandbox never trusts entry names: anything that would
//! land outside the temporary directory is skipped, links are never created,
//! and file content is capped to guard against decompression bombs.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, Header};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::collect::{Collected, ExtractionError, ExtractionErrorKind};
use crate::document::ExtractedDocument;
use crate::error::{CoreError, Result};
use crate::layer::Layer;

/// Per-file cap on decompressed bytes (200 MiB)
pub const MAX_FILE_SIZE: u64 = 200 * 1024 * 1024;

/// Name of the file carrying a package's manifests
pub const PACKAGE_FILE: &str = "package.yaml";

/// Extraction limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Files larger than this are silently truncated
    pub max_file_size: u64,
    /// File name collected after extraction
    pub package_file: String,
    /// Parent of the extraction sandbox (system temp dir when unset)
    pub sandbox_parent: Option<PathBuf>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            package_file: PACKAGE_FILE.to_string(),
            sandbox_parent: None,
        }
    }
}

/// Build an uncompressed tar stream holding a single regular file
pub fn single_file_tar(name: &str, content: &[u8]) -> Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());
    add_bytes_to_archive(&mut builder, name, content)?;
    Ok(builder.into_inner()?)
}

/// Add bytes to a tar archive with a given path
pub fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0); // Reproducible builds: use epoch time
    header.set_cksum();

    builder.append_data(&mut header, archive_path, content)?;

    Ok(())
}

/// Information about a file in an archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Relative path within the archive
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// List entries of an in-memory tar stream
pub fn list_tar(data: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive = Archive::new(data);
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let entry = entry?;
        entries.push(ArchiveEntry {
            path: entry.path()?.to_string_lossy().to_string(),
            size: entry.header().size()?,
            is_dir: entry.header().entry_type().is_dir(),
        });
    }

    Ok(entries)
}

/// Read one file out of an in-memory tar stream
pub fn read_tar_file(data: &[u8], file_path: &str) -> Result<Vec<u8>> {
    let mut archive = Archive::new(data);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_string_lossy() == file_path {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(content);
        }
    }

    Err(CoreError::Archive {
        message: format!("File not found in archive: {}", file_path),
    })
}

/// Split a document stream on YAML `---` boundaries
///
/// Blank sections are dropped. Directive end markers followed by content on
/// the same line (`--- # comment`) count as boundaries.
pub fn split_documents(text: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed.starts_with("--- ") {
            documents.push(std::mem::take(&mut current));
            continue;
        }
        current.push_str(line);
    }
    documents.push(current);

    documents
        .into_iter()
        .filter(|doc| !doc.trim().is_empty())
        .collect()
}

/// Extract documents from a base layer
///
/// The stream opens with one header line that is not part of any manifest,
/// so the first line of the first document is dropped. The decompressed
/// stream is truncated at `options.max_file_size`.
pub fn extract_base_layer(layer: &Layer, options: &ExtractOptions) -> Collected<ExtractedDocument> {
    let mut collected = Collected::new();

    let mut reader = layer.uncompressed();
    let mut raw = Vec::new();
    if let Err(e) = (&mut reader).take(options.max_file_size).read_to_end(&mut raw) {
        collected.push_error(ExtractionError::new(
            ExtractionErrorKind::CorruptLayer,
            &layer.digest,
            format!("failed to decompress base layer: {}", e),
        ));
        return collected;
    }

    let mut next = [0u8; 1];
    if raw.len() as u64 == options.max_file_size && matches!(reader.read(&mut next), Ok(n) if n > 0) {
        tracing::warn!(
            layer = %layer.digest,
            limit = options.max_file_size,
            "Base layer exceeds size limit, truncated"
        );
    }

    let text = String::from_utf8_lossy(&raw);
    let mut documents = split_documents(&text);
    if let Some(first) = documents.first_mut() {
        *first = match first.split_once('\n') {
            Some((_, rest)) => rest.to_string(),
            None => String::new(),
        };
    }

    for (index, document) in documents.into_iter().enumerate() {
        if document.trim().is_empty() {
            continue;
        }
        collected.push(ExtractedDocument::new(
            format!("{}#{}", layer.digest, index),
            document.into_bytes(),
        ));
    }

    tracing::debug!(
        layer = %layer.digest,
        documents = collected.items.len(),
        "Split base layer"
    );

    collected
}

/// Resolve an entry path inside `root`, or `None` if it would escape
///
/// Purely lexical: `..` may walk back up only as far as it walked down, and
/// the result must be a strict descendant of `root`.
pub fn sandboxed_path(root: &Path, entry: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

    for component in entry.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if parts.is_empty() {
        return None;
    }

    let mut path = root.to_path_buf();
    path.extend(parts);
    Some(path)
}

/// Unpack every layer into a scoped temporary directory and collect the
/// package files found there
///
/// Only sandbox setup and the final directory walk can fail hard; every
/// per-entry and per-layer problem is recorded in the returned collection.
/// The temporary directory is removed when this function returns, whatever
/// the outcome.
pub fn extract_layers(layers: &[Layer], options: &ExtractOptions) -> Result<Collected<ExtractedDocument>> {
    extract_layers_until(layers, options, || false)
}

/// [`extract_layers`] that gives up with [`CoreError::Cancelled`] once
/// `stop` returns true
///
/// `stop` is polled before every layer and every tar entry.
pub fn extract_layers_until<F>(
    layers: &[Layer],
    options: &ExtractOptions,
    stop: F,
) -> Result<Collected<ExtractedDocument>>
where
    F: Fn() -> bool,
{
    let mut builder = tempfile::Builder::new();
    builder.prefix("sealpack-");
    let sandbox: TempDir = match &options.sandbox_parent {
        Some(parent) => builder.tempdir_in(parent)?,
        None => builder.tempdir()?,
    };
    let mut collected = Collected::new();

    for layer in layers {
        if stop() || !unpack_layer(layer, sandbox.path(), options, &mut collected, &stop) {
            tracing::debug!(layer = %layer.digest, "Extraction cancelled");
            return Err(CoreError::Cancelled);
        }
    }

    for entry in WalkDir::new(sandbox.path()).sort_by_file_name() {
        let entry = entry.map_err(|e| CoreError::Archive {
            message: format!("failed to walk extraction directory: {}", e),
        })?;
        if !entry.file_type().is_file() || entry.file_name() != options.package_file.as_str() {
            continue;
        }

        let content = std::fs::read(entry.path())?;
        let relative = entry
            .path()
            .strip_prefix(sandbox.path())
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        collected.push(ExtractedDocument::new(relative, content));
    }

    tracing::debug!(
        layers = layers.len(),
        documents = collected.items.len(),
        errors = collected.errors.len(),
        "Extracted image layers"
    );

    Ok(collected)
}

/// Returns false when `stop` interrupted the layer
fn unpack_layer<F: Fn() -> bool>(
    layer: &Layer,
    root: &Path,
    options: &ExtractOptions,
    collected: &mut Collected<ExtractedDocument>,
    stop: &F,
) -> bool {
    let mut archive = Archive::new(layer.uncompressed());

    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => {
            collected.push_error(corrupt_layer(layer, &e));
            return true;
        }
    };

    for entry in entries {
        if stop() {
            return false;
        }
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                collected.push_error(corrupt_layer(layer, &e));
                return true;
            }
        };

        if let Err(error) = unpack_entry(&mut entry, root, options) {
            collected.push_error(error);
        }
    }

    tracing::debug!(layer = %layer.digest, "Unpacked layer");
    true
}

fn unpack_entry<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    root: &Path,
    options: &ExtractOptions,
) -> std::result::Result<(), ExtractionError> {
    let entry_path = entry
        .path()
        .map_err(|e| {
            ExtractionError::new(
                ExtractionErrorKind::CorruptLayer,
                "<unreadable path>",
                e.to_string(),
            )
        })?
        .into_owned();
    let entry_name = entry_path.to_string_lossy().to_string();

    let destination =
        sandboxed_path(root, &entry_path).ok_or_else(|| ExtractionError::path_traversal(&entry_name))?;

    let io_error = |e: io::Error| {
        ExtractionError::new(ExtractionErrorKind::CorruptLayer, &entry_name, e.to_string())
    };

    let entry_type = entry.header().entry_type();
    if entry_type.is_dir() {
        std::fs::create_dir_all(&destination).map_err(io_error)?;
        return Ok(());
    }

    if !entry_type.is_file() {
        return Err(ExtractionError::new(
            ExtractionErrorKind::UnsupportedEntry,
            &entry_name,
            format!("{:?} entries are not extracted", entry_type),
        ));
    }

    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut file = File::create(&destination).map_err(io_error)?;
    let mut limited = (&mut *entry).take(options.max_file_size);
    let written = io::copy(&mut limited, &mut file).map_err(io_error)?;

    if written == options.max_file_size && entry.header().size().unwrap_or(0) > written {
        tracing::warn!(
            entry = %entry_name,
            limit = options.max_file_size,
            "File exceeds size limit, truncated"
        );
    }

    Ok(())
}

fn corrupt_layer(layer: &Layer, error: &io::Error) -> ExtractionError {
    ExtractionError::new(
        ExtractionErrorKind::CorruptLayer,
        &layer.digest,
        format!("failed to read layer: {}", error),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn tar_layer(files: &[(&str, &[u8])]) -> Layer {
        let mut builder = Builder::new(Vec::new());
        for (name, content) in files {
            add_bytes_to_archive(&mut builder, name, content).unwrap();
        }
        Layer::from_tar_bytes(&builder.into_inner().unwrap()).unwrap()
    }

    /// Gzip magic followed by an invalid compression method
    fn invalid_gzip() -> Vec<u8> {
        vec![0x1f, 0x8b, 0xff, 0xff, 0, 0, 0, 0, 0, 0, 0xde, 0xad]
    }

    /// Tar with a raw entry name, bypassing the builder's path checks
    fn raw_entry_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for (name, content) in entries {
            let mut header = Header::new_old();
            header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_split_documents() {
        let docs = split_documents("a: 1\n---\nb: 2\n--- # next\nc: 3\n---\n\n");
        assert_eq!(docs, vec!["a: 1\n", "b: 2\n", "c: 3\n"]);
    }

    #[test]
    fn test_split_documents_keeps_inline_dashes() {
        let docs = split_documents("a: ---\nb: '---'\n");
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_extract_base_layer_strips_header() {
        let stream = "#sealpack v1 header\nkind: A\n---\nkind: B\n---\nkind: C\n";
        let layer = Layer::from_blob("application/yaml", gzip(stream.as_bytes()));

        let result = extract_base_layer(&layer, &ExtractOptions::default());
        assert!(!result.has_errors());
        let contents: Vec<_> = result
            .items
            .iter()
            .map(|d| String::from_utf8(d.content.clone()).unwrap())
            .collect();
        assert_eq!(contents, vec!["kind: A\n", "kind: B\n", "kind: C\n"]);
    }

    #[test]
    fn test_extract_base_layer_uncompressed() {
        let layer = Layer::from_blob("application/yaml", b"header\nkind: A\n".to_vec());
        let result = extract_base_layer(&layer, &ExtractOptions::default());
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].content, b"kind: A\n");
    }

    #[test]
    fn test_extract_base_layer_header_only() {
        let layer = Layer::from_blob("application/yaml", b"header-only".to_vec());
        assert!(extract_base_layer(&layer, &ExtractOptions::default()).items.is_empty());
    }

    #[test]
    fn test_extract_base_layer_corrupt_gzip() {
        let layer = Layer::from_blob("application/gzip", invalid_gzip());

        let result = extract_base_layer(&layer, &ExtractOptions::default());
        assert!(result.items.is_empty());
        assert_eq!(result.errors[0].kind, ExtractionErrorKind::CorruptLayer);
    }

    #[test]
    fn test_extract_base_layer_capped() {
        let mut stream = b"header\nkind: Big\ndata: ".to_vec();
        stream.extend(vec![b'x'; 64 * 1024]);
        let layer = Layer::from_blob("application/gzip", gzip(&stream));
        let options = ExtractOptions {
            max_file_size: 4096,
            ..Default::default()
        };

        let result = extract_base_layer(&layer, &options);
        assert!(!result.has_errors());
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].content.len(), 4096 - "header\n".len());
    }

    fn sandboxes_in(parent: &Path) -> usize {
        std::fs::read_dir(parent)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("sealpack-"))
            .count()
    }

    #[test]
    fn test_sandbox_removed_after_extraction() {
        let parent = TempDir::new().unwrap();
        let options = ExtractOptions {
            sandbox_parent: Some(parent.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(sandboxes_in(parent.path()), 0);

        let hostile = vec![
            Layer::from_tar_bytes(&raw_entry_tar(&[("../../escape", b"x")])).unwrap(),
            Layer::from_blob("application/gzip", invalid_gzip()),
        ];
        let result = extract_layers(&hostile, &options).unwrap();
        assert_eq!(result.errors.len(), 2);
        assert_eq!(sandboxes_in(parent.path()), 0);

        let layers = vec![tar_layer(&[("pkg/package.yaml", b"kind: A\n")])];
        let result = extract_layers(&layers, &options).unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(sandboxes_in(parent.path()), 0);
    }

    #[test]
    fn test_stop_interrupts_extraction() {
        let parent = TempDir::new().unwrap();
        let options = ExtractOptions {
            sandbox_parent: Some(parent.path().to_path_buf()),
            ..Default::default()
        };
        let layers = vec![
            tar_layer(&[("a/package.yaml", b"kind: A\n"), ("b/package.yaml", b"kind: B\n")]),
            tar_layer(&[("c/package.yaml", b"kind: C\n")]),
        ];

        let polls = std::cell::Cell::new(0);
        let result = extract_layers_until(&layers, &options, || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        });

        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(polls.get(), 3);
        assert_eq!(sandboxes_in(parent.path()), 0);
    }

    #[test]
    fn test_sandboxed_path() {
        let root = Path::new("/sandbox");
        assert_eq!(
            sandboxed_path(root, Path::new("a/b/package.yaml")),
            Some(PathBuf::from("/sandbox/a/b/package.yaml"))
        );
        assert_eq!(
            sandboxed_path(root, Path::new("./a/../b")),
            Some(PathBuf::from("/sandbox/b"))
        );
        assert_eq!(sandboxed_path(root, Path::new("../../etc/passwd")), None);
        assert_eq!(sandboxed_path(root, Path::new("a/../../x")), None);
        assert_eq!(sandboxed_path(root, Path::new("/etc/passwd")), None);
        assert_eq!(sandboxed_path(root, Path::new(".")), None);
        assert_eq!(sandboxed_path(root, Path::new("a/..")), None);
    }

    #[test]
    fn test_extract_layers_collects_package_files() {
        let layers = vec![
            tar_layer(&[("app/package.yaml", b"kind: A\n"), ("README.md", b"docs")]),
            tar_layer(&[("db/package.yaml", b"kind: B\n")]),
        ];

        let result = extract_layers(&layers, &ExtractOptions::default()).unwrap();
        assert!(!result.has_errors());
        let sources: Vec<_> = result.items.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["app/package.yaml", "db/package.yaml"]);
        assert_eq!(result.items[1].content, b"kind: B\n");
    }

    #[test]
    fn test_later_layer_overwrites_earlier() {
        let layers = vec![
            tar_layer(&[("package.yaml", b"version: 1\n")]),
            tar_layer(&[("package.yaml", b"version: 2\n")]),
        ];
        let result = extract_layers(&layers, &ExtractOptions::default()).unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].content, b"version: 2\n");
    }

    #[test]
    fn test_path_traversal_skipped() {
        let tar = raw_entry_tar(&[
            ("../../etc/passwd", b"root:x:0:0"),
            ("pkg/package.yaml", b"kind: A\n"),
        ]);
        let layers = vec![Layer::from_tar_bytes(&tar).unwrap()];

        let result = extract_layers(&layers, &ExtractOptions::default()).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ExtractionErrorKind::PathTraversal);
        assert_eq!(result.errors[0].source, "../../etc/passwd");
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].content, b"kind: A\n");
    }

    #[test]
    fn test_oversized_file_truncated_to_cap() {
        let big = vec![b'x'; 4096];
        let layers = vec![tar_layer(&[("package.yaml", &big)])];
        let options = ExtractOptions {
            max_file_size: 1024,
            ..Default::default()
        };

        let result = extract_layers(&layers, &options).unwrap();
        assert!(!result.has_errors());
        assert_eq!(result.items[0].content.len(), 1024);
    }

    #[test]
    fn test_default_cap_is_200_mib() {
        assert_eq!(ExtractOptions::default().max_file_size, 209_715_200);
    }

    #[test]
    fn test_symlinks_not_extracted() {
        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder
            .append_link(&mut header, "package.yaml", "/etc/passwd")
            .unwrap();
        let layers = vec![Layer::from_tar_bytes(&builder.into_inner().unwrap()).unwrap()];

        let result = extract_layers(&layers, &ExtractOptions::default()).unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ExtractionErrorKind::UnsupportedEntry);
    }

    #[test]
    fn test_corrupt_layer_does_not_stop_others() {
        let layers = vec![
            Layer::from_blob("application/gzip", invalid_gzip()),
            tar_layer(&[("ok/package.yaml", b"kind: B\n")]),
        ];

        let result = extract_layers(&layers, &ExtractOptions::default()).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ExtractionErrorKind::CorruptLayer);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].content, b"kind: B\n");
    }

    #[test]
    fn test_single_file_tar() {
        let tar = single_file_tar(PACKAGE_FILE, b"kind: A\n").unwrap();
        let entries = list_tar(&tar).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "package.yaml");
        assert_eq!(entries[0].size, 8);
        assert!(!entries[0].is_dir);
        assert_eq!(read_tar_file(&tar, PACKAGE_FILE).unwrap(), b"kind: A\n");
    }

    #[test]
    fn test_read_tar_file_missing() {
        let tar = single_file_tar("a.txt", b"a").unwrap();
        assert!(matches!(
            read_tar_file(&tar, "b.txt"),
            Err(CoreError::Archive { .. })
        ));
    }
}
