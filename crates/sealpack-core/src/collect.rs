//! Soft-error accumulation
//!
//! Extraction and parsing never abort a pipeline run on a single bad
//! document. Each stage returns a [`Collected`] holding whatever it produced
//! alongside the recoverable [`ExtractionError`]s it hit on the way.

/// Category of a recoverable extraction failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    /// Tar entry would land outside the sandbox
    PathTraversal,
    /// Tar entry kind that is never extracted (symlink, device, ...)
    UnsupportedEntry,
    /// Layer stream could not be decompressed or read as tar
    CorruptLayer,
    /// Sub-document failed to decode
    Parse,
    /// Sub-document decoded to something other than a mapping
    InvalidDocument,
    /// Reference or image could not be used
    BadReference,
}

impl std::fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PathTraversal => write!(f, "path traversal"),
            Self::UnsupportedEntry => write!(f, "unsupported entry"),
            Self::CorruptLayer => write!(f, "corrupt layer"),
            Self::Parse => write!(f, "parse error"),
            Self::InvalidDocument => write!(f, "invalid document"),
            Self::BadReference => write!(f, "bad reference"),
        }
    }
}

/// A recoverable failure recorded during extraction or parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    /// Where the failure happened (layer digest, entry path, document name)
    pub source: String,
    pub message: String,
}

impl ExtractionError {
    pub fn new(
        kind: ExtractionErrorKind,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            message: message.into(),
        }
    }

    pub fn path_traversal(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ExtractionErrorKind::PathTraversal,
            path.clone(),
            format!("entry '{}' escapes the extraction directory", path),
        )
    }
}

impl std::fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in {}: {}", self.kind, self.source, self.message)
    }
}

/// Items produced by a stage plus the soft errors it collected
#[derive(Debug, Clone)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub errors: Vec<ExtractionError>,
}

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> Collected<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn push_error(&mut self, error: ExtractionError) {
        tracing::warn!(kind = %error.kind, source = %error.source, "{}", error.message);
        self.errors.push(error);
    }

    /// Append another collection, keeping order
    pub fn extend(&mut self, other: Collected<T>) {
        self.items.extend(other.items);
        self.errors.extend(other.errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Summary of collected errors for display
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("  {}", e))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<ExtractionError>) {
        (self.items, self.errors)
    }
}

impl<T> FromIterator<Collected<T>> for Collected<T> {
    fn from_iter<I: IntoIterator<Item = Collected<T>>>(iter: I) -> Self {
        let mut all = Collected::new();
        for part in iter {
            all.extend(part);
        }
        all
    }
}
