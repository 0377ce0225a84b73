//! Shared utility functions for CLI commands

/// Format a byte size as a human-readable string
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Shorten `sha256:<hex>` to the algorithm plus `max_len` hex characters
#[must_use]
pub fn short_digest(digest: &str, max_len: usize) -> &str {
    let prefix = digest.find(':').map(|i| i + 1).unwrap_or(0);
    let end = digest.len().min(prefix + max_len);
    digest.get(..end).unwrap_or(digest)
}
