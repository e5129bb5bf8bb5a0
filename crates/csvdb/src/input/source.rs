//! Table fragment provenance.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about one source file of a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// File name without path.
    pub file: String,
    /// Full path to the file.
    pub path: PathBuf,
    /// SHA-256 hash of the (decompressed) file contents.
    pub hash: String,
    /// File size on disk in bytes.
    pub size_bytes: u64,
    /// Whether the file was gzip-compressed.
    pub compressed: bool,
    /// Number of data rows (excluding header).
    pub row_count: usize,
    /// Number of columns.
    pub column_count: usize,
    /// When the file was read.
    pub loaded_at: DateTime<Utc>,
}

impl SourceMetadata {
    /// Create metadata for a file that has been read.
    pub fn new(
        path: PathBuf,
        hash: String,
        size_bytes: u64,
        compressed: bool,
        row_count: usize,
        column_count: usize,
    ) -> Self {
        let file = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            file,
            path,
            hash,
            size_bytes,
            compressed,
            row_count,
            column_count,
            loaded_at: Utc::now(),
        }
    }
}

/// One parsed table fragment, before typing.
#[derive(Debug, Clone)]
pub struct RawFragment {
    /// Column headers, whitespace-trimmed.
    pub headers: Vec<String>,
    /// Row data as raw strings (row-major order).
    pub rows: Vec<Vec<String>>,
    /// Physical file line of each row (the header is line 1).
    pub lines: Vec<usize>,
    /// Where the fragment came from.
    pub source: SourceMetadata,
}

impl RawFragment {
    /// Get the number of columns.
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Get the number of rows (excluding header).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get all values for a column by index.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> + Clone {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(|s| s.as_str()).unwrap_or(""))
    }
}
