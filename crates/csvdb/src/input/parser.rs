//! CSV / gzipped CSV reader for table fragments.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};

use super::source::{RawFragment, SourceMetadata};
use crate::error::{CsvdbError, Result};

/// Prefix given to columns with an empty header cell.
pub const UNNAMED_PREFIX: &str = "Unnamed: ";

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Field delimiter.
    pub delimiter: u8,
    /// Quote character.
    pub quote: u8,
    /// Maximum rows to read (None = all).
    pub max_rows: Option<usize>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            max_rows: None,
        }
    }
}

/// Reads table fragment files.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

/// Whether a path names a gzip-compressed file.
pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

impl Parser {
    /// Create a new parser with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser with custom configuration.
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse a file, decompressing it first if it ends in `.gz`.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<RawFragment> {
        let path = path.as_ref();
        let compressed = is_gzip(path);

        let file = File::open(path).map_err(|e| CsvdbError::io(path, e))?;
        let size_bytes = file
            .metadata()
            .map_err(|e| CsvdbError::io(path, e))?
            .len();

        let mut contents = Vec::new();
        if compressed {
            GzDecoder::new(file)
                .read_to_end(&mut contents)
                .map_err(|e| CsvdbError::io(path, e))?;
        } else {
            let mut file = file;
            file.read_to_end(&mut contents)
                .map_err(|e| CsvdbError::io(path, e))?;
        }

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let hash = format!("sha256:{:x}", hasher.finalize());

        let (headers, rows, lines) = self
            .parse_bytes(&contents)
            .map_err(|source| CsvdbError::Csv {
                path: path.to_path_buf(),
                source,
            })?;

        let source = SourceMetadata::new(
            path.to_path_buf(),
            hash,
            size_bytes,
            compressed,
            rows.len(),
            headers.len(),
        );

        Ok(RawFragment {
            headers,
            rows,
            lines,
            source,
        })
    }

    /// Parse bytes directly, returning headers, rows and the line of each row.
    #[allow(clippy::type_complexity)]
    pub(crate) fn parse_bytes(
        &self,
        bytes: &[u8],
    ) -> std::result::Result<(Vec<String>, Vec<Vec<String>>, Vec<usize>), csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .quote(self.config.quote)
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| normalize_header(h, i))
            .collect();

        let expected_cols = headers.len();
        let mut rows = Vec::new();
        let mut lines = Vec::new();

        for (row_idx, result) in reader.records().enumerate() {
            if let Some(max) = self.config.max_rows {
                if row_idx >= max {
                    break;
                }
            }

            let record = result?;
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(row_idx + 2);
            let mut row: Vec<String> = record.iter().map(|s| s.to_string()).collect();

            // Pad short rows; drop cells past the last header
            while row.len() < expected_cols {
                row.push(String::new());
            }
            row.truncate(expected_cols);

            rows.push(row);
            lines.push(line);
        }

        Ok((headers, rows, lines))
    }
}

/// Trim a header cell, naming empty ones by position.
fn normalize_header(raw: &str, position: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        format!("{}{}", UNNAMED_PREFIX, position)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    #[test]
    fn test_parse_csv() {
        let parser = Parser::new();
        let data = b"name , cost,year\ngas,1.5,2020\ncoal,2.0,2021";
        let (headers, rows, lines) = parser.parse_bytes(data).unwrap();

        assert_eq!(headers, vec!["name", "cost", "year"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "coal");
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn test_unnamed_header() {
        let parser = Parser::new();
        let data = b"name,,value\na,x,1\n";
        let (headers, _, _) = parser.parse_bytes(data).unwrap();
        assert_eq!(headers[1], "Unnamed: 1");
    }

    #[test]
    fn test_short_rows_padded() {
        let parser = Parser::new();
        let data = b"a,b,c\n1,2\n";
        let (_, rows, _) = parser.parse_bytes(data).unwrap();
        assert_eq!(rows[0], vec!["1", "2", ""]);
    }

    #[test]
    fn test_multiline_record_lines() {
        let parser = Parser::new();
        let data = b"name,notes\na,\"line one\nline two\"\nb,plain\n";
        let (_, rows, lines) = parser.parse_bytes(data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(lines, vec![2, 4]);
    }

    #[test]
    fn test_parse_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FUELS.csv.GZ");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"name\ngas\ncoal\n").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let fragment = Parser::new().parse_file(&path).unwrap();
        assert!(fragment.source.compressed);
        assert_eq!(fragment.row_count(), 2);
        assert!(fragment.source.hash.starts_with("sha256:"));
    }
}
