//! Error types for the csvdb library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for csvdb operations.
#[derive(Debug, Error)]
pub enum CsvdbError {
    /// Error reading or accessing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library while reading a table file.
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The database root is missing or is not a directory.
    #[error("Database path \"{path}\": {message}")]
    DatabasePath { path: PathBuf, message: String },

    /// A table name that the database does not know about.
    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    /// Declared metadata disagrees with the columns found in the file.
    #[error("Table {table}: {message}")]
    Schema { table: String, message: String },

    /// The fragments of a split table do not share one column set.
    #[error("Table {table}: fragment '{path}' has columns {found:?}, expected {expected:?}")]
    SchemaColumnMismatch {
        table: String,
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// The declared key column is absent from the table.
    #[error("Key column {column} is not present in table {table}")]
    MissingKeyColumn { table: String, column: String },

    /// The key column has empty cells.
    #[error("Key column {column} in table {table} is missing {count} value(s)")]
    MissingKeyValue {
        table: String,
        column: String,
        count: usize,
    },

    /// No row matched a lookup that required one.
    #[error("Row not found for key {key} in table '{table}'")]
    RowNotFound { table: String, key: String },

    /// More than one row matched a single-row lookup.
    #[error("Duplicate rows found for key '{key}' in table '{table}'")]
    DuplicateRowsFound { table: String, key: String },

    /// Attribute columns differ between rows that should share them.
    #[error(
        "Table '{table}'{}: key '{key}' has non-constant attribute columns {columns:?}",
        sensitivity.as_ref().map(|s| format!(" (sensitivity '{}')", s)).unwrap_or_default()
    )]
    NonUniqueAttributes {
        table: String,
        key: String,
        sensitivity: Option<String>,
        columns: Vec<String>,
    },

    /// The requested sensitivity is not among the rows matching a key.
    #[error("Sensitivity name '{sensitivity}' not found in table '{table}' at location {location}")]
    SensitivityNotFound {
        table: String,
        sensitivity: String,
        location: String,
    },

    /// Duplicate time-series index entries under the strict policy.
    #[error("'{key}' in table '{table}': {count} duplicate series index entries")]
    DuplicateIndex {
        table: String,
        key: String,
        count: usize,
    },

    /// A projection invariant does not hold for the data.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// The validation rule file itself is malformed.
    #[error("Format error in validation rules: {0}")]
    ValidationFormat(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CsvdbError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CsvdbError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        CsvdbError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for csvdb operations.
pub type Result<T> = std::result::Result<T, CsvdbError>;
