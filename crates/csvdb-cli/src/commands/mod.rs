//! CLI command implementations.

pub mod show;
pub mod tables;
pub mod validate;

use std::path::{Path, PathBuf};

use csvdb::{Database, DatabaseOptions, metadata::load_descriptors};

/// Exit status and error type shared by the commands.
pub type CommandResult = Result<i32, Box<dyn std::error::Error>>;

/// Open a database, reading descriptors from `metadata` when given.
pub fn open_database(dbdir: &Path, metadata: Option<&PathBuf>) -> csvdb::Result<Database> {
    let mut options = DatabaseOptions::new();
    if let Some(path) = metadata {
        options = options.with_metadata(load_descriptors(path)?);
    }
    Database::open(dbdir, options)
}
