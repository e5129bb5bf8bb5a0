//! Declarative table metadata.

mod descriptor;

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub use descriptor::{DEFAULT_KEY_COLUMN, DEFAULT_VALUE_COLUMN, MetadataDescriptor};

use crate::error::{CsvdbError, Result};

/// Load a JSON array of table descriptors.
///
/// # Example
///
/// ```no_run
/// let descriptors = csvdb::metadata::load_descriptors("schema.json").unwrap();
/// println!("{} declared tables", descriptors.len());
/// ```
pub fn load_descriptors(path: impl AsRef<Path>) -> Result<Vec<MetadataDescriptor>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| CsvdbError::io(path, e))?;
    let descriptors: Vec<MetadataDescriptor> = serde_json::from_reader(BufReader::new(file))?;

    let mut seen = HashSet::new();
    for md in &descriptors {
        if !seen.insert(md.table_name.as_str()) {
            return Err(CsvdbError::Config(format!(
                "table '{}' is declared more than once in {}",
                md.table_name,
                path.display()
            )));
        }
    }

    Ok(descriptors)
}
