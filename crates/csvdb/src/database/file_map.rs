//! Discovery of table files under a database root.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{CsvdbError, Result};

/// Subdirectory holding bulk shape data, excluded from normal discovery.
pub const SHAPE_DIR: &str = "ShapeData";

/// Directory suffix marking a table split into fragments.
pub const FRAGMENT_SUFFIX: &str = ".csvd";

// Case-insensitive match of *.csv and *.csv.gz files
static CSV_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^.*\.csv(\.gz)?$").unwrap());

/// The file(s) holding one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    /// A single CSV or CSV.GZ file.
    File(PathBuf),
    /// CSV fragments in a fragment directory, concatenated in name order.
    Fragments(Vec<PathBuf>),
}

impl TableSource {
    /// Every path making up the table.
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            TableSource::File(path) => std::slice::from_ref(path),
            TableSource::Fragments(paths) => paths,
        }
    }
}

/// Table name → source files, ordered by table name.
pub type FileMap = BTreeMap<String, TableSource>;

/// Whether a file name looks like a table file.
pub fn is_table_file(name: &str) -> bool {
    CSV_PATTERN.is_match(name)
}

/// Table name for a file or directory name: everything before the first `.`.
pub fn table_name_for(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// Walk a database root and map table names to their files.
///
/// Directories named [`SHAPE_DIR`] are skipped. A directory whose name ends
/// with `fragment_suffix` contributes all its CSV files as one table.
pub fn create_file_map(root: &Path, fragment_suffix: &str) -> Result<FileMap> {
    check_root(root)?;

    let mut file_map = FileMap::new();
    walk(root, fragment_suffix, true, &mut file_map)?;

    debug!(root = %root.display(), tables = file_map.len(), "created file map");
    Ok(file_map)
}

/// Map the shape tables stored directly under `root/ShapeData`.
pub fn create_shape_file_map(root: &Path, fragment_suffix: &str) -> Result<FileMap> {
    let shape_dir = root.join(SHAPE_DIR);
    let mut file_map = FileMap::new();
    if shape_dir.is_dir() {
        walk(&shape_dir, fragment_suffix, false, &mut file_map)?;
    }
    Ok(file_map)
}

fn check_root(root: &Path) -> Result<()> {
    if !root.exists() {
        return Err(CsvdbError::DatabasePath {
            path: root.to_path_buf(),
            message: "does not exist".to_string(),
        });
    }
    if !root.is_dir() {
        return Err(CsvdbError::DatabasePath {
            path: root.to_path_buf(),
            message: "is not a directory".to_string(),
        });
    }
    Ok(())
}

/// Directory entries sorted by file name, so discovery is deterministic.
fn sorted_entries(dir: &Path) -> Result<Vec<(String, PathBuf, bool)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| CsvdbError::io(dir, e))? {
        let entry = entry.map_err(|e| CsvdbError::io(dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = path.is_dir();
        entries.push((name, path, is_dir));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

fn insert(file_map: &mut FileMap, name: &str, source: TableSource) {
    if let Some(existing) = file_map.get(name) {
        warn!(
            table = name,
            kept = ?existing.paths(),
            ignored = ?source.paths(),
            "table found more than once"
        );
        return;
    }
    file_map.insert(name.to_string(), source);
}

fn walk(dir: &Path, fragment_suffix: &str, recurse: bool, file_map: &mut FileMap) -> Result<()> {
    for (name, path, is_dir) in sorted_entries(dir)? {
        if is_dir {
            if name == SHAPE_DIR {
                continue;
            }

            if name.ends_with(fragment_suffix) {
                let fragments: Vec<PathBuf> = sorted_entries(&path)?
                    .into_iter()
                    .filter(|(n, _, d)| !d && is_table_file(n))
                    .map(|(_, p, _)| p)
                    .collect();
                if fragments.is_empty() {
                    warn!(dir = %path.display(), "fragment directory holds no CSV files");
                } else {
                    insert(file_map, table_name_for(&name), TableSource::Fragments(fragments));
                }
            } else if recurse {
                walk(&path, fragment_suffix, recurse, file_map)?;
            }
        } else if is_table_file(&name) {
            insert(file_map, table_name_for(&name), TableSource::File(path));
        }
    }
    Ok(())
}
