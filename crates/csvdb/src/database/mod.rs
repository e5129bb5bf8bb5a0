//! A database root: discovered tables, declared metadata and the table cache.

mod file_map;
mod registry;
mod shapes;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::{debug, info};

pub use file_map::{
    FRAGMENT_SUFFIX, FileMap, SHAPE_DIR, TableSource, create_file_map, create_shape_file_map,
    is_table_file, table_name_for,
};
pub use registry::Registry;
pub use shapes::ShapeData;

use crate::error::{CsvdbError, Result};
use crate::intern::StringMap;
use crate::metadata::MetadataDescriptor;
use crate::table::{LoadOptions, Table};
use crate::validation::{RuleOptions, RuleSet};

/// Options for opening a database.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Declared table metadata; undeclared tables get the default descriptor.
    pub metadata: Vec<MetadataDescriptor>,
    /// Load every table with classes when the database is opened.
    pub load: bool,
    /// Tables skipped by the eager load.
    pub tables_to_not_load: Vec<String>,
    /// Tables that never get classes (not eagerly loaded, still readable).
    pub tables_without_classes: Vec<String>,
    /// Tables treated as if their files were absent from class generation.
    pub tables_to_ignore: Vec<String>,
    /// How table files are read.
    pub load_options: LoadOptions,
    /// Directory suffix marking fragmented tables.
    pub fragment_suffix: String,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            metadata: Vec::new(),
            load: false,
            tables_to_not_load: Vec::new(),
            tables_without_classes: Vec::new(),
            tables_to_ignore: Vec::new(),
            load_options: LoadOptions::default(),
            fragment_suffix: FRAGMENT_SUFFIX.to_string(),
        }
    }
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare table metadata.
    pub fn with_metadata(mut self, metadata: Vec<MetadataDescriptor>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Load tables eagerly on open.
    pub fn with_eager_load(mut self, load: bool) -> Self {
        self.load = load;
        self
    }

    /// Set the table load options.
    pub fn with_load_options(mut self, options: LoadOptions) -> Self {
        self.load_options = options;
        self
    }

    /// Skip tables during the eager load.
    pub fn with_tables_to_not_load<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables_to_not_load = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Tables readable by name but never given data objects.
    pub fn with_tables_without_classes<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables_without_classes = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Ignore tables for class generation.
    pub fn with_tables_to_ignore<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables_to_ignore = tables.into_iter().map(Into::into).collect();
        self
    }
}

/// One CSV database directory.
///
/// Tables are loaded on first request and cached for the lifetime of the
/// `Database`. All caches sit behind their own mutex, so a `Database` can be
/// shared across threads.
#[derive(Debug)]
pub struct Database {
    root: PathBuf,
    options: DatabaseOptions,
    metadata: IndexMap<String, MetadataDescriptor>,
    file_map: FileMap,
    shapes: ShapeData,
    tables: Mutex<HashMap<String, Arc<Table>>>,
    pub(crate) rules: Mutex<Option<(RuleOptions, Arc<RuleSet>)>>,
    text_map: Mutex<StringMap>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Database {
    /// Open the database rooted at `root`.
    pub fn open(root: impl AsRef<Path>, options: DatabaseOptions) -> Result<Self> {
        let root = normalize_root(root.as_ref())?;
        let file_map = create_file_map(&root, &options.fragment_suffix)?;
        let shapes = ShapeData::new(
            &root,
            &options.fragment_suffix,
            options.load_options.clone(),
        )?;

        let metadata = options
            .metadata
            .iter()
            .map(|md| (md.table_name.clone(), md.clone()))
            .collect();

        let db = Self {
            root,
            options,
            metadata,
            file_map,
            shapes,
            tables: Mutex::new(HashMap::new()),
            rules: Mutex::new(None),
            text_map: Mutex::new(StringMap::new()),
        };

        info!(
            root = %db.root.display(),
            tables = db.file_map.len(),
            shapes = db.shapes.names().count(),
            "opened database"
        );

        if db.options.load {
            for name in db.tables_with_classes() {
                if !db.options.tables_to_not_load.contains(&name) {
                    db.get_table(&name)?;
                }
            }
        }

        Ok(db)
    }

    /// The normalized database root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all discovered tables (shape tables excluded), sorted.
    pub fn table_names(&self) -> Vec<&str> {
        self.file_map.keys().map(String::as_str).collect()
    }

    pub fn is_table(&self, name: &str) -> bool {
        self.file_map.contains_key(name)
    }

    /// The shape data manager.
    pub fn shapes(&self) -> &ShapeData {
        &self.shapes
    }

    /// The discovered table → file map.
    pub fn file_map(&self) -> &FileMap {
        &self.file_map
    }

    /// Files of a table, falling back to shape tables.
    pub fn file_for_table(&self, name: &str) -> Option<&[PathBuf]> {
        self.file_map
            .get(name)
            .map(|s| s.paths())
            .or_else(|| self.shapes.paths(name))
    }

    /// Declared metadata for a table, or the default descriptor.
    pub fn table_metadata(&self, name: &str) -> MetadataDescriptor {
        if let Some(md) = self.metadata.get(name) {
            md.clone()
        } else if !self.is_table(name) && self.shapes.contains(name) {
            MetadataDescriptor::data_table(name)
        } else {
            MetadataDescriptor::default_for(name)
        }
    }

    /// Key column of a table, per its metadata.
    pub fn get_key_column(&self, name: &str) -> Option<String> {
        self.table_metadata(name).key_column().map(str::to_string)
    }

    /// Tables that application data objects are built for.
    pub fn tables_with_classes(&self) -> Vec<String> {
        self.file_map
            .keys()
            .filter(|name| {
                !self.options.tables_without_classes.contains(name)
                    && !self.options.tables_to_ignore.contains(name)
                    && !self
                        .metadata
                        .get(name.as_str())
                        .map(|md| md.is_data_table)
                        .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Return the cached table, loading it on first request.
    pub fn get_table(&self, name: &str) -> Result<Arc<Table>> {
        if let Some(table) = lock(&self.tables).get(name) {
            return Ok(Arc::clone(table));
        }

        let Some(source) = self.file_map.get(name) else {
            if self.shapes.contains(name) {
                return self.shapes.get_slice(name);
            }
            return Err(CsvdbError::UnknownTable(name.to_string()));
        };

        let descriptor = self.table_metadata(name);
        let table = Arc::new(Table::load(
            name,
            source.paths(),
            &descriptor,
            &self.options.load_options,
        )?);

        Ok(Arc::clone(
            lock(&self.tables)
                .entry(name.to_string())
                .or_insert(table),
        ))
    }

    /// Column names of a table.
    pub fn get_columns(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.get_table(name)?.columns().to_vec())
    }

    /// Number of tables currently cached.
    pub fn cached_table_count(&self) -> usize {
        lock(&self.tables).len()
    }

    /// Drop cached tables and rules; they are reloaded on next use.
    pub fn clear_cache(&self) {
        lock(&self.tables).clear();
        *lock(&self.rules) = None;
        debug!(root = %self.root.display(), "cleared table cache");
    }

    /// Intern text, returning a small integer id.
    pub fn intern(&self, text: &str) -> u32 {
        lock(&self.text_map).store(text)
    }

    /// Text previously interned under `id`.
    pub fn interned_text(&self, id: u32) -> Option<String> {
        lock(&self.text_map).get_text(id).map(str::to_string)
    }
}

/// Absolute, symlink-free form of a database root.
pub(crate) fn normalize_root(root: &Path) -> Result<PathBuf> {
    fs::canonicalize(root).map_err(|e| CsvdbError::DatabasePath {
        path: root.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_db() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("FUELS.csv"), "name,co2\ngas,50\ncoal,90\n").unwrap();
        fs::write(dir.path().join("NOTES.csv"), "text\nhello\n").unwrap();
        dir
    }

    #[test]
    fn test_lazy_table_cache() {
        let dir = make_db();
        let db = Database::open(dir.path(), DatabaseOptions::default()).unwrap();
        assert_eq!(db.cached_table_count(), 0);

        let a = db.get_table("FUELS").unwrap();
        let b = db.get_table("FUELS").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(db.cached_table_count(), 1);

        db.clear_cache();
        assert_eq!(db.cached_table_count(), 0);
    }

    #[test]
    fn test_unknown_table() {
        let dir = make_db();
        let db = Database::open(dir.path(), DatabaseOptions::default()).unwrap();
        assert!(matches!(
            db.get_table("WIND"),
            Err(CsvdbError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_declared_metadata_used() {
        let dir = make_db();
        let options = DatabaseOptions::new()
            .with_metadata(vec![MetadataDescriptor::data_table("NOTES")]);
        let db = Database::open(dir.path(), options).unwrap();

        // NOTES has no `name` column but is declared a data table
        let notes = db.get_table("NOTES").unwrap();
        assert!(notes.metadata().is_data_table);
        assert_eq!(db.get_key_column("FUELS").as_deref(), Some("name"));
        assert_eq!(db.tables_with_classes(), vec!["FUELS".to_string()]);
    }

    #[test]
    fn test_eager_load() {
        let dir = make_db();
        let options = DatabaseOptions::new()
            .with_eager_load(true)
            .with_tables_to_not_load(["NOTES"]);
        let db = Database::open(dir.path(), options).unwrap();
        assert_eq!(db.cached_table_count(), 1);
    }

    #[test]
    fn test_intern() {
        let dir = make_db();
        let db = Database::open(dir.path(), DatabaseOptions::default()).unwrap();
        let id = db.intern("gas");
        assert_eq!(db.intern("gas"), id);
        assert_eq!(db.interned_text(id).as_deref(), Some("gas"));
    }
}
