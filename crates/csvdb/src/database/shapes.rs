//! Bulk shape tables stored under `ShapeData/`.
//!
//! Shape tables are large keyless tables (one per shape), so they bypass the
//! key-column checks of ordinary tables and are loaded on demand.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::file_map::{FileMap, create_shape_file_map};
use crate::error::{CsvdbError, Result};
use crate::metadata::MetadataDescriptor;
use crate::table::{LoadOptions, SENSITIVITY_COLUMN, Table};
use crate::value::Value;

/// Lazily loaded shape tables.
#[derive(Debug)]
pub struct ShapeData {
    file_map: FileMap,
    options: LoadOptions,
    slices: Mutex<HashMap<String, Arc<Table>>>,
}

impl ShapeData {
    /// Discover the shape tables of a database root.
    pub fn new(root: &Path, fragment_suffix: &str, options: LoadOptions) -> Result<Self> {
        Ok(Self {
            file_map: create_shape_file_map(root, fragment_suffix)?,
            options,
            slices: Mutex::new(HashMap::new()),
        })
    }

    /// Shape names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.file_map.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.file_map.contains_key(name)
    }

    /// Files of one shape.
    pub fn paths(&self, name: &str) -> Option<&[PathBuf]> {
        self.file_map.get(name).map(|s| s.paths())
    }

    /// Load (or return the cached) data for one shape.
    pub fn get_slice(&self, name: &str) -> Result<Arc<Table>> {
        if let Some(table) = self.lock().get(name) {
            return Ok(Arc::clone(table));
        }

        let paths = self
            .paths(name)
            .ok_or_else(|| CsvdbError::UnknownTable(name.to_string()))?;
        debug!(shape = name, "reading shape data");
        let table = Arc::new(Table::load(
            name,
            paths,
            &MetadataDescriptor::data_table(name),
            &self.options,
        )?);

        Ok(Arc::clone(
            self.lock().entry(name.to_string()).or_insert(table),
        ))
    }

    /// Load every shape.
    pub fn load_all(&self) -> Result<()> {
        for name in self.file_map.keys() {
            self.get_slice(name)?;
        }
        Ok(())
    }

    /// Distinct sensitivities present in a shape, reference sentinel included.
    pub fn sensitivities(&self, name: &str) -> Result<Vec<String>> {
        let table = self.get_slice(name)?;
        Ok(table
            .distinct_values(SENSITIVITY_COLUMN)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| match v {
                Value::Text(s) => Some(s),
                _ => None,
            })
            .collect())
    }

    /// Pair each distinct sensitivity of a shape with the shape's name, in
    /// order of first appearance.
    pub fn compile_sensitivities(&self, name: &str) -> Result<Vec<(String, Value)>> {
        Ok(self
            .sensitivities(name)?
            .into_iter()
            .map(|sens| (sens, Value::from(name)))
            .collect())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Table>>> {
        self.slices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::REFERENCE_SENSITIVITY;

    #[test]
    fn test_shape_slices() {
        let dir = tempfile::tempdir().unwrap();
        let shape_dir = dir.path().join("ShapeData");
        std::fs::create_dir_all(&shape_dir).unwrap();
        std::fs::write(
            shape_dir.join("solar.csv"),
            "sensitivity,gau,hour,value\n,ca,1,0.1\nhigh,ca,1,0.2\n",
        )
        .unwrap();

        let shapes = ShapeData::new(dir.path(), ".csvd", LoadOptions::default()).unwrap();
        assert_eq!(shapes.names().collect::<Vec<_>>(), vec!["solar"]);

        let slice = shapes.get_slice("solar").unwrap();
        assert_eq!(slice.row_count(), 2);
        assert!(slice.metadata().is_data_table);

        assert_eq!(
            shapes.sensitivities("solar").unwrap(),
            vec![REFERENCE_SENSITIVITY.to_string(), "high".to_string()]
        );

        assert_eq!(
            shapes.compile_sensitivities("solar").unwrap(),
            vec![
                (REFERENCE_SENSITIVITY.to_string(), Value::from("solar")),
                ("high".to_string(), Value::from("solar")),
            ]
        );

        assert!(matches!(
            shapes.get_slice("wind"),
            Err(CsvdbError::UnknownTable(_))
        ));
    }
}
