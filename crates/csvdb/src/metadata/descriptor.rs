//! Per-table metadata descriptors.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CsvdbError, Result};

/// Key column assumed when a table expects one and none is declared.
pub const DEFAULT_KEY_COLUMN: &str = "name";

/// Value column assumed for series tables that declare none.
pub const DEFAULT_VALUE_COLUMN: &str = "value";

fn default_true() -> bool {
    true
}

/// Declared structure of one table.
///
/// A descriptor is declared partially (usually only the series and dropped
/// columns) and then resolved against the header actually found in the file
/// with [`MetadataDescriptor::resolve`]. Attribute columns are "everything
/// else" unless given explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDescriptor {
    /// Table name.
    pub table_name: String,
    /// Opaque bulk table: no key, no attribute/series split.
    #[serde(default)]
    pub is_data_table: bool,
    /// Key column; defaults to `name` when `has_key_column` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column: Option<String>,
    /// Whether the table has a key column at all.
    #[serde(default = "default_true")]
    pub has_key_column: bool,
    /// Columns constant for a given key. `None` until resolved unless declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_columns: Option<Vec<String>>,
    /// Columns forming the time-series index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series_index_columns: Vec<String>,
    /// Numeric value column(s) of the series.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series_value_columns: Vec<String>,
    /// Columns separating independent series under one key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series_filter_columns: Vec<String>,
    /// Columns excluded entirely.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_columns: Vec<String>,
    /// Columns whose text is lower-cased on load.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lowercased_columns: Vec<String>,
}

impl MetadataDescriptor {
    /// Create a descriptor with a `name` key column and everything else derived.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            is_data_table: false,
            key_column: None,
            has_key_column: true,
            attribute_columns: None,
            series_index_columns: Vec::new(),
            series_value_columns: Vec::new(),
            series_filter_columns: Vec::new(),
            dropped_columns: Vec::new(),
            lowercased_columns: Vec::new(),
        }
    }

    /// Descriptor used for tables nobody declared.
    pub fn default_for(table_name: impl Into<String>) -> Self {
        Self::new(table_name)
    }

    /// Descriptor for an opaque bulk table.
    pub fn data_table(table_name: impl Into<String>) -> Self {
        Self {
            is_data_table: true,
            has_key_column: false,
            ..Self::new(table_name)
        }
    }

    /// Set the key column.
    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self.has_key_column = true;
        self
    }

    /// Declare that the table has no key column.
    pub fn without_key_column(mut self) -> Self {
        self.key_column = None;
        self.has_key_column = false;
        self
    }

    /// Declare the attribute columns explicitly.
    pub fn with_attribute_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attribute_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Set the series index columns.
    pub fn with_series_index<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.series_index_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the series value columns.
    pub fn with_series_values<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.series_value_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the series filter columns.
    pub fn with_series_filters<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.series_filter_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the dropped columns.
    pub fn with_dropped<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dropped_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the lower-cased columns (the key column is always included).
    pub fn with_lowercased<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lowercased_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// The effective key column.
    pub fn key_column(&self) -> Option<&str> {
        if self.is_data_table || !self.has_key_column {
            return None;
        }
        Some(self.key_column.as_deref().unwrap_or(DEFAULT_KEY_COLUMN))
    }

    /// The effective series value columns.
    pub fn value_columns(&self) -> Vec<String> {
        if !self.series_value_columns.is_empty() {
            self.series_value_columns.clone()
        } else if !self.series_index_columns.is_empty() {
            vec![DEFAULT_VALUE_COLUMN.to_string()]
        } else {
            Vec::new()
        }
    }

    /// Whether rows of this table carry a time series.
    pub fn has_series(&self) -> bool {
        !self.is_data_table && !self.series_index_columns.is_empty()
    }

    /// The resolved attribute columns (empty before resolution).
    pub fn attributes(&self) -> &[String] {
        self.attribute_columns.as_deref().unwrap_or(&[])
    }

    /// Whether the column's text is lower-cased on load.
    pub fn is_lowercased(&self, column: &str) -> bool {
        self.key_column() == Some(column) || self.lowercased_columns.iter().any(|c| c == column)
    }

    /// Resolve the descriptor against the columns found in the table file.
    ///
    /// Returns a descriptor with every default made explicit. Resolving the
    /// result again against the same columns returns an equal descriptor.
    pub fn resolve(&self, columns: &[String]) -> Result<MetadataDescriptor> {
        if self.is_data_table {
            return Ok(self.clone());
        }

        let table = &self.table_name;
        let key = self.key_column().map(str::to_string);
        let values = self.value_columns();

        let non_attr: HashSet<&str> = self
            .series_index_columns
            .iter()
            .chain(&values)
            .chain(&self.dropped_columns)
            .chain(&self.series_filter_columns)
            .map(String::as_str)
            .collect();

        let attrs: Vec<String> = match &self.attribute_columns {
            Some(explicit) => explicit.clone(),
            None => columns
                .iter()
                .filter(|c| !non_attr.contains(c.as_str()))
                .cloned()
                .collect(),
        };

        if let Some(key) = &key {
            if !attrs.contains(key) {
                let mut sorted = attrs.clone();
                sorted.sort();
                return Err(CsvdbError::schema(
                    table,
                    format!("key column '{}' is not present in attribute columns {:?}", key, sorted),
                ));
            }
        }

        let overlap: Vec<&String> = attrs
            .iter()
            .filter(|a| self.series_index_columns.contains(a))
            .collect();
        if !overlap.is_empty() {
            return Err(CsvdbError::schema(
                table,
                format!("columns {:?} are both attribute and series index columns", overlap),
            ));
        }

        let present: HashSet<&str> = columns.iter().map(String::as_str).collect();
        let mut missing: Vec<&str> = attrs
            .iter()
            .chain(&self.series_index_columns)
            .chain(&values)
            .chain(&self.series_filter_columns)
            .chain(&self.dropped_columns)
            .map(String::as_str)
            .chain(key.as_deref())
            .filter(|c| !present.contains(c))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        if !missing.is_empty() {
            return Err(CsvdbError::schema(
                table,
                format!("columns {:?} are not present in table", missing),
            ));
        }

        let mut lowercased = self.lowercased_columns.clone();
        if let Some(key) = &key {
            if !lowercased.contains(key) {
                lowercased.push(key.clone());
            }
        }

        Ok(MetadataDescriptor {
            table_name: self.table_name.clone(),
            is_data_table: false,
            key_column: key,
            has_key_column: self.has_key_column,
            attribute_columns: Some(attrs),
            series_index_columns: self.series_index_columns.clone(),
            series_value_columns: values,
            series_filter_columns: self.series_filter_columns.clone(),
            dropped_columns: self.dropped_columns.clone(),
            lowercased_columns: lowercased,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_attributes() {
        let md = MetadataDescriptor::new("T")
            .with_series_index(["gau", "year"])
            .with_dropped(["notes"]);
        let resolved = md
            .resolve(&cols(&["name", "geography", "gau", "year", "value", "notes"]))
            .unwrap();

        assert_eq!(resolved.attributes(), &cols(&["name", "geography"])[..]);
        assert_eq!(resolved.series_value_columns, cols(&["value"]));
        assert_eq!(resolved.key_column.as_deref(), Some("name"));
        assert!(resolved.is_lowercased("name"));
    }

    #[test]
    fn test_filter_columns_are_not_attributes() {
        let md = MetadataDescriptor::new("T")
            .with_series_index(["vintage"])
            .with_series_filters(["cost_type"]);
        let resolved = md
            .resolve(&cols(&["name", "cost_type", "vintage", "value"]))
            .unwrap();
        assert_eq!(resolved.attributes(), &cols(&["name"])[..]);
    }

    #[test]
    fn test_missing_key_in_attributes() {
        let md = MetadataDescriptor::new("T").with_attribute_columns(["geography"]);
        let err = md.resolve(&cols(&["name", "geography"])).unwrap_err();
        assert!(matches!(err, CsvdbError::Schema { .. }));
        assert!(err.to_string().contains("key column 'name'"));
    }

    #[test]
    fn test_missing_declared_columns_listed() {
        let md = MetadataDescriptor::new("T")
            .with_series_index(["year", "gau"])
            .with_dropped(["source"]);
        let err = md.resolve(&cols(&["name", "value"])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(r#"["gau", "source", "year"]"#), "{}", msg);
    }

    #[test]
    fn test_attribute_series_overlap_rejected() {
        let md = MetadataDescriptor::new("T")
            .with_attribute_columns(["name", "year"])
            .with_series_index(["year"]);
        let err = md.resolve(&cols(&["name", "year", "value"])).unwrap_err();
        assert!(err.to_string().contains("both attribute and series index"));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let columns = cols(&["name", "geography", "gau", "year", "value", "notes"]);
        let md = MetadataDescriptor::new("T")
            .with_series_index(["gau", "year"])
            .with_dropped(["notes"]);
        let once = md.resolve(&columns).unwrap();
        let twice = once.resolve(&columns).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_data_table_unchanged() {
        let md = MetadataDescriptor::data_table("SHAPE");
        let resolved = md.resolve(&cols(&["anything"])).unwrap();
        assert_eq!(resolved, md);
        assert_eq!(resolved.key_column(), None);
    }

    #[test]
    fn test_keyless_table() {
        let md = MetadataDescriptor::new("T").without_key_column();
        let resolved = md.resolve(&cols(&["a", "b"])).unwrap();
        assert_eq!(resolved.key_column(), None);
        assert_eq!(resolved.attributes(), &cols(&["a", "b"])[..]);
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"table_name": "COSTS", "series_index_columns": ["vintage"]}"#;
        let md: MetadataDescriptor = serde_json::from_str(json).unwrap();
        assert!(md.has_key_column);
        assert_eq!(md.key_column(), Some("name"));
        assert_eq!(md.value_columns(), vec!["value".to_string()]);
    }
}
