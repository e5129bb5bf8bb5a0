//! Loaded tables.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::error::{CsvdbError, Result};
use crate::input::{Parser, ParserConfig, RawFragment, SourceMetadata};
use crate::metadata::MetadataDescriptor;
use crate::value::{self, ColumnKind, Value};

/// Column holding the sensitivity (scenario variant) of a row.
pub const SENSITIVITY_COLUMN: &str = "sensitivity";

/// Sensitivity stored for rows with no sensitivity, so it can be matched like any other.
pub const REFERENCE_SENSITIVITY: &str = "_reference_";

/// A row as an ordered column → value map.
pub type Row = IndexMap<String, Value>;

/// What to do with rows whose key cell is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Fail the load with [`CsvdbError::MissingKeyValue`].
    #[default]
    Reject,
    /// Drop the rows and log how many were dropped.
    Drop,
}

/// Options controlling how tables are read.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub parser: ParserConfig,
    pub key_policy: KeyPolicy,
}

impl LoadOptions {
    /// Set the missing-key policy.
    pub fn with_key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }
}

/// Where a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowOrigin {
    /// Index into [`Table::sources`].
    pub fragment: usize,
    /// Physical line in that file (the header is line 1).
    pub line: usize,
}

/// A table loaded into memory, with its resolved metadata.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    metadata: MetadataDescriptor,
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    kinds: Vec<ColumnKind>,
    rows: Vec<Vec<Value>>,
    origins: Vec<RowOrigin>,
    sources: Vec<SourceMetadata>,
}

impl Table {
    /// Read a table from one file or from several fragments concatenated row-wise.
    pub fn load(
        name: &str,
        paths: &[PathBuf],
        descriptor: &MetadataDescriptor,
        options: &LoadOptions,
    ) -> Result<Table> {
        if paths.is_empty() {
            return Err(CsvdbError::Config(format!(
                "Missing filename for table \"{}\"",
                name
            )));
        }

        let parser = Parser::with_config(options.parser.clone());
        let fragments = paths
            .iter()
            .map(|p| parser.parse_file(p))
            .collect::<Result<Vec<_>>>()?;

        Self::from_fragments(name, fragments, descriptor, options)
    }

    /// Build a table from in-memory CSV text.
    pub fn from_csv_bytes(
        name: &str,
        bytes: &[u8],
        descriptor: &MetadataDescriptor,
        options: &LoadOptions,
    ) -> Result<Table> {
        let origin = PathBuf::from(format!("<{}>", name));
        let parser = Parser::with_config(options.parser.clone());
        let (headers, rows, lines) =
            parser
                .parse_bytes(bytes)
                .map_err(|source| CsvdbError::Csv {
                    path: origin.clone(),
                    source,
                })?;
        let source = SourceMetadata::new(
            origin,
            String::new(),
            bytes.len() as u64,
            false,
            rows.len(),
            headers.len(),
        );

        let fragment = RawFragment {
            headers,
            rows,
            lines,
            source,
        };
        Self::from_fragments(name, vec![fragment], descriptor, options)
    }

    /// Type, normalize and validate parsed fragments.
    pub fn from_fragments(
        name: &str,
        fragments: Vec<RawFragment>,
        descriptor: &MetadataDescriptor,
        options: &LoadOptions,
    ) -> Result<Table> {
        let Some(first) = fragments.first() else {
            return Err(CsvdbError::Config(format!(
                "Missing filename for table \"{}\"",
                name
            )));
        };
        let columns = first.headers.clone();
        let expected: HashSet<&String> = columns.iter().collect();

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        let mut origins = Vec::new();
        let mut sources = Vec::new();

        for (frag_idx, fragment) in fragments.into_iter().enumerate() {
            let found: HashSet<&String> = fragment.headers.iter().collect();
            if found != expected {
                return Err(CsvdbError::SchemaColumnMismatch {
                    table: name.to_string(),
                    path: fragment.source.path.clone(),
                    expected: columns.clone(),
                    found: fragment.headers.clone(),
                });
            }

            // Same column set, possibly in another order
            let order: Vec<usize> = if fragment.headers == columns {
                (0..columns.len()).collect()
            } else {
                columns
                    .iter()
                    .filter_map(|c| fragment.headers.iter().position(|h| h == c))
                    .collect()
            };

            let RawFragment {
                rows, lines, source, ..
            } = fragment;
            for (row, line) in rows.into_iter().zip(lines) {
                let mut row = row;
                let reordered = order.iter().map(|&i| std::mem::take(&mut row[i])).collect();
                raw_rows.push(reordered);
                origins.push(RowOrigin {
                    fragment: frag_idx,
                    line,
                });
            }
            sources.push(source);
        }

        let key_col = descriptor.key_column().map(str::to_string);
        let key_idx = match &key_col {
            Some(key) => {
                let idx = columns.iter().position(|c| c == key);
                if idx.is_none() && !raw_rows.is_empty() {
                    return Err(CsvdbError::MissingKeyColumn {
                        table: name.to_string(),
                        column: key.clone(),
                    });
                }
                idx
            }
            None => None,
        };
        let sens_idx = columns.iter().position(|c| c == SENSITIVITY_COLUMN);

        let kinds: Vec<ColumnKind> = (0..columns.len())
            .map(|i| {
                if Some(i) == key_idx || Some(i) == sens_idx {
                    ColumnKind::Text
                } else {
                    value::infer_kind(raw_rows.iter().map(move |r| r[i].as_str()))
                }
            })
            .collect();

        let lowercased: Vec<bool> = columns
            .iter()
            .map(|c| descriptor.is_lowercased(c))
            .collect();

        let mut rows: Vec<Vec<Value>> = raw_rows
            .iter()
            .map(|raw| {
                raw.iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let mut v = value::convert(cell, kinds[i]);
                        if lowercased[i] {
                            if let Value::Text(s) = &mut v {
                                *s = s.to_lowercase();
                            }
                        }
                        if Some(i) == sens_idx && v.is_null() {
                            v = Value::Text(REFERENCE_SENSITIVITY.to_string());
                        }
                        v
                    })
                    .collect()
            })
            .collect();
        drop(raw_rows);

        if let (Some(idx), Some(key)) = (key_idx, &key_col) {
            let missing = rows.iter().filter(|r| r[idx].is_null()).count();
            if missing > 0 {
                match options.key_policy {
                    KeyPolicy::Reject => {
                        return Err(CsvdbError::MissingKeyValue {
                            table: name.to_string(),
                            column: key.clone(),
                            count: missing,
                        });
                    }
                    KeyPolicy::Drop => {
                        warn!(table = %name, column = %key, dropped = missing, "dropping rows with missing key");
                        let keep: Vec<bool> = rows.iter().map(|r| !r[idx].is_null()).collect();
                        let mut flags = keep.iter();
                        rows.retain(|_| *flags.next().unwrap_or(&true));
                        let mut flags = keep.iter();
                        origins.retain(|_| *flags.next().unwrap_or(&true));
                    }
                }
            }
        }

        let metadata = descriptor.resolve(&columns)?;

        info!(
            table = %name,
            rows = rows.len(),
            cols = columns.len(),
            fragments = sources.len(),
            "cached table"
        );

        let column_index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();

        Ok(Table {
            name: name.to_string(),
            metadata,
            columns,
            column_index,
            kinds,
            rows,
            origins,
            sources,
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved metadata.
    pub fn metadata(&self) -> &MetadataDescriptor {
        &self.metadata
    }

    /// Column names in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index.contains_key(name)
    }

    /// Inferred kind of a column.
    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.column_index(name).map(|i| self.kinds[i])
    }

    pub fn has_sensitivity_column(&self) -> bool {
        self.has_column(SENSITIVITY_COLUMN)
    }

    /// Get the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows, each in column order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// One row in column order.
    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    /// One row keyed by column name.
    pub fn row_map(&self, index: usize) -> Option<Row> {
        let row = self.rows.get(index)?;
        Some(self.columns.iter().cloned().zip(row.iter().cloned()).collect())
    }

    /// All values of a column.
    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Distinct values of a column in order of first appearance.
    pub fn distinct_values(&self, name: &str) -> Option<Vec<Value>> {
        let mut seen = HashSet::new();
        let values = self
            .column_values(name)?
            .filter(|v| seen.insert(*v))
            .cloned()
            .collect();
        Some(values)
    }

    /// Files the table was read from.
    pub fn sources(&self) -> &[SourceMetadata] {
        &self.sources
    }

    /// Where a row came from.
    pub fn origin(&self, index: usize) -> Option<RowOrigin> {
        self.origins.get(index).copied()
    }

    /// Source file and physical line of a row.
    pub fn location(&self, index: usize) -> Option<(&Path, usize)> {
        let origin = self.origin(index)?;
        let source = self.sources.get(origin.fragment)?;
        Some((source.path.as_path(), origin.line))
    }

    /// Indices of rows matching every `column == value` filter.
    ///
    /// Text filter values are lower-cased for lower-cased columns, and
    /// numbers match numerically.
    pub fn find_rows(&self, filters: &[(String, Value)]) -> Result<Vec<usize>> {
        let mut resolved = Vec::with_capacity(filters.len());
        for (column, wanted) in filters {
            let idx = self.column_index(column).ok_or_else(|| {
                CsvdbError::schema(&self.name, format!("unknown filter column '{}'", column))
            })?;
            let wanted = match wanted {
                Value::Text(s) if self.metadata.is_lowercased(column) => {
                    Value::Text(s.to_lowercase())
                }
                Value::Text(s) => Value::Text(s.clone()),
                other => other.folded(),
            };
            resolved.push((idx, wanted));
        }

        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                resolved.iter().all(|(idx, wanted)| match (&row[*idx], wanted) {
                    (Value::Text(a), Value::Text(b)) => a == b,
                    (cell, wanted) => cell.folded() == *wanted,
                })
            })
            .map(|(i, _)| i)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(csv: &str, md: &MetadataDescriptor) -> Result<Table> {
        Table::from_csv_bytes(&md.table_name, csv.as_bytes(), md, &LoadOptions::default())
    }

    #[test]
    fn test_load_types_columns() {
        let md = MetadataDescriptor::new("FUELS");
        let table = load("name,cost,units,active\nGas,1.5,3,true\ncoal,,4,false\n", &md).unwrap();

        assert_eq!(table.column_kind("cost"), Some(ColumnKind::Float));
        assert_eq!(table.column_kind("units"), Some(ColumnKind::Int));
        assert_eq!(table.column_kind("active"), Some(ColumnKind::Bool));
        assert_eq!(table.row(1).unwrap()[1], Value::Null);
        // key column is lower-cased
        assert_eq!(table.row(0).unwrap()[0], Value::from("gas"));
    }

    #[test]
    fn test_numeric_key_is_text() {
        let md = MetadataDescriptor::new("T");
        let table = load("name,value\n1,10\n2,20\n", &md).unwrap();
        assert_eq!(table.column_kind("name"), Some(ColumnKind::Text));
        assert_eq!(table.row(0).unwrap()[0], Value::from("1"));
    }

    #[test]
    fn test_missing_key_rejected() {
        let md = MetadataDescriptor::new("T");
        let err = load("name,value\na,1\n,2\n", &md).unwrap_err();
        assert!(matches!(err, CsvdbError::MissingKeyValue { count: 1, .. }));
    }

    #[test]
    fn test_missing_key_dropped() {
        let md = MetadataDescriptor::new("T");
        let options = LoadOptions::default().with_key_policy(KeyPolicy::Drop);
        let table =
            Table::from_csv_bytes("T", b"name,value\na,1\n,2\nb,3\n", &md, &options).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.origin(1).unwrap().line, 4);
        assert!(table.column_values("name").unwrap().all(|v| !v.is_null()));
    }

    #[test]
    fn test_missing_key_column() {
        let md = MetadataDescriptor::new("T");
        let err = load("id,value\na,1\n", &md).unwrap_err();
        assert!(matches!(err, CsvdbError::MissingKeyColumn { .. }));
    }

    #[test]
    fn test_sensitivity_filled() {
        let md = MetadataDescriptor::new("T");
        let table = load("name,sensitivity,value\na,,1\na,high,2\n", &md).unwrap();
        let sens: Vec<_> = table.column_values(SENSITIVITY_COLUMN).unwrap().collect();
        assert_eq!(sens[0], &Value::from(REFERENCE_SENSITIVITY));
        assert_eq!(sens[1], &Value::from("high"));
    }

    #[test]
    fn test_find_rows() {
        let md = MetadataDescriptor::new("T").with_series_index(["year"]);
        let table = load("name,year,value\nA,2020,1\nA,2021,2\nB,2020,3\n", &md).unwrap();

        let rows = table
            .find_rows(&[
                ("name".to_string(), Value::from("A")),
                ("year".to_string(), Value::Float(2021.0)),
            ])
            .unwrap();
        assert_eq!(rows, vec![1]);

        let err = table
            .find_rows(&[("nope".to_string(), Value::Null)])
            .unwrap_err();
        assert!(matches!(err, CsvdbError::Schema { .. }));
    }

    #[test]
    fn test_distinct_values() {
        let md = MetadataDescriptor::data_table("T");
        let table = load("fuel\ngas\ncoal\ngas\n", &md).unwrap();
        assert_eq!(
            table.distinct_values("fuel").unwrap(),
            vec![Value::from("gas"), Value::from("coal")]
        );
    }

    #[test]
    fn test_fragment_reorder_and_mismatch() {
        let md = MetadataDescriptor::new("T");
        let parser = Parser::new();
        let frag = |text: &str, name: &str| {
            let (headers, rows, lines) = parser.parse_bytes(text.as_bytes()).unwrap();
            RawFragment {
                source: SourceMetadata::new(PathBuf::from(name), String::new(), 0, false, rows.len(), headers.len()),
                headers,
                rows,
                lines,
            }
        };

        let table = Table::from_fragments(
            "T",
            vec![frag("name,value\na,1\n", "a.csv"), frag("value,name\n2,b\n", "b.csv")],
            &md,
            &LoadOptions::default(),
        )
        .unwrap();
        assert_eq!(table.row(1).unwrap(), &[Value::from("b"), Value::Int(2)]);
        assert_eq!(table.location(1).unwrap().0, Path::new("b.csv"));

        let err = Table::from_fragments(
            "T",
            vec![frag("name,value\na,1\n", "a.csv"), frag("name,other\nb,2\n", "b.csv")],
            &md,
            &LoadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CsvdbError::SchemaColumnMismatch { .. }));
    }
}
