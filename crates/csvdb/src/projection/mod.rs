//! Row projection: turning the rows for one key into attributes plus a series.
//!
//! A keyed table stores, for every key, a set of attribute columns that are
//! constant across the key's rows, and optionally a time series spread over
//! the rows (one row per index value). [`Table::project`] gathers both,
//! honoring the sensitivity chosen by a [`SensitivityResolver`].

mod scenario;
mod series;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

pub use scenario::{Scenario, ScenarioFilter, SensitivityResolver};
pub use series::{EMPTY_INDEX, TimeSeries};

use crate::database::Database;
use crate::error::{CsvdbError, Result};
use crate::table::{REFERENCE_SENSITIVITY, Row, SENSITIVITY_COLUMN, Table};
use crate::value::Value;

/// Index levels renamed after the value of an attribute column.
const INDEX_ALIASES: &[(&str, &str)] = &[
    ("gau", "geography"),
    ("gau_from", "geography_from"),
    ("gau_to", "geography_to"),
    ("oth_1", "other_index_1"),
    ("oth_2", "other_index_2"),
];

/// What to do when a series has two rows at the same index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Keep the first row in file order and log the rest.
    #[default]
    KeepFirst,
    /// Fail with [`CsvdbError::DuplicateIndex`].
    Error,
}

/// A lookup of the rows for one key.
#[derive(Debug, Clone, Default)]
pub struct RowQuery {
    pub key: Option<String>,
    pub filters: Vec<(String, Value)>,
    pub raise_error: bool,
    pub duplicates: DuplicatePolicy,
    /// Sensitivity to use instead of asking the resolver.
    pub sensitivity: Option<String>,
}

impl RowQuery {
    /// Query the rows of `key`.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Query without a key (for keyless tables, or filters only).
    pub fn unkeyed() -> Self {
        Self::default()
    }

    /// Also require `column == value`.
    pub fn with_filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    /// Fail with [`CsvdbError::RowNotFound`] instead of returning nothing.
    pub fn raise_error(mut self, raise: bool) -> Self {
        self.raise_error = raise;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: impl Into<String>) -> Self {
        self.sensitivity = Some(sensitivity.into());
        self
    }

    /// `key (col=value, ...)` for messages.
    fn describe(&self) -> String {
        let key = self.key.as_deref().unwrap_or("<none>");
        if self.filters.is_empty() {
            key.to_string()
        } else {
            format!("{} {}", key, describe_filters(&self.filters))
        }
    }
}

fn describe_filters(filters: &[(String, Value)]) -> String {
    let parts: Vec<String> = filters.iter().map(|(c, v)| format!("{}={}", c, v)).collect();
    format!("({})", parts.join(", "))
}

/// The attributes and series of one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub table: String,
    pub key: Option<String>,
    /// Attribute columns, in attribute order. With unpinned filter columns,
    /// these are the attributes of the first filter group.
    pub attributes: Row,
    /// Attributes per distinct combination of unpinned filter columns.
    pub filter_groups: Vec<(Vec<Value>, Row)>,
    pub series: Option<TimeSeries>,
    /// Sensitivity the rows were selected with, for tables that have one.
    pub sensitivity: Option<String>,
}

impl Projection {
    /// An attribute value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// An attribute as text, if it is text.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column)?.as_text()
    }

    /// An attribute as a number.
    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column)?.to_f64()
    }
}

impl Table {
    fn key_filters(&self, query: &RowQuery) -> Result<Vec<(String, Value)>> {
        let mut conditions = Vec::with_capacity(query.filters.len() + 2);
        if let Some(key) = &query.key {
            let key_col = self.metadata().key_column().ok_or_else(|| {
                CsvdbError::schema(self.name(), "table has no key column to look up")
            })?;
            conditions.push((key_col.to_string(), Value::Text(key.clone())));
        }
        conditions.extend(query.filters.iter().cloned());
        Ok(conditions)
    }

    /// Look up exactly one row.
    ///
    /// Returns `Ok(None)` when nothing matches, unless the query raises.
    /// An explicit query sensitivity narrows the match for tables with a
    /// sensitivity column.
    pub fn get_row(&self, query: &RowQuery) -> Result<Option<Row>> {
        let mut rows = self.matching_rows(query)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            _ => Err(CsvdbError::DuplicateRowsFound {
                table: self.name().to_string(),
                key: query.describe(),
            }),
        }
    }

    /// Look up every matching row.
    pub fn get_rows(&self, query: &RowQuery) -> Result<Vec<Row>> {
        self.matching_rows(query)
    }

    fn matching_rows(&self, query: &RowQuery) -> Result<Vec<Row>> {
        let mut conditions = self.key_filters(query)?;
        if let Some(sens) = &query.sensitivity {
            if self.has_sensitivity_column() {
                conditions.push((SENSITIVITY_COLUMN.to_string(), Value::Text(sens.clone())));
            }
        }

        let matches = self.find_rows(&conditions)?;
        if matches.is_empty() && query.raise_error {
            return Err(CsvdbError::RowNotFound {
                table: self.name().to_string(),
                key: query.describe(),
            });
        }
        Ok(matches.into_iter().filter_map(|i| self.row_map(i)).collect())
    }

    /// Project the rows matching a query into attributes and a series.
    pub fn project(
        &self,
        query: &RowQuery,
        resolver: Option<&dyn SensitivityResolver>,
    ) -> Result<Option<Projection>> {
        let md = self.metadata();
        let has_sens = self.has_sensitivity_column();

        let mut sens = if has_sens {
            query
                .sensitivity
                .clone()
                .or_else(|| {
                    resolver.and_then(|r| r.sensitivity(self.name(), query.key.as_deref(), &query.filters))
                })
                .unwrap_or_else(|| REFERENCE_SENSITIVITY.to_string())
        } else {
            String::new()
        };

        let conditions = self.key_filters(query)?;
        let mut matches = self.find_rows(&conditions)?;

        if has_sens && !matches.is_empty() {
            let sens_idx = self.column_index(SENSITIVITY_COLUMN);
            let label = |i: usize| -> String {
                sens_idx
                    .and_then(|c| self.row(i).map(|r| r[c].to_cell()))
                    .unwrap_or_default()
            };

            let mut present: Vec<String> = Vec::new();
            for &i in &matches {
                let l = label(i);
                if !present.contains(&l) {
                    present.push(l);
                }
            }

            // A single sensitivity is used whatever was asked for
            if present.len() == 1 {
                sens = present.remove(0);
            } else if !present.contains(&sens) {
                return Err(CsvdbError::SensitivityNotFound {
                    table: self.name().to_string(),
                    sensitivity: sens,
                    location: describe_filters(&conditions),
                });
            }
            matches.retain(|&i| label(i) == sens);
        }

        if matches.is_empty() {
            if query.raise_error {
                return Err(CsvdbError::RowNotFound {
                    table: self.name().to_string(),
                    key: query.describe(),
                });
            }
            debug!(table = %self.name(), query = %query.describe(), "no rows found");
            return Ok(None);
        }

        let attr_cols: Vec<String> = if md.is_data_table {
            self.columns().to_vec()
        } else {
            md.attributes().to_vec()
        };

        let pinned: HashSet<&str> = query.filters.iter().map(|(c, _)| c.as_str()).collect();
        let unpinned: Vec<String> = md
            .series_filter_columns
            .iter()
            .filter(|c| !pinned.contains(c.as_str()))
            .cloned()
            .collect();

        let filter_groups = self.group_attributes(&matches, &unpinned, &attr_cols, query, has_sens.then_some(sens.as_str()))?;
        let attributes = filter_groups
            .first()
            .map(|(_, attrs)| attrs.clone())
            .unwrap_or_default();

        let series = if md.has_series() {
            self.build_series(&matches, &unpinned, &attributes, query)?
        } else {
            None
        };

        Ok(Some(Projection {
            table: self.name().to_string(),
            key: query.key.clone(),
            attributes,
            filter_groups: if unpinned.is_empty() {
                Vec::new()
            } else {
                filter_groups
            },
            series,
            sensitivity: has_sens.then_some(sens),
        }))
    }

    /// One distinct attribute row per unpinned filter combination.
    fn group_attributes(
        &self,
        matches: &[usize],
        unpinned: &[String],
        attr_cols: &[String],
        query: &RowQuery,
        sensitivity: Option<&str>,
    ) -> Result<Vec<(Vec<Value>, Row)>> {
        let filter_idx = self.indices(unpinned)?;
        let attr_idx = self.indices(attr_cols)?;

        // filter values -> distinct attribute rows, in order of appearance
        let mut groups: Vec<(Vec<Value>, Vec<Vec<Value>>)> = Vec::new();
        for &i in matches {
            let Some(row) = self.row(i) else { continue };
            let fkey: Vec<Value> = filter_idx.iter().map(|&c| row[c].clone()).collect();
            let attrs: Vec<Value> = attr_idx.iter().map(|&c| row[c].clone()).collect();

            match groups.iter_mut().find(|(k, _)| *k == fkey) {
                Some((_, rows)) => {
                    if !rows.contains(&attrs) {
                        rows.push(attrs);
                    }
                }
                None => groups.push((fkey, vec![attrs])),
            }
        }

        let mut out = Vec::with_capacity(groups.len());
        for (fkey, rows) in groups {
            if rows.len() > 1 {
                let mut columns: Vec<String> = self.metadata().key_column().map(str::to_string).into_iter().collect();
                columns.extend(
                    attr_cols
                        .iter()
                        .enumerate()
                        .filter(|(c, _)| rows.iter().any(|r| r[*c] != rows[0][*c]))
                        .map(|(_, name)| name.clone()),
                );

                let key = query.describe();
                return Err(if self.metadata().has_series() {
                    CsvdbError::NonUniqueAttributes {
                        table: self.name().to_string(),
                        key,
                        sensitivity: sensitivity.map(str::to_string),
                        columns,
                    }
                } else {
                    CsvdbError::DuplicateRowsFound {
                        table: self.name().to_string(),
                        key,
                    }
                });
            }

            let attrs: Row = attr_cols.iter().cloned().zip(rows.into_iter().flatten()).collect();
            out.push((fkey, attrs));
        }
        Ok(out)
    }

    fn build_series(
        &self,
        matches: &[usize],
        unpinned: &[String],
        attributes: &Row,
        query: &RowQuery,
    ) -> Result<Option<TimeSeries>> {
        let md = self.metadata();
        let value_names = md.value_columns();

        let mut index_names: Vec<String> = unpinned.to_vec();
        index_names.extend(
            md.series_index_columns
                .iter()
                .filter(|c| c.as_str() != SENSITIVITY_COLUMN)
                .cloned(),
        );

        let index_idx = self.indices(&index_names)?;
        let value_idx = self.indices(&value_names)?;

        let rows: Vec<&[Value]> = matches.iter().filter_map(|&i| self.row(i)).collect();
        if rows.iter().all(|r| value_idx.iter().all(|&c| r[c].is_null())) {
            return Ok(None);
        }

        let mut entries: Vec<(Vec<Value>, Vec<Value>)> = rows
            .iter()
            .map(|r| {
                let index = index_idx
                    .iter()
                    .map(|&c| match &r[c] {
                        Value::Null => Value::Text(EMPTY_INDEX.to_string()),
                        v => v.clone(),
                    })
                    .collect();
                let values = value_idx.iter().map(|&c| r[c].clone()).collect();
                (index, values)
            })
            .collect();

        // stable, so duplicates stay in file order
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let numeric = entries
            .iter()
            .flat_map(|(_, vals)| vals)
            .all(|v| v.is_null() || v.to_f64().is_some());
        if numeric {
            for (_, vals) in &mut entries {
                for v in vals.iter_mut() {
                    if let Some(f) = v.to_f64() {
                        *v = Value::Float(f);
                    }
                }
            }
        }

        for name in index_names.iter_mut() {
            let Some((_, attr)) = INDEX_ALIASES.iter().find(|(alias, _)| *alias == name.as_str()) else {
                continue;
            };
            let Some(value) = attributes.get(*attr) else {
                continue;
            };
            if value.is_null() {
                return Err(CsvdbError::Invariant(format!(
                    "table {}, key {}: {} can't be null when the {} index exists",
                    self.name(),
                    query.describe(),
                    attr,
                    name
                )));
            }
            *name = value.to_cell();
        }

        let before = entries.len();
        entries.dedup_by(|later, earlier| later.0 == earlier.0);
        let duplicates = before - entries.len();
        if duplicates > 0 {
            match query.duplicates {
                DuplicatePolicy::KeepFirst => {
                    warn!(
                        table = %self.name(),
                        key = %query.describe(),
                        duplicates,
                        "duplicate series indices found (keeping first)"
                    );
                }
                DuplicatePolicy::Error => {
                    return Err(CsvdbError::DuplicateIndex {
                        table: self.name().to_string(),
                        key: query.describe(),
                        count: duplicates,
                    });
                }
            }
        }

        Ok(Some(TimeSeries::from_sorted(index_names, value_names, entries)))
    }

    fn indices(&self, columns: &[String]) -> Result<Vec<usize>> {
        columns
            .iter()
            .map(|c| {
                self.column_index(c).ok_or_else(|| {
                    CsvdbError::schema(self.name(), format!("column '{}' is not present", c))
                })
            })
            .collect()
    }
}

impl Database {
    /// Look up exactly one row of a table.
    pub fn get_row(&self, table: &str, query: &RowQuery) -> Result<Option<Row>> {
        self.get_table(table)?.get_row(query)
    }

    /// Look up every matching row of a table.
    pub fn get_rows(&self, table: &str, query: &RowQuery) -> Result<Vec<Row>> {
        self.get_table(table)?.get_rows(query)
    }

    /// Project one key of a table.
    pub fn project(
        &self,
        table: &str,
        query: &RowQuery,
        resolver: Option<&dyn SensitivityResolver>,
    ) -> Result<Option<Projection>> {
        let table: Arc<Table> = self.get_table(table)?;
        table.project(query, resolver)
    }
}
