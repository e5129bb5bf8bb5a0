//! Validation reports.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::value::Value;

/// Allowed-value lists longer than this are shown truncated.
const MAX_SHOWN_VALUES: usize = 5;

/// What a violating value was checked against.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    /// The allowed values, truncated for display.
    AllowedValues { shown: Vec<String> },
    /// A failed type check.
    TypeCheck { function: String },
    NotNull,
}

impl Expectation {
    /// Build from a full allowed list: the first two, `...` and the last two
    /// when there are more than five.
    pub fn allowed(values: &[Value]) -> Self {
        let render = |v: &Value| match v {
            Value::Null => "None".to_string(),
            other => other.to_string(),
        };
        let shown = if values.len() > MAX_SHOWN_VALUES {
            values[..2]
                .iter()
                .map(render)
                .chain(std::iter::once("...".to_string()))
                .chain(values[values.len() - 2..].iter().map(render))
                .collect()
        } else {
            values.iter().map(render).collect()
        };
        Expectation::AllowedValues { shown }
    }
}

/// One bad cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Physical line in `file`; the header is line 1.
    pub line: usize,
    pub file: PathBuf,
    pub value: Value,
    pub expectation: Expectation,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let value = self.value.to_cell();
        match &self.expectation {
            Expectation::AllowedValues { shown } => write!(
                f,
                "Value '{}' at line {} of {} not found in allowable list [{}]",
                value,
                self.line,
                file,
                shown.join(", ")
            ),
            Expectation::TypeCheck { function } => write!(
                f,
                "Value '{}' at line {} of {} failed data type check with function {}",
                value, self.line, file, function
            ),
            Expectation::NotNull => write!(f, "Missing value at line {} of {}", self.line, file),
        }
    }
}

/// A problem found in one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum Problem {
    /// Columns with no header name.
    UnnamedColumn { columns: Vec<String> },
    /// Rows sharing the same unique-key columns.
    DuplicateKeys {
        columns: Vec<String>,
        duplicates: usize,
    },
    /// Cells of one column failing its rule.
    ColumnViolations {
        column: String,
        /// Rows referencing deleted values should be deleted too.
        cascade_delete: bool,
        violations: Vec<Violation>,
    },
}

/// The problems of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub problems: Vec<Problem>,
}

impl TableReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            problems: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    /// Number of bad cells.
    pub fn violation_count(&self) -> usize {
        self.problems
            .iter()
            .map(|p| match p {
                Problem::ColumnViolations { violations, .. } => violations.len(),
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Display for TableReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for problem in &self.problems {
            match problem {
                Problem::UnnamedColumn { .. } => {
                    writeln!(f, "Table {} has a 'Unnamed' column", self.table)?;
                }
                Problem::DuplicateKeys { columns, .. } => {
                    writeln!(
                        f,
                        "Duplicate keys found in table {} for columns [{}]",
                        self.table,
                        columns.join(", ")
                    )?;
                }
                Problem::ColumnViolations {
                    column, violations, ..
                } => {
                    writeln!(f, "Errors in {}.{}:", self.table, column)?;
                    for v in violations {
                        writeln!(f, "    {}", v)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Result of validating a database.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Number of tables checked.
    pub tables_checked: usize,
    /// Tables with problems, in check order.
    pub tables: Vec<TableReport>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.tables.iter().all(TableReport::is_clean)
    }

    /// Total number of problems.
    pub fn problem_count(&self) -> usize {
        self.tables.iter().map(|t| t.problems.len()).sum()
    }

    /// Total number of bad cells.
    pub fn violation_count(&self) -> usize {
        self.tables.iter().map(TableReport::violation_count).sum()
    }

    /// The report for one table, if it had problems.
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return writeln!(f, "Database is clean");
        }
        for table in &self.tables {
            write!(f, "{}", table)?;
        }
        Ok(())
    }
}
