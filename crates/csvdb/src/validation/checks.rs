//! Column, uniqueness and header checks.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::report::{Expectation, Problem, TableReport, ValidationReport, Violation};
use super::rules::{RuleCheck, RuleSet, ValidationRule};
use crate::database::Database;
use crate::error::Result;
use crate::table::{SENSITIVITY_COLUMN, Table};
use crate::value::Value;

static UNNAMED_COLUMN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Unnamed: \d+").unwrap());

/// Options for a validation run.
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Check that key, sensitivity, filter and index columns are unique together.
    pub check_unique: bool,
    /// Validate shape tables as well.
    pub include_shapes: bool,
    pub skip_tables: Vec<String>,
}

impl ValidationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check_unique(mut self, check: bool) -> Self {
        self.check_unique = check;
        self
    }

    pub fn with_shapes(mut self, include: bool) -> Self {
        self.include_shapes = include;
        self
    }

    pub fn with_skip_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_tables = tables.into_iter().map(Into::into).collect();
        self
    }
}

/// Key used for case-insensitive, type-tolerant membership tests.
fn member_key(value: &Value) -> Value {
    match value {
        Value::Text(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Value::Int(i)
            } else if let Ok(f) = trimmed.parse::<f64>() {
                Value::Float(f).folded()
            } else {
                Value::Text(s.to_lowercase())
            }
        }
        Value::Bool(b) => Value::Text(b.to_string()),
        other => other.folded(),
    }
}

/// Checks tables against a rule set.
pub struct Validator<'a> {
    db: &'a Database,
    rules: Arc<RuleSet>,
}

impl<'a> Validator<'a> {
    pub fn new(db: &'a Database, rules: Arc<RuleSet>) -> Self {
        Self { db, rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Validate every table of the database.
    ///
    /// Bad cells are collected in the report; a table that cannot be loaded
    /// aborts the run.
    pub fn check_database(&self, options: &ValidationOptions) -> Result<ValidationReport> {
        let mut names: Vec<String> = self.db.table_names().into_iter().map(str::to_string).collect();
        if options.include_shapes {
            names.extend(
                self.db
                    .shapes()
                    .names()
                    .filter(|n| !self.db.is_table(n))
                    .map(str::to_string),
            );
        }

        let mut report = ValidationReport::default();
        for name in names {
            if options.skip_tables.contains(&name) {
                debug!(table = %name, "skipping table");
                continue;
            }

            let table = self.db.get_table(&name)?;
            let table_report = self.check_table(&table, options);
            report.tables_checked += 1;
            if !table_report.is_clean() {
                report.tables.push(table_report);
            }
        }

        info!(
            tables = report.tables_checked,
            problems = report.problem_count(),
            violations = report.violation_count(),
            "validated database"
        );
        Ok(report)
    }

    /// Validate one table.
    pub fn check_table(&self, table: &Table, options: &ValidationOptions) -> TableReport {
        let mut report = TableReport::new(table.name());

        let unnamed: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| UNNAMED_COLUMN.is_match(c))
            .cloned()
            .collect();
        if !unnamed.is_empty() {
            report.problems.push(Problem::UnnamedColumn { columns: unnamed });
            return report;
        }

        if table.is_empty() {
            return report;
        }

        if options.check_unique {
            if let Some(problem) = check_unique(table) {
                report.problems.push(problem);
            }
        }

        for column in table.columns() {
            let Some(rule) = self.rules.get(table.name(), column) else {
                continue;
            };
            if let Some(problem) = check_column(table, column, rule) {
                report.problems.push(problem);
            }
        }

        debug!(table = %table.name(), problems = report.problems.len(), "checked table");
        report
    }
}

/// Columns that must be unique together: key, sensitivity, filters and series index.
pub fn unique_columns(table: &Table) -> Vec<String> {
    let md = table.metadata();
    let Some(key) = md.key_column() else {
        return Vec::new();
    };
    if md.is_data_table {
        return Vec::new();
    }

    let mut columns = vec![key.to_string()];
    if table.has_sensitivity_column() {
        columns.push(SENSITIVITY_COLUMN.to_string());
    }
    for c in md.series_filter_columns.iter().chain(&md.series_index_columns) {
        if !columns.contains(c) {
            columns.push(c.clone());
        }
    }
    columns
}

fn check_unique(table: &Table) -> Option<Problem> {
    let columns = unique_columns(table);
    let indices: Vec<usize> = columns.iter().filter_map(|c| table.column_index(c)).collect();
    if indices.is_empty() {
        return None;
    }

    let mut seen = HashSet::new();
    let duplicates = table
        .rows()
        .iter()
        .filter(|row| !seen.insert(indices.iter().map(|&i| &row[i]).collect::<Vec<_>>()))
        .count();

    (duplicates > 0).then_some(Problem::DuplicateKeys {
        columns,
        duplicates,
    })
}

fn check_column(table: &Table, column: &str, rule: &ValidationRule) -> Option<Problem> {
    let col_idx = table.column_index(column)?;
    let linked_idx = rule
        .linked_column
        .as_deref()
        .and_then(|c| table.column_index(c));

    let allowed: HashSet<Value> = match &rule.check {
        RuleCheck::AllowedValues { values } => values.iter().map(member_key).collect(),
        RuleCheck::Unchecked => return None,
        _ => HashSet::new(),
    };

    let expectation = match &rule.check {
        RuleCheck::AllowedValues { values } => Expectation::allowed(values),
        RuleCheck::TypePredicate { predicate, .. } => Expectation::TypeCheck {
            function: predicate.function_name().to_string(),
        },
        RuleCheck::NotNull | RuleCheck::Unchecked => Expectation::NotNull,
    };

    let mut violations = Vec::new();
    for (i, row) in table.rows().iter().enumerate() {
        if linked_idx.is_some_and(|l| row[l].is_null()) {
            continue;
        }

        let cell = &row[col_idx];
        let bad = match &rule.check {
            RuleCheck::AllowedValues { .. } => !allowed.contains(&member_key(cell)),
            RuleCheck::TypePredicate {
                predicate,
                nullable,
            } => !(cell.is_null() && *nullable) && !predicate.accepts(cell),
            RuleCheck::NotNull => cell.is_null(),
            RuleCheck::Unchecked => false,
        };

        if bad {
            let (file, line) = table
                .location(i)
                .map(|(p, l)| (p.to_path_buf(), l))
                .unwrap_or_else(|| (PathBuf::new(), i + 2));
            violations.push(Violation {
                line,
                file,
                value: cell.clone(),
                expectation: expectation.clone(),
            });
        }
    }

    (!violations.is_empty()).then(|| Problem::ColumnViolations {
        column: column.to_string(),
        cascade_delete: rule.cascade_delete,
        violations,
    })
}
