//! Validation rule files.
//!
//! A rule file is a CSV with one row per checked column. Each row resolves
//! to a single [`RuleCheck`]: a list of allowed values (from a folder, a
//! referenced table column and/or literal extras), a type predicate, or a
//! not-null check.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::database::{Database, table_name_for};
use crate::error::{CsvdbError, Result};
use crate::value::Value;

/// The named columns of a rule file.
pub const RULE_COLUMNS: [&str; 10] = [
    "table_name",
    "column_name",
    "not_null",
    "linked_column",
    "dtype",
    "folder",
    "referenced_table",
    "referenced_field",
    "cascade_delete",
    "additional_valid_inputs",
];

const EXTRA_VALUES: &str = "additional_valid_inputs";

/// Prefix of generic header names, which (like empty names) hold extra values.
pub const GENERIC_PREFIX: &str = "_c_";

const TRUE_WORDS: &[&str] = &["t", "y", "true", "yes", "on"];
const FALSE_WORDS: &[&str] = &["f", "n", "false", "no", "off"];

/// Whether a cell reads as true in rule files.
pub fn parse_flag(cell: &str) -> bool {
    TRUE_WORDS.contains(&cell.trim().to_lowercase().as_str())
}

/// Whether text belongs to the boolean vocabulary.
pub fn is_bool_word(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    TRUE_WORDS.contains(&lower.as_str()) || FALSE_WORDS.contains(&lower.as_str())
}

/// Options for resolving rules.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOptions {
    /// Extra allowed values appended when a rule references a field of this
    /// name. Defaults to allowing a missing `shape`.
    pub reference_sentinels: HashMap<String, Vec<Value>>,
}

impl Default for RuleOptions {
    fn default() -> Self {
        let mut reference_sentinels = HashMap::new();
        reference_sentinels.insert("shape".to_string(), vec![Value::Null]);
        Self {
            reference_sentinels,
        }
    }
}

impl RuleOptions {
    pub fn with_sentinel(mut self, field: impl Into<String>, value: Value) -> Self {
        self.reference_sentinels
            .entry(field.into())
            .or_default()
            .push(value);
        self
    }
}

/// A type check declared with `dtype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypePredicate {
    Int,
    Float,
    Bool,
}

impl TypePredicate {
    /// Parse a `dtype` cell: `int`, `float`, `bool`, optionally suffixed with
    /// `-or-empty` / `_or_empty`. Returns the predicate and whether nulls pass.
    pub fn parse(dtype: &str) -> Result<Option<(TypePredicate, bool)>> {
        let lower = dtype.trim().to_lowercase().replace('-', "_");
        if lower.is_empty() {
            return Ok(None);
        }
        let (base, nullable) = match lower.strip_suffix("_or_empty") {
            Some(base) => (base, true),
            None => (lower.as_str(), false),
        };
        let predicate = match base {
            "int" => TypePredicate::Int,
            "float" => TypePredicate::Float,
            "bool" => TypePredicate::Bool,
            _ => {
                return Err(CsvdbError::ValidationFormat(format!(
                    "unknown dtype '{}'",
                    dtype
                )));
            }
        };
        Ok(Some((predicate, nullable)))
    }

    /// Name reported for failed checks.
    pub fn function_name(&self) -> &'static str {
        match self {
            TypePredicate::Int => "check_int",
            TypePredicate::Float => "check_float",
            TypePredicate::Bool => "check_bool",
        }
    }

    /// Whether a non-null value passes the check.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => false,
            (TypePredicate::Int, Value::Int(_) | Value::Bool(_)) => true,
            (TypePredicate::Int, Value::Float(f)) => f.is_finite() && f.fract() == 0.0,
            (TypePredicate::Int, Value::Text(s)) => s.trim().parse::<i64>().is_ok(),
            (TypePredicate::Float, v) => v.to_f64().is_some(),
            (TypePredicate::Bool, Value::Bool(_)) => true,
            (TypePredicate::Bool, Value::Text(s)) => is_bool_word(s),
            (TypePredicate::Bool, _) => false,
        }
    }
}

/// How a column is checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum RuleCheck {
    /// Values must be in the list (compared case-insensitively).
    AllowedValues { values: Vec<Value> },
    /// Values must pass the type check; nulls pass when `nullable`.
    TypePredicate {
        predicate: TypePredicate,
        nullable: bool,
    },
    /// Values must not be null.
    NotNull,
    /// Nothing to check.
    Unchecked,
}

/// One resolved row of a rule file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationRule {
    /// Empty for rules applying to the column in every table.
    pub table_name: String,
    pub column_name: String,
    pub not_null: bool,
    pub linked_column: Option<String>,
    pub declared_type: Option<TypePredicate>,
    pub cascade_delete: bool,
    pub check: RuleCheck,
}

impl ValidationRule {
    pub fn is_generic(&self) -> bool {
        self.table_name.is_empty()
    }
}

/// All rules of a rule file, keyed by `(table, column)`.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    source: Option<PathBuf>,
    rules: IndexMap<(String, String), ValidationRule>,
}

impl RuleSet {
    /// Read and resolve a rule file against a database.
    pub fn load(db: &Database, path: impl AsRef<Path>, options: &RuleOptions) -> Result<RuleSet> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CsvdbError::io(path, e))?;
        let mut rules = Self::from_reader(db, file, options)?;
        rules.source = Some(path.to_path_buf());
        info!(path = %path.display(), rules = rules.len(), "loaded validation rules");
        Ok(rules)
    }

    /// Read and resolve rules from any CSV source.
    pub fn from_reader<R: Read>(db: &Database, reader: R, options: &RuleOptions) -> Result<RuleSet> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = csv_reader.records();
        let header = match records.next() {
            Some(record) => record.map_err(format_error)?,
            None => return Err(CsvdbError::ValidationFormat("rule file is empty".to_string())),
        };

        let positions = header_positions(&header)?;
        let extra_pos = positions[EXTRA_VALUES];
        let generic: Vec<usize> = header
            .iter()
            .enumerate()
            .filter(|(_, name)| is_generic_header(name))
            .map(|(i, _)| i)
            .collect();

        let mut rules = IndexMap::new();
        for record in records {
            let record = record.map_err(format_error)?;
            let cell = |name: &str| record.get(positions[name]).unwrap_or("").trim();

            let table_name = cell("table_name").to_string();
            let column_name = cell("column_name").to_string();
            if table_name.is_empty() && column_name.is_empty() {
                continue;
            }

            let extra = record.get(extra_pos).unwrap_or("").trim();
            let extra_values: Vec<String> = if extra.is_empty() {
                Vec::new()
            } else {
                std::iter::once(extra.to_string())
                    .chain(
                        generic
                            .iter()
                            .filter_map(|&i| record.get(i))
                            .map(str::trim)
                            .filter(|v| !v.is_empty())
                            .map(str::to_string),
                    )
                    .collect()
            };

            let raw = RawRule {
                not_null: parse_flag(cell("not_null")),
                linked_column: Some(cell("linked_column"))
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
                dtype: cell("dtype"),
                folder: cell("folder"),
                referenced_table: cell("referenced_table"),
                referenced_field: cell("referenced_field"),
                cascade_delete: parse_flag(cell("cascade_delete")),
                extra_values,
            };
            let rule = raw.resolve(db, table_name, column_name, options)?;

            let key = (rule.table_name.clone(), rule.column_name.clone());
            if rules.contains_key(&key) {
                return Err(CsvdbError::ValidationFormat(format!(
                    "duplicate rule for table '{}', column '{}'",
                    key.0, key.1
                )));
            }
            rules.insert(key, rule);
        }

        debug!(rules = rules.len(), "resolved validation rules");
        Ok(RuleSet {
            source: None,
            rules,
        })
    }

    /// Build a rule set from already resolved rules.
    pub fn from_rules(rules: impl IntoIterator<Item = ValidationRule>) -> Result<RuleSet> {
        let mut map = IndexMap::new();
        for rule in rules {
            let key = (rule.table_name.clone(), rule.column_name.clone());
            if map.insert(key.clone(), rule).is_some() {
                return Err(CsvdbError::ValidationFormat(format!(
                    "duplicate rule for table '{}', column '{}'",
                    key.0, key.1
                )));
            }
        }
        Ok(RuleSet {
            source: None,
            rules: map,
        })
    }

    /// The rule for a column, preferring a table-specific rule over a generic one.
    pub fn get(&self, table: &str, column: &str) -> Option<&ValidationRule> {
        self.rules
            .get(&(table.to_string(), column.to_string()))
            .or_else(|| self.rules.get(&(String::new(), column.to_string())))
    }

    /// File the rules were read from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationRule> {
        self.rules.values()
    }
}

fn format_error(e: csv::Error) -> CsvdbError {
    CsvdbError::ValidationFormat(e.to_string())
}

fn is_generic_header(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.starts_with(GENERIC_PREFIX)
}

fn header_positions(header: &csv::StringRecord) -> Result<HashMap<&'static str, usize>> {
    let named: Vec<&str> = header
        .iter()
        .map(str::trim)
        .filter(|n| !is_generic_header(n))
        .collect();

    let mut unknown: Vec<&str> = named
        .iter()
        .copied()
        .filter(|n| !RULE_COLUMNS.contains(n))
        .collect();
    if !unknown.is_empty() {
        unknown.sort();
        return Err(CsvdbError::ValidationFormat(format!(
            "Unknown validation columns: {:?}",
            unknown
        )));
    }

    let mut missing: Vec<&str> = RULE_COLUMNS
        .iter()
        .copied()
        .filter(|c| !named.contains(c))
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(CsvdbError::ValidationFormat(format!(
            "Missing validation columns: {:?}",
            missing
        )));
    }

    Ok(RULE_COLUMNS
        .iter()
        .map(|&c| {
            let pos = header.iter().position(|h| h.trim() == c).unwrap_or_default();
            (c, pos)
        })
        .collect())
}

struct RawRule<'a> {
    not_null: bool,
    linked_column: Option<String>,
    dtype: &'a str,
    folder: &'a str,
    referenced_table: &'a str,
    referenced_field: &'a str,
    cascade_delete: bool,
    extra_values: Vec<String>,
}

impl RawRule<'_> {
    fn resolve(
        self,
        db: &Database,
        table_name: String,
        column_name: String,
        options: &RuleOptions,
    ) -> Result<ValidationRule> {
        let declared = TypePredicate::parse(self.dtype)?;

        let mut values = if !self.folder.is_empty() {
            folder_values(db.root(), self.folder)?
        } else if !self.referenced_table.is_empty() && !self.referenced_field.is_empty() {
            self.referenced_values(db, options)?
        } else {
            Vec::new()
        };
        values.extend(parse_extra_values(&self.extra_values));

        let check = if !values.is_empty() {
            RuleCheck::AllowedValues { values }
        } else if let Some((predicate, or_empty)) = declared {
            RuleCheck::TypePredicate {
                predicate,
                nullable: or_empty,
            }
        } else if self.not_null {
            RuleCheck::NotNull
        } else {
            RuleCheck::Unchecked
        };

        Ok(ValidationRule {
            table_name,
            column_name,
            not_null: self.not_null,
            linked_column: self.linked_column,
            declared_type: declared.map(|(p, _)| p),
            cascade_delete: self.cascade_delete,
            check,
        })
    }

    fn referenced_values(&self, db: &Database, options: &RuleOptions) -> Result<Vec<Value>> {
        let table = db.get_table(self.referenced_table).map_err(|e| match e {
            CsvdbError::UnknownTable(name) => {
                CsvdbError::ValidationFormat(format!("unknown table '{}'", name))
            }
            other => other,
        })?;

        let mut values = table.distinct_values(self.referenced_field).ok_or_else(|| {
            CsvdbError::ValidationFormat(format!(
                "unknown column '{}' in table '{}'",
                self.referenced_field, self.referenced_table
            ))
        })?;

        if let Some(sentinels) = options.reference_sentinels.get(self.referenced_field) {
            values.extend(sentinels.iter().cloned());
        }
        Ok(values)
    }
}

/// Names of the entries of a folder below the database root, up to the first `.`.
fn folder_values(root: &Path, folder: &str) -> Result<Vec<Value>> {
    let dir = root.join(folder);
    let Ok(entries) = fs::read_dir(&dir) else {
        debug!(dir = %dir.display(), "rule folder not found");
        return Ok(Vec::new());
    };

    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CsvdbError::io(&dir, e))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        names.push(table_name_for(&file_name).to_string());
    }
    names.sort();
    names.dedup();
    Ok(names.into_iter().map(Value::Text).collect())
}

/// Literal extras: all digits → ints, else all numeric → floats, else text.
fn parse_extra_values(extras: &[String]) -> Vec<Value> {
    if extras.is_empty() {
        return Vec::new();
    }
    if extras
        .iter()
        .all(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
    {
        if let Ok(ints) = extras.iter().map(|v| v.parse::<i64>()).collect::<std::result::Result<Vec<_>, _>>() {
            return ints.into_iter().map(Value::Int).collect();
        }
    }
    if let Ok(floats) = extras
        .iter()
        .map(|v| v.parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
    {
        return floats.into_iter().map(Value::Float).collect();
    }
    extras.iter().cloned().map(Value::Text).collect()
}

impl Database {
    /// Load validation rules, reusing the set cached from an earlier call
    /// with the same file and options.
    pub fn validation_rules(&self, path: impl AsRef<Path>, options: &RuleOptions) -> Result<Arc<RuleSet>> {
        let path = path.as_ref();
        {
            let cached = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((cached_options, rules)) = cached.as_ref() {
                if rules.source() == Some(path) && cached_options == options {
                    return Ok(Arc::clone(rules));
                }
            }
        }

        let rules = Arc::new(RuleSet::load(self, path, options)?);
        *self.rules.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((options.clone(), Arc::clone(&rules)));
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseOptions;

    const HEADER: &str = "table_name,column_name,not_null,linked_column,dtype,folder,referenced_table,referenced_field,cascade_delete,additional_valid_inputs,_c_1,";

    fn make_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("FUELS.csv"), "name,shape\ngas,flat\ncoal,\n").unwrap();
        fs::create_dir_all(dir.path().join("ShapeData")).unwrap();
        fs::write(dir.path().join("ShapeData/flat.csv.gz"), "").unwrap();
        fs::write(dir.path().join("ShapeData/peaky.csv"), "").unwrap();
        let db = Database::open(dir.path(), DatabaseOptions::default()).unwrap();
        (dir, db)
    }

    fn rules(db: &Database, body: &str) -> Result<RuleSet> {
        let text = format!("{}\n{}", HEADER, body);
        RuleSet::from_reader(db, text.as_bytes(), &RuleOptions::default())
    }

    #[test]
    fn test_flags() {
        assert!(parse_flag("Yes"));
        assert!(parse_flag("t"));
        assert!(!parse_flag("off"));
        assert!(!parse_flag(""));
        assert!(is_bool_word("OFF"));
        assert!(!is_bool_word("maybe"));
    }

    #[test]
    fn test_dtype_parse() {
        assert_eq!(TypePredicate::parse("int").unwrap(), Some((TypePredicate::Int, false)));
        assert_eq!(
            TypePredicate::parse("Float-or-empty").unwrap(),
            Some((TypePredicate::Float, true))
        );
        assert_eq!(
            TypePredicate::parse("bool_or_empty").unwrap(),
            Some((TypePredicate::Bool, true))
        );
        assert_eq!(TypePredicate::parse("").unwrap(), None);
        assert!(matches!(
            TypePredicate::parse("date"),
            Err(CsvdbError::ValidationFormat(_))
        ));
    }

    #[test]
    fn test_predicates() {
        assert!(TypePredicate::Int.accepts(&Value::from("12")));
        assert!(TypePredicate::Int.accepts(&Value::Float(3.0)));
        assert!(!TypePredicate::Int.accepts(&Value::from("1.5")));
        assert!(TypePredicate::Float.accepts(&Value::from("1.5")));
        assert!(!TypePredicate::Float.accepts(&Value::from("abc")));
        assert!(TypePredicate::Bool.accepts(&Value::from("Yes")));
        assert!(!TypePredicate::Bool.accepts(&Value::Int(1)));
    }

    #[test]
    fn test_referenced_values_and_sentinel() {
        let (_dir, db) = make_db();
        let set = rules(&db, "TECH,shape,,,,,FUELS,shape,yes,,,\n").unwrap();
        let rule = set.get("TECH", "shape").unwrap();
        assert!(rule.cascade_delete);
        assert_eq!(
            rule.check,
            RuleCheck::AllowedValues {
                values: vec![Value::from("flat"), Value::Null, Value::Null]
            }
        );
    }

    #[test]
    fn test_folder_values() {
        let (_dir, db) = make_db();
        let set = rules(&db, ",shape,,,,ShapeData,,,,,,\n").unwrap();
        let rule = set.get("ANY", "shape").unwrap();
        assert!(rule.is_generic());
        assert_eq!(
            rule.check,
            RuleCheck::AllowedValues {
                values: vec![Value::from("flat"), Value::from("peaky")]
            }
        );
    }

    #[test]
    fn test_extra_values() {
        let (_dir, db) = make_db();
        let set = rules(
            &db,
            "T,year,,,,,,,,2020,2030,\nT,ratio,,,,,,,,0.5,1,\nT,mode,,,,,,,,on,off,\nT,skip,,,,,,,,,ignored,\n",
        )
        .unwrap();

        let values = |c: &str| match &set.get("T", c).unwrap().check {
            RuleCheck::AllowedValues { values } => values.clone(),
            other => panic!("unexpected check {other:?}"),
        };
        assert_eq!(values("year"), vec![Value::Int(2020), Value::Int(2030)]);
        assert_eq!(values("ratio"), vec![Value::Float(0.5), Value::Float(1.0)]);
        assert_eq!(values("mode"), vec![Value::from("on"), Value::from("off")]);
        // generic cells only count when the named cell is filled
        assert_eq!(set.get("T", "skip").unwrap().check, RuleCheck::Unchecked);
    }

    #[test]
    fn test_check_resolution() {
        let (_dir, db) = make_db();
        let set = rules(&db, "T,a,yes,,int,,,,,,,\nT,b,,,float,,,,,,,\nT,c,yes,,,,,,,,,\n").unwrap();
        assert_eq!(
            set.get("T", "a").unwrap().check,
            RuleCheck::TypePredicate {
                predicate: TypePredicate::Int,
                nullable: false
            }
        );
        assert_eq!(
            set.get("T", "b").unwrap().check,
            RuleCheck::TypePredicate {
                predicate: TypePredicate::Float,
                nullable: false
            }
        );
        assert_eq!(set.get("T", "c").unwrap().check, RuleCheck::NotNull);
        assert!(set.get("T", "d").is_none());
    }

    #[test]
    fn test_format_errors() {
        let (_dir, db) = make_db();
        let err = rules(&db, "T,a,,,,,,,,,,\nT,a,,,,,,,,,,\n").unwrap_err();
        assert!(err.to_string().contains("duplicate rule"));

        let err = rules(&db, "T,a,,,,,NOPE,name,,,,\n").unwrap_err();
        assert!(err.to_string().contains("unknown table 'NOPE'"));

        let err = rules(&db, "T,a,,,,,FUELS,nope,,,,\n").unwrap_err();
        assert!(err.to_string().contains("unknown column 'nope'"));

        let bad_header = "table_name,column_name,dtype,colour\n";
        let err = RuleSet::from_reader(&db, bad_header.as_bytes(), &RuleOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("Unknown validation columns"));
    }

    #[test]
    fn test_rules_cached_on_database() {
        let (dir, db) = make_db();
        let path = dir.path().join("validation.csv");
        fs::write(&path, format!("{}\nFUELS,name,yes,,,,,,,,,\n", HEADER)).unwrap();

        let a = db.validation_rules(&path, &RuleOptions::default()).unwrap();
        let b = db.validation_rules(&path, &RuleOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_rules_cache_respects_options() {
        let (dir, db) = make_db();
        let path = dir.path().join("validation.csv");
        fs::write(&path, format!("{}\nTECH,shape,,,,,FUELS,shape,yes,,,\n", HEADER)).unwrap();

        let plain = db.validation_rules(&path, &RuleOptions::default()).unwrap();
        let options = RuleOptions::default().with_sentinel("shape", Value::from("none"));
        let extended = db.validation_rules(&path, &options).unwrap();
        assert!(!Arc::ptr_eq(&plain, &extended));

        let allowed = |set: &RuleSet| match &set.get("TECH", "shape").unwrap().check {
            RuleCheck::AllowedValues { values } => values.contains(&Value::from("none")),
            other => panic!("unexpected check {:?}", other),
        };
        assert!(!allowed(&plain));
        assert!(allowed(&extended));

        let again = db.validation_rules(&path, &options).unwrap();
        assert!(Arc::ptr_eq(&extended, &again));
    }
}
