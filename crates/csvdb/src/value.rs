//! Typed cell values.
//!
//! Every cell of a loaded table is a [`Value`]. Columns are typed as a whole
//! on load: a column whose non-null cells all parse as integers holds
//! [`Value::Int`], and so on down to [`Value::Text`]. Missing cells are
//! [`Value::Null`] rather than a sentinel string, so equality behaves the same
//! for every column type.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Cell texts that are read as missing values.
const NULL_LITERALS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "NULL", "null", "#N/A", "<NA>", "None",
];

/// A single table cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// The type inferred for a whole column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

impl Value {
    /// Check if a raw cell represents a missing value.
    pub fn is_null_literal(raw: &str) -> bool {
        NULL_LITERALS.contains(&raw.trim())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value, parsing text where possible.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::Null => None,
        }
    }

    /// Normalized form used for case-insensitive, type-tolerant comparison.
    ///
    /// Text is lower-cased and whole floats become integers, so that
    /// `"Wind"` matches `"wind"` and `2.0` matches `2`.
    pub fn folded(&self) -> Value {
        match self {
            Value::Text(s) => Value::Text(s.to_lowercase()),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Value::Int(*f as i64)
            }
            other => other.clone(),
        }
    }

    /// Equality under [`Value::folded`] normalization.
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.folded() == other.folded()
    }

    /// Render the value the way it would appear in a CSV cell.
    pub fn to_cell(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

fn parse_bool_literal(raw: &str) -> Option<bool> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Infer the kind of a column from its raw, non-null cells.
pub fn infer_kind<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> ColumnKind {
    let mut non_null = cells.filter(|c| !Value::is_null_literal(c)).peekable();
    if non_null.peek().is_none() {
        return ColumnKind::Text;
    }

    if non_null.clone().all(|c| c.trim().parse::<i64>().is_ok()) {
        ColumnKind::Int
    } else if non_null.clone().all(|c| c.trim().parse::<f64>().is_ok()) {
        ColumnKind::Float
    } else if non_null.all(|c| parse_bool_literal(c).is_some()) {
        ColumnKind::Bool
    } else {
        ColumnKind::Text
    }
}

/// Convert a raw cell to a value of the given column kind.
pub fn convert(raw: &str, kind: ColumnKind) -> Value {
    if Value::is_null_literal(raw) {
        return Value::Null;
    }

    match kind {
        ColumnKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(raw.to_string())),
        ColumnKind::Float => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Text(raw.to_string())),
        ColumnKind::Bool => parse_bool_literal(raw)
            .map(Value::Bool)
            .unwrap_or_else(|| Value::Text(raw.to_string())),
        ColumnKind::Text => Value::Text(raw.to_string()),
    }
}
