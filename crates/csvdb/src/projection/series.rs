//! Time-indexed series extracted from table rows.

use serde::Serialize;

use crate::value::Value;

/// Index cell stored for a missing index value.
pub const EMPTY_INDEX: &str = "_empty_";

/// A series keyed by one or more index levels, sorted by index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    index_names: Vec<String>,
    value_names: Vec<String>,
    entries: Vec<(Vec<Value>, Vec<Value>)>,
}

impl TimeSeries {
    /// Build a series from entries already sorted by index.
    pub(crate) fn from_sorted(
        index_names: Vec<String>,
        value_names: Vec<String>,
        entries: Vec<(Vec<Value>, Vec<Value>)>,
    ) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 <= w[1].0));
        Self {
            index_names,
            value_names,
            entries,
        }
    }

    /// Names of the index levels, outermost first.
    pub fn index_names(&self) -> &[String] {
        &self.index_names
    }

    /// Names of the value columns.
    pub fn value_names(&self) -> &[String] {
        &self.value_names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(index, values)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&[Value], &[Value])> {
        self.entries
            .iter()
            .map(|(idx, vals)| (idx.as_slice(), vals.as_slice()))
    }

    /// Values stored at an index.
    pub fn get(&self, index: &[Value]) -> Option<&[Value]> {
        self.entries
            .binary_search_by(|(idx, _)| idx.as_slice().cmp(index))
            .ok()
            .map(|pos| self.entries[pos].1.as_slice())
    }

    /// First value column at an index, as a number.
    pub fn value_at(&self, index: &[Value]) -> Option<f64> {
        self.get(index)?.first()?.to_f64()
    }

    /// Distinct values of one index level, in index order.
    pub fn level_values(&self, level: &str) -> Option<Vec<&Value>> {
        let pos = self.index_names.iter().position(|n| n == level)?;
        let mut out: Vec<&Value> = Vec::new();
        for (idx, _) in &self.entries {
            if !out.contains(&&idx[pos]) {
                out.push(&idx[pos]);
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let series = TimeSeries::from_sorted(
            vec!["gau".into(), "year".into()],
            vec!["value".into()],
            vec![
                (vec![Value::from("ca"), Value::Int(2020)], vec![Value::Float(1.0)]),
                (vec![Value::from("ca"), Value::Int(2021)], vec![Value::Float(2.0)]),
                (vec![Value::from("ny"), Value::Int(2020)], vec![Value::Float(3.0)]),
            ],
        );

        assert_eq!(series.len(), 3);
        assert_eq!(
            series.value_at(&[Value::from("ny"), Value::Int(2020)]),
            Some(3.0)
        );
        assert!(series.get(&[Value::from("tx"), Value::Int(2020)]).is_none());
        assert_eq!(
            series.level_values("year").unwrap(),
            vec![&Value::Int(2020), &Value::Int(2021)]
        );
    }
}
