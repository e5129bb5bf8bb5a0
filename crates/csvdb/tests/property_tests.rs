//! Property-based tests for csvdb.
//!
//! Property-based tests verify:
//! 1. **No panics**: loading and projecting never crash on generated tables
//! 2. **Determinism**: projecting the same key twice gives the same result
//! 3. **Invariants**: keys are never missing, series are sorted and unique
//!
//! # Running Property Tests
//!
//! ```bash
//! cargo test -p csvdb --test property_tests
//! PROPTEST_CASES=10000 cargo test -p csvdb --test property_tests
//! ```

use proptest::prelude::*;

use csvdb::{
    KeyPolicy, LoadOptions, MetadataDescriptor, RowQuery, Table, Value,
    value::{convert, infer_kind},
};

// =============================================================================
// Test Strategies
// =============================================================================

/// Short lowercase keys, including empty ones.
fn key() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-c]{1,2}",
        1 => Just(String::new()),
    ]
}

/// `(key, year, value)` rows for a series table.
fn series_rows() -> impl Strategy<Value = Vec<(String, u16, i32)>> {
    prop::collection::vec((key(), 2000u16..2005, -1000i32..1000), 0..40)
}

fn series_csv(rows: &[(String, u16, i32)]) -> String {
    let mut csv = String::from("name,year,value\n");
    for (k, y, v) in rows {
        csv.push_str(&format!("{},{},{}\n", k, y, v));
    }
    csv
}

fn load(csv: &str, policy: KeyPolicy) -> csvdb::Result<Table> {
    let md = MetadataDescriptor::new("S").with_series_index(["year"]);
    Table::from_csv_bytes(
        "S",
        csv.as_bytes(),
        &md,
        &LoadOptions::default().with_key_policy(policy),
    )
}

// =============================================================================
// Value properties
// =============================================================================

proptest! {
    #[test]
    fn integers_infer_as_int(values in prop::collection::vec(any::<i32>(), 1..20)) {
        let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let kind = infer_kind(cells.iter().map(String::as_str));
        prop_assert_eq!(kind, csvdb::ColumnKind::Int);
        for (cell, v) in cells.iter().zip(&values) {
            prop_assert_eq!(convert(cell, kind), Value::Int(*v as i64));
        }
    }

    #[test]
    fn folding_ignores_case(text in "[a-zA-Z]{1,12}") {
        let upper = Value::from(text.to_uppercase());
        let lower = Value::from(text.to_lowercase());
        prop_assert!(upper.loose_eq(&lower));
    }

    #[test]
    fn value_ordering_is_total(a in any::<f64>(), b in any::<i64>()) {
        let x = Value::Float(a);
        let y = Value::Int(b);
        // antisymmetric and consistent with equality
        prop_assert_eq!(x.cmp(&y), y.cmp(&x).reverse());
        prop_assert_eq!(x.cmp(&x), std::cmp::Ordering::Equal);
    }
}

// =============================================================================
// Table and projection properties
// =============================================================================

proptest! {
    #[test]
    fn dropped_tables_have_no_missing_keys(rows in series_rows()) {
        let table = load(&series_csv(&rows), KeyPolicy::Drop).unwrap();
        let expected = rows.iter().filter(|(k, _, _)| !k.is_empty()).count();
        prop_assert_eq!(table.row_count(), expected);
        prop_assert!(table.column_values("name").map_or(true, |mut vals| vals.all(|v| !v.is_null())));
    }

    #[test]
    fn strict_loading_rejects_missing_keys(rows in series_rows()) {
        let result = load(&series_csv(&rows), KeyPolicy::Reject);
        let any_missing = rows.iter().any(|(k, _, _)| k.is_empty());
        prop_assert_eq!(result.is_err(), any_missing);
    }

    #[test]
    fn projection_is_idempotent_and_sorted(rows in series_rows(), wanted in "[a-c]{1,2}") {
        let table = load(&series_csv(&rows), KeyPolicy::Drop).unwrap();
        let query = RowQuery::key(wanted.clone());

        let first = table.project(&query, None).unwrap();
        let second = table.project(&query, None).unwrap();
        prop_assert_eq!(&first, &second);

        let expected_years: std::collections::BTreeSet<u16> = rows
            .iter()
            .filter(|(k, _, _)| *k == wanted)
            .map(|(_, y, _)| *y)
            .collect();

        match first {
            None => prop_assert!(expected_years.is_empty()),
            Some(p) => {
                let series = p.series.unwrap();
                let years: Vec<Value> = series.iter().map(|(idx, _)| idx[0].clone()).collect();
                let expected: Vec<Value> = expected_years.iter().map(|y| Value::Int(*y as i64)).collect();
                prop_assert_eq!(years, expected);
            }
        }
    }

    #[test]
    fn keep_first_selects_first_row_in_file_order(rows in series_rows()) {
        let table = load(&series_csv(&rows), KeyPolicy::Drop).unwrap();
        for k in ["a", "b", "c"] {
            let Some(p) = table.project(&RowQuery::key(k), None).unwrap() else { continue };
            let series = p.series.unwrap();
            for (idx, vals) in series.iter() {
                let Value::Int(year) = idx[0] else { panic!("year should be an int") };
                let first = rows
                    .iter()
                    .find(|(rk, y, _)| rk == k && *y as i64 == year)
                    .map(|(_, _, v)| *v as f64);
                prop_assert_eq!(vals[0].to_f64(), first);
            }
        }
    }
}
