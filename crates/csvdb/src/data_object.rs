//! Application data objects built from projections.
//!
//! An application type implements [`DataObject`] for the table it is read
//! from; [`DataObject::load`] does the lookup and hands the resulting
//! [`Projection`] to the type's constructor.

use crate::database::Database;
use crate::error::Result;
use crate::projection::{Projection, RowQuery, SensitivityResolver};
use crate::value::Value;

/// Column naming another key whose attributes should be used instead.
pub const REFERENCE_NAME_COLUMN: &str = "reference_name";

/// A typed view of one key of a table.
pub trait DataObject: Sized {
    /// Table the object is read from.
    const TABLE_NAME: &'static str;

    /// Build the object from its projected rows.
    fn from_projection(projection: Projection) -> Result<Self>;

    /// Load the object matching `query`, or `None` when no row matches.
    fn load(
        db: &Database,
        query: RowQuery,
        scenario: Option<&dyn SensitivityResolver>,
    ) -> Result<Option<Self>> {
        load_projection(db, Self::TABLE_NAME, query, scenario)?
            .map(Self::from_projection)
            .transpose()
    }

    /// Load one object per distinct key of the table.
    fn load_all(db: &Database, scenario: Option<&dyn SensitivityResolver>) -> Result<Vec<Self>> {
        let table = db.get_table(Self::TABLE_NAME)?;
        let Some(key_col) = table.metadata().key_column() else {
            return Ok(Self::load(db, RowQuery::unkeyed(), scenario)?
                .into_iter()
                .collect());
        };

        let mut objects = Vec::new();
        for key in table.distinct_values(key_col).unwrap_or_default() {
            let Value::Text(key) = key else { continue };
            if let Some(obj) = Self::load(db, RowQuery::key(key), scenario)? {
                objects.push(obj);
            }
        }
        Ok(objects)
    }
}

/// Project a key, following a `reference_name` redirection for tables
/// without a series.
pub fn load_projection(
    db: &Database,
    table_name: &str,
    query: RowQuery,
    scenario: Option<&dyn SensitivityResolver>,
) -> Result<Option<Projection>> {
    let table = db.get_table(table_name)?;
    let Some(projection) = table.project(&query, scenario)? else {
        return Ok(None);
    };

    if table.metadata().has_series() {
        return Ok(Some(projection));
    }

    let reference = projection.text(REFERENCE_NAME_COLUMN).map(str::to_string);
    match reference {
        Some(reference) if query.key.as_deref() != Some(reference.as_str()) => {
            let redirected = RowQuery {
                key: Some(reference),
                ..query
            };
            table.project(&redirected, scenario)
        }
        _ => Ok(Some(projection)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseOptions;
    use crate::error::CsvdbError;
    use crate::projection::{Scenario, ScenarioFilter};
    use std::fs;

    #[derive(Debug)]
    struct Tech {
        name: String,
        lifetime: Option<f64>,
    }

    impl DataObject for Tech {
        const TABLE_NAME: &'static str = "TECH";

        fn from_projection(p: Projection) -> Result<Self> {
            let name = p
                .text("name")
                .ok_or_else(|| CsvdbError::Invariant("TECH row without a name".into()))?
                .to_string();
            Ok(Self {
                name,
                lifetime: p.number("lifetime"),
            })
        }
    }

    fn make_db() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("TECH.csv"),
            "name,sensitivity,lifetime,reference_name\nsolar,,25,\nsolar,long,30,\nwind_copy,,,solar\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_load_with_scenario() {
        let dir = make_db();
        let db = Database::open(dir.path(), DatabaseOptions::default()).unwrap();

        let base = Tech::load(&db, RowQuery::key("solar"), None).unwrap().unwrap();
        assert_eq!(base.lifetime, Some(25.0));

        let scenario = Scenario::new("s")
            .with_filter(ScenarioFilter::new("TECH", Some("solar"), "long"))
            .unwrap();
        let long = Tech::load(&db, RowQuery::key("solar"), Some(&scenario))
            .unwrap()
            .unwrap();
        assert_eq!(long.lifetime, Some(30.0));
    }

    #[test]
    fn test_reference_name_redirect() {
        let dir = make_db();
        let db = Database::open(dir.path(), DatabaseOptions::default()).unwrap();

        let copy = Tech::load(&db, RowQuery::key("wind_copy"), None)
            .unwrap()
            .unwrap();
        assert_eq!(copy.name, "solar");
        assert_eq!(copy.lifetime, Some(25.0));

        assert!(Tech::load(&db, RowQuery::key("geo"), None).unwrap().is_none());
    }

    #[test]
    fn test_load_all() {
        let dir = make_db();
        let db = Database::open(dir.path(), DatabaseOptions::default()).unwrap();
        let all = Tech::load_all(&db, None).unwrap();
        assert_eq!(all.len(), 2);
    }
}
