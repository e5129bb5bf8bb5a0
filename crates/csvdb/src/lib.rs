//! csvdb: a schema-driven access layer over a directory of CSV tables.
//!
//! A database is a directory of `NAME.csv` / `NAME.csv.gz` files (or
//! `NAME.csvd/` directories of fragments). Each table is described by a
//! [`MetadataDescriptor`] that splits its columns into a key, attributes and
//! an optional time series. On top of the loaded tables, csvdb offers:
//!
//! - **Row projection**: the attributes and series of one key, filtered by
//!   the sensitivity a [`Scenario`] selects
//! - **Validation**: column checks driven by a rule file, including
//!   references into other tables
//!
//! # Example
//!
//! ```no_run
//! use csvdb::{Database, DatabaseOptions, MetadataDescriptor, RowQuery};
//!
//! let options = DatabaseOptions::new().with_metadata(vec![
//!     MetadataDescriptor::new("COST").with_series_index(["vintage"]),
//! ]);
//! let db = Database::open("db", options).unwrap();
//!
//! if let Some(cost) = db.project("COST", &RowQuery::key("solar"), None).unwrap() {
//!     println!("{:?}", cost.attributes);
//! }
//! ```

pub mod data_object;
pub mod database;
pub mod error;
pub mod input;
pub mod intern;
pub mod metadata;
pub mod projection;
pub mod table;
pub mod validation;
pub mod value;

pub use data_object::DataObject;
pub use database::{Database, DatabaseOptions, Registry};
pub use error::{CsvdbError, Result};
pub use input::SourceMetadata;
pub use intern::StringMap;
pub use metadata::MetadataDescriptor;
pub use projection::{
    DuplicatePolicy, Projection, RowQuery, Scenario, ScenarioFilter, SensitivityResolver,
    TimeSeries,
};
pub use table::{KeyPolicy, LoadOptions, REFERENCE_SENSITIVITY, Row, SENSITIVITY_COLUMN, Table};
pub use value::{ColumnKind, Value};
