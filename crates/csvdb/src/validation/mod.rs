//! Validation of table contents against a rule file.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use csvdb::{Database, DatabaseOptions};
//! use csvdb::validation::{RuleOptions, RuleSet, ValidationOptions, Validator};
//!
//! let db = Database::open("db", DatabaseOptions::default()).unwrap();
//! let rules = RuleSet::load(&db, "validation.csv", &RuleOptions::default()).unwrap();
//! let report = Validator::new(&db, Arc::new(rules))
//!     .check_database(&ValidationOptions::new().with_check_unique(true))
//!     .unwrap();
//! print!("{}", report);
//! ```

mod checks;
mod report;
mod rules;

pub use checks::{ValidationOptions, Validator, unique_columns};
pub use report::{Expectation, Problem, TableReport, ValidationReport, Violation};
pub use rules::{
    GENERIC_PREFIX, RULE_COLUMNS, RuleCheck, RuleOptions, RuleSet, TypePredicate, ValidationRule,
    is_bool_word, parse_flag,
};
