//! Validate command - check a database against a rule file.

use std::path::PathBuf;

use colored::Colorize;
use csvdb::validation::{RuleOptions, ValidationOptions, Validator};
use tracing::debug;

use super::{CommandResult, open_database};

pub struct ValidateArgs {
    pub dbdir: PathBuf,
    pub rules: PathBuf,
    pub metadata: Option<PathBuf>,
    pub check_unique: bool,
    pub include_shapes: bool,
    pub skip_tables: Vec<String>,
    pub json: bool,
}

pub fn run(args: ValidateArgs) -> CommandResult {
    let db = open_database(&args.dbdir, args.metadata.as_ref())?;
    let rules = db.validation_rules(&args.rules, &RuleOptions::default())?;
    debug!(rules = rules.len(), "loaded validation rules");

    let options = ValidationOptions::new()
        .with_check_unique(args.check_unique)
        .with_shapes(args.include_shapes)
        .with_skip_tables(args.skip_tables);
    let report = Validator::new(&db, rules).check_database(&options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_clean() {
        println!(
            "{} ({} tables checked)",
            "Database is clean".green().bold(),
            report.tables_checked
        );
    } else {
        for table in &report.tables {
            print!("{}", table.to_string().red());
        }
        println!(
            "{} problem(s), {} violation(s) in {} tables checked",
            report.problem_count().to_string().red().bold(),
            report.violation_count().to_string().red(),
            report.tables_checked
        );
    }

    Ok(if report.is_clean() { 0 } else { 1 })
}
