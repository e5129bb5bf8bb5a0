//! Show command - print the projection of one key.

use std::path::PathBuf;

use colored::Colorize;
use csvdb::{
    DuplicatePolicy, RowQuery, Scenario, SensitivityResolver, Value,
    value::{convert, infer_kind},
};

use super::{CommandResult, open_database};

pub struct ShowArgs {
    pub dbdir: PathBuf,
    pub table: String,
    pub key: Option<String>,
    pub filters: Vec<String>,
    pub metadata: Option<PathBuf>,
    pub scenario: Option<PathBuf>,
    pub strict_duplicates: bool,
    pub json: bool,
}

/// Parse `COLUMN=VALUE`, typing the value the way a CSV cell would be.
fn parse_filter(text: &str) -> Result<(String, Value), String> {
    let (column, raw) = text
        .split_once('=')
        .ok_or_else(|| format!("filter '{}' is not COLUMN=VALUE", text))?;
    let raw = raw.trim();
    let kind = infer_kind(std::iter::once(raw));
    Ok((column.trim().to_string(), convert(raw, kind)))
}

pub fn run(args: ShowArgs) -> CommandResult {
    let db = open_database(&args.dbdir, args.metadata.as_ref())?;
    let scenario = args.scenario.as_ref().map(Scenario::load).transpose()?;

    let mut query = match &args.key {
        Some(key) => RowQuery::key(key.as_str()),
        None => RowQuery::unkeyed(),
    };
    for filter in &args.filters {
        let (column, value) = parse_filter(filter)?;
        query = query.with_filter(column, value);
    }
    if args.strict_duplicates {
        query = query.with_duplicate_policy(DuplicatePolicy::Error);
    }

    let resolver = scenario.as_ref().map(|s| s as &dyn SensitivityResolver);
    let Some(projection) = db.project(&args.table, &query, resolver)? else {
        eprintln!(
            "{} no rows in {} for {}",
            "warning:".yellow().bold(),
            args.table,
            args.key.as_deref().unwrap_or("<no key>")
        );
        return Ok(1);
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&projection)?);
        return Ok(0);
    }

    println!(
        "{} {}",
        projection.table.cyan().bold(),
        projection.key.as_deref().unwrap_or("").white().bold()
    );
    if let Some(sensitivity) = &projection.sensitivity {
        println!("  sensitivity: {}", sensitivity.magenta());
    }
    for (column, value) in &projection.attributes {
        println!("  {:<24} {}", column, value);
    }

    if let Some(series) = &projection.series {
        println!();
        let header: Vec<&str> = series
            .index_names()
            .iter()
            .chain(series.value_names())
            .map(String::as_str)
            .collect();
        println!("  {}", header.join("\t").yellow());
        for (index, values) in series.iter() {
            let cells: Vec<String> = index
                .iter()
                .chain(values.iter())
                .map(Value::to_string)
                .collect();
            println!("  {}", cells.join("\t"));
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_types_values() {
        assert_eq!(
            parse_filter("year=2020").unwrap(),
            ("year".to_string(), Value::Int(2020))
        );
        assert_eq!(
            parse_filter("region = west").unwrap(),
            ("region".to_string(), Value::from("west"))
        );
        assert!(parse_filter("year").is_err());
    }
}
