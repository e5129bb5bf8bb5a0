//! Tables command - list the tables of a database.

use std::path::PathBuf;

use colored::Colorize;
use csvdb::{Database, SourceMetadata, Table};
use serde_json::json;

use super::{CommandResult, open_database};

pub struct TablesArgs {
    pub dbdir: PathBuf,
    pub metadata: Option<PathBuf>,
    pub sources: bool,
    pub json: bool,
}

/// One line describing a file a table was read from.
fn source_line(source: &SourceMetadata) -> String {
    let hash = if source.hash.is_empty() {
        "-"
    } else {
        &source.hash[..source.hash.len().min(12)]
    };
    format!(
        "{:<30} {:>10} bytes{} {:>5} rows  sha256={}  loaded {}",
        source.file,
        source.size_bytes,
        if source.compressed { " (gz)" } else { "     " },
        source.row_count,
        hash,
        source.loaded_at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// JSON summary of a loaded table and its source files.
fn table_summary(table: &Table) -> serde_json::Value {
    json!({
        "name": table.name(),
        "key": table.metadata().key_column(),
        "rows": table.row_count(),
        "columns": table.columns(),
        "sources": table.sources(),
    })
}

fn run_json(db: &Database) -> CommandResult {
    let mut tables = Vec::new();
    for name in db.table_names() {
        match db.get_table(name) {
            Ok(table) => tables.push(table_summary(&table)),
            Err(e) => tables.push(json!({ "name": name, "error": e.to_string() })),
        }
    }
    let shapes: Vec<&str> = db.shapes().names().collect();
    let output = json!({ "root": db.root(), "tables": tables, "shapes": shapes });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(0)
}

pub fn run(args: TablesArgs) -> CommandResult {
    let db = open_database(&args.dbdir, args.metadata.as_ref())?;
    if args.json {
        return run_json(&db);
    }

    println!(
        "{} {}",
        "Tables in".cyan().bold(),
        db.root().display().to_string().white()
    );
    println!();

    for name in db.table_names() {
        let md = db.table_metadata(name);
        let files = db.file_for_table(name).map_or(0, <[PathBuf]>::len);
        let kind = if md.has_series() { "series" } else { "" };
        println!(
            "  {:<30} {:>3} file(s)  key={:<12} {}",
            name.white().bold(),
            files,
            md.key_column().unwrap_or("-"),
            kind.dimmed()
        );

        if args.sources {
            match db.get_table(name) {
                Ok(table) => {
                    for source in table.sources() {
                        println!("      {}", source_line(source).dimmed());
                    }
                }
                Err(e) => println!("      {} {}", "failed to load:".red(), e),
            }
        }
    }

    let shapes: Vec<&str> = db.shapes().names().collect();
    if !shapes.is_empty() {
        println!();
        println!("{}", "Shapes:".yellow().bold());
        for name in shapes {
            println!("  {}", name);
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use csvdb::{LoadOptions, MetadataDescriptor};

    fn table() -> Table {
        Table::from_csv_bytes(
            "FUELS",
            b"name,co2\ngas,50\ncoal,90\n",
            &MetadataDescriptor::default_for("FUELS"),
            &LoadOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_table_summary_lists_sources() {
        let summary = table_summary(&table());
        assert_eq!(summary["name"], "FUELS");
        assert_eq!(summary["key"], "name");
        assert_eq!(summary["rows"], 2);

        let source = &summary["sources"][0];
        assert_eq!(source["file"], "<FUELS>");
        assert_eq!(source["size_bytes"], 24);
        assert_eq!(source["compressed"], false);
        assert!(source["loaded_at"].is_string());
    }

    #[test]
    fn test_source_line() {
        let table = table();
        let line = source_line(&table.sources()[0]);
        assert!(line.starts_with("<FUELS>"));
        assert!(line.contains("24 bytes"));
        assert!(line.contains("sha256=-"));

        let mut hashed = table.sources()[0].clone();
        hashed.hash = "0123456789abcdef0123".into();
        hashed.compressed = true;
        let line = source_line(&hashed);
        assert!(line.contains("sha256=0123456789ab "));
        assert!(line.contains("(gz)"));
    }
}
