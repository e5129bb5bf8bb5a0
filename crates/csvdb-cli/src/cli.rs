//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// csvdb: inspect and validate directories of CSV tables
#[derive(Parser)]
#[command(name = "csvdb")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tables of a database directory
    Tables {
        /// Database directory
        #[arg(value_name = "DBDIR")]
        dbdir: PathBuf,

        /// JSON file of table metadata descriptors
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Load each table and list the files it was read from
        #[arg(long)]
        sources: bool,

        /// Output as JSON (loads every table)
        #[arg(long)]
        json: bool,
    },

    /// Check every table against a validation rule file
    Validate {
        /// Database directory
        #[arg(value_name = "DBDIR")]
        dbdir: PathBuf,

        /// Validation rule file (CSV)
        #[arg(short, long)]
        rules: PathBuf,

        /// JSON file of table metadata descriptors
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Also report duplicate keys
        #[arg(long)]
        check_unique: bool,

        /// Also validate ShapeData tables
        #[arg(long)]
        include_shapes: bool,

        /// Table to leave out (repeatable)
        #[arg(long, value_name = "TABLE")]
        skip_table: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the projection of one key of a table
    Show {
        /// Database directory
        #[arg(value_name = "DBDIR")]
        dbdir: PathBuf,

        /// Table name
        #[arg(value_name = "TABLE")]
        table: String,

        /// Key to project; omit for tables without a key column
        #[arg(value_name = "KEY")]
        key: Option<String>,

        /// Column filter as COLUMN=VALUE (repeatable)
        #[arg(short, long, value_name = "COLUMN=VALUE")]
        filter: Vec<String>,

        /// JSON file of table metadata descriptors
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Scenario file selecting sensitivities
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Fail on duplicate series indices instead of keeping the first
        #[arg(long)]
        strict_duplicates: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
