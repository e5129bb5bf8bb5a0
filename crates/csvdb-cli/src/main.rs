//! csvdb CLI - inspect and validate CSV table databases.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing::level_filters::LevelFilter;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let result = match cli.command {
        Commands::Tables {
            dbdir,
            metadata,
            sources,
            json,
        } => commands::tables::run(commands::tables::TablesArgs {
            dbdir,
            metadata,
            sources,
            json,
        }),

        Commands::Validate {
            dbdir,
            rules,
            metadata,
            check_unique,
            include_shapes,
            skip_table,
            json,
        } => commands::validate::run(commands::validate::ValidateArgs {
            dbdir,
            rules,
            metadata,
            check_unique,
            include_shapes,
            skip_tables: skip_table,
            json,
        }),

        Commands::Show {
            dbdir,
            table,
            key,
            filter,
            metadata,
            scenario,
            strict_duplicates,
            json,
        } => commands::show::run(commands::show::ShowArgs {
            dbdir,
            table,
            key,
            filters: filter,
            metadata,
            scenario,
            strict_duplicates,
            json,
        }),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
