//! docket CLI
//!
//! Command-line front end for a docket database stored in one log file.
//! Documents, schemas and requests are read as JSON from files (or `-`
//! for stdin) and results are printed as JSON.
//!
//! # Commands
//!
//! - `migrate` - Apply a schema to its table
//! - `put`, `get`, `del`, `history` - Document operations
//! - `query` - Run a table or graph request
//! - `explain` - Show the plan for a filter
//! - `tables` - List migrated tables
//! - `compact` - Rewrite the log as a single snapshot
//! - `dump` - Print raw keys and values

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docket command-line database tools.
#[derive(Parser)]
#[command(name = "docket")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database log file
    #[arg(global = true, short, long, default_value = "docket.log")]
    db: PathBuf,

    /// Enable verbose output (repeat for trace)
    #[arg(global = true, short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a schema (JSON file, or - for stdin)
    Migrate {
        /// Schema file
        schema: String,
    },

    /// Write a document and print its id
    Put {
        /// Target table
        table: String,
        /// Document file, or - for stdin
        document: String,
    },

    /// Print a document
    Get {
        /// Table
        table: String,
        /// Document id
        id: String,
        /// Read this version instead of the latest
        #[arg(long)]
        version: Option<String>,
    },

    /// Delete a document
    Del {
        /// Table
        table: String,
        /// Document id
        id: String,
    },

    /// Print every version of a document
    History {
        /// Table
        table: String,
        /// Document id
        id: String,
    },

    /// Run a table query or graph pattern (JSON file, or - for stdin)
    Query {
        /// Request file
        request: String,
    },

    /// Show how a filter would be executed
    Explain {
        /// Table
        table: String,
        /// Filter file, or - for stdin; omit to plan a full scan
        filter: Option<String>,
    },

    /// List migrated tables and their indexes
    Tables {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Rewrite the log as a single snapshot record
    Compact,

    /// Print raw keys and values
    Dump {
        /// Only keys starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Migrate { schema } => commands::migrate::run(&cli.db, &schema)?,
        Commands::Put { table, document } => commands::document::put(&cli.db, &table, &document)?,
        Commands::Get { table, id, version } => {
            commands::document::get(&cli.db, &table, &id, version.as_deref())?;
        }
        Commands::Del { table, id } => commands::document::del(&cli.db, &table, &id)?,
        Commands::History { table, id } => commands::document::history(&cli.db, &table, &id)?,
        Commands::Query { request } => commands::query::run(&cli.db, &request)?,
        Commands::Explain { table, filter } => {
            commands::query::explain(&cli.db, &table, filter.as_deref())?;
        }
        Commands::Tables { format } => commands::inspect::tables(&cli.db, &format)?,
        Commands::Compact => commands::compact::run(&cli.db)?,
        Commands::Dump { prefix, limit } => {
            commands::inspect::dump(&cli.db, prefix.as_deref(), limit)?;
        }
    }

    Ok(())
}
