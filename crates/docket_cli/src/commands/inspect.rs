//! Inspection commands: tables and dump.

use super::{open, print_json, CommandResult};
use docket_core::keys::{self, prefix_range};
use docket_storage::ScanRange;
use serde::Serialize;
use std::path::Path;

/// One table in the `tables` listing.
#[derive(Debug, Serialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Current schema version.
    pub version: Option<String>,
    /// Index name and type pairs.
    pub indexes: Vec<(String, String)>,
}

/// Lists migrated tables with their indexes.
pub fn tables(db_path: &Path, format: &str) -> CommandResult {
    let db = open(db_path)?;
    let tables: Vec<TableInfo> = db
        .tables()
        .into_iter()
        .filter_map(|name| db.schema(&name))
        .map(|schema| TableInfo {
            name: schema.name,
            version: schema.version,
            indexes: schema
                .indexes
                .into_iter()
                .map(|(name, spec)| (name, spec.kind))
                .collect(),
        })
        .collect();

    match format {
        "json" => print_json(&tables),
        "text" => {
            println!("Tables ({} total)", tables.len());
            println!("================");
            for table in &tables {
                println!(
                    "  {} (schema {})",
                    table.name,
                    table.version.as_deref().unwrap_or("-")
                );
                for (name, kind) in &table.indexes {
                    println!("      {name}: {kind}");
                }
            }
            Ok(())
        }
        other => Err(format!("unknown format {other}").into()),
    }
}

/// Prints raw store entries, keys made printable and values decoded as
/// JSON where possible.
pub fn dump(db_path: &Path, prefix: Option<&str>, limit: Option<usize>) -> CommandResult {
    let db = open(db_path)?;
    let range = prefix.map_or_else(ScanRange::all, prefix_range);
    let mut shown = 0;
    for item in db.store().scan(&range)?.take(limit.unwrap_or(usize::MAX)) {
        let (key, value) = item?;
        let rendered = match serde_json::from_slice::<serde_json::Value>(&value) {
            Ok(json) => json.to_string(),
            Err(_) => format!("<{} bytes>", value.len()),
        };
        println!("{}\t{rendered}", keys::printable(&key));
        shown += 1;
    }
    eprintln!("{shown} entries");
    Ok(())
}
