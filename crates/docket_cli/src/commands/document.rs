//! Document commands: put, get, del and history.

use super::{open, print_json, read_json, CommandResult};
use docket_core::Document;
use serde_json::json;
use std::path::Path;

/// Writes the document read from `source` and prints its id.
pub fn put(db_path: &Path, table: &str, source: &str) -> CommandResult {
    let document: Document = read_json(source)?;
    let id = open(db_path)?.put(table, document)?;
    print_json(&json!({ "_id": id }))
}

/// Prints the latest (or a given) version of a document.
pub fn get(db_path: &Path, table: &str, id: &str, version: Option<&str>) -> CommandResult {
    let db = open(db_path)?;
    let document = match version {
        Some(version) => db.get_version(table, id, version)?,
        None => db.get(table, id)?,
    };
    match document {
        Some(document) => print_json(&document),
        None => Err(format!("{table}:{id} not found").into()),
    }
}

/// Deletes a document.
pub fn del(db_path: &Path, table: &str, id: &str) -> CommandResult {
    open(db_path)?.del(table, id)?;
    print_json(&json!({ "deleted": format!("{table}:{id}") }))
}

/// Prints every stored version of a document, oldest first.
pub fn history(db_path: &Path, table: &str, id: &str) -> CommandResult {
    let versions = open(db_path)?.history(table, id)?;
    let rows: Vec<_> = versions
        .into_iter()
        .map(|v| json!({ "version": v.version, "document": v.document }))
        .collect();
    print_json(&rows)
}
