//! Query and explain commands.

use super::{open, print_json, read_json, CommandResult};
use docket_core::{Filter, Request};
use std::path::Path;

/// Runs a table query or graph pattern and prints the response.
pub fn run(db_path: &Path, source: &str) -> CommandResult {
    let request: Request = read_json(source)?;
    let response = open(db_path)?.execute(&request)?;
    print_json(&response)
}

/// Prints the plan chosen for a filter over `table`.
pub fn explain(db_path: &Path, table: &str, source: Option<&str>) -> CommandResult {
    let filter: Option<Filter> = source.map(read_json::<Filter>).transpose()?;
    let plan = open(db_path)?.explain(table, filter.as_ref())?;
    print_json(&plan.describe())
}
