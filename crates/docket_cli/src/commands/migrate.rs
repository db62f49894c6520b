//! Migrate command.

use super::{open, print_json, read_json, CommandResult};
use docket_core::Schema;
use std::path::Path;
use tracing::info;

/// Applies the schema read from `source` and prints the migration report.
pub fn run(db_path: &Path, source: &str) -> CommandResult {
    let schema: Schema = read_json(source)?;
    info!(table = %schema.name, path = %db_path.display(), "applying schema");

    let db = open(db_path)?;
    let report = db.migrate(schema)?;
    print_json(&report)
}
