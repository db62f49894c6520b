//! CLI command implementations.

pub mod compact;
pub mod document;
pub mod inspect;
pub mod migrate;
pub mod query;

use docket_core::{Config, Database};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// Result type shared by the commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Opens the database log at `path`, creating it if missing.
pub fn open(path: &Path) -> CommandResult<Database> {
    Ok(Database::open_path(path, Config::default())?)
}

/// Reads JSON from a file, or from stdin when `source` is `-`.
pub fn read_json<T: DeserializeOwned>(source: &str) -> CommandResult<T> {
    let text = if source == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        text
    } else {
        fs::read_to_string(source).map_err(|e| format!("cannot read {source}: {e}"))?
    };
    Ok(serde_json::from_str(&text)?)
}

/// Prints a value as pretty JSON on stdout.
pub fn print_json(value: &impl Serialize) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, value: serde_json::Value) -> String {
        let path = dir.path().join(name);
        fs::write(&path, value.to_string()).unwrap();
        path.display().to_string()
    }

    #[test]
    fn commands_share_one_log() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("docket.log");
        let schema = write(
            &dir,
            "schema.json",
            json!({ "name": "User", "indexes": { "name": { "type": "equality", "fields": ["name"] } } }),
        );
        let user = write(&dir, "user.json", json!({ "_id": "1", "name": "J" }));
        let filter = write(&dir, "filter.json", json!({ "type": "eq", "field": "name", "value": "J" }));
        let request = write(&dir, "request.json", json!({ "table": "User", "count": true }));

        migrate::run(&db_path, &schema).unwrap();
        document::put(&db_path, "User", &user).unwrap();
        document::get(&db_path, "User", "1", None).unwrap();
        query::explain(&db_path, "User", Some(&filter)).unwrap();
        query::run(&db_path, &request).unwrap();
        inspect::tables(&db_path, "json").unwrap();
        inspect::dump(&db_path, Some("%User/$i/"), None).unwrap();
        compact::run(&db_path).unwrap();

        document::del(&db_path, "User", "1").unwrap();
        assert!(document::get(&db_path, "User", "1", None).is_err());
        document::history(&db_path, "User", "1").unwrap();

        let db = open(&db_path).unwrap();
        assert_eq!(db.history("User", "1").unwrap().len(), 2);
    }

    #[test]
    fn unreadable_input_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json").display().to_string();
        assert!(read_json::<serde_json::Value>(&missing).is_err());
        assert!(inspect::tables(&dir.path().join("docket.log"), "xml").is_err());
    }
}
