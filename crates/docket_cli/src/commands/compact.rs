//! Compact command implementation.

use super::CommandResult;
use docket_storage::{LogStore, LogStoreConfig};
use std::path::Path;

/// Rewrites the log as one snapshot record and reports the space saved.
pub fn run(path: &Path) -> CommandResult {
    if !path.exists() {
        return Err(format!("No database found at {}", path.display()).into());
    }

    println!("Compacting {}", path.display());
    let store = LogStore::open(path, LogStoreConfig::default().create_if_missing(false))?;
    let stats = store.compact()?;

    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    println!("  Live keys:   {}", stats.keys);
    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        saved,
        if stats.bytes_before > 0 {
            (saved as f64 / stats.bytes_before as f64) * 100.0
        } else {
            0.0
        }
    );
    Ok(())
}
