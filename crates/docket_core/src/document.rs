//! Documents, reserved attributes, field paths and versions.

use crate::error::{CoreError, CoreResult};
use crate::keys::{SENTINEL, TERMINATOR};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A document: a JSON object.
pub type Document = Map<String, Value>;

/// Reserved attribute holding the document id.
pub const ID_FIELD: &str = "_id";

/// Reserved attribute holding the version of the stored write.
pub const VERSION_FIELD: &str = "_v";

/// Reserved attribute holding link operations.
pub const LINKS_FIELD: &str = "_links";

/// Returns the document's id, if it has a string one.
#[must_use]
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Returns the document's version, if present.
#[must_use]
pub fn document_version(doc: &Document) -> Option<&str> {
    doc.get(VERSION_FIELD).and_then(Value::as_str)
}

/// Resolves a dot-separated field path.
///
/// Numeric segments index into arrays: `tags.0`, `authors.1.name`.
#[must_use]
pub fn resolve<'d>(doc: &'d Document, path: &str) -> Option<&'d Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Checks that a document id can be embedded in keys.
///
/// # Errors
///
/// Returns `InvalidName` for empty ids or ids containing control characters
/// reserved by the key codec.
pub fn validate_id(id: &str) -> CoreResult<()> {
    if id.is_empty() || id.contains([TERMINATOR, '\u{1}', SENTINEL]) {
        return Err(CoreError::InvalidName {
            kind: "document id",
            name: id.to_string(),
        });
    }
    Ok(())
}

/// Checks that a table or index name is an identifier.
///
/// # Errors
///
/// Returns `InvalidName` unless the name is non-empty ASCII alphanumerics,
/// `_`, `-` and `.`.
pub fn validate_name(kind: &'static str, name: &str) -> CoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Generates a fresh document id.
#[must_use]
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One entry of a document's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    /// Version token of the write.
    pub version: String,
    /// The document as written, or `None` for a deletion.
    pub document: Option<Document>,
}

/// Width of a rendered version token.
const VERSION_WIDTH: usize = 20;

/// Issues strictly increasing version tokens.
///
/// Tokens are microseconds since the Unix epoch, zero padded so that
/// lexicographic order matches numeric order. When the wall clock stalls or
/// steps back, the previous token plus one is used instead.
#[derive(Debug, Default)]
pub struct VersionClock {
    last: AtomicU64,
}

impl VersionClock {
    /// Creates a clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next version token.
    pub fn next(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return format!("{next:0width$}", width = VERSION_WIDTH),
                Err(actual) => last = actual,
            }
        }
    }

    /// Makes every later token sort after `version`.
    pub fn observe(&self, version: &str) {
        if let Ok(seen) = version.parse::<u64>() {
            self.last.fetch_max(seen, Ordering::AcqRel);
        }
    }
}
