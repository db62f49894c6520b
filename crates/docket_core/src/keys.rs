//! Key codec.
//!
//! Every key starts with a sigil that partitions the shared key space:
//!
//! ```text
//! #metadata                                   table registry
//! %{table}/$schema/latest                     current schema
//! %{table}/$schema:{version}                  schema history
//! %{table}/$latest:{id}                       latest document (or tombstone)
//! %{table}/$v/{id}␀{version}                  immutable document versions
//! %{table}/$i/{index}:{value}{id}             index entries
//! @{perm}/{c1}␀{c2}␀{c3}␀{subject}␀{object}   link permutations
//! ```
//!
//! `␀` is [`TERMINATOR`]. Encoded values end with a terminator and never
//! contain one, so entries for one value are contiguous and encoded values
//! sort the way the values do. [`SENTINEL`] sorts after every character a
//! key component can contain; `prefix + SENTINEL` is the exclusive upper
//! bound of a prefix scan.

use docket_storage::ScanRange;
use serde_json::Value;
use std::borrow::Cow;

/// Key of the table registry.
pub const METADATA_KEY: &str = "#metadata";

/// Ends every encoded value component.
pub const TERMINATOR: char = '\u{0}';

/// Sorts after every legal component character.
pub const SENTINEL: char = char::MAX;

/// Encoding of null and missing fields.
pub const NULL: &str = "NULL";

const ESCAPE: char = '\u{1}';

/// Escapes a component so it contains no [`TERMINATOR`] and no [`SENTINEL`].
///
/// Order is preserved: for any strings `a < b`, `escape(a) < escape(b)`.
#[must_use]
pub fn escape(raw: &str) -> Cow<'_, str> {
    if !raw.contains([TERMINATOR, ESCAPE, SENTINEL]) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        match c {
            TERMINATOR => out.push_str("\u{1}\u{1}"),
            ESCAPE => out.push_str("\u{1}\u{2}"),
            SENTINEL => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Reverses [`escape`]. A replaced sentinel stays U+FFFD.
#[must_use]
pub fn unescape(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            match chars.next() {
                Some('\u{1}') => out.push(TERMINATOR),
                Some('\u{2}') => out.push(ESCAPE),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Exclusive upper bound for keys starting with `prefix`.
#[must_use]
pub fn upper_bound(prefix: &str) -> String {
    let mut bound = String::with_capacity(prefix.len() + SENTINEL.len_utf8());
    bound.push_str(prefix);
    bound.push(SENTINEL);
    bound
}

/// Half-open range `[prefix, prefix + SENTINEL)`.
#[must_use]
pub fn prefix_range(prefix: &str) -> ScanRange {
    ScanRange::half_open(prefix, upper_bound(prefix))
}

/// Prefix shared by every key of a table.
#[must_use]
pub fn table_prefix(table: &str) -> String {
    format!("%{table}/")
}

/// Key of a table's current schema.
#[must_use]
pub fn schema_latest_key(table: &str) -> String {
    format!("%{table}/$schema/latest")
}

/// Key of one schema version.
#[must_use]
pub fn schema_version_key(table: &str, version: &str) -> String {
    format!("{}{version}", schema_history_prefix(table))
}

/// Prefix of a table's schema history.
#[must_use]
pub fn schema_history_prefix(table: &str) -> String {
    format!("%{table}/$schema:")
}

/// Prefix of all latest-document keys of a table.
#[must_use]
pub fn latest_prefix(table: &str) -> String {
    format!("%{table}/$latest:")
}

/// Key of a document's latest pointer.
#[must_use]
pub fn latest_key(table: &str, id: &str) -> String {
    format!("{}{}", latest_prefix(table), escape(id))
}

/// Prefix of all versions of one document.
#[must_use]
pub fn version_prefix(table: &str, id: &str) -> String {
    format!("%{table}/$v/{}{TERMINATOR}", escape(id))
}

/// Key of one immutable document version.
#[must_use]
pub fn version_key(table: &str, id: &str, version: &str) -> String {
    format!("{}{version}", version_prefix(table, id))
}

/// Prefix of every entry of one index.
#[must_use]
pub fn index_prefix(table: &str, index: &str) -> String {
    format!("%{table}/$i/{index}:")
}

/// Key of one index entry.
///
/// `value` is an encoded value (see [`encode_value`]); `id` is omitted for
/// unique indexes.
#[must_use]
pub fn index_key(table: &str, index: &str, value: &str, id: Option<&str>) -> String {
    let mut key = index_prefix(table, index);
    key.push_str(value);
    if let Some(id) = id {
        key.push_str(&escape(id));
    }
    key
}

/// Splits an index key into its encoded value and its (possibly empty) id.
#[must_use]
pub fn split_index_key<'k>(key: &'k str, prefix: &str) -> Option<(&'k str, &'k str)> {
    let rest = key.strip_prefix(prefix)?;
    let end = rest.rfind(TERMINATOR)? + TERMINATOR.len_utf8();
    Some(rest.split_at(end))
}

/// Prefix of a link permutation followed by its bound leading components.
#[must_use]
pub fn link_prefix(permutation: &str, bound: &[&str]) -> String {
    let mut key = format!("@{permutation}/");
    for component in bound {
        key.push_str(&escape(component));
        key.push(TERMINATOR);
    }
    key
}

/// Key of one link permutation entry.
#[must_use]
pub fn link_key(permutation: &str, components: [&str; 3], subject_id: &str, object_id: &str) -> String {
    let mut key = link_prefix(permutation, &components);
    key.push_str(&escape(subject_id));
    key.push(TERMINATOR);
    key.push_str(&escape(object_id));
    key
}

/// Type region of an encoded value.
///
/// Every encoding of a value of this JSON type starts with the returned tag.
#[must_use]
pub fn type_tag(value: Option<&Value>) -> &'static str {
    match value {
        None | Some(Value::Null) => NULL,
        Some(Value::Bool(_)) => "b",
        Some(Value::Number(_)) => "n",
        Some(Value::String(_)) => "s",
        Some(Value::Array(_) | Value::Object(_)) => "j",
    }
}

/// Encodes one index value component, terminator included.
///
/// Values of one JSON type share a tag and sort among themselves the way
/// they compare: numbers numerically, strings by code point, `false` before
/// `true`. Arrays and objects are encoded as their JSON text.
#[must_use]
pub fn encode_value(value: Option<&Value>) -> String {
    let mut out = String::from(type_tag(value));
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Bool(b)) => out.push(if *b { '1' } else { '0' }),
        Some(Value::Number(n)) => {
            let f = n.as_f64().unwrap_or_default();
            out.push_str(&format!("{:016x}", sortable_f64(f)));
        }
        Some(Value::String(s)) => out.push_str(&escape(s)),
        Some(other) => out.push_str(&escape(&other.to_string())),
    }
    out.push(TERMINATOR);
    out
}

/// Encodes a full-text term, terminator included.
#[must_use]
pub fn encode_term(term: &str) -> String {
    let mut out = escape(term).into_owned();
    out.push(TERMINATOR);
    out
}

/// Maps an `f64` to a `u64` whose unsigned order matches numeric order.
fn sortable_f64(f: f64) -> u64 {
    // -0.0 and 0.0 compare equal, so they must encode equally.
    let f = if f == 0.0 { 0.0 } else { f };
    let bits = f.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

/// Renders a key for messages and dumps, making separators visible.
#[must_use]
pub fn printable(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            TERMINATOR => '|',
            SENTINEL => '~',
            c => c,
        })
        .collect()
}
