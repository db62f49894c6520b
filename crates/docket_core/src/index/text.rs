//! Text analysis shared by the inverted indexer and `search` filters.
//!
//! Text is split on every character that is neither alphabetic nor `_`
//! (so digits and punctuation both separate tokens), lower-cased, stemmed
//! with the Porter2 (Snowball English) stemmer and deduplicated. Indexing
//! and search run the same pipeline, so a query term matches exactly the
//! entries its stem was written under.

use rust_stemmers::{Algorithm, Stemmer};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static STEMMER: LazyLock<Stemmer> = LazyLock::new(|| Stemmer::create(Algorithm::English));

fn is_token_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Splits text into lower-cased raw tokens, in order, duplicates kept.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !is_token_char(c))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Tokenizes, stems and deduplicates `text`.
#[must_use]
pub fn analyze(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .iter()
        .map(|token| STEMMER.stem(token).into_owned())
        .filter(|term| !term.is_empty())
        .collect()
}

/// Analyzes a field value.
///
/// Strings are analyzed as they are; other non-null values are analyzed as
/// their JSON text. Null and missing fields have no terms.
#[must_use]
pub fn analyze_value(value: Option<&Value>) -> BTreeSet<String> {
    match value {
        None | Some(Value::Null) => BTreeSet::new(),
        Some(Value::String(s)) => analyze(s),
        Some(other) => analyze(&other.to_string()),
    }
}
