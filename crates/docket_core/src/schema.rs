//! Table schemas and index declarations.

use crate::document::validate_name;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declaration of one secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Registered indexer name (`equality`, `inverted`, `link`, or custom).
    #[serde(rename = "type")]
    pub kind: String,
    /// Field paths the index reads, in key order.
    pub fields: Vec<String>,
    /// Whether at most one live document may hold each value.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    /// Table that bare ids in a link field refer to.
    #[serde(
        default,
        rename = "linkedTable",
        skip_serializing_if = "Option::is_none"
    )]
    pub linked_table: Option<String>,
}

impl IndexSpec {
    /// Creates a spec of the given type over `fields`.
    pub fn new<I, S>(kind: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: kind.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
            linked_table: None,
        }
    }

    /// Equality index over `fields`.
    pub fn equality<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(crate::index::EQUALITY, fields)
    }

    /// Full-text index over `fields`.
    pub fn inverted<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(crate::index::INVERTED, fields)
    }

    /// Link index over `fields`.
    pub fn link<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(crate::index::LINK, fields)
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the table that bare link ids refer to.
    #[must_use]
    pub fn linked_to(mut self, table: impl Into<String>) -> Self {
        self.linked_table = Some(table.into());
        self
    }

    /// Returns the field if this index reads exactly one.
    #[must_use]
    pub fn single_field(&self) -> Option<&str> {
        match self.fields.as_slice() {
            [field] => Some(field),
            _ => None,
        }
    }
}

/// A table declaration: its name and its indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Table name.
    pub name: String,
    /// Indexes by name.
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexSpec>,
    /// Version stamped by the migration that registered this schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Schema {
    /// Creates a schema with no indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: BTreeMap::new(),
            version: None,
        }
    }

    /// Adds or replaces an index.
    #[must_use]
    pub fn with_index(mut self, name: impl Into<String>, spec: IndexSpec) -> Self {
        self.indexes.insert(name.into(), spec);
        self
    }

    /// Layers this schema's indexes over `base`'s.
    ///
    /// The result keeps this schema's name; an index declared by both uses
    /// this schema's spec.
    #[must_use]
    pub fn extend(&self, base: &Schema) -> Schema {
        let mut indexes = base.indexes.clone();
        indexes.extend(self.indexes.clone());
        Schema {
            name: self.name.clone(),
            indexes,
            version: None,
        }
    }

    /// Checks table, index and field names.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` for a bad table or index name and
    /// `InvalidDocument` for an index without fields.
    pub fn validate(&self) -> CoreResult<()> {
        validate_name("table", &self.name)?;
        for (name, spec) in &self.indexes {
            validate_name("index", name)?;
            if spec.fields.is_empty() || spec.fields.iter().any(String::is_empty) {
                return Err(CoreError::invalid_document(format!(
                    "index {name} must declare non-empty fields"
                )));
            }
            if let Some(table) = &spec.linked_table {
                validate_name("table", table)?;
            }
        }
        Ok(())
    }
}
