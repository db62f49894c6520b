//! Link triples and their six permuted keys.

use crate::document::{validate_id, validate_name, Document, LINKS_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::keys;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A `table:id` reference to a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EntityRef {
    /// Table of the referenced document.
    pub table: String,
    /// Id of the referenced document.
    pub id: String,
}

impl EntityRef {
    /// Creates a reference.
    pub fn new(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.id)
    }
}

impl FromStr for EntityRef {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let (table, id) = s
            .split_once(':')
            .ok_or_else(|| CoreError::invalid_document(format!("{s:?} is not a table:id reference")))?;
        validate_name("table", table)?;
        validate_id(id)?;
        Ok(Self::new(table, id))
    }
}

impl From<EntityRef> for String {
    fn from(r: EntityRef) -> Self {
        r.to_string()
    }
}

impl TryFrom<String> for EntityRef {
    type Error = CoreError;

    fn try_from(s: String) -> CoreResult<Self> {
        s.parse()
    }
}

/// One of the three positions of a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Subject type (its table).
    Subject,
    /// Predicate.
    Predicate,
    /// Object type (its table).
    Object,
}

/// A sort order of the triple's components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permutation {
    /// subject, predicate, object
    Spo,
    /// subject, object, predicate
    Sop,
    /// predicate, subject, object
    Pso,
    /// predicate, object, subject
    Pos,
    /// object, predicate, subject
    Ops,
    /// object, subject, predicate
    Osp,
}

impl Permutation {
    /// All six permutations.
    pub const ALL: [Permutation; 6] = [
        Self::Spo,
        Self::Sop,
        Self::Pso,
        Self::Pos,
        Self::Ops,
        Self::Osp,
    ];

    /// Key segment naming the permutation.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Spo => "spo",
            Self::Sop => "sop",
            Self::Pso => "pso",
            Self::Pos => "pos",
            Self::Ops => "ops",
            Self::Osp => "osp",
        }
    }

    /// Component positions in key order.
    #[must_use]
    pub const fn order(self) -> [Position; 3] {
        use Position::{Object as O, Predicate as P, Subject as S};
        match self {
            Self::Spo => [S, P, O],
            Self::Sop => [S, O, P],
            Self::Pso => [P, S, O],
            Self::Pos => [P, O, S],
            Self::Ops => [O, P, S],
            Self::Osp => [O, S, P],
        }
    }

    /// Picks the permutation whose leading components are exactly the bound ones.
    #[must_use]
    pub fn for_bound(subject: bool, predicate: bool, object: bool) -> Self {
        let is_bound = |p: Position| match p {
            Position::Subject => subject,
            Position::Predicate => predicate,
            Position::Object => object,
        };
        let count = usize::from(subject) + usize::from(predicate) + usize::from(object);
        Self::ALL
            .into_iter()
            .find(|perm| perm.order()[..count].iter().all(|p| is_bound(*p)))
            .unwrap_or(Self::Spo)
    }
}

/// A relationship edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Document owning the edge.
    pub subject: EntityRef,
    /// Relationship name.
    pub predicate: String,
    /// Document the edge points at.
    pub object: EntityRef,
    /// Edge attributes.
    #[serde(default)]
    pub data: Value,
}

impl Link {
    /// Creates an edge without data.
    pub fn new(subject: EntityRef, predicate: impl Into<String>, object: EntityRef) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
            data: Value::Null,
        }
    }

    fn component(&self, position: Position) -> &str {
        match position {
            Position::Subject => &self.subject.table,
            Position::Predicate => &self.predicate,
            Position::Object => &self.object.table,
        }
    }

    /// Key of this edge under one permutation.
    #[must_use]
    pub fn key(&self, permutation: Permutation) -> String {
        let [a, b, c] = permutation.order();
        keys::link_key(
            permutation.name(),
            [self.component(a), self.component(b), self.component(c)],
            &self.subject.id,
            &self.object.id,
        )
    }

    /// Keys of this edge under all six permutations.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        Permutation::ALL.iter().map(|p| self.key(*p)).collect()
    }

    /// Stored payload: `[subjectRef, predicate, objectRef, data]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be serialized.
    pub fn to_payload(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(&(
            self.subject.to_string(),
            &self.predicate,
            self.object.to_string(),
            &self.data,
        ))?)
    }

    /// Decodes a stored payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid triple.
    pub fn from_payload(bytes: &[u8]) -> CoreResult<Self> {
        let (subject, predicate, object, data): (String, String, String, Value) =
            serde_json::from_slice(bytes)?;
        Ok(Self {
            subject: subject.parse()?,
            predicate,
            object: object.parse()?,
            data,
        })
    }
}

/// Edges a document asks to add and remove.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkOps {
    /// Edges to write.
    pub put: Vec<Link>,
    /// Edges to remove.
    pub del: Vec<Link>,
}

impl LinkOps {
    /// Reads `_links` from a document owned by `subject`.
    ///
    /// The attribute looks like
    /// `{"put": [[predicate, "Table:id", data?], ...], "del": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDocument` if the attribute is malformed.
    pub fn from_document(doc: &Document, subject: &EntityRef) -> CoreResult<Self> {
        let Some(links) = doc.get(LINKS_FIELD) else {
            return Ok(Self::default());
        };
        let Value::Object(links) = links else {
            return Err(CoreError::invalid_document(format!(
                "{LINKS_FIELD} must be an object"
            )));
        };
        Ok(Self {
            put: parse_list(links.get("put"), subject)?,
            del: parse_list(links.get("del"), subject)?,
        })
    }

    /// Returns `true` if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.put.is_empty() && self.del.is_empty()
    }
}

fn parse_list(list: Option<&Value>, subject: &EntityRef) -> CoreResult<Vec<Link>> {
    let items = match list {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(CoreError::invalid_document(format!(
                "{LINKS_FIELD} lists must be arrays"
            )))
        }
    };
    items
        .iter()
        .map(|item| match item.as_array().map(Vec::as_slice) {
            Some([Value::String(predicate), Value::String(object), rest @ ..]) if rest.len() <= 1 => {
                Ok(Link {
                    subject: subject.clone(),
                    predicate: predicate.clone(),
                    object: object.parse()?,
                    data: rest.first().cloned().unwrap_or(Value::Null),
                })
            }
            _ => Err(CoreError::invalid_document(format!(
                "link entries must be [predicate, \"Table:id\", data?], got {item}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn likes() -> Link {
        Link::new(
            EntityRef::new("Person", "1"),
            "likes",
            EntityRef::new("Person", "2"),
        )
    }

    #[test]
    fn entity_ref_parses_and_prints() {
        let r: EntityRef = "User:abc:def".parse().unwrap();
        assert_eq!(r.table, "User");
        assert_eq!(r.id, "abc:def");
        assert_eq!(r.to_string(), "User:abc:def");
        assert!("no-colon".parse::<EntityRef>().is_err());
        assert!(":id".parse::<EntityRef>().is_err());
    }

    #[test]
    fn permutation_selection_follows_bound_set() {
        assert_eq!(Permutation::for_bound(true, true, true), Permutation::Spo);
        assert_eq!(Permutation::for_bound(true, true, false), Permutation::Spo);
        assert_eq!(Permutation::for_bound(true, false, true), Permutation::Sop);
        assert_eq!(Permutation::for_bound(true, false, false), Permutation::Spo);
        assert_eq!(Permutation::for_bound(false, true, true), Permutation::Pos);
        assert_eq!(Permutation::for_bound(false, true, false), Permutation::Pso);
        assert_eq!(Permutation::for_bound(false, false, true), Permutation::Ops);
        assert_eq!(Permutation::for_bound(false, false, false), Permutation::Spo);
    }

    #[test]
    fn six_distinct_keys() {
        let keys = likes().keys();
        assert_eq!(keys.len(), 6);
        let unique: std::collections::BTreeSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 6);
        assert!(keys[0].starts_with("@spo/Person\u{0}likes\u{0}Person\u{0}1\u{0}2"));
    }

    #[test]
    fn payload_round_trip() {
        let mut link = likes();
        link.data = json!({ "since": 2020 });
        let decoded = Link::from_payload(&link.to_payload().unwrap()).unwrap();
        assert_eq!(decoded, link);
    }

    #[test]
    fn link_ops_from_document() {
        let doc = json!({
            "_links": {
                "put": [["likes", "Person:2"], ["owns", "Car:9", { "year": 2001 }]],
                "del": [["hates", "Food:1"]]
            }
        });
        let subject = EntityRef::new("Person", "1");
        let ops = LinkOps::from_document(doc.as_object().unwrap(), &subject).unwrap();
        assert_eq!(ops.put.len(), 2);
        assert_eq!(ops.put[1].data, json!({ "year": 2001 }));
        assert_eq!(ops.del[0].object, EntityRef::new("Food", "1"));
    }

    #[test]
    fn malformed_link_ops_are_rejected() {
        let subject = EntityRef::new("Person", "1");
        for bad in [
            json!({ "_links": [] }),
            json!({ "_links": { "put": "x" } }),
            json!({ "_links": { "put": [["likes"]] } }),
            json!({ "_links": { "put": [["likes", "nocolon"]] } }),
        ] {
            assert!(LinkOps::from_document(bad.as_object().unwrap(), &subject).is_err());
        }
    }
}
