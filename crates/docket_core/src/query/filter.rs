//! Filter trees as they appear in requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A boolean expression over document fields.
///
/// Serialized internally tagged by `type`:
///
/// ```json
/// { "type": "and", "expressions": [
///     { "type": "eq", "field": "name", "value": "James" },
///     { "type": "within", "field": "age", "start": 18, "end": 30 }
/// ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Filter {
    /// Field equals value.
    Eq {
        /// Field path.
        field: String,
        /// Literal.
        value: Value,
    },
    /// Field does not equal value.
    Neq {
        /// Field path.
        field: String,
        /// Literal.
        value: Value,
    },
    /// Field is greater than value.
    Gt {
        /// Field path.
        field: String,
        /// Literal.
        value: Value,
    },
    /// Field is greater than or equal to value.
    Gte {
        /// Field path.
        field: String,
        /// Literal.
        value: Value,
    },
    /// Field is less than value.
    Lt {
        /// Field path.
        field: String,
        /// Literal.
        value: Value,
    },
    /// Field is less than or equal to value.
    Lte {
        /// Field path.
        field: String,
        /// Literal.
        value: Value,
    },
    /// Field lies in `[start, end]`.
    Within {
        /// Field path.
        field: String,
        /// Inclusive lower bound.
        start: Value,
        /// Inclusive upper bound.
        end: Value,
    },
    /// Field lies outside `[start, end]` but has the bounds' type.
    Without {
        /// Field path.
        field: String,
        /// Inclusive lower bound of the excluded interval.
        start: Value,
        /// Inclusive upper bound of the excluded interval.
        end: Value,
    },
    /// Field equals one of the values.
    In {
        /// Field path.
        field: String,
        /// Accepted literals.
        values: Vec<Value>,
    },
    /// String field matches a regular expression anywhere.
    Match {
        /// Field path.
        field: String,
        /// Regular expression.
        value: String,
    },
    /// Field contains every analyzed term of the text.
    Search {
        /// Field path.
        field: String,
        /// Query text.
        value: String,
    },
    /// Every expression holds.
    And {
        /// Children.
        expressions: Vec<Filter>,
    },
    /// At least one expression holds.
    Or {
        /// Children.
        expressions: Vec<Filter>,
    },
}

impl Filter {
    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field != value`.
    pub fn neq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Neq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field >= value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field <= value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `start <= field <= end`.
    pub fn within(
        field: impl Into<String>,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Self {
        Self::Within {
            field: field.into(),
            start: start.into(),
            end: end.into(),
        }
    }

    /// `field < start || field > end`.
    pub fn without(
        field: impl Into<String>,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Self {
        Self::Without {
            field: field.into(),
            start: start.into(),
            end: end.into(),
        }
    }

    /// `field` is one of `values`.
    pub fn one_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field` matches the regular expression.
    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Match {
            field: field.into(),
            value: pattern.into(),
        }
    }

    /// `field` contains every term of `text`.
    pub fn search(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Search {
            field: field.into(),
            value: text.into(),
        }
    }

    /// Conjunction.
    #[must_use]
    pub fn and(expressions: Vec<Filter>) -> Self {
        Self::And { expressions }
    }

    /// Disjunction.
    #[must_use]
    pub fn or(expressions: Vec<Filter>) -> Self {
        Self::Or { expressions }
    }

    /// Operator name as it is serialized.
    #[must_use]
    pub fn operator(&self) -> &'static str {
        match self {
            Self::Eq { .. } => "eq",
            Self::Neq { .. } => "neq",
            Self::Gt { .. } => "gt",
            Self::Gte { .. } => "gte",
            Self::Lt { .. } => "lt",
            Self::Lte { .. } => "lte",
            Self::Within { .. } => "within",
            Self::Without { .. } => "without",
            Self::In { .. } => "in",
            Self::Match { .. } => "match",
            Self::Search { .. } => "search",
            Self::And { .. } => "and",
            Self::Or { .. } => "or",
        }
    }

    /// Field a leaf reads; `None` for `and`/`or`.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Eq { field, .. }
            | Self::Neq { field, .. }
            | Self::Gt { field, .. }
            | Self::Gte { field, .. }
            | Self::Lt { field, .. }
            | Self::Lte { field, .. }
            | Self::Within { field, .. }
            | Self::Without { field, .. }
            | Self::In { field, .. }
            | Self::Match { field, .. }
            | Self::Search { field, .. } => Some(field),
            Self::And { .. } | Self::Or { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_json() {
        let filter: Filter = serde_json::from_value(json!({
            "type": "or",
            "expressions": [
                { "type": "eq", "field": "name", "value": "J" },
                { "type": "within", "field": "age", "start": 1, "end": 9 },
                { "type": "in", "field": "tag", "values": ["a", "b"] },
                { "type": "search", "field": "bio", "value": "cat" }
            ]
        }))
        .unwrap();
        assert_eq!(
            filter,
            Filter::or(vec![
                Filter::eq("name", "J"),
                Filter::within("age", 1, 9),
                Filter::one_of("tag", ["a", "b"]),
                Filter::search("bio", "cat"),
            ])
        );
    }

    #[test]
    fn serializes_with_operator_tag() {
        let value = serde_json::to_value(Filter::gte("age", 18)).unwrap();
        assert_eq!(value, json!({ "type": "gte", "field": "age", "value": 18 }));
        assert_eq!(Filter::gte("age", 18).operator(), "gte");
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let result: Result<Filter, _> =
            serde_json::from_value(json!({ "type": "near", "field": "x", "value": 1 }));
        assert!(result.is_err());
    }
}
