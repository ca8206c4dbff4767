//! Property queries used to pick rooms.
//!
//! A [`Query`] is a conjunction of [`Condition`]s over a room's public
//! properties. Condition values are stored wire-encoded and compared
//! bytewise against the encoded property, which orders numbers correctly
//! because the codec writes them in sortable form. A condition only holds
//! between values of the same type tag; a property that is missing, or of
//! another type, fails every condition.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{Dict, ProtocolError, Tag, TypeRegistry, Value, WireValue, wire};

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!")]
    NotEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterEqual,
}

impl Op {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            Op::Equal => ord.is_eq(),
            Op::NotEqual => ord.is_ne(),
            Op::LessThan => ord.is_lt(),
            Op::LessEqual => ord.is_le(),
            Op::GreaterThan => ord.is_gt(),
            Op::GreaterEqual => ord.is_ge(),
        }
    }
}

/// One encoded `property op value` test, as sent to the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub op: Op,
    /// Wire-encoded value.
    pub value: Vec<u8>,
}

impl Condition {
    /// Applies the condition to an encoded property, `prop op value`.
    pub fn test(&self, prop: Option<&[u8]>) -> bool {
        let Some(prop) = prop else {
            return false;
        };
        match (comparable(prop), comparable(&self.value)) {
            (Some((a_tag, a)), Some((b_tag, b))) if a_tag == b_tag => {
                self.op.accepts(a.cmp(b))
            }
            _ => false,
        }
    }
}

/// Splits an encoded value into a type class and its sortable bytes.
/// Both string forms compare by content.
fn comparable(bytes: &[u8]) -> Option<(u8, &[u8])> {
    let (&tag, rest) = bytes.split_first()?;
    if tag == Tag::Str8 as u8 {
        Some((Tag::Str16 as u8, rest.get(1..)?))
    } else if tag == Tag::Str16 as u8 {
        Some((tag, rest.get(2..)?))
    } else {
        Some((tag, rest))
    }
}

/// A conjunction of property conditions.
///
/// ```rust
/// use roomwire_protocol::{props, Query, TypeRegistry, Value};
///
/// let registry = TypeRegistry::new();
/// let query = Query::new().equal("mode", "duel".to_string()).at_least("level", 3u8);
///
/// let room = props([("mode", Value::Str("duel".into())), ("level", Value::U8(5))]);
/// assert!(query.matches(&room, &registry).unwrap());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<(String, Op, Value)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Adds `key op value`.
    pub fn with(
        mut self,
        key: impl Into<String>,
        op: Op,
        value: impl WireValue,
    ) -> Self {
        self.conditions.push((key.into(), op, value.into_value()));
        self
    }

    pub fn equal(self, key: impl Into<String>, value: impl WireValue) -> Self {
        self.with(key, Op::Equal, value)
    }

    pub fn not_equal(self, key: impl Into<String>, value: impl WireValue) -> Self {
        self.with(key, Op::NotEqual, value)
    }

    pub fn less_than(self, key: impl Into<String>, value: impl WireValue) -> Self {
        self.with(key, Op::LessThan, value)
    }

    pub fn at_most(self, key: impl Into<String>, value: impl WireValue) -> Self {
        self.with(key, Op::LessEqual, value)
    }

    pub fn greater_than(self, key: impl Into<String>, value: impl WireValue) -> Self {
        self.with(key, Op::GreaterThan, value)
    }

    pub fn at_least(self, key: impl Into<String>, value: impl WireValue) -> Self {
        self.with(key, Op::GreaterEqual, value)
    }

    /// Encodes every condition for a handshake request.
    pub fn conditions(
        &self,
        registry: &TypeRegistry,
    ) -> Result<Vec<Condition>, ProtocolError> {
        self.conditions
            .iter()
            .map(|(key, op, value)| {
                Ok(Condition {
                    key: key.clone(),
                    op: *op,
                    value: wire::encode(value, registry)?,
                })
            })
            .collect()
    }

    /// True when every condition holds for `props`. An empty query
    /// matches everything.
    pub fn matches(
        &self,
        props: &Dict,
        registry: &TypeRegistry,
    ) -> Result<bool, ProtocolError> {
        for condition in self.conditions(registry)? {
            let prop = props
                .get(&condition.key)
                .map(|value| wire::encode(value, registry))
                .transpose()?;
            if !condition.test(prop.as_deref()) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;

    fn room() -> Dict {
        props([
            ("level", Value::I32(-3)),
            ("name", Value::Str("arena".into())),
            ("speed", Value::F64(1.5)),
        ])
    }

    fn check(query: Query) -> bool {
        query.matches(&room(), &TypeRegistry::new()).unwrap()
    }

    #[test]
    fn test_query_empty_matches_everything() {
        assert!(check(Query::new()));
    }

    #[test]
    fn test_query_negative_numbers_order_correctly() {
        assert!(check(Query::new().less_than("level", 0i32)));
        assert!(check(Query::new().greater_than("level", -10i32)));
        assert!(!check(Query::new().at_least("level", -2i32)));
        assert!(check(Query::new().at_most("level", -3i32)));
    }

    #[test]
    fn test_query_floats_order_correctly() {
        assert!(check(Query::new().greater_than("speed", -1.0f64)));
        assert!(check(Query::new().less_than("speed", 2.25f64)));
    }

    #[test]
    fn test_query_type_mismatch_never_matches() {
        // Same number, different width.
        assert!(!check(Query::new().equal("level", -3i64)));
        assert!(!check(Query::new().not_equal("level", -3i64)));
    }

    #[test]
    fn test_query_missing_key_never_matches() {
        assert!(!check(Query::new().not_equal("missing", 1u8)));
    }

    #[test]
    fn test_query_strings_compare_by_content() {
        assert!(check(Query::new().equal("name", "arena".to_string())));
        assert!(check(Query::new().less_than("name", "b".to_string())));
        assert!(check(Query::new().not_equal("name", "x".repeat(300))));
    }

    #[test]
    fn test_query_all_conditions_must_hold() {
        let query = Query::new()
            .equal("name", "arena".to_string())
            .greater_than("level", 0i32);
        assert!(!check(query));
    }

    #[test]
    fn test_condition_op_serializes_as_symbol() {
        let condition = Condition {
            key: "level".into(),
            op: Op::LessEqual,
            value: vec![4, 1],
        };
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["op"], "<=");
    }
}
