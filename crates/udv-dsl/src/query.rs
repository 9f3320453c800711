//! DSL query document
//!
//! Untrusted JSON shape accepted from callers. Nothing here checks names
//! against the registry; that is the validator's job.

use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub model: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterExpr>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregates: Vec<Aggregate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Sort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl Query {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Filter tree: a comparison leaf or a one-level logical node.
///
/// Decoding discriminates on keys: `field` marks a leaf, exactly one of
/// `and`/`or`/`not` marks a logical node. Anything else is rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterExpr {
    Comparison(Comparison),
    Logical(Logical),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Comparison {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Comparison {
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            field: field.into(),
            op: op.into(),
            value,
        }
    }
}

/// Branches hold comparison leaves only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logical {
    And(Vec<Comparison>),
    Or(Vec<Comparison>),
    Not(Comparison),
}

const LOGICAL_KEYS: [&str; 3] = ["and", "or", "not"];

impl<'de> Deserialize<'de> for FilterExpr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        let has_field = map.contains_key("field");
        let logical_keys = LOGICAL_KEYS.iter().filter(|k| map.contains_key(**k)).count();

        match (has_field, logical_keys) {
            (true, 0) => serde_json::from_value(Value::Object(map))
                .map(FilterExpr::Comparison)
                .map_err(D::Error::custom),
            (false, 1) if map.len() == 1 => serde_json::from_value(Value::Object(map))
                .map(FilterExpr::Logical)
                .map_err(D::Error::custom),
            (false, 1) => Err(D::Error::custom(
                "logical filter must contain only one of `and`, `or`, `not`",
            )),
            (true, _) => Err(D::Error::custom(
                "ambiguous filter: `field` cannot be combined with `and`, `or`, `not`",
            )),
            (false, 0) => Err(D::Error::custom(
                "filter must contain `field` or one of `and`, `or`, `not`",
            )),
            (false, _) => Err(D::Error::custom(
                "ambiguous filter: only one of `and`, `or`, `not` may be present",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde(rename = "fn", default)]
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub alias: String,
}

impl Aggregate {
    /// The aggregated field; an empty string counts as omitted.
    pub fn field_name(&self) -> Option<&str> {
        self.field.as_deref().filter(|f| !f.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    #[serde(default)]
    pub field: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub direction: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<Query, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[test]
    fn test_parse_comparison_leaf() {
        let query = parse(json!({
            "model": "orders",
            "filters": {"field": "status", "op": "=", "value": "PAID"}
        }))
        .unwrap();

        assert_eq!(
            query.filters,
            Some(FilterExpr::Comparison(Comparison::new(
                "status",
                "=",
                Some(json!("PAID"))
            )))
        );
    }

    #[test]
    fn test_parse_logical_node() {
        let query = parse(json!({
            "model": "orders",
            "filters": {"or": [
                {"field": "status", "op": "=", "value": "PAID"},
                {"field": "status", "op": "is_null"}
            ]}
        }))
        .unwrap();

        match query.filters {
            Some(FilterExpr::Logical(Logical::Or(branches))) => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[1].value, None);
            }
            other => panic!("expected OR node, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_not_node() {
        let query = parse(json!({
            "model": "orders",
            "filters": {"not": {"field": "status", "op": "=", "value": "VOID"}}
        }))
        .unwrap();

        assert!(matches!(
            query.filters,
            Some(FilterExpr::Logical(Logical::Not(_)))
        ));
    }

    #[test]
    fn test_null_value_is_absent() {
        let query = parse(json!({
            "model": "orders",
            "filters": {"field": "status", "op": "is_null", "value": null}
        }))
        .unwrap();

        match query.filters {
            Some(FilterExpr::Comparison(c)) => assert_eq!(c.value, None),
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_null_filters() {
        let query = parse(json!({"model": "orders", "filters": null})).unwrap();
        assert_eq!(query.filters, None);
    }

    #[test]
    fn test_rejects_ambiguous_filters() {
        let err = parse(json!({
            "model": "orders",
            "filters": {"field": "status", "op": "=", "value": 1, "and": []}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("ambiguous filter"));

        let err = parse(json!({
            "model": "orders",
            "filters": {"and": [], "or": []}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("only one of"));

        let err = parse(json!({"model": "orders", "filters": {"op": "="}})).unwrap_err();
        assert!(err.to_string().contains("must contain"));
    }

    #[test]
    fn test_rejects_nested_logical() {
        let err = parse(json!({
            "model": "orders",
            "filters": {"and": [
                {"or": [{"field": "status", "op": "=", "value": "PAID"}]}
            ]}
        }));
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_aggregates_and_sort() {
        let query = parse(json!({
            "model": "orders",
            "group_by": ["status"],
            "aggregates": [
                {"fn": "sum", "field": "amount", "alias": "total"},
                {"fn": "count", "field": "", "alias": "n"}
            ],
            "sort": [{"field": "total", "direction": "desc"}, {"field": "status"}],
            "pagination": {"limit": 10}
        }))
        .unwrap();

        assert_eq!(query.aggregates[0].field_name(), Some("amount"));
        assert_eq!(query.aggregates[1].field_name(), None);
        assert_eq!(query.sort[1].direction, "");
        assert_eq!(query.pagination, Some(Pagination { limit: 10, offset: 0 }));
    }

    #[test]
    fn test_serialize_round_trip() {
        let value = json!({
            "model": "orders",
            "fields": ["id"],
            "filters": {"and": [{"field": "amount", "op": ">", "value": 5}]}
        });
        let query = parse(value.clone()).unwrap();

        assert_eq!(serde_json::to_value(&query).unwrap(), value);
    }
}
