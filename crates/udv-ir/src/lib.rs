//! UDV Intermediate Representation (IR)
//!
//! The typed, registry-resolved form of a DSL query. The planner produces a
//! [`QueryPlan`], the dialect emitter consumes it. Plans own no mutable
//! state and serialize deterministically for logging and caching.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

mod error;
mod types;
pub use error::ErrorKind;
pub use types::*;

/// Alias assigned to the root table of every plan.
pub const ROOT_ALIAS: &str = "t0";

pub const DEFAULT_LIMIT: i64 = 100;
pub const DEFAULT_OFFSET: i64 = 0;

/// Complete plan for a single-table query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub root_model: ModelRef,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<SelectExpr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterExpr>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<GroupExpr>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregates: Vec<AggregateExpr>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortExpr>,

    pub pagination: Pagination,
}

impl QueryPlan {
    /// Calculate fingerprint (SHA-256) for deterministic caching
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("IR should always serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Root model of the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub name: String,
    pub table: String,
    pub alias: String,
    pub primary_key: ColumnRef,
}

/// Fully qualified column after registry resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table_alias: String,
    pub column_name: String,
    pub data_type: FieldType,
}

impl ColumnRef {
    pub fn new(table_alias: impl Into<String>, column_name: impl Into<String>, data_type: FieldType) -> Self {
        Self {
            table_alias: table_alias.into(),
            column_name: column_name.into(),
            data_type,
        }
    }

    /// `<alias>.<column>`
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table_alias, self.column_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectExpr {
    pub column: ColumnRef,
    pub alias: String,
    #[serde(default)]
    pub is_aggregate: bool,
}

/// A user-supplied value tagged with the type of the column it is compared to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    pub value: serde_json::Value,
    pub data_type: FieldType,
}

/// Filter tree
///
/// The tree may nest logical nodes to any depth even though the surface
/// language only produces one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterExpr {
    Comparison {
        left: ColumnRef,
        op: FilterOp,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<TypedValue>,
    },
    Logical {
        op: LogicalOp,
        nodes: Vec<FilterExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl LogicalOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
            LogicalOp::Not => "NOT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupExpr {
    pub column: ColumnRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    /// Parse the lowercase DSL name of an aggregate function.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "count" => Some(AggregateFn::Count),
            "sum" => Some(AggregateFn::Sum),
            "avg" => Some(AggregateFn::Avg),
            "min" => Some(AggregateFn::Min),
            "max" => Some(AggregateFn::Max),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }

    pub fn requires_numeric(&self) -> bool {
        matches!(self, AggregateFn::Sum | AggregateFn::Avg)
    }
}

/// `column` is `None` only for `COUNT(*)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub function: AggregateFn,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<ColumnRef>,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "ref", rename_all = "UPPERCASE")]
pub enum SortTarget {
    Column(ColumnRef),
    Aggregate(AggregateExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Parse the DSL spelling; the empty string means ascending.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortExpr {
    pub target: SortTarget,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: DEFAULT_OFFSET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders_plan() -> QueryPlan {
        let status = ColumnRef::new(ROOT_ALIAS, "status", FieldType::String);
        QueryPlan {
            root_model: ModelRef {
                name: "orders".to_string(),
                table: "orders".to_string(),
                alias: ROOT_ALIAS.to_string(),
                primary_key: ColumnRef::new(ROOT_ALIAS, "id", FieldType::Integer),
            },
            select: vec![SelectExpr {
                column: status.clone(),
                alias: "status".to_string(),
                is_aggregate: false,
            }],
            filters: Some(FilterExpr::Comparison {
                left: status,
                op: FilterOp::Eq,
                value: Some(TypedValue {
                    value: json!("PAID"),
                    data_type: FieldType::String,
                }),
            }),
            group_by: vec![],
            aggregates: vec![],
            sort: vec![],
            pagination: Pagination::default(),
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let plan1 = orders_plan();
        let plan2 = plan1.clone();

        assert_eq!(plan1.fingerprint(), plan2.fingerprint());
        assert_eq!(plan1.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_values() {
        let plan1 = orders_plan();
        let mut plan2 = orders_plan();
        plan2.pagination.limit = 10;

        assert_ne!(plan1.fingerprint(), plan2.fingerprint());
    }

    #[test]
    fn test_json_round_trip() {
        let mut plan = orders_plan();
        plan.sort.push(SortExpr {
            target: SortTarget::Aggregate(AggregateExpr {
                function: AggregateFn::Count,
                column: None,
                alias: "n".to_string(),
            }),
            direction: Direction::Desc,
        });

        let json = serde_json::to_string(&plan).unwrap();
        let parsed: QueryPlan = serde_json::from_str(&json).unwrap();

        assert_eq!(plan, parsed);
        assert_eq!(plan.fingerprint(), parsed.fingerprint());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse(""), Some(Direction::Asc));
        assert_eq!(Direction::parse("desc"), Some(Direction::Desc));
        assert_eq!(Direction::parse("DESC"), None);
    }

    #[test]
    fn test_aggregate_fn_parse() {
        assert_eq!(AggregateFn::parse("avg"), Some(AggregateFn::Avg));
        assert_eq!(AggregateFn::parse("median"), None);
        assert!(AggregateFn::Sum.requires_numeric());
        assert!(!AggregateFn::Max.requires_numeric());
    }
}
