//! Type system for UDV IR

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of field types a model may declare.
///
/// `Integer`/`Int` and `DateTime`/`Timestamp` are distinct spellings kept
/// as declared so enumeration APIs report what the configuration says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Int,
    Float,
    Decimal,
    Boolean,
    DateTime,
    Timestamp,
    Date,
    Uuid,
    Json,
}

impl FieldType {
    pub const ALL: [FieldType; 11] = [
        FieldType::String,
        FieldType::Integer,
        FieldType::Int,
        FieldType::Float,
        FieldType::Decimal,
        FieldType::Boolean,
        FieldType::DateTime,
        FieldType::Timestamp,
        FieldType::Date,
        FieldType::Uuid,
        FieldType::Json,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
            FieldType::Timestamp => "timestamp",
            FieldType::Date => "date",
            FieldType::Uuid => "uuid",
            FieldType::Json => "json",
        }
    }

    /// Numeric types accept `sum`/`avg` and are aggregatable by default.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Int | FieldType::Float | FieldType::Decimal
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field type: {0:?}")]
pub struct UnknownFieldType(pub String);

impl FromStr for FieldType {
    type Err = UnknownFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownFieldType(s.to_string()))
    }
}

/// Filter operators understood by the DSL and carried through the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "before")]
    Before,
    #[serde(rename = "after")]
    After,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
    #[serde(rename = "is_null")]
    IsNull,
    #[serde(rename = "not_null")]
    NotNull,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "ilike")]
    ILike,
    #[serde(rename = "starts_with")]
    StartsWith,
    #[serde(rename = "ends_with")]
    EndsWith,
    #[serde(rename = "contains")]
    Contains,
}

impl FilterOp {
    pub const ALL: [FilterOp; 18] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::Before,
        FilterOp::After,
        FilterOp::Between,
        FilterOp::In,
        FilterOp::NotIn,
        FilterOp::IsNull,
        FilterOp::NotNull,
        FilterOp::Like,
        FilterOp::ILike,
        FilterOp::StartsWith,
        FilterOp::EndsWith,
        FilterOp::Contains,
    ];

    /// Parse the DSL spelling of an operator.
    pub fn parse(s: &str) -> Option<Self> {
        FilterOp::ALL.into_iter().find(|op| op.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Before => "before",
            FilterOp::After => "after",
            FilterOp::Between => "between",
            FilterOp::In => "in",
            FilterOp::NotIn => "not_in",
            FilterOp::IsNull => "is_null",
            FilterOp::NotNull => "not_null",
            FilterOp::Like => "like",
            FilterOp::ILike => "ilike",
            FilterOp::StartsWith => "starts_with",
            FilterOp::EndsWith => "ends_with",
            FilterOp::Contains => "contains",
        }
    }

    /// `is_null` and `not_null` are the only operators without a value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, FilterOp::IsNull | FilterOp::NotNull)
    }

    /// Pattern operators are restricted to `string` fields.
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            FilterOp::Like
                | FilterOp::ILike
                | FilterOp::StartsWith
                | FilterOp::EndsWith
                | FilterOp::Contains
        )
    }

    pub fn takes_collection(&self) -> bool {
        matches!(self, FilterOp::In | FilterOp::NotIn)
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
