//! PostgreSQL emitter for UDV query plans
//!
//! Turns a [`udv_ir::QueryPlan`] into SQL text with `$N` placeholders and
//! the ordered parameter vector to bind alongside it. No user value is ever
//! written into the SQL text.

mod builder;

pub use builder::QueryBuilder;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use udv_ir::ErrorKind;

/// Raised only for plans the validator should have rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("value required for {0} operator")]
    MissingValue(String),

    #[error("{operator} expects {expected}, got {got}")]
    BadValue {
        operator: String,
        expected: &'static str,
        got: String,
    },

    #[error("NOT filter must have exactly one node, got {0}")]
    NotArity(usize),

    #[error("{0} filter has no nodes")]
    EmptyLogical(String),

    #[error("aggregate {0} has no column")]
    MissingAggregateColumn(String),
}

impl EmitError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::EmitError
    }
}

/// SQL text plus positional parameters. `params[i]` binds to `$i+1`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Value>,
}
