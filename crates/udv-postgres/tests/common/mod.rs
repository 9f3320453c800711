//! Shared fixtures: the `orders` registry and a full translate helper.

#![allow(dead_code)]

use serde_json::Value;
use udv_dsl::{Planner, Query, ValidationError, Validator};
use udv_postgres::{BuiltQuery, QueryBuilder};
use udv_registry::Registry;

pub const ORDERS: &str = r#"{
    "models": [{
        "name": "orders",
        "table": "orders",
        "primaryKey": "id",
        "fields": [
            {"name": "id", "type": "int"},
            {"name": "user_id", "type": "int"},
            {"name": "status", "type": "string"},
            {"name": "amount", "type": "decimal"},
            {"name": "created_at", "type": "timestamp", "nullable": true},
            {"name": "note", "type": "string", "nullable": true, "filterable": false}
        ]
    }]
}"#;

pub fn registry() -> Registry {
    Registry::from_json(ORDERS).expect("orders registry should load")
}

pub fn query(value: Value) -> Query {
    serde_json::from_value(value).expect("query should decode")
}

/// Validate, plan and emit. Planning and emitting must never fail once
/// validation has passed.
pub fn translate(registry: &Registry, query: &Query) -> Result<BuiltQuery, ValidationError> {
    let validated = Validator::new(registry).validate(query)?;
    let plan = Planner::new(registry)
        .plan(validated)
        .expect("validated query should plan");
    Ok(QueryBuilder::new()
        .build(&plan)
        .expect("planned query should emit"))
}

/// `$N` placeholders in order of appearance.
pub fn placeholders(sql: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end > start {
                found.push(sql[start..end].parse().expect("digits"));
            }
            i = end;
        } else {
            i += 1;
        }
    }
    found
}
