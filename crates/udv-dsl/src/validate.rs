//! Query validation against the schema registry
//!
//! Checks run in a fixed order and stop at the first rejection:
//! model, projection, filters, group-by, aggregates, sort, pagination.
//! A query that passes can be planned without further name or type errors.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;
use thiserror::Error;
use udv_ir::{AggregateFn, Direction, ErrorKind, FieldType, FilterOp};
use udv_registry::{is_reserved_word, is_sql_identifier, Field, Model, Registry};

use crate::query::{Aggregate, Comparison, FilterExpr, Logical, Pagination, Query, Sort};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("model not found: {0}")]
    UnknownModel(String),

    #[error("field not found in model {model}: {field}")]
    UnknownField { model: String, field: String },

    #[error("field is not {capability}: {field}")]
    CapabilityDenied { field: String, capability: Capability },

    #[error("{operator} is not valid for field {field} of type {field_type}")]
    OperatorTypeMismatch {
        operator: String,
        field: String,
        field_type: FieldType,
    },

    #[error("{0}")]
    Shape(String),
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::UnknownModel(_) => ErrorKind::UnknownModel,
            ValidationError::UnknownField { .. } => ErrorKind::UnknownField,
            ValidationError::CapabilityDenied { .. } => ErrorKind::CapabilityDenied,
            ValidationError::OperatorTypeMismatch { .. } => ErrorKind::OperatorTypeMismatch,
            ValidationError::Shape(_) => ErrorKind::ShapeError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Filterable,
    Groupable,
    Aggregatable,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Filterable => "filterable",
            Capability::Groupable => "groupable",
            Capability::Aggregatable => "aggregatable",
        })
    }
}

/// A query that passed [`Validator::validate`]. Only the validator can
/// construct one, so the planner never sees unchecked input.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedQuery<'q> {
    query: &'q Query,
}

impl<'q> ValidatedQuery<'q> {
    pub fn query(&self) -> &'q Query {
        self.query
    }
}

pub struct Validator<'r> {
    registry: &'r Registry,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn validate<'q>(&self, query: &'q Query) -> Result<ValidatedQuery<'q>, ValidationError> {
        if query.model.is_empty() {
            return Err(ValidationError::Shape("model is required".to_string()));
        }
        let model = self
            .registry
            .get_model(&query.model)
            .ok_or_else(|| ValidationError::UnknownModel(query.model.clone()))?;

        self.validate_fields(model, &query.fields)?;
        if let Some(filters) = &query.filters {
            self.validate_filter_expr(model, filters)?;
        }
        self.validate_group_by(model, &query.group_by)?;
        self.validate_aggregates(model, &query.aggregates)?;
        self.validate_sort(model, &query.sort, &query.aggregates)?;
        if let Some(pagination) = &query.pagination {
            validate_pagination(pagination)?;
        }

        Ok(ValidatedQuery { query })
    }

    fn validate_fields(&self, model: &Model, fields: &[String]) -> Result<(), ValidationError> {
        for name in fields {
            if name.is_empty() {
                return Err(ValidationError::Shape("field name cannot be empty".to_string()));
            }
            resolve(model, name)?;
        }
        Ok(())
    }

    fn validate_filter_expr(&self, model: &Model, expr: &FilterExpr) -> Result<(), ValidationError> {
        match expr {
            FilterExpr::Comparison(c) => self.validate_comparison(model, c),
            FilterExpr::Logical(Logical::And(branches)) => {
                self.validate_branches(model, "and", branches)
            }
            FilterExpr::Logical(Logical::Or(branches)) => {
                self.validate_branches(model, "or", branches)
            }
            FilterExpr::Logical(Logical::Not(c)) => self.validate_comparison(model, c),
        }
    }

    fn validate_branches(
        &self,
        model: &Model,
        op: &str,
        branches: &[Comparison],
    ) -> Result<(), ValidationError> {
        if branches.is_empty() {
            return Err(ValidationError::Shape(format!(
                "logical filter `{op}` requires at least one condition"
            )));
        }
        branches
            .iter()
            .try_for_each(|c| self.validate_comparison(model, c))
    }

    fn validate_comparison(&self, model: &Model, c: &Comparison) -> Result<(), ValidationError> {
        if c.field.is_empty() {
            return Err(ValidationError::Shape("filter field is required".to_string()));
        }
        let field = resolve(model, &c.field)?;
        if !field.filterable {
            return Err(ValidationError::CapabilityDenied {
                field: field.name.clone(),
                capability: Capability::Filterable,
            });
        }

        let op = FilterOp::parse(&c.op)
            .ok_or_else(|| ValidationError::Shape(format!("unknown operator: {:?}", c.op)))?;
        if op.is_pattern() && field.data_type != FieldType::String {
            return Err(ValidationError::OperatorTypeMismatch {
                operator: op.to_string(),
                field: field.name.clone(),
                field_type: field.data_type,
            });
        }

        validate_value_shape(op, &field.name, c.value.as_ref())
    }

    fn validate_group_by(&self, model: &Model, group_by: &[String]) -> Result<(), ValidationError> {
        for name in group_by {
            if name.is_empty() {
                return Err(ValidationError::Shape(
                    "group_by field cannot be empty".to_string(),
                ));
            }
            let field = resolve(model, name)?;
            if !field.groupable {
                return Err(ValidationError::CapabilityDenied {
                    field: field.name.clone(),
                    capability: Capability::Groupable,
                });
            }
        }
        Ok(())
    }

    fn validate_aggregates(&self, model: &Model, aggregates: &[Aggregate]) -> Result<(), ValidationError> {
        let mut aliases = HashSet::with_capacity(aggregates.len());

        for (i, agg) in aggregates.iter().enumerate() {
            if agg.alias.is_empty() {
                return Err(ValidationError::Shape(format!("aggregate[{i}] alias is required")));
            }
            if !is_sql_identifier(&agg.alias) {
                return Err(ValidationError::Shape(format!(
                    "aggregate[{i}] alias is not a valid identifier: {:?}",
                    agg.alias
                )));
            }
            if is_reserved_word(&agg.alias) {
                return Err(ValidationError::Shape(format!(
                    "aggregate[{i}] alias is a reserved word: {}",
                    agg.alias
                )));
            }
            // A sort on the alias would otherwise resolve to the column.
            if model.has_field(&agg.alias) {
                return Err(ValidationError::Shape(format!(
                    "aggregate[{i}] alias shadows field: {}",
                    agg.alias
                )));
            }
            if !aliases.insert(agg.alias.as_str()) {
                return Err(ValidationError::Shape(format!(
                    "aggregate[{i}] duplicate alias: {}",
                    agg.alias
                )));
            }

            let function = AggregateFn::parse(&agg.function).ok_or_else(|| {
                ValidationError::Shape(format!(
                    "aggregate[{i}] unknown function: {:?}",
                    agg.function
                ))
            })?;

            let Some(name) = agg.field_name() else {
                if function == AggregateFn::Count {
                    continue;
                }
                return Err(ValidationError::Shape(format!(
                    "aggregate[{i}] field is required for function {}",
                    agg.function
                )));
            };

            let field = resolve(model, name)?;
            // Type mismatch is reported before the capability check so that
            // `sum` over a string names the real problem.
            if function.requires_numeric() && !field.data_type.is_numeric() {
                return Err(ValidationError::OperatorTypeMismatch {
                    operator: agg.function.clone(),
                    field: field.name.clone(),
                    field_type: field.data_type,
                });
            }
            if !field.aggregatable {
                return Err(ValidationError::CapabilityDenied {
                    field: field.name.clone(),
                    capability: Capability::Aggregatable,
                });
            }
        }
        Ok(())
    }

    fn validate_sort(
        &self,
        model: &Model,
        sort: &[Sort],
        aggregates: &[Aggregate],
    ) -> Result<(), ValidationError> {
        for (i, s) in sort.iter().enumerate() {
            if s.field.is_empty() {
                return Err(ValidationError::Shape(format!("sort[{i}] field is required")));
            }
            let is_aggregate_alias = aggregates.iter().any(|a| a.alias == s.field);
            if !model.has_field(&s.field) && !is_aggregate_alias {
                return Err(unknown_field(model, &s.field));
            }
            if Direction::parse(&s.direction).is_none() {
                return Err(ValidationError::Shape(format!(
                    "sort[{i}] invalid direction: {:?}",
                    s.direction
                )));
            }
        }
        Ok(())
    }
}

fn validate_value_shape(op: FilterOp, field: &str, value: Option<&Value>) -> Result<(), ValidationError> {
    let shape = |msg: &str| Err(ValidationError::Shape(format!("filter on {field}: {op} {msg}")));

    match (op, value) {
        (FilterOp::IsNull | FilterOp::NotNull, None) => Ok(()),
        (FilterOp::IsNull | FilterOp::NotNull, Some(_)) => shape("does not take a value"),
        (_, None) => shape("requires a value"),
        (FilterOp::In | FilterOp::NotIn, Some(Value::Array(_))) => Ok(()),
        (FilterOp::In | FilterOp::NotIn, Some(_)) => shape("requires an array value"),
        (FilterOp::Between, Some(Value::Array(bounds))) if bounds.len() == 2 => {
            if bounds.iter().any(Value::is_null) {
                return shape("bounds cannot be null");
            }
            Ok(())
        }
        (FilterOp::Between, Some(_)) => shape("requires a two-element array value"),
        (op, Some(Value::String(_))) if op.is_pattern() => Ok(()),
        (op, Some(_)) if op.is_pattern() => shape("requires a string value"),
        (_, Some(_)) => Ok(()),
    }
}

fn validate_pagination(p: &Pagination) -> Result<(), ValidationError> {
    if p.limit <= 0 {
        return Err(ValidationError::Shape(
            "pagination limit must be greater than 0".to_string(),
        ));
    }
    if p.offset < 0 {
        return Err(ValidationError::Shape(
            "pagination offset must be non-negative".to_string(),
        ));
    }
    Ok(())
}

fn resolve<'m>(model: &'m Model, name: &str) -> Result<&'m Field, ValidationError> {
    model.field(name).ok_or_else(|| unknown_field(model, name))
}

fn unknown_field(model: &Model, name: &str) -> ValidationError {
    ValidationError::UnknownField {
        model: model.name.clone(),
        field: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn registry() -> Registry {
        Registry::from_json(
            r#"{"models": [{
                "name": "orders", "table": "orders", "primaryKey": "id",
                "fields": [
                    {"name": "id", "type": "int"},
                    {"name": "user_id", "type": "int"},
                    {"name": "status", "type": "string"},
                    {"name": "amount", "type": "decimal"},
                    {"name": "created_at", "type": "timestamp"},
                    {"name": "secret", "type": "string", "filterable": false, "groupable": false},
                    {"name": "rating", "type": "float", "aggregatable": false}
                ]
            }]}"#,
        )
        .unwrap()
    }

    fn validate(value: serde_json::Value) -> Result<(), ValidationError> {
        let registry = registry();
        let query: Query = serde_json::from_value(value).unwrap();
        Validator::new(&registry).validate(&query).map(|_| ())
    }

    fn kind_of(value: serde_json::Value) -> ErrorKind {
        validate(value).unwrap_err().kind()
    }

    #[test]
    fn test_accepts_full_query() {
        validate(json!({
            "model": "orders",
            "fields": ["id", "status"],
            "filters": {"and": [
                {"field": "status", "op": "in", "value": ["PAID", "SHIPPED"]},
                {"field": "created_at", "op": "between", "value": ["2024-01-01", "2024-02-01"]}
            ]},
            "group_by": ["status"],
            "aggregates": [{"fn": "sum", "field": "amount", "alias": "total"}],
            "sort": [{"field": "total", "direction": "desc"}, {"field": "status", "direction": "asc"}],
            "pagination": {"limit": 20, "offset": 40}
        }))
        .unwrap();
    }

    #[test]
    fn test_model_checks() {
        assert_eq!(kind_of(json!({"model": ""})), ErrorKind::ShapeError);
        assert_eq!(kind_of(json!({})), ErrorKind::ShapeError);
        assert_eq!(kind_of(json!({"model": "payments"})), ErrorKind::UnknownModel);
    }

    #[test]
    fn test_unknown_projection_field() {
        let err = validate(json!({"model": "orders", "fields": ["id", "email"]})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownField {
                model: "orders".to_string(),
                field: "email".to_string()
            }
        );
        assert_eq!(err.to_string(), "field not found in model orders: email");
    }

    #[test]
    fn test_filter_on_unfilterable_field() {
        let err = validate(json!({
            "model": "orders",
            "filters": {"field": "secret", "op": "=", "value": "x"}
        }))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityDenied);
        assert_eq!(err.to_string(), "field is not filterable: secret");

        // inside a logical branch too
        assert_eq!(
            kind_of(json!({
                "model": "orders",
                "filters": {"or": [
                    {"field": "status", "op": "=", "value": "PAID"},
                    {"field": "secret", "op": "is_null"}
                ]}
            })),
            ErrorKind::CapabilityDenied
        );
        assert_eq!(
            kind_of(json!({
                "model": "orders",
                "filters": {"not": {"field": "secret", "op": "not_null"}}
            })),
            ErrorKind::CapabilityDenied
        );
    }

    #[test_case("=", json!(1) ; "equality")]
    #[test_case("!=", json!(1) ; "inequality")]
    #[test_case(">", json!(1) ; "greater")]
    #[test_case(">=", json!(1) ; "greater or equal")]
    #[test_case("<", json!(1) ; "less")]
    #[test_case("<=", json!(1) ; "less or equal")]
    #[test_case("before", json!(1) ; "before")]
    #[test_case("after", json!(1) ; "after")]
    #[test_case("between", json!([1, 2]) ; "between")]
    #[test_case("in", json!([1, 2]) ; "in")]
    #[test_case("not_in", json!([]) ; "not in empty")]
    fn test_operator_legal_on_any_type(op: &str, value: serde_json::Value) {
        for field in ["id", "status", "amount", "created_at"] {
            validate(json!({
                "model": "orders",
                "filters": {"field": field, "op": op, "value": value.clone()}
            }))
            .unwrap();
        }
    }

    #[test_case("like")]
    #[test_case("ilike")]
    #[test_case("starts_with")]
    #[test_case("ends_with")]
    #[test_case("contains")]
    fn test_pattern_operators_string_only(op: &str) {
        validate(json!({
            "model": "orders",
            "filters": {"field": "status", "op": op, "value": "PA"}
        }))
        .unwrap();

        let err = validate(json!({
            "model": "orders",
            "filters": {"field": "amount", "op": op, "value": "10"}
        }))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperatorTypeMismatch);
        assert!(err.to_string().contains("of type decimal"));
    }

    #[test_case(json!({"field": "status", "op": "~", "value": "x"}) ; "unknown operator")]
    #[test_case(json!({"field": "status", "op": "="}) ; "missing value")]
    #[test_case(json!({"field": "status", "op": "is_null", "value": "x"}) ; "null op with value")]
    #[test_case(json!({"field": "status", "op": "in", "value": "PAID"}) ; "in without array")]
    #[test_case(json!({"field": "amount", "op": "between", "value": [1]}) ; "between one bound")]
    #[test_case(json!({"field": "amount", "op": "between", "value": 5}) ; "between scalar")]
    #[test_case(json!({"field": "amount", "op": "between", "value": [1, null]}) ; "between null bound")]
    #[test_case(json!({"field": "status", "op": "contains", "value": 5}) ; "pattern non string")]
    #[test_case(json!({"field": "", "op": "=", "value": 5}) ; "empty field")]
    #[test_case(json!({"and": []}) ; "empty and")]
    fn test_filter_shape_errors(filters: serde_json::Value) {
        assert_eq!(
            kind_of(json!({"model": "orders", "filters": filters})),
            ErrorKind::ShapeError
        );
    }

    #[test]
    fn test_null_operators_accept_absent_value() {
        validate(json!({"model": "orders", "filters": {"field": "status", "op": "is_null"}})).unwrap();
        validate(json!({"model": "orders", "filters": {"field": "status", "op": "not_null", "value": null}}))
            .unwrap();
    }

    #[test]
    fn test_group_by_checks() {
        assert_eq!(
            kind_of(json!({"model": "orders", "group_by": ["secret"]})),
            ErrorKind::CapabilityDenied
        );
        assert_eq!(
            kind_of(json!({"model": "orders", "group_by": ["nope"]})),
            ErrorKind::UnknownField
        );
        assert_eq!(
            kind_of(json!({"model": "orders", "group_by": [""]})),
            ErrorKind::ShapeError
        );
    }

    #[test]
    fn test_sum_on_string_is_type_mismatch() {
        let err = validate(json!({
            "model": "orders",
            "aggregates": [{"fn": "sum", "field": "status", "alias": "x"}]
        }))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperatorTypeMismatch);
        assert_eq!(err.to_string(), "sum is not valid for field status of type string");
    }

    #[test]
    fn test_aggregate_checks() {
        // count may omit the field
        validate(json!({"model": "orders", "aggregates": [{"fn": "count", "alias": "n"}]})).unwrap();
        validate(json!({"model": "orders", "aggregates": [{"fn": "max", "field": "amount", "alias": "top"}]}))
            .unwrap();

        let cases = [
            (json!({"fn": "count", "alias": ""}), ErrorKind::ShapeError),
            (json!({"fn": "count", "alias": "n; DROP TABLE orders"}), ErrorKind::ShapeError),
            (json!({"fn": "median", "field": "amount", "alias": "m"}), ErrorKind::ShapeError),
            (json!({"fn": "sum", "alias": "s"}), ErrorKind::ShapeError),
            (json!({"fn": "min", "field": "nope", "alias": "m"}), ErrorKind::UnknownField),
            (json!({"fn": "avg", "field": "created_at", "alias": "a"}), ErrorKind::OperatorTypeMismatch),
            (json!({"fn": "max", "field": "status", "alias": "m"}), ErrorKind::CapabilityDenied),
            (json!({"fn": "avg", "field": "rating", "alias": "r"}), ErrorKind::CapabilityDenied),
        ];
        for (agg, expected) in cases {
            assert_eq!(
                kind_of(json!({"model": "orders", "aggregates": [agg.clone()]})),
                expected,
                "aggregate {agg}"
            );
        }
    }

    #[test]
    fn test_duplicate_aggregate_alias() {
        let err = validate(json!({
            "model": "orders",
            "aggregates": [
                {"fn": "count", "alias": "n"},
                {"fn": "sum", "field": "amount", "alias": "n"}
            ]
        }))
        .unwrap_err();
        assert_eq!(err, ValidationError::Shape("aggregate[1] duplicate alias: n".to_string()));
    }

    #[test]
    fn test_alias_shadowing_field() {
        let err = validate(json!({
            "model": "orders",
            "group_by": ["user_id"],
            "aggregates": [{"fn": "count", "alias": "status"}],
            "sort": [{"field": "status", "direction": "desc"}]
        }))
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::Shape("aggregate[0] alias shadows field: status".to_string())
        );
    }

    #[test_case("order")]
    #[test_case("GROUP")]
    #[test_case("limit")]
    fn test_reserved_alias(alias: &str) {
        let err = validate(json!({
            "model": "orders",
            "aggregates": [{"fn": "count", "alias": alias}],
            "sort": [{"field": alias, "direction": "desc"}]
        }))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeError);
        assert!(err.to_string().contains("reserved word"));
    }

    #[test]
    fn test_sort_checks() {
        assert_eq!(
            kind_of(json!({"model": "orders", "sort": [{"field": "nope"}]})),
            ErrorKind::UnknownField
        );
        assert_eq!(
            kind_of(json!({"model": "orders", "sort": [{"field": "id", "direction": "up"}]})),
            ErrorKind::ShapeError
        );
        assert_eq!(
            kind_of(json!({"model": "orders", "sort": [{"field": "id", "direction": "DESC"}]})),
            ErrorKind::ShapeError
        );
        // an aggregate alias is a legal sort target
        validate(json!({
            "model": "orders",
            "aggregates": [{"fn": "count", "alias": "n"}],
            "sort": [{"field": "n", "direction": "desc"}]
        }))
        .unwrap();
    }

    #[test]
    fn test_pagination_checks() {
        assert_eq!(
            kind_of(json!({"model": "orders", "pagination": {"limit": 0}})),
            ErrorKind::ShapeError
        );
        assert_eq!(
            kind_of(json!({"model": "orders", "pagination": {"limit": 10, "offset": -1}})),
            ErrorKind::ShapeError
        );
        validate(json!({"model": "orders", "pagination": {"limit": 1, "offset": 0}})).unwrap();
    }

    #[test]
    fn test_validation_is_repeatable() {
        let registry = registry();
        let validator = Validator::new(&registry);
        let query: Query = serde_json::from_value(json!({
            "model": "orders",
            "filters": {"field": "secret", "op": "=", "value": 1}
        }))
        .unwrap();

        let first = validator.validate(&query).map(|_| ());
        let second = validator.validate(&query).map(|_| ());
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }
}
