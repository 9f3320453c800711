//! Single-pass SQL assembly
//!
//! Clause order is fixed and is also the parameter order: filter values
//! depth-first left to right, then limit, then offset.

use serde_json::Value;
use tracing::debug;
use udv_ir::{
    AggregateExpr, AggregateFn, ColumnRef, FilterExpr, FilterOp, LogicalOp, QueryPlan, SortTarget,
    TypedValue,
};

use crate::{BuiltQuery, EmitError};

/// Stateless PostgreSQL query builder. Every call to [`QueryBuilder::build`]
/// starts a fresh parameter vector, so one builder can be shared freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder;

/// Parameter vector with `$N` numbering tied to its length.
#[derive(Default)]
struct Params {
    values: Vec<Value>,
}

impl Params {
    fn push(&mut self, value: Value) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, plan: &QueryPlan) -> Result<BuiltQuery, EmitError> {
        let mut params = Params::default();
        let mut parts = Vec::with_capacity(6);

        parts.push(select_clause(plan)?);
        parts.push(format!(
            "FROM {} {}",
            plan.root_model.table, plan.root_model.alias
        ));

        if let Some(filters) = &plan.filters {
            parts.push(format!("WHERE {}", filter(filters, &mut params)?));
        }

        if !plan.group_by.is_empty() {
            let columns: Vec<String> = plan.group_by.iter().map(|g| g.column.qualified()).collect();
            parts.push(format!("GROUP BY {}", columns.join(", ")));
        }

        if !plan.sort.is_empty() {
            let keys: Vec<String> = plan
                .sort
                .iter()
                .map(|s| {
                    let target = match &s.target {
                        SortTarget::Column(column) => column.qualified(),
                        SortTarget::Aggregate(agg) => agg.alias.clone(),
                    };
                    format!("{} {}", target, s.direction.as_sql())
                })
                .collect();
            parts.push(format!("ORDER BY {}", keys.join(", ")));
        }

        let limit = params.push(Value::from(plan.pagination.limit));
        let offset = params.push(Value::from(plan.pagination.offset));
        parts.push(format!("LIMIT {limit} OFFSET {offset}"));

        let sql = parts.join(" ") + ";";
        debug!(params = params.values.len(), "built postgres query");

        Ok(BuiltQuery {
            sql,
            params: params.values,
        })
    }
}

fn select_clause(plan: &QueryPlan) -> Result<String, EmitError> {
    let mut columns = Vec::new();

    for expr in &plan.select {
        let column = expr.column.qualified();
        if expr.alias == expr.column.column_name {
            columns.push(column);
        } else {
            columns.push(format!("{} AS {}", column, expr.alias));
        }
    }

    if plan.select.is_empty() {
        columns.extend(plan.group_by.iter().map(|g| g.column.qualified()));
    }

    for agg in &plan.aggregates {
        columns.push(aggregate(agg)?);
    }

    if columns.is_empty() {
        return Ok("SELECT *".to_string());
    }
    Ok(format!("SELECT {}", columns.join(", ")))
}

fn aggregate(agg: &AggregateExpr) -> Result<String, EmitError> {
    let call = match (&agg.column, agg.function) {
        (Some(column), function) => format!("{}({})", function.as_sql(), column.qualified()),
        (None, AggregateFn::Count) => "COUNT(*)".to_string(),
        (None, _) => return Err(EmitError::MissingAggregateColumn(agg.alias.clone())),
    };
    Ok(format!("{} AS {}", call, agg.alias))
}

fn filter(expr: &FilterExpr, params: &mut Params) -> Result<String, EmitError> {
    match expr {
        FilterExpr::Comparison { left, op, value } => comparison(left, *op, value.as_ref(), params),
        FilterExpr::Logical { op, nodes } => logical(*op, nodes, params),
    }
}

fn logical(op: LogicalOp, nodes: &[FilterExpr], params: &mut Params) -> Result<String, EmitError> {
    if op == LogicalOp::Not && nodes.len() != 1 {
        return Err(EmitError::NotArity(nodes.len()));
    }
    if nodes.is_empty() {
        return Err(EmitError::EmptyLogical(op.as_sql().to_string()));
    }

    let parts = nodes
        .iter()
        .map(|node| filter(node, params))
        .collect::<Result<Vec<_>, _>>()?;

    match op {
        LogicalOp::Not => Ok(format!("NOT {}", parts[0])),
        LogicalOp::And | LogicalOp::Or => {
            let sep = format!(" {} ", op.as_sql());
            Ok(format!("({})", parts.join(&sep)))
        }
    }
}

fn comparison(
    left: &ColumnRef,
    op: FilterOp,
    value: Option<&TypedValue>,
    params: &mut Params,
) -> Result<String, EmitError> {
    let column = left.qualified();
    let required = || {
        value
            .map(|v| &v.value)
            .ok_or_else(|| EmitError::MissingValue(op.to_string()))
    };

    let sql = match op {
        FilterOp::IsNull => format!("{column} IS NULL"),
        FilterOp::NotNull => format!("{column} IS NOT NULL"),
        FilterOp::Eq
        | FilterOp::Ne
        | FilterOp::Gt
        | FilterOp::Gte
        | FilterOp::Lt
        | FilterOp::Lte => {
            format!("{} {} {}", column, op.as_str(), params.push(required()?.clone()))
        }
        FilterOp::Before => format!("{} < {}", column, params.push(required()?.clone())),
        FilterOp::After => format!("{} > {}", column, params.push(required()?.clone())),
        FilterOp::In => format!("{} = ANY({})", column, params.push(required()?.clone())),
        FilterOp::NotIn => format!("{} != ALL({})", column, params.push(required()?.clone())),
        FilterOp::Like => format!("{} LIKE {}", column, params.push(required()?.clone())),
        FilterOp::ILike => format!("{} ILIKE {}", column, params.push(required()?.clone())),
        FilterOp::StartsWith => {
            let pattern = format!("{}%", pattern_text(op, required()?)?);
            format!("{} LIKE {}", column, params.push(Value::String(pattern)))
        }
        FilterOp::EndsWith => {
            let pattern = format!("%{}", pattern_text(op, required()?)?);
            format!("{} LIKE {}", column, params.push(Value::String(pattern)))
        }
        FilterOp::Contains => {
            let pattern = format!("%{}%", pattern_text(op, required()?)?);
            format!("{} LIKE {}", column, params.push(Value::String(pattern)))
        }
        FilterOp::Between => {
            let value = required()?;
            let (low, high) = match value.as_array().map(Vec::as_slice) {
                Some([low, high]) => (low.clone(), high.clone()),
                _ => {
                    return Err(EmitError::BadValue {
                        operator: op.to_string(),
                        expected: "a [low, high] array",
                        got: value.to_string(),
                    })
                }
            };
            let low = params.push(low);
            let high = params.push(high);
            format!("{column} BETWEEN {low} AND {high}")
        }
    };
    Ok(sql)
}

fn pattern_text(op: FilterOp, value: &Value) -> Result<&str, EmitError> {
    value.as_str().ok_or_else(|| EmitError::BadValue {
        operator: op.to_string(),
        expected: "a string",
        got: value.to_string(),
    })
}
