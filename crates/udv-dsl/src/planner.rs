//! Lower a validated DSL query into the IR
//!
//! Resolves every name against the registry, assigns the root alias,
//! normalizes the filter tree and fills in default pagination.

use thiserror::Error;
use tracing::trace;
use udv_ir::{
    self as ir, AggregateFn, ColumnRef, Direction, ErrorKind, FilterOp, LogicalOp, QueryPlan,
    ROOT_ALIAS,
};
use udv_registry::{Model, Registry};

use crate::query::{Comparison, FilterExpr, Logical};
use crate::validate::ValidatedQuery;

/// Planning errors. Seeing one after successful validation means the
/// validator and planner were given different registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("model not found: {0}")]
    UnknownModel(String),

    #[error("field not found in model {model}: {field}")]
    UnknownField { model: String, field: String },

    #[error("{0}")]
    Shape(String),
}

impl PlanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanError::UnknownModel(_) => ErrorKind::UnknownModel,
            PlanError::UnknownField { .. } => ErrorKind::UnknownField,
            PlanError::Shape(_) => ErrorKind::ShapeError,
        }
    }
}

pub struct Planner<'r> {
    registry: &'r Registry,
}

impl<'r> Planner<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn plan(&self, validated: ValidatedQuery<'_>) -> Result<QueryPlan, PlanError> {
        let query = validated.query();
        let model = self
            .registry
            .get_model(&query.model)
            .ok_or_else(|| PlanError::UnknownModel(query.model.clone()))?;

        let root_model = ir::ModelRef {
            name: model.name.clone(),
            table: model.table.clone(),
            alias: ROOT_ALIAS.to_string(),
            primary_key: column(model, &model.primary_key)?,
        };

        let select = query
            .fields
            .iter()
            .map(|name| -> Result<_, PlanError> {
                Ok(ir::SelectExpr {
                    column: column(model, name)?,
                    alias: name.clone(),
                    is_aggregate: false,
                })
            })
            .collect::<Result<Vec<_>, PlanError>>()?;

        let filters = query
            .filters
            .as_ref()
            .map(|expr| lower_filter(model, expr))
            .transpose()?;

        let group_by = query
            .group_by
            .iter()
            .map(|name| -> Result<_, PlanError> {
                Ok(ir::GroupExpr {
                    column: column(model, name)?,
                })
            })
            .collect::<Result<Vec<_>, PlanError>>()?;

        let aggregates = query
            .aggregates
            .iter()
            .map(|agg| -> Result<_, PlanError> {
                let function = AggregateFn::parse(&agg.function).ok_or_else(|| {
                    PlanError::Shape(format!("unknown aggregate function: {:?}", agg.function))
                })?;
                let column = agg.field_name().map(|name| column(model, name)).transpose()?;
                if column.is_none() && function != AggregateFn::Count {
                    return Err(PlanError::Shape(format!(
                        "aggregate {} requires a field",
                        agg.alias
                    )));
                }
                Ok(ir::AggregateExpr {
                    function,
                    column,
                    alias: agg.alias.clone(),
                })
            })
            .collect::<Result<Vec<_>, PlanError>>()?;

        let sort = query
            .sort
            .iter()
            .map(|s| -> Result<_, PlanError> {
                let direction = Direction::parse(&s.direction).ok_or_else(|| {
                    PlanError::Shape(format!("invalid sort direction: {:?}", s.direction))
                })?;
                let target = if model.has_field(&s.field) {
                    ir::SortTarget::Column(column(model, &s.field)?)
                } else {
                    let agg = aggregates
                        .iter()
                        .find(|a| a.alias == s.field)
                        .ok_or_else(|| unknown_field(model, &s.field))?;
                    ir::SortTarget::Aggregate(agg.clone())
                };
                Ok(ir::SortExpr { target, direction })
            })
            .collect::<Result<Vec<_>, PlanError>>()?;

        let pagination = query
            .pagination
            .map(|p| ir::Pagination {
                limit: p.limit,
                offset: p.offset,
            })
            .unwrap_or_default();

        let plan = QueryPlan {
            root_model,
            select,
            filters,
            group_by,
            aggregates,
            sort,
            pagination,
        };
        trace!(model = %plan.root_model.name, "query planned");
        Ok(plan)
    }
}

fn lower_filter(model: &Model, expr: &FilterExpr) -> Result<ir::FilterExpr, PlanError> {
    let (op, branches) = match expr {
        FilterExpr::Comparison(c) => return lower_comparison(model, c),
        FilterExpr::Logical(Logical::And(branches)) => (LogicalOp::And, branches.as_slice()),
        FilterExpr::Logical(Logical::Or(branches)) => (LogicalOp::Or, branches.as_slice()),
        FilterExpr::Logical(Logical::Not(c)) => (LogicalOp::Not, std::slice::from_ref(c)),
    };

    let nodes = branches
        .iter()
        .map(|c| lower_comparison(model, c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ir::FilterExpr::Logical { op, nodes })
}

/// Pattern operators stay as-is; wildcard wrapping belongs to the emitter.
fn lower_comparison(model: &Model, c: &Comparison) -> Result<ir::FilterExpr, PlanError> {
    let left = column(model, &c.field)?;
    let op = FilterOp::parse(&c.op)
        .ok_or_else(|| PlanError::Shape(format!("unknown operator: {:?}", c.op)))?;

    let value = if op.takes_value() {
        c.value.clone().map(|value| ir::TypedValue {
            value,
            data_type: left.data_type,
        })
    } else {
        None
    };

    Ok(ir::FilterExpr::Comparison { left, op, value })
}

fn column(model: &Model, name: &str) -> Result<ColumnRef, PlanError> {
    let field = model.field(name).ok_or_else(|| unknown_field(model, name))?;
    Ok(ColumnRef::new(ROOT_ALIAS, field.name.clone(), field.data_type))
}

fn unknown_field(model: &Model, name: &str) -> PlanError {
    PlanError::UnknownField {
        model: model.name.clone(),
        field: name.to_string(),
    }
}
