//! Request pipeline: validate, plan, emit

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use udv_dsl::{PlanError, Planner, Query, ValidationError, Validator};
use udv_ir::{ErrorKind, QueryPlan};
use udv_postgres::{EmitError, QueryBuilder};
use udv_registry::Registry;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl TranslateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslateError::Validation(e) => e.kind(),
            TranslateError::Plan(e) => e.kind(),
            TranslateError::Emit(e) => e.kind(),
        }
    }
}

/// Result of a successful translation.
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub sql: String,
    pub params: Vec<Value>,
    pub fingerprint: String,
    #[serde(skip)]
    pub plan: QueryPlan,
}

/// Run the whole pipeline against one registry snapshot. Stops at the first
/// rejection.
pub fn translate(registry: &Registry, query: &Query) -> Result<Translation, TranslateError> {
    let validated = Validator::new(registry).validate(query)?;
    let plan = Planner::new(registry).plan(validated)?;
    let built = QueryBuilder::new().build(&plan)?;

    Ok(Translation {
        sql: built.sql,
        params: built.params,
        fingerprint: plan.fingerprint(),
        plan,
    })
}
