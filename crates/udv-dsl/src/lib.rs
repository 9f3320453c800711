//! UDV DSL - query document, validation and planning
//!
//! A JSON [`Query`] is checked by the [`Validator`] against a registry and
//! lowered by the [`Planner`] into a [`udv_ir::QueryPlan`].

mod planner;
pub mod query;
mod validate;

pub use planner::{PlanError, Planner};
pub use query::*;
pub use validate::{Capability, ValidatedQuery, ValidationError, Validator};
