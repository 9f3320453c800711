//! HTTP routes

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn, Level};
use udv_dsl::Query;
use udv_ir::{ErrorKind, QueryPlan};
use udv_registry::{Model, Registry};
use uuid::Uuid;

use crate::error::ApiError;
use crate::metrics::Outcome;
use crate::query::{translate, Translation};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/models", get(list_models))
        .route("/models/:name", get(get_model))
        .route("/query", post(run_query))
        .route("/query/explain", post(explain_query))
        .route("/admin/reload", post(reload))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct FieldView<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    data_type: &'static str,
    nullable: bool,
    filterable: bool,
    groupable: bool,
    aggregatable: bool,
}

#[derive(Debug, Serialize)]
struct ModelView<'a> {
    name: &'a str,
    table: &'a str,
    primary_key: &'a str,
    fields: Vec<FieldView<'a>>,
}

impl<'a> From<&'a Model> for ModelView<'a> {
    fn from(model: &'a Model) -> Self {
        Self {
            name: &model.name,
            table: &model.table,
            primary_key: &model.primary_key,
            fields: model
                .fields()
                .map(|f| FieldView {
                    name: &f.name,
                    data_type: f.data_type.as_str(),
                    nullable: f.nullable,
                    filterable: f.filterable,
                    groupable: f.groupable,
                    aggregatable: f.aggregatable,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExplainResponse {
    #[serde(flatten)]
    translation: Translation,
    plan: QueryPlan,
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "models": state.registry.current().len(),
        "started_at": state.started_at.to_rfc3339(),
    }))
}

async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let registry = state.registry.current();
    let mut names = registry.list_models();
    names.sort_unstable();

    let models: Vec<ModelView<'_>> = names
        .into_iter()
        .filter_map(|name| registry.get_model(name))
        .map(ModelView::from)
        .collect();
    Json(json!(models))
}

async fn get_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let registry = state.registry.current();
    let model = registry.get_model(&name).ok_or_else(|| {
        ApiError::not_found(ErrorKind::UnknownModel, format!("model not found: {name}"))
    })?;
    Ok(Json(json!(ModelView::from(model))))
}

async fn run_query(
    State(state): State<AppState>,
    payload: Result<Json<Query>, JsonRejection>,
) -> Result<Json<Translation>, ApiError> {
    let Json(query) = payload?;
    let registry = state.registry.current();
    Ok(Json(translate_request(&state, &registry, &query)?))
}

async fn explain_query(
    State(state): State<AppState>,
    payload: Result<Json<Query>, JsonRejection>,
) -> Result<Json<ExplainResponse>, ApiError> {
    let Json(query) = payload?;
    let registry = state.registry.current();
    let translation = translate_request(&state, &registry, &query)?;
    let plan = translation.plan.clone();
    Ok(Json(ExplainResponse { translation, plan }))
}

/// Translate one request, recording metrics and a single log event.
fn translate_request(
    state: &AppState,
    registry: &Registry,
    query: &Query,
) -> Result<Translation, ApiError> {
    let request_id = Uuid::new_v4();
    let started = Instant::now();
    let result = translate(registry, query);
    let elapsed = started.elapsed();

    match &result {
        Ok(t) => {
            state.metrics.record(Outcome::Ok, elapsed.as_secs_f64());
            crate::log_event!(
                level: Level::INFO,
                event: "query_translated",
                request_id: request_id,
                model: query.model,
                params: t.params.len(),
                elapsed_us: elapsed.as_micros(),
                fingerprint: t.fingerprint,
            );
        }
        Err(e) => {
            let outcome = if e.kind().is_user_error() {
                Outcome::Rejected
            } else {
                Outcome::Error
            };
            state.metrics.record(outcome, elapsed.as_secs_f64());
            crate::log_event!(
                level: Level::WARN,
                event: "query_rejected",
                request_id: request_id,
                model: query.model,
                kind: e.kind(),
                error: e.to_string(),
                elapsed_us: elapsed.as_micros(),
            );
        }
    }

    result.map_err(ApiError::from)
}

async fn reload(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let path = state.models_path.clone();
    let loaded = tokio::task::spawn_blocking(move || Registry::load(path))
        .await
        .map_err(|e| {
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::ConfigInvalid,
                format!("reload task failed: {e}"),
            )
        })?;

    let registry = match loaded {
        Ok(registry) => registry,
        Err(e) => {
            warn!(
                path = %state.models_path.display(),
                error = %e,
                "registry reload failed, keeping current registry"
            );
            return Err(e.into());
        }
    };

    let models = registry.len();
    state.registry.replace(registry);
    info!(path = %state.models_path.display(), models, "registry reloaded");

    Ok(Json(json!({ "status": "reloaded", "models": models })))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
}
