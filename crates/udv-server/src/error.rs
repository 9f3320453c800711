//! HTTP error responses
//!
//! Body shape: `{"error": {"kind": "...", "message": "..."}}`

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use udv_ir::ErrorKind;
use udv_registry::RegistryError;

use crate::query::TranslateError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, kind, message)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    if kind.is_user_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<TranslateError> for ApiError {
    fn from(err: TranslateError) -> Self {
        let kind = err.kind();
        Self::new(status_for(kind), kind, err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::UnknownModel | ErrorKind::UnknownField => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, kind, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorKind::ShapeError,
            rejection.body_text(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "kind": self.kind,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}
