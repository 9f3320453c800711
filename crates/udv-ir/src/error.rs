//! Error taxonomy shared by every stage of the translation pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error kind reported alongside a human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigInvalid,
    UnknownModel,
    UnknownField,
    CapabilityDenied,
    OperatorTypeMismatch,
    ShapeError,
    EmitError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::UnknownModel => "unknown_model",
            ErrorKind::UnknownField => "unknown_field",
            ErrorKind::CapabilityDenied => "capability_denied",
            ErrorKind::OperatorTypeMismatch => "operator_type_mismatch",
            ErrorKind::ShapeError => "shape_error",
            ErrorKind::EmitError => "emit_error",
        }
    }

    /// Kinds caused by the caller's input rather than by a bug or bad deployment.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, ErrorKind::ConfigInvalid | ErrorKind::EmitError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
