//! Models configuration document
//!
//! ```json
//! { "models": [ { "name": "orders", "table": "orders", "primaryKey": "id",
//!     "fields": [ { "name": "id", "type": "integer", "nullable": false } ] } ] }
//! ```
//!
//! Capability flags are optional per field; when absent the registry applies
//! its defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::RegistryError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub table: String,
    #[serde(default, rename = "primaryKey")]
    pub primary_key: String,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filterable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groupable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregatable: Option<bool>,
}

impl ModelsConfig {
    /// Read and parse a models document from disk.
    ///
    /// Only the JSON shape is checked here; model invariants are enforced
    /// when the document is turned into a [`crate::Registry`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(json)?)
    }
}
