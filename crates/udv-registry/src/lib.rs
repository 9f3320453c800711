//! Schema registry
//!
//! Indexed, read-only catalog of models and their fields. A [`Registry`] is
//! built in one step from a [`ModelsConfig`] and exposes no mutating method
//! afterwards; share it behind an `Arc` and replace it wholesale to reload.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use thiserror::Error;
use tracing::debug;
use udv_ir::{ErrorKind, FieldType};

mod config;
pub use config::{FieldConfig, ModelConfig, ModelsConfig};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read models file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse models document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid models config: {0}")]
    ConfigInvalid(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("field not found: {model}.{field}")]
    FieldNotFound { model: String, field: String },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Io { .. } | RegistryError::Json(_) | RegistryError::ConfigInvalid(_) => {
                ErrorKind::ConfigInvalid
            }
            RegistryError::ModelNotFound(_) => ErrorKind::UnknownModel,
            RegistryError::FieldNotFound { .. } => ErrorKind::UnknownField,
        }
    }
}

/// A model field with its capability flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub data_type: FieldType,
    pub nullable: bool,
    pub filterable: bool,
    pub groupable: bool,
    pub aggregatable: bool,
}

#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    fields: HashMap<String, Field>,
    field_order: Vec<String>,
}

impl Model {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.field_order.iter().filter_map(|name| self.fields.get(name))
    }

    pub fn field_order(&self) -> &[String] {
        &self.field_order
    }

    pub fn primary_key_field(&self) -> Option<&Field> {
        self.fields.get(&self.primary_key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    models: HashMap<String, Model>,
}

impl Registry {
    /// Build a registry, rejecting the whole document on the first violation.
    pub fn from_config(config: &ModelsConfig) -> Result<Self, RegistryError> {
        if config.models.is_empty() {
            return Err(RegistryError::ConfigInvalid(
                "no models defined in config".to_string(),
            ));
        }

        let mut models = HashMap::with_capacity(config.models.len());
        for (index, model_config) in config.models.iter().enumerate() {
            let model = build_model(index, model_config)?;
            if models.contains_key(&model.name) {
                return Err(RegistryError::ConfigInvalid(format!(
                    "duplicate model name: {}",
                    model.name
                )));
            }
            models.insert(model.name.clone(), model);
        }

        debug!(models = models.len(), "schema registry built");
        Ok(Self { models })
    }

    /// Read a models document from disk and build a registry from it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        Self::from_config(&ModelsConfig::load(path)?)
    }

    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        Self::from_config(&ModelsConfig::from_json(json)?)
    }

    pub fn model_exists(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn field_exists(&self, model: &str, field: &str) -> bool {
        self.models
            .get(model)
            .map(|m| m.has_field(field))
            .unwrap_or(false)
    }

    pub fn get_model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    pub fn get_field(&self, model: &str, field: &str) -> Result<&Field, RegistryError> {
        let m = self
            .models
            .get(model)
            .ok_or_else(|| RegistryError::ModelNotFound(model.to_string()))?;

        m.field(field).ok_or_else(|| RegistryError::FieldNotFound {
            model: model.to_string(),
            field: field.to_string(),
        })
    }

    /// Model names, in no particular order
    pub fn list_models(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    /// Fields of a model in declaration order
    pub fn get_model_fields(&self, model: &str) -> Result<Vec<&Field>, RegistryError> {
        self.models
            .get(model)
            .map(|m| m.fields().collect())
            .ok_or_else(|| RegistryError::ModelNotFound(model.to_string()))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn build_model(index: usize, config: &ModelConfig) -> Result<Model, RegistryError> {
    let invalid = |msg: String| RegistryError::ConfigInvalid(format!("model[{index}] {}: {msg}", config.name));

    if config.name.is_empty() {
        return Err(RegistryError::ConfigInvalid(format!(
            "model[{index}]: name is required"
        )));
    }
    if !is_sql_identifier(&config.name) {
        return Err(invalid("name is not a valid identifier".to_string()));
    }
    if config.table.is_empty() {
        return Err(invalid("table is required".to_string()));
    }
    if !is_table_name(&config.table) {
        return Err(invalid(format!("table {:?} is not a valid identifier", config.table)));
    }
    if config.primary_key.is_empty() {
        return Err(invalid("primaryKey is required".to_string()));
    }
    if config.fields.is_empty() {
        return Err(invalid("at least one field is required".to_string()));
    }

    let mut fields = HashMap::with_capacity(config.fields.len());
    let mut field_order = Vec::with_capacity(config.fields.len());
    let mut seen = HashSet::with_capacity(config.fields.len());

    for (j, field_config) in config.fields.iter().enumerate() {
        let field = build_field(field_config).map_err(|msg| invalid(format!("field[{j}] {msg}")))?;
        if !seen.insert(field.name.clone()) {
            return Err(invalid(format!("duplicate field name: {}", field.name)));
        }
        field_order.push(field.name.clone());
        fields.insert(field.name.clone(), field);
    }

    if !fields.contains_key(&config.primary_key) {
        return Err(invalid(format!(
            "primaryKey {} not found in fields",
            config.primary_key
        )));
    }

    Ok(Model {
        name: config.name.clone(),
        table: config.table.clone(),
        primary_key: config.primary_key.clone(),
        fields,
        field_order,
    })
}

fn build_field(config: &FieldConfig) -> Result<Field, String> {
    if config.name.is_empty() {
        return Err("name is required".to_string());
    }
    if !is_sql_identifier(&config.name) {
        return Err(format!("{}: name is not a valid identifier", config.name));
    }
    if config.field_type.is_empty() {
        return Err(format!("{}: type is required", config.name));
    }
    let data_type: FieldType = config
        .field_type
        .parse()
        .map_err(|_| format!("{}: invalid type {:?}", config.name, config.field_type))?;

    Ok(Field {
        name: config.name.clone(),
        data_type,
        nullable: config.nullable,
        filterable: config.filterable.unwrap_or(true),
        groupable: config.groupable.unwrap_or(true),
        aggregatable: config.aggregatable.unwrap_or_else(|| data_type.is_numeric()),
    })
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// PostgreSQL reserved keywords. These cannot stand alone as an output
/// column name in `ORDER BY`, so aggregate aliases must avoid them.
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "table", "then", "to",
    "trailing", "true", "union", "unique", "user", "using", "variadic", "when", "where",
    "window", "with",
];

pub fn is_reserved_word(s: &str) -> bool {
    RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(s))
}

/// An identifier, optionally qualified by one schema name.
fn is_table_name(s: &str) -> bool {
    match s.split_once('.') {
        Some((schema, table)) => is_sql_identifier(schema) && is_sql_identifier(table),
        None => is_sql_identifier(s),
    }
}
