//! Shared server state

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use udv_registry::Registry;

use crate::metrics::Metrics;

/// Publishes a fully built registry to request handlers.
///
/// Readers clone the `Arc` once per request and keep that snapshot for the
/// whole pipeline. Replacement swaps the `Arc`; a published registry is
/// never mutated.
#[derive(Debug)]
pub struct RegistryHandle {
    current: RwLock<Arc<Registry>>,
}

impl RegistryHandle {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn current(&self) -> Arc<Registry> {
        // The lock guards a single pointer swap, so a poisoned value is still whole.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, registry: Registry) -> Arc<Registry> {
        let next = Arc::new(registry);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, next)
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub registry: Arc<RegistryHandle>,
    pub metrics: Metrics,
    pub models_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: Registry, metrics: Metrics, models_path: impl Into<PathBuf>) -> Self {
        Self {
            registry: Arc::new(RegistryHandle::new(registry)),
            metrics,
            models_path: models_path.into(),
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(table: &str) -> Registry {
        Registry::from_json(&format!(
            r#"{{"models":[{{"name":"orders","table":"{table}","primaryKey":"id",
                "fields":[{{"name":"id","type":"integer"}}]}}]}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let handle = RegistryHandle::new(registry("orders"));
        let snapshot = handle.current();

        let previous = handle.replace(registry("archive.orders"));

        assert!(Arc::ptr_eq(&snapshot, &previous));
        assert_eq!(snapshot.get_model("orders").unwrap().table, "orders");
        assert_eq!(handle.current().get_model("orders").unwrap().table, "archive.orders");
    }
}
